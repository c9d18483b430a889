// 通用的数据结构定义

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::utils::success_to_api_response;

/// 通用的API响应结构
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 错误码，0表示成功，非0表示失败
    pub code: i32,
    /// 错误消息，成功时为"success"
    pub msg: String,
    /// 响应数据，错误时为None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_data: Option<T>,
}

/// 空响应类型（用于无响应数据的API）
#[derive(Debug, Serialize, Deserialize)]
pub struct EmptyResponse {}

/// 分页信息
#[derive(Debug, Serialize, Deserialize)]
pub struct Pagination {
    /// 当前页码
    pub page: u32,
    /// 每页数量
    pub page_size: u32,
    /// 总记录数
    pub total: u64,
}

/// 带分页的响应数据
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// 数据列表
    pub items: Vec<T>,
    /// 分页信息
    pub pagination: Pagination,
}

/// Ping响应
#[derive(Serialize)]
pub struct PingResponse {
    /// 服务状态
    pub status: String,
    /// 服务器时间
    pub timestamp: i64,
}

/// 健康检查接口
pub async fn ping() -> impl IntoResponse {
    let now = chrono::Utc::now();

    (
        StatusCode::OK,
        success_to_api_response(PingResponse {
            status: "ok".to_string(),
            timestamp: now.timestamp(),
        }),
    )
}
