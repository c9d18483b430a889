use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use crate::AppState;
use crate::error::AppError;
use crate::utils::{Claims, success_to_api_response};

#[derive(Debug, Serialize)]
pub struct ChatTokenResponse {
    pub token: String,
    pub api_key: String,
}

/// 给前端聊天/通话SDK签发用户token。
/// 这是网关唯一的同步调用面，且只做本地签名。
#[axum::debug_handler]
pub async fn chat_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let token = state
        .gateway
        .issue_token(&claims.sub)
        .map_err(|e| AppError::Internal(format!("failed to issue chat token: {}", e)))?;

    Ok((
        StatusCode::OK,
        success_to_api_response(ChatTokenResponse {
            token,
            api_key: state.gateway.api_key().to_string(),
        }),
    ))
}
