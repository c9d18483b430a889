use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::routes::common::{EmptyResponse, PaginatedResponse, Pagination};
use crate::utils::{Claims, success_to_api_response};

use super::model::Notification;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationIdRequest {
    pub notification_id: String,
}

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);

    let (items, total) = Notification::list(&state.pool, &claims.sub, page, page_size).await?;

    Ok((
        StatusCode::OK,
        success_to_api_response(PaginatedResponse {
            items,
            pagination: Pagination {
                page,
                page_size,
                total,
            },
        }),
    ))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NotificationIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    Notification::mark_read(&state.pool, &claims.sub, &req.notification_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(EmptyResponse {}),
    ))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let updated = Notification::mark_all_read(&state.pool, &claims.sub).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "updated": updated })),
    ))
}

#[axum::debug_handler]
pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NotificationIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    Notification::delete(&state.pool, &claims.sub, &req.notification_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(EmptyResponse {}),
    ))
}
