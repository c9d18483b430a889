use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::utils::{Claims, success_to_api_response};

use super::model::FriendRequest;

#[derive(Debug, Deserialize)]
pub struct SendRequestBody {
    pub recipient_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequestBody {
    pub request_id: String,
}

#[axum::debug_handler]
pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendRequestBody>,
) -> Result<impl IntoResponse, AppError> {
    let request = FriendRequest::send(&state.pool, &claims.sub, &req.recipient_id).await?;
    tracing::info!(
        "friend request {} sent from {} to {}",
        request.request_id,
        request.sender_id,
        request.recipient_id
    );
    Ok((StatusCode::CREATED, success_to_api_response(request)))
}

#[axum::debug_handler]
pub async fn accept_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AcceptRequestBody>,
) -> Result<impl IntoResponse, AppError> {
    let request = FriendRequest::accept(&state.pool, &req.request_id, &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(request)))
}

#[axum::debug_handler]
pub async fn incoming_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let requests = FriendRequest::incoming(&state.pool, &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(requests)))
}

#[axum::debug_handler]
pub async fn outgoing_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let requests = FriendRequest::outgoing(&state.pool, &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(requests)))
}
