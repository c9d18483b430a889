use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::AppState;
use crate::error::AppError;
use crate::routes::common::EmptyResponse;
use crate::utils::{Claims, generate_token, success_to_api_response};

use super::model::{
    AuthResponse, LoginRequest, Preferences, RegisterRequest, TargetUserRequest,
    UpdateProfileRequest, User,
};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::create(&state.pool, req).await?;

    let (token, expires_at) = generate_token(&user.user_id, &state.config)
        .map_err(|e| AppError::Internal(format!("failed to generate token: {}", e)))?;

    tracing::info!("registered user {}", user.user_id);
    Ok((
        StatusCode::CREATED,
        success_to_api_response(AuthResponse {
            user_id: user.user_id,
            nickname: user.nickname,
            token,
            expires_at,
        }),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or_else(|| AppError::AuthFailed("invalid email or password".to_string()))?;

    let valid = user
        .verify_login(&req.password)
        .map_err(|e| AppError::Internal(format!("password verification failed: {}", e)))?;
    if !valid {
        return Err(AppError::AuthFailed("invalid email or password".to_string()));
    }

    let (token, expires_at) = generate_token(&user.user_id, &state.config)
        .map_err(|e| AppError::Internal(format!("failed to generate token: {}", e)))?;

    Ok((
        StatusCode::OK,
        success_to_api_response(AuthResponse {
            user_id: user.user_id,
            nickname: user.nickname,
            token,
            expires_at,
        }),
    ))
}

#[axum::debug_handler]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
    Ok((StatusCode::OK, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::update_profile(&state.pool, &claims.sub, req).await?;
    Ok((StatusCode::OK, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<Preferences>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::update_preferences(&state.pool, &claims.sub, req).await?;
    Ok((StatusCode::OK, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn block_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TargetUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    User::block(&state.pool, &claims.sub, &req.target_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(EmptyResponse {}),
    ))
}

#[axum::debug_handler]
pub async fn unblock_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TargetUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    User::unblock(&state.pool, &claims.sub, &req.target_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(EmptyResponse {}),
    ))
}

#[axum::debug_handler]
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let friends = User::friends(&state.pool, &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(friends)))
}
