use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{AppState, error::AppError, utils::verify_token};

/// 认证中间件：校验 Bearer token，把 Claims 作为请求扩展注入，
/// 后续 handler 通过 Extension<Claims> 拿到请求级身份。
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = auth
        .as_ref()
        .map(|TypedHeader(auth)| auth.token())
        .ok_or_else(|| AppError::AuthFailed("missing bearer token".to_string()))?;

    let claims = verify_token(token, &state.config)
        .map_err(|_| AppError::AuthFailed("invalid or expired token".to_string()))?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
