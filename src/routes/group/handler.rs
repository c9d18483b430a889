use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::routes::common::EmptyResponse;
use crate::utils::{Claims, success_to_api_response};

use super::model::{CreateGroupRequest, Group, GroupInfo, UpdateGroupRequest};

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub group_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
    pub language: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JoinGroupRequest {
    pub group_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MemberRoleRequest {
    pub group_id: String,
    pub target_id: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveMemberRequest {
    pub group_id: String,
    pub target_id: String,
}

#[axum::debug_handler]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group = Group::create(&state.pool, req, &claims.sub).await?;
    tracing::info!("group {} created by {}", group.group_id, claims.sub);
    Ok((
        StatusCode::CREATED,
        success_to_api_response(GroupInfo::from(group)),
    ))
}

#[axum::debug_handler]
pub async fn find_by_id(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<impl IntoResponse, AppError> {
    let group = Group::find_by_id(&state.pool, &state.redis, &query.group_id)
        .await?
        .filter(|g| g.is_active)
        .ok_or_else(|| AppError::NotFound("group not found".to_string()))?;
    Ok((
        StatusCode::OK,
        success_to_api_response(GroupInfo::from(group)),
    ))
}

#[axum::debug_handler]
pub async fn search_groups(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let groups = Group::search(
        &state.pool,
        query.name.as_deref(),
        query.language.as_deref(),
        query.level.as_deref(),
    )
    .await?;
    let infos = groups.into_iter().map(GroupInfo::from).collect::<Vec<_>>();
    Ok((StatusCode::OK, success_to_api_response(infos)))
}

#[axum::debug_handler]
pub async fn my_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let groups = Group::find_by_member(&state.pool, &claims.sub).await?;
    let infos = groups.into_iter().map(GroupInfo::from).collect::<Vec<_>>();
    Ok((StatusCode::OK, success_to_api_response(infos)))
}

#[axum::debug_handler]
pub async fn update_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group = Group::update(&state.pool, &state.redis, &claims.sub, req).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(GroupInfo::from(group)),
    ))
}

#[axum::debug_handler]
pub async fn join_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    Group::join(&state.pool, &state.redis, &req.group_id, &claims.sub).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(EmptyResponse {}),
    ))
}

#[axum::debug_handler]
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    Group::leave(&state.pool, &state.redis, &req.group_id, &claims.sub).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(EmptyResponse {}),
    ))
}

#[axum::debug_handler]
pub async fn get_group_members(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<impl IntoResponse, AppError> {
    let members = Group::members(&state.pool, &state.redis, &query.group_id).await?;
    Ok((StatusCode::OK, success_to_api_response(members)))
}

#[axum::debug_handler]
pub async fn set_member_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MemberRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    Group::set_member_role(
        &state.pool,
        &state.redis,
        &req.group_id,
        &claims.sub,
        &req.target_id,
        &req.role,
    )
    .await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(EmptyResponse {}),
    ))
}

#[axum::debug_handler]
pub async fn remove_group_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RemoveMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    Group::remove_member(
        &state.pool,
        &state.redis,
        &req.group_id,
        &claims.sub,
        &req.target_id,
    )
    .await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(EmptyResponse {}),
    ))
}

#[axum::debug_handler]
pub async fn deactivate_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<IdQuery>,
) -> Result<impl IntoResponse, AppError> {
    Group::deactivate(&state.pool, &state.redis, &req.group_id, &claims.sub).await?;
    tracing::info!("group {} deactivated by {}", req.group_id, claims.sub);
    Ok((
        StatusCode::OK,
        success_to_api_response(EmptyResponse {}),
    ))
}
