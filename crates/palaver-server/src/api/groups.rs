//! Group endpoints; the rules live in `services::groups`.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use palaver_shared::ParticipantRole;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::services::groups as service;
use crate::state::AppState;
use crate::views::GroupDetailView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMembersRequest {
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<GroupDetailView>)> {
    let detail = service::create(
        &state.db,
        auth.user_id,
        &body.name,
        body.description.as_deref(),
        &body.member_ids,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GroupDetailView>> {
    let detail = service::get_detail(&state.db, id, auth.user_id).await?;
    Ok(Json(detail))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateGroupRequest>,
) -> ApiResult<Json<GroupDetailView>> {
    let detail = service::update_meta(
        &state.db,
        id,
        auth.user_id,
        body.name.as_deref(),
        body.description.as_deref(),
        body.icon_url.as_deref(),
    )
    .await?;
    Ok(Json(detail))
}

pub async fn add_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<AddMembersRequest>,
) -> ApiResult<Json<GroupDetailView>> {
    let detail = service::add_members(&state.db, id, auth.user_id, &body.member_ids).await?;
    Ok(Json(detail))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    service::remove_member(&state.db, id, auth.user_id, user_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateRoleRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let role = ParticipantRole::parse(&body.role.to_uppercase())
        .map_err(|_| ApiError::Validation("Role must be ADMIN or MEMBER".to_string()))?;
    service::update_role(&state.db, id, auth.user_id, user_id, role).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
