//! Conversation endpoints: direct get-or-create, listing, and history.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::services::conversations as service;
use crate::state::AppState;
use crate::views::{ConversationView, MessagePage};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub cursor: Option<Uuid>,
    pub limit: Option<u32>,
}

pub async fn create_direct(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateDirectRequest>,
) -> ApiResult<(StatusCode, Json<ConversationView>)> {
    let (view, created) =
        service::get_or_create_direct(&state.db, auth.user_id, body.user_id).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(view)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<ConversationView>>> {
    let views = service::list_for_user(&state.db, auth.user_id).await?;
    Ok(Json(views))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ConversationView>> {
    let view = service::get_for_user(&state.db, id, auth.user_id).await?;
    Ok(Json(view))
}

pub async fn messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<MessagePage>> {
    let limit = query.limit.unwrap_or(service::DEFAULT_PAGE_LIMIT);
    let page = service::get_messages(&state.db, id, auth.user_id, query.cursor, limit).await?;
    Ok(Json(page))
}
