//! Contact list and block list endpoints. Both are directional rows owned by
//! the caller; the block *check* used elsewhere is symmetric.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views::UserView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContactRequest {
    pub user_id: Uuid,
    pub nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBlockRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub user: UserView,
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub user: UserView,
    pub created_at: DateTime<Utc>,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<ContactView>>> {
    let db = state.db.lock().await;
    let rows = db.list_contacts(auth.user_id)?;
    Ok(Json(
        rows.iter()
            .map(|(contact, user)| ContactView {
                user: UserView::public(user),
                nickname: contact.nickname.clone(),
                created_at: contact.created_at,
            })
            .collect(),
    ))
}

pub async fn add(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<AddContactRequest>,
) -> ApiResult<(StatusCode, Json<ContactView>)> {
    if body.user_id == auth.user_id {
        return Err(ApiError::Validation(
            "Cannot add yourself as a contact".to_string(),
        ));
    }

    let db = state.db.lock().await;
    let user = db
        .get_user(body.user_id)
        .map_err(|_| ApiError::NotFound("User not found".to_string()))?;
    let contact = db.add_contact(
        auth.user_id,
        body.user_id,
        body.nickname.as_deref(),
        Utc::now(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(ContactView {
            user: UserView::public(&user),
            nickname: contact.nickname,
            created_at: contact.created_at,
        }),
    ))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db.lock().await;
    if !db.remove_contact(auth.user_id, user_id)? {
        return Err(ApiError::NotFound("Contact not found".to_string()));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn list_blocks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<BlockView>>> {
    let db = state.db.lock().await;
    let rows = db.list_blocks(auth.user_id)?;
    Ok(Json(
        rows.iter()
            .map(|(block, user)| BlockView {
                user: UserView::public(user),
                created_at: block.created_at,
            })
            .collect(),
    ))
}

pub async fn add_block(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<AddBlockRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if body.user_id == auth.user_id {
        return Err(ApiError::Validation("Cannot block yourself".to_string()));
    }

    let db = state.db.lock().await;
    db.get_user(body.user_id)
        .map_err(|_| ApiError::NotFound("User not found".to_string()))?;
    db.add_block(auth.user_id, body.user_id, Utc::now())?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true })),
    ))
}

pub async fn remove_block(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db.lock().await;
    if !db.remove_block(auth.user_id, user_id)? {
        return Err(ApiError::NotFound("Block not found".to_string()));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}
