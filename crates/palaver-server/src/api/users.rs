//! Profile endpoints and user search.

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::auth::validate_display_name;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views::UserView;

const SEARCH_LIMIT: u32 = 20;
const MAX_BIO_LEN: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<UserView>> {
    let db = state.db.lock().await;
    let user = db.get_user(auth.user_id)?;
    Ok(Json(UserView::private(&user)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserView>> {
    if let Some(display_name) = &body.display_name {
        validate_display_name(display_name)?;
    }
    if let Some(bio) = &body.bio {
        if bio.chars().count() > MAX_BIO_LEN {
            return Err(ApiError::Validation(format!(
                "Bio must be at most {MAX_BIO_LEN} characters"
            )));
        }
    }

    let db = state.db.lock().await;
    let user = db.update_profile(
        auth.user_id,
        body.display_name.as_deref(),
        body.avatar_url.as_deref(),
        body.bio.as_deref(),
    )?;
    Ok(Json(UserView::private(&user)))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserView>> {
    let db = state.db.lock().await;
    let user = db
        .get_user(id)
        .map_err(|_| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(UserView::public(&user)))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<UserView>>> {
    let needle = query.q.trim();
    if needle.is_empty() {
        return Err(ApiError::Validation("Search query is required".to_string()));
    }

    let db = state.db.lock().await;
    let users = db.search_users(needle, auth.user_id, SEARCH_LIMIT)?;
    Ok(Json(users.iter().map(UserView::public).collect()))
}
