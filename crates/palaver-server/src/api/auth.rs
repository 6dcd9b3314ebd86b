//! Registration, login, refresh rotation, and logout.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use palaver_store::User;

use crate::auth::{hash_password, verify_password, TokenPair};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views::UserView;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserView,
    pub tokens: TokenPair,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    validate_username(&body.username)?;
    validate_email(&body.email)?;
    validate_display_name(&body.display_name)?;
    if body.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = hash_password(&body.password)?;
    let user = {
        let db = state.db.lock().await;
        if db.find_user_by_username(&body.username)?.is_some() {
            return Err(ApiError::Validation("Username already taken".to_string()));
        }
        if db.find_user_by_email(&body.email)?.is_some() {
            return Err(ApiError::Validation("Email already registered".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: body.username,
            email: body.email,
            password_hash,
            display_name: body.display_name,
            avatar_url: None,
            bio: None,
            is_online: false,
            last_seen: None,
            created_at: Utc::now(),
        };
        db.create_user(&user)?;
        user
    };
    tracing::info!(user_id = %user.id, username = %user.username, "user registered");

    let tokens = state.tokens.issue(user.id, &user.username).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserView::private(&user),
            tokens,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    // Identical message for unknown email and wrong password.
    let invalid = || ApiError::Authentication("Invalid email or password".to_string());

    let user = {
        let db = state.db.lock().await;
        db.find_user_by_email(&body.email)?.ok_or_else(invalid)?
    };
    if !verify_password(&body.password, &user.password_hash)? {
        return Err(invalid());
    }

    let tokens = state.tokens.issue(user.id, &user.username).await?;
    Ok(Json(AuthResponse {
        user: UserView::private(&user),
        tokens,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let (tokens, _user) = state.tokens.rotate(&body.refresh_token).await?;
    Ok(Json(tokens))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.tokens.revoke(&body.refresh_token).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

fn validate_username(username: &str) -> ApiResult<()> {
    let ok = (3..=30).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "Username must be 3-30 characters of letters, digits, or underscores".to_string(),
        ))
    }
}

fn validate_email(email: &str) -> ApiResult<()> {
    let ok = email.len() <= 254 && email.contains('@') && !email.starts_with('@') && !email.ends_with('@');
    if ok {
        Ok(())
    } else {
        Err(ApiError::Validation("Invalid email address".to_string()))
    }
}

pub(crate) fn validate_display_name(display_name: &str) -> ApiResult<()> {
    if (1..=50).contains(&display_name.chars().count()) {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "Display name must be 1-50 characters".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
        assert!(validate_username("spaced name").is_err());
        assert!(validate_username("dash-ed").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("a@b.c").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("@oops").is_err());
    }

    #[test]
    fn display_name_rules() {
        assert!(validate_display_name("Alice").is_ok());
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name(&"x".repeat(51)).is_err());
    }
}
