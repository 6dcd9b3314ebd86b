//! Access/refresh token handling and the bearer-auth middleware.
//!
//! Access tokens are short-lived signed JWTs; refresh tokens are opaque
//! random strings persisted with a 7-day expiry and rotated on every use.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use palaver_store::{RefreshToken, User};

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, Db};

const ACCESS_TTL_MINUTES: i64 = 15;
const REFRESH_TTL_DAYS: i64 = 7;

/// JWT claims for access tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated principal, attached to requests by the middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    db: Db,
}

impl TokenService {
    pub fn new(secret: &str, db: Db) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            db,
        }
    }

    /// Issue a fresh access/refresh pair for a user.
    pub async fn issue(&self, user_id: Uuid, username: &str) -> ApiResult<TokenPair> {
        let db = self.db.lock().await;
        self.issue_locked(&db, user_id, username)
    }

    fn issue_locked(
        &self,
        db: &palaver_store::Database,
        user_id: Uuid,
        username: &str,
    ) -> ApiResult<TokenPair> {
        let access_token = self.sign_access(user_id, username)?;

        let now = Utc::now();
        let refresh = RefreshToken {
            token: generate_refresh_token(),
            user_id,
            expires_at: now + Duration::days(REFRESH_TTL_DAYS),
            created_at: now,
        };
        db.insert_refresh_token(&refresh)?;

        Ok(TokenPair {
            access_token,
            refresh_token: refresh.token,
        })
    }

    fn sign_access(&self, user_id: Uuid, username: &str) -> ApiResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            token_type: "access".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(ACCESS_TTL_MINUTES)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("failed to sign access token: {e}")))
    }

    /// Validate an access token's signature, expiry, and type.
    pub fn verify_access(&self, token: &str) -> ApiResult<AuthUser> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| ApiError::Authentication("Invalid or expired token".to_string()))?;

        if data.claims.token_type != "access" {
            return Err(ApiError::Authentication("Invalid or expired token".to_string()));
        }

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ApiError::Authentication("Invalid or expired token".to_string()))?;

        Ok(AuthUser {
            user_id,
            username: data.claims.username,
        })
    }

    /// Single-use rotation: the presented token is deleted and a new pair is
    /// issued in the same critical section. Replays fail because the second
    /// delete finds nothing.
    pub async fn rotate(&self, refresh_token: &str) -> ApiResult<(TokenPair, User)> {
        let db = self.db.lock().await;

        let row = db
            .get_refresh_token(refresh_token)?
            .ok_or_else(|| ApiError::Authentication("Invalid refresh token".to_string()))?;

        if row.is_expired(Utc::now()) {
            // Expiry discovery deletes the stored row in the same step.
            db.delete_refresh_token(refresh_token)?;
            return Err(ApiError::Authentication("Invalid refresh token".to_string()));
        }

        if !db.delete_refresh_token(refresh_token)? {
            return Err(ApiError::Authentication("Invalid refresh token".to_string()));
        }

        let user = db.get_user(row.user_id)?;
        let pair = self.issue_locked(&db, user.id, &user.username)?;
        Ok((pair, user))
    }

    /// Delete a refresh token. Unknown tokens are a no-op.
    pub async fn revoke(&self, refresh_token: &str) -> ApiResult<()> {
        let db = self.db.lock().await;
        db.delete_refresh_token(refresh_token)?;
        Ok(())
    }
}

/// 32 random bytes, hex-encoded: 256 bits of entropy.
fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> ApiResult<bool> {
    bcrypt::verify(password, hash)
        .map_err(|e| ApiError::Internal(format!("password verification failed: {e}")))
}

/// Bearer-token middleware for the protected API routes. Attaches [`AuthUser`]
/// as a request extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Authentication("Missing access token".to_string()))?;

    let auth = state.tokens.verify_access(token)?;
    request.extensions_mut().insert(auth);
    Ok(next.run(request).await)
}
