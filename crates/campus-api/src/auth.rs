use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use campus_db::Database;
use campus_gateway::dispatcher::Dispatcher;
use campus_types::api::{Claims, LoginRequest, LoginResponse, SetupRequest};
use campus_types::models::User;

use crate::attachments::AttachmentStore;
use crate::db_call;
use crate::error::ApiError;

const TOKEN_TTL_HOURS: i64 = 24;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub attachments: AttachmentStore,
}

/// POST /setup: create the first admin while no user exists.
pub async fn setup(
    State(state): State<AppState>,
    Json(req): Json<SetupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_credentials(&req.username, &req.password)?;

    let password_hash = hash_password(&req.password)?;
    let display_name = display_name_or_username(req.display_name.as_deref(), req.username.trim());
    let user_id = Uuid::new_v4();

    let db = state.clone();
    let username = req.username.trim().to_string();
    let created = db_call(move || {
        if !db
            .db
            .create_first_admin(user_id, &username, &display_name, &password_hash)?
        {
            return Ok(None);
        }
        db.db.get_user(user_id)
    })
    .await?;

    let user = created.ok_or_else(|| ApiError::Conflict("setup already done".into()))?;
    info!("Setup complete, first admin is {}", user.username);
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let username = req.username.clone();
    let row = db_call(move || db.db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    verify_password(&req.password, &row.password)?;

    let user = row.into_user()?;
    let token = create_token(&state.jwt_secret, &user)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        display_name: user.display_name,
        role: user.role,
        token,
    }))
}

pub(crate) fn validate_credentials(username: &str, password: &str) -> Result<(), ApiError> {
    let len = username.trim().chars().count();
    if !(3..=32).contains(&len) {
        return Err(ApiError::Validation(
            "username must be 3 to 32 characters".into(),
        ));
    }
    if password.is_empty() {
        return Err(ApiError::Validation("password is required".into()));
    }
    Ok(())
}

pub(crate) fn display_name_or_username(display_name: Option<&str>, username: &str) -> String {
    display_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(username)
        .to_string()
}

/// Hash with Argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Storage(anyhow::anyhow!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored_hash: &str) -> Result<(), ApiError> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|e| ApiError::Storage(anyhow::anyhow!("stored hash unreadable: {}", e)))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated)
}

pub fn create_token(secret: &str, user: &User) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        display_name: user.display_name.clone(),
        role: user.role,
        exp: (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_only_with_the_right_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn display_name_falls_back_to_username() {
        assert_eq!(display_name_or_username(None, "marie"), "marie");
        assert_eq!(display_name_or_username(Some("  "), "marie"), "marie");
        assert_eq!(display_name_or_username(Some("Marie C."), "marie"), "Marie C.");
    }

    #[test]
    fn credentials_are_checked() {
        assert!(validate_credentials("ab", "pw").is_err());
        assert!(validate_credentials("abc", "").is_err());
        assert!(validate_credentials("abc", "pw").is_ok());
    }
}
