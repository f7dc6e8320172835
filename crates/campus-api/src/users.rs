use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use campus_types::api::{Claims, CreateUserRequest, IssuedCredentials, UpdateRoleRequest};

use crate::access;
use crate::auth::{AppState, display_name_or_username, hash_password, validate_credentials};
use crate::db_call;
use crate::error::ApiError;

/// Short throwaway password handed to the admin: the first group of a v4 UUID.
pub fn generate_password() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    access::ensure_admin(&claims)?;
    let db = state.clone();
    Ok(Json(db_call(move || db.db.list_users()).await?))
}

/// POST /admin/users: a blank password is replaced by a generated one,
/// returned once in the response.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    access::ensure_admin(&claims)?;

    let password = req
        .password
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(generate_password);
    validate_credentials(&req.username, &password)?;

    let password_hash = hash_password(&password)?;
    let display_name = display_name_or_username(req.display_name.as_deref(), req.username.trim());
    let user_id = Uuid::new_v4();
    let username = req.username.trim().to_string();
    let role = req.role;

    let db = state.clone();
    let user = db_call(move || {
        if db.db.get_user_by_username(&username)?.is_some() {
            return Ok(None);
        }
        db.db
            .create_user(user_id, &username, &display_name, &password_hash, role)?;
        db.db.get_user(user_id)
    })
    .await?
    .ok_or_else(|| ApiError::Conflict("username already taken".into()))?;

    info!("{} created {} account {}", claims.username, user.role, user.username);
    Ok((StatusCode::CREATED, Json(IssuedCredentials { user, password })))
}

/// DELETE /admin/users/{user_id}: the user's grades, diplomas and messages
/// are left in place.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    access::ensure_admin(&claims)?;
    if user_id == claims.sub {
        return Err(ApiError::Validation("cannot delete your own account".into()));
    }

    let db = state.clone();
    if !db_call(move || db.db.delete_user(user_id)).await? {
        return Err(ApiError::NotFound(format!("user {}", user_id)));
    }

    info!("{} deleted user {}", claims.username, user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/users/{user_id}/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    access::ensure_admin(&claims)?;

    let password = generate_password();
    let password_hash = hash_password(&password)?;

    let db = state.clone();
    let user = db_call(move || {
        if !db.db.update_password(user_id, &password_hash)? {
            return Ok(None);
        }
        db.db.get_user(user_id)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("user {}", user_id)))?;

    info!("{} reset the password of {}", claims.username, user.username);
    Ok(Json(IssuedCredentials { user, password }))
}

/// PUT /admin/users/{user_id}/role
pub async fn update_role(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    access::ensure_admin(&claims)?;

    let db = state.clone();
    let role = req.role;
    let user = db_call(move || {
        if !db.db.update_role(user_id, role)? {
            return Ok(None);
        }
        db.db.get_user(user_id)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("user {}", user_id)))?;

    info!("{} set role of {} to {}", claims.username, user.username, user.role);
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_are_short_hex() {
        let pw = generate_password();
        assert_eq!(pw.len(), 8);
        assert!(pw.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(pw, generate_password());
    }
}
