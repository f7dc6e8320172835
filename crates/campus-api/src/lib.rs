pub mod access;
pub mod attachments;
pub mod auth;
pub mod diplomas;
pub mod error;
pub mod grades;
pub mod messages;
pub mod middleware;
pub mod users;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use tower_http::services::ServeDir;
use tracing::error;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// Every route except the WebSocket gateway, which the server binary mounts
/// next to it.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/setup", post(auth::setup))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/messages", get(messages::get_messages).post(messages::send_message))
        .route("/grades", get(grades::list_grades).post(grades::submit_grade))
        .route("/grades/{grade_id}", delete(grades::delete_grade))
        .route("/users/{user_id}/average", get(grades::get_average))
        .route("/diplomas", get(diplomas::list_diplomas).post(diplomas::issue_diploma))
        .route("/diplomas/{diploma_id}", delete(diplomas::revoke_diploma))
        .route("/admin/users", get(users::list_users).post(users::create_user))
        .route("/admin/users/{user_id}", delete(users::delete_user))
        .route("/admin/users/{user_id}/reset-password", post(users::reset_password))
        .route("/admin/users/{user_id}/role", put(users::update_role))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/uploads", ServeDir::new(state.attachments.dir()))
}

/// Run a blocking Record Store call off the async runtime.
pub(crate) async fn db_call<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Storage(anyhow::anyhow!("background task failed: {}", e))
        })?
        .map_err(ApiError::Storage)
}
