use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, error};
use uuid::Uuid;

use campus_types::api::{Claims, SendMessageRequest, SendMessageResponse};
use campus_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::db_call;
use crate::error::ApiError;

/// Append one line to the durable log, then push the whole history to every
/// live connection.
///
/// The broadcast happens only after the append committed; a failed append
/// returns the error and publishes nothing. An author that no longer exists
/// is a validation failure. If the history cannot be re-read after a
/// successful append the message still counts as sent and only the
/// broadcast is skipped.
pub async fn submit(state: &AppState, author_id: Uuid, text: String) -> Result<Uuid, ApiError> {
    let message_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    let db = state.clone();
    let appended = db_call(move || {
        let Some(seq) = db.db.append_message(message_id, author_id, &text, now)? else {
            return Ok(None);
        };
        Ok(Some((seq, db.db.list_messages())))
    })
    .await?;

    let Some((seq, history)) = appended else {
        return Err(ApiError::Validation("message author does not exist".into()));
    };

    match history {
        Ok(messages) => {
            let delivered = state
                .dispatcher
                .publish(GatewayEvent::MessagesUpdate { messages })
                .await;
            debug!("Message #{} broadcast to {} connections", seq, delivered);
        }
        Err(e) => {
            error!("Message #{} stored but history reload failed: {:#}", seq, e);
        }
    }

    Ok(message_id)
}

/// POST /messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::Validation("message text is empty".into()));
    }

    let id = submit(&state, claims.sub, req.text).await?;
    Ok((StatusCode::CREATED, Json(SendMessageResponse { id })))
}

/// GET /messages: the entire log, newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let messages = db_call(move || db.db.list_messages()).await?;
    Ok(Json(messages))
}
