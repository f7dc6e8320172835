use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use campus_db::Database;
use campus_types::api::{Claims, CleanupOutcome, DeletedResponse, IssueDiplomaRequest};
use campus_types::models::Diploma;

use crate::access::{self, Resource};
use crate::auth::AppState;
use crate::db_call;
use crate::error::ApiError;
use crate::grades::compute_weighted_average;

/// Title used when none (or only whitespace) is given.
pub const DEFAULT_TITLE: &str = "Diploma";

/// Create a diploma for `user_id` carrying the average of their grades as
/// they are right now. The stored average is never refreshed afterwards.
pub fn issue(
    db: &Database,
    user_id: Uuid,
    title: Option<&str>,
    attachment: Option<String>,
) -> anyhow::Result<Diploma> {
    let average = compute_weighted_average(db, user_id)?;

    let diploma = Diploma {
        id: Uuid::new_v4(),
        user_id,
        title: title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string(),
        average,
        issued_at: Utc::now(),
        attachment,
    };

    db.insert_diploma(&diploma)?;
    Ok(diploma)
}

/// Delete a diploma, then remove its attachment. The two steps report
/// separately: once the row is gone the revoke has succeeded, whatever
/// happens to the file.
pub async fn revoke(state: &AppState, diploma_id: Uuid) -> Result<CleanupOutcome, ApiError> {
    let db = state.clone();
    let removed = db_call(move || {
        let Some(diploma) = db.db.get_diploma(diploma_id)? else {
            return Ok(None);
        };
        if !db.db.delete_diploma(diploma_id)? {
            return Ok(None);
        }
        Ok(Some(diploma))
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("diploma {}", diploma_id)))?;

    Ok(state.attachments.cleanup(removed.attachment.as_deref()).await)
}

/// POST /diplomas (admin)
pub async fn issue_diploma(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<IssueDiplomaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    access::ensure_admin(&claims)?;

    let upload = match &req.attachment {
        Some(upload) => Some((upload.filename.clone(), state.attachments.decode(upload)?)),
        None => None,
    };

    let db = state.clone();
    let user_id = req.user_id;
    if db_call(move || db.db.get_user(user_id)).await?.is_none() {
        return Err(ApiError::NotFound(format!("user {}", user_id)));
    }

    let attachment = match upload {
        Some((filename, bytes)) => Some(state.attachments.save(&filename, &bytes).await?),
        None => None,
    };

    let db = state.clone();
    let title = req.title;
    let stored = attachment.clone();
    let diploma = match db_call(move || issue(&db.db, user_id, title.as_deref(), stored)).await {
        Ok(diploma) => diploma,
        Err(e) => {
            state.attachments.cleanup(attachment.as_deref()).await;
            return Err(e);
        }
    };

    info!(
        "{} issued '{}' to {} with average {:.2}",
        claims.username, diploma.title, diploma.user_id, diploma.average
    );
    Ok((StatusCode::CREATED, Json(diploma)))
}

/// GET /diplomas: own diplomas, or all of them for admins.
pub async fn list_diplomas(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = access::listing_scope(Resource::Diplomas, &claims);
    let db = state.clone();
    let diplomas = db_call(move || db.db.list_diplomas(scope)).await?;
    Ok(Json(diplomas))
}

/// DELETE /diplomas/{diploma_id} (admin)
pub async fn revoke_diploma(
    State(state): State<AppState>,
    Path(diploma_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    access::ensure_admin(&claims)?;

    let attachment = revoke(&state, diploma_id).await?;
    info!("{} revoked diploma {}", claims.username, diploma_id);

    Ok(Json(DeletedResponse {
        id: diploma_id,
        attachment,
        deleted_at: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use campus_types::models::{GradeRecord, Role};

    fn grade(user_id: Uuid, score: f64, weight: Option<f64>) -> GradeRecord {
        GradeRecord {
            id: Uuid::new_v4(),
            user_id,
            author_id: Uuid::nil(),
            subject: "Physics".into(),
            score,
            weight,
            attachment: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_average_is_a_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let student = Uuid::new_v4();
        let first = grade(student, 10.0, Some(2.0));
        db.insert_grade(&first).unwrap();
        db.insert_grade(&grade(student, 16.0, Some(1.0))).unwrap();

        let diploma = issue(&db, student, Some("Baccalauréat"), None).unwrap();
        assert_eq!(diploma.average, 12.0);

        db.insert_grade(&grade(student, 0.0, Some(5.0))).unwrap();
        db.delete_grade(first.id).unwrap();
        assert_ne!(compute_weighted_average(&db, student).unwrap(), 12.0);

        let reread = db.get_diploma(diploma.id).unwrap().unwrap();
        assert_eq!(reread.average, 12.0);
        assert_eq!(reread.title, "Baccalauréat");
    }

    #[test]
    fn ungraded_student_gets_zero_average() {
        let db = Database::open_in_memory().unwrap();
        let diploma = issue(&db, Uuid::new_v4(), None, None).unwrap();
        assert_eq!(diploma.average, 0.0);
        assert_eq!(diploma.title, DEFAULT_TITLE);
    }

    #[test]
    fn blank_title_uses_default() {
        let db = Database::open_in_memory().unwrap();
        let diploma = issue(&db, Uuid::new_v4(), Some("   "), None).unwrap();
        assert_eq!(diploma.title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn revoke_removes_row_and_file() {
        let state = test_support::state().await;
        let student = test_support::add_user(&state, "eve", Role::Student);
        let reference = state.attachments.save("cert.pdf", b"%PDF").await.unwrap();
        let diploma = issue(&state.db, student, None, Some(reference.clone())).unwrap();

        let outcome = revoke(&state, diploma.id).await.unwrap();
        assert_eq!(outcome, CleanupOutcome::Removed);
        assert!(state.db.get_diploma(diploma.id).unwrap().is_none());
        let name = reference.trim_start_matches("/uploads/");
        assert!(!state.attachments.dir().join(name).exists());
    }

    #[tokio::test]
    async fn revoke_succeeds_when_file_cleanup_fails() {
        let state = test_support::state().await;
        let diploma = issue(
            &state.db,
            Uuid::new_v4(),
            None,
            Some("/somewhere/else.pdf".into()),
        )
        .unwrap();

        let outcome = revoke(&state, diploma.id).await.unwrap();
        assert!(matches!(outcome, CleanupOutcome::Failed { .. }));
        assert!(state.db.get_diploma(diploma.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn revoking_unknown_diploma_is_not_found() {
        let state = test_support::state().await;
        let result = revoke(&state, Uuid::new_v4()).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
