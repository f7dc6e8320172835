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
use campus_types::api::{
    AverageResponse, Claims, CleanupOutcome, DeletedResponse, SubmitGradeRequest,
};
use campus_types::models::GradeRecord;

use crate::access::{self, Resource};
use crate::auth::AppState;
use crate::db_call;
use crate::error::ApiError;

/// Coefficient used when a grade carries none.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Σ(score·weight) / Σweight over `grades`, or exactly 0 when the weights sum
/// to zero (including the empty set). Weights and scores are not validated.
pub fn weighted_average(grades: &[GradeRecord]) -> f64 {
    let (sum, total_weight) = grades.iter().fold((0.0, 0.0), |(sum, total), grade| {
        let weight = grade.weight.unwrap_or(DEFAULT_WEIGHT);
        (sum + grade.score * weight, total + weight)
    });

    if total_weight != 0.0 {
        sum / total_weight
    } else {
        0.0
    }
}

/// Average over the grades currently stored for `user_id`.
pub fn compute_weighted_average(db: &Database, user_id: Uuid) -> anyhow::Result<f64> {
    let grades = db.grades_for_user(user_id)?;
    Ok(weighted_average(&grades))
}

/// POST /grades (admin)
pub async fn submit_grade(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitGradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    access::ensure_admin(&claims)?;

    let subject = req.subject.trim().to_string();
    if subject.is_empty() {
        return Err(ApiError::Validation("subject is required".into()));
    }
    if !req.score.is_finite() || req.weight.is_some_and(|w| !w.is_finite()) {
        return Err(ApiError::Validation("score and weight must be numbers".into()));
    }

    let upload = match &req.attachment {
        Some(upload) => Some((upload.filename.clone(), state.attachments.decode(upload)?)),
        None => None,
    };

    let attachment = match upload {
        Some((filename, bytes)) => Some(state.attachments.save(&filename, &bytes).await?),
        None => None,
    };

    let grade = GradeRecord {
        id: Uuid::new_v4(),
        user_id: req.user_id,
        author_id: claims.sub,
        subject,
        score: req.score,
        weight: req.weight,
        attachment,
        created_at: Utc::now(),
    };

    let db = state.clone();
    let record = grade.clone();
    if let Err(e) = db_call(move || db.db.insert_grade(&record)).await {
        // The row never existed, so the file it would have referenced goes too.
        state.attachments.cleanup(grade.attachment.as_deref()).await;
        return Err(e);
    }

    info!(
        "{} recorded {} in {} for {}",
        claims.username, grade.score, grade.subject, grade.user_id
    );
    Ok((StatusCode::CREATED, Json(grade)))
}

/// GET /grades: own grades for students, everything for staff.
pub async fn list_grades(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = access::listing_scope(Resource::Grades, &claims);
    let db = state.clone();
    let grades = db_call(move || db.db.list_grades(scope)).await?;
    Ok(Json(grades))
}

/// GET /users/{user_id}/average
pub async fn get_average(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if !access::can_view(Resource::Grades, claims.role, user_id, claims.sub) {
        return Err(ApiError::AccessDenied("cannot view this user's grades".into()));
    }

    let db = state.clone();
    let average = db_call(move || compute_weighted_average(&db.db, user_id)).await?;
    Ok(Json(AverageResponse { user_id, average }))
}

/// DELETE /grades/{grade_id} (admin): the row goes first, the attachment
/// file is removed afterwards on a best-effort basis.
pub async fn delete_grade(
    State(state): State<AppState>,
    Path(grade_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    access::ensure_admin(&claims)?;

    let db = state.clone();
    let removed = db_call(move || {
        let Some(grade) = db.db.get_grade(grade_id)? else {
            return Ok(None);
        };
        if !db.db.delete_grade(grade_id)? {
            return Ok(None);
        }
        Ok(Some(grade))
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("grade {}", grade_id)))?;

    let attachment = state.attachments.cleanup(removed.attachment.as_deref()).await;
    if attachment != CleanupOutcome::NoAttachment {
        info!("Grade {} deleted, attachment cleanup: {:?}", grade_id, attachment);
    }

    Ok(Json(DeletedResponse {
        id: grade_id,
        attachment,
        deleted_at: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(score: f64, weight: Option<f64>) -> GradeRecord {
        GradeRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            author_id: Uuid::nil(),
            subject: "History".into(),
            score,
            weight,
            attachment: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn weighted_mean_of_scores() {
        let grades = [grade(10.0, Some(2.0)), grade(16.0, Some(1.0))];
        assert_eq!(weighted_average(&grades), 12.0);
    }

    #[test]
    fn no_grades_average_to_zero() {
        let avg = weighted_average(&[]);
        assert_eq!(avg, 0.0);
        assert!(!avg.is_nan());
    }

    #[test]
    fn missing_weight_counts_as_one() {
        let implicit = [grade(8.0, None), grade(14.0, None)];
        let explicit = [grade(8.0, Some(1.0)), grade(14.0, Some(1.0))];
        assert_eq!(weighted_average(&implicit), 11.0);
        assert_eq!(weighted_average(&implicit), weighted_average(&explicit));
    }

    #[test]
    fn zero_weight_sum_is_guarded() {
        assert_eq!(weighted_average(&[grade(18.0, Some(0.0))]), 0.0);
        // Weights cancelling out hit the same guard.
        assert_eq!(weighted_average(&[grade(10.0, Some(1.0)), grade(20.0, Some(-1.0))]), 0.0);
    }

    #[test]
    fn negative_weights_are_not_rejected() {
        let grades = [grade(10.0, Some(3.0)), grade(20.0, Some(-1.0))];
        assert_eq!(weighted_average(&grades), 5.0);
    }

    #[test]
    fn average_reflects_current_grades() {
        let db = Database::open_in_memory().unwrap();
        let student = Uuid::new_v4();
        assert_eq!(compute_weighted_average(&db, student).unwrap(), 0.0);

        let mut g = grade(10.0, Some(2.0));
        g.user_id = student;
        db.insert_grade(&g).unwrap();
        let mut g = grade(16.0, None);
        g.user_id = student;
        db.insert_grade(&g).unwrap();

        assert_eq!(compute_weighted_average(&db, student).unwrap(), 12.0);
    }
}
