use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Diploma, GradeRecord, Role, User};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub exp: usize,
}

// -- Setup / Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub token: String,
}

// -- Admin user management --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// Returned once after creation or reset; the plain password is never stored.
#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedCredentials {
    pub user: User,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub id: Uuid,
}

// -- Attachments --

/// Inline upload: `data` is base64.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentUpload {
    pub filename: String,
    pub data: String,
}

// -- Grades --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitGradeRequest {
    pub user_id: Uuid,
    pub subject: String,
    pub score: f64,
    pub weight: Option<f64>,
    pub attachment: Option<AttachmentUpload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeView {
    #[serde(flatten)]
    pub record: GradeRecord,
    pub student_name: Option<String>,
    pub author_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AverageResponse {
    pub user_id: Uuid,
    pub average: f64,
}

// -- Diplomas --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssueDiplomaRequest {
    pub user_id: Uuid,
    pub title: Option<String>,
    pub attachment: Option<AttachmentUpload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiplomaView {
    #[serde(flatten)]
    pub diploma: Diploma,
    pub display_name: Option<String>,
}

/// Outcome of the advisory attachment cleanup that follows a row deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupOutcome {
    NoAttachment,
    Removed,
    Failed { reason: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub attachment: CleanupOutcome,
    pub deleted_at: DateTime<Utc>,
}
