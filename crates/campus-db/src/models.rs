//! Database row types. These map directly to SQLite rows and are converted
//! into the `campus-types` models once ids and timestamps have been parsed.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use campus_types::models::{ChatMessage, Diploma, GradeRecord, Role, User};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

pub struct GradeRow {
    pub id: String,
    pub user_id: String,
    pub author_id: String,
    pub subject: String,
    pub score: f64,
    pub weight: Option<f64>,
    pub attachment: Option<String>,
    pub created_at: String,
}

pub struct DiplomaRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub average: f64,
    pub issued_at: String,
    pub attachment: Option<String>,
}

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub author_id: String,
    pub author_display_name: Option<String>,
    pub text: String,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_uuid(&self.id)?,
            role: self.role.parse::<Role>()?,
            created_at: parse_timestamp(&self.created_at)?,
            username: self.username,
            display_name: self.display_name,
        })
    }
}

impl GradeRow {
    pub fn into_record(self) -> Result<GradeRecord> {
        Ok(GradeRecord {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            author_id: parse_uuid(&self.author_id)?,
            created_at: parse_timestamp(&self.created_at)?,
            subject: self.subject,
            score: self.score,
            weight: self.weight,
            attachment: self.attachment,
        })
    }
}

impl DiplomaRow {
    pub fn into_diploma(self) -> Result<Diploma> {
        Ok(Diploma {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            issued_at: parse_timestamp(&self.issued_at)?,
            title: self.title,
            average: self.average,
            attachment: self.attachment,
        })
    }
}

impl MessageRow {
    pub fn into_message(self) -> Result<ChatMessage> {
        Ok(ChatMessage {
            id: parse_uuid(&self.id)?,
            seq: self.seq,
            author_id: parse_uuid(&self.author_id)?,
            created_at: parse_timestamp(&self.created_at)?,
            author_display_name: self.author_display_name,
            text: self.text,
        })
    }
}

pub fn parse_uuid(raw: &str) -> Result<Uuid> {
    raw.parse::<Uuid>()
        .with_context(|| format!("Corrupt id '{}'", raw))
}

/// Timestamps are written as RFC 3339. Rows produced by SQLite's
/// `datetime('now')` ("YYYY-MM-DD HH:MM:SS", no zone) are read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("Corrupt timestamp '{}'", raw))
}
