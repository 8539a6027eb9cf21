//! Database Models

use chrono::{DateTime, Utc};
use lms_common::{AccountStatus, UserRole, VideoSource};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// User model.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub role: UserRole,
    pub status: AccountStatus,
    pub is_trial: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub discord_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Module (course) model.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: Uuid,
    #[serde(skip)]
    pub tenant: String,
    pub title: String,
    pub description: String,
    pub type_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lesson model.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub video_source: VideoSource,
    pub thumbnail: Option<String>,
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session model for refresh token tracking.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    /// Session ID.
    pub id: Uuid,
    /// User this session belongs to.
    pub user_id: Uuid,
    /// SHA256 hash of the refresh token.
    pub token_hash: String,
    /// When the session/token expires.
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
