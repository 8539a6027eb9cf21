//! Admin module types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use lms_common::{AccountStatus, UserRole};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::catalog::module_types::ModuleTypeSummary;
use crate::entitlements::GrantError;

/// Admin API error type.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Caller is not an Admin or Superadmin.
    #[error("Admin privileges required")]
    NotAdmin,

    /// Caller is not a Superadmin.
    #[error("Superadmin privileges required")]
    NotSuperadmin,

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Validation error.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Email already registered.
    #[error("{0}")]
    Conflict(String),

    /// Database error.
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Password hashing failed")]
    PasswordHash,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::NotAdmin => (StatusCode::FORBIDDEN, serde_json::json!({"error": "not_admin", "message": "Admin privileges required"})),
            Self::NotSuperadmin => (StatusCode::FORBIDDEN, serde_json::json!({"error": "not_superadmin", "message": "Superadmin privileges required"})),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, serde_json::json!({"error": "not_found", "message": format!("{what} not found")})),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({"error": "validation", "message": msg})),
            Self::Conflict(msg) => (StatusCode::CONFLICT, serde_json::json!({"error": "conflict", "message": msg})),
            Self::Database(e) => {
                tracing::error!(error = %e, "Admin database error");
                (StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({"error": "database", "message": "Database error"}))
            }
            Self::PasswordHash => (StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({"error": "internal", "message": "Internal server error"})),
        };
        (status, Json(body)).into_response()
    }
}

impl From<GrantError> for AdminError {
    fn from(e: GrantError) -> Self {
        match e {
            GrantError::UnknownType(id) => Self::Validation(format!("Unknown module type: {id}")),
            GrantError::Database(e) => Self::Database(e),
        }
    }
}

impl From<validator::ValidationErrors> for AdminError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Roles an administrator may hand out.
fn check_assignable(role: UserRole) -> Result<UserRole, AdminError> {
    match role {
        UserRole::User | UserRole::Admin => Ok(role),
        UserRole::Superadmin => Err(AdminError::Validation(
            "Role must be USER or ADMIN".to_string(),
        )),
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListUsersParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub module_type_ids: Vec<Uuid>,
}

impl CreateUserRequest {
    pub fn role(&self) -> Result<UserRole, AdminError> {
        check_assignable(self.role)
    }
}

/// Partial user update. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub role: Option<UserRole>,
    /// Replaces every manual grant in the tenant.
    pub module_type_ids: Option<Vec<Uuid>>,
    pub status: Option<AccountStatus>,
    pub is_trial: Option<bool>,
    /// `Some(None)` clears the end date.
    #[serde(default, deserialize_with = "explicit_null")]
    pub trial_ends_at: Option<Option<DateTime<Utc>>>,
}

impl UpdateUserRequest {
    pub fn role(&self) -> Result<Option<UserRole>, AdminError> {
        self.role.map(check_assignable).transpose()
    }
}

/// Distinguish a missing field from an explicit `null`.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub month: u32,
    pub year: i32,
}

// ============================================================================
// Responses
// ============================================================================

/// User as seen by administrators, with grants in the request tenant.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub status: AccountStatus,
    pub is_trial: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub discord_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub module_types: Vec<ModuleTypeSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superadmin_is_not_assignable() {
        let req: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "name": "Eve",
            "email": "eve@example.com",
            "password": "secret1",
            "role": "SUPERADMIN"
        }))
        .unwrap();
        assert!(matches!(req.role(), Err(AdminError::Validation(_))));

        let req: UpdateUserRequest =
            serde_json::from_value(serde_json::json!({"role": "ADMIN"})).unwrap();
        assert_eq!(req.role().unwrap(), Some(UserRole::Admin));
    }

    #[test]
    fn test_create_defaults_to_user_without_grants() {
        let req: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "name": "Ann",
            "email": "ann@example.com",
            "password": "secret1"
        }))
        .unwrap();
        assert_eq!(req.role().unwrap(), UserRole::User);
        assert!(req.module_type_ids.is_empty());
    }

    #[test]
    fn test_short_password_rejected() {
        let req: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "name": "Ann",
            "email": "ann@example.com",
            "password": "12345"
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_trial_end_null_vs_absent() {
        let absent: UpdateUserRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(absent.trial_ends_at, None);

        let cleared: UpdateUserRequest =
            serde_json::from_value(serde_json::json!({"trialEndsAt": null})).unwrap();
        assert_eq!(cleared.trial_ends_at, Some(None));

        let set: UpdateUserRequest = serde_json::from_value(
            serde_json::json!({"trialEndsAt": "2026-03-31T00:00:00Z", "isTrial": true}),
        )
        .unwrap();
        assert!(set.trial_ends_at.is_some_and(|d| d.is_some()));
        assert_eq!(set.is_trial, Some(true));
    }

    #[test]
    fn test_unknown_grant_maps_to_validation() {
        let id = Uuid::new_v4();
        assert!(matches!(
            AdminError::from(GrantError::UnknownType(id)),
            AdminError::Validation(msg) if msg.contains(&id.to_string())
        ));
    }
}
