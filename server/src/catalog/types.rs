//! Catalog request/response types and errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::db::{Content, Module};

use super::module_types::ModuleTypeSummary;

// ============================================================================
// Errors
// ============================================================================

/// Catalog API error type.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Missing, or hidden from the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Name or Discord role already used in this tenant.
    #[error("{0}")]
    Conflict(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Database(e) => {
                tracing::error!(error = %e, "Catalog database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        (
            status,
            Json(serde_json::json!({"error": code, "message": self.to_string()})),
        )
            .into_response()
    }
}

impl From<validator::ValidationErrors> for CatalogError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Map a unique violation to a conflict, anything else to a database error.
pub fn conflict_or(e: sqlx::Error, message: &str) -> CatalogError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            CatalogError::Conflict(message.to_string())
        }
        _ => CatalogError::Database(e),
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Largest page size a listing accepts.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Normalized page/limit/offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Clamp raw query values: page at least 1, limit within `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE),
        }
    }

    #[must_use]
    pub const fn offset(self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// `ILIKE` pattern matching `term` anywhere, with wildcards in `term` escaped.
#[must_use]
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Trimmed search term, `None` when blank.
#[must_use]
pub fn search_term(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// Modules
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListModulesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub type_id: Option<Uuid>,
}

/// Module with its type and ordered lessons.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleResponse {
    #[serde(flatten)]
    pub module: Module,
    #[serde(rename = "type")]
    pub module_type: Option<ModuleTypeSummary>,
    pub contents: Vec<Content>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub description: String,
    /// `None` publishes the module to everyone.
    pub type_id: Option<Uuid>,
}

// ============================================================================
// Content
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListContentQuery {
    pub module_id: Option<Uuid>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub module_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, max = 2048))]
    pub video_url: String,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReorderItem {
    pub id: Uuid,
    pub order: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub items: Vec<ReorderItem>,
}

// ============================================================================
// Module Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTypeRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Discord role granting this type. Empty or absent clears the mapping.
    pub discord_role_id: Option<String>,
    #[serde(default)]
    pub is_aio: bool,
}

impl ModuleTypeRequest {
    /// Trimmed role id, `None` when blank.
    #[must_use]
    pub fn role_id(&self) -> Option<&str> {
        self.discord_role_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
