//! Tenant Context
//!
//! Every catalog query is scoped to a tenant. The tenant travels with the
//! request as an explicit value instead of being read from process state.

use std::sync::LazyLock;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use thiserror::Error;

use crate::api::AppState;

/// Request header selecting the tenant.
pub const TENANT_HEADER: &str = "x-tenant";

static TENANT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,63}$").unwrap());

/// Tenant resolved for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    slug: String,
}

impl TenantContext {
    /// Build a tenant context from a slug, validating its format.
    pub fn new(slug: impl Into<String>) -> Result<Self, TenantError> {
        let slug = slug.into();
        if TENANT_REGEX.is_match(&slug) {
            Ok(Self { slug })
        } else {
            Err(TenantError::Invalid(slug))
        }
    }

    /// Tenant slug as stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.slug
    }

    /// Resolve from an optional header value, falling back to the default tenant.
    pub fn from_header(header: Option<&str>, default_tenant: &str) -> Result<Self, TenantError> {
        match header.map(str::trim).filter(|h| !h.is_empty()) {
            Some(slug) => Self::new(slug),
            None => Self::new(default_tenant),
        }
    }
}

impl std::fmt::Display for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.slug)
    }
}

/// Tenant resolution errors.
#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Invalid tenant: {0}")]
    Invalid(String),
}

impl IntoResponse for TenantError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "INVALID_TENANT", "message": self.to_string()})),
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for TenantContext {
    type Rejection = TenantError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|h| h.to_str().ok());
        Self::from_header(header, &state.config.default_tenant)
    }
}
