//! Admin authorization middleware.
//!
//! Runs after `require_auth`, so [`AuthUser`] is already in the extensions.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use super::types::AdminError;
use crate::auth::AuthUser;

/// Middleware that requires an Admin or Superadmin.
#[tracing::instrument(skip(request, next))]
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AdminError> {
    let role = request
        .extensions()
        .get::<AuthUser>()
        .map(|auth| auth.role)
        .ok_or(AdminError::NotAdmin)?;

    if !role.is_admin() {
        return Err(AdminError::NotAdmin);
    }

    Ok(next.run(request).await)
}

/// Middleware that requires a Superadmin.
#[tracing::instrument(skip(request, next))]
pub async fn require_superadmin(request: Request, next: Next) -> Result<Response, AdminError> {
    let role = request
        .extensions()
        .get::<AuthUser>()
        .map(|auth| auth.role)
        .ok_or(AdminError::NotSuperadmin)?;

    if !role.is_superadmin() {
        return Err(AdminError::NotSuperadmin);
    }

    Ok(next.run(request).await)
}
