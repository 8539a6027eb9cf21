//! Authentication Middleware

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use lms_common::{AccountStatus, UserRole};
use uuid::Uuid;

use super::error::{AuthError, SessionError};
use super::jwt::validate_access_token;
use crate::api::AppState;
use crate::db::{find_user_by_id, User};
use crate::entitlements::{gate, GateDecision, GateSubject, RoleSet};

/// Authenticated user injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub status: AccountStatus,
    pub is_trial: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub discord_id: Option<String>,
    /// Guild roles carried by the access token.
    pub external_roles: RoleSet,
}

impl AuthUser {
    #[must_use]
    pub fn from_user(user: User, external_roles: RoleSet) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            status: user.status,
            is_trial: user.is_trial,
            trial_ends_at: user.trial_ends_at,
            discord_id: user.discord_id,
            external_roles,
        }
    }

    /// Facts the session gate looks at.
    #[must_use]
    pub fn gate_subject(&self) -> GateSubject<'_> {
        GateSubject {
            discord_id: self.discord_id.as_deref(),
            is_trial: self.is_trial,
            trial_ends_at: self.trial_ends_at,
        }
    }
}

/// Middleware to require authentication.
///
/// Validates the Bearer access token, loads the user and injects
/// [`AuthUser`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    let claims = validate_access_token(token, &state.config.jwt_public_key)?;

    let user_id: Uuid = claims
        .sub
        .parse()
        .map_err(|_| AuthError::InvalidToken)?;

    let user = find_user_by_id(&state.db, user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    let auth_user = AuthUser::from_user(user, claims.ext_roles.into_iter().collect());
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Middleware running the session gate. Must be layered inside `require_auth`.
pub async fn require_session_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, SessionError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(SessionError::Unauthenticated)?;

    let decision = gate::evaluate(
        &auth_user.gate_subject(),
        Utc::now(),
        state.config.trial_offset(),
    );

    if let GateDecision::Deny(denial) = decision {
        tracing::info!(user_id = %auth_user.id, reason = denial.code(), "Session gate denied request");
        return Err(SessionError::Denied(denial));
    }

    Ok(next.run(request).await)
}

/// Extractor for the authenticated user in handlers.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)
    }
}
