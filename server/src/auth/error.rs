//! Authentication Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::discord::OAuthError;
use crate::entitlements::GateDenial;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email, wrong password, or an account without a password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Account has been deactivated.
    #[error("Account is inactive")]
    AccountInactive,

    /// Trial period has ended.
    #[error("Trial period has expired")]
    TrialExpired,

    /// User not found.
    #[error("User not found")]
    UserNotFound,

    /// Invalid or expired token.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Missing Authorization header.
    #[error("Missing authorization header")]
    MissingAuthHeader,

    /// Invalid authorization header format.
    #[error("Invalid authorization header format")]
    InvalidAuthHeader,

    /// Validation error.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Password hashing error.
    #[error("Password processing failed")]
    PasswordHash,

    /// Discord login is not configured on this server.
    #[error("Discord login is not configured")]
    DiscordNotConfigured,

    /// OAuth state unknown, expired or replayed.
    #[error("Login state is invalid or expired")]
    OAuthStateMismatch,

    /// Discord rejected or failed the login.
    #[error("Discord login failed")]
    DiscordLogin(#[from] OAuthError),

    /// Database error.
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    /// JWT error.
    #[error("Token error")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Internal server error.
    #[error("Internal server error")]
    Internal(String),
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            Self::AccountInactive => (StatusCode::UNAUTHORIZED, "ACCOUNT_INACTIVE"),
            Self::TrialExpired => (StatusCode::UNAUTHORIZED, "TRIAL_EXPIRED"),
            Self::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            Self::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            Self::MissingAuthHeader => (StatusCode::UNAUTHORIZED, "MISSING_AUTH"),
            Self::InvalidAuthHeader => (StatusCode::UNAUTHORIZED, "INVALID_AUTH_HEADER"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::DiscordNotConfigured => (StatusCode::SERVICE_UNAVAILABLE, "DISCORD_NOT_CONFIGURED"),
            Self::OAuthStateMismatch => (StatusCode::BAD_REQUEST, "INVALID_STATE"),
            Self::DiscordLogin(e) => {
                tracing::warn!(error = %e, "Discord login failed");
                (StatusCode::BAD_GATEWAY, "DISCORD_LOGIN_FAILED")
            }
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error during authentication");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal authentication error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            Self::PasswordHash => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Jwt(_) => (StatusCode::UNAUTHORIZED, "TOKEN_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Session gate rejection. Sends the client back to the login page.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Gate ran without an authenticated user.
    #[error("Missing authorization header")]
    Unauthenticated,

    #[error("Session denied: {}", .0.code())]
    Denied(GateDenial),
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => AuthError::MissingAuthHeader.into_response(),
            Self::Denied(denial) => Redirect::to(denial.reauth_location()).into_response(),
        }
    }
}
