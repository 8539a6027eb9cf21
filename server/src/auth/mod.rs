//! Authentication Service
//!
//! Handles credential login, Discord login and session management.

mod error;
mod handlers;
pub mod jwt;
mod middleware;
pub mod password;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sha2::{Digest, Sha256};

use crate::api::AppState;

pub use error::{AuthError, AuthResult, SessionError};
pub use handlers::get_profile;
pub use middleware::{require_auth, require_session_gate, AuthUser};

/// Hash a refresh token for storage.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Create authentication router.
///
/// Public routes (no auth required):
/// - POST /login - Login with email/password
/// - POST /refresh - Refresh access token
/// - GET /discord/authorize - Start Discord login
/// - GET /discord/callback - Discord redirect target
///
/// Protected routes (auth required):
/// - POST /logout - Invalidate session
pub fn router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh_token))
        .route("/discord/authorize", get(handlers::discord_authorize))
        .route("/discord/callback", get(handlers::discord_callback));

    let protected_routes = Router::new()
        .route("/logout", post(handlers::logout))
        .layer(axum_middleware::from_fn_with_state(state, require_auth));

    public_routes.merge(protected_routes)
}
