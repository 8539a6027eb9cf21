//! Authentication HTTP Handlers

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use lms_common::{AccountStatus, UserRole};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::error::{AuthError, AuthResult};
use super::hash_token;
use super::jwt::{generate_token_pair, validate_refresh_token, TokenPair};
use super::middleware::AuthUser;
use super::password::verify_password;
use crate::api::AppState;
use crate::catalog::module_types::{find_module_types_by_ids, ModuleTypeSummary};
use crate::db::{
    self, create_session, delete_session_by_token_hash, find_user_by_discord_id, find_user_by_email,
    find_user_by_id, link_discord_id, take_session_by_token_hash, NewUser, User,
};
use crate::discord::{oauth, roles_or_empty, DiscordUser};
use crate::entitlements::{effective_types_for_display, gate, RoleSet};
use crate::tenant::TenantContext;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Token refresh request.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request.
#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    /// Refresh token to invalidate.
    pub refresh_token: String,
}

/// Authentication response with tokens.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry in seconds.
    pub expires_in: i64,
    /// Always "Bearer".
    pub token_type: String,
}

impl From<TokenPair> for AuthResponse {
    fn from(tokens: TokenPair) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.access_expires_in,
            token_type: "Bearer".to_string(),
        }
    }
}

/// Discord callback query.
#[derive(Debug, Deserialize)]
pub struct DiscordCallbackQuery {
    pub code: Option<String>,
    pub state: String,
    pub error: Option<String>,
}

/// Current user profile.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub status: AccountStatus,
    pub is_trial: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub discord_id: Option<String>,
    /// Manual and Discord-derived module types, each listed once.
    pub module_types: Vec<ModuleTypeSummary>,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Extract User-Agent from headers (control characters stripped, 512 chars max).
fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|s| {
            s.chars()
                .filter(|c| !c.is_control() || c.is_whitespace())
                .take(512)
                .collect()
        })
}

/// Reject accounts that may not hold a session.
fn check_account(state: &AppState, user: &User) -> AuthResult<()> {
    if user.status == AccountStatus::Inactive {
        return Err(AuthError::AccountInactive);
    }

    if gate::trial_expired(
        user.is_trial,
        user.trial_ends_at,
        Utc::now(),
        state.config.trial_offset(),
    ) {
        return Err(AuthError::TrialExpired);
    }

    Ok(())
}

/// Issue a token pair and persist its refresh session.
async fn issue_session(
    state: &AppState,
    user_id: Uuid,
    roles: &RoleSet,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> AuthResult<TokenPair> {
    let tokens = generate_token_pair(
        user_id,
        roles,
        &state.config.jwt_private_key,
        state.config.jwt_access_expiry,
        state.config.jwt_refresh_expiry,
    )?;

    let token_hash = hash_token(&tokens.refresh_token);
    let expires_at = Utc::now() + Duration::seconds(state.config.jwt_refresh_expiry);
    create_session(
        &state.db,
        user_id,
        &token_hash,
        expires_at,
        ip_address,
        user_agent,
    )
    .await?;

    Ok(tokens)
}

/// Append the tokens to the post-login location as fragment parameters.
///
/// The fragment never reaches a server or a `Referer` header. JWTs only
/// contain URL-safe characters.
fn login_redirect_location(base: &str, tokens: &TokenPair) -> String {
    let separator = if base.contains('#') { '&' } else { '#' };
    format!(
        "{base}{separator}access_token={}&refresh_token={}&expires_in={}",
        tokens.access_token, tokens.refresh_token, tokens.access_expires_in
    )
}

/// Email of a Discord account, usable to link or create a local account.
///
/// Discord lets anyone put an unconfirmed address on an account, so only a
/// verified email may match an existing user.
fn verified_email(discord_user: &DiscordUser) -> AuthResult<&str> {
    let email = discord_user
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AuthError::Validation("Discord account has no email".to_string()))?;

    if discord_user.verified != Some(true) {
        return Err(AuthError::Validation(
            "Discord account email is not verified".to_string(),
        ));
    }
    Ok(email)
}

/// Find the account for a Discord login, linking or creating one as needed.
async fn resolve_discord_user(state: &AppState, discord_user: &DiscordUser) -> AuthResult<User> {
    if let Some(user) = find_user_by_discord_id(&state.db, &discord_user.id).await? {
        return Ok(user);
    }

    let email = verified_email(discord_user)?;

    if let Some(existing) = find_user_by_email(&state.db, email).await? {
        if existing.discord_id.is_some() {
            return Err(AuthError::Validation(
                "Email is linked to a different Discord account".to_string(),
            ));
        }
        let linked = link_discord_id(&state.db, existing.id, &discord_user.id).await?;
        tracing::info!(user_id = %linked.id, discord_id = %discord_user.id, "Linked Discord account");
        return Ok(linked);
    }

    let mut conn = state.db.acquire().await?;
    let user = db::create_user(
        &mut conn,
        &NewUser {
            email,
            name: discord_user.display_name(),
            password_hash: None,
            role: UserRole::User,
            discord_id: Some(&discord_user.id),
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, discord_id = %discord_user.id, "New user registered via Discord");
    Ok(user)
}

// ============================================================================
// Handlers
// ============================================================================

/// Login with email and password.
///
/// POST /auth/login
#[tracing::instrument(skip(state, headers, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> AuthResult<Json<AuthResponse>> {
    body.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let user = find_user_by_email(&state.db, &body.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let password_hash = user
        .password_hash
        .as_deref()
        .ok_or(AuthError::InvalidCredentials)?;

    let valid =
        verify_password(&body.password, password_hash).map_err(|_| AuthError::PasswordHash)?;
    if !valid {
        return Err(AuthError::InvalidCredentials);
    }

    check_account(&state, &user)?;

    let roles = roles_or_empty(state.role_gateway(), user.discord_id.as_deref()).await;
    let user_agent = extract_user_agent(&headers);
    let tokens = issue_session(
        &state,
        user.id,
        &roles,
        Some(&addr.ip().to_string()),
        user_agent.as_deref(),
    )
    .await?;

    tracing::info!(user_id = %user.id, roles = roles.len(), "User logged in");

    Ok(Json(tokens.into()))
}

/// Rotate the refresh session and re-read the user's guild roles.
///
/// POST /auth/refresh
#[tracing::instrument(skip(state, headers, body))]
pub async fn refresh_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> AuthResult<Json<AuthResponse>> {
    let claims = validate_refresh_token(&body.refresh_token, &state.config.jwt_public_key)?;

    // Taking the session ends it, even when the account is now refused.
    // A concurrent refresh with the same token finds nothing.
    let token_hash = hash_token(&body.refresh_token);
    let session = take_session_by_token_hash(&state.db, &token_hash)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    let user_id: Uuid = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;
    if session.user_id != user_id {
        return Err(AuthError::InvalidToken);
    }

    let user = find_user_by_id(&state.db, user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    check_account(&state, &user)?;

    let roles = roles_or_empty(state.role_gateway(), user.discord_id.as_deref()).await;
    let user_agent = extract_user_agent(&headers);
    let tokens = issue_session(
        &state,
        user.id,
        &roles,
        Some(&addr.ip().to_string()),
        user_agent.as_deref(),
    )
    .await?;

    tracing::info!(user_id = %user_id, roles = roles.len(), "Token refreshed");

    Ok(Json(tokens.into()))
}

/// Logout and invalidate session.
///
/// POST /auth/logout
#[tracing::instrument(skip(state, body), fields(user_id = %auth_user.id))]
pub async fn logout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(body): Json<LogoutRequest>,
) -> AuthResult<()> {
    let token_hash = hash_token(&body.refresh_token);
    delete_session_by_token_hash(&state.db, &token_hash).await?;

    tracing::info!(user_id = %auth_user.id, "User logged out");

    Ok(())
}

/// Start a Discord login.
///
/// GET /auth/discord/authorize
pub async fn discord_authorize(State(state): State<AppState>) -> AuthResult<Response> {
    let discord = state
        .discord_oauth
        .as_ref()
        .ok_or(AuthError::DiscordNotConfigured)?;

    let csrf_state = oauth::generate_state();
    let auth_url = discord.authorize_url(&csrf_state)?;

    oauth::store_flow_state(&state.redis, &csrf_state)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store Discord login state in Redis");
            AuthError::Internal("Failed to store login state".to_string())
        })?;

    tracing::info!("Redirecting to Discord");
    Ok(Redirect::temporary(&auth_url).into_response())
}

/// Finish a Discord login.
///
/// GET /auth/discord/callback
pub async fn discord_callback(
    State(state): State<AppState>,
    Query(query): Query<DiscordCallbackQuery>,
) -> AuthResult<Response> {
    let discord = state
        .discord_oauth
        .as_ref()
        .ok_or(AuthError::DiscordNotConfigured)?;

    // One-time use, prevents replay
    let known = oauth::consume_flow_state(&state.redis, &query.state)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to read Discord login state from Redis");
            AuthError::Internal("Failed to read login state".to_string())
        })?;
    if !known {
        return Err(AuthError::OAuthStateMismatch);
    }

    if let Some(error) = query.error.as_deref() {
        tracing::info!(error = %error, "Discord authorization declined");
        return Err(AuthError::Validation(format!("Discord authorization failed: {error}")));
    }
    let code = query
        .code
        .as_deref()
        .ok_or_else(|| AuthError::Validation("Missing authorization code".to_string()))?;

    let access_token = discord.exchange_code(code).await?;
    let discord_user = discord.fetch_user(&access_token).await?;

    let user = resolve_discord_user(&state, &discord_user).await?;
    check_account(&state, &user)?;

    let roles = roles_or_empty(state.role_gateway(), Some(&discord_user.id)).await;
    let tokens = issue_session(&state, user.id, &roles, None, None).await?;

    tracing::info!(user_id = %user.id, roles = roles.len(), "User logged in via Discord");

    Ok(Redirect::temporary(&login_redirect_location(
        &state.config.login_redirect_url,
        &tokens,
    ))
    .into_response())
}

/// Current user profile with the module types they hold.
///
/// GET /api/user/me
#[tracing::instrument(skip(state, auth_user), fields(user_id = %auth_user.id))]
pub async fn get_profile(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth_user: AuthUser,
) -> AuthResult<Json<UserProfile>> {
    let type_ids = effective_types_for_display(&state, &tenant, &auth_user).await?;
    let module_types = find_module_types_by_ids(&state.db, &tenant, &type_ids).await?;

    Ok(Json(UserProfile {
        id: auth_user.id,
        email: auth_user.email,
        name: auth_user.name,
        role: auth_user.role,
        status: auth_user.status,
        is_trial: auth_user.is_trial,
        trial_ends_at: auth_user.trial_ends_at,
        discord_id: auth_user.discord_id,
        module_types,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> TokenPair {
        TokenPair {
            access_token: "aaa.bbb.ccc".into(),
            refresh_token: "ddd.eee.fff".into(),
            access_expires_in: 3600,
            refresh_token_id: Uuid::nil(),
        }
    }

    fn discord_user(json: &str) -> DiscordUser {
        serde_json::from_str(json).unwrap()
    }

    fn offline_state(pool: sqlx::PgPool) -> AppState {
        AppState::new(
            pool,
            fred::clients::Client::new(fred::prelude::Config::default(), None, None, None),
            crate::config::Config::default_for_test(),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_login_redirect_puts_tokens_in_fragment() {
        assert_eq!(
            login_redirect_location("/dashboard", &tokens()),
            "/dashboard#access_token=aaa.bbb.ccc&refresh_token=ddd.eee.fff&expires_in=3600"
        );
    }

    #[test]
    fn test_login_redirect_keeps_query_out_of_reach() {
        let location = login_redirect_location("https://lms.example/app?tab=courses", &tokens());
        assert!(location.starts_with("https://lms.example/app?tab=courses#access_token="));
        let query = location.split('#').next().unwrap();
        assert!(!query.contains("refresh_token"));
    }

    #[test]
    fn test_verified_email_required() {
        let verified =
            discord_user(r#"{"id":"1","username":"kit","email":"kit@example.com","verified":true}"#);
        assert_eq!(verified_email(&verified).unwrap(), "kit@example.com");

        let unverified = discord_user(
            r#"{"id":"1","username":"kit","email":"kit@example.com","verified":false}"#,
        );
        assert!(matches!(verified_email(&unverified), Err(AuthError::Validation(_))));

        let unknown = discord_user(r#"{"id":"1","username":"kit","email":"kit@example.com"}"#);
        assert!(matches!(verified_email(&unknown), Err(AuthError::Validation(_))));
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL
    async fn test_unverified_discord_email_never_links(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let admin = db::create_user(
            &mut conn,
            &NewUser {
                email: "boss@example.com",
                name: "Boss",
                password_hash: None,
                role: UserRole::Admin,
                discord_id: None,
            },
        )
        .await
        .unwrap();
        drop(conn);
        let state = offline_state(pool.clone());

        let impostor = discord_user(
            r#"{"id":"666","username":"x","email":"boss@example.com","verified":false}"#,
        );
        let result = resolve_discord_user(&state, &impostor).await;
        assert!(matches!(result, Err(AuthError::Validation(_))));

        let stored = find_user_by_id(&pool, admin.id).await.unwrap().unwrap();
        assert!(stored.discord_id.is_none());
        assert!(find_user_by_discord_id(&pool, "666").await.unwrap().is_none());

        let owner = discord_user(
            r#"{"id":"777","username":"boss","email":"boss@example.com","verified":true}"#,
        );
        let linked = resolve_discord_user(&state, &owner).await.unwrap();
        assert_eq!(linked.id, admin.id);
        assert_eq!(linked.discord_id.as_deref(), Some("777"));
    }

    #[test]
    fn test_user_agent_sanitized() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, "Mozilla/5.0 (X11)".parse().unwrap());
        assert_eq!(extract_user_agent(&headers).as_deref(), Some("Mozilla/5.0 (X11)"));
        assert!(extract_user_agent(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_login_request_validation() {
        let bad = LoginRequest {
            email: "not-an-email".into(),
            password: "x".into(),
        };
        assert!(bad.validate().is_err());

        let good = LoginRequest {
            email: "learner@example.com".into(),
            password: "secret".into(),
        };
        assert!(good.validate().is_ok());
    }
}
