//! Database Queries
//!
//! Runtime queries (no compile-time `DATABASE_URL` required).
//!
//! All query functions include error context logging to aid debugging.

use chrono::{DateTime, Utc};
use lms_common::{AccountStatus, UserRole};
use sqlx::{PgConnection, PgPool};
use tracing::error;
use uuid::Uuid;

use super::models::{Session, User};

/// Log and return a database error with context.
macro_rules! db_error {
    ($query:expr, $($field:tt)*) => {
        |e| {
            error!(query = $query, $($field)*, error = %e, "Database query failed");
            e
        }
    };
}

// ============================================================================
// User Queries
// ============================================================================

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub password_hash: Option<&'a str>,
    pub role: UserRole,
    pub discord_id: Option<&'a str>,
}

/// Find user by ID.
pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_user_by_id", user_id = %id))
}

/// Find user by email (case-insensitive).
pub async fn find_user_by_email(pool: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_user_by_email", email = %email))
}

/// Find user by linked Discord account.
pub async fn find_user_by_discord_id(
    pool: &PgPool,
    discord_id: &str,
) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE discord_id = $1")
        .bind(discord_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_user_by_discord_id", discord_id = %discord_id))
}

/// Check if email exists.
pub async fn email_exists(pool: &PgPool, email: &str) -> sqlx::Result<bool> {
    let result: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))")
            .bind(email)
            .fetch_one(pool)
            .await?;

    Ok(result.0)
}

/// Create a new active, non-trial user.
pub async fn create_user(conn: &mut PgConnection, new_user: &NewUser<'_>) -> sqlx::Result<User> {
    sqlx::query_as::<_, User>(
        r"
        INSERT INTO users (email, name, password_hash, role, status, discord_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        ",
    )
    .bind(new_user.email)
    .bind(new_user.name)
    .bind(new_user.password_hash)
    .bind(new_user.role)
    .bind(AccountStatus::Active)
    .bind(new_user.discord_id)
    .fetch_one(conn)
    .await
    .map_err(db_error!("create_user", email = %new_user.email))
}

/// Attach a Discord account to an existing user.
pub async fn link_discord_id(pool: &PgPool, user_id: Uuid, discord_id: &str) -> sqlx::Result<User> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET discord_id = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(discord_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(db_error!("link_discord_id", user_id = %user_id))
}

// ============================================================================
// Session Queries
// ============================================================================

/// Create a new session (for refresh token tracking).
pub async fn create_session(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> sqlx::Result<Session> {
    sqlx::query_as::<_, Session>(
        r"
        INSERT INTO sessions (user_id, token_hash, expires_at, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        ",
    )
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(ip_address)
    .bind(user_agent)
    .fetch_one(pool)
    .await
    .map_err(db_error!("create_session", user_id = %user_id))
}

/// Remove and return an unexpired session by token hash.
///
/// At most one caller gets the row, so a refresh token is good for one rotation.
pub async fn take_session_by_token_hash(
    pool: &PgPool,
    token_hash: &str,
) -> sqlx::Result<Option<Session>> {
    sqlx::query_as::<_, Session>(
        "DELETE FROM sessions WHERE token_hash = $1 AND expires_at > NOW() RETURNING *",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        error!(query = "take_session_by_token_hash", error = %e, "Database query failed");
        e
    })
}

/// Delete a session by token hash.
pub async fn delete_session_by_token_hash(pool: &PgPool, token_hash: &str) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
        .bind(token_hash)
        .execute(pool)
        .await
        .map_err(|e| {
            error!(query = "delete_session_by_token_hash", error = %e, "Database query failed");
            e
        })?;
    Ok(result.rows_affected())
}

/// Delete all sessions for a user.
pub async fn delete_all_user_sessions(pool: &PgPool, user_id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(db_error!("delete_all_user_sessions", user_id = %user_id))?;
    Ok(result.rows_affected())
}

/// Clean up expired sessions (for background job).
pub async fn cleanup_expired_sessions(pool: &PgPool) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
