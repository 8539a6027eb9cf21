//! Admin API handlers.
//!
//! User management for Admins, monthly sign-up reports for Superadmins.

use std::collections::{BTreeSet, HashMap};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{Datelike, TimeZone, Utc};
use lms_common::{AccountStatus, PageMeta, Paginated, UserRole};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use super::types::{
    AdminError, AdminUserResponse, CreateUserRequest, ListUsersParams, ReportParams,
    UpdateUserRequest,
};
use crate::api::AppState;
use crate::auth::{password, AuthUser};
use crate::catalog::module_types::ModuleTypeSummary;
use crate::catalog::types::{contains_pattern, search_term, PageRequest};
use crate::db::{self, NewUser, User};
use crate::entitlements::store::set_user_manual_grants;
use crate::tenant::TenantContext;

const DEFAULT_USER_PAGE_SIZE: i64 = 20;

#[derive(Debug, FromRow)]
struct GrantRow {
    user_id: Uuid,
    #[sqlx(flatten)]
    module_type: ModuleTypeSummary,
}

/// Manual grants of these users within the tenant, keyed by user.
async fn grants_by_user(
    pool: &PgPool,
    tenant: &TenantContext,
    user_ids: &[Uuid],
) -> sqlx::Result<HashMap<Uuid, Vec<ModuleTypeSummary>>> {
    let rows = sqlx::query_as::<_, GrantRow>(
        r"
        SELECT umt.user_id, mt.id, mt.name, mt.is_aio
        FROM user_module_types umt
        JOIN module_types mt ON mt.id = umt.module_type_id
        WHERE mt.tenant = $1 AND umt.user_id = ANY($2)
        ORDER BY mt.name
        ",
    )
    .bind(tenant.as_str())
    .bind(user_ids)
    .fetch_all(pool)
    .await?;

    let mut grants: HashMap<Uuid, Vec<ModuleTypeSummary>> = HashMap::new();
    for row in rows {
        grants.entry(row.user_id).or_default().push(row.module_type);
    }
    Ok(grants)
}

async fn to_responses(
    pool: &PgPool,
    tenant: &TenantContext,
    users: Vec<User>,
) -> sqlx::Result<Vec<AdminUserResponse>> {
    let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let mut grants = grants_by_user(pool, tenant, &ids).await?;

    Ok(users
        .into_iter()
        .map(|user| AdminUserResponse {
            module_types: grants.remove(&user.id).unwrap_or_default(),
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            status: user.status,
            is_trial: user.is_trial,
            trial_ends_at: user.trial_ends_at,
            discord_id: user.discord_id,
            created_at: user.created_at,
        })
        .collect())
}

async fn to_response(
    pool: &PgPool,
    tenant: &TenantContext,
    user: User,
) -> Result<AdminUserResponse, AdminError> {
    to_responses(pool, tenant, vec![user])
        .await?
        .pop()
        .ok_or(AdminError::NotFound("User"))
}

/// Only a Superadmin may modify a Superadmin account.
fn check_target(admin: &AuthUser, target: &User) -> Result<(), AdminError> {
    if target.role.is_superadmin() && !admin.role.is_superadmin() {
        return Err(AdminError::NotSuperadmin);
    }
    Ok(())
}

fn push_search(builder: &mut QueryBuilder<'_, Postgres>, pattern: Option<&str>) {
    if let Some(pattern) = pattern {
        builder.push(" WHERE (name ILIKE ");
        builder.push_bind(pattern.to_string());
        builder.push(" OR email ILIKE ");
        builder.push_bind(pattern.to_string());
        builder.push(")");
    }
}

fn email_conflict(e: sqlx::Error) -> AdminError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AdminError::Conflict("User with this email already exists".to_string())
        }
        _ => AdminError::Database(e),
    }
}

// ============================================================================
// Users
// ============================================================================

/// List users, newest first.
///
/// `GET /api/admin/users`
#[tracing::instrument(skip(state, auth), fields(admin_id = %auth.id, tenant = %tenant))]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    tenant: TenantContext,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<Paginated<AdminUserResponse>>, AdminError> {
    let page = PageRequest::new(params.page, params.limit, DEFAULT_USER_PAGE_SIZE);
    let search = search_term(params.search.as_deref()).map(contains_pattern);

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
    push_search(&mut count, search.as_deref());
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(&state.db).await?;

    let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM users");
    push_search(&mut select, search.as_deref());
    select.push(" ORDER BY created_at DESC LIMIT ");
    select.push_bind(page.limit);
    select.push(" OFFSET ");
    select.push_bind(page.offset());
    let users = select.build_query_as::<User>().fetch_all(&state.db).await?;

    let data = to_responses(&state.db, &tenant, users).await?;

    Ok(Json(Paginated {
        data,
        meta: PageMeta::new(total, page.page, page.limit),
    }))
}

/// Create a credential account with optional grants.
///
/// `POST /api/admin/users`
#[tracing::instrument(skip(state, auth, body), fields(admin_id = %auth.id, tenant = %tenant))]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    tenant: TenantContext,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<AdminUserResponse>), AdminError> {
    body.validate()?;
    let role = body.role()?;
    let email = body.email.trim().to_lowercase();

    if db::email_exists(&state.db, &email).await? {
        return Err(AdminError::Conflict(
            "User with this email already exists".to_string(),
        ));
    }

    let password_hash =
        password::hash_password(&body.password).map_err(|_| AdminError::PasswordHash)?;

    let mut tx = state.db.begin().await?;

    let user = db::create_user(
        &mut *tx,
        &NewUser {
            email: &email,
            name: body.name.trim(),
            password_hash: Some(&password_hash),
            role,
            discord_id: None,
        },
    )
    .await
    .map_err(email_conflict)?;

    let grants: BTreeSet<Uuid> = body.module_type_ids.iter().copied().collect();
    set_user_manual_grants(&mut *tx, &tenant, user.id, &grants).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.id, role = role.as_str(), "User created by admin");

    let response = to_response(&state.db, &tenant, user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Partially update a user. `moduleTypeIds` replaces the tenant's grants.
///
/// `PUT /api/admin/users/{id}`
#[tracing::instrument(skip(state, auth, body), fields(admin_id = %auth.id, tenant = %tenant))]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    tenant: TenantContext,
    Path(user_id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<AdminUserResponse>, AdminError> {
    body.validate()?;
    let role = body.role()?;

    let mut tx = state.db.begin().await?;

    let target = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AdminError::NotFound("User"))?;
    check_target(&auth, &target)?;

    let user = sqlx::query_as::<_, User>(
        r"
        UPDATE users SET
            name = COALESCE($1, name),
            role = COALESCE($2, role),
            status = COALESCE($3, status),
            is_trial = COALESCE($4, is_trial),
            trial_ends_at = CASE WHEN $5 THEN $6 ELSE trial_ends_at END,
            updated_at = NOW()
        WHERE id = $7
        RETURNING *
        ",
    )
    .bind(body.name.as_deref().map(str::trim))
    .bind(role)
    .bind(body.status)
    .bind(body.is_trial)
    .bind(body.trial_ends_at.is_some())
    .bind(body.trial_ends_at.flatten())
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(ids) = &body.module_type_ids {
        let grants: BTreeSet<Uuid> = ids.iter().copied().collect();
        set_user_manual_grants(&mut *tx, &tenant, user_id, &grants).await?;
    }

    tx.commit().await?;

    if user.status == AccountStatus::Inactive && target.status == AccountStatus::Active {
        let revoked = db::delete_all_user_sessions(&state.db, user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Deactivated user sessions revoked");
    }

    Ok(Json(to_response(&state.db, &tenant, user).await?))
}

/// `DELETE /api/admin/users/{id}`
#[tracing::instrument(skip(state, auth), fields(admin_id = %auth.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AdminError> {
    if user_id == auth.id {
        return Err(AdminError::Validation(
            "Cannot delete your own account".to_string(),
        ));
    }

    let target = db::find_user_by_id(&state.db, user_id)
        .await?
        .ok_or(AdminError::NotFound("User"))?;
    check_target(&auth, &target)?;

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %user_id, "User deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Reports
// ============================================================================

/// Paying sign-ups of a calendar month (UTC), newest first.
///
/// `GET /api/admin/reports/users?month=&year=`
#[tracing::instrument(skip(state, auth), fields(admin_id = %auth.id, tenant = %tenant))]
pub async fn reports_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    tenant: TenantContext,
    Query(params): Query<ReportParams>,
) -> Result<Json<Vec<AdminUserResponse>>, AdminError> {
    let invalid = || AdminError::Validation("Invalid month or year".to_string());

    let start = Utc
        .with_ymd_and_hms(params.year, params.month, 1, 0, 0, 0)
        .single()
        .ok_or_else(invalid)?;
    let (next_year, next_month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .ok_or_else(invalid)?;

    let users = sqlx::query_as::<_, User>(
        r"
        SELECT * FROM users
        WHERE role <> $1 AND NOT is_trial AND created_at >= $2 AND created_at < $3
        ORDER BY created_at DESC
        ",
    )
    .bind(UserRole::Superadmin)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(to_responses(&state.db, &tenant, users).await?))
}
