//! Entitlement Store
//!
//! Tenant-scoped reads of the module type catalog and per-user manual grants.

use std::collections::BTreeSet;

use sqlx::{FromRow, PgConnection, PgPool};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use super::models::CatalogEntry;
use crate::tenant::TenantContext;

/// Errors raised while replacing a user's grants.
#[derive(Debug, Error)]
pub enum GrantError {
    /// One or more ids are not module types of this tenant.
    #[error("Unknown module type: {0}")]
    UnknownType(Uuid),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, FromRow)]
struct CatalogRow {
    id: Uuid,
    is_aio: bool,
    role_ids: Vec<String>,
}

impl From<CatalogRow> for CatalogEntry {
    fn from(row: CatalogRow) -> Self {
        Self {
            id: row.id,
            external_role_ids: row.role_ids,
            is_aio: row.is_aio,
        }
    }
}

/// Load every module type of the tenant with its Discord role mappings.
#[tracing::instrument(skip(pool), fields(tenant = %tenant))]
pub async fn list_module_type_catalog(
    pool: &PgPool,
    tenant: &TenantContext,
) -> sqlx::Result<Vec<CatalogEntry>> {
    let rows = sqlx::query_as::<_, CatalogRow>(
        r"
        SELECT mt.id, mt.is_aio,
               COALESCE(
                   array_agg(m.discord_role_id) FILTER (WHERE m.discord_role_id IS NOT NULL),
                   '{}'
               ) AS role_ids
        FROM module_types mt
        LEFT JOIN module_type_role_mappings m
               ON m.module_type_id = mt.id AND m.tenant = mt.tenant
        WHERE mt.tenant = $1
        GROUP BY mt.id
        ",
    )
    .bind(tenant.as_str())
    .fetch_all(pool)
    .await
    .map_err(|e| {
        error!(query = "list_module_type_catalog", tenant = %tenant, error = %e, "Database query failed");
        e
    })?;

    Ok(rows.into_iter().map(CatalogEntry::from).collect())
}

/// Module types granted to a user by an administrator, within the tenant.
#[tracing::instrument(skip(pool), fields(tenant = %tenant))]
pub async fn get_user_manual_grants(
    pool: &PgPool,
    tenant: &TenantContext,
    user_id: Uuid,
) -> sqlx::Result<BTreeSet<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r"
        SELECT umt.module_type_id
        FROM user_module_types umt
        JOIN module_types mt ON mt.id = umt.module_type_id
        WHERE umt.user_id = $1 AND mt.tenant = $2
        ",
    )
    .bind(user_id)
    .bind(tenant.as_str())
    .fetch_all(pool)
    .await
    .map_err(|e| {
        error!(query = "get_user_manual_grants", user_id = %user_id, error = %e, "Database query failed");
        e
    })?;

    Ok(ids.into_iter().collect())
}

/// Replace a user's manual grants within the tenant.
///
/// Run inside the caller's transaction. Grants held in other tenants are left alone.
#[tracing::instrument(skip(conn, type_ids), fields(tenant = %tenant, count = type_ids.len()))]
pub async fn set_user_manual_grants(
    conn: &mut PgConnection,
    tenant: &TenantContext,
    user_id: Uuid,
    type_ids: &BTreeSet<Uuid>,
) -> Result<(), GrantError> {
    let ids: Vec<Uuid> = type_ids.iter().copied().collect();

    let known: BTreeSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM module_types WHERE tenant = $1 AND id = ANY($2)",
    )
    .bind(tenant.as_str())
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    if let Some(unknown) = type_ids.difference(&known).next() {
        return Err(GrantError::UnknownType(*unknown));
    }

    sqlx::query(
        r"
        DELETE FROM user_module_types umt
        USING module_types mt
        WHERE umt.module_type_id = mt.id AND umt.user_id = $1 AND mt.tenant = $2
        ",
    )
    .bind(user_id)
    .bind(tenant.as_str())
    .execute(&mut *conn)
    .await?;

    if !ids.is_empty() {
        sqlx::query(
            r"
            INSERT INTO user_module_types (user_id, module_type_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(&ids)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
