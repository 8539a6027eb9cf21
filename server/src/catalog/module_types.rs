//! Module Types API
//!
//! Tenant-scoped module types and their Discord role mappings.

use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::types::{conflict_or, CatalogError, ModuleTypeRequest};
use crate::api::AppState;
use crate::tenant::TenantContext;

// ============================================================================
// Types
// ============================================================================

/// Compact module type, embedded in modules and profiles.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTypeSummary {
    pub id: Uuid,
    pub name: String,
    pub is_aio: bool,
}

/// Module type with its role mappings.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTypeResponse {
    pub id: Uuid,
    pub name: String,
    pub is_aio: bool,
    pub discord_role_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_WITH_MAPPINGS: &str = r"
    SELECT mt.id, mt.name, mt.is_aio, mt.created_at, mt.updated_at,
           COALESCE(
               array_agg(m.discord_role_id ORDER BY m.discord_role_id)
                   FILTER (WHERE m.discord_role_id IS NOT NULL),
               '{}'
           ) AS discord_role_ids
    FROM module_types mt
    LEFT JOIN module_type_role_mappings m
           ON m.module_type_id = mt.id AND m.tenant = mt.tenant
";

// ============================================================================
// Queries
// ============================================================================

/// Summaries of the given types that belong to the tenant, by name.
pub async fn find_module_types_by_ids(
    pool: &PgPool,
    tenant: &TenantContext,
    ids: &BTreeSet<Uuid>,
) -> sqlx::Result<Vec<ModuleTypeSummary>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = ids.iter().copied().collect();
    sqlx::query_as::<_, ModuleTypeSummary>(
        "SELECT id, name, is_aio FROM module_types WHERE tenant = $1 AND id = ANY($2) ORDER BY name",
    )
    .bind(tenant.as_str())
    .bind(&ids)
    .fetch_all(pool)
    .await
}

/// Whether `type_id` is a module type of the tenant.
pub async fn module_type_exists(
    pool: &PgPool,
    tenant: &TenantContext,
    type_id: Uuid,
) -> sqlx::Result<bool> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM module_types WHERE tenant = $1 AND id = $2)",
    )
    .bind(tenant.as_str())
    .bind(type_id)
    .fetch_one(pool)
    .await
}

async fn fetch_one_with_mappings(
    conn: &mut PgConnection,
    tenant: &TenantContext,
    id: Uuid,
) -> sqlx::Result<ModuleTypeResponse> {
    sqlx::query_as::<_, ModuleTypeResponse>(&format!(
        "{SELECT_WITH_MAPPINGS} WHERE mt.tenant = $1 AND mt.id = $2 GROUP BY mt.id"
    ))
    .bind(tenant.as_str())
    .bind(id)
    .fetch_one(conn)
    .await
}

async fn insert_mapping(
    conn: &mut PgConnection,
    tenant: &TenantContext,
    type_id: Uuid,
    role_id: Option<&str>,
) -> Result<(), CatalogError> {
    let Some(role_id) = role_id else {
        return Ok(());
    };

    sqlx::query(
        "INSERT INTO module_type_role_mappings (tenant, module_type_id, discord_role_id) VALUES ($1, $2, $3)",
    )
    .bind(tenant.as_str())
    .bind(type_id)
    .bind(role_id)
    .execute(conn)
    .await
    .map_err(|e| conflict_or(e, "Discord role is already mapped to another module type"))?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/module-types
#[tracing::instrument(skip(state), fields(tenant = %tenant))]
pub async fn list_module_types(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<ModuleTypeResponse>>, CatalogError> {
    let types = sqlx::query_as::<_, ModuleTypeResponse>(&format!(
        "{SELECT_WITH_MAPPINGS} WHERE mt.tenant = $1 GROUP BY mt.id ORDER BY mt.name"
    ))
    .bind(tenant.as_str())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(types))
}

/// Non-AIO types for selection lists.
///
/// GET /api/module-types/dropdown
pub async fn dropdown(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<ModuleTypeSummary>>, CatalogError> {
    let types = sqlx::query_as::<_, ModuleTypeSummary>(
        "SELECT id, name, is_aio FROM module_types WHERE tenant = $1 AND NOT is_aio ORDER BY name ASC",
    )
    .bind(tenant.as_str())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(types))
}

/// POST /api/module-types
#[tracing::instrument(skip(state, body), fields(tenant = %tenant, name = %body.name))]
pub async fn create_module_type(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<ModuleTypeRequest>,
) -> Result<(StatusCode, Json<ModuleTypeResponse>), CatalogError> {
    body.validate()?;

    let mut tx = state.db.begin().await?;

    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO module_types (tenant, name, is_aio) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(tenant.as_str())
    .bind(body.name.trim())
    .bind(body.is_aio)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_or(e, "A module type with this name already exists"))?;

    insert_mapping(&mut *tx, &tenant, id, body.role_id()).await?;
    let created = fetch_one_with_mappings(&mut *tx, &tenant, id).await?;

    tx.commit().await?;

    tracing::info!(module_type_id = %id, "Module type created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a type and replace its role mapping.
///
/// PUT /api/module-types/{id}
#[tracing::instrument(skip(state, body), fields(tenant = %tenant))]
pub async fn update_module_type(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(body): Json<ModuleTypeRequest>,
) -> Result<Json<ModuleTypeResponse>, CatalogError> {
    body.validate()?;

    let mut tx = state.db.begin().await?;

    let updated = sqlx::query(
        "UPDATE module_types SET name = $1, is_aio = $2, updated_at = NOW() WHERE tenant = $3 AND id = $4",
    )
    .bind(body.name.trim())
    .bind(body.is_aio)
    .bind(tenant.as_str())
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| conflict_or(e, "A module type with this name already exists"))?;

    if updated.rows_affected() == 0 {
        return Err(CatalogError::NotFound("Module type"));
    }

    sqlx::query("DELETE FROM module_type_role_mappings WHERE tenant = $1 AND module_type_id = $2")
        .bind(tenant.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    insert_mapping(&mut *tx, &tenant, id, body.role_id()).await?;
    let module_type = fetch_one_with_mappings(&mut *tx, &tenant, id).await?;

    tx.commit().await?;

    tracing::info!(module_type_id = %id, "Module type updated");
    Ok(Json(module_type))
}

/// Delete a type. Its modules become public.
///
/// DELETE /api/module-types/{id}
#[tracing::instrument(skip(state), fields(tenant = %tenant))]
pub async fn delete_module_type(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError> {
    let result = sqlx::query("DELETE FROM module_types WHERE tenant = $1 AND id = $2")
        .bind(tenant.as_str())
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CatalogError::NotFound("Module type"));
    }

    tracing::info!(module_type_id = %id, "Module type deleted");
    Ok(StatusCode::NO_CONTENT)
}
