//! Modules API
//!
//! Listing and detail reads pass through the caller's entitlement; writes are
//! admin-only and routed separately.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use lms_common::{PageMeta, Paginated};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use super::module_types::{module_type_exists, ModuleTypeSummary};
use super::types::{
    contains_pattern, search_term, CatalogError, ListModulesQuery, ModuleRequest, ModuleResponse,
    PageRequest,
};
use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{Content, Module};
use crate::entitlements::{load_entitlement, visibility_filter, VisibilityFilter};
use crate::tenant::TenantContext;

/// Default page size for module listings.
pub const DEFAULT_MODULE_PAGE_SIZE: i64 = 9;

fn push_conditions(
    builder: &mut QueryBuilder<'_, Postgres>,
    tenant: &TenantContext,
    filter: &VisibilityFilter,
    search: Option<&str>,
) {
    builder.push(" WHERE m.tenant = ");
    builder.push_bind(tenant.as_str().to_string());
    builder.push(" AND ");
    filter.push_sql(builder, "m.type_id");

    if let Some(term) = search {
        let pattern = contains_pattern(term);
        builder.push(" AND (m.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR m.description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

/// Attach types and ordered lessons to a page of modules.
async fn with_relations(
    pool: &PgPool,
    modules: Vec<Module>,
) -> sqlx::Result<Vec<ModuleResponse>> {
    let module_ids: Vec<Uuid> = modules.iter().map(|m| m.id).collect();
    let type_ids: Vec<Uuid> = modules.iter().filter_map(|m| m.type_id).collect();

    let types: HashMap<Uuid, ModuleTypeSummary> = sqlx::query_as::<_, ModuleTypeSummary>(
        "SELECT id, name, is_aio FROM module_types WHERE id = ANY($1)",
    )
    .bind(&type_ids)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|t| (t.id, t))
    .collect();

    let mut contents: HashMap<Uuid, Vec<Content>> = HashMap::new();
    let rows = sqlx::query_as::<_, Content>(
        r#"SELECT * FROM contents WHERE module_id = ANY($1) ORDER BY "order" ASC, created_at ASC"#,
    )
    .bind(&module_ids)
    .fetch_all(pool)
    .await?;
    for content in rows {
        contents.entry(content.module_id).or_default().push(content);
    }

    Ok(modules
        .into_iter()
        .map(|module| ModuleResponse {
            module_type: module.type_id.and_then(|id| types.get(&id).cloned()),
            contents: contents.remove(&module.id).unwrap_or_default(),
            module,
        })
        .collect())
}

async fn find_module(
    pool: &PgPool,
    tenant: &TenantContext,
    id: Uuid,
) -> sqlx::Result<Option<Module>> {
    sqlx::query_as::<_, Module>("SELECT * FROM modules WHERE tenant = $1 AND id = $2")
        .bind(tenant.as_str())
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn check_type(
    pool: &PgPool,
    tenant: &TenantContext,
    type_id: Option<Uuid>,
) -> Result<(), CatalogError> {
    if let Some(id) = type_id {
        if !module_type_exists(pool, tenant, id).await? {
            return Err(CatalogError::Validation(format!("Unknown module type: {id}")));
        }
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/modules
#[tracing::instrument(skip(state, auth_user), fields(user_id = %auth_user.id, tenant = %tenant))]
pub async fn list_modules(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth_user: AuthUser,
    Query(query): Query<ListModulesQuery>,
) -> Result<Json<Paginated<ModuleResponse>>, CatalogError> {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_MODULE_PAGE_SIZE);
    let search = search_term(query.search.as_deref());

    let entitlement = load_entitlement(&state, &tenant, &auth_user).await?;
    let filter = visibility_filter(&entitlement, query.type_id);

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM modules m");
    push_conditions(&mut count, &tenant, &filter, search);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(&state.db).await?;

    let mut select = QueryBuilder::<Postgres>::new("SELECT m.* FROM modules m");
    push_conditions(&mut select, &tenant, &filter, search);
    select.push(" ORDER BY m.created_at DESC LIMIT ");
    select.push_bind(page.limit);
    select.push(" OFFSET ");
    select.push_bind(page.offset());
    let modules = select
        .build_query_as::<Module>()
        .fetch_all(&state.db)
        .await?;

    let data = with_relations(&state.db, modules).await?;

    Ok(Json(Paginated {
        data,
        meta: PageMeta::new(total, page.page, page.limit),
    }))
}

/// GET /api/modules/{id}
#[tracing::instrument(skip(state, auth_user), fields(user_id = %auth_user.id, tenant = %tenant))]
pub async fn get_module(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ModuleResponse>, CatalogError> {
    let module = find_module(&state.db, &tenant, id)
        .await?
        .ok_or(CatalogError::NotFound("Module"))?;

    let entitlement = load_entitlement(&state, &tenant, &auth_user).await?;
    if !visibility_filter(&entitlement, None).matches(module.type_id) {
        return Err(CatalogError::NotFound("Module"));
    }

    let mut modules = with_relations(&state.db, vec![module]).await?;
    modules.pop().map(Json).ok_or(CatalogError::NotFound("Module"))
}

/// POST /api/modules
#[tracing::instrument(skip(state, body), fields(tenant = %tenant))]
pub async fn create_module(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<ModuleRequest>,
) -> Result<(StatusCode, Json<Module>), CatalogError> {
    body.validate()?;
    check_type(&state.db, &tenant, body.type_id).await?;

    let module = sqlx::query_as::<_, Module>(
        r"
        INSERT INTO modules (tenant, title, description, type_id)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        ",
    )
    .bind(tenant.as_str())
    .bind(body.title.trim())
    .bind(&body.description)
    .bind(body.type_id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(module_id = %module.id, "Module created");
    Ok((StatusCode::CREATED, Json(module)))
}

/// PUT /api/modules/{id}
#[tracing::instrument(skip(state, body), fields(tenant = %tenant))]
pub async fn update_module(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(body): Json<ModuleRequest>,
) -> Result<Json<Module>, CatalogError> {
    body.validate()?;
    check_type(&state.db, &tenant, body.type_id).await?;

    let module = sqlx::query_as::<_, Module>(
        r"
        UPDATE modules
        SET title = $1, description = $2, type_id = $3, updated_at = NOW()
        WHERE tenant = $4 AND id = $5
        RETURNING *
        ",
    )
    .bind(body.title.trim())
    .bind(&body.description)
    .bind(body.type_id)
    .bind(tenant.as_str())
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(CatalogError::NotFound("Module"))?;

    Ok(Json(module))
}

/// Delete a module and its lessons.
///
/// DELETE /api/modules/{id}
#[tracing::instrument(skip(state), fields(tenant = %tenant))]
pub async fn delete_module(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError> {
    let result = sqlx::query("DELETE FROM modules WHERE tenant = $1 AND id = $2")
        .bind(tenant.as_str())
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CatalogError::NotFound("Module"));
    }

    tracing::info!(module_id = %id, "Module deleted");
    Ok(StatusCode::NO_CONTENT)
}
