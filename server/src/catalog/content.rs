//! Content (lesson) API
//!
//! Lessons inherit visibility from their module.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use lms_common::{PageMeta, Paginated};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use super::types::{
    contains_pattern, search_term, CatalogError, ContentRequest, ListContentQuery, PageRequest,
    ReorderRequest,
};
use super::video;
use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::Content;
use crate::entitlements::{load_entitlement, visibility_filter, VisibilityFilter};
use crate::tenant::TenantContext;

/// Default page size for lesson listings.
pub const DEFAULT_CONTENT_PAGE_SIZE: i64 = 50;

/// Lesson with the type of its module.
#[derive(Debug, FromRow)]
struct ContentWithType {
    #[sqlx(flatten)]
    content: Content,
    module_type_id: Option<Uuid>,
}

fn push_conditions(
    builder: &mut QueryBuilder<'_, Postgres>,
    tenant: &TenantContext,
    filter: &VisibilityFilter,
    module_id: Option<Uuid>,
    search: Option<&str>,
) {
    builder.push(" WHERE m.tenant = ");
    builder.push_bind(tenant.as_str().to_string());
    builder.push(" AND ");
    filter.push_sql(builder, "m.type_id");

    if let Some(module_id) = module_id {
        builder.push(" AND c.module_id = ");
        builder.push_bind(module_id);
    }

    if let Some(term) = search {
        let pattern = contains_pattern(term);
        builder.push(" AND (c.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR c.description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

async fn module_in_tenant(
    pool: &PgPool,
    tenant: &TenantContext,
    module_id: Uuid,
) -> sqlx::Result<bool> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM modules WHERE tenant = $1 AND id = $2)",
    )
    .bind(tenant.as_str())
    .bind(module_id)
    .fetch_one(pool)
    .await
}

async fn check_module(
    pool: &PgPool,
    tenant: &TenantContext,
    module_id: Uuid,
) -> Result<(), CatalogError> {
    if module_in_tenant(pool, tenant, module_id).await? {
        Ok(())
    } else {
        Err(CatalogError::NotFound("Module"))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/content
#[tracing::instrument(skip(state, auth_user), fields(user_id = %auth_user.id, tenant = %tenant))]
pub async fn list_content(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth_user: AuthUser,
    Query(query): Query<ListContentQuery>,
) -> Result<Json<Paginated<Content>>, CatalogError> {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_CONTENT_PAGE_SIZE);
    let search = search_term(query.search.as_deref());

    let entitlement = load_entitlement(&state, &tenant, &auth_user).await?;
    let filter = visibility_filter(&entitlement, None);

    let mut count = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) FROM contents c JOIN modules m ON m.id = c.module_id",
    );
    push_conditions(&mut count, &tenant, &filter, query.module_id, search);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(&state.db).await?;

    let mut select = QueryBuilder::<Postgres>::new(
        "SELECT c.* FROM contents c JOIN modules m ON m.id = c.module_id",
    );
    push_conditions(&mut select, &tenant, &filter, query.module_id, search);
    select.push(r#" ORDER BY c."order" ASC, c.created_at ASC LIMIT "#);
    select.push_bind(page.limit);
    select.push(" OFFSET ");
    select.push_bind(page.offset());
    let data = select
        .build_query_as::<Content>()
        .fetch_all(&state.db)
        .await?;

    Ok(Json(Paginated {
        data,
        meta: PageMeta::new(total, page.page, page.limit),
    }))
}

/// GET /api/content/{id}
#[tracing::instrument(skip(state, auth_user), fields(user_id = %auth_user.id, tenant = %tenant))]
pub async fn get_content(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Content>, CatalogError> {
    let row = sqlx::query_as::<_, ContentWithType>(
        r"
        SELECT c.*, m.type_id AS module_type_id
        FROM contents c
        JOIN modules m ON m.id = c.module_id
        WHERE m.tenant = $1 AND c.id = $2
        ",
    )
    .bind(tenant.as_str())
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(CatalogError::NotFound("Content"))?;

    let entitlement = load_entitlement(&state, &tenant, &auth_user).await?;
    if !visibility_filter(&entitlement, None).matches(row.module_type_id) {
        return Err(CatalogError::NotFound("Content"));
    }

    Ok(Json(row.content))
}

/// POST /api/content
#[tracing::instrument(skip(state, body), fields(tenant = %tenant, module_id = %body.module_id))]
pub async fn create_content(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<ContentRequest>,
) -> Result<(StatusCode, Json<Content>), CatalogError> {
    body.validate()?;
    check_module(&state.db, &tenant, body.module_id).await?;

    let video_url = body.video_url.trim();
    let (source, thumbnail) = video::derive(video_url);

    let content = sqlx::query_as::<_, Content>(
        r#"
        INSERT INTO contents (module_id, title, description, video_url, video_source, thumbnail, "order")
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(body.module_id)
    .bind(body.title.trim())
    .bind(&body.description)
    .bind(video_url)
    .bind(source)
    .bind(thumbnail)
    .bind(body.order)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(content_id = %content.id, source = ?source, "Content created");
    Ok((StatusCode::CREATED, Json(content)))
}

/// Replace a lesson, recomputing its video source and thumbnail.
///
/// PUT /api/content/{id}
#[tracing::instrument(skip(state, body), fields(tenant = %tenant))]
pub async fn update_content(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(body): Json<ContentRequest>,
) -> Result<Json<Content>, CatalogError> {
    body.validate()?;
    check_module(&state.db, &tenant, body.module_id).await?;

    let video_url = body.video_url.trim();
    let (source, thumbnail) = video::derive(video_url);

    let content = sqlx::query_as::<_, Content>(
        r#"
        UPDATE contents c
        SET module_id = $1, title = $2, description = $3, video_url = $4,
            video_source = $5, thumbnail = $6, "order" = $7, updated_at = NOW()
        FROM modules m
        WHERE c.id = $8 AND c.module_id = m.id AND m.tenant = $9
        RETURNING c.*
        "#,
    )
    .bind(body.module_id)
    .bind(body.title.trim())
    .bind(&body.description)
    .bind(video_url)
    .bind(source)
    .bind(thumbnail)
    .bind(body.order)
    .bind(id)
    .bind(tenant.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or(CatalogError::NotFound("Content"))?;

    Ok(Json(content))
}

/// DELETE /api/content/{id}
#[tracing::instrument(skip(state), fields(tenant = %tenant))]
pub async fn delete_content(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CatalogError> {
    let result = sqlx::query(
        "DELETE FROM contents c USING modules m WHERE c.id = $1 AND c.module_id = m.id AND m.tenant = $2",
    )
    .bind(id)
    .bind(tenant.as_str())
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CatalogError::NotFound("Content"));
    }

    tracing::info!(content_id = %id, "Content deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Apply a batch of lesson positions atomically.
///
/// PUT /api/content/reorder
#[tracing::instrument(skip(state, body), fields(tenant = %tenant, items = body.items.len()))]
pub async fn reorder_content(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<ReorderRequest>,
) -> Result<StatusCode, CatalogError> {
    let mut tx = state.db.begin().await?;

    for item in &body.items {
        let result = sqlx::query(
            r#"
            UPDATE contents c
            SET "order" = $1, updated_at = NOW()
            FROM modules m
            WHERE c.id = $2 AND c.module_id = m.id AND m.tenant = $3
            "#,
        )
        .bind(item.order)
        .bind(item.id)
        .bind(tenant.as_str())
        .execute(&mut *tx)
        .await?;

        // Dropping the transaction rolls back earlier updates.
        if result.rows_affected() == 0 {
            tracing::warn!(content_id = %item.id, "Reorder target not found");
            return Err(CatalogError::NotFound("Content"));
        }
    }

    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
