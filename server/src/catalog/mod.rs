//! Course Catalog
//!
//! Module types, modules and lessons, all scoped to the request tenant.

pub mod content;
pub mod module_types;
pub mod modules;
pub mod types;
pub mod video;

use axum::routing::{get, post, put};
use axum::Router;

use crate::api::AppState;

pub use types::CatalogError;

/// Read routes filtered by the caller's entitlement. Mounted behind the session gate.
pub fn viewer_router() -> Router<AppState> {
    Router::new()
        .route("/api/modules", get(modules::list_modules))
        .route("/api/modules/{id}", get(modules::get_module))
        .route("/api/content", get(content::list_content))
        .route("/api/content/{id}", get(content::get_content))
}

/// Catalog writes. Mounted behind `require_admin`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/modules", post(modules::create_module))
        .route(
            "/api/modules/{id}",
            put(modules::update_module).delete(modules::delete_module),
        )
        .route("/api/content", post(content::create_content))
        .route("/api/content/reorder", put(content::reorder_content))
        .route(
            "/api/content/{id}",
            put(content::update_content).delete(content::delete_content),
        )
        .route("/api/module-types", post(module_types::create_module_type))
        .route(
            "/api/module-types/{id}",
            put(module_types::update_module_type).delete(module_types::delete_module_type),
        )
}

/// Module type reads for any signed-in user.
pub fn module_types_router() -> Router<AppState> {
    Router::new()
        .route("/api/module-types", get(module_types::list_module_types))
        .route("/api/module-types/dropdown", get(module_types::dropdown))
}
