//! Admin Module
//!
//! User management endpoints under `/api/admin`:
//! - Admin or Superadmin: list, create, update and delete users
//! - Superadmin only: monthly user reports

pub mod handlers;
pub mod middleware;
pub mod types;

use axum::{
    middleware::from_fn,
    routing::{get, put},
    Router,
};

use crate::api::AppState;

pub use middleware::{require_admin, require_superadmin};
pub use types::AdminError;

/// Create the admin router.
///
/// The caller mounts it behind `require_auth` and [`require_admin`].
pub fn router() -> Router<AppState> {
    let superadmin_routes = Router::new()
        .route("/reports/users", get(handlers::reports_users))
        .layer(from_fn(require_superadmin));

    Router::new()
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/{id}",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        .merge(superadmin_routes)
}
