//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::sync::Arc;

use axum::{
    extract::State, middleware::from_fn, middleware::from_fn_with_state, routing::get, Json,
    Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    admin, auth, catalog,
    config::Config,
    discord::{DiscordGateway, DiscordOAuth, RoleGateway},
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,
    /// Redis client (Discord login state)
    pub redis: fred::clients::Client,
    /// Server configuration
    pub config: Arc<Config>,
    /// Guild role lookups (optional)
    pub gateway: Option<Arc<dyn RoleGateway>>,
    /// Discord login (optional)
    pub discord_oauth: Option<DiscordOAuth>,
}

impl AppState {
    /// Create new application state. Discord features are enabled by config.
    #[must_use]
    pub fn new(
        db: PgPool,
        redis: fred::clients::Client,
        config: Config,
        http: reqwest::Client,
    ) -> Self {
        let gateway = DiscordGateway::from_config(&config, http.clone())
            .map(|g| Arc::new(g) as Arc<dyn RoleGateway>);
        let discord_oauth = DiscordOAuth::from_config(&config, http);

        Self {
            db,
            redis,
            config: Arc::new(config),
            gateway,
            discord_oauth,
        }
    }

    /// Replace the role gateway.
    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<dyn RoleGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Role gateway, when guild lookups are configured.
    #[must_use]
    pub fn role_gateway(&self) -> Option<&dyn RoleGateway> {
        self.gateway.as_deref()
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Entitlement-filtered reads: auth first, then the session gate
    let gated_routes = catalog::viewer_router()
        .route("/api/user/me", get(auth::get_profile))
        .layer(from_fn_with_state(state.clone(), auth::require_session_gate))
        .layer(from_fn_with_state(state.clone(), auth::require_auth));

    // Writes and user management (requires auth + admin)
    let admin_routes = catalog::admin_router()
        .nest("/api/admin", admin::router())
        .layer(from_fn(admin::require_admin))
        .layer(from_fn_with_state(state.clone(), auth::require_auth));

    let member_routes = catalog::module_types_router()
        .layer(from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Auth routes (pass state for middleware)
        .nest("/auth", auth::router(state.clone()))
        .merge(gated_routes)
        .merge(admin_routes)
        .merge(member_routes)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        // State
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Whether Discord login is enabled
    discord_login: bool,
    /// Whether guild role lookups are enabled
    role_sync: bool,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        discord_login: state.discord_oauth.is_some(),
        role_sync: state.gateway.is_some(),
    })
}
