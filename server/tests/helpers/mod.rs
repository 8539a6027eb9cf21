//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for sending requests through the full axum router,
//! plus utilities for seeding users, module types and access tokens.
//!
//! [`TestApp::offline`] uses a lazily-connected pool and an unconnected Redis
//! client, so routes that answer before touching storage run without services.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{self, Method, Request, Response};
use axum::Router;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use http_body_util::BodyExt;
use lms_common::UserRole;
use lms_server::api::{create_router, AppState};
use lms_server::auth::{jwt, password};
use lms_server::config::Config;
use lms_server::db;
use lms_server::discord::{GatewayError, RoleGateway};
use lms_server::entitlements::RoleSet;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

/// Password given to every seeded user.
pub const TEST_PASSWORD: &str = "correct-horse";

// ============================================================================
// Role gateway fake
// ============================================================================

/// Gateway returning the same roles for every member.
pub struct FixedRoles(pub Vec<&'static str>);

impl RoleGateway for FixedRoles {
    fn fetch_roles<'a>(
        &'a self,
        _member_id: &'a str,
    ) -> BoxFuture<'a, Result<RoleSet, GatewayError>> {
        let roles: RoleSet = self.0.iter().copied().collect();
        Box::pin(async move { Ok(roles) })
    }
}

// ============================================================================
// Cleanup Guard
// ============================================================================

/// Async cleanup action type.
type CleanupAction = Box<dyn FnOnce(PgPool) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// RAII guard that runs cleanup actions on drop, even if the test panics.
pub struct CleanupGuard {
    pool: PgPool,
    actions: Vec<CleanupAction>,
}

impl CleanupGuard {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            actions: Vec::new(),
        }
    }

    /// Register a generic async cleanup action.
    pub fn add<F, Fut>(&mut self, action: F)
    where
        F: FnOnce(PgPool) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.actions.push(Box::new(move |pool| Box::pin(action(pool))));
    }

    pub fn delete_user(&mut self, user_id: Uuid) {
        self.add(move |pool| async move {
            let _ = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(user_id)
                .execute(&pool)
                .await;
        });
    }

    /// Remove everything seeded into a tenant.
    pub fn delete_tenant(&mut self, tenant: String) {
        self.add(move |pool| async move {
            let _ = sqlx::query("DELETE FROM modules WHERE tenant = $1")
                .bind(&tenant)
                .execute(&pool)
                .await;
            let _ = sqlx::query("DELETE FROM module_types WHERE tenant = $1")
                .bind(&tenant)
                .execute(&pool)
                .await;
        });
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let actions = std::mem::take(&mut self.actions);
        if actions.is_empty() {
            return;
        }

        let pool = self.pool.clone();
        let handle = tokio::runtime::Handle::current();

        std::thread::spawn(move || {
            handle.block_on(async move {
                for action in actions {
                    action(pool.clone()).await;
                }
            });
        })
        .join()
        .expect("Cleanup thread panicked");
    }
}

// ============================================================================
// Test App
// ============================================================================

/// A test application wrapping the full axum router.
pub struct TestApp {
    pub router: Router,
    pub pool: PgPool,
    pub config: Arc<Config>,
}

fn unconnected_redis() -> fred::clients::Client {
    fred::clients::Client::new(fred::prelude::Config::default(), None, None, None)
}

fn build(state: AppState, pool: PgPool, config: Config) -> TestApp {
    let router = create_router(state)
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    TestApp {
        router,
        pool,
        config: Arc::new(config),
    }
}

impl TestApp {
    /// App whose storage is never reached. Requests that hit the database fail.
    pub fn offline() -> Self {
        Self::offline_with_config(Config::default_for_test())
    }

    pub fn offline_with_config(config: Config) -> Self {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy(&config.database_url)
            .expect("Invalid test database URL");
        let state = AppState::new(
            pool.clone(),
            unconnected_redis(),
            config.clone(),
            reqwest::Client::new(),
        );
        build(state, pool, config)
    }

    /// App backed by the test database, with a fixed role gateway.
    pub async fn connected(roles: Vec<&'static str>) -> Self {
        let config = Config::default_for_test();
        let pool = db::create_pool(&config.database_url)
            .await
            .expect("Failed to connect to test DB");
        db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let state = AppState::new(
            pool.clone(),
            unconnected_redis(),
            config.clone(),
            reqwest::Client::new(),
        )
        .with_gateway(Arc::new(FixedRoles(roles)));
        build(state, pool, config)
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// Access token for `user_id` carrying `roles`.
    pub fn token_for(&self, user_id: Uuid, roles: &[&str]) -> String {
        let roles: RoleSet = roles.iter().copied().collect();
        jwt::generate_token_pair(
            user_id,
            &roles,
            &self.config.jwt_private_key,
            self.config.jwt_access_expiry,
            self.config.jwt_refresh_expiry,
        )
        .expect("Failed to generate token pair")
        .access_token
    }

    pub fn cleanup_guard(&self) -> CleanupGuard {
        CleanupGuard::new(self.pool.clone())
    }
}

/// Read a response body as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

// ============================================================================
// Seeding
// ============================================================================

/// Options for a seeded user.
#[derive(Debug, Clone, Default)]
pub struct SeedUser {
    pub role: UserRole,
    pub discord_id: Option<String>,
    pub is_trial: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl SeedUser {
    /// Regular learner with a linked Discord account.
    pub fn linked() -> Self {
        Self {
            discord_id: Some(format!("{}", Uuid::new_v4().as_u128() % 1_000_000_000_000)),
            ..Self::default()
        }
    }
}

/// Create a user and return its id.
pub async fn create_test_user(pool: &PgPool, seed: SeedUser) -> Uuid {
    let email = format!("httptest_{}@example.com", &Uuid::new_v4().to_string()[..8]);
    let hash = password::hash_password(TEST_PASSWORD).expect("Failed to hash password");

    sqlx::query_scalar(
        r"
        INSERT INTO users (email, name, password_hash, role, is_trial, trial_ends_at, discord_id)
        VALUES ($1, 'HTTP Test User', $2, $3, $4, $5, $6)
        RETURNING id
        ",
    )
    .bind(&email)
    .bind(&hash)
    .bind(seed.role)
    .bind(seed.is_trial)
    .bind(seed.trial_ends_at)
    .bind(seed.discord_id)
    .fetch_one(pool)
    .await
    .expect("Failed to create test user")
}

/// Unique tenant slug for one test.
pub fn test_tenant() -> String {
    format!("t-{}", &Uuid::new_v4().simple().to_string()[..12])
}

/// Create a module type, optionally mapped to a Discord role.
pub async fn create_module_type(
    pool: &PgPool,
    tenant: &str,
    name: &str,
    is_aio: bool,
    role_id: Option<&str>,
) -> Uuid {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO module_types (tenant, name, is_aio) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(tenant)
    .bind(name)
    .bind(is_aio)
    .fetch_one(pool)
    .await
    .expect("Failed to create module type");

    if let Some(role_id) = role_id {
        sqlx::query(
            "INSERT INTO module_type_role_mappings (tenant, module_type_id, discord_role_id) VALUES ($1, $2, $3)",
        )
        .bind(tenant)
        .bind(id)
        .bind(role_id)
        .execute(pool)
        .await
        .expect("Failed to map role");
    }
    id
}

/// Create a module with no lessons.
pub async fn create_module(pool: &PgPool, tenant: &str, title: &str, type_id: Option<Uuid>) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO modules (tenant, title, description, type_id) VALUES ($1, $2, '', $3) RETURNING id",
    )
    .bind(tenant)
    .bind(title)
    .bind(type_id)
    .fetch_one(pool)
    .await
    .expect("Failed to create module")
}

/// Create a lesson in a module.
pub async fn create_lesson(pool: &PgPool, module_id: Uuid, title: &str, order: i32) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO contents (module_id, title, description, video_url, video_source, "order")
        VALUES ($1, $2, '', 'https://cdn.example.com/a.mp4', 'DIRECT_UPLOAD', $3)
        RETURNING id
        "#,
    )
    .bind(module_id)
    .bind(title)
    .bind(order)
    .fetch_one(pool)
    .await
    .expect("Failed to create lesson")
}
