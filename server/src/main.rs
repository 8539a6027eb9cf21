//! LMS Server - Main Entry Point

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use lms_server::{api, config, db};

/// How often expired refresh sessions are purged.
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Timeout for Discord REST calls.
const DISCORD_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lms_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting LMS Server");

    // Initialize database
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;

    // Initialize Redis
    let redis = db::create_redis_client(&config.redis_url).await?;

    let http = reqwest::Client::builder()
        .timeout(DISCORD_HTTP_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    // Build application state
    let state = api::AppState::new(db_pool.clone(), redis, config.clone(), http);

    if !config.has_discord_oauth() {
        warn!("Discord login disabled: DISCORD_CLIENT_ID, DISCORD_CLIENT_SECRET or DISCORD_REDIRECT_URI not set");
    }
    if !config.has_discord_gateway() {
        warn!("Discord role sync disabled: DISCORD_BOT_TOKEN or DISCORD_GUILD_ID not set");
    }

    // Purge expired sessions in the background
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match db::cleanup_expired_sessions(&db_pool).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Expired sessions cleaned up"),
                Err(e) => error!(error = %e, "Session cleanup failed"),
            }
        }
    });

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    info!("Server shutdown complete");

    Ok(())
}
