//! Portalen - CMS, product catalogue and customer portal backend

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portalen::{
    api::{self, AppState},
    config::Config,
    db,
};

/// Expired sessions and stale rate-limit entries are swept this often
const CLEANUP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portalen=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Portalen...");

    // Load configuration, environment variables win over the file
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected");

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cors_origin = config.server.cors_origin.clone();
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::build(config, pool)?;
    tracing::info!(
        two_factor_grace_days = state.config.security.two_factor_grace_days,
        "Services initialized"
    );

    // Session cleanup task
    {
        let users = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match users.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Expired sessions removed"),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state, &cors_origin)?;

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
