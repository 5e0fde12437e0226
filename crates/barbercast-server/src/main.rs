//! Barbercast - Campaign dispatcher entry point

use anyhow::Result;
use barbercast_api::{create_router, AppState};
use barbercast_common::config::{Config, LoggingConfig};
use barbercast_core::{CampaignDispatcher, ChatProConnector, DispatcherOptions};
use barbercast_storage::{DatabasePool, Repositories};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Barbercast campaign dispatcher...");

    let options = DispatcherOptions::from_config(&config.dispatcher)?;

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    let repos = Repositories::postgres(db_pool.clone());

    let connector = ChatProConnector::new(Duration::from_secs(
        config.dispatcher.gateway_timeout_secs,
    ))?;

    let dispatcher = CampaignDispatcher::new(repos.clone(), Arc::new(connector), options);

    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        repos,
        readiness: Arc::new(db_pool),
        auth_token: config.api.auth_token.clone(),
    };

    if state.auth_token.is_none() {
        tracing::warn!("api.auth_token is not set, the API is unauthenticated");
    }

    let app = create_router(state);
    let addr = format!("{}:{}", config.server.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting API server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Barbercast shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},barbercast=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
