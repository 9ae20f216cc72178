//! POI annotator server
//!
//! Serves the map front-end and the POI store API.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use poi_annotator::config::Config;
use poi_annotator::{create_router, store, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting POI annotator");
    tracing::info!("Store backend: {:?}", config.store_backend);
    tracing::info!("POI data directory: {:?}", config.data_dir);
    tracing::info!("Static directory: {:?}", config.static_dir);
    tracing::info!(
        "Map {}x{}, offset ({}, {}), scale {}",
        config.view.frame.width,
        config.view.frame.height,
        config.view.frame.offset.x,
        config.view.frame.offset.y,
        config.view.frame.scale_factor
    );

    if config.admin_key.is_none() {
        tracing::warn!("No admin key configured (POI_ADMIN_KEY). Approving POIs is disabled!");
    }

    let store = store::open_store(&config).await?;
    let info = store.inspect().await?;
    tracing::info!("Store ready: {} at {}", info.backend, info.location);

    let bind_addr = config.bind_addr;
    let app = create_router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
