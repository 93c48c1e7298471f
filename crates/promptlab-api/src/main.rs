//! PromptLab API Server
//!
//! Serves the tenant-scoped REST API over a SQLite database.

use promptlab_api::{router, ApiConfig, AppState};
use promptlab_storage::SqliteStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env()
        .and_then(|config| config.validate().map(|()| config))
        .unwrap_or_else(|e| {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        });

    tracing::info!("Using database at: {}", config.db_path);

    let store = SqliteStore::new(config.db_path.clone());
    if config.run_migrations {
        match store.initialize().await {
            Ok(0) => tracing::info!("Database schema is up to date"),
            Ok(applied) => tracing::info!(applied, "Applied database migrations"),
            Err(e) => {
                tracing::error!("Failed to initialize database: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        tracing::warn!("Skipping migrations (PROMPTLAB_RUN_MIGRATIONS=false)");
    }

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(store, config));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("PromptLab API listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("PromptLab API stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
