//! Pesto - A clipboard history service
//!
//! Keeps a persisted list of clipboard entries with a single "current" item
//! and serves it over HTTP with an OpenAPI description.

pub mod api;
pub mod clipboard;
pub mod config;
pub mod storage;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use api::{openapi, ApiContext};
use clipboard::{ClipboardService, HistoryPolicy};
use config::{ConfigError, Settings, CONFIG_PATH_ENV};
use storage::{SqliteStore, StoreError};

/// Startup error type
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to open database: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to bind HTTP server: {0}")]
    Bind(#[from] warp::Error),
}

/// Load settings from `PESTO_CONFIG` (if set) and the environment
pub fn load_settings() -> Result<Settings, ConfigError> {
    let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    Settings::load(path.as_deref())
}

/// Wire the service for `settings` around an opened store
pub fn build_context(settings: &Settings, store: SqliteStore) -> ApiContext {
    let service = ClipboardService::new(Arc::new(store), HistoryPolicy::from(settings));
    ApiContext::new(Arc::new(service), settings.request_timeout())
}

/// Serve until `shutdown` resolves
pub async fn serve<S>(settings: &Settings, shutdown: S) -> Result<(), StartupError>
where
    S: Future<Output = ()> + Send + 'static,
{
    log::info!("Data directory: {:?}", settings.data_dir);
    let store = SqliteStore::open(&settings.data_dir)?;
    let ctx = build_context(settings, store);

    let doc = openapi::document(
        openapi::CLIPBOARD_ROUTES,
        &format!("http://{}", settings.bind_addr),
    );
    let routes = api::routes(ctx, Arc::new(doc));

    let (addr, server) = warp::serve(routes).try_bind_with_graceful_shutdown(settings.bind_addr, shutdown)?;
    log::info!("Listening on http://{}", addr);

    server.await;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}

/// Application main entry point
pub async fn run() -> Result<(), StartupError> {
    // Pick up RUST_LOG and PESTO_* from .env before anything reads them
    let _ = dotenvy::dotenv();

    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Pesto starting...");

    let settings = load_settings()?;
    log::debug!("Settings: {:?}", settings);

    serve(&settings, shutdown_signal()).await
}
