//! SitePulse Analytics Engine
//!
//! Server-side collection and aggregation for multi-tenant web analytics:
//! - Event admission with per-site rate limits and payload validation
//! - Streaming sessionization and rollup aggregation
//! - Click heatmaps, scroll depth, threshold alerting
//! - Query API over committed aggregates

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use api::{router, AppState};
use event_store::EventStore;
use pipeline::{LogDispatcher, Pipeline, PipelineConfig};
use pulse_core::{InMemorySiteDirectory, Site};
use telemetry::{health, init_tracing_from_env};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Sites seeded into the directory at startup
    #[serde(default)]
    sites: Vec<SiteConfig>,
}

/// One seeded tenant site.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SiteConfig {
    id: uuid::Uuid,
    name: String,
    domain: String,
    #[serde(default = "default_true")]
    active: bool,
    rate_limit: Option<u32>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sites: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting SitePulse Analytics Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    // Seed the site directory
    let directory = Arc::new(InMemorySiteDirectory::new());
    for site in &config.sites {
        directory.insert(Site {
            id: site.id,
            name: site.name.clone(),
            domain: site.domain.clone(),
            active: site.active,
            rate_limit: site.rate_limit,
        });
    }
    info!(sites = config.sites.len(), "Site directory seeded");

    // Event store and processing pipeline
    let store = Arc::new(EventStore::new());
    health().store.set_healthy();

    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        Arc::new(LogDispatcher),
        PipelineConfig::default(),
    ));
    let _pipeline_handles = pipeline.start();

    // Application state and router
    let state = AppState::new(store, pipeline, directory);
    let _rate_limiter_cleanup = state.start_rate_limiter_cleanup();
    let app = router(state);

    // Start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("SITEPULSE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    if let Ok(host) = std::env::var("SITEPULSE_HOST") {
        config.host = host;
    }
    if let Ok(port) = std::env::var("SITEPULSE_PORT") {
        config.port = port.parse().context("Invalid SITEPULSE_PORT")?;
    }

    Ok(config)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
