mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use releasewatch_core::{
    build_providers, validate_config, verify_credentials, Config, ConfigHandle, Dispatcher,
    HistoryStore, QBittorrentClient, SanitizedConfig, Scheduler, SqliteHistoryStore,
    TorrentClient,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("RELEASEWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = ConfigHandle::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let snapshot = config.snapshot();

    // Validate configuration
    validate_config(&snapshot).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&*snapshot);
    let config_json = serde_json::to_string(&sanitized).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded: {}",
        config_json
    );

    // History store
    let history: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistoryStore::new(&snapshot.database.path)
            .context("Failed to open history database")?,
    );
    info!(
        path = ?snapshot.database.path,
        releases = history.count().unwrap_or(0),
        "History store initialized"
    );

    // Download client
    let qbit_config = snapshot
        .torrent_client
        .as_ref()
        .and_then(|tc| tc.qbittorrent.clone())
        .context("No torrent client configured")?;
    info!("Initializing qBittorrent client at {}", qbit_config.url);
    let client: Arc<dyn TorrentClient> = Arc::new(
        QBittorrentClient::new(qbit_config).context("Failed to create qBittorrent client")?,
    );

    // Providers
    let providers = build_providers(&snapshot).context("Failed to create providers")?;
    check_credentials(&snapshot).await?;
    info!(
        providers = providers.len(),
        active_feeds = snapshot.rss_feeds().count(),
        active_services = snapshot.enabled_services().count(),
        "Providers initialized"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        config.clone(),
        Arc::clone(&client),
        Arc::clone(&history),
    ));
    let scheduler = Scheduler::new(config.clone(), history, dispatcher, providers);

    if snapshot.scheduler.enabled {
        scheduler.start();
    } else {
        info!("Scheduler disabled, nothing to do until shutdown");
    }

    shutdown_signal().await;
    info!("Shutting down...");

    if scheduler.is_running() {
        scheduler.stop().await;
    }

    metrics::collect_dynamic_metrics(&scheduler);
    match metrics::encode_metrics() {
        Ok(text) => info!("Final metrics:\n{}", text),
        Err(e) => warn!("Failed to encode metrics: {}", e),
    }

    Ok(())
}

/// Log the outcome of a `userInfo` call for every enabled API service.
///
/// A failed check only warns; the service is still polled and reports its
/// own errors per tick.
async fn check_credentials(config: &Config) -> Result<()> {
    let outcomes = verify_credentials(config)
        .await
        .context("Failed to create API client for credential check")?;
    for (service, outcome) in outcomes {
        match outcome {
            Ok(()) => info!(provider = %service, "API credentials accepted"),
            Err(e) => warn!(provider = %service, "API credential check failed: {}", e),
        }
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
