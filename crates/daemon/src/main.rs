use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seekarr_core::{
    create_history_system, load_config, validate_config, ArrHttpClient, DispatchRunner,
    DispatchService, HistoryStore, LibraryStore, Maintenance, RegistryStore, RemoteLibraryClient,
    SearchEvent, SqliteHistoryStore, SqliteLibraryStore, SqliteRegistryStore, SqliteThrottleStore,
    SyncReconciler, ThrottleEnforcer, ThrottleStore,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the history event channel
const HISTORY_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
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
    let config_path = std::env::var("SEEKARR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Compute config hash for the history log
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Open the SQLite stores
    let library: Arc<dyn LibraryStore> = Arc::new(
        SqliteLibraryStore::new(&config.database.path)
            .context("Failed to create library store")?,
    );
    info!("Library store initialized");

    let registry: Arc<dyn RegistryStore> = Arc::new(
        SqliteRegistryStore::new(&config.database.path)
            .context("Failed to create registry store")?,
    );
    info!("Registry store initialized");

    let throttle_store: Arc<dyn ThrottleStore> = Arc::new(
        SqliteThrottleStore::new(&config.database.path)
            .context("Failed to create throttle store")?,
    );
    info!("Throttle store initialized");

    let history_store: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistoryStore::new(&config.database.path)
            .context("Failed to create history store")?,
    );
    info!("History store initialized");

    // Create history system
    let (history_handle, history_writer) =
        create_history_system(Arc::clone(&history_store), HISTORY_BUFFER_SIZE);

    // Spawn history writer task
    let writer_handle = tokio::spawn(history_writer.run());

    // Emit ServiceStarted event
    history_handle
        .emit(SearchEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    // Remote client shared by dispatch and reconciliation
    let remote: Arc<dyn RemoteLibraryClient> = Arc::new(
        ArrHttpClient::new(config.dispatch.search_timeout_secs)
            .context("Failed to create remote client")?,
    );

    let throttle = Arc::new(ThrottleEnforcer::new(
        Arc::clone(&throttle_store),
        config.throttle.clone(),
    ));

    let service = Arc::new(DispatchService::new(
        Arc::clone(&library),
        Arc::clone(&registry),
        Arc::clone(&throttle),
        Arc::clone(&remote),
        history_handle.clone(),
        config.retry.clone(),
        config.batching.clone(),
        config.dispatch.search_timeout_secs,
    ));

    let reconciler = Arc::new(SyncReconciler::new(
        Arc::clone(&library),
        Arc::clone(&registry),
        Arc::clone(&remote),
        history_handle.clone(),
        config.sync.page_size,
    ));

    let maintenance = Arc::new(Maintenance::new(
        Arc::clone(&library),
        Arc::clone(&registry),
        Arc::clone(&history_store),
        config.retention.clone(),
    ));

    let runner = DispatchRunner::new(
        config.dispatch.clone(),
        Arc::clone(&service),
        Arc::clone(&reconciler),
        Arc::clone(&maintenance),
        Arc::clone(&library),
    );

    runner.start().await;
    info!("seekarr {} running", VERSION);

    shutdown_signal().await;

    info!("Shutting down...");
    runner.stop().await;

    // Emit ServiceStopped event
    history_handle
        .emit(SearchEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // Drop all holders of HistoryHandle so the writer's channel closes.
    // The service and reconciler hold clones; the final event goes out
    // before the handles are dropped.
    drop(runner);
    drop(service);
    drop(reconciler);
    drop(history_handle);

    // Wait for writer to finish processing remaining events
    let _ = writer_handle.await;
    info!("History writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
