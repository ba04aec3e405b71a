//! Background runner driving the dispatch engine.
//!
//! Spawns one loop per concern: enqueue, dispatch, cooldown sweep, throttle
//! sweep, reconciliation and maintenance. Every loop polls on its own
//! interval and exits on the shared shutdown signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::DispatchIntervals;
use crate::history::SearchEvent;
use crate::library::LibraryStore;
use crate::metrics;
use crate::reconciler::{Maintenance, SyncReconciler};

use super::service::DispatchService;
use super::types::{DispatchError, DispatchStatus};

/// The background runner. Owns no state of its own beyond the shutdown
/// plumbing; all work happens in [`DispatchService`], [`SyncReconciler`]
/// and [`Maintenance`].
pub struct DispatchRunner {
    config: DispatchIntervals,
    service: Arc<DispatchService>,
    reconciler: Arc<SyncReconciler>,
    maintenance: Arc<Maintenance>,
    library: Arc<dyn LibraryStore>,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DispatchRunner {
    pub fn new(
        config: DispatchIntervals,
        service: Arc<DispatchService>,
        reconciler: Arc<SyncReconciler>,
        maintenance: Arc<Maintenance>,
        library: Arc<dyn LibraryStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            service,
            reconciler,
            maintenance,
            library,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the background loops.
    pub async fn start(&self) {
        if !self.config.enabled {
            info!("dispatch runner disabled by configuration");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("dispatch runner already running");
            return;
        }

        info!("starting dispatch runner");

        self.spawn_enqueue_loop();
        self.spawn_dispatch_loop();
        self.spawn_cooldown_sweep_loop();
        self.spawn_throttle_sweep_loop();
        self.spawn_sync_loop();
        self.spawn_maintenance_loop();

        info!("dispatch runner started");
    }

    /// Stop the background loops gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("dispatch runner not running");
            return;
        }

        info!("stopping dispatch runner");
        let _ = self.shutdown_tx.send(());

        // Give loops a moment to finish current work
        tokio::time::sleep(Duration::from_millis(500)).await;

        info!("dispatch runner stopped");
    }

    pub async fn status(&self) -> Result<DispatchStatus, DispatchError> {
        self.service
            .status(self.running.load(Ordering::Relaxed))
            .await
    }

    fn spawn_enqueue_loop(&self) {
        let running = Arc::clone(&self.running);
        let service = Arc::clone(&self.service);
        let interval = Duration::from_secs(self.config.enqueue_interval_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("enqueue loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("enqueue loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = service.enqueue_pending(Utc::now()) {
                            error!("enqueue pass failed: {}", e);
                        }
                    }
                }
            }
            info!("enqueue loop stopped");
        });
    }

    fn spawn_dispatch_loop(&self) {
        let running = Arc::clone(&self.running);
        let service = Arc::clone(&self.service);
        let interval = Duration::from_secs(self.config.dispatch_interval_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("dispatch loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("dispatch loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = service.dispatch_all(Utc::now()).await {
                            error!("dispatch pass failed: {}", e);
                        }
                    }
                }
            }
            info!("dispatch loop stopped");
        });
    }

    /// Cooldown expiry and the stuck-searching reaper share one loop; both
    /// repair registry state on the same cadence.
    fn spawn_cooldown_sweep_loop(&self) {
        let running = Arc::clone(&self.running);
        let service = Arc::clone(&self.service);
        let interval = Duration::from_secs(self.config.cooldown_sweep_interval_secs);
        let stuck_timeout = self.config.searching_stuck_timeout_secs;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("cooldown sweep loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("cooldown sweep loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        let now = Utc::now();
                        match service.sweep_cooldowns(now) {
                            Ok(released) if released > 0 => {
                                info!(released, "cooldowns expired");
                            }
                            Ok(_) => {}
                            Err(e) => error!("cooldown sweep failed: {}", e),
                        }
                        if let Err(e) = service.reap_stuck(now, stuck_timeout) {
                            error!("stuck-searching reap failed: {}", e);
                        }
                    }
                }
            }
            info!("cooldown sweep loop stopped");
        });
    }

    fn spawn_throttle_sweep_loop(&self) {
        let running = Arc::clone(&self.running);
        let service = Arc::clone(&self.service);
        let interval = Duration::from_secs(self.config.throttle_sweep_interval_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("throttle sweep loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("throttle sweep loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = service.sweep_throttles(Utc::now()) {
                            error!("throttle sweep failed: {}", e);
                        }
                    }
                }
            }
            info!("throttle sweep loop stopped");
        });
    }

    /// Reconciliation holds the connection's dispatch lock for the whole
    /// pass, so a sync never interleaves with an in-flight dispatch cycle.
    fn spawn_sync_loop(&self) {
        let running = Arc::clone(&self.running);
        let service = Arc::clone(&self.service);
        let reconciler = Arc::clone(&self.reconciler);
        let library = Arc::clone(&self.library);
        let interval = Duration::from_secs(self.config.sync_interval_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("sync loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("sync loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        let connections = match library.list_enabled_connections() {
                            Ok(connections) => connections,
                            Err(e) => {
                                error!("failed to list connections for sync: {}", e);
                                continue;
                            }
                        };
                        for connection in &connections {
                            let lock = service.connection_lock(connection.id).await;
                            let _guard = lock.lock().await;
                            match reconciler.sync_connection(connection).await {
                                Ok(_) => {
                                    metrics::SYNC_RUNS.with_label_values(&["ok"]).inc();
                                }
                                Err(e) => {
                                    metrics::SYNC_RUNS.with_label_values(&["failed"]).inc();
                                    error!(
                                        connection_id = connection.id,
                                        "reconciliation failed: {}", e
                                    );
                                    reconciler
                                        .history()
                                        .emit(SearchEvent::SyncFailed {
                                            connection_id: connection.id,
                                            error: e.to_string(),
                                        })
                                        .await;
                                }
                            }
                        }
                    }
                }
            }
            info!("sync loop stopped");
        });
    }

    fn spawn_maintenance_loop(&self) {
        let running = Arc::clone(&self.running);
        let maintenance = Arc::clone(&self.maintenance);
        let interval = Duration::from_secs(self.config.maintenance_interval_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("maintenance loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("maintenance loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match maintenance.run() {
                            Ok(report) => {
                                if report.orphans_removed > 0
                                    || report.exhausted_pruned > 0
                                    || report.history_pruned > 0
                                {
                                    info!(
                                        orphans = report.orphans_removed,
                                        exhausted = report.exhausted_pruned,
                                        history = report.history_pruned,
                                        "maintenance pass complete"
                                    );
                                }
                            }
                            Err(e) => error!("maintenance pass failed: {}", e),
                        }
                    }
                }
            }
            info!("maintenance loop stopped");
        });
    }
}
