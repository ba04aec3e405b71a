//! Periodic housekeeping: orphan cleanup and retention pruning.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::history::HistoryStore;
use crate::library::LibraryStore;
use crate::registry::RegistryStore;

use super::sync::SyncError;

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Registry entries dropped because their content row is gone.
    pub orphans_removed: u64,
    /// Exhausted entries past the retention window.
    pub exhausted_pruned: u64,
    /// History rows past the retention window.
    pub history_pruned: u64,
}

pub struct Maintenance {
    library: Arc<dyn LibraryStore>,
    registry: Arc<dyn RegistryStore>,
    history: Arc<dyn HistoryStore>,
    retention: RetentionConfig,
}

impl Maintenance {
    pub fn new(
        library: Arc<dyn LibraryStore>,
        registry: Arc<dyn RegistryStore>,
        history: Arc<dyn HistoryStore>,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            library,
            registry,
            history,
            retention,
        }
    }

    /// One full pass over every connection.
    pub fn run(&self) -> Result<MaintenanceReport, SyncError> {
        let mut report = MaintenanceReport::default();
        let now = Utc::now();

        for connection in self.library.list_connections()? {
            report.orphans_removed += self.remove_orphans(connection.id)?;
        }

        let exhausted_cutoff = now - Duration::days(i64::from(self.retention.exhausted_days));
        report.exhausted_pruned = u64::from(self.registry.prune_exhausted(exhausted_cutoff)?);

        let history_cutoff = now - Duration::days(i64::from(self.retention.history_days));
        match self.history.prune(history_cutoff) {
            Ok(pruned) => report.history_pruned = u64::from(pruned),
            Err(e) => warn!(error = %e, "history prune failed"),
        }

        if report != MaintenanceReport::default() {
            info!(
                orphans = report.orphans_removed,
                exhausted = report.exhausted_pruned,
                history = report.history_pruned,
                "maintenance pass complete"
            );
        }
        Ok(report)
    }

    /// Drop registry entries whose content row no longer exists. Normal sync
    /// never produces these; this catches externally-removed rows.
    fn remove_orphans(&self, connection_id: i64) -> Result<u64, SyncError> {
        let mut removed = 0u64;
        for (content_type, content_id) in self.registry.list_content_refs(connection_id)? {
            if !self
                .library
                .content_exists(connection_id, content_type, content_id)?
            {
                let deleted =
                    self.registry
                        .delete_for_content(connection_id, content_type, content_id)?;
                debug!(
                    connection_id,
                    content_type = content_type.as_str(),
                    content_id,
                    deleted,
                    "removed orphaned registry entries"
                );
                removed += u64::from(deleted);
            }
        }
        Ok(removed)
    }
}
