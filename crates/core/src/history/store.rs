use chrono::{DateTime, Utc};
use thiserror::Error;

use super::HistoryRecord;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying history events
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub connection_id: Option<i64>,
    pub entry_id: Option<String>,
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl HistoryFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_connection(mut self, connection_id: i64) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    pub fn with_entry_id(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = Some(entry_id.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for search history storage
pub trait HistoryStore: Send + Sync {
    /// Insert a history record, returns the assigned ID
    fn insert(&self, record: &HistoryRecord) -> Result<i64, HistoryError>;

    /// Query history records with optional filters
    fn query(&self, filter: &HistoryFilter) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Count matching history records
    fn count(&self, filter: &HistoryFilter) -> Result<i64, HistoryError>;

    /// Delete records older than the cutoff; returns the number removed
    fn prune(&self, cutoff: DateTime<Utc>) -> Result<u32, HistoryError>;
}
