//! Search history event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Search history event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Dispatch lifecycle
    SearchDispatched {
        connection_id: i64,
        entry_id: String,
        title: String,
        search_kind: String,
        batch_size: usize,
        command_id: i64,
    },
    SearchFailed {
        connection_id: i64,
        entry_id: String,
        title: String,
        category: String,
        attempt_count: u32,
        resulting_state: String,
    },
    SearchThrottled {
        connection_id: i64,
        reason: String,
        retry_at: DateTime<Utc>,
    },
    ConnectionPaused {
        connection_id: i64,
        until: DateTime<Utc>,
        reason: String,
    },
    ConnectionSuspended {
        connection_id: i64,
        reason: String,
    },

    // Reconciliation
    SyncCompleted {
        connection_id: i64,
        upserted: u64,
        deleted: u64,
        candidates: u64,
        failures: u64,
    },
    SyncFailed {
        connection_id: i64,
        error: String,
    },
}

impl SearchEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SearchEvent::ServiceStarted { .. } => "service_started",
            SearchEvent::ServiceStopped { .. } => "service_stopped",
            SearchEvent::SearchDispatched { .. } => "search_dispatched",
            SearchEvent::SearchFailed { .. } => "search_failed",
            SearchEvent::SearchThrottled { .. } => "search_throttled",
            SearchEvent::ConnectionPaused { .. } => "connection_paused",
            SearchEvent::ConnectionSuspended { .. } => "connection_suspended",
            SearchEvent::SyncCompleted { .. } => "sync_completed",
            SearchEvent::SyncFailed { .. } => "sync_failed",
        }
    }

    pub fn connection_id(&self) -> Option<i64> {
        match self {
            SearchEvent::ServiceStarted { .. } | SearchEvent::ServiceStopped { .. } => None,
            SearchEvent::SearchDispatched { connection_id, .. }
            | SearchEvent::SearchFailed { connection_id, .. }
            | SearchEvent::SearchThrottled { connection_id, .. }
            | SearchEvent::ConnectionPaused { connection_id, .. }
            | SearchEvent::ConnectionSuspended { connection_id, .. }
            | SearchEvent::SyncCompleted { connection_id, .. }
            | SearchEvent::SyncFailed { connection_id, .. } => Some(*connection_id),
        }
    }

    pub fn entry_id(&self) -> Option<&str> {
        match self {
            SearchEvent::SearchDispatched { entry_id, .. }
            | SearchEvent::SearchFailed { entry_id, .. } => Some(entry_id),
            _ => None,
        }
    }
}

/// A history event as stored, with its assigned id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub connection_id: Option<i64>,
    pub entry_id: Option<String>,
    pub data: SearchEvent,
}
