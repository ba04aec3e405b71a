//! Types for the dispatch service and runner.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while dispatching.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Registry store error.
    #[error("registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    /// Library store error.
    #[error("library error: {0}")]
    Library(#[from] crate::library::LibraryError),

    /// Throttle store error.
    #[error("throttle error: {0}")]
    Throttle(#[from] crate::throttle::ThrottleError),

    /// A referenced content row is missing.
    #[error("missing content for entry {0}")]
    MissingContent(String),
}

/// Registry entry counts by state, plus queue depth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchStatus {
    /// Whether the runner loops are active.
    pub running: bool,
    pub pending_count: usize,
    pub queued_count: usize,
    pub searching_count: usize,
    pub cooldown_count: usize,
    pub exhausted_count: usize,
    pub queue_depth: usize,
    /// Connections whose queue is currently paused by an operator.
    pub paused_connections: Vec<i64>,
}
