//! Search registry storage trait and error type.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::RetryPolicy;
use crate::library::ContentType;

use super::types::{
    FailureCategory, NewRegistryEntry, QueueEntry, RegistryEntry, RegistryFilter, SearchKind,
    SearchState,
};

/// Error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry entry not found: {0}")]
    NotFound(String),

    #[error("Invalid transition for entry {entry_id}: cannot {operation} from state {from}")]
    InvalidTransition {
        entry_id: String,
        from: String,
        operation: String,
    },

    #[error("Entry already queued: {0}")]
    AlreadyQueued(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Persistence for the search state machine and its dispatch queue.
///
/// Every state transition is guarded: the update only applies when the row is
/// still in the expected source state, and a guard miss surfaces as
/// [`RegistryError::InvalidTransition`] rather than silently coercing.
pub trait RegistryStore: Send + Sync {
    /// Create an entry in `pending`, or return the existing entry for the same
    /// (connection, content, kind) key. Never resets attempt counts or state
    /// on an existing row; only the title snapshot is refreshed.
    fn upsert_entry(&self, new: NewRegistryEntry) -> Result<RegistryEntry, RegistryError>;

    /// Get an entry by id.
    fn get_entry(&self, id: &str) -> Result<Option<RegistryEntry>, RegistryError>;

    /// List entries matching a filter, newest first.
    fn list_entries(&self, filter: &RegistryFilter) -> Result<Vec<RegistryEntry>, RegistryError>;

    /// Count entries matching a filter (limit and offset are ignored).
    fn count_entries(&self, filter: &RegistryFilter) -> Result<i64, RegistryError>;

    /// Distinct content references that have at least one registry entry on
    /// the connection. Used by the orphan sweep.
    fn list_content_refs(
        &self,
        connection_id: i64,
    ) -> Result<Vec<(ContentType, i64)>, RegistryError>;

    /// Transition `pending -> queued` and insert the queue row atomically.
    fn enqueue(
        &self,
        id: &str,
        priority: u32,
        scheduled_at: DateTime<Utc>,
    ) -> Result<QueueEntry, RegistryError>;

    /// Pop up to `limit` queued entries for the connection, highest priority
    /// first with ties broken by earliest `scheduled_at`. The queue rows are
    /// deleted; the caller drives the `queued -> searching` transition for
    /// each popped entry.
    fn dequeue(
        &self,
        connection_id: i64,
        limit: usize,
    ) -> Result<Vec<RegistryEntry>, RegistryError>;

    /// Transition `queued -> searching` and stamp `last_searched`.
    fn mark_searching(&self, id: &str, now: DateTime<Utc>) -> Result<(), RegistryError>;

    /// Successful dispatch: the entry is removed. Reconciliation recreates a
    /// fresh entry if the content is still a candidate afterwards.
    fn record_success(&self, id: &str) -> Result<(), RegistryError>;

    /// Failed dispatch: increments the attempt count, then transitions to
    /// `cooldown` with a backoff-computed `next_eligible`, or to `exhausted`
    /// once the attempt count reaches the policy maximum. Returns the state
    /// the entry landed in.
    fn record_failure(
        &self,
        id: &str,
        category: FailureCategory,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<SearchState, RegistryError>;

    /// Throttle rejection after dequeue: return `searching -> pending`
    /// without counting an attempt.
    fn release_to_pending(&self, id: &str) -> Result<(), RegistryError>;

    /// Reset expired cooldowns (`next_eligible <= now`) to `pending`.
    /// Returns the number of entries released.
    fn sweep_cooldowns(&self, now: DateTime<Utc>) -> Result<u32, RegistryError>;

    /// Operator action: force `searching` or `cooldown` to `exhausted`.
    fn force_exhaust(&self, id: &str) -> Result<(), RegistryError>;

    /// Entries stuck in `searching` since before `cutoff` are forced into
    /// `cooldown`, eligible again at `next_eligible`. No attempt is counted.
    fn reap_stuck_searching(
        &self,
        cutoff: DateTime<Utc>,
        next_eligible: DateTime<Utc>,
    ) -> Result<u32, RegistryError>;

    /// Record that a season-pack search covering this entry failed.
    fn mark_season_pack_failed(&self, id: &str) -> Result<(), RegistryError>;

    /// Operator priority override for a `pending` or `queued` entry. A queued
    /// entry's queue row is updated at the same time.
    fn set_priority(&self, id: &str, priority: u32) -> Result<(), RegistryError>;

    /// Remove a single entry from the queue, resetting it `queued -> pending`.
    fn remove_from_queue(&self, id: &str) -> Result<(), RegistryError>;

    /// Drain the queue (optionally for one connection), resetting every
    /// affected entry `queued -> pending`. Returns the number drained.
    fn clear_queue(&self, connection_id: Option<i64>) -> Result<u32, RegistryError>;

    /// Number of queue rows, optionally for one connection.
    fn queue_depth(&self, connection_id: Option<i64>) -> Result<i64, RegistryError>;

    /// Delete the `pending` entry for a content item and kind whose candidacy
    /// lapsed out-of-band. Entries in any other state are left alone. Returns
    /// the number deleted.
    fn drop_stale_pending(
        &self,
        connection_id: i64,
        content_type: ContentType,
        content_id: i64,
        search_kind: SearchKind,
    ) -> Result<u32, RegistryError>;

    /// Delete all entries (and queue rows) for a content item. Returns the
    /// number of registry entries deleted.
    fn delete_for_content(
        &self,
        connection_id: i64,
        content_type: ContentType,
        content_id: i64,
    ) -> Result<u32, RegistryError>;

    /// Delete `exhausted` entries unchanged since `cutoff`.
    fn prune_exhausted(&self, cutoff: DateTime<Utc>) -> Result<u32, RegistryError>;
}
