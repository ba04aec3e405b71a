//! Search registry: one persistent state machine per search candidate.
//!
//! Each (connection, content item, search kind) key owns at most one entry.
//! Entries move through pending, queued, searching, cooldown and exhausted;
//! the store enforces every transition against the entry's current state, and
//! the queue rides along in the same database so enqueue and dequeue stay
//! atomic with the transitions they imply.

pub mod backoff;
mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteRegistryStore;
pub use store::{RegistryError, RegistryStore};
pub use types::{
    FailureCategory, NewRegistryEntry, QueueEntry, RegistryEntry, RegistryFilter, SearchKind,
    SearchState,
};
