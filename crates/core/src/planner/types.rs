//! Planner input and output types.

use serde::{Deserialize, Serialize};

use crate::registry::{RegistryEntry, SearchKind};

/// Whether a season's gaps get searched as one season pack or per episode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    SeasonSearch,
    EpisodeSearch,
}

/// Everything the priority calculation looks at. Identical inputs always
/// produce identical outputs.
#[derive(Debug, Clone, Copy)]
pub struct PriorityInput {
    /// Days since air/release, or days the item has been known missing.
    pub age_days: i64,
    pub attempt_count: u32,
    pub search_kind: SearchKind,
    /// Operator override, additive on top of the computed base.
    pub manual_boost: Option<u32>,
}

/// One remote search request: a group of registry entries sent together.
/// Episode batches carry their parent series id; movie batches do not group.
#[derive(Debug, Clone)]
pub struct SearchBatch {
    pub connection_id: i64,
    pub series_id: Option<i64>,
    pub scope: SearchScope,
    pub entries: Vec<RegistryEntry>,
}

impl SearchBatch {
    /// Remote content ids of every entry in the batch.
    pub fn content_ids(&self) -> Vec<i64> {
        self.entries.iter().map(|e| e.content_id).collect()
    }
}
