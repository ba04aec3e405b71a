//! Core search-registry data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::library::ContentType;

/// What a search entry is trying to acquire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    /// Monitored content with no file present.
    Gap,
    /// Monitored content below the configured quality cutoff.
    Upgrade,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Gap => "gap",
            SearchKind::Upgrade => "upgrade",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gap" => Some(SearchKind::Gap),
            "upgrade" => Some(SearchKind::Upgrade),
            _ => None,
        }
    }
}

/// Lifecycle state of a search registry entry.
///
/// State machine flow:
/// ```text
/// pending --enqueue--> queued --dispatch--> searching
///   ^                                         |
///   |                  success: entry removed |
///   +-- cooldown <---- failure (attempts left)+
///                       failure (max reached) --> exhausted
/// ```
///
/// Every transition validates its source state; a transition attempted from
/// any other state is rejected with an `InvalidTransition` error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    /// Eligible for the next enqueue sweep.
    Pending,
    /// Sitting in the dispatch queue with a computed priority.
    Queued,
    /// Handed to the remote connection; a search call is in flight.
    Searching,
    /// Failed; waiting out a backoff window until `next_eligible`.
    Cooldown,
    /// Terminal: failed the maximum number of attempts.
    Exhausted,
}

impl SearchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchState::Pending => "pending",
            SearchState::Queued => "queued",
            SearchState::Searching => "searching",
            SearchState::Cooldown => "cooldown",
            SearchState::Exhausted => "exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SearchState::Pending),
            "queued" => Some(SearchState::Queued),
            "searching" => Some(SearchState::Searching),
            "cooldown" => Some(SearchState::Cooldown),
            "exhausted" => Some(SearchState::Exhausted),
            _ => None,
        }
    }

    /// Terminal states accept no further automatic transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SearchState::Exhausted)
    }
}

/// Coarse classification of why a search attempt failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Network,
    Timeout,
    Server,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Network => "network",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Server => "server",
            FailureCategory::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "network" => Some(FailureCategory::Network),
            "timeout" => Some(FailureCategory::Timeout),
            "server" => Some(FailureCategory::Server),
            "unknown" => Some(FailureCategory::Unknown),
            _ => None,
        }
    }
}

/// One search-state-machine instance: exactly one row per
/// (connection, content item, search kind).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Unique identifier (UUID).
    pub id: String,
    pub connection_id: i64,
    pub content_type: ContentType,
    /// Local id of the mirrored content row.
    pub content_id: i64,
    pub search_kind: SearchKind,
    /// Title snapshot of the content item, for listings and logs.
    pub title: String,
    pub state: SearchState,
    pub attempt_count: u32,
    pub last_searched: Option<DateTime<Utc>>,
    /// Cooldown expiry; set only in the `cooldown` state.
    pub next_eligible: Option<DateTime<Utc>>,
    pub failure_category: Option<FailureCategory>,
    /// Episode-only: a season-pack search for this entry's season failed,
    /// so batching must fall back to per-episode requests.
    pub season_pack_failed: bool,
    /// Queue ordering score; recomputed at enqueue time.
    pub priority: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create (or refresh) a registry entry.
#[derive(Debug, Clone)]
pub struct NewRegistryEntry {
    pub connection_id: i64,
    pub content_type: ContentType,
    pub content_id: i64,
    pub search_kind: SearchKind,
    pub title: String,
}

/// Ephemeral row linking a queued registry entry to its dispatch slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique identifier (UUID).
    pub id: String,
    pub registry_id: String,
    pub connection_id: i64,
    pub priority: u32,
    pub scheduled_at: DateTime<Utc>,
}

/// Filter for querying registry entries.
#[derive(Debug, Clone, Default)]
pub struct RegistryFilter {
    pub connection_id: Option<i64>,
    pub state: Option<SearchState>,
    pub content_type: Option<ContentType>,
    pub search_kind: Option<SearchKind>,
    /// Case-insensitive substring match on the title snapshot.
    pub text: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl RegistryFilter {
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

    pub fn with_state(mut self, state: SearchState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_search_kind(mut self, search_kind: SearchKind) -> Self {
        self.search_kind = Some(search_kind);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
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
