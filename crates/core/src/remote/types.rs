//! Wire types for the remote *arr-style library APIs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One episode as the remote reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEpisode {
    pub id: i64,
    pub series_id: i64,
    pub series_title: String,
    pub season_number: i64,
    pub title: String,
    pub monitored: bool,
    pub has_file: bool,
    #[serde(default)]
    pub quality_cutoff_not_met: bool,
    pub air_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub series_monitored: bool,
}

/// One movie as the remote reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMovie {
    pub id: i64,
    pub title: String,
    pub monitored: bool,
    pub has_file: bool,
    #[serde(default)]
    pub quality_cutoff_not_met: bool,
    pub release_date: Option<DateTime<Utc>>,
}

/// A content item from a remote listing; the variant follows the
/// connection's category.
#[derive(Debug, Clone)]
pub enum RemoteItem {
    Episode(RemoteEpisode),
    Movie(RemoteMovie),
}

impl RemoteItem {
    /// The remote's own id for the item.
    pub fn remote_id(&self) -> i64 {
        match self {
            RemoteItem::Episode(e) => e.id,
            RemoteItem::Movie(m) => m.id,
        }
    }
}

/// One page of a remote content listing.
#[derive(Debug, Clone)]
pub struct ContentPage {
    pub items: Vec<RemoteItem>,
    /// Total items across all pages, as reported by the remote.
    pub total_count: u64,
}

impl ContentPage {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A search command for the remote, expressed in the remote's own ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRequest {
    Episodes { episode_ids: Vec<i64> },
    Season { series_id: i64, season_number: i64 },
    Movies { movie_ids: Vec<i64> },
}

impl SearchRequest {
    /// The *arr command name for this request.
    pub fn command_name(&self) -> &'static str {
        match self {
            SearchRequest::Episodes { .. } => "EpisodeSearch",
            SearchRequest::Season { .. } => "SeasonSearch",
            SearchRequest::Movies { .. } => "MoviesSearch",
        }
    }
}
