//! Types for the locally-mirrored media library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a remote connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionCategory {
    /// Sonarr-style series/episode provider.
    SeriesProvider,
    /// Radarr-style movie provider.
    MovieProvider,
}

impl ConnectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionCategory::SeriesProvider => "series_provider",
            ConnectionCategory::MovieProvider => "movie_provider",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "series_provider" => Some(ConnectionCategory::SeriesProvider),
            "movie_provider" => Some(ConnectionCategory::MovieProvider),
            _ => None,
        }
    }
}

/// Kind of content item tracked in the mirror.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Episode,
    Movie,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Episode => "episode",
            ContentType::Movie => "movie",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "episode" => Some(ContentType::Episode),
            "movie" => Some(ContentType::Movie),
            _ => None,
        }
    }
}

/// A configured remote endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: i64,
    pub name: String,
    pub category: ConnectionCategory,
    pub base_url: String,
    pub api_key: String,
    pub enabled: bool,
    /// Assigned throttle profile; the global default applies when None.
    pub throttle_profile_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to register a new connection.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub name: String,
    pub category: ConnectionCategory,
    pub base_url: String,
    pub api_key: String,
    pub throttle_profile_id: Option<i64>,
}

/// A mirrored series row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub connection_id: i64,
    pub remote_id: i64,
    pub title: String,
    pub monitored: bool,
}

/// A mirrored episode row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub connection_id: i64,
    pub series_id: i64,
    pub season_number: u32,
    pub remote_id: i64,
    pub title: String,
    pub monitored: bool,
    pub has_file: bool,
    pub quality_cutoff_not_met: bool,
    pub air_date: Option<DateTime<Utc>>,
}

impl Episode {
    /// Monitored with no file present.
    pub fn is_gap_candidate(&self) -> bool {
        self.monitored && !self.has_file
    }

    /// Monitored, file present, below the quality cutoff.
    pub fn is_upgrade_candidate(&self) -> bool {
        self.monitored && self.has_file && self.quality_cutoff_not_met
    }
}

/// A mirrored movie row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub connection_id: i64,
    pub remote_id: i64,
    pub title: String,
    pub monitored: bool,
    pub has_file: bool,
    pub quality_cutoff_not_met: bool,
    pub release_date: Option<DateTime<Utc>>,
}

impl Movie {
    pub fn is_gap_candidate(&self) -> bool {
        self.monitored && !self.has_file
    }

    pub fn is_upgrade_candidate(&self) -> bool {
        self.monitored && self.has_file && self.quality_cutoff_not_met
    }
}

/// Upsert payload for a series row, keyed by (connection, remote_id).
#[derive(Debug, Clone)]
pub struct SeriesUpsert {
    pub connection_id: i64,
    pub remote_id: i64,
    pub title: String,
    pub monitored: bool,
}

/// Upsert payload for an episode row, keyed by (connection, remote_id).
#[derive(Debug, Clone)]
pub struct EpisodeUpsert {
    pub connection_id: i64,
    pub series_id: i64,
    pub season_number: u32,
    pub remote_id: i64,
    pub title: String,
    pub monitored: bool,
    pub has_file: bool,
    pub quality_cutoff_not_met: bool,
    pub air_date: Option<DateTime<Utc>>,
}

/// Upsert payload for a movie row, keyed by (connection, remote_id).
#[derive(Debug, Clone)]
pub struct MovieUpsert {
    pub connection_id: i64,
    pub remote_id: i64,
    pub title: String,
    pub monitored: bool,
    pub has_file: bool,
    pub quality_cutoff_not_met: bool,
    pub release_date: Option<DateTime<Utc>>,
}

/// Aggregate view of one season, derived from its episode rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonStatus {
    pub series_id: i64,
    pub season_number: u32,
    pub total_episodes: u32,
    pub downloaded_episodes: u32,
    /// Earliest future air date among the season's episodes, if any.
    pub next_airing: Option<DateTime<Utc>>,
}

impl SeasonStatus {
    pub fn missing_count(&self) -> u32 {
        self.total_episodes.saturating_sub(self.downloaded_episodes)
    }

    pub fn missing_percent(&self) -> f64 {
        if self.total_episodes == 0 {
            0.0
        } else {
            self.missing_count() as f64 * 100.0 / self.total_episodes as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(monitored: bool, has_file: bool, cutoff_not_met: bool) -> Episode {
        Episode {
            id: 1,
            connection_id: 1,
            series_id: 1,
            season_number: 1,
            remote_id: 100,
            title: "Pilot".to_string(),
            monitored,
            has_file,
            quality_cutoff_not_met: cutoff_not_met,
            air_date: None,
        }
    }

    #[test]
    fn test_gap_candidate_classification() {
        assert!(episode(true, false, false).is_gap_candidate());
        assert!(!episode(false, false, false).is_gap_candidate());
        assert!(!episode(true, true, false).is_gap_candidate());
    }

    #[test]
    fn test_upgrade_candidate_classification() {
        assert!(episode(true, true, true).is_upgrade_candidate());
        assert!(!episode(true, true, false).is_upgrade_candidate());
        assert!(!episode(true, false, true).is_upgrade_candidate());
        assert!(!episode(false, true, true).is_upgrade_candidate());
    }

    #[test]
    fn test_season_status_missing_math() {
        let status = SeasonStatus {
            series_id: 1,
            season_number: 1,
            total_episodes: 10,
            downloaded_episodes: 2,
            next_airing: None,
        };
        assert_eq!(status.missing_count(), 8);
        assert!((status.missing_percent() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_season_status_empty_season() {
        let status = SeasonStatus {
            series_id: 1,
            season_number: 1,
            total_episodes: 0,
            downloaded_episodes: 0,
            next_airing: None,
        };
        assert_eq!(status.missing_count(), 0);
        assert_eq!(status.missing_percent(), 0.0);
    }

    #[test]
    fn test_content_type_round_trip() {
        assert_eq!(ContentType::parse("episode"), Some(ContentType::Episode));
        assert_eq!(ContentType::parse("movie"), Some(ContentType::Movie));
        assert_eq!(ContentType::parse("book"), None);
        assert_eq!(ContentType::Episode.as_str(), "episode");
    }

    #[test]
    fn test_connection_category_round_trip() {
        assert_eq!(
            ConnectionCategory::parse("series_provider"),
            Some(ConnectionCategory::SeriesProvider)
        );
        assert_eq!(ConnectionCategory::MovieProvider.as_str(), "movie_provider");
        assert_eq!(ConnectionCategory::parse("unknown"), None);
    }
}
