//! Library storage trait and error type.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{
    Connection, ContentType, Episode, EpisodeUpsert, Movie, MovieUpsert, NewConnection,
    SeasonStatus, Series, SeriesUpsert,
};

/// Error type for library mirror operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Connection not found: {0}")]
    ConnectionNotFound(i64),

    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Trait for the content mirror storage backend.
pub trait LibraryStore: Send + Sync {
    /// Register a new connection.
    fn add_connection(&self, request: NewConnection) -> Result<Connection, LibraryError>;

    /// Get a connection by id.
    fn get_connection(&self, id: i64) -> Result<Option<Connection>, LibraryError>;

    /// List all connections.
    fn list_connections(&self) -> Result<Vec<Connection>, LibraryError>;

    /// List connections with the enabled flag set.
    fn list_enabled_connections(&self) -> Result<Vec<Connection>, LibraryError>;

    /// Enable or disable a connection. Disabled connections are skipped by
    /// every sweep; used to suspend searches after an authentication failure.
    fn set_connection_enabled(&self, id: i64, enabled: bool) -> Result<(), LibraryError>;

    /// Insert-or-update a series row keyed by (connection, remote_id).
    /// Returns the local row id.
    fn upsert_series(&self, upsert: &SeriesUpsert) -> Result<i64, LibraryError>;

    /// Insert-or-update an episode row keyed by (connection, remote_id).
    /// Returns the local row id.
    fn upsert_episode(&self, upsert: &EpisodeUpsert) -> Result<i64, LibraryError>;

    /// Insert-or-update a movie row keyed by (connection, remote_id).
    /// Returns the local row id.
    fn upsert_movie(&self, upsert: &MovieUpsert) -> Result<i64, LibraryError>;

    /// Get a series by local id.
    fn get_series(&self, id: i64) -> Result<Option<Series>, LibraryError>;

    /// All episode rows mirrored for a connection.
    fn list_episodes(&self, connection_id: i64) -> Result<Vec<Episode>, LibraryError>;

    /// All movie rows mirrored for a connection.
    fn list_movies(&self, connection_id: i64) -> Result<Vec<Movie>, LibraryError>;

    /// Get an episode by local id.
    fn get_episode(&self, id: i64) -> Result<Option<Episode>, LibraryError>;

    /// Get a movie by local id.
    fn get_movie(&self, id: i64) -> Result<Option<Movie>, LibraryError>;

    /// Delete an episode row.
    fn delete_episode(&self, id: i64) -> Result<(), LibraryError>;

    /// Delete a movie row.
    fn delete_movie(&self, id: i64) -> Result<(), LibraryError>;

    /// Delete series rows with no remaining episodes. Returns count deleted.
    fn delete_orphan_series(&self, connection_id: i64) -> Result<u32, LibraryError>;

    /// Whether a content row exists for (connection, type, local id).
    fn content_exists(
        &self,
        connection_id: i64,
        content_type: ContentType,
        content_id: i64,
    ) -> Result<bool, LibraryError>;

    /// Aggregate season view derived from episode rows. `now` decides which
    /// air dates count as future for the next-airing field.
    fn season_status(
        &self,
        series_id: i64,
        season_number: u32,
        now: DateTime<Utc>,
    ) -> Result<SeasonStatus, LibraryError>;
}
