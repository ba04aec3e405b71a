//! SQLite-backed library mirror implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection as DbConnection, OptionalExtension};

use super::store::{LibraryError, LibraryStore};
use super::types::{
    Connection, ConnectionCategory, ContentType, Episode, EpisodeUpsert, Movie, MovieUpsert,
    NewConnection, SeasonStatus, Series, SeriesUpsert,
};

/// SQLite-backed library mirror.
pub struct SqliteLibraryStore {
    conn: Mutex<DbConnection>,
}

impl SqliteLibraryStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, LibraryError> {
        let conn = DbConnection::open(path).map_err(|e| LibraryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, LibraryError> {
        let conn =
            DbConnection::open_in_memory().map_err(|e| LibraryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &DbConnection) -> Result<(), LibraryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL,
                base_url TEXT NOT NULL,
                api_key TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                throttle_profile_id INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS series (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                connection_id INTEGER NOT NULL REFERENCES connections(id) ON DELETE CASCADE,
                remote_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                monitored INTEGER NOT NULL DEFAULT 1,
                UNIQUE(connection_id, remote_id)
            );

            CREATE TABLE IF NOT EXISTS episodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                connection_id INTEGER NOT NULL REFERENCES connections(id) ON DELETE CASCADE,
                series_id INTEGER NOT NULL REFERENCES series(id),
                season_number INTEGER NOT NULL,
                remote_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                monitored INTEGER NOT NULL DEFAULT 1,
                has_file INTEGER NOT NULL DEFAULT 0,
                quality_cutoff_not_met INTEGER NOT NULL DEFAULT 0,
                air_date TEXT,
                UNIQUE(connection_id, remote_id)
            );

            CREATE INDEX IF NOT EXISTS idx_episodes_connection ON episodes(connection_id);
            CREATE INDEX IF NOT EXISTS idx_episodes_season ON episodes(series_id, season_number);

            CREATE TABLE IF NOT EXISTS movies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                connection_id INTEGER NOT NULL REFERENCES connections(id) ON DELETE CASCADE,
                remote_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                monitored INTEGER NOT NULL DEFAULT 1,
                has_file INTEGER NOT NULL DEFAULT 0,
                quality_cutoff_not_met INTEGER NOT NULL DEFAULT 0,
                release_date TEXT,
                UNIQUE(connection_id, remote_id)
            );

            CREATE INDEX IF NOT EXISTS idx_movies_connection ON movies(connection_id);
            "#,
        )
        .map_err(|e| LibraryError::Database(e.to_string()))?;

        Ok(())
    }

    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn parse_optional_timestamp(s: Option<String>) -> Option<DateTime<Utc>> {
        s.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
    }

    fn row_to_connection(row: &rusqlite::Row) -> rusqlite::Result<Connection> {
        let category_str: String = row.get(2)?;
        let created_at_str: String = row.get(7)?;
        let updated_at_str: String = row.get(8)?;

        Ok(Connection {
            id: row.get(0)?,
            name: row.get(1)?,
            category: ConnectionCategory::parse(&category_str)
                .unwrap_or(ConnectionCategory::SeriesProvider),
            base_url: row.get(3)?,
            api_key: row.get(4)?,
            enabled: row.get(5)?,
            throttle_profile_id: row.get(6)?,
            created_at: Self::parse_timestamp(&created_at_str),
            updated_at: Self::parse_timestamp(&updated_at_str),
        })
    }

    fn row_to_episode(row: &rusqlite::Row) -> rusqlite::Result<Episode> {
        let air_date: Option<String> = row.get(9)?;
        Ok(Episode {
            id: row.get(0)?,
            connection_id: row.get(1)?,
            series_id: row.get(2)?,
            season_number: row.get(3)?,
            remote_id: row.get(4)?,
            title: row.get(5)?,
            monitored: row.get(6)?,
            has_file: row.get(7)?,
            quality_cutoff_not_met: row.get(8)?,
            air_date: Self::parse_optional_timestamp(air_date),
        })
    }

    fn row_to_movie(row: &rusqlite::Row) -> rusqlite::Result<Movie> {
        let release_date: Option<String> = row.get(7)?;
        Ok(Movie {
            id: row.get(0)?,
            connection_id: row.get(1)?,
            remote_id: row.get(2)?,
            title: row.get(3)?,
            monitored: row.get(4)?,
            has_file: row.get(5)?,
            quality_cutoff_not_met: row.get(6)?,
            release_date: Self::parse_optional_timestamp(release_date),
        })
    }

    const CONNECTION_COLUMNS: &'static str =
        "id, name, category, base_url, api_key, enabled, throttle_profile_id, created_at, updated_at";

    const EPISODE_COLUMNS: &'static str =
        "id, connection_id, series_id, season_number, remote_id, title, monitored, has_file, quality_cutoff_not_met, air_date";

    const MOVIE_COLUMNS: &'static str =
        "id, connection_id, remote_id, title, monitored, has_file, quality_cutoff_not_met, release_date";
}

impl LibraryStore for SqliteLibraryStore {
    fn add_connection(&self, request: NewConnection) -> Result<Connection, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO connections (name, category, base_url, api_key, enabled, throttle_profile_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, 1, ?, ?, ?)",
            params![
                request.name,
                request.category.as_str(),
                request.base_url,
                request.api_key,
                request.throttle_profile_id,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| LibraryError::Database(e.to_string()))?;

        let id = conn.last_insert_rowid();

        Ok(Connection {
            id,
            name: request.name,
            category: request.category,
            base_url: request.base_url,
            api_key: request.api_key,
            enabled: true,
            throttle_profile_id: request.throttle_profile_id,
            created_at: now,
            updated_at: now,
        })
    }

    fn get_connection(&self, id: i64) -> Result<Option<Connection>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM connections WHERE id = ?",
                Self::CONNECTION_COLUMNS
            ),
            params![id],
            Self::row_to_connection,
        )
        .optional()
        .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn list_connections(&self) -> Result<Vec<Connection>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM connections ORDER BY id",
                Self::CONNECTION_COLUMNS
            ))
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_connection)
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn list_enabled_connections(&self) -> Result<Vec<Connection>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM connections WHERE enabled = 1 ORDER BY id",
                Self::CONNECTION_COLUMNS
            ))
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_connection)
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn set_connection_enabled(&self, id: i64, enabled: bool) -> Result<(), LibraryError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE connections SET enabled = ?, updated_at = ? WHERE id = ?",
                params![enabled, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(LibraryError::ConnectionNotFound(id));
        }
        Ok(())
    }

    fn upsert_series(&self, upsert: &SeriesUpsert) -> Result<i64, LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO series (connection_id, remote_id, title, monitored)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(connection_id, remote_id) DO UPDATE SET
                title = excluded.title,
                monitored = excluded.monitored",
            params![
                upsert.connection_id,
                upsert.remote_id,
                upsert.title,
                upsert.monitored,
            ],
        )
        .map_err(|e| LibraryError::Database(e.to_string()))?;

        conn.query_row(
            "SELECT id FROM series WHERE connection_id = ? AND remote_id = ?",
            params![upsert.connection_id, upsert.remote_id],
            |row| row.get(0),
        )
        .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn upsert_episode(&self, upsert: &EpisodeUpsert) -> Result<i64, LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO episodes (connection_id, series_id, season_number, remote_id, title, monitored, has_file, quality_cutoff_not_met, air_date)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(connection_id, remote_id) DO UPDATE SET
                series_id = excluded.series_id,
                season_number = excluded.season_number,
                title = excluded.title,
                monitored = excluded.monitored,
                has_file = excluded.has_file,
                quality_cutoff_not_met = excluded.quality_cutoff_not_met,
                air_date = excluded.air_date",
            params![
                upsert.connection_id,
                upsert.series_id,
                upsert.season_number,
                upsert.remote_id,
                upsert.title,
                upsert.monitored,
                upsert.has_file,
                upsert.quality_cutoff_not_met,
                upsert.air_date.map(|d| d.to_rfc3339()),
            ],
        )
        .map_err(|e| LibraryError::Database(e.to_string()))?;

        conn.query_row(
            "SELECT id FROM episodes WHERE connection_id = ? AND remote_id = ?",
            params![upsert.connection_id, upsert.remote_id],
            |row| row.get(0),
        )
        .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn upsert_movie(&self, upsert: &MovieUpsert) -> Result<i64, LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO movies (connection_id, remote_id, title, monitored, has_file, quality_cutoff_not_met, release_date)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(connection_id, remote_id) DO UPDATE SET
                title = excluded.title,
                monitored = excluded.monitored,
                has_file = excluded.has_file,
                quality_cutoff_not_met = excluded.quality_cutoff_not_met,
                release_date = excluded.release_date",
            params![
                upsert.connection_id,
                upsert.remote_id,
                upsert.title,
                upsert.monitored,
                upsert.has_file,
                upsert.quality_cutoff_not_met,
                upsert.release_date.map(|d| d.to_rfc3339()),
            ],
        )
        .map_err(|e| LibraryError::Database(e.to_string()))?;

        conn.query_row(
            "SELECT id FROM movies WHERE connection_id = ? AND remote_id = ?",
            params![upsert.connection_id, upsert.remote_id],
            |row| row.get(0),
        )
        .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn get_series(&self, id: i64) -> Result<Option<Series>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, connection_id, remote_id, title, monitored FROM series WHERE id = ?",
            params![id],
            |row| {
                Ok(Series {
                    id: row.get(0)?,
                    connection_id: row.get(1)?,
                    remote_id: row.get(2)?,
                    title: row.get(3)?,
                    monitored: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn list_episodes(&self, connection_id: i64) -> Result<Vec<Episode>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM episodes WHERE connection_id = ? ORDER BY id",
                Self::EPISODE_COLUMNS
            ))
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![connection_id], Self::row_to_episode)
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn list_movies(&self, connection_id: i64) -> Result<Vec<Movie>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM movies WHERE connection_id = ? ORDER BY id",
                Self::MOVIE_COLUMNS
            ))
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![connection_id], Self::row_to_movie)
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn get_episode(&self, id: i64) -> Result<Option<Episode>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM episodes WHERE id = ?", Self::EPISODE_COLUMNS),
            params![id],
            Self::row_to_episode,
        )
        .optional()
        .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn get_movie(&self, id: i64) -> Result<Option<Movie>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM movies WHERE id = ?", Self::MOVIE_COLUMNS),
            params![id],
            Self::row_to_movie,
        )
        .optional()
        .map_err(|e| LibraryError::Database(e.to_string()))
    }

    fn delete_episode(&self, id: i64) -> Result<(), LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM episodes WHERE id = ?", params![id])
            .map_err(|e| LibraryError::Database(e.to_string()))?;
        Ok(())
    }

    fn delete_movie(&self, id: i64) -> Result<(), LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM movies WHERE id = ?", params![id])
            .map_err(|e| LibraryError::Database(e.to_string()))?;
        Ok(())
    }

    fn delete_orphan_series(&self, connection_id: i64) -> Result<u32, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM series WHERE connection_id = ?
                 AND NOT EXISTS (SELECT 1 FROM episodes WHERE episodes.series_id = series.id)",
                params![connection_id],
            )
            .map_err(|e| LibraryError::Database(e.to_string()))?;
        Ok(deleted as u32)
    }

    fn content_exists(
        &self,
        connection_id: i64,
        content_type: ContentType,
        content_id: i64,
    ) -> Result<bool, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let sql = match content_type {
            ContentType::Episode => "SELECT 1 FROM episodes WHERE connection_id = ? AND id = ?",
            ContentType::Movie => "SELECT 1 FROM movies WHERE connection_id = ? AND id = ?",
        };
        let exists: Option<i64> = conn
            .query_row(sql, params![connection_id, content_id], |row| row.get(0))
            .optional()
            .map_err(|e| LibraryError::Database(e.to_string()))?;
        Ok(exists.is_some())
    }

    fn season_status(
        &self,
        series_id: i64,
        season_number: u32,
        now: DateTime<Utc>,
    ) -> Result<SeasonStatus, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let (total, downloaded): (u32, u32) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(has_file), 0) FROM episodes
                 WHERE series_id = ? AND season_number = ?",
                params![series_id, season_number],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| LibraryError::Database(e.to_string()))?;

        let next_airing: Option<String> = conn
            .query_row(
                "SELECT MIN(air_date) FROM episodes
                 WHERE series_id = ? AND season_number = ? AND air_date > ?",
                params![series_id, season_number, now.to_rfc3339()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| LibraryError::Database(e.to_string()))?
            .flatten();

        Ok(SeasonStatus {
            series_id,
            season_number,
            total_episodes: total,
            downloaded_episodes: downloaded,
            next_airing: Self::parse_optional_timestamp(next_airing),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_store() -> SqliteLibraryStore {
        SqliteLibraryStore::in_memory().unwrap()
    }

    fn add_series_connection(store: &SqliteLibraryStore) -> Connection {
        store
            .add_connection(NewConnection {
                name: "sonarr-main".to_string(),
                category: ConnectionCategory::SeriesProvider,
                base_url: "http://localhost:8989".to_string(),
                api_key: "key".to_string(),
                throttle_profile_id: None,
            })
            .unwrap()
    }

    fn episode_upsert(connection_id: i64, series_id: i64, remote_id: i64) -> EpisodeUpsert {
        EpisodeUpsert {
            connection_id,
            series_id,
            season_number: 1,
            remote_id,
            title: format!("Episode {}", remote_id),
            monitored: true,
            has_file: false,
            quality_cutoff_not_met: false,
            air_date: None,
        }
    }

    #[test]
    fn test_add_and_get_connection() {
        let store = create_test_store();
        let connection = add_series_connection(&store);

        let fetched = store.get_connection(connection.id).unwrap().unwrap();
        assert_eq!(fetched.name, "sonarr-main");
        assert_eq!(fetched.category, ConnectionCategory::SeriesProvider);
        assert!(fetched.enabled);
    }

    #[test]
    fn test_get_missing_connection() {
        let store = create_test_store();
        assert!(store.get_connection(42).unwrap().is_none());
    }

    #[test]
    fn test_set_connection_enabled() {
        let store = create_test_store();
        let connection = add_series_connection(&store);

        store.set_connection_enabled(connection.id, false).unwrap();
        assert!(store.list_enabled_connections().unwrap().is_empty());
        assert_eq!(store.list_connections().unwrap().len(), 1);

        assert!(matches!(
            store.set_connection_enabled(999, false),
            Err(LibraryError::ConnectionNotFound(999))
        ));
    }

    #[test]
    fn test_upsert_episode_is_idempotent() {
        let store = create_test_store();
        let connection = add_series_connection(&store);
        let series_id = store
            .upsert_series(&SeriesUpsert {
                connection_id: connection.id,
                remote_id: 10,
                title: "Show".to_string(),
                monitored: true,
            })
            .unwrap();

        let first = store
            .upsert_episode(&episode_upsert(connection.id, series_id, 100))
            .unwrap();
        let second = store
            .upsert_episode(&episode_upsert(connection.id, series_id, 100))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.list_episodes(connection.id).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_episode_overwrites_mutable_fields() {
        let store = create_test_store();
        let connection = add_series_connection(&store);
        let series_id = store
            .upsert_series(&SeriesUpsert {
                connection_id: connection.id,
                remote_id: 10,
                title: "Show".to_string(),
                monitored: true,
            })
            .unwrap();

        let id = store
            .upsert_episode(&episode_upsert(connection.id, series_id, 100))
            .unwrap();

        let mut updated = episode_upsert(connection.id, series_id, 100);
        updated.has_file = true;
        updated.title = "Renamed".to_string();
        store.upsert_episode(&updated).unwrap();

        let episode = store.get_episode(id).unwrap().unwrap();
        assert!(episode.has_file);
        assert_eq!(episode.title, "Renamed");
    }

    #[test]
    fn test_upsert_series_updates_title() {
        let store = create_test_store();
        let connection = add_series_connection(&store);

        let first = store
            .upsert_series(&SeriesUpsert {
                connection_id: connection.id,
                remote_id: 10,
                title: "Old Title".to_string(),
                monitored: true,
            })
            .unwrap();
        let second = store
            .upsert_series(&SeriesUpsert {
                connection_id: connection.id,
                remote_id: 10,
                title: "New Title".to_string(),
                monitored: false,
            })
            .unwrap();

        assert_eq!(first, second);
        let series = store.get_series(first).unwrap().unwrap();
        assert_eq!(series.title, "New Title");
        assert!(!series.monitored);
    }

    #[test]
    fn test_delete_episode_and_content_exists() {
        let store = create_test_store();
        let connection = add_series_connection(&store);
        let series_id = store
            .upsert_series(&SeriesUpsert {
                connection_id: connection.id,
                remote_id: 10,
                title: "Show".to_string(),
                monitored: true,
            })
            .unwrap();
        let id = store
            .upsert_episode(&episode_upsert(connection.id, series_id, 100))
            .unwrap();

        assert!(store
            .content_exists(connection.id, ContentType::Episode, id)
            .unwrap());

        store.delete_episode(id).unwrap();
        assert!(!store
            .content_exists(connection.id, ContentType::Episode, id)
            .unwrap());
    }

    #[test]
    fn test_delete_orphan_series() {
        let store = create_test_store();
        let connection = add_series_connection(&store);
        let series_id = store
            .upsert_series(&SeriesUpsert {
                connection_id: connection.id,
                remote_id: 10,
                title: "Show".to_string(),
                monitored: true,
            })
            .unwrap();
        let episode_id = store
            .upsert_episode(&episode_upsert(connection.id, series_id, 100))
            .unwrap();

        // Series has an episode: not an orphan yet.
        assert_eq!(store.delete_orphan_series(connection.id).unwrap(), 0);

        store.delete_episode(episode_id).unwrap();
        assert_eq!(store.delete_orphan_series(connection.id).unwrap(), 1);
        assert!(store.get_series(series_id).unwrap().is_none());
    }

    #[test]
    fn test_movie_round_trip() {
        let store = create_test_store();
        let connection = store
            .add_connection(NewConnection {
                name: "radarr-main".to_string(),
                category: ConnectionCategory::MovieProvider,
                base_url: "http://localhost:7878".to_string(),
                api_key: "key".to_string(),
                throttle_profile_id: None,
            })
            .unwrap();

        let id = store
            .upsert_movie(&MovieUpsert {
                connection_id: connection.id,
                remote_id: 55,
                title: "The Film".to_string(),
                monitored: true,
                has_file: true,
                quality_cutoff_not_met: true,
                release_date: Some(Utc::now() - Duration::days(400)),
            })
            .unwrap();

        let movie = store.get_movie(id).unwrap().unwrap();
        assert_eq!(movie.title, "The Film");
        assert!(movie.is_upgrade_candidate());
        assert_eq!(store.list_movies(connection.id).unwrap().len(), 1);
    }

    #[test]
    fn test_season_status_aggregation() {
        let store = create_test_store();
        let connection = add_series_connection(&store);
        let series_id = store
            .upsert_series(&SeriesUpsert {
                connection_id: connection.id,
                remote_id: 10,
                title: "Show".to_string(),
                monitored: true,
            })
            .unwrap();

        let now = Utc::now();
        for i in 0..4 {
            let mut upsert = episode_upsert(connection.id, series_id, 100 + i);
            upsert.has_file = i < 1;
            upsert.air_date = Some(now - Duration::days(30 - i));
            store.upsert_episode(&upsert).unwrap();
        }

        let status = store.season_status(series_id, 1, now).unwrap();
        assert_eq!(status.total_episodes, 4);
        assert_eq!(status.downloaded_episodes, 1);
        assert_eq!(status.missing_count(), 3);
        assert!(status.next_airing.is_none());
    }

    #[test]
    fn test_season_status_next_airing() {
        let store = create_test_store();
        let connection = add_series_connection(&store);
        let series_id = store
            .upsert_series(&SeriesUpsert {
                connection_id: connection.id,
                remote_id: 10,
                title: "Show".to_string(),
                monitored: true,
            })
            .unwrap();

        let now = Utc::now();
        let mut aired = episode_upsert(connection.id, series_id, 100);
        aired.air_date = Some(now - Duration::days(7));
        store.upsert_episode(&aired).unwrap();

        let mut upcoming = episode_upsert(connection.id, series_id, 101);
        upcoming.air_date = Some(now + Duration::days(7));
        store.upsert_episode(&upcoming).unwrap();

        let status = store.season_status(series_id, 1, now).unwrap();
        assert!(status.next_airing.is_some());
        assert!(status.next_airing.unwrap() > now);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("library.db");

        let store = SqliteLibraryStore::new(&db_path).unwrap();
        let connection = add_series_connection(&store);

        assert!(db_path.exists());
        assert!(store.get_connection(connection.id).unwrap().is_some());
    }
}
