//! SQLite-backed throttle store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection as DbConnection, OptionalExtension};

use super::store::{ThrottleError, ThrottleStore};
use super::types::{day_key, NewThrottleProfile, PauseReason, ThrottleProfile, ThrottleState};

/// SQLite-backed throttle store.
pub struct SqliteThrottleStore {
    conn: Mutex<DbConnection>,
}

impl SqliteThrottleStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, ThrottleError> {
        let conn = DbConnection::open(path).map_err(|e| ThrottleError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, ThrottleError> {
        let conn =
            DbConnection::open_in_memory().map_err(|e| ThrottleError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &DbConnection) -> Result<(), ThrottleError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS throttle_profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                requests_per_minute INTEGER NOT NULL,
                daily_budget INTEGER,
                rate_limit_pause_secs INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS throttle_states (
                connection_id INTEGER PRIMARY KEY,
                minute_window_start TEXT NOT NULL,
                minute_count INTEGER NOT NULL DEFAULT 0,
                day_window_key TEXT NOT NULL,
                day_count INTEGER NOT NULL DEFAULT 0,
                paused_until TEXT,
                pause_reason TEXT,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| ThrottleError::Database(e.to_string()))?;

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

    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<ThrottleProfile> {
        let created_at_str: String = row.get(5)?;
        let updated_at_str: String = row.get(6)?;
        Ok(ThrottleProfile {
            id: row.get(0)?,
            name: row.get(1)?,
            requests_per_minute: row.get(2)?,
            daily_budget: row.get(3)?,
            rate_limit_pause_secs: row.get::<_, i64>(4)? as u64,
            created_at: Self::parse_timestamp(&created_at_str),
            updated_at: Self::parse_timestamp(&updated_at_str),
        })
    }

    fn row_to_state(row: &rusqlite::Row) -> rusqlite::Result<ThrottleState> {
        let minute_start_str: String = row.get(1)?;
        let paused_until: Option<String> = row.get(5)?;
        let pause_reason: Option<String> = row.get(6)?;
        let updated_at_str: String = row.get(7)?;
        Ok(ThrottleState {
            connection_id: row.get(0)?,
            minute_window_start: Self::parse_timestamp(&minute_start_str),
            minute_count: row.get(2)?,
            day_window_key: row.get(3)?,
            day_count: row.get(4)?,
            paused_until: Self::parse_optional_timestamp(paused_until),
            pause_reason: pause_reason.as_deref().and_then(PauseReason::parse),
            updated_at: Self::parse_timestamp(&updated_at_str),
        })
    }

    const STATE_COLUMNS: &'static str =
        "connection_id, minute_window_start, minute_count, day_window_key, day_count, \
         paused_until, pause_reason, updated_at";

    fn get_state_with(
        conn: &DbConnection,
        connection_id: i64,
    ) -> Result<Option<ThrottleState>, ThrottleError> {
        conn.query_row(
            &format!(
                "SELECT {} FROM throttle_states WHERE connection_id = ?",
                Self::STATE_COLUMNS
            ),
            params![connection_id],
            Self::row_to_state,
        )
        .optional()
        .map_err(|e| ThrottleError::Database(e.to_string()))
    }
}

impl ThrottleStore for SqliteThrottleStore {
    fn create_profile(&self, new: NewThrottleProfile) -> Result<ThrottleProfile, ThrottleError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO throttle_profiles \
             (name, requests_per_minute, daily_budget, rate_limit_pause_secs, \
              created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                new.name,
                new.requests_per_minute,
                new.daily_budget,
                new.rate_limit_pause_secs as i64,
                now,
                now,
            ],
        )
        .map_err(|e| ThrottleError::Database(e.to_string()))?;

        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT id, name, requests_per_minute, daily_budget, rate_limit_pause_secs, \
             created_at, updated_at FROM throttle_profiles WHERE id = ?",
            params![id],
            Self::row_to_profile,
        )
        .map_err(|e| ThrottleError::Database(e.to_string()))
    }

    fn get_profile(&self, id: i64) -> Result<Option<ThrottleProfile>, ThrottleError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, requests_per_minute, daily_budget, rate_limit_pause_secs, \
             created_at, updated_at FROM throttle_profiles WHERE id = ?",
            params![id],
            Self::row_to_profile,
        )
        .optional()
        .map_err(|e| ThrottleError::Database(e.to_string()))
    }

    fn list_profiles(&self) -> Result<Vec<ThrottleProfile>, ThrottleError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, requests_per_minute, daily_budget, rate_limit_pause_secs, \
                 created_at, updated_at FROM throttle_profiles ORDER BY name",
            )
            .map_err(|e| ThrottleError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::row_to_profile)
            .map_err(|e| ThrottleError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| ThrottleError::Database(e.to_string()))
    }

    fn ensure_state(
        &self,
        connection_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ThrottleState, ThrottleError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO throttle_states \
             (connection_id, minute_window_start, minute_count, day_window_key, day_count, \
              updated_at) \
             VALUES (?, ?, 0, ?, 0, ?) \
             ON CONFLICT(connection_id) DO NOTHING",
            params![
                connection_id,
                now.to_rfc3339(),
                day_key(now),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| ThrottleError::Database(e.to_string()))?;

        Self::get_state_with(&conn, connection_id)?
            .ok_or_else(|| ThrottleError::Database("throttle state vanished".to_string()))
    }

    fn record_request(
        &self,
        connection_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ThrottleState, ThrottleError> {
        let conn = self.conn.lock().unwrap();
        let window_floor = (now - chrono::Duration::seconds(60)).to_rfc3339();
        let today = day_key(now);

        let updated = conn
            .execute(
                "UPDATE throttle_states SET \
                 minute_count = CASE WHEN minute_window_start > ?1 \
                     THEN minute_count + 1 ELSE 1 END, \
                 minute_window_start = CASE WHEN minute_window_start > ?1 \
                     THEN minute_window_start ELSE ?2 END, \
                 day_count = CASE WHEN day_window_key = ?3 THEN day_count + 1 ELSE 1 END, \
                 day_window_key = ?3, \
                 updated_at = ?2 \
                 WHERE connection_id = ?4",
                params![window_floor, now.to_rfc3339(), today, connection_id],
            )
            .map_err(|e| ThrottleError::Database(e.to_string()))?;

        if updated == 0 {
            conn.execute(
                "INSERT INTO throttle_states \
                 (connection_id, minute_window_start, minute_count, day_window_key, day_count, \
                  updated_at) \
                 VALUES (?, ?, 1, ?, 1, ?)",
                params![connection_id, now.to_rfc3339(), today, now.to_rfc3339()],
            )
            .map_err(|e| ThrottleError::Database(e.to_string()))?;
        }

        Self::get_state_with(&conn, connection_id)?
            .ok_or_else(|| ThrottleError::Database("throttle state vanished".to_string()))
    }

    fn set_paused_until(
        &self,
        connection_id: i64,
        until: DateTime<Utc>,
        reason: PauseReason,
    ) -> Result<(), ThrottleError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let updated = conn
            .execute(
                "UPDATE throttle_states SET paused_until = ?, pause_reason = ?, updated_at = ? \
                 WHERE connection_id = ?",
                params![
                    until.to_rfc3339(),
                    reason.as_str(),
                    now.to_rfc3339(),
                    connection_id
                ],
            )
            .map_err(|e| ThrottleError::Database(e.to_string()))?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO throttle_states \
                 (connection_id, minute_window_start, minute_count, day_window_key, day_count, \
                  paused_until, pause_reason, updated_at) \
                 VALUES (?, ?, 0, ?, 0, ?, ?, ?)",
                params![
                    connection_id,
                    now.to_rfc3339(),
                    day_key(now),
                    until.to_rfc3339(),
                    reason.as_str(),
                    now.to_rfc3339(),
                ],
            )
            .map_err(|e| ThrottleError::Database(e.to_string()))?;
        }
        Ok(())
    }

    fn reset_expired_windows(&self, now: DateTime<Utc>) -> Result<u32, ThrottleError> {
        let conn = self.conn.lock().unwrap();
        let window_floor = (now - chrono::Duration::seconds(60)).to_rfc3339();
        let today = day_key(now);

        let reset = conn
            .execute(
                "UPDATE throttle_states SET \
                 minute_count = CASE WHEN minute_window_start <= ?1 THEN 0 ELSE minute_count END, \
                 minute_window_start = CASE WHEN minute_window_start <= ?1 \
                     THEN ?2 ELSE minute_window_start END, \
                 day_count = CASE WHEN day_window_key != ?3 THEN 0 ELSE day_count END, \
                 day_window_key = ?3, \
                 pause_reason = CASE WHEN paused_until IS NOT NULL AND paused_until <= ?2 \
                     THEN NULL ELSE pause_reason END, \
                 paused_until = CASE WHEN paused_until IS NOT NULL AND paused_until <= ?2 \
                     THEN NULL ELSE paused_until END, \
                 updated_at = ?2 \
                 WHERE minute_window_start <= ?1 \
                    OR day_window_key != ?3 \
                    OR (paused_until IS NOT NULL AND paused_until <= ?2)",
                params![window_floor, now.to_rfc3339(), today],
            )
            .map_err(|e| ThrottleError::Database(e.to_string()))?;

        Ok(reset as u32)
    }
}
