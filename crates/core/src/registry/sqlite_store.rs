//! SQLite-backed registry and queue implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection as DbConnection, OptionalExtension};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::library::ContentType;

use super::backoff;
use super::store::{RegistryError, RegistryStore};
use super::types::{
    FailureCategory, NewRegistryEntry, QueueEntry, RegistryEntry, RegistryFilter, SearchKind,
    SearchState,
};

/// SQLite-backed registry store. Queue rows live alongside the registry so
/// that enqueue and dequeue stay transactional with the state transitions
/// they imply.
pub struct SqliteRegistryStore {
    conn: Mutex<DbConnection>,
}

impl SqliteRegistryStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, RegistryError> {
        let conn = DbConnection::open(path).map_err(|e| RegistryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, RegistryError> {
        let conn =
            DbConnection::open_in_memory().map_err(|e| RegistryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &DbConnection) -> Result<(), RegistryError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS search_registry (
                id TEXT PRIMARY KEY,
                connection_id INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                content_id INTEGER NOT NULL,
                search_kind TEXT NOT NULL,
                title TEXT NOT NULL,
                state TEXT NOT NULL,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_searched TEXT,
                next_eligible TEXT,
                failure_category TEXT,
                season_pack_failed INTEGER NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(connection_id, content_type, content_id, search_kind)
            );

            CREATE INDEX IF NOT EXISTS idx_registry_state ON search_registry(state);
            CREATE INDEX IF NOT EXISTS idx_registry_connection
                ON search_registry(connection_id, state);
            CREATE INDEX IF NOT EXISTS idx_registry_eligible
                ON search_registry(state, next_eligible);

            CREATE TABLE IF NOT EXISTS search_queue (
                id TEXT PRIMARY KEY,
                registry_id TEXT NOT NULL UNIQUE
                    REFERENCES search_registry(id) ON DELETE CASCADE,
                connection_id INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                scheduled_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_queue_order
                ON search_queue(connection_id, priority DESC, scheduled_at ASC);
            "#,
        )
        .map_err(|e| RegistryError::Database(e.to_string()))?;

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

    const ENTRY_COLUMNS: &'static str =
        "id, connection_id, content_type, content_id, search_kind, title, state, \
         attempt_count, last_searched, next_eligible, failure_category, \
         season_pack_failed, priority, created_at, updated_at";

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<RegistryEntry> {
        let content_type_str: String = row.get(2)?;
        let search_kind_str: String = row.get(4)?;
        let state_str: String = row.get(6)?;
        let last_searched: Option<String> = row.get(8)?;
        let next_eligible: Option<String> = row.get(9)?;
        let failure_category: Option<String> = row.get(10)?;
        let created_at_str: String = row.get(13)?;
        let updated_at_str: String = row.get(14)?;

        Ok(RegistryEntry {
            id: row.get(0)?,
            connection_id: row.get(1)?,
            content_type: ContentType::parse(&content_type_str).unwrap_or(ContentType::Episode),
            content_id: row.get(3)?,
            search_kind: SearchKind::parse(&search_kind_str).unwrap_or(SearchKind::Gap),
            title: row.get(5)?,
            state: SearchState::parse(&state_str).unwrap_or(SearchState::Pending),
            attempt_count: row.get(7)?,
            last_searched: Self::parse_optional_timestamp(last_searched),
            next_eligible: Self::parse_optional_timestamp(next_eligible),
            failure_category: failure_category.and_then(|s| FailureCategory::parse(&s)),
            season_pack_failed: row.get(11)?,
            priority: row.get(12)?,
            created_at: Self::parse_timestamp(&created_at_str),
            updated_at: Self::parse_timestamp(&updated_at_str),
        })
    }

    fn get_entry_with(
        conn: &DbConnection,
        id: &str,
    ) -> Result<Option<RegistryEntry>, RegistryError> {
        conn.query_row(
            &format!(
                "SELECT {} FROM search_registry WHERE id = ?",
                Self::ENTRY_COLUMNS
            ),
            params![id],
            Self::row_to_entry,
        )
        .optional()
        .map_err(|e| RegistryError::Database(e.to_string()))
    }

    /// Diagnose a guarded-update miss: the row either does not exist or is in
    /// a state the operation does not accept.
    fn guard_miss(
        conn: &DbConnection,
        id: &str,
        operation: &str,
    ) -> Result<RegistryError, RegistryError> {
        match Self::get_entry_with(conn, id)? {
            Some(entry) => Ok(RegistryError::InvalidTransition {
                entry_id: id.to_string(),
                from: entry.state.as_str().to_string(),
                operation: operation.to_string(),
            }),
            None => Ok(RegistryError::NotFound(id.to_string())),
        }
    }

    fn filter_clauses(filter: &RegistryFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(connection_id) = filter.connection_id {
            clauses.push("connection_id = ?".to_string());
            args.push(Box::new(connection_id));
        }
        if let Some(state) = filter.state {
            clauses.push("state = ?".to_string());
            args.push(Box::new(state.as_str().to_string()));
        }
        if let Some(content_type) = filter.content_type {
            clauses.push("content_type = ?".to_string());
            args.push(Box::new(content_type.as_str().to_string()));
        }
        if let Some(search_kind) = filter.search_kind {
            clauses.push("search_kind = ?".to_string());
            args.push(Box::new(search_kind.as_str().to_string()));
        }
        if let Some(text) = &filter.text {
            clauses.push("title LIKE ? COLLATE NOCASE".to_string());
            args.push(Box::new(format!("%{}%", text)));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        (where_sql, args)
    }
}

impl RegistryStore for SqliteRegistryStore {
    fn upsert_entry(&self, new: NewRegistryEntry) -> Result<RegistryEntry, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4().to_string();

        conn.execute(
            r#"
            INSERT INTO search_registry
                (id, connection_id, content_type, content_id, search_kind,
                 title, state, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)
            ON CONFLICT(connection_id, content_type, content_id, search_kind)
                DO UPDATE SET title = excluded.title
            "#,
            params![
                id,
                new.connection_id,
                new.content_type.as_str(),
                new.content_id,
                new.search_kind.as_str(),
                new.title,
                now,
            ],
        )
        .map_err(|e| RegistryError::Database(e.to_string()))?;

        conn.query_row(
            &format!(
                "SELECT {} FROM search_registry \
                 WHERE connection_id = ? AND content_type = ? AND content_id = ? \
                   AND search_kind = ?",
                Self::ENTRY_COLUMNS
            ),
            params![
                new.connection_id,
                new.content_type.as_str(),
                new.content_id,
                new.search_kind.as_str(),
            ],
            Self::row_to_entry,
        )
        .map_err(|e| RegistryError::Database(e.to_string()))
    }

    fn get_entry(&self, id: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        let conn = self.conn.lock().unwrap();
        Self::get_entry_with(&conn, id)
    }

    fn list_entries(&self, filter: &RegistryFilter) -> Result<Vec<RegistryEntry>, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let (where_sql, mut args) = Self::filter_clauses(filter);
        let sql = format!(
            "SELECT {} FROM search_registry{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            Self::ENTRY_COLUMNS,
            where_sql
        );
        args.push(Box::new(filter.limit));
        args.push(Box::new(filter.offset));

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
                Self::row_to_entry,
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| RegistryError::Database(e.to_string()))
    }

    fn count_entries(&self, filter: &RegistryFilter) -> Result<i64, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let (where_sql, args) = Self::filter_clauses(filter);
        let sql = format!("SELECT COUNT(*) FROM search_registry{}", where_sql);

        conn.query_row(
            &sql,
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| row.get(0),
        )
        .map_err(|e| RegistryError::Database(e.to_string()))
    }

    fn list_content_refs(
        &self,
        connection_id: i64,
    ) -> Result<Vec<(ContentType, i64)>, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT content_type, content_id FROM search_registry \
                 WHERE connection_id = ?",
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![connection_id], |row| {
                let content_type_str: String = row.get(0)?;
                let content_id: i64 = row.get(1)?;
                Ok((content_type_str, content_id))
            })
            .map_err(|e| RegistryError::Database(e.to_string()))?;

        let mut refs = Vec::new();
        for row in rows {
            let (type_str, content_id) =
                row.map_err(|e| RegistryError::Database(e.to_string()))?;
            if let Some(content_type) = ContentType::parse(&type_str) {
                refs.push((content_type, content_id));
            }
        }
        Ok(refs)
    }

    fn enqueue(
        &self,
        id: &str,
        priority: u32,
        scheduled_at: DateTime<Utc>,
    ) -> Result<QueueEntry, RegistryError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| RegistryError::Database(e.to_string()))?;

        let updated = tx
            .execute(
                "UPDATE search_registry \
                 SET state = 'queued', priority = ?, updated_at = ? \
                 WHERE id = ? AND state = 'pending'",
                params![priority, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        if updated == 0 {
            let err = match Self::get_entry_with(&tx, id)? {
                Some(entry) if entry.state == SearchState::Queued => {
                    RegistryError::AlreadyQueued(id.to_string())
                }
                Some(entry) => RegistryError::InvalidTransition {
                    entry_id: id.to_string(),
                    from: entry.state.as_str().to_string(),
                    operation: "enqueue".to_string(),
                },
                None => RegistryError::NotFound(id.to_string()),
            };
            return Err(err);
        }

        let entry = Self::get_entry_with(&tx, id)?.ok_or_else(|| {
            RegistryError::NotFound(id.to_string())
        })?;

        let queue_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO search_queue (id, registry_id, connection_id, priority, scheduled_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                queue_id,
                id,
                entry.connection_id,
                priority,
                scheduled_at.to_rfc3339(),
            ],
        )
        .map_err(|e| RegistryError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| RegistryError::Database(e.to_string()))?;

        Ok(QueueEntry {
            id: queue_id,
            registry_id: id.to_string(),
            connection_id: entry.connection_id,
            priority,
            scheduled_at,
        })
    }

    fn dequeue(
        &self,
        connection_id: i64,
        limit: usize,
    ) -> Result<Vec<RegistryEntry>, RegistryError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| RegistryError::Database(e.to_string()))?;

        let entries = {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {} FROM search_registry r \
                     JOIN search_queue q ON q.registry_id = r.id \
                     WHERE q.connection_id = ? \
                     ORDER BY q.priority DESC, q.scheduled_at ASC \
                     LIMIT ?",
                    Self::ENTRY_COLUMNS
                        .split(", ")
                        .map(|c| format!("r.{}", c))
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
                .map_err(|e| RegistryError::Database(e.to_string()))?;
            let rows = stmt
                .query_map(params![connection_id, limit as i64], Self::row_to_entry)
                .map_err(|e| RegistryError::Database(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| RegistryError::Database(e.to_string()))?
        };

        for entry in &entries {
            tx.execute(
                "DELETE FROM search_queue WHERE registry_id = ?",
                params![entry.id],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        }

        tx.commit()
            .map_err(|e| RegistryError::Database(e.to_string()))?;

        Ok(entries)
    }

    fn mark_searching(&self, id: &str, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| RegistryError::Database(e.to_string()))?;

        let updated = tx
            .execute(
                "UPDATE search_registry \
                 SET state = 'searching', last_searched = ?, updated_at = ? \
                 WHERE id = ? AND state = 'queued'",
                params![now.to_rfc3339(), now.to_rfc3339(), id],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Self::guard_miss(&tx, id, "mark_searching")?);
        }

        // The queue row is normally gone by dequeue time already.
        tx.execute(
            "DELETE FROM search_queue WHERE registry_id = ?",
            params![id],
        )
        .map_err(|e| RegistryError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| RegistryError::Database(e.to_string()))
    }

    fn record_success(&self, id: &str) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        let entry = Self::get_entry_with(&conn, id)?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if entry.state != SearchState::Searching {
            return Err(RegistryError::InvalidTransition {
                entry_id: id.to_string(),
                from: entry.state.as_str().to_string(),
                operation: "record_success".to_string(),
            });
        }

        conn.execute("DELETE FROM search_registry WHERE id = ?", params![id])
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        Ok(())
    }

    fn record_failure(
        &self,
        id: &str,
        category: FailureCategory,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<SearchState, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let entry = Self::get_entry_with(&conn, id)?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if entry.state != SearchState::Searching {
            return Err(RegistryError::InvalidTransition {
                entry_id: id.to_string(),
                from: entry.state.as_str().to_string(),
                operation: "record_failure".to_string(),
            });
        }

        let attempts = entry.attempt_count + 1;
        let (state, next_eligible) = if attempts >= policy.max_attempts {
            (SearchState::Exhausted, None)
        } else {
            let until = now + backoff::cooldown_duration(attempts, policy);
            (SearchState::Cooldown, Some(until.to_rfc3339()))
        };

        conn.execute(
            "UPDATE search_registry \
             SET state = ?, attempt_count = ?, next_eligible = ?, \
                 failure_category = ?, updated_at = ? \
             WHERE id = ? AND state = 'searching'",
            params![
                state.as_str(),
                attempts,
                next_eligible,
                category.as_str(),
                now.to_rfc3339(),
                id,
            ],
        )
        .map_err(|e| RegistryError::Database(e.to_string()))?;

        Ok(state)
    }

    fn release_to_pending(&self, id: &str) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE search_registry SET state = 'pending', updated_at = ? \
                 WHERE id = ? AND state = 'searching'",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Self::guard_miss(&conn, id, "release_to_pending")?);
        }
        Ok(())
    }

    fn sweep_cooldowns(&self, now: DateTime<Utc>) -> Result<u32, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE search_registry \
                 SET state = 'pending', next_eligible = NULL, updated_at = ? \
                 WHERE state = 'cooldown' AND next_eligible <= ?",
                params![now.to_rfc3339(), now.to_rfc3339()],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        Ok(updated as u32)
    }

    fn force_exhaust(&self, id: &str) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE search_registry \
                 SET state = 'exhausted', next_eligible = NULL, updated_at = ? \
                 WHERE id = ? AND state IN ('searching', 'cooldown')",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Self::guard_miss(&conn, id, "force_exhaust")?);
        }
        Ok(())
    }

    fn reap_stuck_searching(
        &self,
        cutoff: DateTime<Utc>,
        next_eligible: DateTime<Utc>,
    ) -> Result<u32, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE search_registry \
                 SET state = 'cooldown', next_eligible = ?, failure_category = 'timeout', \
                     updated_at = ? \
                 WHERE state = 'searching' AND last_searched <= ?",
                params![
                    next_eligible.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                    cutoff.to_rfc3339(),
                ],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        Ok(updated as u32)
    }

    fn mark_season_pack_failed(&self, id: &str) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE search_registry SET season_pack_failed = 1, updated_at = ? \
                 WHERE id = ?",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        if updated == 0 {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_priority(&self, id: &str, priority: u32) -> Result<(), RegistryError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| RegistryError::Database(e.to_string()))?;

        let updated = tx
            .execute(
                "UPDATE search_registry SET priority = ?, updated_at = ? \
                 WHERE id = ? AND state IN ('pending', 'queued')",
                params![priority, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Self::guard_miss(&tx, id, "set_priority")?);
        }

        tx.execute(
            "UPDATE search_queue SET priority = ? WHERE registry_id = ?",
            params![priority, id],
        )
        .map_err(|e| RegistryError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| RegistryError::Database(e.to_string()))
    }

    fn remove_from_queue(&self, id: &str) -> Result<(), RegistryError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| RegistryError::Database(e.to_string()))?;

        let updated = tx
            .execute(
                "UPDATE search_registry SET state = 'pending', updated_at = ? \
                 WHERE id = ? AND state = 'queued'",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Self::guard_miss(&tx, id, "remove_from_queue")?);
        }

        tx.execute(
            "DELETE FROM search_queue WHERE registry_id = ?",
            params![id],
        )
        .map_err(|e| RegistryError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| RegistryError::Database(e.to_string()))
    }

    fn clear_queue(&self, connection_id: Option<i64>) -> Result<u32, RegistryError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| RegistryError::Database(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        let drained = match connection_id {
            Some(connection_id) => {
                let drained = tx
                    .execute(
                        "UPDATE search_registry SET state = 'pending', updated_at = ? \
                         WHERE state = 'queued' AND connection_id = ?",
                        params![now, connection_id],
                    )
                    .map_err(|e| RegistryError::Database(e.to_string()))?;
                tx.execute(
                    "DELETE FROM search_queue WHERE connection_id = ?",
                    params![connection_id],
                )
                .map_err(|e| RegistryError::Database(e.to_string()))?;
                drained
            }
            None => {
                let drained = tx
                    .execute(
                        "UPDATE search_registry SET state = 'pending', updated_at = ? \
                         WHERE state = 'queued'",
                        params![now],
                    )
                    .map_err(|e| RegistryError::Database(e.to_string()))?;
                tx.execute("DELETE FROM search_queue", [])
                    .map_err(|e| RegistryError::Database(e.to_string()))?;
                drained
            }
        };

        tx.commit()
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        Ok(drained as u32)
    }

    fn queue_depth(&self, connection_id: Option<i64>) -> Result<i64, RegistryError> {
        let conn = self.conn.lock().unwrap();
        match connection_id {
            Some(connection_id) => conn.query_row(
                "SELECT COUNT(*) FROM search_queue WHERE connection_id = ?",
                params![connection_id],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM search_queue", [], |row| row.get(0)),
        }
        .map_err(|e| RegistryError::Database(e.to_string()))
    }

    fn drop_stale_pending(
        &self,
        connection_id: i64,
        content_type: ContentType,
        content_id: i64,
        search_kind: SearchKind,
    ) -> Result<u32, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM search_registry \
                 WHERE connection_id = ? AND content_type = ? AND content_id = ? \
                   AND search_kind = ? AND state = 'pending'",
                params![
                    connection_id,
                    content_type.as_str(),
                    content_id,
                    search_kind.as_str()
                ],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        Ok(deleted as u32)
    }

    fn delete_for_content(
        &self,
        connection_id: i64,
        content_type: ContentType,
        content_id: i64,
    ) -> Result<u32, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM search_registry \
                 WHERE connection_id = ? AND content_type = ? AND content_id = ?",
                params![connection_id, content_type.as_str(), content_id],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        Ok(deleted as u32)
    }

    fn prune_exhausted(&self, cutoff: DateTime<Utc>) -> Result<u32, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM search_registry \
                 WHERE state = 'exhausted' AND updated_at < ?",
                params![cutoff.to_rfc3339()],
            )
            .map_err(|e| RegistryError::Database(e.to_string()))?;
        Ok(deleted as u32)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            cooldown_base_secs: 300,
            cooldown_cap_secs: 43_200,
            jitter_fraction: 0.0,
        }
    }

    fn new_entry(connection_id: i64, content_id: i64) -> NewRegistryEntry {
        NewRegistryEntry {
            connection_id,
            content_type: ContentType::Episode,
            content_id,
            search_kind: SearchKind::Gap,
            title: format!("Episode {}", content_id),
        }
    }

    fn drive_to_searching(store: &SqliteRegistryStore, id: &str) {
        store.enqueue(id, 50, Utc::now()).unwrap();
        let popped = store.dequeue(1, 10).unwrap();
        assert!(popped.iter().any(|e| e.id == id));
        store.mark_searching(id, Utc::now()).unwrap();
    }

    #[test]
    fn test_upsert_creates_pending_entry() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        assert_eq!(entry.state, SearchState::Pending);
        assert_eq!(entry.attempt_count, 0);
        assert!(!entry.season_pack_failed);
    }

    #[test]
    fn test_upsert_is_idempotent_and_preserves_progress() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        drive_to_searching(&store, &entry.id);
        store
            .record_failure(&entry.id, FailureCategory::Network, &policy(), Utc::now())
            .unwrap();

        let again = store.upsert_entry(new_entry(1, 10)).unwrap();
        assert_eq!(again.id, entry.id);
        assert_eq!(again.state, SearchState::Cooldown);
        assert_eq!(again.attempt_count, 1);
    }

    #[test]
    fn test_upsert_refreshes_title() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        let mut renamed = new_entry(1, 10);
        renamed.title = "Renamed".to_string();
        let again = store.upsert_entry(renamed).unwrap();
        assert_eq!(again.id, entry.id);
        assert_eq!(again.title, "Renamed");
    }

    #[test]
    fn test_enqueue_only_from_pending() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        store.enqueue(&entry.id, 40, Utc::now()).unwrap();

        match store.enqueue(&entry.id, 40, Utc::now()) {
            Err(RegistryError::AlreadyQueued(id)) => assert_eq!(id, entry.id),
            other => panic!("expected AlreadyQueued, got {:?}", other.map(|q| q.id)),
        }
    }

    #[test]
    fn test_enqueue_missing_entry() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        assert!(matches!(
            store.enqueue("nope", 1, Utc::now()),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_dequeue_orders_by_priority_then_age() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let now = Utc::now();

        let low = store.upsert_entry(new_entry(1, 10)).unwrap();
        let high = store.upsert_entry(new_entry(1, 11)).unwrap();
        let older = store.upsert_entry(new_entry(1, 12)).unwrap();

        store.enqueue(&low.id, 10, now).unwrap();
        store
            .enqueue(&older.id, 50, now - Duration::minutes(5))
            .unwrap();
        store.enqueue(&high.id, 50, now).unwrap();

        let popped = store.dequeue(1, 10).unwrap();
        let ids: Vec<&str> = popped.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![older.id.as_str(), high.id.as_str(), low.id.as_str()]);
        assert_eq!(store.queue_depth(Some(1)).unwrap(), 0);
    }

    #[test]
    fn test_dequeue_scoped_to_connection() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let mine = store.upsert_entry(new_entry(1, 10)).unwrap();
        let other = store.upsert_entry(new_entry(2, 20)).unwrap();
        store.enqueue(&mine.id, 50, Utc::now()).unwrap();
        store.enqueue(&other.id, 90, Utc::now()).unwrap();

        let popped = store.dequeue(1, 10).unwrap();
        assert_eq!(popped.len(), 1);
        assert_eq!(popped[0].id, mine.id);
        assert_eq!(store.queue_depth(Some(2)).unwrap(), 1);
    }

    #[test]
    fn test_failure_enters_cooldown_then_exhausts_at_boundary() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let policy = policy();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();

        for expected_attempts in 1..policy.max_attempts {
            drive_to_searching(&store, &entry.id);
            let state = store
                .record_failure(&entry.id, FailureCategory::Server, &policy, Utc::now())
                .unwrap();
            assert_eq!(state, SearchState::Cooldown);

            let current = store.get_entry(&entry.id).unwrap().unwrap();
            assert_eq!(current.attempt_count, expected_attempts);
            assert!(current.next_eligible.unwrap() > Utc::now());

            let released = store.sweep_cooldowns(Utc::now() + Duration::days(2)).unwrap();
            assert_eq!(released, 1);
        }

        drive_to_searching(&store, &entry.id);
        let state = store
            .record_failure(&entry.id, FailureCategory::Server, &policy, Utc::now())
            .unwrap();
        assert_eq!(state, SearchState::Exhausted);

        let current = store.get_entry(&entry.id).unwrap().unwrap();
        assert_eq!(current.attempt_count, policy.max_attempts);
        assert!(current.next_eligible.is_none());

        // Exhausted entries never come back through the sweep.
        let released = store.sweep_cooldowns(Utc::now() + Duration::days(2)).unwrap();
        assert_eq!(released, 0);
    }

    #[test]
    fn test_record_success_removes_entry() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        drive_to_searching(&store, &entry.id);
        store.record_success(&entry.id).unwrap();
        assert!(store.get_entry(&entry.id).unwrap().is_none());
    }

    #[test]
    fn test_failure_requires_searching_state() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        assert!(matches!(
            store.record_failure(&entry.id, FailureCategory::Network, &policy(), Utc::now()),
            Err(RegistryError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_release_to_pending_does_not_count_attempt() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        drive_to_searching(&store, &entry.id);
        store.release_to_pending(&entry.id).unwrap();

        let current = store.get_entry(&entry.id).unwrap().unwrap();
        assert_eq!(current.state, SearchState::Pending);
        assert_eq!(current.attempt_count, 0);
    }

    #[test]
    fn test_sweep_leaves_future_cooldowns_alone() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        drive_to_searching(&store, &entry.id);
        store
            .record_failure(&entry.id, FailureCategory::Network, &policy(), Utc::now())
            .unwrap();

        assert_eq!(store.sweep_cooldowns(Utc::now()).unwrap(), 0);
        let current = store.get_entry(&entry.id).unwrap().unwrap();
        assert_eq!(current.state, SearchState::Cooldown);
    }

    #[test]
    fn test_force_exhaust_from_cooldown() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        drive_to_searching(&store, &entry.id);
        store
            .record_failure(&entry.id, FailureCategory::Network, &policy(), Utc::now())
            .unwrap();

        store.force_exhaust(&entry.id).unwrap();
        let current = store.get_entry(&entry.id).unwrap().unwrap();
        assert_eq!(current.state, SearchState::Exhausted);
    }

    #[test]
    fn test_force_exhaust_rejected_from_pending() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        assert!(matches!(
            store.force_exhaust(&entry.id),
            Err(RegistryError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_reap_stuck_searching() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let now = Utc::now();

        let stuck = store.upsert_entry(new_entry(1, 10)).unwrap();
        store.enqueue(&stuck.id, 50, now).unwrap();
        store.dequeue(1, 10).unwrap();
        store
            .mark_searching(&stuck.id, now - Duration::minutes(30))
            .unwrap();

        let fresh = store.upsert_entry(new_entry(1, 11)).unwrap();
        drive_to_searching(&store, &fresh.id);

        let cutoff = now - Duration::minutes(10);
        let reaped = store
            .reap_stuck_searching(cutoff, now + Duration::minutes(5))
            .unwrap();
        assert_eq!(reaped, 1);

        let stuck = store.get_entry(&stuck.id).unwrap().unwrap();
        assert_eq!(stuck.state, SearchState::Cooldown);
        assert_eq!(stuck.attempt_count, 0);
        assert_eq!(stuck.failure_category, Some(FailureCategory::Timeout));

        let fresh = store.get_entry(&fresh.id).unwrap().unwrap();
        assert_eq!(fresh.state, SearchState::Searching);
    }

    #[test]
    fn test_set_priority_updates_queue_row() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let first = store.upsert_entry(new_entry(1, 10)).unwrap();
        let second = store.upsert_entry(new_entry(1, 11)).unwrap();
        store.enqueue(&first.id, 10, Utc::now()).unwrap();
        store.enqueue(&second.id, 20, Utc::now()).unwrap();

        store.set_priority(&first.id, 99).unwrap();

        let popped = store.dequeue(1, 1).unwrap();
        assert_eq!(popped[0].id, first.id);
        assert_eq!(popped[0].priority, 99);
    }

    #[test]
    fn test_remove_from_queue_resets_to_pending() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        store.enqueue(&entry.id, 50, Utc::now()).unwrap();

        store.remove_from_queue(&entry.id).unwrap();
        let current = store.get_entry(&entry.id).unwrap().unwrap();
        assert_eq!(current.state, SearchState::Pending);
        assert_eq!(store.queue_depth(None).unwrap(), 0);
    }

    #[test]
    fn test_clear_queue_scoped_and_global() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let a = store.upsert_entry(new_entry(1, 10)).unwrap();
        let b = store.upsert_entry(new_entry(2, 20)).unwrap();
        let c = store.upsert_entry(new_entry(2, 21)).unwrap();
        for entry in [&a, &b, &c] {
            store.enqueue(&entry.id, 50, Utc::now()).unwrap();
        }

        assert_eq!(store.clear_queue(Some(2)).unwrap(), 2);
        assert_eq!(store.queue_depth(None).unwrap(), 1);
        assert_eq!(
            store.get_entry(&b.id).unwrap().unwrap().state,
            SearchState::Pending
        );

        assert_eq!(store.clear_queue(None).unwrap(), 1);
        assert_eq!(store.queue_depth(None).unwrap(), 0);
    }

    #[test]
    fn test_delete_for_content_removes_both_kinds() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        store.upsert_entry(new_entry(1, 10)).unwrap();
        let mut upgrade = new_entry(1, 10);
        upgrade.search_kind = SearchKind::Upgrade;
        let upgrade = store.upsert_entry(upgrade).unwrap();
        store.enqueue(&upgrade.id, 50, Utc::now()).unwrap();

        let deleted = store
            .delete_for_content(1, ContentType::Episode, 10)
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.queue_depth(None).unwrap(), 0);
        assert_eq!(store.list_content_refs(1).unwrap().len(), 0);
    }

    #[test]
    fn test_drop_stale_pending_only_touches_pending_rows() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let pending = store.upsert_entry(new_entry(1, 10)).unwrap();
        let mut upgrade = new_entry(1, 10);
        upgrade.search_kind = SearchKind::Upgrade;
        let queued = store.upsert_entry(upgrade).unwrap();
        store.enqueue(&queued.id, 50, Utc::now()).unwrap();

        let dropped = store
            .drop_stale_pending(1, ContentType::Episode, 10, SearchKind::Gap)
            .unwrap();
        assert_eq!(dropped, 1);
        assert!(store.get_entry(&pending.id).unwrap().is_none());

        // Wrong kind or non-pending state deletes nothing.
        let dropped = store
            .drop_stale_pending(1, ContentType::Episode, 10, SearchKind::Upgrade)
            .unwrap();
        assert_eq!(dropped, 0);
        assert!(store.get_entry(&queued.id).unwrap().is_some());
    }

    #[test]
    fn test_prune_exhausted_respects_cutoff() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let policy = RetryPolicy {
            max_attempts: 1,
            ..policy()
        };
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        drive_to_searching(&store, &entry.id);
        store
            .record_failure(&entry.id, FailureCategory::Server, &policy, Utc::now())
            .unwrap();

        assert_eq!(
            store
                .prune_exhausted(Utc::now() - Duration::days(7))
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .prune_exhausted(Utc::now() + Duration::seconds(1))
                .unwrap(),
            1
        );
        assert!(store.get_entry(&entry.id).unwrap().is_none());
    }

    #[test]
    fn test_list_entries_with_filters() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        store.upsert_entry(new_entry(1, 10)).unwrap();
        let mut movie = new_entry(2, 30);
        movie.content_type = ContentType::Movie;
        movie.title = "The Long Voyage".to_string();
        store.upsert_entry(movie).unwrap();

        let by_connection = RegistryFilter::new().with_connection(1);
        assert_eq!(store.count_entries(&by_connection).unwrap(), 1);

        let by_text = RegistryFilter::new().with_text("voyage");
        let matches = store.list_entries(&by_text).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].title, "The Long Voyage");

        let by_state = RegistryFilter::new().with_state(SearchState::Pending);
        assert_eq!(store.count_entries(&by_state).unwrap(), 2);
    }

    #[test]
    fn test_file_based_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let store = SqliteRegistryStore::new(&path).unwrap();
        let entry = store.upsert_entry(new_entry(1, 10)).unwrap();
        drop(store);

        let store = SqliteRegistryStore::new(&path).unwrap();
        let loaded = store.get_entry(&entry.id).unwrap().unwrap();
        assert_eq!(loaded.state, SearchState::Pending);
    }
}
