//! SQLite-backed history store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{HistoryError, HistoryFilter, HistoryRecord, HistoryStore, SearchEvent};

/// SQLite-backed search history store.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path).map_err(|e| HistoryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| HistoryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), HistoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS search_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                connection_id INTEGER,
                entry_id TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_timestamp ON search_history(timestamp);
            CREATE INDEX IF NOT EXISTS idx_history_connection ON search_history(connection_id);
            CREATE INDEX IF NOT EXISTS idx_history_event_type ON search_history(event_type);
            "#,
        )
        .map_err(|e| HistoryError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &HistoryFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(connection_id) = filter.connection_id {
            conditions.push("connection_id = ?");
            params.push(Box::new(connection_id));
        }

        if let Some(ref entry_id) = filter.entry_id {
            conditions.push("entry_id = ?");
            params.push(Box::new(entry_id.clone()));
        }

        if let Some(ref event_type) = filter.event_type {
            conditions.push("event_type = ?");
            params.push(Box::new(event_type.clone()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("timestamp >= ?");
            params.push(Box::new(from.to_rfc3339()));
        }

        if let Some(ref to) = filter.to {
            conditions.push("timestamp <= ?");
            params.push(Box::new(to.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn insert(&self, record: &HistoryRecord) -> Result<i64, HistoryError> {
        let conn = self.conn.lock().unwrap();

        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| HistoryError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO search_history (timestamp, event_type, connection_id, entry_id, data) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.connection_id,
                record.entry_id,
                data_json,
            ],
        )
        .map_err(|e| HistoryError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &HistoryFilter) -> Result<Vec<HistoryRecord>, HistoryError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT id, timestamp, event_type, connection_id, entry_id, data \
             FROM search_history {} ORDER BY timestamp DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let id: i64 = row.get(0)?;
                let timestamp_str: String = row.get(1)?;
                let event_type: String = row.get(2)?;
                let connection_id: Option<i64> = row.get(3)?;
                let entry_id: Option<String> = row.get(4)?;
                let data_json: String = row.get(5)?;
                Ok((id, timestamp_str, event_type, connection_id, entry_id, data_json))
            })
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            let (id, timestamp_str, event_type, connection_id, entry_id, data_json) =
                row_result.map_err(|e| HistoryError::Database(e.to_string()))?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_str)
                .map_err(|e| HistoryError::Database(format!("Invalid timestamp: {}", e)))?
                .into();

            let data: SearchEvent = serde_json::from_str(&data_json)
                .map_err(|e| HistoryError::Serialization(e.to_string()))?;

            records.push(HistoryRecord {
                id,
                timestamp,
                event_type,
                connection_id,
                entry_id,
                data,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &HistoryFilter) -> Result<i64, HistoryError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM search_history {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| HistoryError::Database(e.to_string()))
    }

    fn prune(&self, cutoff: DateTime<Utc>) -> Result<u32, HistoryError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM search_history WHERE timestamp < ?",
                params![cutoff.to_rfc3339()],
            )
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        Ok(deleted as u32)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record(event: SearchEvent, timestamp: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            connection_id: event.connection_id(),
            entry_id: event.entry_id().map(String::from),
            data: event,
        }
    }

    fn dispatched(connection_id: i64, entry_id: &str) -> SearchEvent {
        SearchEvent::SearchDispatched {
            connection_id,
            entry_id: entry_id.to_string(),
            title: "Pilot".to_string(),
            search_kind: "gap".to_string(),
            batch_size: 1,
            command_id: 77,
        }
    }

    #[test]
    fn test_insert_and_query() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let id = store.insert(&record(dispatched(1, "a"), Utc::now())).unwrap();
        assert!(id > 0);

        let records = store.query(&HistoryFilter::new()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "search_dispatched");
        assert_eq!(records[0].connection_id, Some(1));
    }

    #[test]
    fn test_query_filters_by_connection_and_type() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store.insert(&record(dispatched(1, "a"), Utc::now())).unwrap();
        store.insert(&record(dispatched(2, "b"), Utc::now())).unwrap();
        store
            .insert(&record(
                SearchEvent::SyncFailed {
                    connection_id: 1,
                    error: "boom".to_string(),
                },
                Utc::now(),
            ))
            .unwrap();

        let by_connection = HistoryFilter::new().with_connection(1);
        assert_eq!(store.count(&by_connection).unwrap(), 2);

        let by_type = HistoryFilter::new()
            .with_connection(1)
            .with_event_type("sync_failed");
        let records = store.query(&by_type).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_query_filters_by_entry() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store.insert(&record(dispatched(1, "a"), Utc::now())).unwrap();
        store.insert(&record(dispatched(1, "b"), Utc::now())).unwrap();

        let filter = HistoryFilter::new().with_entry_id("b");
        let records = store.query(&filter).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_prune_removes_only_old_records() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .insert(&record(dispatched(1, "old"), now - Duration::days(60)))
            .unwrap();
        store.insert(&record(dispatched(1, "new"), now)).unwrap();

        let pruned = store.prune(now - Duration::days(30)).unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.count(&HistoryFilter::new()).unwrap(), 1);
    }
}
