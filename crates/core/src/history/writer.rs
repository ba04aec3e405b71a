use std::sync::Arc;

use tokio::sync::mpsc;

use super::{HistoryEventEnvelope, HistoryHandle, HistoryRecord, HistoryStore};

/// Background task that receives history events and writes them to storage.
pub struct HistoryWriter {
    rx: mpsc::Receiver<HistoryEventEnvelope>,
    store: Arc<dyn HistoryStore>,
}

impl HistoryWriter {
    pub fn new(rx: mpsc::Receiver<HistoryEventEnvelope>, store: Arc<dyn HistoryStore>) -> Self {
        Self { rx, store }
    }

    /// Run the writer, consuming events until the channel is closed. Spawn
    /// as a background task.
    pub async fn run(mut self) {
        tracing::info!("History writer started");

        while let Some(envelope) = self.rx.recv().await {
            let record = HistoryRecord {
                id: 0, // assigned by the database
                timestamp: envelope.timestamp,
                event_type: envelope.event.event_type().to_string(),
                connection_id: envelope.event.connection_id(),
                entry_id: envelope.event.entry_id().map(String::from),
                data: envelope.event,
            };

            if let Err(e) = self.store.insert(&record) {
                tracing::error!("Failed to write history event: {}", e);
            }
        }

        tracing::info!("History writer shutting down");
    }
}

/// Wire up the history pipeline: a handle for emitting events and a writer
/// to spawn with `tokio::spawn(writer.run())`.
pub fn create_history_system(
    store: Arc<dyn HistoryStore>,
    buffer_size: usize,
) -> (HistoryHandle, HistoryWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let handle = HistoryHandle::new(tx);
    let writer = HistoryWriter::new(rx, store);
    (handle, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryFilter, SearchEvent, SqliteHistoryStore};

    #[tokio::test]
    async fn test_writer_receives_and_stores_events() {
        let store = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let store_dyn: Arc<dyn HistoryStore> = store.clone();
        let (handle, writer) = create_history_system(store_dyn, 10);

        let writer_task = tokio::spawn(writer.run());

        handle
            .emit(SearchEvent::ServiceStarted {
                version: "0.1.0".to_string(),
                config_hash: "abc".to_string(),
            })
            .await;

        drop(handle);
        writer_task.await.unwrap();

        let records = store.query(&HistoryFilter::new()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "service_started");
    }
}
