use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::SearchEvent;

/// Envelope wrapping a history event with its emission time.
#[derive(Debug, Clone)]
pub struct HistoryEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: SearchEvent,
}

/// Handle for emitting history events.
///
/// Cheaply cloneable and shared across tasks. Events travel through an async
/// channel to be written by the HistoryWriter; emission never fails the
/// caller.
#[derive(Clone)]
pub struct HistoryHandle {
    tx: mpsc::Sender<HistoryEventEnvelope>,
}

impl HistoryHandle {
    pub fn new(tx: mpsc::Sender<HistoryEventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit a history event asynchronously. A full or closed channel is
    /// logged, not surfaced.
    pub async fn emit(&self, event: SearchEvent) {
        let envelope = HistoryEventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to emit history event: {}", e);
        }
    }

    /// Try to emit without blocking. Returns whether the event was accepted.
    pub fn try_emit(&self, event: SearchEvent) -> bool {
        let envelope = HistoryEventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to emit history event: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_event() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = HistoryHandle::new(tx);

        handle
            .emit(SearchEvent::ServiceStopped {
                reason: "test".to_string(),
            })
            .await;

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.event_type(), "service_stopped");
    }

    #[tokio::test]
    async fn test_try_emit_reports_full_channel() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = HistoryHandle::new(tx);
        let event = || SearchEvent::ServiceStopped {
            reason: "test".to_string(),
        };
        assert!(handle.try_emit(event()));
        assert!(!handle.try_emit(event()));
    }
}
