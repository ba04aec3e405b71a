//! Remote library client trait and error type.

use async_trait::async_trait;
use thiserror::Error;

use crate::library::Connection;
use crate::registry::FailureCategory;

use super::types::{ContentPage, SearchRequest};

/// Error type for remote library calls.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Connection failed: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Authentication rejected")]
    Authentication,

    #[error("Rate limited by remote")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    #[error("Unexpected response: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Whether a later retry of the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RemoteError::Authentication)
    }

    /// How this failure is recorded against a registry entry. Rate limits are
    /// handled by the throttle layer and never recorded as attempts, so they
    /// have no category here.
    pub fn failure_category(&self) -> FailureCategory {
        match self {
            RemoteError::Network(_) => FailureCategory::Network,
            RemoteError::Timeout => FailureCategory::Timeout,
            RemoteError::Server { .. } => FailureCategory::Server,
            RemoteError::Authentication
            | RemoteError::RateLimited { .. }
            | RemoteError::Protocol(_) => FailureCategory::Unknown,
        }
    }
}

/// Client for one family of remote library APIs. Implementations are shared
/// across connections; the connection argument carries the base URL and
/// credentials per call.
#[async_trait]
pub trait RemoteLibraryClient: Send + Sync {
    /// Fetch one page of the remote's content listing. Pages are 1-based.
    async fn list_content(
        &self,
        connection: &Connection,
        page: u32,
        page_size: u32,
    ) -> Result<ContentPage, RemoteError>;

    /// Submit a search command; returns the remote's command id.
    async fn send_search(
        &self,
        connection: &Connection,
        request: &SearchRequest,
    ) -> Result<i64, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_is_not_retryable() {
        assert!(!RemoteError::Authentication.is_retryable());
        assert!(RemoteError::Timeout.is_retryable());
        assert!(RemoteError::Server { status: 503 }.is_retryable());
    }

    #[test]
    fn test_failure_categories() {
        assert_eq!(
            RemoteError::Network("refused".into()).failure_category(),
            FailureCategory::Network
        );
        assert_eq!(
            RemoteError::Timeout.failure_category(),
            FailureCategory::Timeout
        );
        assert_eq!(
            RemoteError::Server { status: 500 }.failure_category(),
            FailureCategory::Server
        );
    }
}
