//! Mock remote library client for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::library::Connection;
use crate::remote::{ContentPage, RemoteError, RemoteItem, RemoteLibraryClient, SearchRequest};

/// A recorded search submission for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSearch {
    pub connection_id: i64,
    pub request: SearchRequest,
}

/// Mock implementation of the RemoteLibraryClient trait.
///
/// Provides controllable behavior for testing:
/// - Serve a scripted content listing per connection, paged like the real API
/// - Script outcomes for search submissions, in order
/// - Track submitted searches for assertions
pub struct MockRemote {
    /// Scripted listing per connection id.
    listings: Arc<RwLock<HashMap<i64, Vec<RemoteItem>>>>,
    /// Queued outcomes for send_search; when empty, submissions succeed with
    /// sequential command ids.
    search_outcomes: Arc<RwLock<VecDeque<Result<i64, RemoteError>>>>,
    /// If set, the next list_content call fails with this error.
    next_list_error: Arc<RwLock<Option<RemoteError>>>,
    /// Recorded search submissions.
    searches: Arc<RwLock<Vec<RecordedSearch>>>,
    next_command_id: Arc<RwLock<i64>>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            listings: Arc::new(RwLock::new(HashMap::new())),
            search_outcomes: Arc::new(RwLock::new(VecDeque::new())),
            next_list_error: Arc::new(RwLock::new(None)),
            searches: Arc::new(RwLock::new(Vec::new())),
            next_command_id: Arc::new(RwLock::new(1)),
        }
    }

    /// Replace the scripted listing for a connection.
    pub async fn set_listing(&self, connection_id: i64, items: Vec<RemoteItem>) {
        self.listings.write().await.insert(connection_id, items);
    }

    /// Queue an outcome for the next search submission.
    pub async fn push_search_outcome(&self, outcome: Result<i64, RemoteError>) {
        self.search_outcomes.write().await.push_back(outcome);
    }

    /// Make the next list_content call fail.
    pub async fn fail_next_listing(&self, error: RemoteError) {
        *self.next_list_error.write().await = Some(error);
    }

    /// All searches submitted so far.
    pub async fn recorded_searches(&self) -> Vec<RecordedSearch> {
        self.searches.read().await.clone()
    }

    /// Number of searches submitted so far.
    pub async fn search_count(&self) -> usize {
        self.searches.read().await.len()
    }
}

#[async_trait]
impl RemoteLibraryClient for MockRemote {
    async fn list_content(
        &self,
        connection: &Connection,
        page: u32,
        page_size: u32,
    ) -> Result<ContentPage, RemoteError> {
        if let Some(error) = self.next_list_error.write().await.take() {
            return Err(error);
        }

        let listings = self.listings.read().await;
        let items = listings.get(&connection.id).cloned().unwrap_or_default();
        let total_count = items.len() as u64;

        let start = (page.saturating_sub(1) as usize) * page_size as usize;
        let page_items = items
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();

        Ok(ContentPage {
            items: page_items,
            total_count,
        })
    }

    async fn send_search(
        &self,
        connection: &Connection,
        request: &SearchRequest,
    ) -> Result<i64, RemoteError> {
        let outcome = self.search_outcomes.write().await.pop_front();
        let result = match outcome {
            Some(outcome) => outcome,
            None => {
                let mut next = self.next_command_id.write().await;
                let id = *next;
                *next += 1;
                Ok(id)
            }
        };

        if result.is_ok() {
            self.searches.write().await.push(RecordedSearch {
                connection_id: connection.id,
                request: request.clone(),
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::library::ConnectionCategory;
    use crate::remote::RemoteMovie;

    use super::*;

    fn connection(id: i64) -> Connection {
        Connection {
            id,
            name: format!("conn-{}", id),
            category: ConnectionCategory::MovieProvider,
            base_url: "http://localhost:7878".to_string(),
            api_key: "key".to_string(),
            enabled: true,
            throttle_profile_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn movie(id: i64) -> RemoteItem {
        RemoteItem::Movie(RemoteMovie {
            id,
            title: format!("Movie {}", id),
            monitored: true,
            has_file: false,
            quality_cutoff_not_met: false,
            release_date: None,
        })
    }

    #[tokio::test]
    async fn test_listing_pages() {
        let remote = MockRemote::new();
        remote.set_listing(1, (0..5).map(movie).collect()).await;

        let conn = connection(1);
        let first = remote.list_content(&conn, 1, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total_count, 5);

        let last = remote.list_content(&conn, 3, 2).await.unwrap();
        assert_eq!(last.items.len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_search_outcomes() {
        let remote = MockRemote::new();
        remote
            .push_search_outcome(Err(RemoteError::Timeout))
            .await;

        let conn = connection(1);
        let request = SearchRequest::Movies { movie_ids: vec![3] };

        assert!(matches!(
            remote.send_search(&conn, &request).await,
            Err(RemoteError::Timeout)
        ));
        // Failed submissions are not recorded.
        assert_eq!(remote.search_count().await, 0);

        let command_id = remote.send_search(&conn, &request).await.unwrap();
        assert_eq!(command_id, 1);
        assert_eq!(remote.search_count().await, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_is_one_shot() {
        let remote = MockRemote::new();
        remote
            .fail_next_listing(RemoteError::Server { status: 500 })
            .await;

        let conn = connection(1);
        assert!(remote.list_content(&conn, 1, 10).await.is_err());
        assert!(remote.list_content(&conn, 1, 10).await.is_ok());
    }
}
