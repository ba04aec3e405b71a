//! HTTP client for *arr-style library APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::library::{Connection, ConnectionCategory};

use super::client::{RemoteError, RemoteLibraryClient};
use super::types::{ContentPage, RemoteEpisode, RemoteItem, RemoteMovie, SearchRequest};

/// Paged listing envelope used by the *arr APIs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagedResponse<T> {
    total_records: u64,
    records: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    id: i64,
}

/// HTTP implementation of [`RemoteLibraryClient`]. One instance serves every
/// connection; base URL and API key come from the connection per call.
pub struct ArrHttpClient {
    client: Client,
}

impl ArrHttpClient {
    pub fn new(timeout_secs: u64) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    fn api_url(connection: &Connection, path: &str) -> String {
        format!(
            "{}/api/v3/{}",
            connection.base_url.trim_end_matches('/'),
            path
        )
    }

    fn map_transport_error(e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Network(e.to_string())
        }
    }

    /// Turn a non-success response into the matching error, reading the
    /// Retry-After header for 429s.
    fn check_status(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Authentication),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                Err(RemoteError::RateLimited { retry_after_secs })
            }
            _ => Err(RemoteError::Server {
                status: status.as_u16(),
            }),
        }
    }

    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        connection: &Connection,
        path: &str,
        page: u32,
        page_size: u32,
    ) -> Result<PagedResponse<T>, RemoteError> {
        let url = Self::api_url(connection, path);
        debug!(connection_id = connection.id, url = %url, page, "fetching remote listing page");

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &connection.api_key)
            .query(&[("page", page), ("pageSize", page_size)])
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        Self::check_status(response)?
            .json()
            .await
            .map_err(|e| RemoteError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl RemoteLibraryClient for ArrHttpClient {
    async fn list_content(
        &self,
        connection: &Connection,
        page: u32,
        page_size: u32,
    ) -> Result<ContentPage, RemoteError> {
        match connection.category {
            ConnectionCategory::SeriesProvider => {
                let paged: PagedResponse<RemoteEpisode> =
                    self.get_page(connection, "content", page, page_size).await?;
                Ok(ContentPage {
                    total_count: paged.total_records,
                    items: paged.records.into_iter().map(RemoteItem::Episode).collect(),
                })
            }
            ConnectionCategory::MovieProvider => {
                let paged: PagedResponse<RemoteMovie> =
                    self.get_page(connection, "content", page, page_size).await?;
                Ok(ContentPage {
                    total_count: paged.total_records,
                    items: paged.records.into_iter().map(RemoteItem::Movie).collect(),
                })
            }
        }
    }

    async fn send_search(
        &self,
        connection: &Connection,
        request: &SearchRequest,
    ) -> Result<i64, RemoteError> {
        let body = match request {
            SearchRequest::Episodes { episode_ids } => json!({
                "name": request.command_name(),
                "episodeIds": episode_ids,
            }),
            SearchRequest::Season {
                series_id,
                season_number,
            } => json!({
                "name": request.command_name(),
                "seriesId": series_id,
                "seasonNumber": season_number,
            }),
            SearchRequest::Movies { movie_ids } => json!({
                "name": request.command_name(),
                "movieIds": movie_ids,
            }),
        };

        let url = Self::api_url(connection, "command");
        debug!(
            connection_id = connection.id,
            command = request.command_name(),
            "submitting search command"
        );

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &connection.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let command: CommandResponse = Self::check_status(response)?
            .json()
            .await
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;

        Ok(command.id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn connection(base_url: &str) -> Connection {
        Connection {
            id: 1,
            name: "sonarr".to_string(),
            category: ConnectionCategory::SeriesProvider,
            base_url: base_url.to_string(),
            api_key: "key".to_string(),
            enabled: true,
            throttle_profile_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_api_url_handles_trailing_slash() {
        let conn = connection("http://localhost:8989/");
        assert_eq!(
            ArrHttpClient::api_url(&conn, "command"),
            "http://localhost:8989/api/v3/command"
        );
    }

    #[test]
    fn test_paged_response_parses_arr_envelope() {
        let body = r#"{
            "page": 1,
            "pageSize": 2,
            "totalRecords": 3,
            "records": [
                {"id": 11, "seriesId": 5, "seriesTitle": "Show", "seasonNumber": 1,
                 "title": "Pilot", "monitored": true, "hasFile": false,
                 "qualityCutoffNotMet": false, "airDate": null, "seriesMonitored": true}
            ]
        }"#;
        let paged: PagedResponse<RemoteEpisode> = serde_json::from_str(body).unwrap();
        assert_eq!(paged.total_records, 3);
        assert_eq!(paged.records[0].id, 11);
        assert!(!paged.records[0].has_file);
    }

    #[test]
    fn test_command_bodies() {
        let episodes = SearchRequest::Episodes {
            episode_ids: vec![1, 2],
        };
        assert_eq!(episodes.command_name(), "EpisodeSearch");

        let season = SearchRequest::Season {
            series_id: 9,
            season_number: 2,
        };
        assert_eq!(season.command_name(), "SeasonSearch");
    }
}
