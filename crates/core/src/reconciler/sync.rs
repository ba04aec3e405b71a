//! Remote listing reconciliation.
//!
//! One pass brings the local mirror in line with the remote, removes state
//! for content the remote no longer lists, and refreshes the set of search
//! candidates. Cleanup ordering is load-bearing: registry entries referencing
//! a vanished item are deleted before the mirror row, so no observer ever
//! sees an entry without its content.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::history::{HistoryHandle, SearchEvent};
use crate::library::{
    Connection, ContentType, EpisodeUpsert, LibraryError, LibraryStore, MovieUpsert, SeriesUpsert,
};
use crate::registry::{NewRegistryEntry, RegistryError, RegistryStore, SearchKind};
use crate::remote::{RemoteError, RemoteItem, RemoteLibraryClient};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub connection_id: i64,
    pub pages_fetched: u32,
    pub upserted: u64,
    pub deleted: u64,
    /// Registry entries refreshed or created for current candidates.
    pub candidates: u64,
    /// Items whose upsert failed; the pass continues past them.
    pub failed: u64,
}

pub struct SyncReconciler {
    library: Arc<dyn LibraryStore>,
    registry: Arc<dyn RegistryStore>,
    remote: Arc<dyn RemoteLibraryClient>,
    history: HistoryHandle,
    page_size: u32,
}

impl SyncReconciler {
    pub fn new(
        library: Arc<dyn LibraryStore>,
        registry: Arc<dyn RegistryStore>,
        remote: Arc<dyn RemoteLibraryClient>,
        history: HistoryHandle,
        page_size: u32,
    ) -> Self {
        Self {
            library,
            registry,
            remote,
            history,
            page_size: page_size.max(1),
        }
    }

    pub fn history(&self) -> &HistoryHandle {
        &self.history
    }

    /// Reconcile one connection against the remote listing. The future is
    /// safe to abort between pages; a later pass picks up where this one
    /// left off.
    pub async fn sync_connection(&self, connection: &Connection) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport {
            connection_id: connection.id,
            ..Default::default()
        };

        let items = self.fetch_all_pages(connection, &mut report).await?;
        debug!(
            connection_id = connection.id,
            items = items.len(),
            pages = report.pages_fetched,
            "remote listing fetched"
        );

        let seen = self.upsert_items(connection, &items, &mut report);
        self.delete_missing(connection, &seen, &mut report)?;
        self.refresh_candidates(connection, &mut report)?;

        info!(
            connection_id = connection.id,
            upserted = report.upserted,
            deleted = report.deleted,
            candidates = report.candidates,
            failed = report.failed,
            "reconciliation complete"
        );
        self.history
            .emit(SearchEvent::SyncCompleted {
                connection_id: connection.id,
                upserted: report.upserted,
                deleted: report.deleted,
                candidates: report.candidates,
                failures: report.failed,
            })
            .await;

        Ok(report)
    }

    async fn fetch_all_pages(
        &self,
        connection: &Connection,
        report: &mut SyncReport,
    ) -> Result<Vec<RemoteItem>, SyncError> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let content = self
                .remote
                .list_content(connection, page, self.page_size)
                .await?;
            report.pages_fetched += 1;

            let fetched = content.items.len();
            items.extend(content.items);

            if fetched == 0 || items.len() as u64 >= content.total_count {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    /// Upsert every remote item into the mirror. Individual failures are
    /// counted and skipped; they never abort the pass.
    fn upsert_items(
        &self,
        connection: &Connection,
        items: &[RemoteItem],
        report: &mut SyncReport,
    ) -> HashSet<(ContentType, i64)> {
        let mut seen = HashSet::new();
        for item in items {
            let outcome = match item {
                RemoteItem::Episode(episode) => self
                    .library
                    .upsert_series(&SeriesUpsert {
                        connection_id: connection.id,
                        remote_id: episode.series_id,
                        title: episode.series_title.clone(),
                        monitored: episode.series_monitored,
                    })
                    .and_then(|series_id| {
                        self.library.upsert_episode(&EpisodeUpsert {
                            connection_id: connection.id,
                            series_id,
                            season_number: episode.season_number.max(0) as u32,
                            remote_id: episode.id,
                            title: episode.title.clone(),
                            monitored: episode.monitored,
                            has_file: episode.has_file,
                            quality_cutoff_not_met: episode.quality_cutoff_not_met,
                            air_date: episode.air_date,
                        })
                    })
                    .map(|_| (ContentType::Episode, episode.id)),
                RemoteItem::Movie(movie) => self
                    .library
                    .upsert_movie(&MovieUpsert {
                        connection_id: connection.id,
                        remote_id: movie.id,
                        title: movie.title.clone(),
                        monitored: movie.monitored,
                        has_file: movie.has_file,
                        quality_cutoff_not_met: movie.quality_cutoff_not_met,
                        release_date: movie.release_date,
                    })
                    .map(|_| (ContentType::Movie, movie.id)),
            };

            match outcome {
                Ok(key) => {
                    seen.insert(key);
                    report.upserted += 1;
                }
                Err(e) => {
                    warn!(
                        connection_id = connection.id,
                        remote_id = item.remote_id(),
                        error = %e,
                        "upsert failed, skipping item"
                    );
                    report.failed += 1;
                }
            }
        }
        seen
    }

    /// Remove mirror rows the remote no longer lists, cleaning up registry
    /// state first.
    fn delete_missing(
        &self,
        connection: &Connection,
        seen: &HashSet<(ContentType, i64)>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        for episode in self.library.list_episodes(connection.id)? {
            if !seen.contains(&(ContentType::Episode, episode.remote_id)) {
                self.registry
                    .delete_for_content(connection.id, ContentType::Episode, episode.id)?;
                self.library.delete_episode(episode.id)?;
                crate::metrics::SYNC_DELETIONS
                    .with_label_values(&["episode"])
                    .inc();
                report.deleted += 1;
            }
        }
        for movie in self.library.list_movies(connection.id)? {
            if !seen.contains(&(ContentType::Movie, movie.remote_id)) {
                self.registry
                    .delete_for_content(connection.id, ContentType::Movie, movie.id)?;
                self.library.delete_movie(movie.id)?;
                crate::metrics::SYNC_DELETIONS
                    .with_label_values(&["movie"])
                    .inc();
                report.deleted += 1;
            }
        }
        self.library.delete_orphan_series(connection.id)?;
        Ok(())
    }

    /// Upsert pending registry entries for every gap and upgrade candidate in
    /// the refreshed mirror, and drop pending entries whose candidacy lapsed
    /// out-of-band (a file acquired outside the dispatch loop). Entries past
    /// `pending` are left for the state machine to settle.
    fn refresh_candidates(
        &self,
        connection: &Connection,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        for episode in self.library.list_episodes(connection.id)? {
            self.refresh_candidate(
                connection.id,
                ContentType::Episode,
                episode.id,
                SearchKind::Gap,
                episode.is_gap_candidate(),
                &episode.title,
                report,
            )?;
            self.refresh_candidate(
                connection.id,
                ContentType::Episode,
                episode.id,
                SearchKind::Upgrade,
                episode.is_upgrade_candidate(),
                &episode.title,
                report,
            )?;
        }
        for movie in self.library.list_movies(connection.id)? {
            self.refresh_candidate(
                connection.id,
                ContentType::Movie,
                movie.id,
                SearchKind::Gap,
                movie.is_gap_candidate(),
                &movie.title,
                report,
            )?;
            self.refresh_candidate(
                connection.id,
                ContentType::Movie,
                movie.id,
                SearchKind::Upgrade,
                movie.is_upgrade_candidate(),
                &movie.title,
                report,
            )?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn refresh_candidate(
        &self,
        connection_id: i64,
        content_type: ContentType,
        content_id: i64,
        search_kind: SearchKind,
        qualifies: bool,
        title: &str,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if qualifies {
            self.registry.upsert_entry(NewRegistryEntry {
                connection_id,
                content_type,
                content_id,
                search_kind,
                title: title.to_string(),
            })?;
            report.candidates += 1;
        } else {
            let dropped = self.registry.drop_stale_pending(
                connection_id,
                content_type,
                content_id,
                search_kind,
            )?;
            if dropped > 0 {
                debug!(
                    connection_id,
                    content_id,
                    kind = search_kind.as_str(),
                    "dropped pending entry, content no longer a candidate"
                );
            }
        }
        Ok(())
    }
}
