//! The dispatch service: promotes pending registry entries into the queue,
//! drains the queue per connection under throttle control, plans batched
//! search requests, and settles the outcome of every submission back into
//! the state machine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{BatchingThresholds, RetryPolicy};
use crate::history::{HistoryHandle, SearchEvent};
use crate::library::{Connection, ContentType, LibraryStore};
use crate::metrics;
use crate::planner::{
    chunk_episode_entries, chunk_movie_entries, compute_priority, decide_season_scope,
    PriorityInput, SearchScope,
};
use crate::registry::{
    backoff, RegistryEntry, RegistryError, RegistryFilter, RegistryStore, SearchState,
};
use crate::remote::{RemoteError, RemoteLibraryClient, SearchRequest};
use crate::throttle::{DispatchDecision, ThrottleEnforcer};

use super::types::{DispatchError, DispatchStatus};

/// Cap on pending entries promoted per enqueue pass.
const ENQUEUE_PASS_LIMIT: i64 = 10_000;

/// A search request ready to go out, with the registry entries it covers.
struct PlannedRequest {
    request: SearchRequest,
    scope: SearchScope,
    entries: Vec<RegistryEntry>,
}

/// Whether the dispatch cycle for a connection continues after a settlement.
enum SettleOutcome {
    Continue,
    Halt,
}

pub struct DispatchService {
    library: Arc<dyn LibraryStore>,
    registry: Arc<dyn RegistryStore>,
    throttle: Arc<ThrottleEnforcer>,
    remote: Arc<dyn RemoteLibraryClient>,
    history: HistoryHandle,
    retry: RetryPolicy,
    batching: BatchingThresholds,
    search_timeout: StdDuration,
    /// Connections whose queue an operator has paused.
    paused: RwLock<HashSet<i64>>,
    /// Per-connection locks serializing queue mutation against settlement
    /// and reconciliation. Never held across a network call.
    locks: RwLock<HashMap<i64, Arc<Mutex<()>>>>,
}

impl DispatchService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        library: Arc<dyn LibraryStore>,
        registry: Arc<dyn RegistryStore>,
        throttle: Arc<ThrottleEnforcer>,
        remote: Arc<dyn RemoteLibraryClient>,
        history: HistoryHandle,
        retry: RetryPolicy,
        batching: BatchingThresholds,
        search_timeout_secs: u64,
    ) -> Self {
        Self {
            library,
            registry,
            throttle,
            remote,
            history,
            retry,
            batching,
            search_timeout: StdDuration::from_secs(search_timeout_secs.max(1)),
            paused: RwLock::new(HashSet::new()),
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// The lock serializing queue mutation for one connection. Reconciliation
    /// takes the same lock so a sync pass never races a dispatch cycle.
    pub async fn connection_lock(&self, connection_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.write().await;
        locks
            .entry(connection_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    /// Promote pending entries into the queue with freshly computed
    /// priorities. Returns the number of entries enqueued.
    pub fn enqueue_pending(&self, now: DateTime<Utc>) -> Result<u32, DispatchError> {
        let filter = RegistryFilter::new()
            .with_state(SearchState::Pending)
            .with_limit(ENQUEUE_PASS_LIMIT);
        let pending = self.registry.list_entries(&filter)?;

        let mut enqueued = 0u32;
        for entry in pending {
            let priority = self.compute_entry_priority(&entry, now)?;
            match self.registry.enqueue(&entry.id, priority, now) {
                Ok(_) => {
                    metrics::ENQUEUED_TOTAL
                        .with_label_values(&[entry.search_kind.as_str()])
                        .inc();
                    enqueued += 1;
                }
                Err(RegistryError::AlreadyQueued(_)) => {}
                Err(RegistryError::InvalidTransition { .. }) | Err(RegistryError::NotFound(_)) => {
                    // Raced by another transition since the listing; skip.
                    debug!(entry_id = %entry.id, "skipped entry during enqueue pass");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if enqueued > 0 {
            debug!(enqueued, "promoted pending entries into the queue");
        }
        self.refresh_queue_depth()?;
        Ok(enqueued)
    }

    /// Age-based priority for an entry, anchored to the content's air or
    /// release date when known and the entry's creation time otherwise.
    fn compute_entry_priority(
        &self,
        entry: &RegistryEntry,
        now: DateTime<Utc>,
    ) -> Result<u32, DispatchError> {
        let anchor = match entry.content_type {
            ContentType::Episode => self
                .library
                .get_episode(entry.content_id)?
                .and_then(|e| e.air_date),
            ContentType::Movie => self
                .library
                .get_movie(entry.content_id)?
                .and_then(|m| m.release_date),
        };
        let anchor = anchor.unwrap_or(entry.created_at);
        let age_days = (now - anchor).num_days().max(0);

        Ok(compute_priority(&PriorityInput {
            age_days,
            attempt_count: entry.attempt_count,
            search_kind: entry.search_kind,
            manual_boost: None,
        }))
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run one dispatch cycle for every enabled connection. Returns the total
    /// number of searches submitted.
    pub async fn dispatch_all(&self, now: DateTime<Utc>) -> Result<u32, DispatchError> {
        let connections = self.library.list_enabled_connections()?;
        let mut submitted = 0u32;
        for connection in &connections {
            match self.dispatch_connection(connection, now).await {
                Ok(n) => submitted += n,
                Err(e) => {
                    warn!(connection_id = connection.id, error = %e, "dispatch cycle failed");
                }
            }
        }
        self.refresh_queue_depth()?;
        Ok(submitted)
    }

    /// Run one dispatch cycle for a single connection: throttle check, drain
    /// up to one batch worth of queue entries, plan requests, submit them,
    /// and settle each outcome. Returns the number of searches submitted.
    pub async fn dispatch_connection(
        &self,
        connection: &Connection,
        now: DateTime<Utc>,
    ) -> Result<u32, DispatchError> {
        if self.is_paused(connection.id).await {
            return Ok(0);
        }

        if let DispatchDecision::Denied { reason, retry_at } =
            self.throttle.can_dispatch(connection, now)?
        {
            metrics::THROTTLE_DENIALS
                .with_label_values(&[reason.as_str()])
                .inc();
            debug!(
                connection_id = connection.id,
                reason = reason.as_str(),
                retry_at = %retry_at,
                "dispatch denied by throttle"
            );
            return Ok(0);
        }

        let lock = self.connection_lock(connection.id).await;
        let entries = {
            let _guard = lock.lock().await;
            let entries = self
                .registry
                .dequeue(connection.id, self.batching.max_batch_size)?;
            for entry in &entries {
                self.registry.mark_searching(&entry.id, now)?;
            }
            entries
        };
        if entries.is_empty() {
            return Ok(0);
        }

        let planned = self.plan_requests(connection, entries, now)?;

        let mut submitted = 0u32;
        let mut attempted = 0u32;
        let mut remaining = planned.into_iter();
        while let Some(request) = remaining.next() {
            // Every request after the first consumes fresh throttle capacity.
            if attempted > 0 {
                let check_at = Utc::now();
                if let DispatchDecision::Denied { reason, .. } =
                    self.throttle.can_dispatch(connection, check_at)?
                {
                    metrics::THROTTLE_DENIALS
                        .with_label_values(&[reason.as_str()])
                        .inc();
                    self.release_planned(Some(request), remaining)?;
                    break;
                }
            }

            attempted += 1;
            self.throttle.record_dispatch(connection.id, Utc::now())?;
            let timer = metrics::DISPATCH_DURATION.start_timer();
            let outcome =
                match tokio::time::timeout(self.search_timeout, self.remote.send_search(connection, &request.request)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(RemoteError::Timeout),
                };
            timer.observe_duration();

            if outcome.is_ok() {
                submitted += 1;
            }

            let settled = {
                let _guard = lock.lock().await;
                self.settle(connection, &request, outcome, Utc::now()).await?
            };
            if let SettleOutcome::Halt = settled {
                self.release_planned(None, remaining)?;
                break;
            }
        }

        Ok(submitted)
    }

    /// Return entries of unsent planned requests to `pending`.
    fn release_planned(
        &self,
        first: Option<PlannedRequest>,
        rest: impl Iterator<Item = PlannedRequest>,
    ) -> Result<(), DispatchError> {
        for planned in first.into_iter().chain(rest) {
            for entry in &planned.entries {
                self.release_entry(&entry.id);
            }
        }
        Ok(())
    }

    fn release_entry(&self, id: &str) {
        match self.registry.release_to_pending(id) {
            Ok(()) => {}
            Err(RegistryError::NotFound(_)) | Err(RegistryError::InvalidTransition { .. }) => {
                debug!(entry_id = id, "entry moved on before release");
            }
            Err(e) => warn!(entry_id = id, error = %e, "failed to release entry"),
        }
    }

    // =========================================================================
    // Planning
    // =========================================================================

    /// Turn a drained batch of `searching` entries into concrete search
    /// requests. Episode entries are grouped per season and widened to a
    /// season-pack search when the season qualifies; everything else is
    /// chunked into id-list requests. Entries whose mirrored content row has
    /// vanished are released back to `pending` for the orphan sweep.
    fn plan_requests(
        &self,
        connection: &Connection,
        entries: Vec<RegistryEntry>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PlannedRequest>, DispatchError> {
        let mut seasons: BTreeMap<(i64, u32), Vec<(crate::library::Episode, RegistryEntry)>> =
            BTreeMap::new();
        let mut movies: Vec<(crate::library::Movie, RegistryEntry)> = Vec::new();

        for entry in entries {
            match entry.content_type {
                ContentType::Episode => match self.library.get_episode(entry.content_id)? {
                    Some(episode) => {
                        seasons
                            .entry((episode.series_id, episode.season_number))
                            .or_default()
                            .push((episode, entry));
                    }
                    None => {
                        debug!(entry_id = %entry.id, "episode row gone, releasing entry");
                        self.release_entry(&entry.id);
                    }
                },
                ContentType::Movie => match self.library.get_movie(entry.content_id)? {
                    Some(movie) => movies.push((movie, entry)),
                    None => {
                        debug!(entry_id = %entry.id, "movie row gone, releasing entry");
                        self.release_entry(&entry.id);
                    }
                },
            }
        }

        let mut planned = Vec::new();
        let mut episode_pairs: Vec<(i64, RegistryEntry)> = Vec::new();
        let mut remote_episode_ids: HashMap<i64, i64> = HashMap::new();

        for ((series_id, season_number), group) in seasons {
            let status = self.library.season_status(series_id, season_number, now)?;
            let pack_failed = group.iter().any(|(_, e)| e.season_pack_failed);

            match decide_season_scope(&status, pack_failed, &self.batching) {
                SearchScope::SeasonSearch => {
                    let series = self
                        .library
                        .get_series(series_id)?
                        .ok_or_else(|| DispatchError::MissingContent(format!("series {series_id}")))?;
                    planned.push(PlannedRequest {
                        request: SearchRequest::Season {
                            series_id: series.remote_id,
                            season_number: season_number as i64,
                        },
                        scope: SearchScope::SeasonSearch,
                        entries: group.into_iter().map(|(_, e)| e).collect(),
                    });
                }
                SearchScope::EpisodeSearch => {
                    for (episode, entry) in group {
                        remote_episode_ids.insert(entry.content_id, episode.remote_id);
                        episode_pairs.push((series_id, entry));
                    }
                }
            }
        }

        for batch in chunk_episode_entries(connection.id, episode_pairs, self.batching.max_batch_size)
        {
            let episode_ids = batch
                .entries
                .iter()
                .map(|e| remote_episode_ids[&e.content_id])
                .collect();
            planned.push(PlannedRequest {
                request: SearchRequest::Episodes { episode_ids },
                scope: SearchScope::EpisodeSearch,
                entries: batch.entries,
            });
        }

        let mut remote_movie_ids: HashMap<i64, i64> = HashMap::new();
        let mut movie_entries = Vec::new();
        for (movie, entry) in movies {
            remote_movie_ids.insert(entry.content_id, movie.remote_id);
            movie_entries.push(entry);
        }
        for batch in chunk_movie_entries(connection.id, movie_entries, self.batching.max_batch_size)
        {
            let movie_ids = batch
                .entries
                .iter()
                .map(|e| remote_movie_ids[&e.content_id])
                .collect();
            planned.push(PlannedRequest {
                request: SearchRequest::Movies { movie_ids },
                scope: SearchScope::EpisodeSearch,
                entries: batch.entries,
            });
        }

        Ok(planned)
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Apply a submission outcome to every entry the request covered.
    async fn settle(
        &self,
        connection: &Connection,
        planned: &PlannedRequest,
        outcome: Result<i64, RemoteError>,
        now: DateTime<Utc>,
    ) -> Result<SettleOutcome, DispatchError> {
        match outcome {
            Ok(command_id) => {
                metrics::DISPATCHES_TOTAL
                    .with_label_values(&["sent"])
                    .inc_by(planned.entries.len() as u64);
                for entry in &planned.entries {
                    match self.registry.record_success(&entry.id) {
                        Ok(()) => {}
                        Err(RegistryError::NotFound(_)) => {
                            debug!(entry_id = %entry.id, "entry gone before success settle");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    }
                    self.history
                        .emit(SearchEvent::SearchDispatched {
                            connection_id: connection.id,
                            entry_id: entry.id.clone(),
                            title: entry.title.clone(),
                            search_kind: entry.search_kind.as_str().to_string(),
                            batch_size: planned.entries.len(),
                            command_id,
                        })
                        .await;
                }
                Ok(SettleOutcome::Continue)
            }
            Err(RemoteError::RateLimited { retry_after_secs }) => {
                metrics::DISPATCHES_TOTAL
                    .with_label_values(&["rate_limited"])
                    .inc();
                let until =
                    self.throttle
                        .handle_rate_limit_response(connection, retry_after_secs, now)?;
                for entry in &planned.entries {
                    self.release_entry(&entry.id);
                }
                self.history
                    .emit(SearchEvent::ConnectionPaused {
                        connection_id: connection.id,
                        until,
                        reason: "remote rate limit".to_string(),
                    })
                    .await;
                Ok(SettleOutcome::Halt)
            }
            Err(RemoteError::Authentication) => {
                metrics::DISPATCHES_TOTAL
                    .with_label_values(&["auth_rejected"])
                    .inc();
                warn!(
                    connection_id = connection.id,
                    "authentication rejected, disabling connection"
                );
                self.library.set_connection_enabled(connection.id, false)?;
                for entry in &planned.entries {
                    self.release_entry(&entry.id);
                }
                self.history
                    .emit(SearchEvent::ConnectionSuspended {
                        connection_id: connection.id,
                        reason: "authentication rejected".to_string(),
                    })
                    .await;
                Ok(SettleOutcome::Halt)
            }
            Err(error) => {
                metrics::DISPATCHES_TOTAL
                    .with_label_values(&["failed"])
                    .inc_by(planned.entries.len() as u64);
                let category = error.failure_category();
                for entry in &planned.entries {
                    if matches!(planned.scope, SearchScope::SeasonSearch) {
                        if let Err(e) = self.registry.mark_season_pack_failed(&entry.id) {
                            warn!(entry_id = %entry.id, error = %e, "failed to flag season pack");
                        }
                    }
                    let resulting_state =
                        match self.registry.record_failure(&entry.id, category, &self.retry, now) {
                            Ok(state) => state,
                            Err(RegistryError::NotFound(_)) => {
                                debug!(entry_id = %entry.id, "entry gone before failure settle");
                                continue;
                            }
                            Err(e) => return Err(e.into()),
                        };
                    self.history
                        .emit(SearchEvent::SearchFailed {
                            connection_id: connection.id,
                            entry_id: entry.id.clone(),
                            title: entry.title.clone(),
                            category: category.as_str().to_string(),
                            attempt_count: entry.attempt_count + 1,
                            resulting_state: resulting_state.as_str().to_string(),
                        })
                        .await;
                }
                Ok(SettleOutcome::Continue)
            }
        }
    }

    // =========================================================================
    // Sweeps
    // =========================================================================

    /// Release entries whose cooldown has expired.
    pub fn sweep_cooldowns(&self, now: DateTime<Utc>) -> Result<u32, DispatchError> {
        Ok(self.registry.sweep_cooldowns(now)?)
    }

    /// Zero lapsed throttle windows and clear expired pauses.
    pub fn sweep_throttles(&self, now: DateTime<Utc>) -> Result<u32, DispatchError> {
        Ok(self.throttle.sweep(now)?)
    }

    /// Force entries stuck in `searching` past the timeout into cooldown.
    pub fn reap_stuck(
        &self,
        now: DateTime<Utc>,
        stuck_timeout_secs: u64,
    ) -> Result<u32, DispatchError> {
        let cutoff = now - Duration::seconds(stuck_timeout_secs.max(1) as i64);
        let next_eligible =
            now + Duration::seconds(backoff::base_cooldown_secs(1, &self.retry) as i64);
        let reaped = self.registry.reap_stuck_searching(cutoff, next_eligible)?;
        if reaped > 0 {
            warn!(reaped, "reset entries stuck in searching");
        }
        Ok(reaped)
    }

    // =========================================================================
    // Operator controls
    // =========================================================================

    pub async fn pause_queue(&self, connection_id: i64) {
        self.paused.write().await.insert(connection_id);
        info!(connection_id, "queue paused");
    }

    pub async fn resume_queue(&self, connection_id: i64) {
        self.paused.write().await.remove(&connection_id);
        info!(connection_id, "queue resumed");
    }

    pub async fn is_paused(&self, connection_id: i64) -> bool {
        self.paused.read().await.contains(&connection_id)
    }

    /// Drain the queue, globally or for one connection.
    pub fn clear_queue(&self, connection_id: Option<i64>) -> Result<u32, DispatchError> {
        let cleared = self.registry.clear_queue(connection_id)?;
        self.refresh_queue_depth()?;
        Ok(cleared)
    }

    pub fn remove_from_queue(&self, entry_id: &str) -> Result<(), DispatchError> {
        self.registry.remove_from_queue(entry_id)?;
        self.refresh_queue_depth()?;
        Ok(())
    }

    /// Operator priority override for a pending or queued entry.
    pub fn set_priority(&self, entry_id: &str, priority: u32) -> Result<(), DispatchError> {
        Ok(self.registry.set_priority(entry_id, priority)?)
    }

    /// Operator action: give up on an in-flight or cooling-down entry.
    pub fn force_exhaust(&self, entry_id: &str) -> Result<(), DispatchError> {
        Ok(self.registry.force_exhaust(entry_id)?)
    }

    pub fn list_entries(
        &self,
        filter: &RegistryFilter,
    ) -> Result<Vec<RegistryEntry>, DispatchError> {
        Ok(self.registry.list_entries(filter)?)
    }

    pub fn count_entries(&self, filter: &RegistryFilter) -> Result<i64, DispatchError> {
        Ok(self.registry.count_entries(filter)?)
    }

    /// State counts and queue depth for the status surface.
    pub async fn status(&self, running: bool) -> Result<DispatchStatus, DispatchError> {
        let count = |state: SearchState| -> Result<usize, DispatchError> {
            Ok(self
                .registry
                .count_entries(&RegistryFilter::new().with_state(state))? as usize)
        };

        let mut paused_connections: Vec<i64> = self.paused.read().await.iter().copied().collect();
        paused_connections.sort_unstable();

        Ok(DispatchStatus {
            running,
            pending_count: count(SearchState::Pending)?,
            queued_count: count(SearchState::Queued)?,
            searching_count: count(SearchState::Searching)?,
            cooldown_count: count(SearchState::Cooldown)?,
            exhausted_count: count(SearchState::Exhausted)?,
            queue_depth: self.registry.queue_depth(None)? as usize,
            paused_connections,
        })
    }

    fn refresh_queue_depth(&self) -> Result<(), DispatchError> {
        metrics::QUEUE_DEPTH.set(self.registry.queue_depth(None)?);
        Ok(())
    }
}
