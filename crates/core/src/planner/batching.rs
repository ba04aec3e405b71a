//! Season batching decision and batch assembly.

use std::collections::BTreeMap;

use crate::config::BatchingThresholds;
use crate::library::SeasonStatus;
use crate::registry::RegistryEntry;

use super::types::{SearchBatch, SearchScope};

/// Decide whether a season's gaps warrant one season-pack search or
/// individual episode searches.
///
/// Checked in order:
/// 1. a previously failed season pack always forces episode searches;
/// 2. nothing missing, nothing to batch;
/// 3. a season still airing is searched per episode so an incomplete pack
///    is never grabbed;
/// 4. too few gaps (below the count minimum or the percent threshold) go
///    per episode;
/// 5. otherwise the whole season is worth one pack search.
pub fn decide_season_scope(
    status: &SeasonStatus,
    season_pack_failed: bool,
    thresholds: &BatchingThresholds,
) -> SearchScope {
    if season_pack_failed {
        return SearchScope::EpisodeSearch;
    }
    if status.missing_count() == 0 {
        return SearchScope::EpisodeSearch;
    }
    if status.next_airing.is_some() {
        return SearchScope::EpisodeSearch;
    }
    if status.missing_count() < thresholds.min_missing_count
        || status.missing_percent() < thresholds.min_missing_percent
    {
        return SearchScope::EpisodeSearch;
    }
    SearchScope::SeasonSearch
}

/// Group episode entries by their parent series, then chunk each group to
/// the batch size cap. Grouping is ordered by series id so the output is
/// deterministic.
pub fn chunk_episode_entries(
    connection_id: i64,
    entries: Vec<(i64, RegistryEntry)>,
    max_batch_size: usize,
) -> Vec<SearchBatch> {
    let max = max_batch_size.max(1);
    let mut by_series: BTreeMap<i64, Vec<RegistryEntry>> = BTreeMap::new();
    for (series_id, entry) in entries {
        by_series.entry(series_id).or_default().push(entry);
    }

    let mut batches = Vec::new();
    for (series_id, group) in by_series {
        for chunk in group.chunks(max) {
            batches.push(SearchBatch {
                connection_id,
                series_id: Some(series_id),
                scope: SearchScope::EpisodeSearch,
                entries: chunk.to_vec(),
            });
        }
    }
    batches
}

/// Chunk movie entries directly; movies have no parent grouping.
pub fn chunk_movie_entries(
    connection_id: i64,
    entries: Vec<RegistryEntry>,
    max_batch_size: usize,
) -> Vec<SearchBatch> {
    let max = max_batch_size.max(1);
    entries
        .chunks(max)
        .map(|chunk| SearchBatch {
            connection_id,
            series_id: None,
            scope: SearchScope::EpisodeSearch,
            entries: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::library::ContentType;
    use crate::registry::{SearchKind, SearchState};

    use super::*;

    fn thresholds() -> BatchingThresholds {
        BatchingThresholds {
            min_missing_count: 3,
            min_missing_percent: 50.0,
            max_batch_size: 10,
        }
    }

    fn season(total: u32, downloaded: u32, airing: bool) -> SeasonStatus {
        SeasonStatus {
            series_id: 1,
            season_number: 2,
            total_episodes: total,
            downloaded_episodes: downloaded,
            next_airing: airing.then(|| Utc::now() + Duration::days(3)),
        }
    }

    fn entry(id: &str, content_id: i64) -> RegistryEntry {
        RegistryEntry {
            id: id.to_string(),
            connection_id: 1,
            content_type: ContentType::Episode,
            content_id,
            search_kind: SearchKind::Gap,
            title: format!("Item {}", content_id),
            state: SearchState::Pending,
            attempt_count: 0,
            last_searched: None,
            next_eligible: None,
            failure_category: None,
            season_pack_failed: false,
            priority: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_fully_aired_majority_missing_gets_season_search() {
        let status = season(10, 2, false);
        assert_eq!(
            decide_season_scope(&status, false, &thresholds()),
            SearchScope::SeasonSearch
        );
    }

    #[test]
    fn test_airing_season_falls_back_to_episodes() {
        let status = season(10, 2, true);
        assert_eq!(
            decide_season_scope(&status, false, &thresholds()),
            SearchScope::EpisodeSearch
        );
    }

    #[test]
    fn test_season_pack_failure_overrides_everything() {
        let status = season(10, 2, false);
        assert_eq!(
            decide_season_scope(&status, true, &thresholds()),
            SearchScope::EpisodeSearch
        );
    }

    #[test]
    fn test_nothing_missing_means_episode_scope() {
        let status = season(10, 10, false);
        assert_eq!(
            decide_season_scope(&status, false, &thresholds()),
            SearchScope::EpisodeSearch
        );
    }

    #[test]
    fn test_below_count_minimum_goes_per_episode() {
        // 2 of 4 missing: 50 percent meets the threshold, but the count does not.
        let status = season(4, 2, false);
        assert_eq!(
            decide_season_scope(&status, false, &thresholds()),
            SearchScope::EpisodeSearch
        );
    }

    #[test]
    fn test_below_percent_threshold_goes_per_episode() {
        // 4 of 20 missing: count meets the minimum, but only 20 percent.
        let status = season(20, 16, false);
        assert_eq!(
            decide_season_scope(&status, false, &thresholds()),
            SearchScope::EpisodeSearch
        );
    }

    #[test]
    fn test_episode_entries_group_by_series_then_chunk() {
        let mut entries = Vec::new();
        for content_id in 0..5 {
            entries.push((1, entry(&format!("a{}", content_id), content_id)));
        }
        for content_id in 10..12 {
            entries.push((2, entry(&format!("b{}", content_id), content_id)));
        }

        let batches = chunk_episode_entries(7, entries, 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].series_id, Some(1));
        assert_eq!(batches[0].entries.len(), 3);
        assert_eq!(batches[1].series_id, Some(1));
        assert_eq!(batches[1].entries.len(), 2);
        assert_eq!(batches[2].series_id, Some(2));
        assert_eq!(batches[2].entries.len(), 2);
        assert!(batches.iter().all(|b| b.connection_id == 7));
    }

    #[test]
    fn test_movie_entries_chunk_without_grouping() {
        let entries: Vec<RegistryEntry> = (0..7).map(|i| entry(&format!("m{}", i), i)).collect();
        let batches = chunk_movie_entries(7, entries, 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].entries.len(), 3);
        assert_eq!(batches[2].entries.len(), 1);
        assert!(batches.iter().all(|b| b.series_id.is_none()));
    }

    #[test]
    fn test_zero_batch_size_treated_as_one() {
        let entries = vec![entry("x", 1)];
        let batches = chunk_movie_entries(1, entries, 0);
        assert_eq!(batches.len(), 1);
    }
}
