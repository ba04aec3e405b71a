//! Property tests for the pure policy functions and the queue ordering
//! guarantees of the registry store.

use chrono::{Duration, Utc};
use proptest::prelude::*;

use seekarr_core::config::{BatchingThresholds, RetryPolicy};
use seekarr_core::library::{ContentType, SeasonStatus};
use seekarr_core::planner::{compute_priority, decide_season_scope, PriorityInput, SearchScope};
use seekarr_core::registry::{backoff, NewRegistryEntry, SearchKind, SqliteRegistryStore};
use seekarr_core::{LibraryStore, RegistryStore};

fn search_kind() -> impl Strategy<Value = SearchKind> {
    prop_oneof![Just(SearchKind::Gap), Just(SearchKind::Upgrade)]
}

proptest! {
    /// Priorities always land in [5, 200]: the base is clamped to [5, 100]
    /// and a manual boost adds at most 100 on top.
    #[test]
    fn priority_is_bounded(
        age_days in 0i64..10_000,
        attempt_count in 0u32..50,
        kind in search_kind(),
        boost in proptest::option::of(0u32..=100),
    ) {
        let priority = compute_priority(&PriorityInput {
            age_days,
            attempt_count,
            search_kind: kind,
            manual_boost: boost,
        });
        prop_assert!(priority >= 5);
        prop_assert!(priority <= 200);
    }

    /// More attempts never raise the base priority.
    #[test]
    fn priority_decreases_with_attempts(
        age_days in 0i64..1_000,
        attempts in 0u32..20,
        kind in search_kind(),
    ) {
        let base = |a: u32| compute_priority(&PriorityInput {
            age_days,
            attempt_count: a,
            search_kind: kind,
            manual_boost: None,
        });
        prop_assert!(base(attempts + 1) <= base(attempts));
    }

    /// Cooldowns never exceed the cap, jitter included.
    #[test]
    fn cooldown_respects_cap(
        attempt in 1u32..64,
        base in 1u64..100_000,
        cap in 1u64..1_000_000,
        jitter in 0.0f64..0.5,
    ) {
        let policy = RetryPolicy {
            max_attempts: 10,
            cooldown_base_secs: base,
            cooldown_cap_secs: cap,
            jitter_fraction: jitter,
        };
        let duration = backoff::cooldown_duration(attempt, &policy);
        prop_assert!(duration.num_seconds() >= 0);
        prop_assert!(duration.num_seconds() as u64 <= cap);
    }

    /// A season with upcoming episodes is never widened to a pack search.
    #[test]
    fn upcoming_airings_force_episode_scope(
        total in 1u32..30,
        downloaded in 0u32..30,
        pack_failed in any::<bool>(),
    ) {
        let status = SeasonStatus {
            series_id: 1,
            season_number: 1,
            total_episodes: total,
            downloaded_episodes: downloaded.min(total),
            next_airing: Some(Utc::now() + Duration::days(3)),
        };
        let scope = decide_season_scope(&status, pack_failed, &BatchingThresholds::default());
        prop_assert_eq!(scope, SearchScope::EpisodeSearch);
    }

    /// A failed season pack always forces episode scope, whatever the
    /// season looks like.
    #[test]
    fn season_pack_failure_forces_episode_scope(
        total in 1u32..30,
        downloaded in 0u32..30,
    ) {
        let status = SeasonStatus {
            series_id: 1,
            season_number: 1,
            total_episodes: total,
            downloaded_episodes: downloaded.min(total),
            next_airing: None,
        };
        let scope = decide_season_scope(&status, true, &BatchingThresholds::default());
        prop_assert_eq!(scope, SearchScope::EpisodeSearch);
    }

    /// Dequeue drains in strictly non-increasing priority order, whatever
    /// priorities the entries were enqueued with.
    #[test]
    fn dequeue_priority_is_non_increasing(priorities in prop::collection::vec(0u32..=200, 1..30)) {
        let store = SqliteRegistryStore::in_memory().unwrap();
        let now = Utc::now();

        for (i, priority) in priorities.iter().enumerate() {
            let entry = store
                .upsert_entry(NewRegistryEntry {
                    connection_id: 1,
                    content_type: ContentType::Movie,
                    content_id: i as i64,
                    search_kind: SearchKind::Gap,
                    title: format!("Movie {i}"),
                })
                .unwrap();
            store.enqueue(&entry.id, *priority, now).unwrap();
        }

        let drained = store.dequeue(1, priorities.len()).unwrap();
        prop_assert_eq!(drained.len(), priorities.len());
        for pair in drained.windows(2) {
            prop_assert!(pair[0].priority >= pair[1].priority);
        }
    }

    /// After any sequence of reconciliation passes, every registry entry
    /// still points at a live mirror row.
    #[test]
    fn reconciliation_never_leaves_orphans(
        listings in prop::collection::vec(
            prop::collection::vec((1i64..8, any::<bool>()), 0..6),
            1..4,
        ),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let library = std::sync::Arc::new(
                seekarr_core::SqliteLibraryStore::in_memory().unwrap(),
            );
            let registry = std::sync::Arc::new(SqliteRegistryStore::in_memory().unwrap());
            let history = std::sync::Arc::new(
                seekarr_core::SqliteHistoryStore::in_memory().unwrap(),
            );
            let remote = std::sync::Arc::new(seekarr_core::testing::MockRemote::new());
            let (handle, writer) = seekarr_core::create_history_system(history, 64);
            tokio::spawn(writer.run());

            let reconciler = seekarr_core::SyncReconciler::new(
                library.clone(),
                registry.clone(),
                remote.clone(),
                handle,
                2,
            );
            let conn = library
                .add_connection(seekarr_core::NewConnection {
                    name: "movies".to_string(),
                    category: seekarr_core::ConnectionCategory::MovieProvider,
                    base_url: "http://localhost:7878".to_string(),
                    api_key: "key".to_string(),
                    throttle_profile_id: None,
                })
                .unwrap();

            for listing in listings {
                let mut seen = std::collections::HashSet::new();
                let items: Vec<seekarr_core::remote::RemoteItem> = listing
                    .into_iter()
                    .filter(|(id, _)| seen.insert(*id))
                    .map(|(id, has_file)| {
                        seekarr_core::remote::RemoteItem::Movie(
                            seekarr_core::remote::RemoteMovie {
                                id,
                                title: format!("Movie {id}"),
                                monitored: true,
                                has_file,
                                quality_cutoff_not_met: false,
                                release_date: None,
                            },
                        )
                    })
                    .collect();
                remote.set_listing(conn.id, items).await;
                reconciler.sync_connection(&conn).await.unwrap();

                let entries = registry
                    .list_entries(
                        &seekarr_core::registry::RegistryFilter::new()
                            .with_connection(conn.id),
                    )
                    .unwrap();
                for entry in &entries {
                    assert!(library
                        .content_exists(conn.id, entry.content_type, entry.content_id)
                        .unwrap());
                }
            }
        });
    }

    /// Upserting the same candidate key any number of times yields exactly
    /// one registry entry.
    #[test]
    fn upsert_is_idempotent(repeats in 1usize..10, content_id in 0i64..100) {
        let store = SqliteRegistryStore::in_memory().unwrap();

        let mut first_id = None;
        for _ in 0..repeats {
            let entry = store
                .upsert_entry(NewRegistryEntry {
                    connection_id: 1,
                    content_type: ContentType::Episode,
                    content_id,
                    search_kind: SearchKind::Gap,
                    title: "Episode".to_string(),
                })
                .unwrap();
            let id = first_id.get_or_insert_with(|| entry.id.clone());
            prop_assert_eq!(&entry.id, id);
        }
    }
}
