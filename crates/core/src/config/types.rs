use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatch: DispatchIntervals,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub batching: BatchingThresholds,
    #[serde(default)]
    pub throttle: DefaultThrottle,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            dispatch: DispatchIntervals::default(),
            retry: RetryPolicy::default(),
            batching: BatchingThresholds::default(),
            throttle: DefaultThrottle::default(),
            sync: SyncConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("seekarr.db")
}

/// Intervals and timeouts for the periodic dispatch tasks.
///
/// Each interval drives one independent loop in the runner; a loop never
/// overlaps with itself because the next tick waits for the previous one.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchIntervals {
    /// Enable/disable the background runner entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often pending registry entries are promoted into the queue.
    #[serde(default = "default_enqueue_interval")]
    pub enqueue_interval_secs: u64,

    /// How often queued entries are dispatched to remote connections.
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_secs: u64,

    /// How often cooldown entries are re-checked for eligibility.
    #[serde(default = "default_cooldown_interval")]
    pub cooldown_sweep_interval_secs: u64,

    /// How often expired throttle windows and pauses are reset.
    #[serde(default = "default_throttle_interval")]
    pub throttle_sweep_interval_secs: u64,

    /// How often each connection is reconciled against the remote library.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// How often orphan cleanup and history pruning run.
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,

    /// Timeout for a single external search call.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Entries stuck in `searching` longer than this are forced to cooldown.
    #[serde(default = "default_stuck_timeout")]
    pub searching_stuck_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_enqueue_interval() -> u64 {
    60
}

fn default_dispatch_interval() -> u64 {
    15
}

fn default_cooldown_interval() -> u64 {
    60
}

fn default_throttle_interval() -> u64 {
    30
}

fn default_sync_interval() -> u64 {
    3600
}

fn default_maintenance_interval() -> u64 {
    3600
}

fn default_search_timeout() -> u64 {
    30
}

fn default_stuck_timeout() -> u64 {
    600
}

impl Default for DispatchIntervals {
    fn default() -> Self {
        Self {
            enabled: true,
            enqueue_interval_secs: default_enqueue_interval(),
            dispatch_interval_secs: default_dispatch_interval(),
            cooldown_sweep_interval_secs: default_cooldown_interval(),
            throttle_sweep_interval_secs: default_throttle_interval(),
            sync_interval_secs: default_sync_interval(),
            maintenance_interval_secs: default_maintenance_interval(),
            search_timeout_secs: default_search_timeout(),
            searching_stuck_timeout_secs: default_stuck_timeout(),
        }
    }
}

/// Retry and cooldown policy for the search state machine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicy {
    /// Maximum search attempts before an entry is exhausted.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base cooldown duration for the first failed attempt.
    #[serde(default = "default_cooldown_base")]
    pub cooldown_base_secs: u64,

    /// Upper bound on the cooldown duration regardless of attempt count.
    #[serde(default = "default_cooldown_cap")]
    pub cooldown_cap_secs: u64,

    /// Jitter applied to each cooldown, as a fraction of the duration.
    #[serde(default = "default_jitter")]
    pub jitter_fraction: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_cooldown_base() -> u64 {
    300
}

fn default_cooldown_cap() -> u64 {
    43_200
}

fn default_jitter() -> f64 {
    0.25
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            cooldown_base_secs: default_cooldown_base(),
            cooldown_cap_secs: default_cooldown_cap(),
            jitter_fraction: default_jitter(),
        }
    }
}

/// Thresholds for the season-pack batching decision.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchingThresholds {
    /// Minimum missing episodes in a season to justify a season search.
    #[serde(default = "default_min_missing_count")]
    pub min_missing_count: u32,

    /// Minimum percentage of the season missing to justify a season search.
    #[serde(default = "default_min_missing_percent")]
    pub min_missing_percent: f64,

    /// Maximum content items per search request batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_min_missing_count() -> u32 {
    3
}

fn default_min_missing_percent() -> f64 {
    50.0
}

fn default_max_batch_size() -> usize {
    10
}

impl Default for BatchingThresholds {
    fn default() -> Self {
        Self {
            min_missing_count: default_min_missing_count(),
            min_missing_percent: default_min_missing_percent(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Default throttle profile, used by connections without an assigned one.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefaultThrottle {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Optional hard cap on searches per UTC day.
    #[serde(default)]
    pub daily_budget: Option<u32>,

    /// How long to pause a connection after a 429 without Retry-After.
    #[serde(default = "default_rate_limit_pause")]
    pub rate_limit_pause_secs: u64,
}

fn default_requests_per_minute() -> u32 {
    5
}

fn default_rate_limit_pause() -> u64 {
    900
}

impl Default for DefaultThrottle {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            daily_budget: None,
            rate_limit_pause_secs: default_rate_limit_pause(),
        }
    }
}

/// Remote listing sync configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Page size used when walking the remote listing.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    1000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Retention windows for maintenance pruning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Days to keep search history rows.
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// Days to keep exhausted registry entries before pruning.
    #[serde(default = "default_exhausted_days")]
    pub exhausted_days: u32,
}

fn default_history_days() -> u32 {
    30
}

fn default_exhausted_days() -> u32 {
    7
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            history_days: default_history_days(),
            exhausted_days: default_exhausted_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.dispatch.enabled);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.batching.min_missing_count, 3);
        assert_eq!(config.throttle.requests_per_minute, 5);
        assert!(config.throttle.daily_budget.is_none());
        assert_eq!(config.sync.page_size, 1000);
        assert_eq!(config.database.path, PathBuf::from("seekarr.db"));
    }

    #[test]
    fn test_deserialize_partial_override() {
        let toml = r#"
[retry]
max_attempts = 3
cooldown_base_secs = 60

[throttle]
requests_per_minute = 10
daily_budget = 200
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.cooldown_base_secs, 60);
        assert_eq!(config.retry.cooldown_cap_secs, 43_200);
        assert_eq!(config.throttle.requests_per_minute, 10);
        assert_eq!(config.throttle.daily_budget, Some(200));
    }

    #[test]
    fn test_deserialize_dispatch_intervals() {
        let toml = r#"
[dispatch]
enabled = false
dispatch_interval_secs = 5
search_timeout_secs = 10
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.dispatch.enabled);
        assert_eq!(config.dispatch.dispatch_interval_secs, 5);
        assert_eq!(config.dispatch.search_timeout_secs, 10);
        assert_eq!(config.dispatch.enqueue_interval_secs, 60);
    }
}
