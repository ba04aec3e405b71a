//! Throttle profile and per-connection state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DefaultThrottle;

/// Named, reusable set of request limits. Connections without a profile fall
/// back to the configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleProfile {
    pub id: i64,
    pub name: String,
    pub requests_per_minute: u32,
    /// Hard cap on requests per UTC calendar day. `None` means unlimited.
    pub daily_budget: Option<u32>,
    /// Pause applied when the remote answers 429 without a Retry-After.
    pub rate_limit_pause_secs: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a throttle profile.
#[derive(Debug, Clone, Deserialize)]
pub struct NewThrottleProfile {
    pub name: String,
    pub requests_per_minute: u32,
    pub daily_budget: Option<u32>,
    pub rate_limit_pause_secs: u64,
}

/// The limits actually in force for a connection, whether they came from a
/// profile or from configuration defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleLimits {
    pub requests_per_minute: u32,
    pub daily_budget: Option<u32>,
    pub rate_limit_pause_secs: u64,
}

impl ThrottleLimits {
    pub fn from_profile(profile: &ThrottleProfile) -> Self {
        Self {
            requests_per_minute: profile.requests_per_minute,
            daily_budget: profile.daily_budget,
            rate_limit_pause_secs: profile.rate_limit_pause_secs,
        }
    }

    pub fn from_defaults(defaults: &DefaultThrottle) -> Self {
        Self {
            requests_per_minute: defaults.requests_per_minute,
            daily_budget: defaults.daily_budget,
            rate_limit_pause_secs: defaults.rate_limit_pause_secs,
        }
    }
}

/// Why a connection was put on pause. Stored with the pause so later
/// denials can report the original cause.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// The remote answered 429.
    RateLimit,
    /// The daily budget was spent.
    DailyBudgetExhausted,
}

impl PauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::RateLimit => "rate_limit",
            PauseReason::DailyBudgetExhausted => "daily_budget_exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rate_limit" => Some(PauseReason::RateLimit),
            "daily_budget_exhausted" => Some(PauseReason::DailyBudgetExhausted),
            _ => None,
        }
    }
}

/// Per-connection request counters. The minute window is a fixed 60-second
/// window anchored at the first request in it; the day window is the UTC
/// calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleState {
    pub connection_id: i64,
    pub minute_window_start: DateTime<Utc>,
    pub minute_count: u32,
    /// UTC calendar day the daily counter belongs to, as `YYYY-MM-DD`.
    pub day_window_key: String,
    pub day_count: u32,
    pub paused_until: Option<DateTime<Utc>>,
    pub pause_reason: Option<PauseReason>,
    pub updated_at: DateTime<Utc>,
}

impl ThrottleState {
    /// Requests counted against the minute window, treating an expired
    /// window as empty without mutating it.
    pub fn effective_minute_count(&self, now: DateTime<Utc>) -> u32 {
        if now - self.minute_window_start < chrono::Duration::seconds(60) {
            self.minute_count
        } else {
            0
        }
    }

    /// Requests counted against today's budget, treating a stale day key as
    /// empty without mutating it.
    pub fn effective_day_count(&self, now: DateTime<Utc>) -> u32 {
        if self.day_window_key == day_key(now) {
            self.day_count
        } else {
            0
        }
    }
}

/// The UTC calendar-day key for a timestamp.
pub fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Start of the next UTC calendar day after `now`.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + chrono::Duration::days(1);
    tomorrow
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now + chrono::Duration::days(1))
}

/// Why a dispatch was denied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Per-minute limit reached.
    RateLimited,
    /// Daily budget spent; the connection is paused until UTC midnight.
    DailyBudgetExhausted,
    /// Pause in force with no recorded cause.
    Paused,
}

impl DenyReason {
    /// Denial reason for a pause in force, carrying the cause recorded when
    /// the pause was written.
    pub fn from_pause(reason: Option<PauseReason>) -> Self {
        match reason {
            Some(PauseReason::RateLimit) => DenyReason::RateLimited,
            Some(PauseReason::DailyBudgetExhausted) => DenyReason::DailyBudgetExhausted,
            None => DenyReason::Paused,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::RateLimited => "rate_limit",
            DenyReason::DailyBudgetExhausted => "daily_budget_exhausted",
            DenyReason::Paused => "paused",
        }
    }
}

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    Allowed,
    Denied {
        reason: DenyReason,
        /// Earliest moment a retry could be admitted.
        retry_at: DateTime<Utc>,
    },
}

impl DispatchDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, DispatchDecision::Allowed)
    }
}
