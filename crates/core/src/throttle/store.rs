//! Throttle storage trait and error type.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{NewThrottleProfile, PauseReason, ThrottleProfile, ThrottleState};

/// Error type for throttle storage operations.
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("Throttle profile not found: {0}")]
    ProfileNotFound(i64),

    #[error("Database error: {0}")]
    Database(String),
}

/// Persistence for throttle profiles and per-connection counters.
pub trait ThrottleStore: Send + Sync {
    fn create_profile(&self, new: NewThrottleProfile) -> Result<ThrottleProfile, ThrottleError>;

    fn get_profile(&self, id: i64) -> Result<Option<ThrottleProfile>, ThrottleError>;

    fn list_profiles(&self) -> Result<Vec<ThrottleProfile>, ThrottleError>;

    /// Fetch the connection's counters, creating an empty row on first use.
    fn ensure_state(
        &self,
        connection_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ThrottleState, ThrottleError>;

    /// Count one dispatched request against both windows, rolling a window
    /// over when its period has lapsed. This is the only place counters
    /// increase; reads never mutate.
    fn record_request(
        &self,
        connection_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ThrottleState, ThrottleError>;

    /// Put the connection on pause until the given instant, recording why so
    /// later denials can report the cause.
    fn set_paused_until(
        &self,
        connection_id: i64,
        until: DateTime<Utc>,
        reason: PauseReason,
    ) -> Result<(), ThrottleError>;

    /// Physical counter reset: zero every window whose period has lapsed and
    /// clear expired pauses. Reads treat lapsed windows as empty already, so
    /// this sweep exists to keep the rows tidy, not for correctness.
    fn reset_expired_windows(&self, now: DateTime<Utc>) -> Result<u32, ThrottleError>;
}
