//! Dispatch admission control.
//!
//! The enforcer answers one question: may this connection send a search
//! request right now? It layers three checks in order: an explicit pause, the
//! per-minute window, and the daily budget. Window expiry is evaluated lazily
//! on the read path; counters are only physically zeroed by the sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::DefaultThrottle;
use crate::library::Connection;

use super::store::{ThrottleError, ThrottleStore};
use super::types::{
    next_utc_midnight, DenyReason, DispatchDecision, PauseReason, ThrottleLimits,
};

pub struct ThrottleEnforcer {
    store: Arc<dyn ThrottleStore>,
    defaults: DefaultThrottle,
}

impl ThrottleEnforcer {
    pub fn new(store: Arc<dyn ThrottleStore>, defaults: DefaultThrottle) -> Self {
        Self { store, defaults }
    }

    /// Resolve the limits in force for a connection: its profile if it has
    /// one (and the profile still exists), configuration defaults otherwise.
    pub fn limits_for(&self, connection: &Connection) -> Result<ThrottleLimits, ThrottleError> {
        if let Some(profile_id) = connection.throttle_profile_id {
            if let Some(profile) = self.store.get_profile(profile_id)? {
                return Ok(ThrottleLimits::from_profile(&profile));
            }
            warn!(
                connection_id = connection.id,
                profile_id, "throttle profile missing, falling back to defaults"
            );
        }
        Ok(ThrottleLimits::from_defaults(&self.defaults))
    }

    /// Check whether a dispatch is admissible right now. Never consumes
    /// capacity; the dispatcher calls [`Self::record_dispatch`] only after a
    /// request actually goes out.
    pub fn can_dispatch(
        &self,
        connection: &Connection,
        now: DateTime<Utc>,
    ) -> Result<DispatchDecision, ThrottleError> {
        let limits = self.limits_for(connection)?;
        let state = self.store.ensure_state(connection.id, now)?;

        if let Some(paused_until) = state.paused_until {
            if paused_until > now {
                let reason = DenyReason::from_pause(state.pause_reason);
                debug!(
                    connection_id = connection.id,
                    until = %paused_until,
                    reason = reason.as_str(),
                    "dispatch denied: paused"
                );
                return Ok(DispatchDecision::Denied {
                    reason,
                    retry_at: paused_until,
                });
            }
        }

        if state.effective_minute_count(now) >= limits.requests_per_minute {
            let retry_at = state.minute_window_start + Duration::seconds(60);
            debug!(
                connection_id = connection.id,
                count = state.minute_count,
                limit = limits.requests_per_minute,
                "dispatch denied: minute window full"
            );
            return Ok(DispatchDecision::Denied {
                reason: DenyReason::RateLimited,
                retry_at,
            });
        }

        if let Some(budget) = limits.daily_budget {
            if state.effective_day_count(now) >= budget {
                let midnight = next_utc_midnight(now);
                // Persist the pause so the budget outage survives restarts.
                self.store.set_paused_until(
                    connection.id,
                    midnight,
                    PauseReason::DailyBudgetExhausted,
                )?;
                info!(
                    connection_id = connection.id,
                    budget, "daily budget exhausted, pausing until UTC midnight"
                );
                return Ok(DispatchDecision::Denied {
                    reason: DenyReason::DailyBudgetExhausted,
                    retry_at: midnight,
                });
            }
        }

        Ok(DispatchDecision::Allowed)
    }

    /// Count a dispatched request against the connection's windows.
    pub fn record_dispatch(
        &self,
        connection_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), ThrottleError> {
        self.store.record_request(connection_id, now)?;
        Ok(())
    }

    /// React to a 429 from the remote: pause the connection for the
    /// server-provided Retry-After when present, the configured pause
    /// otherwise.
    pub fn handle_rate_limit_response(
        &self,
        connection: &Connection,
        retry_after_secs: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ThrottleError> {
        let limits = self.limits_for(connection)?;
        let pause_secs = retry_after_secs.unwrap_or(limits.rate_limit_pause_secs);
        let until = now + Duration::seconds(pause_secs as i64);
        self.store
            .set_paused_until(connection.id, until, PauseReason::RateLimit)?;
        warn!(
            connection_id = connection.id,
            pause_secs, "remote rate limit hit, pausing connection"
        );
        Ok(until)
    }

    /// Periodic sweep: physically zero lapsed windows and clear expired
    /// pauses.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<u32, ThrottleError> {
        self.store.reset_expired_windows(now)
    }
}
