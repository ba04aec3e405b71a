//! Per-connection request throttling.
//!
//! Limits come from named profiles or configuration defaults. Counters live
//! in the database so a restart never forgets how much of a budget was spent.

mod enforcer;
mod sqlite;
mod store;
mod types;

pub use enforcer::ThrottleEnforcer;
pub use sqlite::SqliteThrottleStore;
pub use store::{ThrottleError, ThrottleStore};
pub use types::{
    day_key, next_utc_midnight, DenyReason, DispatchDecision, NewThrottleProfile, PauseReason,
    ThrottleLimits, ThrottleProfile, ThrottleState,
};
