//! Queue dispatch: promotion, throttled submission and outcome settlement.

mod runner;
mod service;
mod types;

pub use runner::DispatchRunner;
pub use service::DispatchService;
pub use types::{DispatchError, DispatchStatus};
