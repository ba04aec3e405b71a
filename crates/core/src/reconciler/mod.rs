//! Keeping the mirror, the registry and the remote in agreement.

mod maintenance;
mod sync;

pub use maintenance::{Maintenance, MaintenanceReport};
pub use sync::{SyncError, SyncReconciler, SyncReport};
