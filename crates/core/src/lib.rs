pub mod config;
pub mod dispatcher;
pub mod history;
pub mod library;
pub mod metrics;
pub mod planner;
pub mod reconciler;
pub mod registry;
pub mod remote;
pub mod testing;
pub mod throttle;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use dispatcher::{DispatchError, DispatchRunner, DispatchService, DispatchStatus};
pub use history::{
    create_history_system, HistoryHandle, HistoryRecord, HistoryStore, HistoryWriter, SearchEvent,
    SqliteHistoryStore,
};
pub use library::{
    Connection, ConnectionCategory, ContentType, LibraryError, LibraryStore, NewConnection,
    SqliteLibraryStore,
};
pub use reconciler::{Maintenance, SyncReconciler, SyncReport};
pub use registry::{
    RegistryEntry, RegistryError, RegistryFilter, RegistryStore, SearchKind, SearchState,
    SqliteRegistryStore,
};
pub use remote::{ArrHttpClient, RemoteError, RemoteLibraryClient};
pub use throttle::{SqliteThrottleStore, ThrottleEnforcer, ThrottleError, ThrottleStore};
