//! Test doubles shared by unit and integration tests.

mod mock_remote;

pub use mock_remote::{MockRemote, RecordedSearch};
