//! Pure planning logic: queue priorities and search batching.

mod batching;
mod priority;
mod types;

pub use batching::{chunk_episode_entries, chunk_movie_entries, decide_season_scope};
pub use priority::compute_priority;
pub use types::{PriorityInput, SearchBatch, SearchScope};
