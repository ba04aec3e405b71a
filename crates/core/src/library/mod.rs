//! Locally-mirrored view of remote media libraries.
//!
//! The mirror is the dispatch engine's source of candidates: every episode
//! and movie row carries the monitored/has-file/cutoff flags that decide
//! whether a gap or upgrade search is warranted.

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteLibraryStore;
pub use store::{LibraryError, LibraryStore};
pub use types::{
    Connection, ConnectionCategory, ContentType, Episode, EpisodeUpsert, Movie, MovieUpsert,
    NewConnection, SeasonStatus, Series, SeriesUpsert,
};
