//! Clients for the remote *arr-style library APIs.

mod arr_http;
mod client;
mod types;

pub use arr_http::ArrHttpClient;
pub use client::{RemoteError, RemoteLibraryClient};
pub use types::{ContentPage, RemoteEpisode, RemoteItem, RemoteMovie, SearchRequest};
