//! HTTP access to the published catalogue.
//!
//! [`HttpClient`] wraps `reqwest` with retries and response checks, [`HttpSource`] serves
//! the sync reconciler from the per-category files, and [`Updater`] performs the
//! conditional download of the packaged tables into a [`BlobStore`](crate::store::BlobStore).

mod channel_reader;
mod http;
mod source;
mod update;

pub use http::HttpClient;
pub use source::HttpSource;
pub use update::{UpdateOutcome, Updater, unpack_archive};

/// Log target for transport
const LOG_TARGET: &str = " transport";
