//! Filtering and full-text search over a decoded [`Catalog`](crate::model::Catalog).
//!
//! Searches run in chunks and yield to the [`Scheduler`](crate::reader::Scheduler) when
//! their time slice expires, honouring the same cancellation predicate as the table
//! reader. Every submitted search is stamped with a version from [`QueryVersions`];
//! only the result of the most recent request is ever applied.

mod engine;
mod filter;
mod version;

pub use engine::{DEFAULT_CHUNK_SIZE, DEFAULT_MIN_QUERY_LEN, QueryEngine, SearchOutcome};
pub use filter::{AttributeFilter, CategorySelection, Query};
pub use version::{QueryVersions, VersionedState};
