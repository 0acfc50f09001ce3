use super::{CategorySelection, Query, VersionedState};
use crate::model::Catalog;
use crate::reader::{Cancellation, DEFAULT_TIME_SLICE, Scheduler, TimeSlice, TokioScheduler};
use core::fmt::{Debug, Formatter};
use core::time::Duration;
use std::sync::Arc;

/// Log target for queries
const LOG_TARGET: &str = "     query";

/// Components examined between two checks of the cancellation predicate.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Shortest text accepted for a search across all categories.
pub const DEFAULT_MIN_QUERY_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Positions of the matching components in [`Catalog::components`], in catalog order.
    Matches(Vec<usize>),

    /// The query spans all categories but its text is shorter than `min`.
    QueryTooShort { min: usize },

    Cancelled,
}

impl SearchOutcome {
    #[must_use]
    pub fn matches(&self) -> &[usize] {
        match self {
            Self::Matches(indices) => indices,
            _ => &[],
        }
    }
}

/// Runs [`Query`] values against a catalog and keeps the latest result.
pub struct QueryEngine {
    scheduler: Arc<dyn Scheduler>,
    time_slice: Duration,
    chunk_size: usize,
    min_query_len: usize,
    results: VersionedState<SearchOutcome>,
}

impl Debug for QueryEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("time_slice", &self.time_slice)
            .field("chunk_size", &self.chunk_size)
            .field("min_query_len", &self.min_query_len)
            .finish_non_exhaustive()
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(Arc::new(TokioScheduler), DEFAULT_TIME_SLICE, DEFAULT_CHUNK_SIZE, DEFAULT_MIN_QUERY_LEN)
    }
}

impl QueryEngine {
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>, time_slice: Duration, chunk_size: usize, min_query_len: usize) -> Self {
        Self {
            scheduler,
            time_slice,
            chunk_size: chunk_size.max(1),
            min_query_len,
            results: VersionedState::new(),
        }
    }

    /// The result of the most recent [`submit`](Self::submit) that was not superseded.
    #[must_use]
    pub const fn results(&self) -> &VersionedState<SearchOutcome> {
        &self.results
    }

    /// Run `query` under a fresh version and apply its outcome if no newer request was
    /// submitted meanwhile. Returns whether the outcome was applied.
    pub async fn submit(&self, catalog: &Catalog, query: &Query, cancel: &dyn Cancellation) -> bool {
        let version = self.results.begin();
        let outcome = self.search(catalog, query, cancel).await;

        let applied = self.results.apply(version, outcome);
        if !applied {
            log::debug!(target: LOG_TARGET, "Discarding stale result of search #{version}");
        }
        applied
    }

    /// Evaluate `query` over `catalog`.
    ///
    /// The scan proceeds in chunks. Between chunks the cancellation predicate is checked,
    /// and control is yielded to the scheduler once the time slice is used up.
    pub async fn search(&self, catalog: &Catalog, query: &Query, cancel: &dyn Cancellation) -> SearchOutcome {
        if query.categories == CategorySelection::All && query.text_len() < self.min_query_len {
            return SearchOutcome::QueryTooShort { min: self.min_query_len };
        }

        let matcher = query.matcher();
        let mut slice = TimeSlice::new(self.time_slice);
        let mut matches = Vec::new();
        let mut start = 0;

        while start < catalog.len() {
            if cancel.is_cancelled() {
                log::debug!(target: LOG_TARGET, "Search cancelled after {start} components");
                return SearchOutcome::Cancelled;
            }

            let end = (start + self.chunk_size).min(catalog.len());
            matches.extend((start..end).filter(|&i| matcher.matches(catalog, i)));
            start = end;

            if slice.expired() {
                self.scheduler.yield_now().await;
                slice.restart();
            }
        }

        if cancel.is_cancelled() {
            return SearchOutcome::Cancelled;
        }

        log::debug!(target: LOG_TARGET, "Search matched {} of {} components", matches.len(), catalog.len());
        SearchOutcome::Matches(matches)
    }
}
