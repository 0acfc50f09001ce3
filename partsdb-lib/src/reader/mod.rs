//! Streaming decode of stored table blobs.
//!
//! [`TableReader`] decompresses a blob from the [`BlobStore`] line by line. After running
//! for one time slice it yields through its [`Scheduler`] and then polls the caller's
//! [`Cancellation`]. The per-line callback may also stop the read by returning
//! [`LineControl::Abort`].
//!
//! Fully decoded tables are cached per store generation. Replacing blobs in the store
//! bumps the generation, and the next access repopulates the cache.

mod cancel;
mod scheduler;

pub use cancel::{CancelFlag, Cancellation, NeverCancel};
pub use scheduler::{Scheduler, TimeSlice, TokioScheduler};

use crate::store::BlobStore;
use crate::tables::{Codec, TableName};
use crate::{HashMap, Result};
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use std::io::{BufRead, BufReader, Read};
use std::sync::{Arc, Mutex};

/// Log target for the reader
const LOG_TARGET: &str = "    reader";

/// Default time a decode loop may run before yielding.
pub const DEFAULT_TIME_SLICE: Duration = Duration::from_millis(300);

/// What the reader should do after a line callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineControl {
    Continue,
    Abort,
}

/// How a streaming read ended, with the number of lines delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Completed(usize),
    Aborted(usize),
    Cancelled(usize),
}

#[derive(Debug, Default)]
struct LineCache {
    generation: u64,
    tables: HashMap<TableName, Arc<[String]>>,
}

/// Cooperative, cancellable reader over the blobs of a [`BlobStore`].
pub struct TableReader {
    store: Arc<dyn BlobStore>,
    scheduler: Arc<dyn Scheduler>,
    time_slice: Duration,
    cache: Mutex<LineCache>,
}

impl core::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TableReader")
            .field("store", &"<store>")
            .field("scheduler", &"<scheduler>")
            .field("time_slice", &self.time_slice)
            .field("cache", &self.cache)
            .finish()
    }
}

impl TableReader {
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, scheduler: Arc<dyn Scheduler>, time_slice: Duration) -> Self {
        Self {
            store,
            scheduler,
            time_slice,
            cache: Mutex::new(LineCache::default()),
        }
    }

    /// Reader yielding to tokio every [`DEFAULT_TIME_SLICE`].
    #[must_use]
    pub fn with_defaults(store: Arc<dyn BlobStore>) -> Self {
        Self::new(store, Arc::new(TokioScheduler), DEFAULT_TIME_SLICE)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Whether the store holds a blob for `table`.
    pub fn has_table(&self, table: TableName) -> Result<bool> {
        Ok(self.store.blob(table)?.is_some())
    }

    /// Stream the lines of `table` into `on_line`, which receives the line number and text.
    ///
    /// Line 0 of tables with a schema header is delivered like any other line.
    pub async fn for_each_line<F>(&self, table: TableName, cancel: &dyn Cancellation, mut on_line: F) -> Result<ReadOutcome>
    where
        F: FnMut(usize, &str) -> Result<LineControl>,
    {
        let blob = self
            .store
            .blob(table)?
            .ok_or_else(|| app_err!("table '{table}' is not in the local store"))?;

        self.stream(table, &blob, cancel, &mut on_line).await
    }

    async fn stream(
        &self,
        table: TableName,
        blob: &[u8],
        cancel: &dyn Cancellation,
        on_line: &mut dyn FnMut(usize, &str) -> Result<LineControl>,
    ) -> Result<ReadOutcome> {
        let codec = Codec::detect(blob).into_app_err_with(|| format!("unable to decode table '{table}'"))?;
        let mut lines = BufReader::new(codec.decoder(blob)?);
        let mut slice = TimeSlice::new(self.time_slice);
        let mut buf = String::new();
        let mut count = 0;

        if cancel.is_cancelled() {
            return Ok(ReadOutcome::Cancelled(0));
        }

        loop {
            if slice.expired() {
                self.scheduler.yield_now().await;
                if cancel.is_cancelled() {
                    log::debug!(target: LOG_TARGET, "Read of '{table}' cancelled after {count} lines");
                    return Ok(ReadOutcome::Cancelled(count));
                }
                slice.restart();
            }

            buf.clear();
            let read = next_line(&mut lines, &mut buf).into_app_err_with(|| format!("unable to decode table '{table}'"))?;
            if read == 0 {
                return Ok(ReadOutcome::Completed(count));
            }

            let line = buf.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }

            let control = on_line(count, line)?;
            count += 1;
            if control == LineControl::Abort {
                log::debug!(target: LOG_TARGET, "Read of '{table}' aborted by callback after {count} lines");
                return Ok(ReadOutcome::Aborted(count));
            }
        }
    }

    /// All lines of `table`, decoded once per store generation.
    ///
    /// Returns `None` when the read was cancelled; a cancelled or failed read leaves the
    /// cache untouched.
    pub async fn lines(&self, table: TableName, cancel: &dyn Cancellation) -> Result<Option<Arc<[String]>>> {
        let generation = self.store.generation();
        {
            let mut cache = self.cache.lock().expect("lock poisoned");
            if cache.generation != generation {
                log::debug!(
                    target: LOG_TARGET,
                    "Store generation moved from {} to {generation}, dropping cached tables",
                    cache.generation
                );
                cache.tables.clear();
                cache.generation = generation;
            }
            if let Some(lines) = cache.tables.get(&table) {
                return Ok(Some(Arc::clone(lines)));
            }
        }

        let mut collected = Vec::new();
        let outcome = self
            .for_each_line(table, cancel, |_, line| {
                collected.push(line.to_string());
                Ok(LineControl::Continue)
            })
            .await?;

        if !matches!(outcome, ReadOutcome::Completed(_)) {
            return Ok(None);
        }

        let lines: Arc<[String]> = collected.into();
        let mut cache = self.cache.lock().expect("lock poisoned");
        if cache.generation == generation {
            log::debug!(target: LOG_TARGET, "Cached {} lines of '{table}'", lines.len());
            let _ = cache.tables.insert(table, Arc::clone(&lines));
        }
        Ok(Some(lines))
    }

    /// Drop every cached table.
    pub fn invalidate(&self) {
        let mut cache = self.cache.lock().expect("lock poisoned");
        cache.tables.clear();
        log::debug!(target: LOG_TARGET, "Table cache invalidated");
    }

    #[must_use]
    pub fn is_cached(&self, table: TableName) -> bool {
        let cache = self.cache.lock().expect("lock poisoned");
        cache.generation == self.store.generation() && cache.tables.contains_key(&table)
    }
}

fn next_line(reader: &mut impl BufRead, buf: &mut String) -> std::io::Result<usize> {
    reader.read_line(buf)
}

/// Decode every non-empty line of a blob synchronously.
pub fn read_all_lines(blob: &[u8]) -> Result<Vec<String>> {
    let codec = Codec::detect(blob)?;
    let mut text = String::new();
    let _ = codec
        .decoder(blob)?
        .read_to_string(&mut text)
        .into_app_err("unable to decode table blob")?;
    Ok(text.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
}
