use super::{BlobStore, LAST_UPDATE};
use crate::Result;
use crate::encoder::TableBlobs;
use fs4::fs_std::FileExt;
use ohno::IntoAppError;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

/// Log target for `store`
const LOG_TARGET: &str = "     store";

/// Name of the lock file inside a store directory.
const LOCK_FILE: &str = "store.lock";

/// Held while a process publishes a blob generation or rewrites the settings.
///
/// Other processes sharing the data directory wait for it; readers never take it.
#[derive(Debug)]
pub struct WriterLock(File);

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.0) {
            log::warn!(target: LOG_TARGET, "Could not release the store writer lock: {e:#}");
        }
    }
}

/// Take the writer lock of `store_dir`, waiting while another process holds it.
///
/// This blocks the calling thread. Async code reaches it through [`commit_blobs`].
pub fn lock_writer(store_dir: &Path) -> Result<WriterLock> {
    let lock_path = store_dir.join(LOCK_FILE);

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .into_app_err_with(|| format!("unable to open the writer lock '{}'", lock_path.display()))?;

    file.lock_exclusive()
        .into_app_err_with(|| format!("unable to take the writer lock '{}'", lock_path.display()))?;
    log::debug!(target: LOG_TARGET, "Took the writer lock '{}'", lock_path.display());

    Ok(WriterLock(file))
}

/// Publish freshly downloaded blobs and record `last_update`, off the async runtime.
///
/// Store writes are file I/O that may wait on another process's writer lock, so they run
/// on the blocking pool and the calling task stays suspended meanwhile.
pub async fn commit_blobs(store: Arc<dyn BlobStore>, blobs: TableBlobs, last_update: String) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        store.replace_blobs(blobs)?;
        store.set_setting(LAST_UPDATE, &last_update)
    })
    .await
    .into_app_err("store commit task panicked")?
}
