use super::{BlobStore, lock_writer};
use crate::Result;
use crate::encoder::TableBlobs;
use crate::tables::{Codec, TableName};
use ohno::{IntoAppError, app_err};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;

/// Log target for `store`
const LOG_TARGET: &str = "     store";

const CURRENT_FILE: &str = "CURRENT";
const SETTINGS_FILE: &str = "settings.json";
const GENERATION_PREFIX: &str = "gen-";

/// File-backed blob store.
///
/// ```text
/// <root>/
///   CURRENT              name of the live generation directory
///   gen-00000003/        one file per table blob
///   settings.json
///   store.lock
/// ```
///
/// A replacement writes a complete new generation directory and then swaps `CURRENT`
/// with a rename, so readers observe either the old or the new set of blobs.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).into_app_err_with(|| format!("unable to create store directory '{}'", root.display()))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn current(&self) -> Result<Option<(u64, PathBuf)>> {
        let path = self.root.join(CURRENT_FILE);
        let name = match fs::read_to_string(&path) {
            Ok(name) => name.trim().to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).into_app_err_with(|| format!("unable to read '{}'", path.display())),
        };

        let generation = name
            .strip_prefix(GENERATION_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| app_err!("store pointer '{}' names an invalid generation '{name}'", path.display()))?;
        Ok(Some((generation, self.root.join(name))))
    }

    fn read_settings(&self) -> Result<BTreeMap<String, String>> {
        let path = self.root.join(SETTINGS_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).into_app_err_with(|| format!("unable to parse '{}'", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).into_app_err_with(|| format!("unable to read '{}'", path.display())),
        }
    }

    /// Remove generations older than the one `live` replaced, plus leftover staging dirs.
    ///
    /// A reader may have resolved `CURRENT` to the previous generation just before the
    /// swap, so that one survives until the next replacement.
    fn remove_stale_generations(&self, live: u64) {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(suffix) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(GENERATION_PREFIX))
            else {
                continue;
            };

            let stale = suffix.parse::<u64>().ok().is_none_or(|g| g.saturating_add(1) < live);
            if stale && let Err(e) = fs::remove_dir_all(&path) {
                log::debug!(target: LOG_TARGET, "unable to remove stale generation '{}', continuing anyway: {e}", path.display());
            }
        }
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).into_app_err_with(|| format!("unable to write '{}'", tmp.display()))?;
    fs::rename(&tmp, path).into_app_err_with(|| format!("unable to replace '{}'", path.display()))
}

impl BlobStore for DirStore {
    fn blob(&self, table: TableName) -> Result<Option<Vec<u8>>> {
        let Some((_, dir)) = self.current()? else {
            return Ok(None);
        };

        for codec in Codec::iter() {
            let path = dir.join(table.file_name(codec));
            match fs::read(&path) {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).into_app_err_with(|| format!("unable to read '{}'", path.display())),
            }
        }

        Ok(None)
    }

    fn replace_blobs(&self, blobs: TableBlobs) -> Result<()> {
        let _lock = lock_writer(&self.root)?;

        let current = self.current()?;
        let generation = current.as_ref().map_or(0, |(g, _)| *g) + 1;
        let name = format!("{GENERATION_PREFIX}{generation:08}");
        let staging = self.root.join(format!("{name}.staging"));
        let target = self.root.join(&name);

        if staging.exists() {
            fs::remove_dir_all(&staging).into_app_err_with(|| format!("unable to clear '{}'", staging.display()))?;
        }
        fs::create_dir_all(&staging).into_app_err_with(|| format!("unable to create '{}'", staging.display()))?;

        // carry over blobs that are not being replaced
        if let Some((_, dir)) = &current {
            for table in TableName::ALL.iter().filter(|t| !blobs.contains_key(t)) {
                for codec in Codec::iter() {
                    let from = dir.join(table.file_name(codec));
                    if from.exists() {
                        let _ = fs::copy(&from, staging.join(table.file_name(codec)))
                            .into_app_err_with(|| format!("unable to copy '{}'", from.display()))?;
                    }
                }
            }
        }

        for (table, blob) in &blobs {
            let codec = Codec::detect(blob)?;
            let path = staging.join(table.file_name(codec));
            fs::write(&path, blob).into_app_err_with(|| format!("unable to write '{}'", path.display()))?;
        }

        fs::rename(&staging, &target).into_app_err_with(|| format!("unable to publish '{}'", target.display()))?;
        write_atomically(&self.root.join(CURRENT_FILE), name.as_bytes())?;
        log::debug!(target: LOG_TARGET, "Published blob generation {generation} in '{}'", target.display());

        self.remove_stale_generations(generation);
        Ok(())
    }

    fn generation(&self) -> u64 {
        match self.current() {
            Ok(current) => current.map_or(0, |(g, _)| g),
            Err(e) => {
                log::debug!(target: LOG_TARGET, "unable to read store generation: {e:#}");
                0
            }
        }
    }

    fn setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_settings()?.remove(key))
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let _lock = lock_writer(&self.root)?;
        let mut settings = self.read_settings()?;
        let _ = settings.insert(key.to_string(), value.to_string());
        let bytes = serde_json::to_vec_pretty(&settings).into_app_err("unable to serialize settings")?;
        write_atomically(&self.root.join(SETTINGS_FILE), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LAST_UPDATE;

    fn gzip_blob(text: &str) -> Vec<u8> {
        use std::io::Write;
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn all_tables(tag: &str) -> TableBlobs {
        TableName::ALL.iter().map(|t| (*t, gzip_blob(&format!("{t} {tag}")))).collect()
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        assert_eq!(store.generation(), 0);
        assert!(store.blob(TableName::Components).unwrap().is_none());
        assert!(store.setting(LAST_UPDATE).unwrap().is_none());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_replace_publishes_new_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();

        let first = all_tables("v1");
        store.replace_blobs(first.clone()).unwrap();
        assert_eq!(store.generation(), 1);
        assert_eq!(store.blob(TableName::Components).unwrap().as_ref(), first.get(&TableName::Components));

        let second = all_tables("v2");
        store.replace_blobs(second.clone()).unwrap();
        assert_eq!(store.generation(), 2);
        assert_eq!(store.blob(TableName::AttributesLut).unwrap().as_ref(), second.get(&TableName::AttributesLut));

        // the generation a reader may still be using survives one replacement
        assert!(dir.path().join("gen-00000001").exists());
        assert!(dir.path().join("gen-00000002").exists());

        store.replace_blobs(all_tables("v3")).unwrap();
        assert!(!dir.path().join("gen-00000001").exists());
        assert!(dir.path().join("gen-00000002").exists());
        assert!(dir.path().join("gen-00000003").exists());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_previous_generation_stays_readable_after_swap() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        let first = all_tables("v1");
        store.replace_blobs(first.clone()).unwrap();

        // a reader resolves CURRENT, then a writer publishes before the reader opens files
        let (_, resolved) = store.current().unwrap().unwrap();
        store.replace_blobs(all_tables("v2")).unwrap();

        let path = resolved.join(TableName::Components.file_name(Codec::Gzip));
        assert_eq!(Some(&fs::read(path).unwrap()), first.get(&TableName::Components));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_leftover_staging_dir_is_swept() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("gen-00000009.staging")).unwrap();

        store.replace_blobs(all_tables("v1")).unwrap();
        assert!(!dir.path().join("gen-00000009.staging").exists());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_partial_replace_keeps_other_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        let first = all_tables("v1");
        store.replace_blobs(first.clone()).unwrap();

        let mut update = TableBlobs::new();
        let _ = update.insert(TableName::Components, gzip_blob("components v2"));
        store.replace_blobs(update.clone()).unwrap();

        assert_eq!(store.blob(TableName::Components).unwrap().as_ref(), update.get(&TableName::Components));
        assert_eq!(store.blob(TableName::Subcategories).unwrap().as_ref(), first.get(&TableName::Subcategories));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_rejected_blob_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        let first = all_tables("v1");
        store.replace_blobs(first.clone()).unwrap();

        let mut bad = all_tables("v2");
        let _ = bad.insert(TableName::Subcategories, b"not compressed".to_vec());
        let _ = store.replace_blobs(bad).unwrap_err();

        assert_eq!(store.generation(), 1);
        assert_eq!(store.blob(TableName::Components).unwrap().as_ref(), first.get(&TableName::Components));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_settings_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        DirStore::open(dir.path()).unwrap().set_setting(LAST_UPDATE, "Tue, 01 Oct 2024 10:00:00 GMT").unwrap();

        let reopened = DirStore::open(dir.path()).unwrap();
        assert_eq!(reopened.setting(LAST_UPDATE).unwrap().as_deref(), Some("Tue, 01 Oct 2024 10:00:00 GMT"));
    }
}
