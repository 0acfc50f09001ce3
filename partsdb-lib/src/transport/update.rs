use super::channel_reader::ChannelReader;
use super::http::ensure_success;
use super::{HttpClient, LOG_TARGET};
use crate::Result;
use crate::encoder::TableBlobs;
use crate::progress::Progress;
use crate::store::{BlobStore, LAST_UPDATE, commit_blobs};
use crate::tables::{Codec, TableName};
use bytes::Bytes;
use chrono::Utc;
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicU64, Ordering};
use futures_util::StreamExt;
use ohno::{IntoAppError, bail};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, IF_MODIFIED_SINCE, LAST_MODIFIED};
use std::io::Read;
use std::sync::Arc;
use tar::Archive;
use tokio::sync::mpsc;

// Downloaded chunks are handed to the unpacking thread through a bounded channel. When
// unpacking falls behind, the channel fills up and the network read pauses.
const NUM_CHANNEL_BUFFERS: usize = 64;

/// Format of HTTP dates, used when the server sends no `Last-Modified`.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The server artifact has not changed since the recorded update.
    NotModified,

    /// New tables were stored.
    Updated { last_modified: String, bytes: u64 },
}

/// Conditionally downloads the packaged tables into a [`BlobStore`].
pub struct Updater {
    client: HttpClient,
    archive_name: String,
    store: Arc<dyn BlobStore>,
}

impl Debug for Updater {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Updater")
            .field("client", &self.client)
            .field("archive_name", &self.archive_name)
            .finish_non_exhaustive()
    }
}

impl Updater {
    pub fn new(client: HttpClient, archive_name: impl Into<String>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            client,
            archive_name: archive_name.into(),
            store,
        }
    }

    /// Server modification time of the last stored artifact.
    pub fn last_update(&self) -> Result<Option<String>> {
        self.store.setting(LAST_UPDATE)
    }

    /// Download the archive if it changed since the last update and replace the stored tables.
    ///
    /// On any failure the store and the recorded update time are left as they were.
    pub async fn update(&self, progress: &dyn Progress) -> Result<UpdateOutcome> {
        let mut headers = HeaderMap::new();
        if let Some(since) = self.last_update()? {
            match HeaderValue::from_str(&since) {
                Ok(value) => {
                    let _ = headers.insert(IF_MODIFIED_SINCE, value);
                }
                Err(_) => log::warn!(target: LOG_TARGET, "Ignoring malformed last update time '{since}'"),
            }
        }

        progress.set_phase("Downloading");
        log::info!(target: LOG_TARGET, "Checking {} for a newer component library", self.client.url(&self.archive_name)?);

        let response = self
            .client
            .get(&self.archive_name, headers)
            .await
            .into_app_err("unable to download the component library")?;
        if response.status() == StatusCode::NOT_MODIFIED {
            log::info!(target: LOG_TARGET, "Component library is up to date");
            return Ok(UpdateOutcome::NotModified);
        }
        let response = ensure_success(response, "unable to download the component library")?;

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Utc::now().format(HTTP_DATE_FORMAT).to_string(), str::to_string);

        let content_length = response.content_length();
        let downloaded_bytes = Arc::new(AtomicU64::new(0));
        let downloaded_bytes_clone = Arc::clone(&downloaded_bytes);

        if let Some(total) = content_length {
            progress.set_determinate(Box::new(move || {
                let downloaded_kb = downloaded_bytes_clone.load(Ordering::Relaxed) / 1024;
                let total_kb = total / 1024;
                (total, downloaded_kb * 1024, format!("{downloaded_kb}/{total_kb} KB: Downloading component library"))
            }));
        } else {
            progress.set_indeterminate(Box::new(move || {
                let downloaded_kb = downloaded_bytes_clone.load(Ordering::Relaxed) / 1024;
                format!("{downloaded_kb} KB: Downloading component library")
            }));
        }

        let (tx, rx) = mpsc::channel::<Result<Bytes>>(NUM_CHANNEL_BUFFERS);
        let unpacking = tokio::task::spawn_blocking(move || unpack_archive(ChannelReader::new(rx)));
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    let _ = downloaded_bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);

                    if tx.send(Ok(bytes)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    break;
                }
            }
        }

        drop(tx);
        let blobs = unpacking.await.into_app_err("archive unpacking task panicked")??;
        let bytes = downloaded_bytes.load(Ordering::Relaxed);

        progress.set_phase("Storing");
        commit_blobs(Arc::clone(&self.store), blobs, last_modified.clone()).await?;

        log::info!(target: LOG_TARGET, "Stored component library ({bytes} bytes, last modified {last_modified})");
        Ok(UpdateOutcome::Updated { last_modified, bytes })
    }
}

/// Collect the table blobs of an uncompressed tar archive.
///
/// Members that are not tables are ignored. Every table must be present exactly once and
/// compressed with the codec its name announces.
pub fn unpack_archive(reader: impl Read) -> Result<TableBlobs> {
    let mut archive = Archive::new(reader);
    let mut blobs = TableBlobs::new();

    for entry in archive.entries().into_app_err("unable to read archive")? {
        let mut entry = entry.into_app_err("unable to read archive entry")?;
        let path = entry.path().into_app_err("invalid archive member name")?.into_owned();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let Some((table, codec)) = TableName::from_file_name(file_name) else {
            log::debug!(target: LOG_TARGET, "Skipping archive member '{file_name}'");
            continue;
        };

        let mut blob = Vec::new();
        let _ = entry
            .read_to_end(&mut blob)
            .into_app_err_with(|| format!("unable to read archive member '{file_name}'"))?;

        let actual = Codec::detect(&blob).into_app_err_with(|| format!("archive member '{file_name}'"))?;
        if actual != codec {
            bail!("archive member '{file_name}' is {actual} compressed");
        }

        if blobs.insert(table, blob).is_some() {
            bail!("archive holds more than one '{table}' table");
        }
    }

    let missing: Vec<_> = TableName::ALL.into_iter().filter(|t| !blobs.contains_key(t)).map(TableName::as_str).collect();
    if !missing.is_empty() {
        bail!("archive is missing tables: {}", missing.join(", "));
    }

    Ok(blobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::archive_bytes;
    use crate::tables::RowWriter;
    use serde_json::json;

    fn table_blobs(codec: Codec) -> TableBlobs {
        TableName::ALL
            .into_iter()
            .map(|table| {
                let mut writer = RowWriter::new(table, codec).unwrap();
                writer.write_row(&json!(["x", 1])).unwrap();
                (table, writer.finish().unwrap())
            })
            .collect()
    }

    #[test]
    fn test_unpack_round_trip() {
        for codec in [Codec::Gzip, Codec::Zstd] {
            let blobs = table_blobs(codec);
            let archive = archive_bytes(&blobs, codec).unwrap();
            assert_eq!(unpack_archive(archive.as_slice()).unwrap(), blobs);
        }
    }

    #[test]
    fn test_unpack_missing_table() {
        let mut blobs = table_blobs(Codec::Gzip);
        let _ = blobs.remove(&TableName::Subcategories);
        let archive = archive_bytes(&blobs, Codec::Gzip).unwrap();

        let e = unpack_archive(archive.as_slice()).unwrap_err();
        assert!(e.to_string().contains("subcategories"));
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        let _ = unpack_archive(&b"definitely not a tar archive"[..]).unwrap_err();
    }
}
