use crate::Result;
use bytes::{Buf, Bytes};
use std::io::{BufRead, Error as IoError, Read};
use tokio::sync::mpsc;

/// Feeds the archive unpacker, which runs on a blocking thread, from the response body.
///
/// The download task sends body chunks as they arrive. A transport failure arrives as an
/// `Err` item and surfaces as an I/O error in the middle of the tar stream. The archive
/// ends when the download task drops its sender.
pub struct ChannelReader {
    rx: mpsc::Receiver<Result<Bytes>>,
    pending: Bytes,
}

impl ChannelReader {
    pub const fn new(rx: mpsc::Receiver<Result<Bytes>>) -> Self {
        Self { rx, pending: Bytes::new() }
    }
}

impl BufRead for ChannelReader {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        // empty chunks carry nothing, so keep waiting past them
        while self.pending.is_empty() {
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.pending = chunk,
                Some(Err(e)) => return Err(IoError::other(format!("archive download failed: {e:#}"))),
                None => break,
            }
        }

        Ok(&self.pending[..])
    }

    fn consume(&mut self, amount: usize) {
        self.pending.advance(amount);
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl core::fmt::Debug for ChannelReader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelReader").field("pending", &self.pending.len()).finish_non_exhaustive()
    }
}
