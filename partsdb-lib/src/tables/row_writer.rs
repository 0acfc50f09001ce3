use super::table::Compressor;
use super::{Codec, TableName};
use crate::Result;
use ohno::IntoAppError;
use serde::Serialize;
use std::io::Write;

/// Writes one JSON value per line into a compressed table blob.
#[derive(Debug)]
pub struct RowWriter {
    table: TableName,
    compressor: Compressor,
    row_count: u64,
}

impl RowWriter {
    pub fn new(table: TableName, codec: Codec) -> Result<Self> {
        Ok(Self {
            table,
            compressor: codec.compressor()?,
            row_count: 0,
        })
    }

    #[must_use]
    pub const fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn write_row<T: Serialize + ?Sized>(&mut self, row: &T) -> Result<()> {
        serde_json::to_writer(&mut self.compressor, row).into_app_err_with(|| format!("unable to write row {} of {}", self.row_count, self.table))?;
        self.compressor
            .write_all(b"\n")
            .into_app_err_with(|| format!("unable to write row {} of {}", self.row_count, self.table))?;
        self.row_count += 1;
        Ok(())
    }

    /// Finish the compressed stream and return the table blob.
    pub fn finish(self) -> Result<Vec<u8>> {
        self.compressor.finish()
    }
}
