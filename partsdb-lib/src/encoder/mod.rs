//! Offline build step that turns per-category source files into the published tables.
//!
//! Every category file contributes one subcategory row and one component row per part.
//! Attribute pairs are deduplicated into a lookup table, and components reference them
//! by index. Stock levels come from the `*.stock.json` snapshots next to the category
//! files. A malformed file is skipped and reported in the [`EncodeSummary`], it never
//! aborts the pass.

mod lut;
mod source;

pub use lut::AttributeLut;
pub use source::{ComponentRecord, SourceFile, SourceKind, StockSnapshot, parse_json_bytes, read_json_file, source_name};

use crate::Result;
use crate::model::AttributePair;
use crate::progress::Progress;
use crate::tables::{COMPONENT_FIELDS, Codec, RowWriter, SUBCATEGORY_FIELDS, SchemaHeader, TableName};
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use ohno::IntoAppError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Log target for the encoder
const LOG_TARGET: &str = "   encoder";

/// Name of the archive bundling all tables.
pub const DEFAULT_ARCHIVE_NAME: &str = "all.jsonlines.tar";

/// Compressed table blobs keyed by table.
pub type TableBlobs = BTreeMap<TableName, Vec<u8>>;

/// Accumulates categories and components into the three output tables.
#[derive(Debug)]
pub struct TableBuilder {
    stock: StockSnapshot,
    lut: AttributeLut,
    subcategory_header: SchemaHeader,
    component_header: SchemaHeader,
    subcategories: Vec<Vec<Value>>,
    components: Vec<Vec<Value>>,
}

impl TableBuilder {
    pub fn new(stock: StockSnapshot) -> Result<Self> {
        Ok(Self {
            stock,
            lut: AttributeLut::new(),
            subcategory_header: SchemaHeader::from_fields(SUBCATEGORY_FIELDS)?,
            component_header: SchemaHeader::from_fields(COMPONENT_FIELDS)?,
            subcategories: Vec::new(),
            components: Vec::new(),
        })
    }

    /// Add one category file and return its subcategory index.
    ///
    /// All component rows are resolved before anything is recorded, so a malformed file
    /// leaves the builder untouched.
    pub fn add_category(&mut self, source_name: &str, file: &SourceFile) -> Result<u64> {
        let records = file.records()?;

        // row 0 is the schema header
        let subcategory_idx = self.subcategories.len() as u64 + 1;
        let mut row = vec![Value::Null; self.subcategory_header.len()];
        put(&mut row, &self.subcategory_header, "subcategory", Value::from(file.subcategory.as_str()));
        put(&mut row, &self.subcategory_header, "category", Value::from(file.category.as_str()));
        put(&mut row, &self.subcategory_header, "sourcename", Value::from(source_name));
        self.subcategories.push(row);

        for record in records {
            let attrs = self.intern_all(&record.attributes)?;
            let price = serde_json::to_value(&record.price).into_app_err_with(|| format!("price schedule of {}", record.lcsc))?;
            let stock = self.stock.get(&record.lcsc).copied();

            let h = &self.component_header;
            let mut row = vec![Value::Null; h.len()];
            put(&mut row, h, "lcsc", Value::from(record.lcsc));
            put(&mut row, h, "mfr", Value::from(record.manufacturer));
            put(&mut row, h, "description", Value::from(record.description));
            put(&mut row, h, "attrsIdx", Value::from(attrs));
            put(&mut row, h, "stock", stock.map_or(Value::Null, Value::from));
            put(&mut row, h, "subcategoryIdx", Value::from(subcategory_idx));
            put(&mut row, h, "joints", record.joints.map_or(Value::Null, Value::from));
            put(&mut row, h, "datasheet", Value::from(record.datasheet));
            put(&mut row, h, "price", price);
            put(&mut row, h, "img", record.image.map_or(Value::Null, Value::from));
            put(&mut row, h, "url", Value::from(record.url));
            self.components.push(row);
        }

        Ok(subcategory_idx)
    }

    fn intern_all(&mut self, pairs: &[AttributePair]) -> Result<Vec<u32>> {
        pairs.iter().map(|pair| self.lut.intern(pair)).collect()
    }

    #[must_use]
    pub const fn lut(&self) -> &AttributeLut {
        &self.lut
    }

    #[must_use]
    pub fn subcategory_count(&self) -> usize {
        self.subcategories.len()
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Serialize and compress the three tables.
    pub fn finish(&self, codec: Codec) -> Result<TableBlobs> {
        let mut blobs = TableBlobs::new();

        let mut writer = RowWriter::new(TableName::AttributesLut, codec)?;
        for pair in self.lut.to_rows()? {
            writer.write_row(&pair)?;
        }
        let _ = blobs.insert(TableName::AttributesLut, writer.finish()?);

        let mut writer = RowWriter::new(TableName::Subcategories, codec)?;
        writer.write_row(&self.subcategory_header.to_header_row())?;
        for row in &self.subcategories {
            writer.write_row(row)?;
        }
        let _ = blobs.insert(TableName::Subcategories, writer.finish()?);

        let mut writer = RowWriter::new(TableName::Components, codec)?;
        writer.write_row(&self.component_header.to_header_row())?;
        for row in &self.components {
            writer.write_row(row)?;
        }
        let _ = blobs.insert(TableName::Components, writer.finish()?);

        Ok(blobs)
    }
}

fn put(row: &mut [Value], header: &SchemaHeader, name: &str, value: Value) {
    if let Some(pos) = header.position(name) {
        row[pos] = value;
    }
}

/// Package compressed tables into an uncompressed tar archive.
pub fn archive_bytes(blobs: &TableBlobs, codec: Codec) -> Result<Vec<u8>> {
    let mtime = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    let mut builder = tar::Builder::new(Vec::new());

    for (table, blob) in blobs {
        let mut header = tar::Header::new_gnu();
        header.set_size(blob.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_cksum();
        builder
            .append_data(&mut header, table.file_name(codec), blob.as_slice())
            .into_app_err_with(|| format!("unable to add {table} to archive"))?;
    }

    builder.into_inner().into_app_err("unable to finish archive")
}

/// A source file that was left out of the build.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub file: PathBuf,
    pub reason: String,
}

/// Outcome of an encode pass.
#[derive(Debug, Clone)]
pub struct EncodeSummary {
    pub categories: usize,
    pub components: usize,
    pub attributes: usize,
    pub skipped: Vec<SkippedFile>,
    pub archive: PathBuf,
    pub elapsed: Duration,
}

/// Filesystem front end of [`TableBuilder`].
#[derive(Debug, Clone)]
pub struct Encoder {
    codec: Codec,
    archive_name: String,
}

impl Encoder {
    #[must_use]
    pub fn new(codec: Codec, archive_name: impl Into<String>) -> Self {
        Self {
            codec,
            archive_name: archive_name.into(),
        }
    }

    /// Encode every category file in `input`, writing the tables and the archive to `output`.
    pub fn encode_dir(&self, input: &Path, output: &Path, progress: &dyn Progress) -> Result<EncodeSummary> {
        let start = Instant::now();
        let mut skipped = Vec::new();

        let mut files: Vec<(String, PathBuf)> = fs::read_dir(input)
            .into_app_err_with(|| format!("unable to list source directory '{}'", input.display()))?
            .filter_map(core::result::Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                let name = path.file_name()?.to_str()?.to_string();
                Some((name, path))
            })
            .collect();
        files.sort();

        let mut stock = StockSnapshot::default();
        for (name, path) in files.iter().filter(|(name, _)| SourceKind::classify(name) == SourceKind::Stock) {
            match read_json_file::<StockSnapshot>(path) {
                Ok(snapshot) => stock.extend(snapshot),
                Err(e) => skip(&mut skipped, path, &e, name),
            }
        }

        let category_files: Vec<_> = files.iter().filter(|(name, _)| SourceKind::classify(name) == SourceKind::Category).collect();
        let total = category_files.len() as u64;
        let processed = Arc::new(AtomicU64::new(0));
        let processed_clone = Arc::clone(&processed);
        progress.set_phase("Encoding");
        progress.set_determinate(Box::new(move || {
            let done = processed_clone.load(Ordering::Relaxed);
            (total, done, format!("{done}/{total} category files"))
        }));

        let mut builder = TableBuilder::new(stock)?;
        for (name, path) in category_files {
            let result = SourceFile::read(path).and_then(|file| builder.add_category(source_name(name), &file));
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;

            match result {
                Ok(_) => {
                    #[expect(clippy::cast_precision_loss, reason = "file counts are far below f64 precision limits")]
                    let percent = (done as f64 / total as f64 * 100.0).round();
                    log::info!(target: LOG_TARGET, "Processed {done} / {total} ({percent}%) {name}");
                }
                Err(e) => skip(&mut skipped, path, &e, name),
            }
        }

        log::info!(target: LOG_TARGET, "Writing jsonlines tables");
        let blobs = builder.finish(self.codec)?;
        fs::create_dir_all(output).into_app_err_with(|| format!("unable to create output directory '{}'", output.display()))?;
        for (table, blob) in &blobs {
            let path = output.join(table.file_name(self.codec));
            fs::write(&path, blob).into_app_err_with(|| format!("unable to write '{}'", path.display()))?;
        }

        let archive = output.join(&self.archive_name);
        let bytes = archive_bytes(&blobs, self.codec)?;
        fs::write(&archive, bytes).into_app_err_with(|| format!("unable to write '{}'", archive.display()))?;

        progress.done();

        let summary = EncodeSummary {
            categories: builder.subcategory_count(),
            components: builder.component_count(),
            attributes: builder.lut().len(),
            skipped,
            archive,
            elapsed: start.elapsed(),
        };

        log::info!(
            target: LOG_TARGET,
            "Encoded {} categories, {} components and {} distinct attributes in {:.3}s",
            summary.categories,
            summary.components,
            summary.attributes,
            summary.elapsed.as_secs_f64()
        );

        Ok(summary)
    }
}

fn skip(skipped: &mut Vec<SkippedFile>, path: &Path, error: &ohno::AppError, name: &str) {
    log::warn!(target: LOG_TARGET, "Failed on {name}: {error:#}");
    skipped.push(SkippedFile {
        file: path.to_path_buf(),
        reason: format!("{error:#}"),
    });
}
