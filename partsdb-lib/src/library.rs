//! Decoding of the stored tables into a queryable [`Catalog`].

use crate::model::{AttributePair, Catalog, Category, CategoryId, Component, parse_schedule};
use crate::reader::{Cancellation, TableReader};
use crate::tables::{RowReader, SchemaHeader, TableName};
use crate::Result;
use ohno::{IntoAppError, app_err};
use serde_json::Value;
use std::sync::Arc;

/// Log target for the library
const LOG_TARGET: &str = "   library";

/// What the client can show for the local component library.
#[derive(Debug, Clone)]
pub enum LibraryState {
    /// No tables have been downloaded yet.
    Empty,

    /// Loading was cancelled before it finished.
    Cancelled,

    Ready(Arc<Catalog>),

    /// The stored tables exist but cannot be decoded.
    Unreadable(Arc<ohno::AppError>),
}

impl LibraryState {
    #[must_use]
    pub const fn catalog(&self) -> Option<&Arc<Catalog>> {
        match self {
            Self::Ready(catalog) => Some(catalog),
            _ => None,
        }
    }
}

/// Loads the catalog from the tables held by a [`TableReader`].
#[derive(Debug, Clone)]
pub struct Library {
    reader: Arc<TableReader>,
}

impl Library {
    #[must_use]
    pub const fn new(reader: Arc<TableReader>) -> Self {
        Self { reader }
    }

    #[must_use]
    pub const fn reader(&self) -> &Arc<TableReader> {
        &self.reader
    }

    /// Load the library, folding every failure into [`LibraryState::Unreadable`].
    pub async fn load(&self, cancel: &dyn Cancellation) -> LibraryState {
        match self.present_tables() {
            Ok(0) => return LibraryState::Empty,
            Ok(_) => {}
            Err(e) => return LibraryState::Unreadable(Arc::new(e)),
        }

        match self.decode(cancel).await {
            Ok(Some(catalog)) => {
                log::info!(target: LOG_TARGET, "Loaded {} components in {} categories", catalog.len(), catalog.categories().len());
                LibraryState::Ready(Arc::new(catalog))
            }
            Ok(None) => LibraryState::Cancelled,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Cannot read the component library: {e:#}");
                LibraryState::Unreadable(Arc::new(e))
            }
        }
    }

    fn present_tables(&self) -> Result<usize> {
        let mut present = 0;
        for table in TableName::ALL {
            if self.reader.has_table(table)? {
                present += 1;
            }
        }
        Ok(present)
    }

    /// Decode all three tables; `Ok(None)` means the load was cancelled.
    pub async fn decode(&self, cancel: &dyn Cancellation) -> Result<Option<Catalog>> {
        let Some(attributes) = self.reader.lines(TableName::AttributesLut, cancel).await? else {
            return Ok(None);
        };
        let Some(subcategories) = self.reader.lines(TableName::Subcategories, cancel).await? else {
            return Ok(None);
        };
        let Some(components) = self.reader.lines(TableName::Components, cancel).await? else {
            return Ok(None);
        };

        let attributes = attributes
            .iter()
            .enumerate()
            .map(|(i, line)| serde_json::from_str::<AttributePair>(line).into_app_err_with(|| format!("attribute line {i} is malformed")))
            .collect::<Result<Vec<_>>>()?;

        let categories = decode_rows(TableName::Subcategories, &subcategories, |id, row| {
            Ok(Category {
                id,
                category: row.opt_string("category").unwrap_or_default(),
                subcategory: row.opt_string("subcategory").unwrap_or_default(),
                source_name: row.opt_string("sourcename").unwrap_or_default(),
                data_hash: String::new(),
                stock_hash: String::new(),
            })
        })?;

        let components = decode_rows(TableName::Components, &components, |_, row| {
            let category_id = CategoryId::try_from(row.u64("subcategoryIdx")?).into_app_err("subcategory index is out of range")?;
            let lcsc = row.str("lcsc")?.to_string();
            let price = row.value("price").map_or_else(Vec::new, |v| {
                parse_schedule(v).unwrap_or_else(|e| {
                    log::warn!(target: LOG_TARGET, "Ignoring the price schedule of {lcsc}: {e:#}");
                    Vec::new()
                })
            });
            Ok(Component {
                lcsc,
                manufacturer: row.opt_string("mfr").unwrap_or_default(),
                description: row.opt_string("description").unwrap_or_default(),
                attributes: row.parse("attrsIdx")?,
                stock: row.opt_u64("stock"),
                category_id,
                joints: row.opt_u64("joints"),
                datasheet: row.opt_string("datasheet").unwrap_or_default(),
                price,
                image: row.opt_string("img"),
                url: row.opt_string("url").unwrap_or_default(),
            })
        })?;

        Catalog::new(attributes, categories, components).map(Some)
    }
}

/// Decode positional rows through the header on line 0. Rows are numbered from 1.
fn decode_rows<T>(table: TableName, lines: &[String], mut decode: impl FnMut(CategoryId, RowReader<'_>) -> Result<T>) -> Result<Vec<T>> {
    let Some((header_line, rows)) = lines.split_first() else {
        return Err(app_err!("table '{table}' has no schema header"));
    };

    let header_value: Value = serde_json::from_str(header_line).into_app_err_with(|| format!("schema header of '{table}' is malformed"))?;
    let header = SchemaHeader::from_value(&header_value).into_app_err_with(|| format!("schema header of '{table}' is malformed"))?;

    rows.iter()
        .enumerate()
        .map(|(i, line)| {
            let line_no = i + 1;
            let values: Vec<Value> = serde_json::from_str(line).into_app_err_with(|| format!("line {line_no} of '{table}' is malformed"))?;
            let id = CategoryId::try_from(line_no).into_app_err("too many rows")?;
            decode(id, RowReader::new(&header, &values)).into_app_err_with(|| format!("line {line_no} of '{table}' is malformed"))
        })
        .collect()
}
