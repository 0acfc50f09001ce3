//! Line-oriented table format shared by the encoder, the stores and the reader.
//!
//! The catalogue is published as three tables. Each table is a sequence of JSON values,
//! one per line, compressed as a whole with gzip or zstd.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ attributes-lut.jsonlines.{gz,zst}                    │
//! │   line N: ["name", value]  (the pair with index N)   │
//! ├──────────────────────────────────────────────────────┤
//! │ subcategories.jsonlines.{gz,zst}                     │
//! │   line 0: {"subcategory":0,"category":1,...}         │
//! │   line N: positional array, N is the category id    │
//! ├──────────────────────────────────────────────────────┤
//! │ components.jsonlines.{gz,zst}                        │
//! │   line 0: {"lcsc":0,"mfr":1,...}                     │
//! │   line N: positional array                           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Line 0 of the subcategories and components tables is a schema header mapping field
//! names to column positions. Consumers resolve every field through [`SchemaHeader`], so
//! columns may be reordered without breaking older readers.

mod row_reader;
mod row_writer;
mod schema;
mod table;

pub use row_reader::RowReader;
pub use row_writer::RowWriter;
pub use schema::SchemaHeader;
pub use table::{Codec, TableName};

/// Column names of the subcategories table, in emitted order.
pub const SUBCATEGORY_FIELDS: [&str; 3] = ["subcategory", "category", "sourcename"];

/// Column names of the components table, in emitted order.
pub const COMPONENT_FIELDS: [&str; 11] = [
    "lcsc",
    "mfr",
    "description",
    "attrsIdx",
    "stock",
    "subcategoryIdx",
    "joints",
    "datasheet",
    "price",
    "img",
    "url",
];
