//! Local persistence for the catalogue.
//!
//! Two concerns live here:
//!
//! - [`BlobStore`] holds the compressed table blobs downloaded from the server, plus a
//!   small settings space (last update marker, user preferences). Replacement of blobs
//!   is all-or-nothing and bumps a generation counter that readers use to invalidate
//!   their caches.
//! - [`CatalogStore`] holds the category and component partitions maintained by the
//!   sync reconciler. Category creation and deletion go through a
//!   [`CatalogTransaction`] so a category is never left half-applied. Stock updates are
//!   a targeted in-place mutation.
//!
//! [`MemoryStore`] implements both traits, [`DirStore`] is a file-backed [`BlobStore`].

mod dir;
mod lock;
mod memory;

pub use dir::DirStore;
pub use lock::{WriterLock, commit_blobs, lock_writer};
pub use memory::MemoryStore;

use crate::Result;
use crate::encoder::{ComponentRecord, StockSnapshot, TableBlobs};
use crate::model::{Catalog, Category, CategoryId, CategoryKey, Component};
use crate::tables::TableName;

/// Setting holding the server modification time of the last applied artifact.
pub const LAST_UPDATE: &str = "last_update";

/// Storage of opaque compressed table blobs and small settings.
pub trait BlobStore: Send + Sync {
    /// The stored blob for a table, if any.
    fn blob(&self, table: TableName) -> Result<Option<Vec<u8>>>;

    /// Replace the given blobs in a single atomic step.
    ///
    /// Either every blob is replaced or none is. Blobs of tables not mentioned are kept.
    /// May block on file I/O; async callers use [`commit_blobs`].
    fn replace_blobs(&self, blobs: TableBlobs) -> Result<()>;

    /// Counter bumped on every successful [`replace_blobs`](Self::replace_blobs).
    fn generation(&self) -> u64;

    fn setting(&self, key: &str) -> Result<Option<String>>;

    fn set_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// Storage of the category and component partitions.
pub trait CatalogStore: Send + Sync {
    fn categories(&self) -> Result<Vec<Category>>;

    fn find_category(&self, key: &CategoryKey) -> Result<Option<Category>>;

    /// Apply a transaction atomically, returning the categories it created.
    fn transaction(&self, tx: CatalogTransaction) -> Result<Vec<Category>>;

    /// Set the stock of the category's components listed in `stock`.
    ///
    /// Components keep their identity; ones missing from the snapshot keep their old
    /// stock. Returns the number of components updated.
    fn update_stock(&self, category_id: CategoryId, stock: &StockSnapshot) -> Result<usize>;

    fn set_stock_hash(&self, category_id: CategoryId, hash: &str) -> Result<()>;

    /// All components matching `predicate`.
    fn scan_components(&self, predicate: &dyn Fn(&Component) -> bool) -> Result<Vec<Component>>;

    /// An immutable, resolved view of the whole catalog.
    fn snapshot(&self) -> Result<Catalog>;
}

/// A category to create, before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub category: String,
    pub subcategory: String,
    pub source_name: String,
    pub data_hash: String,
    pub stock_hash: String,
}

impl NewCategory {
    #[must_use]
    pub fn key(&self) -> CategoryKey {
        CategoryKey::new(&self.category, &self.subcategory)
    }
}

#[derive(Debug, Clone)]
pub enum CatalogOp {
    /// Delete a category and all of its components.
    DeleteCategory(CategoryId),

    /// Create a category together with its components.
    PutCategory { category: NewCategory, components: Vec<ComponentRecord> },
}

/// An ordered batch of category operations applied as one unit.
#[derive(Debug, Clone, Default)]
pub struct CatalogTransaction {
    ops: Vec<CatalogOp>,
}

impl CatalogTransaction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn delete_category(mut self, id: CategoryId) -> Self {
        self.ops.push(CatalogOp::DeleteCategory(id));
        self
    }

    #[must_use]
    pub fn put_category(mut self, category: NewCategory, components: Vec<ComponentRecord>) -> Self {
        self.ops.push(CatalogOp::PutCategory { category, components });
        self
    }

    #[must_use]
    pub fn ops(&self) -> &[CatalogOp] {
        &self.ops
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<CatalogOp> {
        self.ops
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
