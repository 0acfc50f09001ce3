use core::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};

/// Surrogate key of a category inside a store or catalog.
pub type CategoryId = u32;

/// Identity of a category: the `(category, subcategory)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryKey {
    pub category: String,
    pub subcategory: String,
}

impl CategoryKey {
    #[must_use]
    pub fn new(category: impl Into<String>, subcategory: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
        }
    }
}

impl Display for CategoryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.category, self.subcategory)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub category: String,
    pub subcategory: String,

    /// Base name of the per-category source files on the server.
    pub source_name: String,

    /// Fingerprint of the component set, as reported by the server index.
    pub data_hash: String,

    /// Fingerprint of the stock snapshot, as reported by the server index.
    pub stock_hash: String,
}

impl Category {
    #[must_use]
    pub fn key(&self) -> CategoryKey {
        CategoryKey::new(&self.category, &self.subcategory)
    }

    #[must_use]
    pub fn matches(&self, key: &CategoryKey) -> bool {
        self.category == key.category && self.subcategory == key.subcategory
    }
}
