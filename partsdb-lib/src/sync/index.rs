use crate::model::CategoryKey;
use crate::{HashSet, Result};
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Server-side description of one subcategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "sourcename", alias = "sourceName")]
    pub source_name: String,

    #[serde(rename = "datahash", alias = "dataHash")]
    pub data_hash: String,

    #[serde(rename = "stockhash", alias = "stockHash")]
    pub stock_hash: String,
}

type Categories = BTreeMap<String, BTreeMap<String, IndexEntry>>;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WrappedIndex {
    #[serde(default)]
    created: Option<Value>,
    categories: Categories,
}

/// The category index published next to the per-category source files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryIndex {
    /// Build timestamp, when the server provides one.
    pub created: Option<String>,
    pub categories: Categories,
}

impl CategoryIndex {
    /// Parse an index document.
    ///
    /// Both `{"created": .., "categories": {..}}` and a bare
    /// `{category: {subcategory: entry}}` map are accepted.
    pub fn from_value(value: Value) -> Result<Self> {
        if let Ok(wrapped) = serde_json::from_value::<WrappedIndex>(value.clone()) {
            return Ok(Self {
                created: wrapped.created.map(|c| match c {
                    Value::String(s) => s,
                    other => other.to_string(),
                }),
                categories: wrapped.categories,
            });
        }

        let categories = serde_json::from_value(value).into_app_err("malformed category index")?;
        Ok(Self { created: None, categories })
    }

    /// Every indexed key with its entry, in key order.
    pub fn entries(&self) -> impl Iterator<Item = (CategoryKey, &IndexEntry)> {
        self.categories
            .iter()
            .flat_map(|(category, subs)| subs.iter().map(move |(sub, entry)| (CategoryKey::new(category, sub), entry)))
    }

    #[must_use]
    pub fn keys(&self) -> HashSet<CategoryKey> {
        self.entries().map(|(key, _)| key).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_index() {
        let index = CategoryIndex::from_value(json!({
            "Resistors": {
                "Chip Resistor": {"sourcename": "chip", "datahash": "d1", "stockhash": "s1"},
                "Arrays": {"sourcename": "arrays", "datahash": "d2", "stockhash": "s2"},
            },
            "Capacitors": {
                "MLCC": {"sourcename": "mlcc", "datahash": "d3", "stockhash": "s3"},
            },
        }))
        .unwrap();

        assert_eq!(index.created, None);
        assert_eq!(index.len(), 3);
        assert!(index.keys().contains(&CategoryKey::new("Resistors", "Arrays")));
        let (first, entry) = index.entries().next().unwrap();
        assert_eq!(first, CategoryKey::new("Capacitors", "MLCC"));
        assert_eq!(entry.source_name, "mlcc");
    }

    #[test]
    fn test_wrapped_index_with_camel_case_entries() {
        let index = CategoryIndex::from_value(json!({
            "created": "2024-05-01T10:00:00",
            "categories": {
                "Resistors": {"Chip Resistor": {"sourceName": "chip", "dataHash": "d1", "stockHash": "s1"}},
            },
        }))
        .unwrap();

        assert_eq!(index.created.as_deref(), Some("2024-05-01T10:00:00"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_category_named_categories() {
        let index = CategoryIndex::from_value(json!({
            "categories": {"Misc": {"sourcename": "misc", "datahash": "d", "stockhash": "s"}},
        }))
        .unwrap();

        assert!(index.keys().contains(&CategoryKey::new("categories", "Misc")));
    }

    #[test]
    fn test_malformed_index() {
        let _ = CategoryIndex::from_value(json!({"Resistors": {"Chip": {"sourcename": "chip"}}})).unwrap_err();
        let _ = CategoryIndex::from_value(json!([1, 2, 3])).unwrap_err();
    }
}
