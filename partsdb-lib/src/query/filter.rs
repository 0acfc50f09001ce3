use crate::model::{AttributePair, Catalog, CategoryId};
use std::collections::BTreeSet;

/// Which categories a query covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategorySelection {
    /// Every category. Requires a minimum query length.
    #[default]
    All,
    Only(BTreeSet<CategoryId>),
}

impl CategorySelection {
    #[must_use]
    pub fn contains(&self, id: CategoryId) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(&id),
        }
    }
}

/// Restricts the values of one attribute.
///
/// Components lacking the attribute pass unless the filter is required. An empty value set
/// accepts any value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeFilter {
    pub name: String,
    pub values: BTreeSet<String>,
    pub required: bool,
}

impl AttributeFilter {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeSet::new(),
            required: false,
        }
    }

    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        let _ = self.values.insert(value.into());
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Whether a component whose attribute is `present` passes.
    #[must_use]
    pub fn accepts(&self, present: Option<&AttributePair>) -> bool {
        match present {
            None => !self.required,
            Some(pair) => self.values.is_empty() || self.values.contains(&pair.display_value()),
        }
    }
}

/// A search request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub categories: CategorySelection,

    /// Whitespace-separated terms, all of which must occur (case-insensitively).
    pub text: String,
    pub filters: Vec<AttributeFilter>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Restrict the query to `id`, in addition to any category already selected.
    #[must_use]
    pub fn category(mut self, id: CategoryId) -> Self {
        match &mut self.categories {
            CategorySelection::All => self.categories = CategorySelection::Only(BTreeSet::from([id])),
            CategorySelection::Only(ids) => {
                let _ = ids.insert(id);
            }
        }
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: AttributeFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Number of characters of the trimmed text.
    #[must_use]
    pub fn text_len(&self) -> usize {
        self.text.trim().chars().count()
    }

    pub(crate) fn matcher(&self) -> Matcher<'_> {
        Matcher {
            categories: &self.categories,
            terms: self.text.split_whitespace().map(str::to_lowercase).collect(),
            filters: &self.filters,
        }
    }
}

/// A query prepared for evaluation against catalog rows.
#[derive(Debug)]
pub(crate) struct Matcher<'a> {
    categories: &'a CategorySelection,
    terms: Vec<String>,
    filters: &'a [AttributeFilter],
}

impl Matcher<'_> {
    /// Whether the component at `index` of `catalog` matches.
    pub(crate) fn matches(&self, catalog: &Catalog, index: usize) -> bool {
        let component = &catalog.components()[index];
        if !self.categories.contains(component.category_id) {
            return false;
        }

        let text = catalog.search_text(index);
        if !self.terms.iter().all(|term| text.contains(term.as_str())) {
            return false;
        }

        self.filters.iter().all(|filter| {
            let present = catalog.component_attributes(component).find(|pair| pair.name() == filter.name);
            filter.accepts(present)
        })
    }
}
