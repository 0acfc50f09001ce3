use super::{CategoryIndex, IndexEntry};
use crate::model::{Category, CategoryKey};
use strum::Display;

/// What reconciliation must do for one indexed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Transition {
    /// Not present locally.
    New,

    /// The component set or its source moved; the category is recreated.
    Changed,

    /// Only the stock snapshot moved; stock is updated in place.
    StockOnly,

    NoOp,
}

/// Classify an indexed entry against the matching local category.
#[must_use]
pub fn classify(local: Option<&Category>, entry: &IndexEntry) -> Transition {
    match local {
        None => Transition::New,
        Some(c) if c.data_hash != entry.data_hash || c.source_name != entry.source_name => Transition::Changed,
        Some(c) if c.stock_hash != entry.stock_hash => Transition::StockOnly,
        Some(_) => Transition::NoOp,
    }
}

#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub key: CategoryKey,
    pub entry: IndexEntry,
    pub local: Option<Category>,
    pub transition: Transition,
}

/// The outcome of comparing an index with the local categories, without acting on it.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// One action per indexed key, in index order.
    pub actions: Vec<PlannedAction>,

    /// Local categories whose key is missing from the index.
    pub excessive: Vec<Category>,
}

impl SyncPlan {
    /// Whether applying the plan would change the local store.
    #[must_use]
    pub fn has_updates(&self) -> bool {
        !self.excessive.is_empty() || self.actions.iter().any(|a| a.transition != Transition::NoOp)
    }

    #[must_use]
    pub fn count(&self, transition: Transition) -> usize {
        self.actions.iter().filter(|a| a.transition == transition).count()
    }
}

/// Compare `index` with `local` and decide the transition of every key.
#[must_use]
pub fn plan(index: &CategoryIndex, local: &[Category]) -> SyncPlan {
    let actions = index
        .entries()
        .map(|(key, entry)| {
            let existing = local.iter().find(|c| c.matches(&key)).cloned();
            PlannedAction {
                transition: classify(existing.as_ref(), entry),
                key,
                entry: entry.clone(),
                local: existing,
            }
        })
        .collect();

    let keys = index.keys();
    let excessive = local.iter().filter(|c| !keys.contains(&c.key())).cloned().collect();

    SyncPlan { actions, excessive }
}
