use super::{CategoryIndex, PlannedAction, SyncPlan, Transition, plan};
use crate::Result;
use crate::encoder::{SourceFile, StockSnapshot};
use crate::model::{Category, CategoryId, CategoryKey};
use crate::progress::NoProgress;
use crate::store::{CatalogStore, CatalogTransaction, NewCategory};
use core::fmt::{Debug, Formatter};
use core::future::Future;
use futures_util::future::join_all;
use ohno::{AppError, IntoAppError, bail};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Log target for sync
const LOG_TARGET: &str = "      sync";

/// Progress entry name of the index fetch.
const INDEX_TASK: &str = "Component index";

/// Progress entry name of the whole pass.
const ALL_TASK: &str = "All";

/// Where the reconciler gets the index, component sets and stock snapshots from.
pub trait CategorySource: Send + Sync {
    fn fetch_index(&self) -> impl Future<Output = Result<CategoryIndex>> + Send;

    /// The per-category source file named `source_name`.
    fn fetch_components(&self, source_name: &str) -> impl Future<Output = Result<SourceFile>> + Send;

    fn fetch_stock(&self, source_name: &str) -> impl Future<Output = Result<StockSnapshot>> + Send;

    /// Content hash published next to the stock snapshot.
    fn fetch_stock_hash(&self, source_name: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Receives status lines while a sync pass runs, keyed by task name.
pub trait SyncProgress: Send + Sync {
    fn update(&self, name: &str, status: &str);
}

impl SyncProgress for NoProgress {
    fn update(&self, _name: &str, _status: &str) {}
}

type Listener = Box<dyn Fn(&BTreeMap<String, String>) + Send + Sync>;

/// Latest status of every task seen during a sync pass.
#[derive(Default)]
pub struct StatusBoard {
    statuses: Mutex<BTreeMap<String, String>>,
    listener: Option<Listener>,
}

impl StatusBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A board that hands the full status map to `listener` on every change.
    #[must_use]
    pub fn with_listener(listener: impl Fn(&BTreeMap<String, String>) + Send + Sync + 'static) -> Self {
        Self {
            statuses: Mutex::default(),
            listener: Some(Box::new(listener)),
        }
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<String> {
        self.statuses.lock().expect("lock poisoned").get(name).cloned()
    }

    #[must_use]
    pub fn statuses(&self) -> BTreeMap<String, String> {
        self.statuses.lock().expect("lock poisoned").clone()
    }
}

impl SyncProgress for StatusBoard {
    fn update(&self, name: &str, status: &str) {
        let mut statuses = self.statuses.lock().expect("lock poisoned");
        let _ = statuses.insert(name.to_string(), status.to_string());
        if let Some(listener) = &self.listener {
            listener(&statuses);
        }
    }
}

impl Debug for StatusBoard {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StatusBoard").field("statuses", &self.statuses).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum CategoryOutcome {
    Created { components: usize, stock_updated: usize },
    Recreated { components: usize, stock_updated: usize },
    StockUpdated { updated: usize },
    Unchanged,
    Removed,

    /// The action failed; the category keeps whatever it held before this pass.
    Failed(Arc<AppError>),
}

impl CategoryOutcome {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct CategoryReport {
    pub key: CategoryKey,
    pub outcome: CategoryOutcome,
}

/// Result of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Build timestamp of the index the pass ran against.
    pub created: Option<String>,
    pub categories: Vec<CategoryReport>,
}

impl SyncReport {
    pub fn failures(&self) -> impl Iterator<Item = &CategoryReport> {
        self.categories.iter().filter(|r| r.outcome.is_failure())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    #[must_use]
    pub fn outcome(&self, key: &CategoryKey) -> Option<&CategoryOutcome> {
        self.categories.iter().find(|r| &r.key == key).map(|r| &r.outcome)
    }

    /// Number of categories the pass changed locally.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.categories
            .iter()
            .filter(|r| !matches!(r.outcome, CategoryOutcome::Unchanged | CategoryOutcome::Failed(_)))
            .count()
    }
}

/// Drives a [`CatalogStore`] towards the state described by a [`CategorySource`].
pub struct Reconciler<S> {
    source: S,
    store: Arc<dyn CatalogStore>,
}

impl<S> Debug for Reconciler<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl<S: CategorySource> Reconciler<S> {
    pub fn new(source: S, store: Arc<dyn CatalogStore>) -> Self {
        Self { source, store }
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Fetch the index and classify every category without touching the store.
    pub async fn plan(&self) -> Result<SyncPlan> {
        let index = self.fetch_index().await?;
        let local = self.store.categories()?;
        Ok(plan(&index, &local))
    }

    /// Whether a [`sync`](Self::sync) would change anything. Never modifies the store.
    pub async fn check_for_update(&self) -> Result<bool> {
        let plan = self.plan().await?;
        log::info!(
            target: LOG_TARGET,
            "Update check: {} new, {} changed, {} stock updates, {} excessive",
            plan.count(Transition::New),
            plan.count(Transition::Changed),
            plan.count(Transition::StockOnly),
            plan.excessive.len()
        );
        Ok(plan.has_updates())
    }

    /// Run one reconciliation pass.
    ///
    /// Fails only when the index itself cannot be fetched or the local categories cannot be
    /// listed. Per-category failures are reported in the returned [`SyncReport`].
    pub async fn sync(&self, progress: &dyn SyncProgress) -> Result<SyncReport> {
        progress.update(INDEX_TASK, "fetching");
        let index = self.fetch_index().await?;
        progress.update(INDEX_TASK, "fetched");

        let local = self.store.categories()?;
        let plan = plan(&index, &local);
        log::info!(
            target: LOG_TARGET,
            "Index lists {} categories: {} new, {} changed, {} stock updates",
            index.len(),
            plan.count(Transition::New),
            plan.count(Transition::Changed),
            plan.count(Transition::StockOnly)
        );

        let mut categories = join_all(plan.actions.iter().map(|action| async move {
            let outcome = match self.apply(action, progress).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "Unable to sync category {}: {e:#}", action.key);
                    progress.update(&action.key.to_string(), "Failed");
                    CategoryOutcome::Failed(Arc::new(e))
                }
            };
            CategoryReport {
                key: action.key.clone(),
                outcome,
            }
        }))
        .await;

        // every indexed action has resolved, so anything not indexed is stale
        let keys = index.keys();
        for category in self.store.categories()? {
            let key = category.key();
            if keys.contains(&key) {
                continue;
            }

            let name = key.to_string();
            progress.update(&name, "Removing category");
            let outcome = match self.store.transaction(CatalogTransaction::new().delete_category(category.id)) {
                Ok(_) => {
                    log::info!(target: LOG_TARGET, "Removed category {key}");
                    progress.update(&name, "Removed");
                    CategoryOutcome::Removed
                }
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "Unable to remove category {key}: {e:#}");
                    progress.update(&name, "Failed");
                    CategoryOutcome::Failed(Arc::new(e))
                }
            };
            categories.push(CategoryReport { key, outcome });
        }

        progress.update(ALL_TASK, "Finished");
        Ok(SyncReport {
            created: index.created,
            categories,
        })
    }

    async fn fetch_index(&self) -> Result<CategoryIndex> {
        self.source.fetch_index().await.into_app_err("cannot fetch the category index")
    }

    async fn apply(&self, action: &PlannedAction, progress: &dyn SyncProgress) -> Result<CategoryOutcome> {
        let name = action.key.to_string();

        match (action.transition, &action.local) {
            (Transition::NoOp, _) => Ok(CategoryOutcome::Unchanged),

            (Transition::New, _) | (Transition::Changed, None) => {
                progress.update(&name, "Updating components (new) 1/2");
                let (category, components) = self.put_category(action, None).await?;
                progress.update(&name, "Updating stock (new) 2/2");
                let stock_updated = self.update_stock(&category).await?;
                progress.update(&name, "Finished (new)");
                log::info!(target: LOG_TARGET, "Added category {name} with {components} components");
                Ok(CategoryOutcome::Created { components, stock_updated })
            }

            (Transition::Changed, Some(existing)) => {
                progress.update(&name, "Updating components 1/2");
                let (category, components) = self.put_category(action, Some(existing.id)).await?;
                progress.update(&name, "Updating stock 2/2");
                let stock_updated = self.update_stock(&category).await?;
                progress.update(&name, "Finished (updateExisting)");
                log::info!(target: LOG_TARGET, "Replaced category {name} with {components} components");
                Ok(CategoryOutcome::Recreated { components, stock_updated })
            }

            (Transition::StockOnly, Some(existing)) => {
                progress.update(&name, "Updating stock 1/1");
                let updated = self.update_stock(existing).await?;
                progress.update(&name, "Finished (stock update)");
                log::info!(target: LOG_TARGET, "Updated stock of {updated} components in {name}");
                Ok(CategoryOutcome::StockUpdated { updated })
            }

            (Transition::StockOnly, None) => bail!("stock update planned for category {name}, which is not stored locally"),
        }
    }

    /// Fetch the category's components and store them, replacing `replaces` in the same
    /// transaction. The old category stays untouched if the fetch fails.
    async fn put_category(&self, action: &PlannedAction, replaces: Option<CategoryId>) -> Result<(Category, usize)> {
        let entry = &action.entry;
        let file = self
            .source
            .fetch_components(&entry.source_name)
            .await
            .into_app_err_with(|| format!("cannot fetch components for category {}", action.key))?;
        let records = file
            .records()
            .into_app_err_with(|| format!("malformed components for category {}", action.key))?;
        let count = records.len();

        let mut tx = CatalogTransaction::new();
        if let Some(id) = replaces {
            tx = tx.delete_category(id);
        }

        // the stock hash is only recorded once stock has been applied
        let tx = tx.put_category(
            NewCategory {
                category: action.key.category.clone(),
                subcategory: action.key.subcategory.clone(),
                source_name: entry.source_name.clone(),
                data_hash: entry.data_hash.clone(),
                stock_hash: String::new(),
            },
            records,
        );

        let category = self
            .store
            .transaction(tx)?
            .into_iter()
            .next()
            .into_app_err("transaction did not create the category")?;
        Ok((category, count))
    }

    async fn update_stock(&self, category: &Category) -> Result<usize> {
        let key = category.key();
        let stock = self
            .source
            .fetch_stock(&category.source_name)
            .await
            .into_app_err_with(|| format!("cannot fetch stock for category {key}"))?;
        let updated = self.store.update_stock(category.id, &stock)?;

        let hash = self
            .source
            .fetch_stock_hash(&category.source_name)
            .await
            .into_app_err_with(|| format!("cannot fetch stock hash for category {key}"))?;
        self.store.set_stock_hash(category.id, hash.trim())?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashMap;
    use crate::encoder::parse_json_bytes;
    use crate::store::MemoryStore;
    use ohno::app_err;
    use serde_json::{Value, json};

    #[derive(Debug, Default)]
    struct FakeSource {
        index: Mutex<Value>,
        files: Mutex<HashMap<String, Value>>,
        stock: Mutex<HashMap<String, (Value, String)>>,
        fetches: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn set_index(&self, index: Value) {
            *self.index.lock().unwrap() = index;
        }

        fn set_file(&self, source: &str, components: Value) {
            let file = json!({
                "schema": ["lcsc", "mfr", "description", "attributes"],
                "components": components,
            });
            let _ = self.files.lock().unwrap().insert(source.into(), file);
        }

        fn set_stock(&self, source: &str, stock: Value, hash: &str) {
            let _ = self.stock.lock().unwrap().insert(source.into(), (stock, format!("{hash}\n")));
        }

        fn remove_file(&self, source: &str) {
            let _ = self.files.lock().unwrap().remove(source);
        }

        fn take_fetches(&self) -> Vec<String> {
            core::mem::take(&mut *self.fetches.lock().unwrap())
        }

        fn log(&self, what: &str, source: &str) {
            self.fetches.lock().unwrap().push(format!("{what}:{source}"));
        }
    }

    impl CategorySource for FakeSource {
        async fn fetch_index(&self) -> Result<CategoryIndex> {
            CategoryIndex::from_value(self.index.lock().unwrap().clone())
        }

        async fn fetch_components(&self, source_name: &str) -> Result<SourceFile> {
            self.log("components", source_name);
            let file = self.files.lock().unwrap().get(source_name).cloned();
            let file = file.ok_or_else(|| app_err!("404 Not Found: {source_name}.json"))?;
            SourceFile::from_slice(file.to_string().as_bytes())
        }

        async fn fetch_stock(&self, source_name: &str) -> Result<StockSnapshot> {
            self.log("stock", source_name);
            let stock = self.stock.lock().unwrap().get(source_name).cloned();
            let (stock, _) = stock.ok_or_else(|| app_err!("404 Not Found: {source_name}.stock.json"))?;
            parse_json_bytes(stock.to_string().as_bytes())
        }

        async fn fetch_stock_hash(&self, source_name: &str) -> Result<String> {
            self.log("hash", source_name);
            let stock = self.stock.lock().unwrap().get(source_name).cloned();
            stock.map(|(_, hash)| hash).ok_or_else(|| app_err!("404 Not Found: {source_name}.stock.json.sha256"))
        }
    }

    fn index_entry(source: &str, data: &str, stock: &str) -> Value {
        json!({"sourcename": source, "datahash": data, "stockhash": stock})
    }

    fn chip_key() -> CategoryKey {
        CategoryKey::new("Resistors", "Chip")
    }

    /// A source with one resistor category, already published.
    fn resistor_source() -> FakeSource {
        let source = FakeSource::default();
        source.set_index(json!({"Resistors": {"Chip": index_entry("chip", "d1", "s1")}}));
        source.set_file(
            "chip",
            json!([["C1", "UNI", "10k 0402", {"Package": "0402"}], ["C2", "UNI", "1k 0402", {"Package": "0402"}]]),
        );
        source.set_stock("chip", json!({"C1": 100, "C2": 5}), "s1");
        source
    }

    fn reconciler(source: FakeSource) -> (Reconciler<FakeSource>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Reconciler::new(source, Arc::clone(&store) as Arc<dyn CatalogStore>), store)
    }

    #[tokio::test]
    async fn test_new_category() {
        let (reconciler, store) = reconciler(resistor_source());
        let board = StatusBoard::new();

        let report = reconciler.sync(&board).await.unwrap();

        assert!(report.is_success());
        assert!(matches!(
            report.outcome(&chip_key()),
            Some(CategoryOutcome::Created {
                components: 2,
                stock_updated: 2
            })
        ));
        assert_eq!(reconciler.source().take_fetches(), ["components:chip", "stock:chip", "hash:chip"]);

        let category = store.find_category(&chip_key()).unwrap().unwrap();
        assert_eq!(category.data_hash, "d1");
        assert_eq!(category.stock_hash, "s1");

        let catalog = store.snapshot().unwrap();
        assert_eq!(catalog.component("C1").unwrap().stock, Some(100));
        assert_eq!(catalog.attributes().len(), 1);

        assert_eq!(board.status("Resistors: Chip").as_deref(), Some("Finished (new)"));
        assert_eq!(board.status("All").as_deref(), Some("Finished"));
    }

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let (reconciler, _store) = reconciler(resistor_source());
        let _ = reconciler.sync(&NoProgress).await.unwrap();
        let _ = reconciler.source().take_fetches();

        assert!(!reconciler.check_for_update().await.unwrap());
        let report = reconciler.sync(&NoProgress).await.unwrap();

        assert!(matches!(report.outcome(&chip_key()), Some(CategoryOutcome::Unchanged)));
        assert_eq!(report.changed(), 0);
        assert!(reconciler.source().take_fetches().is_empty());
    }

    #[tokio::test]
    async fn test_changed_category_is_recreated() {
        let (reconciler, store) = reconciler(resistor_source());
        let _ = reconciler.sync(&NoProgress).await.unwrap();
        let old = store.find_category(&chip_key()).unwrap().unwrap();

        let source = reconciler.source();
        source.set_index(json!({"Resistors": {"Chip": index_entry("chip", "d2", "s1")}}));
        source.set_file("chip", json!([["C3", "YAGEO", "4k7 0603", {"Package": "0603"}]]));
        source.set_stock("chip", json!({"C3": 9}), "s1");
        let _ = source.take_fetches();

        let report = reconciler.sync(&NoProgress).await.unwrap();

        assert!(matches!(report.outcome(&chip_key()), Some(CategoryOutcome::Recreated { components: 1, .. })));
        assert_eq!(source.take_fetches().iter().filter(|f| f.starts_with("components")).count(), 1);

        let new = store.find_category(&chip_key()).unwrap().unwrap();
        assert_ne!(new.id, old.id);
        assert_eq!(new.data_hash, "d2");

        let catalog = store.snapshot().unwrap();
        assert!(catalog.component("C1").is_none());
        assert_eq!(catalog.component("C3").unwrap().stock, Some(9));
    }

    #[tokio::test]
    async fn test_stock_only_keeps_component_identity() {
        let (reconciler, store) = reconciler(resistor_source());
        let _ = reconciler.sync(&NoProgress).await.unwrap();
        let before = store.find_category(&chip_key()).unwrap().unwrap();

        let source = reconciler.source();
        source.set_index(json!({"Resistors": {"Chip": index_entry("chip", "d1", "s2")}}));
        source.set_stock("chip", json!({"C1": 42}), "s2");
        let _ = source.take_fetches();

        assert!(reconciler.check_for_update().await.unwrap());
        let report = reconciler.sync(&NoProgress).await.unwrap();

        assert!(matches!(report.outcome(&chip_key()), Some(CategoryOutcome::StockUpdated { updated: 1 })));
        assert_eq!(source.take_fetches(), ["stock:chip", "hash:chip"]);

        let after = store.find_category(&chip_key()).unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.stock_hash, "s2");

        let catalog = store.snapshot().unwrap();
        assert_eq!(catalog.component("C1").unwrap().stock, Some(42));
        assert_eq!(catalog.component("C2").unwrap().stock, Some(5));
        assert_eq!(catalog.component("C1").unwrap().category_id, before.id);
    }

    #[tokio::test]
    async fn test_excessive_category_is_removed() {
        let (reconciler, store) = reconciler(resistor_source());
        let _ = reconciler.sync(&NoProgress).await.unwrap();

        reconciler.source().set_index(json!({}));
        let board = StatusBoard::new();
        let report = reconciler.sync(&board).await.unwrap();

        assert!(matches!(report.outcome(&chip_key()), Some(CategoryOutcome::Removed)));
        assert_eq!(report.categories.len(), 1);
        assert!(store.categories().unwrap().is_empty());
        assert!(store.snapshot().unwrap().is_empty());
        assert_eq!(board.status("Resistors: Chip").as_deref(), Some("Removed"));
    }

    #[tokio::test]
    async fn test_check_for_update_does_not_modify_store() {
        let (reconciler, store) = reconciler(resistor_source());

        assert!(reconciler.check_for_update().await.unwrap());
        assert!(store.categories().unwrap().is_empty());
        assert!(reconciler.source().take_fetches().is_empty());
    }

    #[tokio::test]
    async fn test_failed_category_is_isolated() {
        let source = resistor_source();
        source.set_index(json!({
            "Resistors": {"Chip": index_entry("chip", "d1", "s1")},
            "Capacitors": {"MLCC": index_entry("mlcc", "m1", "ms1")},
        }));
        let (reconciler, store) = reconciler(source);

        let report = reconciler.sync(&NoProgress).await.unwrap();

        let mlcc = CategoryKey::new("Capacitors", "MLCC");
        assert!(matches!(report.outcome(&mlcc), Some(CategoryOutcome::Failed(_))));
        assert!(matches!(report.outcome(&chip_key()), Some(CategoryOutcome::Created { .. })));
        assert_eq!(report.failures().count(), 1);
        assert!(store.find_category(&mlcc).unwrap().is_none());
        assert!(store.find_category(&chip_key()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_change_keeps_previous_data() {
        let (reconciler, store) = reconciler(resistor_source());
        let _ = reconciler.sync(&NoProgress).await.unwrap();

        let source = reconciler.source();
        source.set_index(json!({"Resistors": {"Chip": index_entry("chip", "d2", "s1")}}));
        source.remove_file("chip");

        let report = reconciler.sync(&NoProgress).await.unwrap();

        assert!(!report.is_success());
        let category = store.find_category(&chip_key()).unwrap().unwrap();
        assert_eq!(category.data_hash, "d1");
        assert_eq!(store.snapshot().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_stock_is_retried() {
        let source = resistor_source();
        let _ = source.stock.lock().unwrap().remove("chip");
        let (reconciler, store) = reconciler(source);

        let report = reconciler.sync(&NoProgress).await.unwrap();
        assert!(!report.is_success());
        assert_eq!(store.find_category(&chip_key()).unwrap().unwrap().stock_hash, "");

        reconciler.source().set_stock("chip", json!({"C1": 1}), "s1");
        let report = reconciler.sync(&NoProgress).await.unwrap();

        assert!(matches!(report.outcome(&chip_key()), Some(CategoryOutcome::StockUpdated { updated: 1 })));
        assert_eq!(store.find_category(&chip_key()).unwrap().unwrap().stock_hash, "s1");
    }

    #[tokio::test]
    async fn test_index_failure_is_an_error() {
        let source = FakeSource::default();
        source.set_index(json!("not an index"));
        let (reconciler, _store) = reconciler(source);

        let _ = reconciler.sync(&NoProgress).await.unwrap_err();
        let _ = reconciler.check_for_update().await.unwrap_err();
    }
}
