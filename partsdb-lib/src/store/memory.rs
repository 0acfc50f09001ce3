use super::{BlobStore, CatalogOp, CatalogStore, CatalogTransaction, NewCategory};
use crate::encoder::{AttributeLut, ComponentRecord, StockSnapshot, TableBlobs};
use crate::model::{AttributePair, Catalog, Category, CategoryId, CategoryKey, Component};
use crate::tables::TableName;
use crate::{HashSet, Result};
use ohno::{IntoAppError, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Log target for `store`
const LOG_TARGET: &str = "     store";

#[derive(Debug, Clone)]
struct CatalogState {
    next_id: CategoryId,
    categories: BTreeMap<CategoryId, Category>,
    components: BTreeMap<String, Component>,
    lut: AttributeLut,
}

impl Default for CatalogState {
    fn default() -> Self {
        Self {
            next_id: 1,
            categories: BTreeMap::new(),
            components: BTreeMap::new(),
            lut: AttributeLut::new(),
        }
    }
}

/// On-disk form of the catalog partitions.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedCatalog {
    next_id: CategoryId,
    categories: Vec<Category>,
    components: Vec<Component>,
    attributes: Vec<AttributePair>,
}

#[derive(Debug, Default)]
struct BlobState {
    blobs: BTreeMap<TableName, Vec<u8>>,
    generation: u64,
    settings: BTreeMap<String, String>,
}

/// In-memory implementation of both store traits.
///
/// When opened from a path, [`flush`](Self::flush) persists the catalog partitions as a
/// JSON snapshot that a later [`open`](Self::open) restores. Blobs and settings live only
/// in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: Mutex<CatalogState>,
    blobs: Mutex<BlobState>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by a JSON snapshot file, starting empty if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = CatalogState::default();

        match fs::read(&path) {
            Ok(bytes) => {
                let persisted: PersistedCatalog =
                    serde_json::from_slice(&bytes).into_app_err_with(|| format!("unable to parse catalog snapshot '{}'", path.display()))?;

                // validate references before accepting the snapshot
                let attributes = persisted.attributes;
                let catalog = Catalog::new(attributes.clone(), persisted.categories.clone(), persisted.components.clone())
                    .into_app_err_with(|| format!("catalog snapshot '{}' is inconsistent", path.display()))?;
                log::debug!(target: LOG_TARGET, "Loaded {} components from '{}'", catalog.len(), path.display());

                state.next_id = persisted.next_id;
                state.lut = AttributeLut::from_rows(attributes)?;
                state.categories = persisted.categories.into_iter().map(|c| (c.id, c)).collect();
                state.components = persisted.components.into_iter().map(|c| (c.lcsc.clone(), c)).collect();
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).into_app_err_with(|| format!("unable to read catalog snapshot '{}'", path.display())),
        }

        Ok(Self {
            catalog: Mutex::new(state),
            blobs: Mutex::new(BlobState::default()),
            path: Some(path),
        })
    }

    /// Persist the catalog partitions to the snapshot file, if this store has one.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let persisted = {
            let state = self.catalog.lock().expect("lock poisoned");
            PersistedCatalog {
                next_id: state.next_id,
                categories: state.categories.values().cloned().collect(),
                components: state.components.values().cloned().collect(),
                attributes: state.lut.to_rows()?,
            }
        };

        let bytes = serde_json::to_vec(&persisted).into_app_err("unable to serialize catalog snapshot")?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).into_app_err_with(|| format!("unable to write '{}'", tmp.display()))?;
        fs::rename(&tmp, path).into_app_err_with(|| format!("unable to replace '{}'", path.display()))?;
        Ok(())
    }
}

impl CatalogState {
    /// Check a transaction against the current state without changing anything.
    fn validate(&self, ops: &[CatalogOp]) -> Result<()> {
        let mut deleted: HashSet<CategoryId> = HashSet::default();
        let mut created: HashSet<CategoryKey> = HashSet::default();

        for op in ops {
            match op {
                CatalogOp::DeleteCategory(id) => {
                    if !self.categories.contains_key(id) || !deleted.insert(*id) {
                        bail!("cannot delete unknown category {id}");
                    }
                }
                CatalogOp::PutCategory { category, .. } => {
                    let key = category.key();
                    let clash = self.categories.values().any(|c| c.matches(&key) && !deleted.contains(&c.id));
                    if clash || !created.insert(key) {
                        bail!("category '{}' already exists", category.key());
                    }
                }
            }
        }

        Ok(())
    }

    fn delete(&mut self, id: CategoryId) {
        let _ = self.categories.remove(&id);
        self.components.retain(|_, c| c.category_id != id);
    }

    fn put(&mut self, new: NewCategory, records: Vec<ComponentRecord>) -> Result<Category> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).into_app_err("category ids are exhausted")?;

        let category = Category {
            id,
            category: new.category,
            subcategory: new.subcategory,
            source_name: new.source_name,
            data_hash: new.data_hash,
            stock_hash: new.stock_hash,
        };

        for record in records {
            let attributes = record.attributes.iter().map(|pair| self.lut.intern(pair)).collect::<Result<Vec<_>>>()?;
            let component = Component {
                lcsc: record.lcsc,
                manufacturer: record.manufacturer,
                description: record.description,
                attributes,
                stock: None,
                category_id: id,
                joints: record.joints,
                datasheet: record.datasheet,
                price: record.price,
                image: record.image,
                url: record.url,
            };
            let _ = self.components.insert(component.lcsc.clone(), component);
        }

        let _ = self.categories.insert(id, category.clone());
        Ok(category)
    }
}

impl CatalogStore for MemoryStore {
    fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.catalog.lock().expect("lock poisoned").categories.values().cloned().collect())
    }

    fn find_category(&self, key: &CategoryKey) -> Result<Option<Category>> {
        let state = self.catalog.lock().expect("lock poisoned");
        Ok(state.categories.values().find(|c| c.matches(key)).cloned())
    }

    fn transaction(&self, tx: CatalogTransaction) -> Result<Vec<Category>> {
        let mut state = self.catalog.lock().expect("lock poisoned");
        state.validate(tx.ops())?;

        // ops apply to a copy that replaces the live state only once all of them succeed
        let mut next = state.clone();
        let mut created = Vec::new();
        for op in tx.into_ops() {
            match op {
                CatalogOp::DeleteCategory(id) => next.delete(id),
                CatalogOp::PutCategory { category, components } => created.push(next.put(category, components)?),
            }
        }

        *state = next;
        Ok(created)
    }

    fn update_stock(&self, category_id: CategoryId, stock: &StockSnapshot) -> Result<usize> {
        let mut state = self.catalog.lock().expect("lock poisoned");
        if !state.categories.contains_key(&category_id) {
            bail!("cannot update stock of unknown category {category_id}");
        }

        let mut updated = 0;
        for (lcsc, &count) in stock {
            if let Some(component) = state.components.get_mut(lcsc)
                && component.category_id == category_id
            {
                component.stock = Some(count);
                updated += 1;
            }
        }

        Ok(updated)
    }

    fn set_stock_hash(&self, category_id: CategoryId, hash: &str) -> Result<()> {
        let mut state = self.catalog.lock().expect("lock poisoned");
        let category = state
            .categories
            .get_mut(&category_id)
            .into_app_err_with(|| format!("cannot set stock hash of unknown category {category_id}"))?;
        category.stock_hash = hash.to_string();
        Ok(())
    }

    fn scan_components(&self, predicate: &dyn Fn(&Component) -> bool) -> Result<Vec<Component>> {
        let state = self.catalog.lock().expect("lock poisoned");
        Ok(state.components.values().filter(|c| predicate(c)).cloned().collect())
    }

    fn snapshot(&self) -> Result<Catalog> {
        let state = self.catalog.lock().expect("lock poisoned");
        Catalog::new(
            state.lut.to_rows()?,
            state.categories.values().cloned().collect(),
            state.components.values().cloned().collect(),
        )
    }
}

impl BlobStore for MemoryStore {
    fn blob(&self, table: TableName) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().expect("lock poisoned").blobs.get(&table).cloned())
    }

    fn replace_blobs(&self, blobs: TableBlobs) -> Result<()> {
        let mut state = self.blobs.lock().expect("lock poisoned");
        state.blobs.extend(blobs);
        state.generation += 1;
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.blobs.lock().expect("lock poisoned").generation
    }

    fn setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.blobs.lock().expect("lock poisoned").settings.get(key).cloned())
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let _ = self
            .blobs
            .lock()
            .expect("lock poisoned")
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
