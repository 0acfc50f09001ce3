use crate::model::AttributePair;
use crate::{HashMap, Result};
use ohno::{IntoAppError, bail};

/// Deduplicating attribute lookup table.
///
/// Each distinct pair, compared by canonical serialization, receives the next sequential
/// index the first time it is interned. Indices are never reassigned.
#[derive(Debug, Clone, Default)]
pub struct AttributeLut {
    entries: HashMap<String, (u32, AttributePair)>,
}

impl AttributeLut {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from its published rows, where row `N` holds index `N`.
    pub fn from_rows(rows: Vec<AttributePair>) -> Result<Self> {
        let mut lut = Self::new();
        for (i, pair) in rows.into_iter().enumerate() {
            let index = lut.intern(&pair)?;
            if index as usize != i {
                bail!("attribute row {i} duplicates row {index}");
            }
        }
        Ok(lut)
    }

    /// Index of `pair`, assigning the next one if the pair has not been seen.
    pub fn intern(&mut self, pair: &AttributePair) -> Result<u32> {
        let key = pair.canonical_key();
        if let Some((index, _)) = self.entries.get(&key) {
            return Ok(*index);
        }

        let index = u32::try_from(self.entries.len()).into_app_err("attribute lookup table is full")?;
        let _ = self.entries.insert(key, (index, pair.clone()));
        Ok(index)
    }

    #[must_use]
    pub fn get(&self, pair: &AttributePair) -> Option<u32> {
        self.entries.get(&pair.canonical_key()).map(|(index, _)| *index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invert the table into rows addressed by index.
    ///
    /// Indices must be 0-based and contiguous. A gap or a collision means the
    /// deduplication went wrong, and is reported instead of emitting holes.
    pub fn to_rows(&self) -> Result<Vec<AttributePair>> {
        let mut slots: Vec<Option<&AttributePair>> = vec![None; self.entries.len()];
        for (index, pair) in self.entries.values() {
            let Some(slot) = slots.get_mut(*index as usize) else {
                bail!("attribute index {index} is out of range for a table of {} entries", self.entries.len());
            };
            if slot.is_some() {
                bail!("attribute index {index} is assigned to more than one pair");
            }
            *slot = Some(pair);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.cloned().into_app_err_with(|| format!("attribute index {i} is missing from the lookup table")))
            .collect()
    }
}
