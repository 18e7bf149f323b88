use std::collections::BTreeMap;

use crate::log::RowId;

/// Maps each row id to the allocation-table slot of its current version
#[derive(Debug, Default, Clone)]
pub struct RowTable {
    rows: BTreeMap<RowId, usize>,
}

impl RowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of the row's current version
    pub fn current(&self, row_id: RowId) -> Option<usize> {
        self.rows.get(&row_id).copied()
    }

    /// Points the row at a new slot, returning the slot it replaced
    pub fn set(&mut self, row_id: RowId, slot: usize) -> Option<usize> {
        self.rows.insert(row_id, slot)
    }

    pub fn ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.rows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
