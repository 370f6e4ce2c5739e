//! Worksheet type

use crate::cell::{CellCache, CellCoordinate, CellSlot, SheetData};
use crate::string_pool::SharedStringRefs;

/// A worksheet (single sheet in a workbook)
#[derive(Debug, Clone)]
pub struct Worksheet {
    /// Sheet name
    name: String,
    /// Numeric id listed in the workbook manifest
    sheet_id: u32,
    /// Relationship id linking the manifest entry to the sheet part
    relationship_id: String,
    /// Persisted rows
    data: SheetData,
    /// Handles handed out for this sheet
    cache: CellCache,
}

impl Worksheet {
    /// Create an empty worksheet
    pub fn new<S: Into<String>, R: Into<String>>(name: S, sheet_id: u32, relationship_id: R) -> Self {
        Self::with_data(name, sheet_id, relationship_id, SheetData::new())
    }

    /// Create a worksheet over existing persisted rows
    pub fn with_data<S: Into<String>, R: Into<String>>(
        name: S,
        sheet_id: u32,
        relationship_id: R,
        data: SheetData,
    ) -> Self {
        Self {
            name: name.into(),
            sheet_id,
            relationship_id: relationship_id.into(),
            data,
            cache: CellCache::new(),
        }
    }

    /// Get the sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the manifest sheet id
    pub fn sheet_id(&self) -> u32 {
        self.sheet_id
    }

    /// Get the relationship id
    pub fn relationship_id(&self) -> &str {
        &self.relationship_id
    }

    /// Get the persisted rows
    pub fn data(&self) -> &SheetData {
        &self.data
    }

    /// Get the handle cache
    pub fn cache(&self) -> &CellCache {
        &self.cache
    }

    /// Find (or create) the handle slot for a coordinate
    pub fn find_slot(&mut self, coordinate: &CellCoordinate) -> usize {
        self.cache.find(coordinate, &self.data)
    }

    /// Get a handle slot
    pub fn slot(&self, slot: usize) -> Option<&CellSlot> {
        self.cache.slot(slot)
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut SheetData, &mut CellCache) {
        (&mut self.data, &mut self.cache)
    }
}

impl SharedStringRefs for Worksheet {
    fn count_shared_string_refs(&self, index: usize, limit: usize) -> usize {
        self.data.count_shared_string_refs(index, limit)
    }

    fn shift_shared_string_refs_above(&mut self, index: usize) -> usize {
        self.data.shift_shared_string_refs_above(index)
    }
}
