//! Per-sheet cell handle cache
//!
//! Handles are slots in an arena owned by the sheet. Looking the same address up
//! twice yields the same slot, and every read goes through the sheet's storage, so
//! a write through one handle is visible through all of them.

use ahash::AHashMap;

use super::{CellCoordinate, SheetData};

/// Stable handle to a cell: sheet position plus slot in that sheet's cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId {
    pub(crate) sheet: usize,
    pub(crate) slot: usize,
}

impl CellId {
    /// Position of the owning sheet in the workbook
    pub fn sheet_index(&self) -> usize {
        self.sheet
    }
}

/// One cached cell handle
#[derive(Debug, Clone)]
pub struct CellSlot {
    coordinate: CellCoordinate,
    reference: String,
    attached: bool,
}

impl CellSlot {
    /// The unqualified coordinate
    pub fn coordinate(&self) -> &CellCoordinate {
        &self.coordinate
    }

    /// Canonical address (e.g. `B2`)
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Whether the handle is attached to a persisted node
    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

/// Address-keyed cache of cell handles for one sheet
#[derive(Debug, Clone, Default)]
pub struct CellCache {
    slots: Vec<CellSlot>,
    by_reference: AHashMap<String, usize>,
}

impl CellCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the slot for a coordinate, creating it on first lookup
    ///
    /// A new slot is attached if `data` already holds a node at the coordinate.
    pub fn find(&mut self, coordinate: &CellCoordinate, data: &SheetData) -> usize {
        let reference = coordinate.to_a1_string();
        if let Some(&slot) = self.by_reference.get(&reference) {
            return slot;
        }

        let slot = self.slots.len();
        self.slots.push(CellSlot {
            coordinate: coordinate.clone().unqualified(),
            reference: reference.clone(),
            attached: data.contains(coordinate.col(), coordinate.row()),
        });
        self.by_reference.insert(reference, slot);
        slot
    }

    /// Look up a slot by canonical address without creating it
    pub fn get(&self, reference: &str) -> Option<usize> {
        self.by_reference.get(reference).copied()
    }

    /// Get a slot
    pub fn slot(&self, slot: usize) -> Option<&CellSlot> {
        self.slots.get(slot)
    }

    pub(crate) fn set_attached(&mut self, slot: usize, attached: bool) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.attached = attached;
        }
    }

    /// Number of cached handles
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no handle has been created
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
