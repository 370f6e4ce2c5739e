//! Document-wide shared string pool
//!
//! Cells holding text store a position in this pool rather than the text. The
//! position is what gets persisted, so the pool is always dense: removing entry
//! `i` shifts every reference above `i` down by one in the same call.

use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, warn};

/// Something that holds pool positions: a sheet, or every sheet of a document
///
/// The pool calls back into this to count references before removing an entry
/// and to shift references after removal.
pub trait SharedStringRefs {
    /// Count cells referencing `index`, stopping once `limit` is reached
    fn count_shared_string_refs(&self, index: usize, limit: usize) -> usize;

    /// Decrement every reference greater than `index`, returning how many were changed
    fn shift_shared_string_refs_above(&mut self, index: usize) -> usize;
}

impl<T: SharedStringRefs> SharedStringRefs for [T] {
    fn count_shared_string_refs(&self, index: usize, limit: usize) -> usize {
        let mut count = 0;
        for item in self {
            if count >= limit {
                break;
            }
            count += item.count_shared_string_refs(index, limit - count);
        }
        count
    }

    fn shift_shared_string_refs_above(&mut self, index: usize) -> usize {
        self.iter_mut()
            .map(|item| item.shift_shared_string_refs_above(index))
            .sum()
    }
}

/// Outcome of [`StringPool::release`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other cells still reference the entry
    Retained,
    /// The entry was removed and higher references shifted down
    Removed,
    /// The index was outside the pool; nothing changed
    Dangling,
}

/// Deduplicated, position-addressed string store
#[derive(Debug, Clone, Default)]
pub struct StringPool {
    /// Entries in persisted order; position is the cell-visible index
    entries: Vec<Arc<str>>,
    /// Text to first position holding it
    index_map: AHashMap<Arc<str>, usize>,
}

impl StringPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from persisted entries, keeping every position
    ///
    /// Duplicates are kept in place (cells may reference either copy); lookups by
    /// text resolve to the first occurrence.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let mut pool = Self::new();
        for text in entries {
            let text: Arc<str> = text.into();
            let position = pool.entries.len();
            if pool.index_map.contains_key(&text) {
                warn!("duplicate shared string at index {}: {:?}", position, text);
            } else {
                pool.index_map.insert(text.clone(), position);
            }
            pool.entries.push(text);
        }
        pool
    }

    /// Get or append a string, returning its index
    ///
    /// Never renumbers existing entries.
    pub fn insert(&mut self, text: &str) -> usize {
        if let Some(&idx) = self.index_map.get(text) {
            return idx;
        }
        let idx = self.entries.len();
        let text: Arc<str> = Arc::from(text);
        self.index_map.insert(text.clone(), idx);
        self.entries.push(text);
        idx
    }

    /// Get the string at `index`
    pub fn lookup(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|s| &**s)
    }

    /// Get the index holding `text`, if present
    pub fn position(&self, text: &str) -> Option<usize> {
        self.index_map.get(text).copied()
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries with their indices
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries.iter().enumerate().map(|(i, s)| (i, &**s))
    }

    /// Release one reference to `index`
    ///
    /// The releasing cell must still hold its reference when this is called: the
    /// entry is removed when at most one reference remains in `refs`.
    pub fn release<R>(&mut self, index: usize, refs: &mut R) -> Release
    where
        R: SharedStringRefs + ?Sized,
    {
        if index >= self.entries.len() {
            warn!(
                "release of shared string {} outside pool of {}",
                index,
                self.entries.len()
            );
            return Release::Dangling;
        }
        if refs.count_shared_string_refs(index, 2) > 1 {
            return Release::Retained;
        }
        self.remove_entry(index, refs);
        Release::Removed
    }

    /// Indices no cell in `refs` references
    pub fn unreferenced<R>(&self, refs: &R) -> Vec<usize>
    where
        R: SharedStringRefs + ?Sized,
    {
        (0..self.entries.len())
            .filter(|&i| refs.count_shared_string_refs(i, 1) == 0)
            .collect()
    }

    /// Remove every unreferenced entry, returning the removed strings in pool order
    pub fn purge_unreferenced<R>(&mut self, refs: &mut R) -> Vec<String>
    where
        R: SharedStringRefs + ?Sized,
    {
        let unreferenced = self.unreferenced(refs);
        let mut removed = Vec::with_capacity(unreferenced.len());
        // Highest first, so pending indices stay valid across each shift
        for &index in unreferenced.iter().rev() {
            removed.push(self.entries[index].to_string());
            self.remove_entry(index, refs);
        }
        removed.reverse();
        removed
    }

    fn remove_entry<R>(&mut self, index: usize, refs: &mut R)
    where
        R: SharedStringRefs + ?Sized,
    {
        let text = self.entries.remove(index);
        self.rebuild_index();
        let shifted = refs.shift_shared_string_refs_above(index);
        debug!(
            "removed shared string {} ({:?}), shifted {} references",
            index, text, shifted
        );
    }

    fn rebuild_index(&mut self) {
        self.index_map.clear();
        for (i, text) in self.entries.iter().enumerate() {
            self.index_map.entry(text.clone()).or_insert(i);
        }
    }
}
