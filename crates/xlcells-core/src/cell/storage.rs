//! Persisted cell storage
//!
//! Sparse row store mirroring a worksheet's persisted layout: only rows and cells
//! with a node are kept, in a row-based BTreeMap structure.
//!
//! Structure: `BTreeMap<row_index, RowNode { BTreeMap<col_index, CellNode> }>`, so
//! iteration always yields rows in ascending order and cells in ascending column order.

use std::collections::BTreeMap;

use super::CellContent;
use crate::error::{Error, Result};
use crate::string_pool::SharedStringRefs;

/// Formula markup carried by a persisted cell
///
/// Formulas are not evaluated; they are kept so an unchanged cell is written back intact.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Formula {
    /// Formula text (may be empty for shared-formula followers)
    pub text: String,
    /// Attributes of the formula element (`t`, `ref`, `si`, ...)
    pub attributes: Vec<(String, String)>,
}

/// A persisted cell
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellNode {
    /// The stored value; `None` for style-only cells
    pub content: Option<CellContent>,
    /// Index into the package's cell formats
    pub style: Option<u32>,
    /// Formula markup, if any
    pub formula: Option<Formula>,
}

impl CellNode {
    /// Create a node holding `content`
    pub fn new(content: CellContent) -> Self {
        Self {
            content: Some(content),
            style: None,
            formula: None,
        }
    }

    /// Create a node holding `content` with a style index
    pub fn with_style(content: CellContent, style: Option<u32>) -> Self {
        Self {
            content: Some(content),
            style,
            formula: None,
        }
    }

    /// The pool index this node references, if it holds a pooled string
    pub fn shared_string_index(&self) -> Option<usize> {
        self.content
            .as_ref()
            .and_then(CellContent::shared_string_index)
    }
}

/// A persisted row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowNode {
    /// Cells keyed by 0-based column index
    pub cells: BTreeMap<u16, CellNode>,
    /// Row attributes other than the row number (`ht`, `customHeight`, `spans`, ...)
    pub attributes: Vec<(String, String)>,
}

impl RowNode {
    /// Create a row with attributes and no cells
    pub fn with_attributes(attributes: Vec<(String, String)>) -> Self {
        Self {
            cells: BTreeMap::new(),
            attributes,
        }
    }

    /// Check if the row carries neither cells nor attributes
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.attributes.is_empty()
    }
}

/// Sparse persisted rows of one worksheet
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SheetData {
    rows: BTreeMap<u32, RowNode>,
}

impl SheetData {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a row by 0-based index
    pub fn row(&self, row: u32) -> Option<&RowNode> {
        self.rows.get(&row)
    }

    /// Get the row at `row`, creating it if needed
    pub fn row_entry(&mut self, row: u32) -> &mut RowNode {
        self.rows.entry(row).or_default()
    }

    /// Iterate rows in ascending order
    pub fn rows(&self) -> impl Iterator<Item = (u32, &RowNode)> {
        self.rows.iter().map(|(r, node)| (*r, node))
    }

    /// Get a cell node
    pub fn get(&self, col: u16, row: u32) -> Option<&CellNode> {
        self.rows.get(&row).and_then(|r| r.cells.get(&col))
    }

    /// Get a mutable cell node
    pub fn get_mut(&mut self, col: u16, row: u32) -> Option<&mut CellNode> {
        self.rows.get_mut(&row).and_then(|r| r.cells.get_mut(&col))
    }

    /// Check if a cell node exists
    pub fn contains(&self, col: u16, row: u32) -> bool {
        self.get(col, row).is_some()
    }

    /// Insert a new cell node, keeping rows and cells in ascending order
    ///
    /// Fails with [`Error::InternalConsistency`] if a node already exists at the position.
    pub fn insert(&mut self, col: u16, row: u32, node: CellNode) -> Result<()> {
        if self.contains(col, row) {
            return Err(Error::InternalConsistency(format!(
                "a cell node already exists at column {} row {}",
                col, row
            )));
        }
        self.row_entry(row).cells.insert(col, node);
        Ok(())
    }

    /// Remove a cell node
    ///
    /// A row left with no cells and no attributes is removed too.
    pub fn remove(&mut self, col: u16, row: u32) -> Option<CellNode> {
        let row_node = self.rows.get_mut(&row)?;
        let node = row_node.cells.remove(&col);
        if row_node.is_empty() {
            self.rows.remove(&row);
        }
        node
    }

    /// Iterate all cell nodes as `(col, row, node)`, row by row
    pub fn cells(&self) -> impl Iterator<Item = (u16, u32, &CellNode)> {
        self.rows
            .iter()
            .flat_map(|(r, node)| node.cells.iter().map(move |(c, cell)| (*c, *r, cell)))
    }

    /// Number of cell nodes
    pub fn cell_count(&self) -> usize {
        self.rows.values().map(|r| r.cells.len()).sum()
    }

    /// Number of row nodes
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl SharedStringRefs for SheetData {
    fn count_shared_string_refs(&self, index: usize, limit: usize) -> usize {
        self.cells()
            .filter(|(_, _, node)| node.shared_string_index() == Some(index))
            .take(limit)
            .count()
    }

    fn shift_shared_string_refs_above(&mut self, index: usize) -> usize {
        let mut shifted = 0;
        for row in self.rows.values_mut() {
            for node in row.cells.values_mut() {
                if let Some(CellContent::SharedString(i)) = &mut node.content {
                    if *i > index {
                        *i -= 1;
                        shifted += 1;
                    }
                }
            }
        }
        shifted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shared(i: usize) -> CellNode {
        CellNode::new(CellContent::SharedString(i))
    }

    #[test]
    fn test_insert_keeps_column_order() {
        let mut data = SheetData::new();
        data.insert(27, 0, shared(0)).unwrap(); // AB1
        data.insert(1, 0, shared(1)).unwrap(); // B1
        data.insert(26, 0, shared(2)).unwrap(); // AA1
        data.insert(0, 3, shared(3)).unwrap(); // A4
        data.insert(0, 1, shared(4)).unwrap(); // A2

        let order: Vec<(u16, u32)> = data.cells().map(|(c, r, _)| (c, r)).collect();
        assert_eq!(order, vec![(1, 0), (26, 0), (27, 0), (0, 1), (0, 3)]);
        assert_eq!(data.cell_count(), 5);
        assert_eq!(data.row_count(), 3);
    }

    #[test]
    fn test_insert_existing_is_internal_error() {
        let mut data = SheetData::new();
        data.insert(2, 2, shared(0)).unwrap();
        let err = data.insert(2, 2, shared(1)).unwrap_err();
        assert!(matches!(err, Error::InternalConsistency(_)));
        assert_eq!(data.get(2, 2), Some(&shared(0)));
    }

    #[test]
    fn test_remove_drops_empty_row() {
        let mut data = SheetData::new();
        data.insert(1, 1, shared(0)).unwrap();
        data.insert(2, 1, shared(0)).unwrap();

        assert!(data.remove(1, 1).is_some());
        assert!(data.row(1).is_some());
        assert!(data.remove(2, 1).is_some());
        assert!(data.row(1).is_none());
        assert!(data.remove(2, 1).is_none());
        assert!(data.is_empty());
    }

    #[test]
    fn test_remove_keeps_row_with_attributes() {
        let mut data = SheetData::new();
        *data.row_entry(4) = RowNode::with_attributes(vec![("ht".into(), "30".into())]);
        data.insert(0, 4, shared(0)).unwrap();

        data.remove(0, 4);
        assert_eq!(data.row(4).map(|r| r.cells.len()), Some(0));
    }

    #[test]
    fn test_shared_string_refs() {
        let mut data = SheetData::new();
        data.insert(0, 0, shared(0)).unwrap();
        data.insert(1, 0, shared(2)).unwrap();
        data.insert(2, 0, shared(2)).unwrap();
        data.insert(3, 0, CellNode::new(CellContent::Number("2".into())))
            .unwrap();

        assert_eq!(data.count_shared_string_refs(2, usize::MAX), 2);
        assert_eq!(data.count_shared_string_refs(2, 1), 1);
        assert_eq!(data.count_shared_string_refs(1, usize::MAX), 0);

        assert_eq!(data.shift_shared_string_refs_above(1), 2);
        assert_eq!(data.get(0, 0), Some(&shared(0)));
        assert_eq!(data.get(1, 0), Some(&shared(1)));
        assert_eq!(
            data.get(3, 0).and_then(|n| n.content.clone()),
            Some(CellContent::Number("2".into()))
        );
    }
}
