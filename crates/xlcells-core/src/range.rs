//! Range views and cached-value snapshots

use crate::cell::{CellId, CellRangeSpec};
use crate::error::{Error, Result};

/// Format code used by number caches when none is given
pub const DEFAULT_FORMAT_CODE: &str = "General";

/// A read-only grid of cell handles over a rectangular range
///
/// Handles are stored column by column. The view does not own the cells; reads go
/// through the owning [`Workbook`](crate::Workbook).
#[derive(Debug, Clone, PartialEq)]
pub struct RangeView {
    range: CellRangeSpec,
    columns: Vec<Vec<CellId>>,
}

impl RangeView {
    pub(crate) fn new(range: CellRangeSpec, columns: Vec<Vec<CellId>>) -> Self {
        Self { range, columns }
    }

    /// The sheet-qualified range this view covers
    pub fn range(&self) -> &CellRangeSpec {
        &self.range
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Get a handle by offset from the top-left corner
    pub fn cell(&self, col: usize, row: usize) -> Option<CellId> {
        self.columns.get(col).and_then(|c| c.get(row)).copied()
    }

    /// Handles grouped by column
    pub fn columns(&self) -> &[Vec<CellId>] {
        &self.columns
    }

    /// All handles, column by column
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.columns.iter().flatten().copied()
    }

    /// Check if the view is one column wide or one row tall
    pub fn is_vector(&self) -> bool {
        self.range.is_vector()
    }

    /// The handles as a flat sequence, for single-row or single-column views
    pub fn vector(&self) -> Result<Vec<CellId>> {
        if self.range.is_column_vector() {
            Ok(self.columns.first().cloned().unwrap_or_default())
        } else if self.range.is_row_vector() {
            Ok(self.columns.iter().filter_map(|c| c.first().copied()).collect())
        } else {
            Err(Error::NotAVector(self.range.to_string()))
        }
    }
}

/// Which kind of cache a snapshot is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Text of every non-empty cell
    String,
    /// Numeric cells only
    Number,
}

/// One cached point
#[derive(Debug, Clone, PartialEq)]
pub struct CachePoint {
    /// Position in the source vector
    pub index: usize,
    /// Point text
    pub value: String,
}

/// A cached-value snapshot of a vector range, as embedded in chart parts
#[derive(Debug, Clone, PartialEq)]
pub struct ValueCache {
    /// String or number cache
    pub kind: CacheKind,
    /// Number format, for number caches
    pub format_code: Option<String>,
    /// Length of the source vector, including empty cells
    pub point_count: usize,
    /// Points for non-empty cells, in vector order
    pub points: Vec<CachePoint>,
}

impl ValueCache {
    /// Check if no point was captured
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
