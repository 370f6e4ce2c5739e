//! Cell-related types and utilities
//!
//! This module contains:
//! - [`CellCoordinate`] and [`CellRangeSpec`] - Parsed addresses (e.g., "B2", "Sheet 1!A3:C7")
//! - [`CellValue`] - Typed values read from and written to cells
//! - [`SheetData`] - Sparse persisted rows and cell nodes
//! - [`CellCache`] - Per-sheet handle cache

mod address;
mod cache;
mod storage;
mod value;

pub use address::{
    column_index, column_letters, row_index, row_number, CellCoordinate, CellRangeSpec,
    MAX_COLUMN_INDEX, MAX_ROW_NUMBER,
};
pub use cache::{CellCache, CellId, CellSlot};
pub use storage::{CellNode, Formula, RowNode, SheetData};
pub use value::{format_number, parse_date, CellContent, CellKind, CellValue, DATE_FORMAT};
