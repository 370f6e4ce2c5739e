//! # xlcells-core
//!
//! Core data structures for the xlcells document model.
//!
//! This crate provides the types shared by the package reader/writer and the document facade:
//! - [`CellCoordinate`] and [`CellRangeSpec`] - Parsed cell addresses and ranges
//! - [`CellValue`] - Typed cell values (strings, numbers, dates, booleans)
//! - [`StringPool`] - The document-wide deduplicated string table
//! - [`Workbook`], [`Worksheet`] - Sheets, their persisted rows and cell handles
//! - [`RangeView`] and [`ValueCache`] - Range access and cached-value snapshots
//!
//! ## Example
//!
//! ```rust
//! use xlcells_core::{CellValue, Workbook};
//!
//! let mut workbook = Workbook::new();
//! let b2 = workbook.set_cell("Sheet1", "B2", "I am a cell").unwrap();
//! let c3 = workbook.set_cell("Sheet1", "C3", "I am a cell").unwrap();
//!
//! // Both cells share one pool entry
//! assert_eq!(workbook.shared_strings().len(), 1);
//!
//! workbook.clear_cell(b2).unwrap();
//! assert_eq!(workbook.cell_value(c3), Some(CellValue::string("I am a cell")));
//! ```

pub mod cell;
pub mod error;
pub mod range;
pub mod string_pool;
pub mod workbook;
pub mod worksheet;

// Re-exports for convenience
pub use cell::{
    CellCache, CellContent, CellCoordinate, CellId, CellKind, CellNode, CellRangeSpec, CellValue,
    Formula, RowNode, SheetData,
};
pub use error::{Error, Result};
pub use range::{CacheKind, CachePoint, RangeView, ValueCache};
pub use string_pool::{Release, SharedStringRefs, StringPool};
pub use workbook::{CellRef, ReservedSheet, Workbook};
pub use worksheet::Worksheet;

pub use chrono::{NaiveDate, NaiveDateTime};

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Name given to the first sheet of a new workbook
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";
