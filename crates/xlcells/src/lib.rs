//! # xlcells
//!
//! Named cells, ranges and a document-wide shared string pool over XLSX packages.
//!
//! ## Features
//!
//! - Parse `A1`-style addresses and ranges, with optional sheet prefixes and `$` markers
//! - Look up cells by address; repeated lookups return the same handle
//! - Store strings in a deduplicated, reference-counted pool that stays dense on removal
//! - Build range views and chart value caches from vector ranges
//! - Save after every change, keeping every part of the package the model does not manage
//!
//! ## Example
//!
//! ```rust,no_run
//! use xlcells::prelude::*;
//!
//! let mut doc = Document::create("report.xlsx", true).unwrap();
//!
//! let b2 = doc.set_cell("Sheet1", "B2", "I am a cell").unwrap();
//! doc.set_cell("Sheet1", "C3", "I am a cell").unwrap();
//! assert_eq!(doc.shared_strings(), vec!["I am a cell".to_string()]);
//!
//! doc.clear_cell(b2).unwrap();
//! assert_eq!(doc.shared_strings().len(), 1);
//! ```

pub mod document;
pub mod error;
pub mod options;
pub mod prelude;

pub use document::Document;
pub use error::{Error, Result};
pub use xlcells_core::Error as CoreError;
pub use options::DocumentOptions;

// Re-export core types
pub use xlcells_core::{
    CacheKind, CachePoint, CellCoordinate, CellId, CellKind, CellRangeSpec, CellRef, CellValue,
    NaiveDate, NaiveDateTime, RangeView, StringPool, ValueCache, Workbook, Worksheet,
    DEFAULT_SHEET_NAME, MAX_SHEET_NAME_LEN,
};

// Re-export I/O types
pub use xlcells_xlsx::{
    data_reference_xml, range_formula, value_cache_xml, Compression, Package, XlsxError,
    XlsxReader, XlsxWriteOptions, XlsxWriter,
};
