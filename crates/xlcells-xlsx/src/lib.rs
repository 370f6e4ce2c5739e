//! # xlcells-xlsx
//!
//! XLSX (Office Open XML) package reader and writer for xlcells.
//!
//! The reader turns a package into a [`Workbook`](xlcells_core::Workbook) plus a
//! [`Package`] holding everything the model does not manage. The writer puts the two
//! back together, so parts it does not understand survive a save byte for byte.

pub mod cache;
pub mod error;
pub mod options;
pub mod package;
pub mod reader;
pub mod writer;

mod escape;

pub use cache::{data_reference_xml, range_formula, value_cache_xml};
pub use error::{XlsxError, XlsxResult};
pub use options::{Compression, XlsxWriteOptions};
pub use package::{ContentTypes, ManifestEntry, Package, Relationship, SheetPart};
pub use reader::XlsxReader;
pub use writer::XlsxWriter;
