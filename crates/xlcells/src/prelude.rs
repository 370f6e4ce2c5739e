//! Prelude module - common imports for xlcells users
//!
//! ```rust
//! use xlcells::prelude::*;
//! ```

pub use crate::{
    // Cell and range types
    CellCoordinate,
    CellId,
    CellKind,
    CellRangeSpec,
    CellValue,
    RangeView,
    ValueCache,

    // Document types
    Document,
    DocumentOptions,

    // Error types
    Error,
    Result,

    // I/O types
    Compression,
    XlsxWriteOptions,
};
