//! Error types for xlcells-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in xlcells-core
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Address text does not match the reference grammar
    #[error("Invalid cell address: {0}")]
    AddressSyntax(String),

    /// Range corners are the wrong way round
    #[error("Invalid cell range: {0}")]
    AddressRange(String),

    /// The address names a different sheet than the one it is resolved against
    #[error("Ambiguous sheet references '{expected}' and '{found}'")]
    AmbiguousSheet { expected: String, found: String },

    /// Column index past ZZ
    #[error("Column index {0} out of range (only one- and two-letter columns are supported)")]
    ColumnOutOfRange(u32),

    /// Row index with no 1-based row number
    #[error("Row index {0} out of range")]
    RowOutOfRange(u32),

    /// A document-level reference without a `Sheet!` prefix
    #[error("Reference '{0}' has no sheet name")]
    UnqualifiedReference(String),

    /// Sheet not found by name
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// Invalid sheet name
    #[error("Invalid sheet name: {0}")]
    InvalidSheetName(String),

    /// Duplicate sheet name
    #[error("A worksheet named {0} already exists")]
    DuplicateSheetName(String),

    /// A flat sequence was requested from a two-dimensional range
    #[error("Range {0} is neither a single row nor a single column")]
    NotAVector(String),

    /// A value kind that is read from packages but not written through cells
    #[error("Cannot write {0} values to a cell")]
    UnsupportedValue(&'static str),

    /// NaN or infinite numbers cannot be persisted
    #[error("Cannot store non-finite number {0}")]
    InvalidNumber(f64),

    /// The cell cache and the persisted rows disagree
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),
}
