//! Document error types

use std::path::PathBuf;

use thiserror::Error;
use xlcells_xlsx::XlsxError;

/// Result type for document operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`Document`](crate::Document)
#[derive(Debug, Error)]
pub enum Error {
    /// Address, sheet or pool error from the model
    #[error(transparent)]
    Core(#[from] xlcells_core::Error),

    /// Package could not be read or written
    #[error("XLSX error: {0}")]
    Xlsx(#[from] XlsxError),

    /// Missing file or unsupported extension
    #[error("Invalid path {}: {reason}", .path.display())]
    Path {
        /// The offending path
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// `create` found an existing file and was not allowed to replace it
    #[error("Refusing to overwrite existing file {}", .0.display())]
    OverwriteRefused(PathBuf),

    /// IO error while saving
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn path<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Error::Path {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
