//! Document options

use xlcells_core::DEFAULT_SHEET_NAME;
use xlcells_xlsx::XlsxWriteOptions;

/// Options for opening and creating documents
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    /// Name of the single sheet a new document starts with
    pub default_sheet_name: String,
    /// How every save writes the package
    pub write: XlsxWriteOptions,
    /// Drop pool entries no cell references when a document is opened
    pub purge_unreferenced_on_open: bool,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            default_sheet_name: DEFAULT_SHEET_NAME.to_string(),
            write: XlsxWriteOptions::default(),
            purge_unreferenced_on_open: false,
        }
    }
}

impl DocumentOptions {
    /// Create options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name of the first sheet of new documents
    pub fn default_sheet_name<S: Into<String>>(mut self, name: S) -> Self {
        self.default_sheet_name = name.into();
        self
    }

    /// Set the package write options
    pub fn write(mut self, write: XlsxWriteOptions) -> Self {
        self.write = write;
        self
    }

    /// Purge unreferenced pool entries on open
    pub fn purge_unreferenced_on_open(mut self, purge: bool) -> Self {
        self.purge_unreferenced_on_open = purge;
        self
    }
}
