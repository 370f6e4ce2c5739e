//! Package write options

/// Compression applied to parts the writer produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression
    Stored,
    /// Deflate (the usual choice for XLSX)
    #[default]
    Deflated,
}

impl Compression {
    pub(crate) fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Stored => zip::CompressionMethod::Stored,
            Compression::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

/// Options for writing a package
#[derive(Debug, Clone, Default)]
pub struct XlsxWriteOptions {
    /// Compression for every part, including passthrough parts
    pub compression: Compression,
}

impl XlsxWriteOptions {
    /// Create options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression method
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub(crate) fn file_options(&self) -> zip::write::SimpleFileOptions {
        zip::write::SimpleFileOptions::default().compression_method(self.compression.method())
    }
}
