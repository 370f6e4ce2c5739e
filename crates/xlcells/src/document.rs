//! An open spreadsheet document
//!
//! A [`Document`] owns the in-memory model of one file. Every call that changes the
//! model (cell writes, sheet additions, pool purges) saves the package before it
//! returns, so the file on disk always reflects the last successful operation.

use std::path::{Path, PathBuf};

use log::debug;
use xlcells_core::{CellId, CellRef, CellValue, RangeView, ValueCache, Workbook};
use xlcells_xlsx::{Package, XlsxReader, XlsxWriter};

use crate::error::{Error, Result};
use crate::options::DocumentOptions;

/// File extensions a document may use
const SUPPORTED_EXTENSIONS: [&str; 2] = ["xlsx", "xlsm"];

/// A spreadsheet document bound to a file
#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    workbook: Workbook,
    package: Package,
    options: DocumentOptions,
}

impl Document {
    // ==================== Lifecycle ====================

    /// Open an existing `.xlsx` or `.xlsm` file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, DocumentOptions::default())
    }

    /// Open an existing file with options
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: DocumentOptions) -> Result<Self> {
        let path = path.as_ref();
        check_extension(path)?;
        if !path.is_file() {
            return Err(Error::path(path, "file does not exist"));
        }

        let (workbook, package) = XlsxReader::read_file(path)?;
        debug!(
            "opened {} ({} sheet(s), {} shared string(s))",
            path.display(),
            workbook.sheet_count(),
            workbook.shared_strings().len()
        );

        let mut document = Self {
            path: path.to_path_buf(),
            workbook,
            package,
            options,
        };
        if document.options.purge_unreferenced_on_open
            && !document.workbook.unreferenced_strings().is_empty()
        {
            document.purge_unreferenced_strings()?;
        }
        Ok(document)
    }

    /// Create a new file holding one empty sheet, then open it
    ///
    /// Fails with [`Error::OverwriteRefused`] if the file exists and `overwrite` is false.
    pub fn create<P: AsRef<Path>>(path: P, overwrite: bool) -> Result<Self> {
        Self::create_with_options(path, overwrite, DocumentOptions::default())
    }

    /// Create a new file with options, then open it
    pub fn create_with_options<P: AsRef<Path>>(
        path: P,
        overwrite: bool,
        options: DocumentOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        check_extension(path)?;
        if path.exists() && !overwrite {
            return Err(Error::OverwriteRefused(path.to_path_buf()));
        }

        let mut workbook = Workbook::with_sheet(&options.default_sheet_name)?;
        let package = Package::for_workbook(&mut workbook);
        let document = Self {
            path: path.to_path_buf(),
            workbook,
            package,
            options,
        };
        document.save()?;
        debug!("created {}", path.display());

        Self::open_with_options(path, document.options)
    }

    /// Write the document to its file
    ///
    /// The package goes to a temporary file next to the target, which then replaces it.
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        XlsxWriter::write_with_options(
            &self.workbook,
            &self.package,
            temp.as_file_mut(),
            &self.options.write,
        )?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        debug!("saved {}", self.path.display());
        Ok(())
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory model
    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// Options this document was opened with
    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    // ==================== Sheets ====================

    /// Worksheet names in workbook order
    pub fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }

    /// Add an empty worksheet and save
    pub fn add_sheet(&mut self, name: &str) -> Result<usize> {
        let index = self.workbook.add_worksheet(name)?;
        self.save()?;
        Ok(index)
    }

    // ==================== Cells ====================

    /// Find the cell at `address` in `sheet`
    pub fn find_cell(&mut self, sheet: &str, address: &str) -> Result<CellId> {
        Ok(self.workbook.find_cell(sheet, address)?)
    }

    /// Find a cell from a sheet-qualified reference such as `Sheet 1!B2`
    pub fn find_cell_by_reference(&mut self, reference: &str) -> Result<CellId> {
        Ok(self.workbook.find_cell_by_reference(reference)?)
    }

    /// Read a cell
    pub fn cell(&self, id: CellId) -> Option<CellRef> {
        self.workbook.cell(id)
    }

    /// Read a cell's typed value
    pub fn cell_value(&self, id: CellId) -> Option<CellValue> {
        self.workbook.cell_value(id)
    }

    /// Write a value to a cell and save
    pub fn set_cell_value<V: Into<CellValue>>(&mut self, id: CellId, value: V) -> Result<()> {
        self.workbook.set_cell_value(id, value)?;
        self.save()
    }

    /// Find a cell by address, write a value to it and save
    pub fn set_cell<V: Into<CellValue>>(
        &mut self,
        sheet: &str,
        address: &str,
        value: V,
    ) -> Result<CellId> {
        let id = self.workbook.set_cell(sheet, address, value)?;
        self.save()?;
        Ok(id)
    }

    /// Clear a cell and save
    pub fn clear_cell(&mut self, id: CellId) -> Result<()> {
        self.workbook.clear_cell(id)?;
        self.save()
    }

    // ==================== Ranges ====================

    /// Build a view over `range` in `sheet`
    pub fn range(&mut self, sheet: &str, range: &str) -> Result<RangeView> {
        Ok(self.workbook.range(sheet, range)?)
    }

    /// Build a view from a sheet-qualified range such as `Sheet 1!$A$3:$C$7`
    pub fn range_by_reference(&mut self, reference: &str) -> Result<RangeView> {
        Ok(self.workbook.range_by_reference(reference)?)
    }

    /// Values of a view, column by column
    pub fn range_values(&self, view: &RangeView) -> Vec<Vec<CellValue>> {
        self.workbook.range_values(view)
    }

    /// Values of a single-row or single-column view
    pub fn vector_values(&self, view: &RangeView) -> Result<Vec<CellValue>> {
        Ok(self.workbook.vector_values(view)?)
    }

    /// String cache snapshot of a vector view
    pub fn string_cache(&self, view: &RangeView) -> Result<ValueCache> {
        Ok(self.workbook.string_cache(view)?)
    }

    /// Number cache snapshot of a vector view
    pub fn number_cache(&self, view: &RangeView, format_code: Option<&str>) -> Result<ValueCache> {
        Ok(self.workbook.number_cache(view, format_code)?)
    }

    // ==================== Shared strings ====================

    /// Pool contents in index order
    pub fn shared_strings(&self) -> Vec<String> {
        self.workbook
            .shared_strings()
            .iter()
            .map(|(_, text)| text.to_string())
            .collect()
    }

    /// Pool indices no cell references
    pub fn unreferenced_strings(&self) -> Vec<usize> {
        self.workbook.unreferenced_strings()
    }

    /// Remove unreferenced pool entries, saving if any were removed
    pub fn purge_unreferenced_strings(&mut self) -> Result<Vec<String>> {
        let removed = self.workbook.purge_unreferenced_strings();
        if !removed.is_empty() {
            self.save()?;
        }
        Ok(removed)
    }
}

fn check_extension(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match extension.as_deref() {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext) => Ok(()),
        _ => Err(Error::path(path, "expected an .xlsx or .xlsm file")),
    }
}
