//! Workbook type - the main document structure

use std::collections::BTreeSet;

use log::debug;

use crate::cell::{
    CellContent, CellCoordinate, CellId, CellKind, CellNode, CellRangeSpec, CellValue,
};
use crate::error::{Error, Result};
use crate::range::{CacheKind, CachePoint, RangeView, ValueCache, DEFAULT_FORMAT_CODE};
use crate::string_pool::StringPool;
use crate::worksheet::Worksheet;
use crate::{DEFAULT_SHEET_NAME, MAX_SHEET_NAME_LEN};

/// Characters a sheet name cannot contain
const INVALID_SHEET_NAME_CHARS: &[char] = &[':', '\\', '/', '?', '*', '[', ']', '!'];

/// A snapshot of one cell, as read through a [`CellId`]
#[derive(Debug, Clone, PartialEq)]
pub struct CellRef {
    coordinate: CellCoordinate,
    kind: CellKind,
    value: CellValue,
    shared_string_index: Option<usize>,
    style: Option<u32>,
    persisted: bool,
}

impl CellRef {
    /// The sheet-qualified coordinate
    pub fn coordinate(&self) -> &CellCoordinate {
        &self.coordinate
    }

    /// Canonical address without sheet name (e.g. `B2`)
    pub fn address(&self) -> String {
        self.coordinate.to_a1_string()
    }

    /// The data-kind tag
    pub fn kind(&self) -> CellKind {
        self.kind
    }

    /// The typed value
    pub fn value(&self) -> &CellValue {
        &self.value
    }

    /// The value as text (empty for empty cells)
    pub fn text(&self) -> String {
        self.value.to_string()
    }

    /// The pool index, for pooled strings
    pub fn shared_string_index(&self) -> Option<usize> {
        self.shared_string_index
    }

    /// The style index carried by the persisted node
    pub fn style(&self) -> Option<u32> {
        self.style
    }

    /// Whether a persisted node backs this cell
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }
}

/// A workbook (spreadsheet document)
///
/// Owns the worksheets and the document-wide [`StringPool`]. Every cell write goes
/// through here so pool references stay consistent across all sheets.
#[derive(Debug, Clone)]
pub struct Workbook {
    /// Worksheets in manifest order
    sheets: Vec<Worksheet>,
    /// Shared strings for every sheet
    strings: StringPool,
    /// Relationship ids used by other workbook parts
    reserved_relationship_ids: BTreeSet<String>,
    /// Manifest entries that are not worksheets (chartsheets, dialog sheets)
    reserved_sheets: Vec<ReservedSheet>,
}

/// A manifest entry this model does not manage, kept so new sheets avoid its name and ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedSheet {
    /// Sheet name
    pub name: String,
    /// Manifest sheet id
    pub sheet_id: u32,
}

impl Workbook {
    /// Create a new workbook with one worksheet named `Sheet1`
    pub fn new() -> Self {
        let mut wb = Self::empty();
        wb.sheets
            .push(Worksheet::new(DEFAULT_SHEET_NAME, 1, "rId1"));
        wb
    }

    /// Create a new workbook with one worksheet of the given name
    pub fn with_sheet(name: &str) -> Result<Self> {
        let mut wb = Self::empty();
        wb.add_worksheet(name)?;
        Ok(wb)
    }

    /// Create an empty workbook with no worksheets
    pub fn empty() -> Self {
        Self {
            sheets: Vec::new(),
            strings: StringPool::new(),
            reserved_relationship_ids: BTreeSet::new(),
            reserved_sheets: Vec::new(),
        }
    }

    /// Assemble a workbook from loaded parts
    ///
    /// Sheet names, sheet ids and relationship ids must be unique. Relationship ids in
    /// `reserved` belong to other parts and are never handed to new sheets.
    pub fn from_parts<I>(sheets: Vec<Worksheet>, strings: StringPool, reserved: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut wb = Self {
            sheets: Vec::with_capacity(sheets.len()),
            strings,
            reserved_relationship_ids: reserved.into_iter().collect(),
            reserved_sheets: Vec::new(),
        };
        for sheet in sheets {
            wb.add_existing_worksheet(sheet)?;
        }
        Ok(wb)
    }

    // ==================== Sheets ====================

    /// Get the number of worksheets
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Get a worksheet by index
    pub fn worksheet(&self, index: usize) -> Option<&Worksheet> {
        self.sheets.get(index)
    }

    /// Get a worksheet by name
    pub fn worksheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|ws| ws.name() == name)
    }

    /// Get the index of a worksheet by name
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|ws| ws.name() == name)
    }

    /// Iterate over all worksheets
    pub fn worksheets(&self) -> impl Iterator<Item = &Worksheet> {
        self.sheets.iter()
    }

    /// Sheet names in manifest order
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|ws| ws.name().to_string()).collect()
    }

    /// Add a new empty worksheet
    ///
    /// The sheet gets the next free sheet id and a relationship id not used by any
    /// other sheet or reserved part.
    pub fn add_worksheet(&mut self, name: &str) -> Result<usize> {
        self.validate_sheet_name(name)?;

        let sheet_id = self
            .sheets
            .iter()
            .map(Worksheet::sheet_id)
            .chain(self.reserved_sheets.iter().map(|s| s.sheet_id))
            .max()
            .unwrap_or(0)
            + 1;
        let relationship_id = self.next_relationship_id();
        let index = self.sheets.len();
        self.sheets
            .push(Worksheet::new(name, sheet_id, relationship_id));
        debug!("added worksheet {:?} (sheetId {})", name, sheet_id);
        Ok(index)
    }

    /// Add a loaded worksheet
    pub fn add_existing_worksheet(&mut self, worksheet: Worksheet) -> Result<usize> {
        if worksheet.name().is_empty() {
            return Err(Error::InvalidSheetName("Sheet name cannot be empty".into()));
        }
        self.check_unique_name(worksheet.name())?;
        if self.sheet_id_in_use(worksheet.sheet_id()) {
            return Err(Error::InternalConsistency(format!(
                "duplicate sheet id {}",
                worksheet.sheet_id()
            )));
        }
        if self.relationship_id_in_use(worksheet.relationship_id()) {
            return Err(Error::InternalConsistency(format!(
                "duplicate relationship id {}",
                worksheet.relationship_id()
            )));
        }
        let index = self.sheets.len();
        self.sheets.push(worksheet);
        Ok(index)
    }

    /// Mark a relationship id as used by a non-sheet part
    pub fn reserve_relationship_id<S: Into<String>>(&mut self, id: S) {
        self.reserved_relationship_ids.insert(id.into());
    }

    /// Relationship ids used by non-sheet parts
    pub fn reserved_relationship_ids(&self) -> impl Iterator<Item = &str> {
        self.reserved_relationship_ids.iter().map(String::as_str)
    }

    /// Record a manifest entry that is not a worksheet
    ///
    /// Its name, sheet id and relationship id stay unavailable to new worksheets.
    pub fn reserve_sheet<S: Into<String>, R: Into<String>>(
        &mut self,
        name: S,
        sheet_id: u32,
        relationship_id: R,
    ) -> Result<()> {
        let name = name.into();
        self.check_unique_name(&name)?;
        if self.sheet_id_in_use(sheet_id) {
            return Err(Error::InternalConsistency(format!(
                "duplicate sheet id {}",
                sheet_id
            )));
        }
        self.reserved_relationship_ids.insert(relationship_id.into());
        self.reserved_sheets.push(ReservedSheet { name, sheet_id });
        Ok(())
    }

    /// Manifest entries that are not worksheets
    pub fn reserved_sheets(&self) -> &[ReservedSheet] {
        &self.reserved_sheets
    }

    fn sheet_id_in_use(&self, sheet_id: u32) -> bool {
        self.sheets.iter().any(|ws| ws.sheet_id() == sheet_id)
            || self.reserved_sheets.iter().any(|s| s.sheet_id == sheet_id)
    }

    fn relationship_id_in_use(&self, id: &str) -> bool {
        self.reserved_relationship_ids.contains(id)
            || self.sheets.iter().any(|ws| ws.relationship_id() == id)
    }

    fn next_relationship_id(&self) -> String {
        let mut n = 1;
        loop {
            let id = format!("rId{}", n);
            if !self.relationship_id_in_use(&id) {
                return id;
            }
            n += 1;
        }
    }

    /// Validate a name for a new sheet
    fn validate_sheet_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidSheetName("Sheet name cannot be empty".into()));
        }
        if name.chars().count() > MAX_SHEET_NAME_LEN {
            return Err(Error::InvalidSheetName(format!(
                "Sheet name too long (max {} characters)",
                MAX_SHEET_NAME_LEN
            )));
        }
        if let Some(c) = name.chars().find(|c| INVALID_SHEET_NAME_CHARS.contains(c)) {
            return Err(Error::InvalidSheetName(format!(
                "Sheet name cannot contain '{}'",
                c
            )));
        }
        if name.starts_with(char::is_whitespace) || name.ends_with(char::is_whitespace) {
            return Err(Error::InvalidSheetName(format!(
                "Sheet name '{}' has leading or trailing whitespace",
                name
            )));
        }
        self.check_unique_name(name)
    }

    /// Check for duplicate names (case-insensitive)
    fn check_unique_name(&self, name: &str) -> Result<()> {
        let name_lower = name.to_lowercase();
        if self
            .sheets
            .iter()
            .map(Worksheet::name)
            .chain(self.reserved_sheets.iter().map(|s| s.name.as_str()))
            .any(|n| n.to_lowercase() == name_lower)
        {
            return Err(Error::DuplicateSheetName(name.into()));
        }
        Ok(())
    }

    fn require_sheet(&self, name: &str) -> Result<usize> {
        self.sheet_index(name)
            .ok_or_else(|| Error::SheetNotFound(name.to_string()))
    }

    // ==================== Cells ====================

    /// Find the cell at `address` in sheet `sheet`
    ///
    /// Never fails for a valid address: the handle is created on first lookup and the
    /// same handle is returned afterwards. An address naming another sheet is rejected.
    ///
    /// `sheet` must match a sheet name exactly. Names are unique case-insensitively when
    /// sheets are added, but lookups are case-sensitive: `"sheet1"` does not find `Sheet1`.
    pub fn find_cell(&mut self, sheet: &str, address: &str) -> Result<CellId> {
        let index = self.require_sheet(sheet)?;
        let coordinate = CellCoordinate::parse_in_sheet(address, sheet)?;
        Ok(self.find_in(index, &coordinate))
    }

    /// Find a cell from a sheet-qualified reference such as `Sheet 1!B2`
    pub fn find_cell_by_reference(&mut self, reference: &str) -> Result<CellId> {
        let coordinate = CellCoordinate::parse(reference)?;
        let sheet = coordinate
            .sheet_name()
            .ok_or_else(|| Error::UnqualifiedReference(reference.to_string()))?;
        let index = self.require_sheet(sheet)?;
        Ok(self.find_in(index, &coordinate))
    }

    fn find_in(&mut self, sheet: usize, coordinate: &CellCoordinate) -> CellId {
        let slot = self.sheets[sheet].find_slot(coordinate);
        CellId { sheet, slot }
    }

    /// Read a cell
    pub fn cell(&self, id: CellId) -> Option<CellRef> {
        let ws = self.sheets.get(id.sheet)?;
        let coordinate = ws.slot(id.slot)?.coordinate();
        let node = ws.data().get(coordinate.col(), coordinate.row());
        let content = node.and_then(|n| n.content.as_ref());

        Some(CellRef {
            coordinate: coordinate.clone().with_sheet(ws.name()),
            kind: content.map_or(CellKind::Empty, CellContent::kind),
            value: content
                .map(|c| c.decode(|i| self.strings.lookup(i)))
                .unwrap_or_default(),
            shared_string_index: content.and_then(CellContent::shared_string_index),
            style: node.and_then(|n| n.style),
            persisted: node.is_some(),
        })
    }

    /// Read a cell's typed value
    pub fn cell_value(&self, id: CellId) -> Option<CellValue> {
        self.cell(id).map(|c| c.value)
    }

    /// Write a value to a cell
    ///
    /// Any persisted node is detached first, releasing its pool entry. An empty value
    /// (including an empty string) leaves the cell empty. A rewritten cell keeps its
    /// style index; its formula is dropped.
    pub fn set_cell_value<V: Into<CellValue>>(&mut self, id: CellId, value: V) -> Result<()> {
        let value = value.into();
        value.validate()?;
        let scalar = CellContent::from_scalar(&value);

        let ws = self
            .sheets
            .get(id.sheet)
            .ok_or_else(|| Error::InternalConsistency(format!("no sheet at {}", id.sheet)))?;
        let slot = ws
            .slot(id.slot)
            .ok_or_else(|| Error::InternalConsistency(format!("no cell handle {}", id.slot)))?;
        let (col, row) = (slot.coordinate().col(), slot.coordinate().row());
        let persisted = ws.data().contains(col, row);
        if slot.is_attached() != persisted {
            return Err(Error::InternalConsistency(format!(
                "cell {}!{} handle and storage disagree",
                ws.name(),
                slot.reference()
            )));
        }

        let mut style = None;
        if persisted {
            let old = ws.data().get(col, row).and_then(CellNode::shared_string_index);
            if let Some(index) = old {
                self.strings.release(index, self.sheets.as_mut_slice());
            }
            let (data, cache) = self.sheets[id.sheet].parts_mut();
            style = data.remove(col, row).and_then(|node| node.style);
            cache.set_attached(id.slot, false);
        }

        if value.is_empty() {
            return Ok(());
        }

        let content = match (value, scalar) {
            (_, Some(content)) => content,
            (CellValue::String(text), None) => CellContent::SharedString(self.strings.insert(&text)),
            (other, None) => {
                return Err(Error::InternalConsistency(format!(
                    "no encoding for {} value",
                    other.kind().name()
                )))
            }
        };
        let (data, cache) = self.sheets[id.sheet].parts_mut();
        data.insert(col, row, CellNode::with_style(content, style))?;
        cache.set_attached(id.slot, true);
        Ok(())
    }

    /// Find a cell by address and write a value to it
    pub fn set_cell<V: Into<CellValue>>(
        &mut self,
        sheet: &str,
        address: &str,
        value: V,
    ) -> Result<CellId> {
        let id = self.find_cell(sheet, address)?;
        self.set_cell_value(id, value)?;
        Ok(id)
    }

    /// Clear a cell, removing its persisted node
    pub fn clear_cell(&mut self, id: CellId) -> Result<()> {
        self.set_cell_value(id, CellValue::Empty)
    }

    // ==================== Ranges ====================

    /// Build a view over `range` in sheet `sheet`
    pub fn range(&mut self, sheet: &str, range: &str) -> Result<RangeView> {
        let index = self.require_sheet(sheet)?;
        let bounds = CellRangeSpec::parse_in_sheet(range, sheet)?;
        Ok(self.build_range(index, bounds))
    }

    /// Build a view from a sheet-qualified range such as `Sheet 1!$A$3:$C$7`
    pub fn range_by_reference(&mut self, reference: &str) -> Result<RangeView> {
        let bounds = CellRangeSpec::parse(reference)?;
        let sheet = bounds
            .sheet_name()
            .ok_or_else(|| Error::UnqualifiedReference(reference.to_string()))?;
        let index = self.require_sheet(sheet)?;
        Ok(self.build_range(index, bounds))
    }

    fn build_range(&mut self, sheet: usize, bounds: CellRangeSpec) -> RangeView {
        let height = bounds.height() as usize;
        let mut columns = Vec::with_capacity(bounds.width() as usize);
        let mut column = Vec::with_capacity(height);
        for coordinate in bounds.coordinates() {
            column.push(self.find_in(sheet, &coordinate));
            if column.len() == height {
                columns.push(std::mem::replace(&mut column, Vec::with_capacity(height)));
            }
        }
        RangeView::new(bounds, columns)
    }

    /// Values of a view, column by column
    pub fn range_values(&self, view: &RangeView) -> Vec<Vec<CellValue>> {
        view.columns()
            .iter()
            .map(|column| {
                column
                    .iter()
                    .map(|&id| self.cell_value(id).unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    /// Values of a single-row or single-column view
    pub fn vector_values(&self, view: &RangeView) -> Result<Vec<CellValue>> {
        Ok(view
            .vector()?
            .into_iter()
            .map(|id| self.cell_value(id).unwrap_or_default())
            .collect())
    }

    /// Snapshot the text of every non-empty cell of a vector view
    pub fn string_cache(&self, view: &RangeView) -> Result<ValueCache> {
        let values = self.vector_values(view)?;
        let points = values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_empty())
            .map(|(index, v)| CachePoint {
                index,
                value: v.to_string(),
            })
            .collect();
        Ok(ValueCache {
            kind: CacheKind::String,
            format_code: None,
            point_count: values.len(),
            points,
        })
    }

    /// Snapshot the numeric cells of a vector view
    ///
    /// `format_code` defaults to `General`.
    pub fn number_cache(&self, view: &RangeView, format_code: Option<&str>) -> Result<ValueCache> {
        let values = self.vector_values(view)?;
        let points = values
            .iter()
            .enumerate()
            .filter_map(|(index, v)| {
                v.as_number().map(|n| CachePoint {
                    index,
                    value: n.to_string(),
                })
            })
            .collect();
        Ok(ValueCache {
            kind: CacheKind::Number,
            format_code: Some(format_code.unwrap_or(DEFAULT_FORMAT_CODE).to_string()),
            point_count: values.len(),
            points,
        })
    }

    // ==================== Shared strings ====================

    /// The document-wide string pool
    pub fn shared_strings(&self) -> &StringPool {
        &self.strings
    }

    /// Pool indices no cell references
    pub fn unreferenced_strings(&self) -> Vec<usize> {
        self.strings.unreferenced(self.sheets.as_slice())
    }

    /// Remove unreferenced pool entries, returning their text
    pub fn purge_unreferenced_strings(&mut self) -> Vec<String> {
        let removed = self.strings.purge_unreferenced(self.sheets.as_mut_slice());
        if !removed.is_empty() {
            debug!("purged {} unreferenced shared strings", removed.len());
        }
        removed
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::SheetData;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn pool_entries(wb: &Workbook) -> Vec<String> {
        wb.shared_strings().iter().map(|(_, s)| s.to_string()).collect()
    }

    #[test]
    fn test_new_workbook() {
        let wb = Workbook::new();
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.sheet_names(), vec!["Sheet1"]);
        assert_eq!(wb.worksheet(0).unwrap().sheet_id(), 1);
        assert_eq!(wb.worksheet(0).unwrap().relationship_id(), "rId1");
    }

    #[test]
    fn test_add_worksheets() {
        let mut wb = Workbook::new();
        wb.reserve_relationship_id("rId2");

        let idx = wb.add_worksheet("Data").unwrap();
        assert_eq!(idx, 1);
        let ws = wb.worksheet(1).unwrap();
        assert_eq!(ws.sheet_id(), 2);
        assert_eq!(ws.relationship_id(), "rId3");
    }

    #[test]
    fn test_reserved_sheets_are_avoided() {
        let mut wb = Workbook::new();
        wb.reserve_sheet("Chart1", 7, "rId2").unwrap();

        assert!(matches!(
            wb.add_worksheet("chart1"),
            Err(Error::DuplicateSheetName(_))
        ));
        let idx = wb.add_worksheet("Data").unwrap();
        let ws = wb.worksheet(idx).unwrap();
        assert_eq!(ws.sheet_id(), 8);
        assert_eq!(ws.relationship_id(), "rId3");
        assert!(wb.reserve_sheet("Chart2", 8, "rId9").is_err());
    }

    #[test]
    fn test_duplicate_name() {
        let mut wb = Workbook::new();
        assert_eq!(
            wb.add_worksheet("SHEET1"),
            Err(Error::DuplicateSheetName("SHEET1".into()))
        );
        assert!(wb.add_worksheet("sheet1").is_err());
    }

    #[test]
    fn test_invalid_sheet_name() {
        let mut wb = Workbook::new();
        for name in ["", "Sheet/1", "Sheet:1", "Sheet[1]", "Bang!", " lead", "trail "] {
            assert!(
                matches!(wb.add_worksheet(name), Err(Error::InvalidSheetName(_))),
                "{:?}",
                name
            );
        }
        let long_name = "A".repeat(MAX_SHEET_NAME_LEN + 1);
        assert!(wb.add_worksheet(&long_name).is_err());
        assert!(wb.add_worksheet(&"A".repeat(MAX_SHEET_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_find_cell_returns_same_handle() {
        let mut wb = Workbook::new();
        let a = wb.find_cell("Sheet1", "B2").unwrap();
        let b = wb.find_cell("Sheet1", "$B$2").unwrap();
        let c = wb.find_cell_by_reference("Sheet1!B2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);

        wb.set_cell_value(a, "through a").unwrap();
        assert_eq!(wb.cell(c).unwrap().text(), "through a");
    }

    #[test]
    fn test_sheet_lookup_is_case_sensitive() {
        let mut wb = Workbook::new();
        assert_eq!(
            wb.find_cell("sheet1", "A1"),
            Err(Error::SheetNotFound("sheet1".into()))
        );
        assert!(matches!(
            wb.find_cell_by_reference("SHEET1!A1"),
            Err(Error::SheetNotFound(_))
        ));
        assert_eq!(
            wb.add_worksheet("sheet1"),
            Err(Error::DuplicateSheetName("sheet1".into()))
        );
        assert!(wb.find_cell("Sheet1", "A1").is_ok());
    }

    #[test]
    fn test_find_cell_errors() {
        let mut wb = Workbook::new();
        assert_eq!(
            wb.find_cell("Missing", "A1"),
            Err(Error::SheetNotFound("Missing".into()))
        );
        assert!(matches!(
            wb.find_cell("Sheet1", "Other!A1"),
            Err(Error::AmbiguousSheet { .. })
        ));
        assert!(matches!(
            wb.find_cell_by_reference("A1"),
            Err(Error::UnqualifiedReference(_))
        ));
        assert!(matches!(
            wb.find_cell("Sheet1", "A0"),
            Err(Error::AddressSyntax(_))
        ));
    }

    #[test]
    fn test_empty_cell_is_addressable() {
        let mut wb = Workbook::new();
        let id = wb.find_cell("Sheet1", "Z9").unwrap();
        let cell = wb.cell(id).unwrap();
        assert_eq!(cell.kind(), CellKind::Empty);
        assert_eq!(cell.value(), &CellValue::Empty);
        assert!(!cell.is_persisted());
        assert_eq!(cell.coordinate().to_string(), "Sheet1!Z9");
        assert!(wb.worksheet(0).unwrap().data().is_empty());
    }

    #[test]
    fn test_typed_values() {
        let mut wb = Workbook::new();
        let date = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();

        let n = wb.set_cell("Sheet1", "A1", 12.5).unwrap();
        let d = wb.set_cell("Sheet1", "A2", date).unwrap();
        let b = wb.set_cell("Sheet1", "A3", true).unwrap();

        assert_eq!(wb.cell(n).unwrap().kind(), CellKind::Number);
        assert_eq!(wb.cell_value(n), Some(CellValue::Number(12.5)));
        assert_eq!(wb.cell(d).unwrap().kind(), CellKind::Date);
        assert_eq!(wb.cell(d).unwrap().text(), "2021-03-04T12:30:00");
        assert_eq!(wb.cell_value(b), Some(CellValue::Boolean(true)));
        assert!(wb.shared_strings().is_empty());
    }

    #[test]
    fn test_error_literal_is_not_writable() {
        let mut wb = Workbook::new();
        let id = wb.set_cell("Sheet1", "A1", "keep").unwrap();
        assert_eq!(
            wb.set_cell_value(id, CellValue::Error("#REF!".into())),
            Err(Error::UnsupportedValue("error"))
        );
        assert_eq!(wb.cell(id).unwrap().text(), "keep");
        assert_eq!(pool_entries(&wb), vec!["keep"]);
    }

    #[test]
    fn test_node_behind_detached_handle_aborts_write() {
        let mut wb = Workbook::new();
        let a1 = wb.set_cell("Sheet1", "A1", "first").unwrap();
        wb.set_cell("Sheet1", "C1", "second").unwrap();
        let b1 = wb.find_cell("Sheet1", "B1").unwrap();

        // Storage gains a node the handle does not know about
        let (data, _) = wb.sheets[0].parts_mut();
        data.insert(1, 0, CellNode::new(CellContent::SharedString(0)))
            .unwrap();
        let data_before = wb.worksheet(0).unwrap().data().clone();

        assert!(matches!(
            wb.set_cell_value(b1, "third"),
            Err(Error::InternalConsistency(_))
        ));
        assert!(matches!(
            wb.clear_cell(b1),
            Err(Error::InternalConsistency(_))
        ));
        assert_eq!(pool_entries(&wb), vec!["first", "second"]);
        assert_eq!(wb.worksheet(0).unwrap().data(), &data_before);
        assert_eq!(wb.cell(a1).unwrap().shared_string_index(), Some(0));
    }

    #[test]
    fn test_missing_node_under_attached_handle_aborts_write() {
        let mut wb = Workbook::new();
        let a1 = wb.set_cell("Sheet1", "A1", "first").unwrap();
        let b1 = wb.set_cell("Sheet1", "B1", "second").unwrap();

        // The node disappears while the handle still counts as attached
        let (data, _) = wb.sheets[0].parts_mut();
        data.remove(0, 0);
        let data_before = wb.worksheet(0).unwrap().data().clone();

        assert!(matches!(
            wb.set_cell_value(a1, "replacement"),
            Err(Error::InternalConsistency(_))
        ));
        assert_eq!(pool_entries(&wb), vec!["first", "second"]);
        assert_eq!(wb.worksheet(0).unwrap().data(), &data_before);
        assert_eq!(wb.cell(b1).unwrap().shared_string_index(), Some(1));
        assert_eq!(wb.cell(b1).unwrap().text(), "second");
    }

    #[test]
    fn test_invalid_number_leaves_cell_untouched() {
        let mut wb = Workbook::new();
        let id = wb.set_cell("Sheet1", "A1", "keep").unwrap();
        assert_eq!(
            wb.set_cell_value(id, f64::NAN).map_err(|e| e.to_string()),
            Err("Cannot store non-finite number NaN".to_string())
        );
        assert_eq!(wb.cell(id).unwrap().text(), "keep");
        assert_eq!(pool_entries(&wb), vec!["keep"]);
    }

    #[test]
    fn test_shared_string_reference_counting() {
        let mut wb = Workbook::new();
        let b2 = wb.set_cell("Sheet1", "B2", "I am a cell").unwrap();
        let c3 = wb.set_cell("Sheet1", "C3", "I am a cell").unwrap();
        assert_eq!(pool_entries(&wb), vec!["I am a cell"]);

        wb.clear_cell(b2).unwrap();
        assert_eq!(pool_entries(&wb), vec!["I am a cell"]);
        assert_eq!(wb.cell(c3).unwrap().text(), "I am a cell");

        wb.clear_cell(c3).unwrap();
        assert!(pool_entries(&wb).is_empty());
    }

    #[test]
    fn test_compaction_shifts_higher_indices() {
        let mut wb = Workbook::new();
        wb.add_worksheet("Other").unwrap();
        let b2 = wb.set_cell("Sheet1", "B2", "X").unwrap();
        let c3 = wb.set_cell("Sheet1", "C3", "Y").unwrap();
        let d4 = wb.set_cell("Sheet1", "D4", "X").unwrap();
        let z = wb.set_cell("Other", "A1", "Z").unwrap();
        assert_eq!(pool_entries(&wb), vec!["X", "Y", "Z"]);

        wb.clear_cell(c3).unwrap();

        assert_eq!(pool_entries(&wb), vec!["X", "Z"]);
        assert_eq!(wb.cell(b2).unwrap().shared_string_index(), Some(0));
        assert_eq!(wb.cell(d4).unwrap().shared_string_index(), Some(0));
        assert_eq!(wb.cell(d4).unwrap().text(), "X");
        assert_eq!(wb.cell(z).unwrap().shared_string_index(), Some(1));
        assert_eq!(wb.cell(z).unwrap().text(), "Z");
    }

    #[test]
    fn test_rewrite_releases_before_insert() {
        let mut wb = Workbook::new();
        let a1 = wb.set_cell("Sheet1", "A1", "only").unwrap();
        let a2 = wb.set_cell("Sheet1", "A2", "later").unwrap();

        // Same text: released and removed, then appended again at the end
        wb.set_cell_value(a1, "only").unwrap();
        assert_eq!(pool_entries(&wb), vec!["later", "only"]);
        assert_eq!(wb.cell(a1).unwrap().shared_string_index(), Some(1));
        assert_eq!(wb.cell(a2).unwrap().shared_string_index(), Some(0));

        wb.set_cell_value(a1, 3.0).unwrap();
        assert_eq!(pool_entries(&wb), vec!["later"]);
        assert_eq!(wb.cell(a1).unwrap().kind(), CellKind::Number);
    }

    #[test]
    fn test_empty_string_clears() {
        let mut wb = Workbook::new();
        let id = wb.set_cell("Sheet1", "A1", "gone").unwrap();
        wb.set_cell_value(id, "").unwrap();
        assert!(!wb.cell(id).unwrap().is_persisted());
        assert!(wb.shared_strings().is_empty());
        assert!(wb.worksheet(0).unwrap().data().is_empty());

        // Clearing an empty cell is a no-op
        wb.clear_cell(id).unwrap();
    }

    #[test]
    fn test_rewrite_keeps_style() {
        let mut data = SheetData::new();
        data.insert(
            0,
            0,
            CellNode::with_style(CellContent::Number("1".into()), Some(4)),
        )
        .unwrap();
        let sheet = Worksheet::with_data("Sheet1", 1, "rId1", data);
        let mut wb = Workbook::from_parts(vec![sheet], StringPool::new(), Vec::new()).unwrap();

        let id = wb.set_cell("Sheet1", "A1", "styled").unwrap();
        let cell = wb.cell(id).unwrap();
        assert_eq!(cell.style(), Some(4));
        assert_eq!(cell.text(), "styled");
    }

    #[test]
    fn test_from_parts_rejects_duplicates() {
        let sheets = vec![
            Worksheet::new("A", 1, "rId1"),
            Worksheet::new("a", 2, "rId2"),
        ];
        assert!(matches!(
            Workbook::from_parts(sheets, StringPool::new(), Vec::new()),
            Err(Error::DuplicateSheetName(_))
        ));

        let sheets = vec![Worksheet::new("A", 1, "rId1")];
        assert!(matches!(
            Workbook::from_parts(sheets, StringPool::new(), vec!["rId1".to_string()]),
            Err(Error::InternalConsistency(_))
        ));
    }

    #[test]
    fn test_range_view() {
        let mut wb = Workbook::new();
        wb.set_cell("Sheet1", "A1", "a").unwrap();
        wb.set_cell("Sheet1", "B2", 2.0).unwrap();

        let view = wb.range("Sheet1", "$A$1:$B$2").unwrap();
        assert_eq!((view.width(), view.height()), (2, 2));
        assert_eq!(view.range().to_string(), "Sheet1!A1:B2");
        assert_eq!(
            wb.range_values(&view),
            vec![
                vec![CellValue::string("a"), CellValue::Empty],
                vec![CellValue::Empty, CellValue::Number(2.0)],
            ]
        );
        assert!(matches!(
            wb.vector_values(&view),
            Err(Error::NotAVector(_))
        ));

        // Handles in a view are the same ones `find_cell` returns
        let b2 = wb.find_cell("Sheet1", "B2").unwrap();
        assert_eq!(view.cell(1, 1), Some(b2));
    }

    #[test]
    fn test_range_rows_are_bounded() {
        let mut wb = Workbook::new();
        let last = wb.range("Sheet1", "A1048576").unwrap();
        assert_eq!(last.range().to_string(), "Sheet1!A1048576");
        let tail = wb.range("Sheet1", "A1048570:B1048576").unwrap();
        assert_eq!((tail.width(), tail.height()), (2, 7));

        for text in ["A1048577", "A1:A1048577", "A1:A4294967295"] {
            assert!(
                matches!(wb.range("Sheet1", text), Err(Error::AddressSyntax(_))),
                "{:?}",
                text
            );
        }
        assert!(matches!(
            wb.set_cell("Sheet1", "A2000000", "x"),
            Err(Error::AddressSyntax(_))
        ));
        assert!(wb.shared_strings().is_empty());
    }

    #[test]
    fn test_range_errors() {
        let mut wb = Workbook::new();
        assert!(matches!(
            wb.range("Sheet1", "C7:A3"),
            Err(Error::AddressRange(_))
        ));
        assert!(matches!(
            wb.range_by_reference("A1:B2"),
            Err(Error::UnqualifiedReference(_))
        ));
        assert!(matches!(
            wb.range_by_reference("Nope!A1:B2"),
            Err(Error::SheetNotFound(_))
        ));
    }

    #[test]
    fn test_value_caches() {
        let mut wb = Workbook::new();
        wb.add_worksheet("Sheet 1").unwrap();
        wb.set_cell("Sheet 1", "B1", "North").unwrap();
        wb.set_cell("Sheet 1", "B3", "South").unwrap();
        wb.set_cell("Sheet 1", "C1", 10.0).unwrap();
        wb.set_cell("Sheet 1", "C2", "n/a").unwrap();
        wb.set_cell("Sheet 1", "C3", 2.5).unwrap();

        let categories = wb.range_by_reference("Sheet 1!$B$1:$B$3").unwrap();
        let cache = wb.string_cache(&categories).unwrap();
        assert_eq!(cache.kind, CacheKind::String);
        assert_eq!(cache.point_count, 3);
        assert_eq!(
            cache.points,
            vec![
                CachePoint { index: 0, value: "North".into() },
                CachePoint { index: 2, value: "South".into() },
            ]
        );

        let values = wb.range_by_reference("Sheet 1!C1:C3").unwrap();
        let cache = wb.number_cache(&values, None).unwrap();
        assert_eq!(cache.format_code.as_deref(), Some("General"));
        assert_eq!(cache.point_count, 3);
        assert_eq!(
            cache.points,
            vec![
                CachePoint { index: 0, value: "10".into() },
                CachePoint { index: 2, value: "2.5".into() },
            ]
        );

        let grid = wb.range_by_reference("Sheet 1!B1:C3").unwrap();
        assert!(wb.number_cache(&grid, Some("0.0%")).is_err());
    }

    #[test]
    fn test_purge_unreferenced_strings() {
        let mut data = SheetData::new();
        data.insert(0, 0, CellNode::new(CellContent::SharedString(2)))
            .unwrap();
        let sheet = Worksheet::with_data("Sheet1", 1, "rId1", data);
        let strings = StringPool::from_entries(["stale", "old", "used"]);
        let mut wb = Workbook::from_parts(vec![sheet], strings, Vec::new()).unwrap();

        assert_eq!(wb.unreferenced_strings(), vec![0, 1]);
        assert_eq!(wb.purge_unreferenced_strings(), vec!["stale", "old"]);
        let a1 = wb.find_cell("Sheet1", "A1").unwrap();
        assert_eq!(wb.cell(a1).unwrap().shared_string_index(), Some(0));
        assert_eq!(wb.cell(a1).unwrap().text(), "used");
    }
}
