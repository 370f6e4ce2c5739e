//! Cell address and range types
//!
//! Addresses follow the spreadsheet reference grammar:
//!
//! ```text
//! [Sheet name!] [$] COL [$] ROW [ : [$] COL [$] ROW ]
//! ```
//!
//! `COL` is one or two upper-case letters (`A`..`ZZ`), `ROW` is a 1-based row number
//! up to 1048576 without leading zeros. `$` markers are accepted and dropped; they carry
//! no meaning here.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Largest column index reachable with two letters (`ZZ`)
pub const MAX_COLUMN_INDEX: u16 = 701;

/// Largest 1-based row number a worksheet can hold
pub const MAX_ROW_NUMBER: u32 = 1_048_576;

/// Convert column letters to a 0-based index (`A` = 0, `Z` = 25, `AA` = 26, `ZZ` = 701)
pub fn column_index(letters: &str) -> Result<u16> {
    let bytes = letters.as_bytes();
    if bytes.is_empty() || bytes.len() > 2 || !bytes.iter().all(u8::is_ascii_uppercase) {
        return Err(Error::AddressSyntax(format!(
            "column '{}' should be one or two upper-case letters",
            letters
        )));
    }

    let last = u16::from(bytes[bytes.len() - 1] - b'A');
    if bytes.len() == 2 {
        Ok(26 * (u16::from(bytes[0] - b'A') + 1) + last)
    } else {
        Ok(last)
    }
}

/// Convert a 0-based column index to its one- or two-letter name
pub fn column_letters(index: u16) -> Result<String> {
    if index > MAX_COLUMN_INDEX {
        return Err(Error::ColumnOutOfRange(u32::from(index)));
    }
    let mut letters = String::with_capacity(2);
    push_column_letters(&mut letters, index);
    Ok(letters)
}

fn push_column_letters(out: &mut String, index: u16) {
    debug_assert!(index <= MAX_COLUMN_INDEX);
    if index >= 26 {
        out.push(char::from(b'A' + (index / 26 - 1) as u8));
    }
    out.push(char::from(b'A' + (index % 26) as u8));
}

/// Convert a 1-based row number to a 0-based row index
pub fn row_index(row_number: u32) -> Result<u32> {
    row_number
        .checked_sub(1)
        .ok_or_else(|| Error::AddressSyntax("row number must be >= 1".into()))
}

/// Convert a 0-based row index to the 1-based row number
pub fn row_number(row_index: u32) -> Result<u32> {
    row_index
        .checked_add(1)
        .ok_or(Error::RowOutOfRange(row_index))
}

/// A single cell location, optionally qualified by sheet name
///
/// Coordinates are immutable: they are only built from validated text or validated indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellCoordinate {
    sheet: Option<String>,
    col: u16,
    row: u32,
}

impl CellCoordinate {
    /// Create an unqualified coordinate from 0-based indices
    pub fn new(col: u16, row: u32) -> Result<Self> {
        if col > MAX_COLUMN_INDEX {
            return Err(Error::ColumnOutOfRange(u32::from(col)));
        }
        if row >= MAX_ROW_NUMBER {
            return Err(Error::RowOutOfRange(row));
        }
        Ok(Self {
            sheet: None,
            col,
            row,
        })
    }

    /// Parse a single cell reference such as `AA23` or `Sheet 1!$B$2`
    ///
    /// # Examples
    /// ```
    /// use xlcells_core::CellCoordinate;
    ///
    /// let coord = CellCoordinate::parse("AA23").unwrap();
    /// assert_eq!(coord.col(), 26);
    /// assert_eq!(coord.row(), 22);
    ///
    /// let coord = CellCoordinate::parse("Sheet 1!$B$2").unwrap();
    /// assert_eq!(coord.sheet_name(), Some("Sheet 1"));
    /// assert_eq!(coord.to_a1_string(), "B2");
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let parsed = ParsedReference::parse(text)?;
        if parsed.end.is_some() {
            return Err(Error::AddressSyntax(format!(
                "expected a single cell but found a range in '{}'",
                text
            )));
        }
        Ok(parsed.start.into_coordinate(parsed.sheet))
    }

    /// Parse a cell reference that must belong to `sheet`
    ///
    /// An unqualified reference takes the sheet name; a reference naming another
    /// sheet fails with [`Error::AmbiguousSheet`].
    pub fn parse_in_sheet(text: &str, sheet: &str) -> Result<Self> {
        let coord = Self::parse(text)?;
        let sheet = resolve_sheet(coord.sheet.as_deref(), sheet)?;
        Ok(coord.with_sheet(sheet))
    }

    /// Return this coordinate qualified by `sheet`
    pub fn with_sheet<S: Into<String>>(self, sheet: S) -> Self {
        Self {
            sheet: Some(sheet.into()),
            ..self
        }
    }

    /// Return this coordinate without a sheet qualifier
    pub fn unqualified(self) -> Self {
        Self {
            sheet: None,
            ..self
        }
    }

    /// The sheet name, if the coordinate is qualified
    pub fn sheet_name(&self) -> Option<&str> {
        self.sheet.as_deref()
    }

    /// 0-based column index
    pub fn col(&self) -> u16 {
        self.col
    }

    /// 0-based row index
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Column letters (`A`..`ZZ`)
    pub fn column_letters(&self) -> String {
        let mut letters = String::with_capacity(2);
        push_column_letters(&mut letters, self.col);
        letters
    }

    /// 1-based row number
    pub fn row_number(&self) -> u32 {
        // `new` and the parser both cap rows at MAX_ROW_NUMBER
        self.row + 1
    }

    /// Canonical A1-style address without sheet name or `$` markers
    pub fn to_a1_string(&self) -> String {
        let mut result = String::with_capacity(8);
        push_column_letters(&mut result, self.col);
        result.push_str(&self.row_number().to_string());
        result
    }
}

impl fmt::Display for CellCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", sheet)?;
        }
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellCoordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A rectangular range of cells (e.g. `A3:C7`)
///
/// `end` is never left of or above `start`; reversed corners are rejected, not swapped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellRangeSpec {
    start: CellCoordinate,
    end: CellCoordinate,
}

impl CellRangeSpec {
    /// Build a range from two corners
    pub fn new(start: CellCoordinate, end: CellCoordinate) -> Result<Self> {
        if start.sheet != end.sheet {
            return Err(Error::AmbiguousSheet {
                expected: start.sheet.unwrap_or_default(),
                found: end.sheet.unwrap_or_default(),
            });
        }
        if end.col < start.col || end.row < start.row {
            return Err(Error::AddressRange(format!(
                "{}:{} has cell references reversed",
                start.to_a1_string(),
                end.to_a1_string()
            )));
        }
        Ok(Self { start, end })
    }

    /// A range covering one cell
    pub fn single(cell: CellCoordinate) -> Self {
        Self {
            start: cell.clone(),
            end: cell,
        }
    }

    /// Parse a range such as `C3:D7`, `Sheet one!$A$3:$C$7` or a single cell `B2`
    pub fn parse(text: &str) -> Result<Self> {
        let parsed = ParsedReference::parse(text)?;
        let start = parsed.start.into_coordinate(parsed.sheet);
        let end = match parsed.end {
            Some(end) => end.into_coordinate(parsed.sheet),
            None => start.clone(),
        };
        if end.col < start.col || end.row < start.row {
            return Err(Error::AddressRange(format!(
                "{} has cell references reversed",
                text
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a range that must belong to `sheet`
    pub fn parse_in_sheet(text: &str, sheet: &str) -> Result<Self> {
        let range = Self::parse(text)?;
        let sheet = resolve_sheet(range.sheet_name(), sheet)?;
        Ok(range.with_sheet(sheet))
    }

    /// Return this range qualified by `sheet`
    pub fn with_sheet<S: Into<String>>(self, sheet: S) -> Self {
        let sheet = sheet.into();
        Self {
            start: self.start.with_sheet(sheet.clone()),
            end: self.end.with_sheet(sheet),
        }
    }

    /// Top-left corner
    pub fn start(&self) -> &CellCoordinate {
        &self.start
    }

    /// Bottom-right corner
    pub fn end(&self) -> &CellCoordinate {
        &self.end
    }

    /// The sheet name, if the range is qualified
    pub fn sheet_name(&self) -> Option<&str> {
        self.start.sheet_name()
    }

    /// Number of columns spanned
    pub fn width(&self) -> u32 {
        u32::from(self.end.col - self.start.col) + 1
    }

    /// Number of rows spanned
    pub fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    /// Check if the range is a single cell
    pub fn is_cell(&self) -> bool {
        self.is_row_vector() && self.is_column_vector()
    }

    /// Check if the range is one row tall
    pub fn is_row_vector(&self) -> bool {
        self.start.row == self.end.row
    }

    /// Check if the range is one column wide
    pub fn is_column_vector(&self) -> bool {
        self.start.col == self.end.col
    }

    /// Check if the range can be read as a flat sequence
    pub fn is_vector(&self) -> bool {
        self.is_row_vector() || self.is_column_vector()
    }

    /// Check if a cell (ignoring sheet name) lies inside this range
    pub fn contains(&self, cell: &CellCoordinate) -> bool {
        cell.col >= self.start.col
            && cell.col <= self.end.col
            && cell.row >= self.start.row
            && cell.row <= self.end.row
    }

    /// All coordinates in the range, column by column
    pub fn coordinates(&self) -> impl Iterator<Item = CellCoordinate> + '_ {
        (self.start.col..=self.end.col).flat_map(move |col| {
            (self.start.row..=self.end.row).map(move |row| CellCoordinate {
                sheet: self.start.sheet.clone(),
                col,
                row,
            })
        })
    }

    /// Canonical A1-style range without sheet name or `$` markers
    pub fn to_a1_string(&self) -> String {
        if self.start == self.end {
            self.start.to_a1_string()
        } else {
            format!("{}:{}", self.start.to_a1_string(), self.end.to_a1_string())
        }
    }
}

impl fmt::Display for CellRangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = self.sheet_name() {
            write!(f, "{}!", sheet)?;
        }
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellRangeSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn resolve_sheet(found: Option<&str>, expected: &str) -> Result<String> {
    match found {
        Some(found) if found != expected => Err(Error::AmbiguousSheet {
            expected: expected.to_string(),
            found: found.to_string(),
        }),
        _ => Ok(expected.to_string()),
    }
}

#[derive(Debug, Clone, Copy)]
struct Corner {
    col: u16,
    row: u32,
}

impl Corner {
    fn into_coordinate(self, sheet: Option<&str>) -> CellCoordinate {
        CellCoordinate {
            sheet: sheet.map(str::to_string),
            col: self.col,
            row: self.row,
        }
    }
}

/// Raw output of the reference scanner, before range validation
struct ParsedReference<'a> {
    sheet: Option<&'a str>,
    start: Corner,
    end: Option<Corner>,
}

impl<'a> ParsedReference<'a> {
    fn parse(text: &'a str) -> Result<Self> {
        let (sheet, rest) = match text.find('!') {
            Some(bang) => {
                let sheet = &text[..bang];
                if sheet.is_empty() {
                    return Err(Error::AddressSyntax(format!(
                        "empty sheet name in '{}'",
                        text
                    )));
                }
                if sheet.starts_with(char::is_whitespace) || sheet.ends_with(char::is_whitespace)
                {
                    return Err(Error::AddressSyntax(format!(
                        "sheet name has surrounding whitespace in '{}'",
                        text
                    )));
                }
                (Some(sheet), &text[bang + 1..])
            }
            None => (None, text),
        };

        let mut scanner = Scanner {
            source: text,
            text: rest,
            pos: 0,
        };
        let start = scanner.corner()?;
        let end = if scanner.eat(b':') {
            Some(scanner.corner()?)
        } else {
            None
        };
        if let Some(c) = scanner.rest().chars().next() {
            return Err(scanner.error(&format!("unexpected character '{}'", c)));
        }

        Ok(Self { sheet, start, end })
    }
}

/// Byte cursor over the part of a reference after the sheet prefix
struct Scanner<'a> {
    source: &'a str,
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().map_or(false, &pred) {
            self.pos += 1;
        }
        // Only ASCII bytes are consumed, so both ends are char boundaries
        &self.text[start..self.pos]
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn error(&self, msg: &str) -> Error {
        Error::AddressSyntax(format!("{} in '{}'", msg, self.source))
    }

    fn corner(&mut self) -> Result<Corner> {
        self.eat(b'$');
        let letters = self.take_while(|b| b.is_ascii_uppercase());
        if letters.is_empty() {
            return Err(self.error("no column letters"));
        }
        if letters.len() > 2 {
            return Err(self.error("only one- or two-letter columns are supported"));
        }
        let col = column_index(letters)?;

        self.eat(b'$');
        let digits = self.take_while(|b| b.is_ascii_digit());
        if digits.is_empty() {
            return Err(self.error("no row number"));
        }
        if digits.bytes().all(|b| b == b'0') {
            return Err(self.error("row number must be >= 1"));
        }
        if digits.starts_with('0') {
            return Err(self.error("row number has a leading zero"));
        }
        let number = digits
            .parse::<u32>()
            .ok()
            .filter(|&n| n <= MAX_ROW_NUMBER)
            .ok_or_else(|| self.error(&format!("row number above {}", MAX_ROW_NUMBER)))?;
        let row = row_index(number)?;

        Ok(Corner { col, row })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A").unwrap(), 0);
        assert_eq!(column_index("Z").unwrap(), 25);
        assert_eq!(column_index("AA").unwrap(), 26);
        assert_eq!(column_index("FF").unwrap(), 161);
        assert_eq!(column_index("ZZ").unwrap(), 701);

        assert!(column_index("").is_err());
        assert!(column_index("a").is_err());
        assert!(column_index("AAA").is_err());
        assert!(column_index("A1").is_err());
    }

    #[test]
    fn test_column_letters_round_trip_all_columns() {
        for index in 0..=MAX_COLUMN_INDEX {
            let letters = column_letters(index).unwrap();
            assert_eq!(column_index(&letters).unwrap(), index, "column {}", letters);
        }
        assert_eq!(column_letters(26).unwrap(), "AA");
        assert_eq!(column_letters(701).unwrap(), "ZZ");
        assert_eq!(column_letters(702), Err(Error::ColumnOutOfRange(702)));
    }

    #[test]
    fn test_row_conversion() {
        assert_eq!(row_index(1).unwrap(), 0);
        assert_eq!(row_index(999).unwrap(), 998);
        assert!(matches!(row_index(0), Err(Error::AddressSyntax(_))));
        assert_eq!(row_number(0).unwrap(), 1);
        assert_eq!(row_number(u32::MAX), Err(Error::RowOutOfRange(u32::MAX)));
    }

    #[test]
    fn test_parse_cell() {
        let coord = CellCoordinate::parse("A1").unwrap();
        assert_eq!((coord.col(), coord.row()), (0, 0));
        assert_eq!(coord.sheet_name(), None);

        let coord = CellCoordinate::parse("AA23").unwrap();
        assert_eq!((coord.col(), coord.row()), (26, 22));

        let coord = CellCoordinate::parse("ZZ999").unwrap();
        assert_eq!((coord.col(), coord.row()), (701, 998));

        let coord = CellCoordinate::parse("$B$2").unwrap();
        assert_eq!(coord.to_a1_string(), "B2");

        let coord = CellCoordinate::parse("B$2").unwrap();
        assert_eq!(coord.to_a1_string(), "B2");

        let coord = CellCoordinate::parse("Sheet 1!FF333").unwrap();
        assert_eq!(coord.sheet_name(), Some("Sheet 1"));
        assert_eq!(coord.column_letters(), "FF");
        assert_eq!(coord.row_number(), 333);
        assert_eq!(coord.to_string(), "Sheet 1!FF333");
    }

    #[test]
    fn test_parse_cell_errors() {
        for text in [
            "", "A", "1", "A0", "A01", "a1", "AAA1", "A1B", "A-1", "!A1", " S!A1", "S !A1",
            "S!T!A1", "A1:B2", "$$A1", "A99999999999",
        ] {
            assert!(
                matches!(CellCoordinate::parse(text), Err(Error::AddressSyntax(_))),
                "expected syntax error for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_row_limit() {
        let last = CellCoordinate::parse("A1048576").unwrap();
        assert_eq!(last.row(), 1_048_575);
        assert_eq!(last.row_number(), MAX_ROW_NUMBER);
        assert!(CellCoordinate::parse("$ZZ$1048576").is_ok());

        for text in ["A1048577", "A4294967295", "A4294967296"] {
            assert!(
                matches!(CellCoordinate::parse(text), Err(Error::AddressSyntax(_))),
                "{:?}",
                text
            );
        }
        assert!(matches!(
            CellRangeSpec::parse("A1:A4294967295"),
            Err(Error::AddressSyntax(_))
        ));
        assert!(CellRangeSpec::parse("A1048570:B1048576").is_ok());

        assert!(CellCoordinate::new(0, 1_048_575).is_ok());
        assert_eq!(
            CellCoordinate::new(0, 1_048_576),
            Err(Error::RowOutOfRange(1_048_576))
        );
    }

    #[test]
    fn test_parse_in_sheet() {
        let coord = CellCoordinate::parse_in_sheet("B2", "Sheet1").unwrap();
        assert_eq!(coord.sheet_name(), Some("Sheet1"));

        let coord = CellCoordinate::parse_in_sheet("Sheet1!B2", "Sheet1").unwrap();
        assert_eq!(coord.sheet_name(), Some("Sheet1"));

        let err = CellCoordinate::parse_in_sheet("Other!B2", "Sheet1").unwrap_err();
        assert_eq!(
            err,
            Error::AmbiguousSheet {
                expected: "Sheet1".into(),
                found: "Other".into()
            }
        );
    }

    #[test]
    fn test_parse_range() {
        let range = CellRangeSpec::parse("Sheet one!$A$3:$C$7").unwrap();
        assert_eq!(range.sheet_name(), Some("Sheet one"));
        assert_eq!(range.start().to_a1_string(), "A3");
        assert_eq!(range.end().to_a1_string(), "C7");
        assert_eq!(range.width(), 3);
        assert_eq!(range.height(), 5);
        assert!(!range.is_vector());
        assert_eq!(range.to_string(), "Sheet one!A3:C7");

        let range = CellRangeSpec::parse("A1").unwrap();
        assert!(range.is_cell());
        assert_eq!(range.to_a1_string(), "A1");

        let range = CellRangeSpec::parse("B2:B9").unwrap();
        assert!(range.is_column_vector());
        assert!(!range.is_row_vector());
    }

    #[test]
    fn test_parse_range_errors() {
        assert!(matches!(
            CellRangeSpec::parse("C7:A3"),
            Err(Error::AddressRange(_))
        ));
        assert!(matches!(
            CellRangeSpec::parse("A7:C3"),
            Err(Error::AddressRange(_))
        ));
        assert!(matches!(
            CellRangeSpec::parse("C3:A7"),
            Err(Error::AddressRange(_))
        ));
        assert!(matches!(
            CellRangeSpec::parse("A0"),
            Err(Error::AddressSyntax(_))
        ));
        assert!(matches!(
            CellRangeSpec::parse("A1:"),
            Err(Error::AddressSyntax(_))
        ));
        assert!(matches!(
            CellRangeSpec::parse("A1:B2:C3"),
            Err(Error::AddressSyntax(_))
        ));
    }

    #[test]
    fn test_range_new_rejects_reversed() {
        let a3 = CellCoordinate::parse("A3").unwrap();
        let c7 = CellCoordinate::parse("C7").unwrap();
        assert!(CellRangeSpec::new(a3.clone(), c7.clone()).is_ok());
        assert!(matches!(
            CellRangeSpec::new(c7, a3),
            Err(Error::AddressRange(_))
        ));
    }

    #[test]
    fn test_range_coordinates_are_column_major() {
        let range = CellRangeSpec::parse("A1:B2").unwrap();
        let cells: Vec<String> = range.coordinates().map(|c| c.to_a1_string()).collect();
        assert_eq!(cells, vec!["A1", "A2", "B1", "B2"]);
    }

    proptest! {
        #[test]
        fn row_numbers_round_trip(number in 1u32..=u32::MAX) {
            prop_assert_eq!(row_number(row_index(number).unwrap()).unwrap(), number);
        }

        #[test]
        fn cell_text_round_trips(
            col in 0u16..=MAX_COLUMN_INDEX,
            number in 1u32..=1_048_576,
            col_abs in any::<bool>(),
            row_abs in any::<bool>(),
            sheet in proptest::option::of("[A-Za-z][A-Za-z0-9 ]{0,10}[A-Za-z0-9]"),
        ) {
            let mut text = String::new();
            if let Some(sheet) = &sheet {
                text.push_str(sheet);
                text.push('!');
            }
            if col_abs {
                text.push('$');
            }
            text.push_str(&column_letters(col).unwrap());
            if row_abs {
                text.push('$');
            }
            text.push_str(&number.to_string());

            let coord = CellCoordinate::parse(&text).unwrap();
            prop_assert_eq!(coord.col(), col);
            prop_assert_eq!(coord.row_number(), number);
            prop_assert_eq!(coord.sheet_name(), sheet.as_deref());
            prop_assert_eq!(CellCoordinate::parse(&coord.to_string()).unwrap(), coord);
        }
    }
}
