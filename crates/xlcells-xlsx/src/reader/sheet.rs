//! Worksheet parsing
//!
//! Only `sheetData` is interpreted. The bytes before and after it are kept verbatim
//! in the [`SheetPart`] so the rest of the worksheet survives a save.

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::{attributes, element_prefix};
use crate::error::{XlsxError, XlsxResult};
use crate::escape::decode_excel_escapes;
use crate::package::SheetPart;
use xlcells_core::{CellContent, CellNode, Formula, SheetData};

/// Highest column index a package may use (`XFD`)
const MAX_PACKAGE_COLUMN: u32 = 16_383;

/// Parse a stored cell reference (`B2`, `$AB$10`, `XFD1`) into 0-based `(col, row)`
///
/// Accepts columns beyond `ZZ`, since files may hold them even though they cannot be
/// addressed through the public grammar.
pub(crate) fn parse_cell_reference(reference: &str) -> Option<(u16, u32)> {
    let reference = reference.trim();
    let split = reference
        .trim_start_matches('$')
        .find(|c: char| !c.is_ascii_alphabetic())?;
    let reference = reference.trim_start_matches('$');
    let (letters, digits) = reference.split_at(split);
    let digits = digits.strip_prefix('$').unwrap_or(digits);

    if letters.is_empty() || letters.len() > 3 || digits.is_empty() {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let col = letters
        .bytes()
        .fold(0u32, |acc, b| acc * 26 + u32::from(b.to_ascii_uppercase() - b'A') + 1)
        - 1;
    if col > MAX_PACKAGE_COLUMN {
        return None;
    }
    let row = digits.parse::<u32>().ok()?.checked_sub(1)?;
    Some((col as u16, row))
}

/// Cell being assembled from `<c>` and its children
struct PendingCell {
    position: Option<(u16, u32)>,
    reference: String,
    kind: Option<String>,
    style: Option<u32>,
    value: Option<String>,
    inline: Option<String>,
    formula: Option<Formula>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Value,
    Formula,
    InlineText,
}

/// Parse a worksheet part into persisted rows and the XML around them
pub(crate) fn parse_worksheet(
    bytes: &[u8],
    path: &str,
    pool_len: usize,
) -> XlsxResult<(SheetData, SheetPart)> {
    let mut xml_reader = Reader::from_reader(bytes);

    let mut buf = Vec::new();
    let mut data = SheetData::new();
    let mut head_end = None;
    let mut tail_start = None;
    let mut prefix = String::new();
    let mut in_sheet_data = false;

    let mut current_row: Option<u32> = None;
    let mut last_row: Option<u32> = None;
    let mut next_col: u32 = 0;
    let mut cell: Option<PendingCell> = None;
    let mut field = Field::None;
    let mut in_inline = false;
    let mut phonetic_depth = 0usize;

    loop {
        let before = xml_reader.buffer_position() as usize;
        match xml_reader.read_event_into(&mut buf)? {
            Event::Start(e) if !in_sheet_data && e.local_name().as_ref() == b"sheetData" => {
                if head_end.is_none() {
                    head_end = Some(before);
                    prefix = element_prefix(&e);
                    in_sheet_data = true;
                }
            }
            Event::Empty(e) if !in_sheet_data && e.local_name().as_ref() == b"sheetData" => {
                if head_end.is_none() {
                    head_end = Some(before);
                    tail_start = Some(xml_reader.buffer_position() as usize);
                    prefix = element_prefix(&e);
                }
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"sheetData" => {
                tail_start = Some(xml_reader.buffer_position() as usize);
                in_sheet_data = false;
            }

            Event::Start(e) if in_sheet_data => match e.local_name().as_ref() {
                b"row" => {
                    let row = start_row(&e, last_row, &mut data, path)?;
                    current_row = Some(row);
                    last_row = Some(row);
                    next_col = 0;
                }
                b"c" => cell = Some(start_cell(&e, current_row, &mut next_col, path)?),
                b"v" if cell.is_some() => field = Field::Value,
                b"f" if cell.is_some() => {
                    if let Some(cell) = cell.as_mut() {
                        cell.formula = Some(Formula {
                            text: String::new(),
                            attributes: attributes(&e)?,
                        });
                    }
                    field = Field::Formula;
                }
                b"is" if cell.is_some() => {
                    in_inline = true;
                    if let Some(cell) = cell.as_mut() {
                        cell.inline.get_or_insert_with(String::new);
                    }
                }
                b"rPh" if in_inline => phonetic_depth += 1,
                b"t" if in_inline && phonetic_depth == 0 => field = Field::InlineText,
                _ => {}
            },
            Event::Empty(e) if in_sheet_data => match e.local_name().as_ref() {
                b"row" => {
                    let row = start_row(&e, last_row, &mut data, path)?;
                    current_row = None;
                    last_row = Some(row);
                }
                b"c" => {
                    let pending = start_cell(&e, current_row, &mut next_col, path)?;
                    finish_cell(&mut data, pending, pool_len, path)?;
                }
                b"f" => {
                    if let Some(cell) = cell.as_mut() {
                        cell.formula = Some(Formula {
                            text: String::new(),
                            attributes: attributes(&e)?,
                        });
                    }
                }
                _ => {}
            },
            Event::End(e) if in_sheet_data => match e.local_name().as_ref() {
                b"row" => current_row = None,
                b"c" => {
                    if let Some(pending) = cell.take() {
                        finish_cell(&mut data, pending, pool_len, path)?;
                    }
                    field = Field::None;
                    in_inline = false;
                }
                b"v" | b"f" => field = Field::None,
                b"t" if field == Field::InlineText => field = Field::None,
                b"rPh" if phonetic_depth > 0 => phonetic_depth -= 1,
                b"is" => in_inline = false,
                _ => {}
            },
            Event::Text(e) if field != Field::None => {
                let text = e.unescape()?;
                append_text(cell.as_mut(), field, &text);
            }
            Event::CData(e) if field != Field::None => {
                let bytes = e.into_inner();
                append_text(cell.as_mut(), field, &String::from_utf8_lossy(&bytes));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    match (head_end, tail_start) {
        (Some(head_end), Some(tail_start)) => Ok((
            data,
            SheetPart {
                path: path.to_string(),
                head: bytes[..head_end].to_vec(),
                tail: bytes[tail_start..].to_vec(),
                prefix,
            },
        )),
        _ => Err(XlsxError::InvalidFormat(format!(
            "{} has no sheetData element",
            path
        ))),
    }
}

fn append_text(cell: Option<&mut PendingCell>, field: Field, text: &str) {
    let Some(cell) = cell else { return };
    match field {
        Field::Value => cell.value.get_or_insert_with(String::new).push_str(text),
        Field::Formula => {
            if let Some(formula) = cell.formula.as_mut() {
                formula.text.push_str(text);
            }
        }
        Field::InlineText => cell.inline.get_or_insert_with(String::new).push_str(text),
        Field::None => {}
    }
}

/// Handle `<row>`, returning its 0-based index
fn start_row(
    e: &BytesStart,
    last_row: Option<u32>,
    data: &mut SheetData,
    path: &str,
) -> XlsxResult<u32> {
    let mut number = None;
    let mut attrs = Vec::new();
    for (key, value) in attributes(e)? {
        if key == "r" {
            number = value.trim().parse::<u32>().ok().filter(|&n| n >= 1);
            if number.is_none() {
                warn!("{}: row number {:?} is not valid", path, value);
            }
        } else {
            attrs.push((key, value));
        }
    }

    let row = match number {
        Some(n) => n - 1,
        None => last_row.map_or(0, |r| r.saturating_add(1)),
    };

    let node = data.row_entry(row);
    if !node.is_empty() {
        warn!("{}: row {} appears more than once", path, row + 1);
    }
    if node.attributes.is_empty() {
        node.attributes = attrs;
    }
    Ok(row)
}

/// Handle `<c>` attributes
fn start_cell(
    e: &BytesStart,
    current_row: Option<u32>,
    next_col: &mut u32,
    path: &str,
) -> XlsxResult<PendingCell> {
    let mut reference = None;
    let mut kind = None;
    let mut style = None;
    for (key, value) in attributes(e)? {
        match key.as_str() {
            "r" => reference = Some(value),
            "t" => kind = Some(value),
            "s" => style = value.trim().parse::<u32>().ok(),
            _ => {}
        }
    }

    let position = match &reference {
        Some(r) => {
            let parsed = parse_cell_reference(r);
            if parsed.is_none() {
                warn!("{}: skipping cell with unreadable reference {:?}", path, r);
            }
            parsed
        }
        None => {
            // Implicit position: next column of the current row
            if *next_col > MAX_PACKAGE_COLUMN {
                None
            } else {
                Some((*next_col as u16, current_row.unwrap_or(0)))
            }
        }
    };
    if let Some((col, _)) = position {
        *next_col = u32::from(col) + 1;
    }

    Ok(PendingCell {
        position,
        reference: reference.unwrap_or_default(),
        kind,
        style,
        value: None,
        inline: None,
        formula: None,
    })
}

/// Store a completed cell
fn finish_cell(
    data: &mut SheetData,
    cell: PendingCell,
    pool_len: usize,
    path: &str,
) -> XlsxResult<()> {
    let Some((col, row)) = cell.position else {
        return Ok(());
    };
    if data.contains(col, row) {
        warn!(
            "{}: duplicate cell {:?}; keeping the first",
            path, cell.reference
        );
        return Ok(());
    }

    let content = cell_content(&cell, pool_len, path);
    let node = CellNode {
        content,
        style: cell.style,
        formula: cell.formula,
    };
    data.insert(col, row, node)?;
    Ok(())
}

fn cell_content(cell: &PendingCell, pool_len: usize, path: &str) -> Option<CellContent> {
    let value = cell.value.clone();
    match cell.kind.as_deref().unwrap_or("n") {
        "s" => value.map(|v| match v.trim().parse::<usize>() {
            Ok(index) => {
                if index >= pool_len {
                    warn!(
                        "{}: cell {:?} references shared string {} of {}",
                        path, cell.reference, index, pool_len
                    );
                }
                CellContent::SharedString(index)
            }
            Err(_) => {
                warn!(
                    "{}: cell {:?} has invalid shared string index {:?}",
                    path, cell.reference, v
                );
                CellContent::Text(v)
            }
        }),
        "inlineStr" => cell
            .inline
            .clone()
            .or(value)
            .map(|t| CellContent::Text(decode_excel_escapes(&t))),
        "str" => value.map(CellContent::Text),
        "b" => value.map(|v| {
            let v = v.trim();
            CellContent::Boolean(v == "1" || v.eq_ignore_ascii_case("true"))
        }),
        "e" => value.map(CellContent::Error),
        "d" => value.map(CellContent::Date),
        "n" => value.map(CellContent::Number),
        other => {
            warn!(
                "{}: cell {:?} has unknown type {:?}",
                path, cell.reference, other
            );
            value.map(CellContent::Text)
        }
    }
}
