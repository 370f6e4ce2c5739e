//! Worksheet and shared string table serialization

use crate::escape::{encode_excel_escapes, escape_xml};
use crate::package::{SheetPart, NS_MAIN, NS_REL};
use xlcells_core::{CellContent, CellNode, RowNode, SheetData, StringPool, Workbook};

/// Letters of a 0-based column index, without the `ZZ` limit of the public grammar
pub(crate) fn column_name(col: u16) -> String {
    let mut n = u32::from(col) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// `A1` text of a stored position
pub(crate) fn cell_reference(col: u16, row: u32) -> String {
    format!("{}{}", column_name(col), u64::from(row) + 1)
}

/// Render `(key, value)` pairs as ` key="value"`
pub(crate) fn render_attributes(attributes: &[(String, String)]) -> String {
    attributes
        .iter()
        .map(|(k, v)| format!(" {}=\"{}\"", k, escape_xml(v)))
        .collect()
}

/// Text element, marking whitespace that XML would otherwise drop
fn text_element(prefix: &str, text: &str) -> String {
    let preserve = text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace)
        || text.contains('\n');
    format!(
        "<{p}t{}>{}</{p}t>",
        if preserve { " xml:space=\"preserve\"" } else { "" },
        escape_xml(&encode_excel_escapes(text)),
        p = prefix
    )
}

/// Serialize the shared string table
pub(crate) fn shared_strings_xml(workbook: &Workbook) -> String {
    let pool: &StringPool = workbook.shared_strings();
    let count: usize = workbook
        .worksheets()
        .map(|ws| {
            ws.data()
                .cells()
                .filter(|(_, _, node)| node.shared_string_index().is_some())
                .count()
        })
        .sum();

    let mut content = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="{}" count="{}" uniqueCount="{}">"#,
        NS_MAIN,
        count,
        pool.len()
    );
    for (_, text) in pool.iter() {
        content.push_str("<si>");
        content.push_str(&text_element("", text));
        content.push_str("</si>");
    }
    content.push_str("</sst>");
    content
}

/// Serialize a worksheet, splicing new `sheetData` between the kept head and tail
pub(crate) fn worksheet_xml(data: &SheetData, part: Option<&SheetPart>) -> Vec<u8> {
    let mut out = Vec::new();
    let prefix = part.map_or("", |p| p.prefix.as_str());
    match part {
        Some(part) => out.extend_from_slice(&part.head),
        None => out.extend_from_slice(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{}" xmlns:r="{}">"#,
                NS_MAIN, NS_REL
            )
            .as_bytes(),
        ),
    }
    out.extend_from_slice(sheet_data_xml(data, prefix).as_bytes());
    match part {
        Some(part) => out.extend_from_slice(&part.tail),
        None => out.extend_from_slice(b"</worksheet>"),
    }
    out
}

fn sheet_data_xml(data: &SheetData, prefix: &str) -> String {
    if data.rows().all(|(_, row)| row.is_empty()) {
        return format!("<{}sheetData/>", prefix);
    }

    let mut content = format!("<{}sheetData>", prefix);
    for (row, node) in data.rows() {
        if node.is_empty() {
            continue;
        }
        let attributes = render_attributes(&row_attributes(node));
        if node.cells.is_empty() {
            content.push_str(&format!(
                "<{p}row r=\"{}\"{}/>",
                u64::from(row) + 1,
                attributes,
                p = prefix
            ));
            continue;
        }
        content.push_str(&format!(
            "<{p}row r=\"{}\"{}>",
            u64::from(row) + 1,
            attributes,
            p = prefix
        ));
        for (&col, cell) in &node.cells {
            write_cell(&mut content, prefix, col, row, cell);
        }
        content.push_str(&format!("</{}row>", prefix));
    }
    content.push_str(&format!("</{}sheetData>", prefix));
    content
}

/// Row attributes with `spans` recomputed from the cells present
fn row_attributes(node: &RowNode) -> Vec<(String, String)> {
    let first = node.cells.keys().next();
    let last = node.cells.keys().next_back();
    node.attributes
        .iter()
        .map(|(k, v)| match (k.as_str(), first, last) {
            ("spans", Some(first), Some(last)) => {
                (k.clone(), format!("{}:{}", first + 1, last + 1))
            }
            _ => (k.clone(), v.clone()),
        })
        .collect()
}

fn write_cell(content: &mut String, prefix: &str, col: u16, row: u32, cell: &CellNode) {
    let style_attr = cell
        .style
        .map_or(String::new(), |s| format!(" s=\"{}\"", s));

    let type_attr = match &cell.content {
        Some(CellContent::SharedString(_)) => " t=\"s\"",
        Some(CellContent::Text(_)) if cell.formula.is_some() => " t=\"str\"",
        Some(CellContent::Text(_)) => " t=\"inlineStr\"",
        Some(CellContent::Date(_)) => " t=\"d\"",
        Some(CellContent::Boolean(_)) => " t=\"b\"",
        Some(CellContent::Error(_)) => " t=\"e\"",
        Some(CellContent::Number(_)) | None => "",
    };

    let reference = cell_reference(col, row);
    if cell.content.is_none() && cell.formula.is_none() {
        content.push_str(&format!(
            "<{p}c r=\"{}\"{}/>",
            reference,
            style_attr,
            p = prefix
        ));
        return;
    }

    content.push_str(&format!(
        "<{p}c r=\"{}\"{}{}>",
        reference,
        style_attr,
        type_attr,
        p = prefix
    ));

    if let Some(formula) = &cell.formula {
        let attributes = render_attributes(&formula.attributes);
        if formula.text.is_empty() {
            content.push_str(&format!("<{}f{}/>", prefix, attributes));
        } else {
            content.push_str(&format!(
                "<{p}f{}>{}</{p}f>",
                attributes,
                escape_xml(&formula.text),
                p = prefix
            ));
        }
    }

    let value = match &cell.content {
        Some(CellContent::SharedString(index)) => Some(index.to_string()),
        Some(CellContent::Text(text)) if cell.formula.is_none() => {
            content.push_str(&format!("<{}is>", prefix));
            content.push_str(&text_element(prefix, text));
            content.push_str(&format!("</{}is>", prefix));
            None
        }
        Some(CellContent::Text(text)) => Some(escape_xml(text)),
        Some(CellContent::Number(n)) | Some(CellContent::Date(n)) => Some(escape_xml(n)),
        Some(CellContent::Boolean(b)) => Some(if *b { "1" } else { "0" }.to_string()),
        Some(CellContent::Error(e)) => Some(escape_xml(e)),
        None => None,
    };
    if let Some(value) = value {
        content.push_str(&format!("<{p}v>{}</{p}v>", value, p = prefix));
    }

    content.push_str(&format!("</{}c>", prefix));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xlcells_core::Formula;

    #[test]
    fn test_column_name() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
        assert_eq!(column_name(16_383), "XFD");
        assert_eq!(cell_reference(27, 9), "AB10");
    }

    #[test]
    fn test_sheet_data_xml() {
        let mut data = SheetData::new();
        *data.row_entry(0) = RowNode::with_attributes(vec![
            ("spans".to_string(), "1:1".to_string()),
            ("ht".to_string(), "20".to_string()),
        ]);
        data.insert(1, 0, CellNode::new(CellContent::SharedString(3)))
            .unwrap();
        data.insert(
            2,
            0,
            CellNode::with_style(CellContent::Number("1.5".into()), Some(4)),
        )
        .unwrap();
        data.insert(
            0,
            2,
            CellNode {
                content: Some(CellContent::Text("X".into())),
                style: None,
                formula: Some(Formula {
                    text: "UPPER(\"x\")".into(),
                    attributes: Vec::new(),
                }),
            },
        )
        .unwrap();
        data.insert(1, 2, CellNode::new(CellContent::Boolean(true)))
            .unwrap();
        *data.row_entry(5) = RowNode::with_attributes(vec![("hidden".into(), "1".into())]);

        assert_eq!(
            sheet_data_xml(&data, ""),
            concat!(
                "<sheetData>",
                "<row r=\"1\" spans=\"2:3\" ht=\"20\">",
                "<c r=\"B1\" t=\"s\"><v>3</v></c>",
                "<c r=\"C1\" s=\"4\"><v>1.5</v></c>",
                "</row>",
                "<row r=\"3\">",
                "<c r=\"A3\" t=\"str\"><f>UPPER(&quot;x&quot;)</f><v>X</v></c>",
                "<c r=\"B3\" t=\"b\"><v>1</v></c>",
                "</row>",
                "<row r=\"6\" hidden=\"1\"/>",
                "</sheetData>"
            )
        );
    }

    #[test]
    fn test_inline_and_style_only_cells() {
        let mut data = SheetData::new();
        data.insert(0, 0, CellNode::new(CellContent::Text(" a\u{1}b ".into())))
            .unwrap();
        data.insert(
            1,
            0,
            CellNode {
                content: None,
                style: Some(7),
                formula: None,
            },
        )
        .unwrap();

        assert_eq!(
            sheet_data_xml(&data, "x:"),
            concat!(
                "<x:sheetData><x:row r=\"1\">",
                "<x:c r=\"A1\" t=\"inlineStr\"><x:is><x:t xml:space=\"preserve\"> a_x0001_b </x:t></x:is></x:c>",
                "<x:c r=\"B1\" s=\"7\"/>",
                "</x:row></x:sheetData>"
            )
        );
    }

    #[test]
    fn test_empty_sheet_data() {
        assert_eq!(sheet_data_xml(&SheetData::new(), ""), "<sheetData/>");
    }

    #[test]
    fn test_shared_strings_xml() {
        let mut workbook = Workbook::new();
        workbook.set_cell("Sheet1", "A1", "x < y").unwrap();
        workbook.set_cell("Sheet1", "A2", "x < y").unwrap();
        workbook.set_cell("Sheet1", "A3", " padded").unwrap();

        let xml = shared_strings_xml(&workbook);
        assert!(xml.contains(r#"count="3" uniqueCount="2""#));
        assert!(xml.contains("<si><t>x &lt; y</t></si>"));
        assert!(xml.contains(r#"<si><t xml:space="preserve"> padded</t></si>"#));
    }
}
