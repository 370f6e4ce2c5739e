//! XLSX writer
//!
//! Regenerates the parts the model manages (workbook manifest, workbook relationships,
//! shared strings, worksheet `sheetData`) and copies every other part from the
//! [`Package`] unchanged.

mod sheet;

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;

use log::debug;

use crate::error::{XlsxError, XlsxResult};
use crate::escape::escape_xml;
use crate::options::XlsxWriteOptions;
use crate::package::{
    free_relationship_id, relative_target, ManifestEntry, Package, Relationship,
    CONTENT_TYPES_PATH, CT_RELATIONSHIPS, CT_SHARED_STRINGS, CT_WORKBOOK, CT_WORKSHEET, CT_XML,
    DEFAULT_SHARED_STRINGS_PATH, NS_CONTENT_TYPES, NS_MAIN, NS_PACKAGE_REL, NS_REL,
    REL_SHARED_STRINGS, REL_WORKSHEET,
};
use xlcells_core::{Workbook, Worksheet};

use sheet::render_attributes;

/// XLSX file writer
pub struct XlsxWriter;

/// Where each managed part goes in this save
struct PartLayout {
    /// Worksheet path, by relationship id
    sheet_paths: BTreeMap<String, String>,
    /// Shared string table path and relationship id
    shared_strings: (String, String),
}

impl XlsxWriter {
    /// Write a workbook and its package to a file path
    pub fn write_file<P: AsRef<Path>>(
        workbook: &Workbook,
        package: &Package,
        path: P,
    ) -> XlsxResult<()> {
        Self::write_file_with_options(workbook, package, path, &XlsxWriteOptions::default())
    }

    /// Write a workbook and its package to a file path with options
    pub fn write_file_with_options<P: AsRef<Path>>(
        workbook: &Workbook,
        package: &Package,
        path: P,
        options: &XlsxWriteOptions,
    ) -> XlsxResult<()> {
        let file = File::create(path)?;
        Self::write_with_options(workbook, package, file, options)
    }

    /// Write a workbook and its package to a writer
    pub fn write<W: Write + Seek>(
        workbook: &Workbook,
        package: &Package,
        writer: W,
    ) -> XlsxResult<()> {
        Self::write_with_options(workbook, package, writer, &XlsxWriteOptions::default())
    }

    /// Write a workbook and its package to a writer with options
    pub fn write_with_options<W: Write + Seek>(
        workbook: &Workbook,
        package: &Package,
        writer: W,
        options: &XlsxWriteOptions,
    ) -> XlsxResult<()> {
        let layout = Self::layout(workbook, package);
        let relationships = Self::workbook_relationships(workbook, package, &layout)?;

        let mut zip = zip::ZipWriter::new(writer);
        let file_options = options.file_options();
        let mut written = BTreeSet::new();

        let emit = |zip: &mut zip::ZipWriter<W>,
                        written: &mut BTreeSet<String>,
                        path: &str,
                        bytes: &[u8]|
         -> XlsxResult<()> {
            zip.start_file(path, file_options)?;
            zip.write_all(bytes)?;
            written.insert(path.to_string());
            Ok(())
        };

        // Write [Content_Types].xml
        let content_types = Self::content_types_xml(workbook, package, &layout);
        emit(&mut zip, &mut written, CONTENT_TYPES_PATH, content_types.as_bytes())?;

        // Write the workbook part and its relationships
        let workbook_xml = Self::workbook_xml(workbook, package);
        emit(&mut zip, &mut written, &package.workbook_path, &workbook_xml)?;
        let rels_xml = Self::relationships_xml(&relationships);
        emit(&mut zip, &mut written, &package.workbook_rels_path(), rels_xml.as_bytes())?;

        // Write the shared string table
        let sst = sheet::shared_strings_xml(workbook);
        emit(&mut zip, &mut written, &layout.shared_strings.0, sst.as_bytes())?;

        // Write worksheets
        for ws in workbook.worksheets() {
            let Some(path) = layout.sheet_paths.get(ws.relationship_id()) else {
                continue;
            };
            let part = package.sheet_parts.get(ws.relationship_id());
            let xml = sheet::worksheet_xml(ws.data(), part);
            emit(&mut zip, &mut written, path, &xml)?;
        }

        // Everything else goes through untouched
        for (path, bytes) in &package.parts {
            if written.contains(path) {
                debug!("part {} was regenerated; dropping the stale copy", path);
                continue;
            }
            emit(&mut zip, &mut written, path, bytes)?;
        }

        zip.finish()?;
        debug!(
            "wrote package with {} worksheet(s) and {} shared string(s)",
            workbook.sheet_count(),
            workbook.shared_strings().len()
        );
        Ok(())
    }

    /// Decide the path of every managed part
    fn layout(workbook: &Workbook, package: &Package) -> PartLayout {
        let dir = package.workbook_dir();
        let mut used: BTreeSet<String> = package.parts.keys().cloned().collect();
        used.insert(package.workbook_path.clone());
        for part in package.sheet_parts.values() {
            used.insert(part.path.clone());
        }

        let shared_strings = match &package.shared_strings {
            Some(existing) => existing.clone(),
            None => {
                let path = if dir == "xl" || dir.is_empty() {
                    DEFAULT_SHARED_STRINGS_PATH.to_string()
                } else {
                    format!("{}/sharedStrings.xml", dir)
                };
                let id = free_relationship_id(|id| {
                    workbook.worksheets().any(|ws| ws.relationship_id() == id)
                        || workbook.reserved_relationship_ids().any(|r| r == id)
                        || package.workbook_relationships.iter().any(|r| r.id == id)
                });
                (path, id)
            }
        };
        used.insert(shared_strings.0.clone());

        let mut sheet_paths = BTreeMap::new();
        for ws in workbook.worksheets() {
            let path = match package.sheet_parts.get(ws.relationship_id()) {
                Some(part) => part.path.clone(),
                None => {
                    let path = Self::new_sheet_path(dir, ws, &used);
                    used.insert(path.clone());
                    path
                }
            };
            sheet_paths.insert(ws.relationship_id().to_string(), path);
        }

        PartLayout {
            sheet_paths,
            shared_strings,
        }
    }

    fn new_sheet_path(dir: &str, ws: &Worksheet, used: &BTreeSet<String>) -> String {
        let base = if dir.is_empty() {
            "worksheets".to_string()
        } else {
            format!("{}/worksheets", dir)
        };
        let mut n = ws.sheet_id();
        loop {
            let path = format!("{}/sheet{}.xml", base, n);
            if !used.contains(&path) {
                return path;
            }
            n += 1;
        }
    }

    /// Kept relationships plus one per worksheet and one for the shared string table
    fn workbook_relationships(
        workbook: &Workbook,
        package: &Package,
        layout: &PartLayout,
    ) -> XlsxResult<Vec<Relationship>> {
        let dir = package.workbook_dir();
        let mut relationships = package.workbook_relationships.clone();
        for ws in workbook.worksheets() {
            if let Some(path) = layout.sheet_paths.get(ws.relationship_id()) {
                relationships.push(Relationship {
                    id: ws.relationship_id().to_string(),
                    rel_type: REL_WORKSHEET.to_string(),
                    target: relative_target(dir, path),
                    target_mode: None,
                });
            }
        }
        let (path, id) = &layout.shared_strings;
        relationships.push(Relationship {
            id: id.clone(),
            rel_type: REL_SHARED_STRINGS.to_string(),
            target: relative_target(dir, path),
            target_mode: None,
        });

        let mut seen = BTreeSet::new();
        for rel in &relationships {
            if !seen.insert(rel.id.as_str()) {
                return Err(XlsxError::InvalidFormat(format!(
                    "relationship id {} is used more than once",
                    rel.id
                )));
            }
        }
        Ok(relationships)
    }

    fn content_types_xml(workbook: &Workbook, package: &Package, layout: &PartLayout) -> String {
        let mut types = package.content_types.clone();
        types.ensure_default("rels", CT_RELATIONSHIPS);
        types.ensure_default("xml", CT_XML);

        // A macro-enabled workbook keeps its own main content type
        let workbook_part = format!("/{}", package.workbook_path);
        if !types
            .overrides
            .iter()
            .any(|(p, _)| p.eq_ignore_ascii_case(&workbook_part))
        {
            types.set_override(&package.workbook_path, CT_WORKBOOK);
        }
        for ws in workbook.worksheets() {
            if let Some(path) = layout.sheet_paths.get(ws.relationship_id()) {
                types.set_override(path, CT_WORKSHEET);
            }
        }
        types.set_override(&layout.shared_strings.0, CT_SHARED_STRINGS);

        let mut content = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="{}">"#,
            NS_CONTENT_TYPES
        );
        for (extension, content_type) in &types.defaults {
            content.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape_xml(extension),
                escape_xml(content_type)
            ));
        }
        for (part, content_type) in &types.overrides {
            content.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                escape_xml(part),
                escape_xml(content_type)
            ));
        }
        content.push_str("</Types>");
        content
    }

    fn relationships_xml(relationships: &[Relationship]) -> String {
        let mut content = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{}">"#,
            NS_PACKAGE_REL
        );
        for rel in relationships {
            let mode = rel
                .target_mode
                .as_ref()
                .map_or(String::new(), |m| format!(r#" TargetMode="{}""#, escape_xml(m)));
            content.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                escape_xml(&rel.id),
                escape_xml(&rel.rel_type),
                escape_xml(&rel.target),
                mode
            ));
        }
        content.push_str("</Relationships>");
        content
    }

    /// The workbook part with a regenerated `<sheets>` list
    fn workbook_xml(workbook: &Workbook, package: &Package) -> Vec<u8> {
        let prefix = package.workbook_prefix.as_str();
        let rel_prefix = if package.relationship_prefix.is_empty() {
            "r"
        } else {
            package.relationship_prefix.as_str()
        };

        let sheet_element = |ws: &Worksheet, extra: &[(String, String)]| {
            format!(
                "<{p}sheet name=\"{}\" sheetId=\"{}\"{} {}:id=\"{}\"/>",
                escape_xml(ws.name()),
                ws.sheet_id(),
                render_attributes(extra),
                rel_prefix,
                escape_xml(ws.relationship_id()),
                p = prefix
            )
        };

        let mut sheets = format!("<{}sheets>", prefix);
        let mut listed = BTreeSet::new();
        for entry in &package.manifest {
            match entry {
                ManifestEntry::Worksheet {
                    relationship_id,
                    attributes,
                } => {
                    if let Some(ws) = workbook
                        .worksheets()
                        .find(|ws| ws.relationship_id() == relationship_id)
                    {
                        sheets.push_str(&sheet_element(ws, attributes));
                        listed.insert(relationship_id.as_str());
                    }
                }
                ManifestEntry::Other { attributes } => {
                    sheets.push_str(&format!(
                        "<{}sheet{}/>",
                        prefix,
                        render_attributes(attributes)
                    ));
                }
            }
        }
        for ws in workbook.worksheets() {
            if !listed.contains(ws.relationship_id()) {
                sheets.push_str(&sheet_element(ws, &[]));
            }
        }
        sheets.push_str(&format!("</{}sheets>", prefix));

        let mut out = Vec::new();
        match &package.workbook_template {
            Some((head, tail)) => {
                out.extend_from_slice(head);
                out.extend_from_slice(sheets.as_bytes());
                out.extend_from_slice(tail);
            }
            None => {
                out.extend_from_slice(
                    format!(
                        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{}" xmlns:{}="{}">"#,
                        NS_MAIN, rel_prefix, NS_REL
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(sheets.as_bytes());
                out.extend_from_slice(b"</workbook>");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::XlsxReader;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use xlcells_core::CellValue;

    fn round_trip(workbook: &Workbook, package: &Package) -> (Workbook, Package) {
        let mut buffer = Cursor::new(Vec::new());
        XlsxWriter::write(workbook, package, &mut buffer).unwrap();
        buffer.set_position(0);
        XlsxReader::read(buffer).unwrap()
    }

    #[test]
    fn test_new_workbook_round_trip() {
        let mut workbook = Workbook::new();
        workbook.set_cell("Sheet1", "B2", "I am a cell").unwrap();
        workbook.set_cell("Sheet1", "C3", 42.5).unwrap();
        let package = Package::for_workbook(&mut workbook);

        let (read, package) = round_trip(&workbook, &package);
        assert_eq!(read.sheet_names(), vec!["Sheet1"]);
        assert_eq!(read.shared_strings().len(), 1);
        assert!(package.parts.contains_key("xl/styles.xml"));
        assert_eq!(
            package.sheet_parts.get("rId1").map(|p| p.path.as_str()),
            Some("xl/worksheets/sheet1.xml")
        );

        let mut read = read;
        let b2 = read.find_cell("Sheet1", "B2").unwrap();
        let c3 = read.find_cell("Sheet1", "C3").unwrap();
        assert_eq!(read.cell_value(b2), Some(CellValue::string("I am a cell")));
        assert_eq!(read.cell_value(c3), Some(CellValue::Number(42.5)));
    }

    #[test]
    fn test_added_sheet_gets_new_part() {
        let mut workbook = Workbook::new();
        let package = Package::for_workbook(&mut workbook);
        workbook.add_worksheet("Second").unwrap();

        let (read, package) = round_trip(&workbook, &package);
        assert_eq!(read.sheet_names(), vec!["Sheet1", "Second"]);
        let second = read.worksheet_by_name("Second").unwrap();
        assert_eq!(second.sheet_id(), 2);
        assert_eq!(
            package
                .sheet_parts
                .get(second.relationship_id())
                .map(|p| p.path.as_str()),
            Some("xl/worksheets/sheet2.xml")
        );
    }

    #[test]
    fn test_relationship_collision_is_rejected() {
        let mut workbook = Workbook::new();
        let mut package = Package::for_workbook(&mut workbook);
        package.workbook_relationships.push(Relationship {
            id: "rId1".into(),
            rel_type: "t/theme".into(),
            target: "theme/theme1.xml".into(),
            target_mode: None,
        });

        let result = XlsxWriter::write(&workbook, &package, Cursor::new(Vec::new()));
        assert!(matches!(result, Err(XlsxError::InvalidFormat(_))));
    }

    #[test]
    fn test_relationships_xml() {
        let xml = XlsxWriter::relationships_xml(&[Relationship {
            id: "rId4".into(),
            rel_type: "t/hyperlink".into(),
            target: "https://example.com/?a=1&b=2".into(),
            target_mode: Some("External".into()),
        }]);
        assert!(xml.ends_with(
            r#"<Relationship Id="rId4" Type="t/hyperlink" Target="https://example.com/?a=1&amp;b=2" TargetMode="External"/></Relationships>"#
        ));
    }
}
