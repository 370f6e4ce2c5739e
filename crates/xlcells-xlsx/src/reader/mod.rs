//! XLSX reader
//!
//! Loads every part of the package. The workbook manifest, shared string table and
//! worksheets become a [`Workbook`]; everything else is kept in the returned [`Package`].

mod sheet;

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use crate::escape::decode_excel_escapes;
use crate::package::{
    parent_dir, rels_path_for, resolve_target, ContentTypes, ManifestEntry, Package,
    Relationship, CONTENT_TYPES_PATH, DEFAULT_WORKBOOK_PATH, NS_REL, REL_OFFICE_DOCUMENT,
    REL_SHARED_STRINGS, REL_WORKSHEET, ROOT_RELS_PATH,
};
use xlcells_core::{StringPool, Workbook, Worksheet};

/// XLSX file reader
pub struct XlsxReader;

impl XlsxReader {
    /// Read a workbook and its package from a file path
    pub fn read_file<P: AsRef<Path>>(path: P) -> XlsxResult<(Workbook, Package)> {
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Read a workbook and its package from a reader
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<(Workbook, Package)> {
        let mut parts = Self::read_parts(reader)?;

        // Verify this is an XLSX file
        let content_types = parts
            .remove(CONTENT_TYPES_PATH)
            .ok_or_else(|| XlsxError::InvalidFormat("Missing [Content_Types].xml".into()))?;
        let content_types = parse_content_types(&content_types)?;

        let workbook_path = Self::workbook_path(&parts)?;
        let workbook_xml = parts
            .remove(&workbook_path)
            .ok_or_else(|| XlsxError::MissingPart(workbook_path.clone()))?;
        let manifest = parse_workbook_xml(&workbook_xml)?;

        let relationships = match parts.remove(&rels_path_for(&workbook_path)) {
            Some(bytes) => parse_relationships(&bytes)?,
            None => {
                warn!("{} has no relationships part", workbook_path);
                Vec::new()
            }
        };
        let workbook_dir = parent_dir(&workbook_path).to_string();

        // Worksheet relationships named by the manifest are managed; all others are kept
        let listed: Vec<&str> = manifest
            .sheets
            .iter()
            .filter_map(|s| s.relationship_id.as_deref())
            .collect();
        let mut sheet_paths = HashMap::new();
        let mut shared_strings = None;
        let mut kept_relationships = Vec::new();
        for rel in relationships {
            if !rel.is_external()
                && rel.rel_type == REL_WORKSHEET
                && listed.contains(&rel.id.as_str())
            {
                sheet_paths.insert(rel.id.clone(), resolve_target(&workbook_dir, &rel.target));
            } else if !rel.is_external()
                && rel.rel_type == REL_SHARED_STRINGS
                && shared_strings.is_none()
            {
                shared_strings = Some((resolve_target(&workbook_dir, &rel.target), rel.id));
            } else {
                kept_relationships.push(rel);
            }
        }

        let pool = match &shared_strings {
            Some((path, _)) => match parts.remove(path) {
                Some(bytes) => StringPool::from_entries(parse_shared_strings(&bytes)?),
                None => {
                    warn!("shared string part {} is missing", path);
                    StringPool::new()
                }
            },
            None => StringPool::new(),
        };

        let mut sheets = Vec::new();
        let mut sheet_parts = BTreeMap::new();
        let mut entries = Vec::new();
        let mut other_sheets = Vec::new();
        for entry in manifest.sheets {
            let path = entry
                .relationship_id
                .as_ref()
                .and_then(|id| sheet_paths.get(id));
            match (path, entry.relationship_id) {
                (Some(path), Some(relationship_id)) => {
                    let bytes = parts
                        .remove(path)
                        .ok_or_else(|| XlsxError::MissingPart(path.clone()))?;
                    let (data, part) = sheet::parse_worksheet(&bytes, path, pool.len())?;
                    debug!(
                        "read worksheet {:?} from {} ({} cells)",
                        entry.name,
                        path,
                        data.cell_count()
                    );
                    sheets.push(Worksheet::with_data(
                        entry.name,
                        entry.sheet_id,
                        relationship_id.clone(),
                        data,
                    ));
                    sheet_parts.insert(relationship_id.clone(), part);
                    entries.push(ManifestEntry::Worksheet {
                        relationship_id,
                        attributes: entry.extra,
                    });
                }
                (_, relationship_id) => {
                    warn!(
                        "sheet {:?} is not a worksheet; it is kept but not editable",
                        entry.name
                    );
                    other_sheets.push((entry.name, entry.sheet_id, relationship_id));
                    entries.push(ManifestEntry::Other {
                        attributes: entry.attributes,
                    });
                }
            }
        }

        let package = Package {
            parts,
            content_types,
            workbook_path,
            workbook_template: Some((manifest.head, manifest.tail)),
            workbook_prefix: manifest.prefix,
            relationship_prefix: manifest.relationship_prefix,
            manifest: entries,
            workbook_relationships: kept_relationships,
            sheet_parts,
            shared_strings,
        };

        let mut workbook =
            Workbook::from_parts(sheets, pool, package.reserved_relationship_ids())?;
        for (name, sheet_id, relationship_id) in other_sheets {
            workbook.reserve_sheet(name, sheet_id, relationship_id.unwrap_or_default())?;
        }

        Ok((workbook, package))
    }

    /// Load every file entry of the archive
    fn read_parts<R: Read + Seek>(reader: R) -> XlsxResult<BTreeMap<String, Vec<u8>>> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut parts = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.insert(name, data);
        }
        Ok(parts)
    }

    /// Find the workbook part through the package relationships
    fn workbook_path(parts: &BTreeMap<String, Vec<u8>>) -> XlsxResult<String> {
        let root_rels = match parts.get(ROOT_RELS_PATH) {
            Some(bytes) => parse_relationships(bytes)?,
            None => {
                warn!("package has no {}; assuming {}", ROOT_RELS_PATH, DEFAULT_WORKBOOK_PATH);
                return Ok(DEFAULT_WORKBOOK_PATH.to_string());
            }
        };
        root_rels
            .iter()
            .find(|r| r.rel_type == REL_OFFICE_DOCUMENT)
            .map(|r| resolve_target("", &r.target))
            .ok_or_else(|| XlsxError::MissingPart("officeDocument relationship".into()))
    }
}

/// Collect the attributes of an element as `(qualified name, unescaped value)`
pub(crate) fn attributes(e: &BytesStart) -> XlsxResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        out.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            attr.unescape_value()?.into_owned(),
        ));
    }
    Ok(out)
}

/// Namespace prefix of an element including the colon, or `""`
pub(crate) fn element_prefix(e: &BytesStart) -> String {
    e.name()
        .prefix()
        .map(|p| format!("{}:", String::from_utf8_lossy(p.as_ref())))
        .unwrap_or_default()
}

fn attribute_value<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Parse `[Content_Types].xml`
fn parse_content_types(bytes: &[u8]) -> XlsxResult<ContentTypes> {
    let mut xml_reader = Reader::from_reader(bytes);
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut types = ContentTypes::default();

    loop {
        match xml_reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) => {
                let attrs = attributes(&e)?;
                let content_type = attribute_value(&attrs, "ContentType");
                match (e.local_name().as_ref(), content_type) {
                    (b"Default", Some(ct)) => {
                        if let Some(ext) = attribute_value(&attrs, "Extension") {
                            types.defaults.push((ext.to_string(), ct.to_string()));
                        }
                    }
                    (b"Override", Some(ct)) => {
                        if let Some(part) = attribute_value(&attrs, "PartName") {
                            types.overrides.push((part.to_string(), ct.to_string()));
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(types)
}

/// Parse a relationships part
fn parse_relationships(bytes: &[u8]) -> XlsxResult<Vec<Relationship>> {
    let mut xml_reader = Reader::from_reader(bytes);
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match xml_reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                let attrs = attributes(&e)?;
                let id = attribute_value(&attrs, "Id");
                let rel_type = attribute_value(&attrs, "Type");
                let target = attribute_value(&attrs, "Target");
                if let (Some(id), Some(rel_type), Some(target)) = (id, rel_type, target) {
                    rels.push(Relationship {
                        id: id.to_string(),
                        rel_type: rel_type.to_string(),
                        target: target.to_string(),
                        target_mode: attribute_value(&attrs, "TargetMode").map(str::to_string),
                    });
                } else {
                    warn!("skipping incomplete relationship {:?}", attrs);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// A `<sheet>` entry of the workbook manifest
struct SheetEntry {
    name: String,
    sheet_id: u32,
    relationship_id: Option<String>,
    /// Every attribute, in order
    attributes: Vec<(String, String)>,
    /// Attributes other than name, sheetId and the relationship id
    extra: Vec<(String, String)>,
}

/// The workbook part split around `<sheets>`
struct WorkbookXml {
    head: Vec<u8>,
    tail: Vec<u8>,
    prefix: String,
    relationship_prefix: String,
    sheets: Vec<SheetEntry>,
}

/// Parse the workbook part, keeping the bytes around `<sheets>`
fn parse_workbook_xml(bytes: &[u8]) -> XlsxResult<WorkbookXml> {
    let mut xml_reader = Reader::from_reader(bytes);

    let mut buf = Vec::new();
    let mut head_end = None;
    let mut tail_start = None;
    let mut prefix = String::new();
    let mut relationship_prefix = String::from("r");
    let mut sheets = Vec::new();
    let mut in_sheets = false;

    loop {
        let before = xml_reader.buffer_position() as usize;
        match xml_reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"workbook" => {
                for (key, value) in attributes(&e)? {
                    if value == NS_REL {
                        if let Some(p) = key.strip_prefix("xmlns:") {
                            relationship_prefix = p.to_string();
                        }
                    }
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"sheets" && head_end.is_none() => {
                head_end = Some(before);
                prefix = element_prefix(&e);
                in_sheets = true;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheets" && head_end.is_none() => {
                head_end = Some(before);
                tail_start = Some(xml_reader.buffer_position() as usize);
                prefix = element_prefix(&e);
            }
            Event::End(e) if in_sheets && e.local_name().as_ref() == b"sheets" => {
                tail_start = Some(xml_reader.buffer_position() as usize);
                in_sheets = false;
            }
            Event::Start(e) | Event::Empty(e) if in_sheets && e.local_name().as_ref() == b"sheet" => {
                sheets.push(parse_sheet_entry(&e)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    match (head_end, tail_start) {
        (Some(head_end), Some(tail_start)) => Ok(WorkbookXml {
            head: bytes[..head_end].to_vec(),
            tail: bytes[tail_start..].to_vec(),
            prefix,
            relationship_prefix,
            sheets,
        }),
        _ => Err(XlsxError::InvalidFormat(
            "workbook part has no sheets element".into(),
        )),
    }
}

fn parse_sheet_entry(e: &BytesStart) -> XlsxResult<SheetEntry> {
    let mut name = None;
    let mut sheet_id = None;
    let mut relationship_id = None;
    let mut extra = Vec::new();

    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        match attr.key.local_name().as_ref() {
            b"name" if attr.key.prefix().is_none() => name = Some(value),
            b"sheetId" => sheet_id = value.parse::<u32>().ok(),
            b"id" if attr.key.prefix().is_some() => relationship_id = Some(value),
            _ => extra.push((key, value)),
        }
    }

    let name = name.ok_or_else(|| XlsxError::Parse("sheet entry without a name".into()))?;
    let sheet_id = sheet_id
        .ok_or_else(|| XlsxError::Parse(format!("sheet {:?} has no valid sheetId", name)))?;
    Ok(SheetEntry {
        name,
        sheet_id,
        relationship_id,
        attributes: attributes(e)?,
        extra,
    })
}

/// Read the shared string table
///
/// Rich-text entries become their concatenated run text; phonetic runs are skipped.
fn parse_shared_strings(bytes: &[u8]) -> XlsxResult<Vec<String>> {
    let mut xml_reader = Reader::from_reader(bytes);

    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current_string = String::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut phonetic_depth = 0usize;

    loop {
        match xml_reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current_string.clear();
                }
                b"rPh" if in_si => phonetic_depth += 1,
                b"t" if in_si && phonetic_depth == 0 => in_t = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(decode_excel_escapes(&current_string));
                    current_string.clear();
                    in_si = false;
                }
                b"rPh" if phonetic_depth > 0 => phonetic_depth -= 1,
                b"t" => in_t = false,
                _ => {}
            },
            Event::Text(e) if in_t => current_string.push_str(&e.unescape()?),
            Event::CData(e) if in_t => {
                current_string.push_str(&String::from_utf8_lossy(&e.into_inner()))
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}
