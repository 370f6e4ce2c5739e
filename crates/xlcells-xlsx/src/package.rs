//! Package state kept between reading and writing
//!
//! The model only manages the workbook manifest, the worksheets' `sheetData`, and the
//! shared string table. Everything else in the ZIP container is carried here so it
//! can be written back untouched.

use std::collections::BTreeMap;

use xlcells_core::Workbook;

pub(crate) const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub(crate) const NS_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(crate) const NS_PACKAGE_REL: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";
pub(crate) const NS_CONTENT_TYPES: &str =
    "http://schemas.openxmlformats.org/package/2006/content-types";

pub(crate) const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub(crate) const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub(crate) const REL_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub(crate) const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

pub(crate) const CT_RELATIONSHIPS: &str =
    "application/vnd.openxmlformats-package.relationships+xml";
pub(crate) const CT_XML: &str = "application/xml";
pub(crate) const CT_WORKBOOK: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
pub(crate) const CT_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub(crate) const CT_SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
pub(crate) const CT_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";

pub(crate) const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";
pub(crate) const ROOT_RELS_PATH: &str = "_rels/.rels";
pub(crate) const DEFAULT_WORKBOOK_PATH: &str = "xl/workbook.xml";
pub(crate) const DEFAULT_SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";

const MINIMAL_STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
    <fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>
    <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
    <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
    <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
    <cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>
    <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>"#;

/// One entry of a relationships part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship id (`rId3`)
    pub id: String,
    /// Relationship type URI
    pub rel_type: String,
    /// Target as written in the part
    pub target: String,
    /// `External` for targets outside the package
    pub target_mode: Option<String>,
}

impl Relationship {
    /// Check if the target lives outside the package
    pub fn is_external(&self) -> bool {
        self.target_mode.as_deref() == Some("External")
    }
}

/// The content-type manifest of the package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    /// `(extension, content type)` defaults
    pub defaults: Vec<(String, String)>,
    /// `(part name, content type)` overrides; part names start with `/`
    pub overrides: Vec<(String, String)>,
}

impl ContentTypes {
    /// Set or replace the override for `part` (a package path without leading `/`)
    pub fn set_override(&mut self, part: &str, content_type: &str) {
        let name = format!("/{}", part);
        match self
            .overrides
            .iter_mut()
            .find(|(p, _)| p.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = content_type.to_string(),
            None => self.overrides.push((name, content_type.to_string())),
        }
    }

    /// Add a default for `extension` if there is none
    pub fn ensure_default(&mut self, extension: &str, content_type: &str) {
        if !self
            .defaults
            .iter()
            .any(|(e, _)| e.eq_ignore_ascii_case(extension))
        {
            self.defaults
                .push((extension.to_string(), content_type.to_string()));
        }
    }
}

/// Where a worksheet lives and the XML around its `sheetData`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetPart {
    /// Package path of the worksheet part
    pub path: String,
    /// Bytes before `<sheetData>`
    pub head: Vec<u8>,
    /// Bytes after `</sheetData>`
    pub tail: Vec<u8>,
    /// Namespace prefix used for SpreadsheetML elements (`""` or `"x:"`)
    pub prefix: String,
}

/// An entry of the workbook's `<sheets>` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    /// A worksheet managed by the model, by relationship id
    Worksheet {
        /// Relationship id
        relationship_id: String,
        /// Attributes other than `name`, `sheetId` and `r:id` (e.g. `state`)
        attributes: Vec<(String, String)>,
    },
    /// Any other sheet kind, written back as found
    Other {
        /// Every attribute of the `<sheet>` element, in order
        attributes: Vec<(String, String)>,
    },
}

/// Everything outside the model that a save must reproduce
#[derive(Debug, Clone, Default)]
pub struct Package {
    /// Parts copied verbatim, by package path
    pub parts: BTreeMap<String, Vec<u8>>,
    /// Content-type manifest
    pub content_types: ContentTypes,
    /// Path of the workbook part
    pub workbook_path: String,
    /// Workbook XML before and after the `<sheets>` element, if loaded from a file
    pub workbook_template: Option<(Vec<u8>, Vec<u8>)>,
    /// Namespace prefix for the workbook's `<sheets>` element
    pub workbook_prefix: String,
    /// Prefix bound to the relationships namespace in the workbook part
    pub relationship_prefix: String,
    /// Sheet entries in manifest order
    pub manifest: Vec<ManifestEntry>,
    /// Workbook relationships other than worksheets and shared strings
    pub workbook_relationships: Vec<Relationship>,
    /// Worksheet parts, by relationship id
    pub sheet_parts: BTreeMap<String, SheetPart>,
    /// Path and relationship id of the shared string table, if present
    pub shared_strings: Option<(String, String)>,
}

impl Package {
    /// A minimal package for a new workbook
    ///
    /// Adds a stylesheet whose relationship id avoids every id `workbook` already uses,
    /// and reserves that id in `workbook` so sheets added later do not take it.
    pub fn for_workbook(workbook: &mut Workbook) -> Self {
        let mut package = Self {
            workbook_path: DEFAULT_WORKBOOK_PATH.to_string(),
            relationship_prefix: "r".to_string(),
            ..Self::default()
        };

        package.parts.insert(
            ROOT_RELS_PATH.to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{}">
    <Relationship Id="rId1" Type="{}" Target="{}"/>
</Relationships>"#,
                NS_PACKAGE_REL, REL_OFFICE_DOCUMENT, DEFAULT_WORKBOOK_PATH
            )
            .into_bytes(),
        );
        package
            .parts
            .insert("xl/styles.xml".to_string(), MINIMAL_STYLES.as_bytes().to_vec());

        package.content_types.ensure_default("rels", CT_RELATIONSHIPS);
        package.content_types.ensure_default("xml", CT_XML);
        package
            .content_types
            .set_override("xl/styles.xml", CT_STYLES);

        let styles_id = free_relationship_id(|id| workbook_uses_id(workbook, id));
        workbook.reserve_relationship_id(styles_id.clone());
        package.workbook_relationships.push(Relationship {
            id: styles_id,
            rel_type: REL_STYLES.to_string(),
            target: "styles.xml".to_string(),
            target_mode: None,
        });
        package
    }

    /// Relationship ids the workbook part uses for anything other than worksheets
    pub fn reserved_relationship_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .workbook_relationships
            .iter()
            .map(|r| r.id.clone())
            .collect();
        if let Some((_, id)) = &self.shared_strings {
            ids.push(id.clone());
        }
        ids
    }

    /// Path of the workbook's relationships part
    pub fn workbook_rels_path(&self) -> String {
        rels_path_for(&self.workbook_path)
    }

    /// Directory of the workbook part (`xl` for `xl/workbook.xml`)
    pub(crate) fn workbook_dir(&self) -> &str {
        parent_dir(&self.workbook_path)
    }
}

fn workbook_uses_id(workbook: &Workbook, id: &str) -> bool {
    workbook.worksheets().any(|ws| ws.relationship_id() == id)
        || workbook.reserved_relationship_ids().any(|r| r == id)
}

/// First `rIdN` for which `in_use` is false
pub(crate) fn free_relationship_id(in_use: impl Fn(&str) -> bool) -> String {
    let mut n = 1;
    loop {
        let id = format!("rId{}", n);
        if !in_use(&id) {
            return id;
        }
        n += 1;
    }
}

/// Directory part of a package path (empty for root-level parts)
pub(crate) fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |i| &path[..i])
}

/// Path of the relationships part for `path` (`xl/_rels/workbook.xml.rels`)
pub(crate) fn rels_path_for(path: &str) -> String {
    let dir = parent_dir(path);
    let file = path.rfind('/').map_or(path, |i| &path[i + 1..]);
    if dir.is_empty() {
        format!("_rels/{}.rels", file)
    } else {
        format!("{}/_rels/{}.rels", dir, file)
    }
}

/// Resolve a relationship target against the directory of its source part
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if base_dir.is_empty() {
        target.to_string()
    } else {
        format!("{}/{}", base_dir, target)
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Express `path` as a target relative to `base_dir`
pub(crate) fn relative_target(base_dir: &str, path: &str) -> String {
    if base_dir.is_empty() {
        return path.to_string();
    }
    match path.strip_prefix(base_dir).and_then(|p| p.strip_prefix('/')) {
        Some(relative) => relative.to_string(),
        None => format!("/{}", path),
    }
}
