//! Chart data-cache fragments
//!
//! Serializes [`ValueCache`] snapshots as the `c:strRef` / `c:numRef` elements a chart
//! part embeds next to its series formulas.

use crate::escape::escape_xml;
use xlcells_core::{CacheKind, CellCoordinate, CellRangeSpec, ValueCache};

/// Absolute, sheet-qualified formula text for a range (`'Sheet 1'!$A$1:$A$3`)
pub fn range_formula(range: &CellRangeSpec) -> String {
    let absolute = |c: &CellCoordinate| format!("${}${}", c.column_letters(), c.row_number());
    let cells = if range.is_cell() {
        absolute(range.start())
    } else {
        format!("{}:{}", absolute(range.start()), absolute(range.end()))
    };
    match range.sheet_name() {
        Some(sheet) => format!("{}!{}", quote_sheet_name(sheet), cells),
        None => cells,
    }
}

/// Quote a sheet name for use in a formula when it is not a plain identifier
fn quote_sheet_name(name: &str) -> String {
    let plain = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// `c:strCache` or `c:numCache` element for a snapshot
pub fn value_cache_xml(cache: &ValueCache) -> String {
    let tag = match cache.kind {
        CacheKind::String => "c:strCache",
        CacheKind::Number => "c:numCache",
    };

    let mut content = format!("<{}>", tag);
    if let Some(format_code) = &cache.format_code {
        content.push_str(&format!(
            "<c:formatCode>{}</c:formatCode>",
            escape_xml(format_code)
        ));
    }
    content.push_str(&format!("<c:ptCount val=\"{}\"/>", cache.point_count));
    for point in &cache.points {
        content.push_str(&format!(
            "<c:pt idx=\"{}\"><c:v>{}</c:v></c:pt>",
            point.index,
            escape_xml(&point.value)
        ));
    }
    content.push_str(&format!("</{}>", tag));
    content
}

/// `c:strRef` or `c:numRef` element: the source range and its cached values
pub fn data_reference_xml(range: &CellRangeSpec, cache: &ValueCache) -> String {
    let tag = match cache.kind {
        CacheKind::String => "c:strRef",
        CacheKind::Number => "c:numRef",
    };
    format!(
        "<{tag}><c:f>{}</c:f>{}</{tag}>",
        escape_xml(&range_formula(range)),
        value_cache_xml(cache),
        tag = tag
    )
}
