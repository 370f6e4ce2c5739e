//! Cell value types

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use std::fmt;

/// Text form of persisted date literals (ISO 8601, no offset)
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The data-kind tag of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellKind {
    /// No value
    Empty,
    /// Text, pooled or inline
    String,
    /// Numeric literal
    Number,
    /// Date literal
    Date,
    /// TRUE/FALSE
    Boolean,
    /// Error literal such as `#N/A`
    Error,
}

impl CellKind {
    /// Get the kind name for messages
    pub fn name(self) -> &'static str {
        match self {
            CellKind::Empty => "empty",
            CellKind::String => "string",
            CellKind::Number => "number",
            CellKind::Date => "date",
            CellKind::Boolean => "boolean",
            CellKind::Error => "error",
        }
    }
}

/// Represents the value stored in a cell
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellValue {
    /// Empty cell (no value)
    #[default]
    Empty,

    /// String value, stored through the shared string pool
    String(String),

    /// Numeric value
    Number(f64),

    /// Date value, stored as an ISO 8601 literal
    Date(NaiveDateTime),

    /// Boolean value (TRUE/FALSE)
    Boolean(bool),

    /// Error value (#VALUE!, #REF!, etc.)
    Error(String),
}

impl CellValue {
    /// Create a new string value
    pub fn string<S: Into<String>>(s: S) -> Self {
        CellValue::String(s.into())
    }

    /// Check if writing this value clears the cell
    ///
    /// An empty string counts as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// The kind tag this value is persisted with
    pub fn kind(&self) -> CellKind {
        match self {
            CellValue::Empty => CellKind::Empty,
            CellValue::String(s) if s.is_empty() => CellKind::Empty,
            CellValue::String(_) => CellKind::String,
            CellValue::Number(_) => CellKind::Number,
            CellValue::Date(_) => CellKind::Date,
            CellValue::Boolean(_) => CellKind::Boolean,
            CellValue::Error(_) => CellKind::Error,
        }
    }

    /// Try to get the value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get the value as a string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the value as a date
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Reject values that cannot be written to a cell
    ///
    /// Error literals are kept on cells loaded from a package but never written.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            CellValue::Number(n) if !n.is_finite() => Err(Error::InvalidNumber(*n)),
            CellValue::Error(_) => Err(Error::UnsupportedValue(CellKind::Error.name())),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::String(s) => write!(f, "{}", s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            CellValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Error(e) => write!(f, "{}", e),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(f64::from(n))
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(d: NaiveDateTime) -> Self {
        CellValue::Date(d)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(CellValue::Empty, Into::into)
    }
}

/// What a persisted cell node holds
///
/// Scalars keep their literal text exactly as stored so that unchanged cells
/// are written back byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellContent {
    /// Index into the document's shared string pool
    SharedString(usize),
    /// Text stored on the cell itself (inline strings, formula string results)
    Text(String),
    /// Numeric literal
    Number(String),
    /// ISO 8601 date literal
    Date(String),
    /// Boolean literal
    Boolean(bool),
    /// Error literal
    Error(String),
}

impl CellContent {
    /// Encode a non-pooled value; strings go through the pool instead
    pub(crate) fn from_scalar(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Number(n) => Some(CellContent::Number(format_number(*n))),
            CellValue::Date(d) => Some(CellContent::Date(d.format(DATE_FORMAT).to_string())),
            CellValue::Boolean(b) => Some(CellContent::Boolean(*b)),
            CellValue::Error(e) => Some(CellContent::Error(e.clone())),
            CellValue::Empty | CellValue::String(_) => None,
        }
    }

    /// The kind tag of this content
    pub fn kind(&self) -> CellKind {
        match self {
            CellContent::SharedString(_) | CellContent::Text(_) => CellKind::String,
            CellContent::Number(_) => CellKind::Number,
            CellContent::Date(_) => CellKind::Date,
            CellContent::Boolean(_) => CellKind::Boolean,
            CellContent::Error(_) => CellKind::Error,
        }
    }

    /// The pool index, for pooled strings
    pub fn shared_string_index(&self) -> Option<usize> {
        match self {
            CellContent::SharedString(i) => Some(*i),
            _ => None,
        }
    }

    /// Decode to a typed value; pooled strings resolve through `lookup`
    ///
    /// Literals that do not parse decode as strings holding the literal text.
    pub fn decode<'p>(&self, lookup: impl Fn(usize) -> Option<&'p str>) -> CellValue {
        match self {
            CellContent::SharedString(i) => {
                CellValue::String(lookup(*i).unwrap_or_default().to_string())
            }
            CellContent::Text(s) => CellValue::String(s.clone()),
            CellContent::Number(s) => s
                .trim()
                .parse::<f64>()
                .map(CellValue::Number)
                .unwrap_or_else(|_| CellValue::String(s.clone())),
            CellContent::Date(s) => parse_date(s)
                .map(CellValue::Date)
                .unwrap_or_else(|| CellValue::String(s.clone())),
            CellContent::Boolean(b) => CellValue::Boolean(*b),
            CellContent::Error(e) => CellValue::Error(e.clone()),
        }
    }
}

/// Format a number the way it is persisted (shortest round-trip form)
pub fn format_number(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Parse a persisted date literal
///
/// Accepts full date-times (with optional fractional seconds) and bare dates.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
