//! Text escaping for SpreadsheetML

/// Escape text for element content and attribute values
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Decode Excel's `_xHHHH_` escape sequences in strings.
///
/// Excel uses this format for characters XML cannot carry:
/// - `_x000d_` = CR (carriage return)
/// - `_x0001_` = control character U+0001
/// - `_x005f_` = Underscore (escaped underscore)
pub(crate) fn decode_excel_escapes(s: &str) -> String {
    if !s.contains("_x") {
        return s.to_string();
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find("_x") {
        result.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        match decode_one(candidate) {
            Some(c) => {
                result.push(c);
                rest = &candidate[7..];
            }
            None => {
                result.push('_');
                rest = &candidate[1..];
            }
        }
    }
    result.push_str(rest);
    result
}

/// Decode `_xHHHH_` at the start of `s`
fn decode_one(s: &str) -> Option<char> {
    let bytes = s.as_bytes();
    if bytes.len() < 7 || bytes[6] != b'_' || !bytes[2..6].iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    u32::from_str_radix(&s[2..6], 16)
        .ok()
        .and_then(char::from_u32)
}

/// Encode text so it survives a round trip through Excel
///
/// Control characters other than tab, LF and CR become `_xHHHH_`, and an underscore that
/// would otherwise start an escape is itself escaped.
pub(crate) fn encode_excel_escapes(s: &str) -> String {
    let needs_work = s
        .chars()
        .any(|c| (c.is_control() && !matches!(c, '\t' | '\n' | '\r')) || c == '_');
    if !needs_work {
        return s.to_string();
    }

    let mut result = String::with_capacity(s.len() + 8);
    for (i, c) in s.char_indices() {
        if c == '_' && decode_one(&s[i..]).is_some() {
            result.push_str("_x005F_");
        } else if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') {
            result.push_str(&format!("_x{:04X}_", c as u32));
        } else {
            result.push(c);
        }
    }
    result
}
