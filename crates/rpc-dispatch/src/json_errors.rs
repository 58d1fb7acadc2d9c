//! Client-safe descriptions of JSON decode failures
//!
//! serde_json messages for type mismatches quote the offending value
//! (``invalid type: string "hunter2", expected i32``). The functions here
//! reduce such a failure to its position and the JSON types involved so the
//! text can be returned to a caller without leaking request content.

use serde_json::error::Category;
use serde_path_to_error::{Path, Segment};

/// A decode failure carrying the path of the value being decoded
pub type FieldError = serde_path_to_error::Error<serde_json::Error>;

/// serde expectations of the calendar-time types (chrono and std)
const TIME_EXPECTATIONS: &[&str] = &[
    "a formatted date and time string or a unix timestamp",
    "a formatted date and time string",
    "a formatted date string",
    "a formatted time string",
    "struct SystemTime",
];

/// Returns a sanitized description of `err`, or `None` when the failure
/// cannot be located (I/O faults).
///
/// `input` must be the exact bytes handed to the decoder; it is used to turn
/// serde's line/column position into a byte offset.
///
/// - syntax: `offset 8: EOF while parsing an object`
/// - type mismatch: `offset 15: cannot unmarshal string as integer`
pub fn json_error_details(err: &serde_json::Error, input: &[u8]) -> Option<String> {
    describe(err, None, input)
}

/// Like [`json_error_details`], naming the field that failed to decode.
///
/// - type mismatch: `offset 26: cannot unmarshal string to "nested.count" as integer`
pub fn json_field_error_details(err: &FieldError, input: &[u8]) -> Option<String> {
    let field = field_path(err.path());
    describe(err.inner(), field.as_deref(), input)
}

fn describe(err: &serde_json::Error, field: Option<&str>, input: &[u8]) -> Option<String> {
    let offset = byte_offset(input, err.line(), err.column());
    let message = strip_position(err);

    match err.classify() {
        Category::Io => None,
        Category::Syntax | Category::Eof => Some(format!("offset {}: {}", offset, message)),
        Category::Data => Some(format!("offset {}: {}", offset, data_fault(&message, field))),
    }
}

/// Dotted object keys leading to the failing value; array indices are skipped
fn field_path(path: &Path) -> Option<String> {
    let keys: Vec<&str> = path
        .iter()
        .filter_map(|segment| match segment {
            Segment::Map { key } => Some(key.as_str()),
            Segment::Enum { variant } => Some(variant.as_str()),
            _ => None,
        })
        .collect();
    (!keys.is_empty()).then(|| keys.join("."))
}

/// Maps a serde "expected ..." description to the JSON type name reported to
/// clients. Custom deserializers describe themselves freely, so the mapping
/// only covers std, serde-derived and chrono shapes.
pub fn json_type(expected: &str) -> Option<&'static str> {
    let expected = expected.trim();
    match expected {
        "a boolean" => return Some("boolean"),
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize" => return Some("integer"),
        "f32" | "f64" => return Some("number"),
        "a string" | "a borrowed string" | "a character" => return Some("string"),
        "struct Duration" => return Some("duration"),
        _ => {}
    }
    if TIME_EXPECTATIONS.contains(&expected) {
        return Some("time");
    }

    if expected.starts_with("a map") || expected.starts_with("struct ") {
        Some("object")
    } else if expected.starts_with("a sequence")
        || expected.starts_with("a tuple")
        || expected.starts_with("an array")
        || expected.starts_with("tuple struct ")
    {
        Some("array")
    } else {
        None
    }
}

fn data_fault(message: &str, field: Option<&str>) -> String {
    let mismatch = message
        .strip_prefix("invalid type: ")
        .or_else(|| message.strip_prefix("invalid value: "));

    if let Some(rest) = mismatch {
        let (unexpected, expected) = match rest.rsplit_once(", expected ") {
            Some((unexpected, expected)) => (unexpected, Some(expected)),
            None => (rest, None),
        };
        let mut text = format!("cannot unmarshal {}", observed_type(unexpected));
        if let Some(field) = field {
            text.push_str(&format!(" to {:?}", field));
        }
        if let Some(t) = expected.and_then(json_type) {
            text.push_str(" as ");
            text.push_str(t);
        }
        return text;
    }

    // Declared keys are part of the schema; an unknown key came from the client
    if message.starts_with("unknown field `") {
        return "unknown field".to_string();
    }
    if message.starts_with("missing field `") || message.starts_with("duplicate field `") {
        return message.to_string();
    }

    "invalid value".to_string()
}

fn observed_type(unexpected: &str) -> &'static str {
    if unexpected.starts_with("boolean") {
        "bool"
    } else if unexpected.starts_with("integer") || unexpected.starts_with("floating point") {
        "number"
    } else if unexpected.starts_with("string") || unexpected.starts_with("character") {
        "string"
    } else if unexpected.starts_with("null") || unexpected.starts_with("unit value") {
        "null"
    } else if unexpected.starts_with("sequence") {
        "array"
    } else if unexpected.starts_with("map") {
        "object"
    } else {
        "value"
    }
}

fn strip_position(err: &serde_json::Error) -> String {
    let full = err.to_string();
    if err.line() == 0 {
        return full;
    }
    let suffix = format!(" at line {} column {}", err.line(), err.column());
    match full.strip_suffix(&suffix) {
        Some(message) => message.to_string(),
        None => full,
    }
}

/// Converts serde's 1-based line and byte column into an offset into `input`.
fn byte_offset(input: &[u8], line: usize, column: usize) -> usize {
    if line <= 1 {
        return column.min(input.len());
    }
    let line_start = input
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'\n')
        .nth(line - 2)
        .map(|(i, _)| i + 1)
        .unwrap_or(input.len());
    (line_start + column).min(input.len())
}
