//! JSON value semantics used by the renderer: truthiness, output formatting,
//! HTML escaping, and path navigation.

use serde_json::Value;

/// Mustache truthiness: `false`, `null`, `0`, `""` and `[]` are falsy.
/// Objects (even empty ones) are truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Whether a value counts as empty for `{{#if}}` (which may opt into treating `0` as present).
pub fn is_empty_for_if(value: &Value, include_zero: bool) -> bool {
    match value {
        Value::Number(_) if include_zero => false,
        other => !is_truthy(other),
    }
}

/// Converts a value to its textual form in template output.
///
/// Strings are emitted as-is, `null` renders nothing, arrays are joined with commas
/// and objects render as `[object Object]`.
pub fn to_output_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_output_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn format_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Escapes `& < > " ' \` =` for safe HTML output.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '`' => escaped.push_str("&#x60;"),
            '=' => escaped.push_str("&#x3D;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Follows `parts` through objects (by key) and arrays (by index or `length`).
pub fn navigate<'v>(value: &'v Value, parts: &[String]) -> Option<&'v Value> {
    parts.iter().try_fold(value, |current, part| step(current, part))
}

fn step<'v>(value: &'v Value, part: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Same as [`navigate`] but produces an owned value, supporting the virtual
/// `length` property of arrays and strings.
pub fn navigate_owned(value: &Value, parts: &[String]) -> Option<Value> {
    let Some((last, init)) = parts.split_last() else {
        return Some(value.clone());
    };
    let parent = navigate(value, init)?;
    match (parent, last.as_str()) {
        (Value::Array(items), "length") => Some(Value::from(items.len())),
        (Value::String(s), "length") => Some(Value::from(s.chars().count())),
        _ => step(parent, last).cloned(),
    }
}
