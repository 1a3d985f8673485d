//! Canonical JSON and field hashing.
//!
//! Both ends of the protocol hash the same text, so every rule here is part of
//! the wire contract:
//!
//! - object keys sort bytewise, except `challenge`, `challenge_id` and
//!   `challenge_signature`, which always come last in that order
//! - integral numbers print without a fraction; other numbers print in
//!   shortest round-trip form, switching to exponent form below `1e-6` and
//!   from `1e21`
//! - string values shaped like `{...}` are escaped once more before regular
//!   JSON string escaping
//! - quoted `"true"` / `"false"` lose their quotes
//! - every `:` not preceded by a digit and every `,` is followed by exactly
//!   one space
//!
//! The field hash of a message is the lowercase hex SHA3-256 of the canonical
//! JSON of its fields, after dropping the message's own hash field, its own
//! signature field and `id`, and after flattening booleans to `1`/`0` and
//! nested objects or arrays to their canonical JSON text.

use serde_json::{Map, Number, Value};
use sha3::{Digest, Sha3_256};
use std::cmp::Ordering;

/// Keys that always sort last, in this order.
pub const AUTH_KEYS: [&str; 3] = ["challenge", "challenge_id", "challenge_signature"];

/// Field never included in a field hash.
pub const ID_FIELD: &str = "id";

/// Canonical JSON text of `value`.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    let out = out.replace("\"true\"", "true").replace("\"false\"", "false");
    adjust_spacing(&out)
}

/// The flattened field set a field hash is computed over.
#[must_use]
pub fn hashable_fields(object: &Map<String, Value>, hash_field: &str, signature_field: &str) -> Map<String, Value> {
    object
        .iter()
        .filter(|(key, _)| {
            let key = key.as_str();
            key != hash_field && key != signature_field && key != ID_FIELD
        })
        .map(|(key, value)| {
            let flat = match value {
                Value::Bool(b) => Value::Number(Number::from(u8::from(*b))),
                Value::Object(_) | Value::Array(_) => Value::String(canonical_json(value)),
                other => other.clone(),
            };
            (key.clone(), flat)
        })
        .collect()
}

/// The exact text that gets digested for a field hash.
#[must_use]
pub fn field_hash_input(object: &Map<String, Value>, hash_field: &str, signature_field: &str) -> String {
    canonical_json(&Value::Object(hashable_fields(
        object,
        hash_field,
        signature_field,
    )))
}

/// Lowercase hex SHA3-256 field hash of a message object.
#[must_use]
pub fn field_hash(object: &Map<String, Value>, hash_field: &str, signature_field: &str) -> String {
    sha3_hex(field_hash_input(object, hash_field, signature_field).as_bytes())
}

/// Lowercase hex SHA3-256 of `data`.
#[must_use]
pub fn sha3_hex(data: &[u8]) -> String {
    hex::encode(Sha3_256::digest(data))
}

fn key_order(a: &str, b: &str) -> Ordering {
    let rank = |k: &str| AUTH_KEYS.iter().position(|p| *p == k);
    match (rank(a), rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&js_number(n)),
        Value::String(s) => {
            if s.starts_with('{') && s.ends_with('}') {
                push_json_string(&escape_embedded_json(s), out);
            } else {
                push_json_string(s, out);
            }
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| key_order(a, b));
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_json_string(key, out);
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_value(v, out);
                }
            }
            out.push('}');
        }
    }
}

fn escape_embedded_json(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn push_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if u32::from(c) < 0x20 => out.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Number text as a JavaScript engine would print it.
#[must_use]
pub fn js_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    let f = n.as_f64().unwrap_or(0.0);
    format_f64(f)
}

fn format_f64(f: f64) -> String {
    if !f.is_finite() {
        return "null".to_string();
    }
    if f == 0.0 {
        return "0".to_string();
    }
    let abs = f.abs();
    if (1e-6..1e21).contains(&abs) {
        if f.fract() == 0.0 {
            format!("{f:.0}")
        } else {
            format!("{f}")
        }
    } else {
        let text = format!("{f:e}");
        match text.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => text,
        }
    }
}

/// Force single spaces after `:` (unless preceded by a digit) and after `,`.
fn adjust_spacing(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut chars = text.chars().peekable();
    let mut prev: Option<char> = None;
    while let Some(c) = chars.next() {
        let separator = match c {
            ':' if !prev.is_some_and(|p| p.is_ascii_digit()) => true,
            ',' => true,
            _ => false,
        };
        prev = Some(c);
        out.push(c);
        if separator {
            out.push(' ');
            while let Some(&next) = chars.peek() {
                if !next.is_whitespace() {
                    break;
                }
                prev = Some(next);
                chars.next();
            }
        }
    }
    out
}
