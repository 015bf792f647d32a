//! Query-string encoding for tracking parameters.

use crate::types::Event;

use serde_json::Value;

/// Encode an event as `key=value` pairs joined by `&`, in insertion order.
///
/// Arrays repeat the key once per element and vanish when empty. Nulls and
/// nested objects encode as an empty value.
pub fn stringify(event: &Event) -> String {
    let mut out = String::new();
    for (key, value) in event.iter() {
        let key = escape(key);
        match value {
            Value::Array(items) => {
                for item in items {
                    push_pair(&mut out, &key, &primitive(item));
                }
            }
            other => push_pair(&mut out, &key, &primitive(other)),
        }
    }
    out
}

fn push_pair(out: &mut String, key: &str, value: &str) {
    if !out.is_empty() {
        out.push('&');
    }
    out.push_str(key);
    out.push('=');
    out.push_str(&escape(value));
}

fn primitive(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                n.as_f64().map(format_float).unwrap_or_default()
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

// JavaScript number rendering: integral floats drop `.0`, magnitudes outside
// [1e-6, 1e21) use exponent notation with an explicit sign (`1.5e+21`).
fn format_float(f: f64) -> String {
    if !f.is_finite() {
        return String::new();
    }
    if f == 0.0 {
        return "0".to_string();
    }
    let magnitude = f.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let rendered = format!("{f:e}");
        return match rendered.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => rendered,
        };
    }
    if f.fract() == 0.0 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

/// Percent-encode every byte outside `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn escape(raw: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(raw.len());
    for &b in raw.as_bytes() {
        if b.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0f) as usize] as char);
        }
    }
    out
}
