// SPDX-License-Identifier: Apache-2.0
//! Deterministic JSON composition.
//!
//! [`compose`] emits the compact canonical form: no insignificant whitespace,
//! object entries in insertion order. These are the bytes content hashes are
//! computed over, so the rendering must never depend on anything but the
//! value itself. [`compose_pretty`] is the human-facing rendering with
//! two-space indentation; it exists for on-disk inspection and must never
//! feed a digest.

use crate::{Object, Value};

/// Compose `value` into its compact canonical byte form.
#[must_use]
pub fn compose(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value, None, 0);
    out
}

/// Compose `value` with two-space indentation.
#[must_use]
pub fn compose_pretty(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value, Some(2), 0);
    out.push(b'\n');
    out
}

fn write_value(out: &mut Vec<u8>, value: &Value, indent: Option<usize>, depth: usize) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(number) => write_number(out, *number),
        Value::String(bytes) => write_string(out, bytes),
        Value::Array(values) => write_array(out, values, indent, depth),
        Value::Object(object) => write_object(out, object, indent, depth),
    }
}

fn write_array(out: &mut Vec<u8>, values: &[Value], indent: Option<usize>, depth: usize) {
    out.push(b'[');
    for (position, value) in values.iter().enumerate() {
        if position > 0 {
            out.push(b',');
        }
        write_break(out, indent, depth + 1);
        write_value(out, value, indent, depth + 1);
    }
    if !values.is_empty() {
        write_break(out, indent, depth);
    }
    out.push(b']');
}

fn write_object(out: &mut Vec<u8>, object: &Object, indent: Option<usize>, depth: usize) {
    out.push(b'{');
    for (position, (key, value)) in object.iter().enumerate() {
        if position > 0 {
            out.push(b',');
        }
        write_break(out, indent, depth + 1);
        write_string(out, key);
        out.push(b':');
        if indent.is_some() {
            out.push(b' ');
        }
        write_value(out, value, indent, depth + 1);
    }
    if !object.is_empty() {
        write_break(out, indent, depth);
    }
    out.push(b'}');
}

fn write_break(out: &mut Vec<u8>, indent: Option<usize>, depth: usize) {
    if let Some(width) = indent {
        out.push(b'\n');
        out.resize(out.len() + width * depth, b' ');
    }
}

/// Escapes `"`, `\`, and the named control escapes; every other byte passes
/// through verbatim, which is what lets keys and values carry raw row bytes.
fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'"');
    for &byte in bytes {
        match byte {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0C => out.extend_from_slice(b"\\f"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            other => out.push(other),
        }
    }
    out.push(b'"');
}

// Exact-integer doubles render without a fractional part so timestamps and
// counts stay stable across compose/parse cycles. 2^53 bounds the range in
// which every integer is exactly representable.
const EXACT_INTEGER_BOUND: f64 = 9_007_199_254_740_992.0;

fn write_number(out: &mut Vec<u8>, number: f64) {
    if !number.is_finite() {
        // JSON has no non-finite literals.
        out.extend_from_slice(b"null");
        return;
    }
    if number == number.trunc() && number.abs() < EXACT_INTEGER_BOUND {
        let integer = number as i64;
        out.extend_from_slice(format!("{integer}").as_bytes());
    } else {
        out.extend_from_slice(format!("{number}").as_bytes());
    }
}
