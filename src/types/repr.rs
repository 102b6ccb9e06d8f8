//! Builtin-style textual rendering of values.
//!
//! `repr` is the quoted, unambiguous form used inside paths and container
//! renderings (`'a'`, `[1, 2]`, `(1,)`, `set()`). `Display` is the plain form:
//! identical to `repr` except that strings render without quotes.

use std::fmt::{self, Write as _};

use chrono::{NaiveDateTime, Timelike};

use super::value::Value;

impl Value {
    /// Unambiguous rendering (`'a'`, `b'x'`, `[1, 2]`, `{1: 'a'}`, `None`).
    ///
    /// A shared cell reached again while it is being rendered prints as `[...]`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        write_repr(self, &mut out, &mut Vec::new());
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Shared(cell) => fmt::Display::fmt(&*cell.read(), f),
            other => f.write_str(&other.repr()),
        }
    }
}

/// Float rendering with builtin conventions (`1.0`, `1e+16`, `nan`, `inf`).
pub(crate) fn format_float(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = n.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let rendered = format!("{n:e}");
        return match rendered.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent:0>2}")
            }
            Some((mantissa, exponent)) => {
                format!("{mantissa}e-{:0>2}", exponent.trim_start_matches('-'))
            }
            None => rendered,
        };
    }
    format!("{n:?}")
}

/// Date-time rendering: `2020-01-01 10:00:00`, microseconds appended when non-zero.
pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

fn write_repr(value: &Value, out: &mut String, on_path: &mut Vec<usize>) {
    match value {
        Value::None => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(n) => {
            let _ = write!(out, "{n}");
        }
        Value::Float(n) => out.push_str(&format_float(*n)),
        Value::Decimal(d) => {
            let _ = write!(out, "Decimal('{d}')");
        }
        Value::Str(s) => write_str_literal(s, out),
        Value::Bytes(bytes) => write_bytes_literal(bytes, out),
        Value::DateTime(dt) => {
            out.push_str(&format_datetime(dt));
        }
        Value::Date(d) => {
            let _ = write!(out, "{}", d.format("%Y-%m-%d"));
        }
        Value::Time(t) => {
            let _ = write!(out, "{}", t.format("%H:%M:%S%.f"));
        }
        Value::Uuid(u) => {
            let _ = write!(out, "{}", u.hyphenated());
        }
        Value::List(items) => {
            out.push('[');
            write_items(items, out, on_path);
            out.push(']');
        }
        Value::Tuple(items) => {
            out.push('(');
            write_items(items, out, on_path);
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Value::Dict(entries) => {
            out.push('{');
            for (i, (key, val)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(key, out, on_path);
                out.push_str(": ");
                write_repr(val, out, on_path);
            }
            out.push('}');
        }
        Value::Set(members) if members.is_empty() => out.push_str("set()"),
        Value::Set(members) => {
            out.push('{');
            write_items(members, out, on_path);
            out.push('}');
        }
        Value::FrozenSet(members) if members.is_empty() => out.push_str("frozenset()"),
        Value::FrozenSet(members) => {
            out.push_str("frozenset({");
            write_items(members, out, on_path);
            out.push_str("})");
        }
        Value::Record(record) => {
            out.push_str(record.type_name());
            out.push('(');
            for (i, (name, val)) in record.fields().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(name);
                out.push('=');
                write_repr(val, out, on_path);
            }
            out.push(')');
        }
        Value::Opaque(opaque) => {
            let _ = write!(out, "<{} {}>", opaque.type_name(), opaque.token());
        }
        Value::Shared(cell) => {
            if on_path.contains(&cell.id()) {
                out.push_str("[...]");
                return;
            }
            on_path.push(cell.id());
            write_repr(&cell.read(), out, on_path);
            on_path.pop();
        }
    }
}

fn write_items(items: &[Value], out: &mut String, on_path: &mut Vec<usize>) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_repr(item, out, on_path);
    }
}

fn write_str_literal(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

fn write_bytes_literal(bytes: &[u8], out: &mut String) {
    out.push_str("b'");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out.push('\'');
}
