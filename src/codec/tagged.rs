//! Tagged frames: the type-preserving JSON form of a [`Value`].
//!
//! Scalars JSON can express unambiguously are written as themselves
//! (`null`, booleans, integers, finite floats, strings). Everything else is
//! an object carrying its fully-qualified type name under `__type__`:
//!
//! | Value | Frame |
//! |-------|-------|
//! | list / tuple / set / frozenset | `{"__type__": "builtins.list", "items": [...]}` |
//! | dict | `{"__type__": "builtins.dict", "items": [[k, v], ...]}` |
//! | bytes | `{"__type__": "builtins.bytes", "hex": "..."}` |
//! | NaN / ±inf | `{"__type__": "builtins.float", "repr": "nan"}` |
//! | date-time / date / time | `{"__type__": "datetime.datetime", "iso": "..."}` |
//! | UUID | `{"__type__": "uuid.UUID", "hex": "..."}` |
//! | record | `{"__type__": "billing.Invoice", "fields": [[name, v], ...]}` |
//! | opaque | `{"__type__": "billing.Handle", "token": "..."}` |
//! | shared cell, first visit | `{"__type__": "builtins.cell", "id": n, "value": v}` |
//! | shared cell, later visits | `{"__type__": "builtins.ref", "id": n}` |

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::{json, Value as Frame};

use super::registry::is_builtin_safe;
use crate::types::Value;

/// Key holding the qualified type name of a tagged frame.
pub const TYPE_KEY: &str = "__type__";

/// Date-time format of `iso` fields.
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
/// Date format of `iso` fields.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
/// Time format of `iso` fields.
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Fully-qualified type name of a value, as written under `__type__`.
pub fn qualified_type_name(value: &Value) -> Cow<'_, str> {
    let name = match value {
        Value::None => "builtins.NoneType",
        Value::Bool(_) => "builtins.bool",
        Value::Int(_) => "builtins.int",
        Value::Float(_) => "builtins.float",
        Value::Decimal(_) => "decimal.Decimal",
        Value::Str(_) => "builtins.str",
        Value::Bytes(_) => "builtins.bytes",
        Value::DateTime(_) => "datetime.datetime",
        Value::Date(_) => "datetime.date",
        Value::Time(_) => "datetime.time",
        Value::Uuid(_) => "uuid.UUID",
        Value::List(_) => "builtins.list",
        Value::Tuple(_) => "builtins.tuple",
        Value::Dict(_) => "builtins.dict",
        Value::Set(_) => "builtins.set",
        Value::FrozenSet(_) => "builtins.frozenset",
        Value::Shared(_) => "builtins.cell",
        Value::Record(record) => return Cow::Borrowed(record.type_name()),
        Value::Opaque(opaque) => return Cow::Borrowed(opaque.type_name()),
    };
    Cow::Borrowed(name)
}

/// Encodes values into tagged frames, numbering shared cells.
///
/// One encoder is used per document so that a cell referenced from several
/// places (or from itself) is written once and referenced afterwards.
#[derive(Debug, Default)]
pub struct TaggedEncoder {
    cells: HashMap<usize, u64>,
}

impl TaggedEncoder {
    /// Fresh encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one value.
    pub fn encode(&mut self, value: &Value) -> Frame {
        match value {
            Value::None => Frame::Null,
            Value::Bool(b) => Frame::Bool(*b),
            Value::Int(n) => Frame::from(*n),
            Value::Float(n) => match serde_json::Number::from_f64(*n) {
                Some(number) => Frame::Number(number),
                None => json!({ TYPE_KEY: "builtins.float", "repr": crate::types::repr::format_float(*n) }),
            },
            Value::Decimal(d) => json!({ TYPE_KEY: "decimal.Decimal", "repr": d.to_string() }),
            Value::Str(s) => Frame::String(s.clone()),
            Value::Bytes(bytes) => json!({ TYPE_KEY: "builtins.bytes", "hex": hex::encode(bytes) }),
            Value::DateTime(dt) => {
                json!({ TYPE_KEY: "datetime.datetime", "iso": dt.format(DATETIME_FORMAT).to_string() })
            }
            Value::Date(d) => json!({ TYPE_KEY: "datetime.date", "iso": d.format(DATE_FORMAT).to_string() }),
            Value::Time(t) => json!({ TYPE_KEY: "datetime.time", "iso": t.format(TIME_FORMAT).to_string() }),
            Value::Uuid(u) => json!({ TYPE_KEY: "uuid.UUID", "hex": u.simple().to_string() }),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) | Value::FrozenSet(items) => {
                let items: Vec<Frame> = items.iter().map(|item| self.encode(item)).collect();
                json!({ TYPE_KEY: qualified_type_name(value), "items": items })
            }
            Value::Dict(entries) => {
                let items: Vec<Frame> = entries
                    .iter()
                    .map(|(k, v)| Frame::Array(vec![self.encode(k), self.encode(v)]))
                    .collect();
                json!({ TYPE_KEY: "builtins.dict", "items": items })
            }
            Value::Record(record) => {
                let fields: Vec<Frame> = record
                    .fields()
                    .iter()
                    .map(|(name, v)| Frame::Array(vec![Frame::String(name.clone()), self.encode(v)]))
                    .collect();
                json!({ TYPE_KEY: record.type_name(), "fields": fields })
            }
            Value::Opaque(opaque) => json!({ TYPE_KEY: opaque.type_name(), "token": opaque.token() }),
            Value::Shared(cell) => {
                if let Some(id) = self.cells.get(&cell.id()) {
                    return json!({ TYPE_KEY: "builtins.ref", "id": id });
                }
                let id = self.cells.len() as u64;
                self.cells.insert(cell.id(), id);
                let inner = self.encode(&cell.read());
                json!({ TYPE_KEY: "builtins.cell", "id": id, "value": inner })
            }
        }
    }
}

/// Custom (non-builtin) type names reachable from a value.
pub fn custom_types(value: &Value, out: &mut BTreeSet<String>) {
    fn walk(value: &Value, out: &mut BTreeSet<String>, seen: &mut HashSet<usize>) {
        match value {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) | Value::FrozenSet(items) => {
                items.iter().for_each(|item| walk(item, out, seen));
            }
            Value::Dict(entries) => entries.iter().for_each(|(k, v)| {
                walk(k, out, seen);
                walk(v, out, seen);
            }),
            Value::Record(record) => {
                out.insert(record.type_name().to_string());
                record.fields().iter().for_each(|(_, v)| walk(v, out, seen));
            }
            Value::Opaque(opaque) => {
                out.insert(opaque.type_name().to_string());
            }
            Value::Shared(cell) => {
                if seen.insert(cell.id()) {
                    walk(&cell.read(), out, seen);
                }
            }
            _ => {}
        }
    }
    walk(value, out, &mut HashSet::new());
    out.retain(|name| !is_builtin_safe(name));
}

/// Qualified type names tagged anywhere in a frame, in first-seen order.
pub fn scan_type_names(frame: &Frame) -> Vec<String> {
    fn walk(frame: &Frame, names: &mut Vec<String>) {
        match frame {
            Frame::Array(items) => items.iter().for_each(|item| walk(item, names)),
            Frame::Object(map) => {
                if let Some(Frame::String(name)) = map.get(TYPE_KEY) {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.clone());
                    }
                }
                map.values().for_each(|v| walk(v, names));
            }
            _ => {}
        }
    }
    let mut names = Vec::new();
    walk(frame, &mut names);
    names
}
