//! Plain JSON projection of values.
//!
//! Lossy by nature: tuples and sets become arrays, non-string mapping keys
//! are stringified, and custom types appear only through their registered
//! conversion. Nothing here is ever decoded back.

use std::collections::HashSet;

use serde_json::{Map, Number, Value as Json};

use super::registry::TypeRegistry;
use super::tagged::{DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};
use super::CodecError;
use crate::types::repr::format_float;
use crate::types::Value;

/// Convert a value to plain JSON.
pub fn to_plain_json(value: &Value, registry: &TypeRegistry) -> Result<Json, CodecError> {
    Projector {
        registry,
        active: HashSet::new(),
    }
    .project(value)
}

struct Projector<'a> {
    registry: &'a TypeRegistry,
    active: HashSet<usize>,
}

impl Projector<'_> {
    fn project(&mut self, value: &Value) -> Result<Json, CodecError> {
        Ok(match value {
            Value::None => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::Float(n) => match Number::from_f64(*n) {
                Some(number) => Json::Number(number),
                None => Json::String(format_float(*n)),
            },
            Value::Decimal(d) => match value.as_f64().and_then(Number::from_f64) {
                Some(number) => Json::Number(number),
                None => Json::String(d.to_string()),
            },
            Value::Str(s) => Json::String(s.clone()),
            Value::Bytes(bytes) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
            Value::DateTime(dt) => Json::String(dt.format(DATETIME_FORMAT).to_string()),
            Value::Date(d) => Json::String(d.format(DATE_FORMAT).to_string()),
            Value::Time(t) => Json::String(t.format(TIME_FORMAT).to_string()),
            Value::Uuid(u) => Json::String(u.hyphenated().to_string()),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) | Value::FrozenSet(items) => {
                Json::Array(items.iter().map(|item| self.project(item)).collect::<Result<_, _>>()?)
            }
            Value::Dict(entries) => {
                let mut map = Map::new();
                for (key, v) in entries {
                    map.insert(key.to_string(), self.project(v)?);
                }
                Json::Object(map)
            }
            Value::Record(_) | Value::Opaque(_) => self.convert(value)?,
            Value::Shared(cell) => {
                if !self.active.insert(cell.id()) {
                    return Err(CodecError::Cyclic);
                }
                let result = self.project(&cell.read());
                self.active.remove(&cell.id());
                result?
            }
        })
    }

    fn convert(&mut self, value: &Value) -> Result<Json, CodecError> {
        let type_name = value.type_name().into_owned();
        let registry = self.registry;
        let converter = registry
            .get(&type_name)
            .ok_or_else(|| CodecError::UnrepresentableType(type_name.clone()))?;
        let converted = converter(value.clone()).map_err(|message| CodecError::Reconstruct {
            type_name: type_name.clone(),
            message,
        })?;
        match converted {
            Value::Record(record) => {
                let mut map = Map::new();
                for (name, v) in record.fields() {
                    map.insert(name.clone(), self.project(v)?);
                }
                Ok(Json::Object(map))
            }
            Value::Opaque(opaque) => Ok(Json::String(opaque.token().to_string())),
            other => self.project(&other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Record, SharedValue};
    use serde_json::json;

    #[test]
    fn test_plain_json_flattens_containers() {
        let value = Value::dict([
            (Value::Int(1), Value::tuple([1, 2])),
            (Value::from("s"), Value::set(["a"])),
        ]);
        let json = to_plain_json(&value, &TypeRegistry::new()).unwrap();
        assert_eq!(json, json!({"1": [1, 2], "s": ["a"]}));
    }

    #[test]
    fn test_custom_types_use_registered_conversion() {
        let value = Value::from(Record::new("tests.A"));
        let err = to_plain_json(&value, &TypeRegistry::new()).unwrap_err();
        assert_eq!(err, CodecError::UnrepresentableType("tests.A".into()));

        let registry = TypeRegistry::new().with("tests.A", |_| Ok(Value::from("obj A")));
        assert_eq!(to_plain_json(&value, &registry).unwrap(), json!("obj A"));

        let passthrough = TypeRegistry::new().with("tests.A", Ok);
        let record = Value::from(Record::new("tests.A").with_field("x", 1));
        assert_eq!(to_plain_json(&record, &passthrough).unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let cell = SharedValue::new(Value::None);
        cell.replace(Value::list([Value::Shared(cell.clone())]));
        let err = to_plain_json(&Value::Shared(cell), &TypeRegistry::new()).unwrap_err();
        assert_eq!(err, CodecError::Cyclic);
    }

    #[test]
    fn test_shared_without_cycle_is_repeated() {
        let cell = SharedValue::new(Value::Int(5));
        let value = Value::list([Value::Shared(cell.clone()), Value::Shared(cell)]);
        assert_eq!(to_plain_json(&value, &TypeRegistry::new()).unwrap(), json!([5, 5]));
    }
}
