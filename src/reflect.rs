//! Reflection of Rust values into [`Value`] graphs through serde.
//!
//! Any `Serialize` type can be diffed without hand-written conversions:
//!
//! | Rust shape | Value |
//! |------------|-------|
//! | `bool`, integers, floats, `char`, `&str` | scalar |
//! | `Option::None`, `()` | `None` |
//! | `Vec<T>`, slices | `List` |
//! | tuples | `Tuple` |
//! | maps | `Dict` |
//! | `struct Invoice {..}` | `Record` named `Invoice` |
//! | `Enum::Variant {..}` / `Enum::Variant(..)` | `Record` named `Enum::Variant` |
//! | newtype structs | the wrapped value |
//!
//! Tuple structs and tuple variants use the field names `0`, `1`, ...

use serde::ser::{self, Serialize};
use thiserror::Error;

use crate::types::{Record, Value};

/// Serialization into a [`Value`] failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Reflection failed: {0}")]
pub struct ReflectError(pub String);

impl ser::Error for ReflectError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        ReflectError(msg.to_string())
    }
}

/// Reflect a serializable value.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, ReflectError> {
    value.serialize(ValueSerializer)
}

fn variant_name(name: &str, variant: &str) -> String {
    format!("{name}::{variant}")
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = ReflectError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = RecordBuilder;
    type SerializeTupleVariant = RecordBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = RecordBuilder;
    type SerializeStructVariant = RecordBuilder;

    fn serialize_bool(self, v: bool) -> Result<Value, ReflectError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, ReflectError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, ReflectError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, ReflectError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, ReflectError> {
        Ok(Value::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, ReflectError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, ReflectError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, ReflectError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, ReflectError> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| ReflectError(format!("integer {v} does not fit in i64")))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, ReflectError> {
        Ok(Value::Float(v.into()))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, ReflectError> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, ReflectError> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, ReflectError> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, ReflectError> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn serialize_none(self) -> Result<Value, ReflectError> {
        Ok(Value::None)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, ReflectError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, ReflectError> {
        Ok(Value::None)
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<Value, ReflectError> {
        Ok(Value::Record(Record::new(name)))
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, ReflectError> {
        Ok(Value::Record(Record::new(variant_name(name, variant))))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, ReflectError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, ReflectError> {
        let record = Record::new(variant_name(name, variant)).with_field("0", to_value(value)?);
        Ok(Value::Record(record))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, ReflectError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
            tuple: false,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, ReflectError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len),
            tuple: true,
        })
    }

    fn serialize_tuple_struct(self, name: &'static str, _len: usize) -> Result<RecordBuilder, ReflectError> {
        Ok(RecordBuilder::new(name.to_string()))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<RecordBuilder, ReflectError> {
        Ok(RecordBuilder::new(variant_name(name, variant)))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapBuilder, ReflectError> {
        Ok(MapBuilder {
            entries: Vec::with_capacity(len.unwrap_or(0)),
            key: None,
        })
    }

    fn serialize_struct(self, name: &'static str, _len: usize) -> Result<RecordBuilder, ReflectError> {
        Ok(RecordBuilder::new(name.to_string()))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<RecordBuilder, ReflectError> {
        Ok(RecordBuilder::new(variant_name(name, variant)))
    }
}

struct SeqBuilder {
    items: Vec<Value>,
    tuple: bool,
}

impl SeqBuilder {
    fn finish(self) -> Value {
        if self.tuple {
            Value::Tuple(self.items)
        } else {
            Value::List(self.items)
        }
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = ReflectError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ReflectError> {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ReflectError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = ReflectError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ReflectError> {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ReflectError> {
        Ok(self.finish())
    }
}

struct MapBuilder {
    entries: Vec<(Value, Value)>,
    key: Option<Value>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = ReflectError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), ReflectError> {
        self.key = Some(to_value(key)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ReflectError> {
        let key = self
            .key
            .take()
            .ok_or_else(|| ReflectError("map value without a key".into()))?;
        self.entries.push((key, to_value(value)?));
        Ok(())
    }

    fn end(self) -> Result<Value, ReflectError> {
        Ok(Value::dict(self.entries))
    }
}

struct RecordBuilder {
    record: Record,
    position: usize,
}

impl RecordBuilder {
    fn new(type_name: String) -> Self {
        Self {
            record: Record::new(type_name),
            position: 0,
        }
    }

    fn push_positional<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ReflectError> {
        self.record.set_field(self.position.to_string(), to_value(value)?);
        self.position += 1;
        Ok(())
    }
}

impl ser::SerializeTupleStruct for RecordBuilder {
    type Ok = Value;
    type Error = ReflectError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ReflectError> {
        self.push_positional(value)
    }

    fn end(self) -> Result<Value, ReflectError> {
        Ok(Value::Record(self.record))
    }
}

impl ser::SerializeTupleVariant for RecordBuilder {
    type Ok = Value;
    type Error = ReflectError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ReflectError> {
        self.push_positional(value)
    }

    fn end(self) -> Result<Value, ReflectError> {
        Ok(Value::Record(self.record))
    }
}

impl ser::SerializeStruct for RecordBuilder {
    type Ok = Value;
    type Error = ReflectError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<(), ReflectError> {
        self.record.set_field(key, to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ReflectError> {
        Ok(Value::Record(self.record))
    }
}

impl ser::SerializeStructVariant for RecordBuilder {
    type Ok = Value;
    type Error = ReflectError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<(), ReflectError> {
        self.record.set_field(key, to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ReflectError> {
        Ok(Value::Record(self.record))
    }
}
