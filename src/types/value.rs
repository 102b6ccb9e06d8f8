//! The value graph compared by the diff engine.
//!
//! ## Node Kinds
//!
//! | Kind | Variants |
//! |------|----------|
//! | Scalar | `None`, `Bool`, `Int`, `Float`, `Decimal`, `Str`, `Bytes`, `DateTime`, `Date`, `Time`, `Uuid`, `Opaque` |
//! | Sequence | `List`, `Tuple` |
//! | Mapping | `Dict` |
//! | Set | `Set`, `FrozenSet` |
//! | Record | `Record` |
//!
//! `Shared` is not a kind of its own: it is a reference cell that gives a node
//! an identity and lets a graph point back at itself. Every operation that
//! inspects a value looks through the cell.
//!
//! ## Equality
//!
//! `PartialEq` is structural and type-strict (`1 != 1.0`). Dicts, sets and
//! record fields compare without regard to order. Comparison is coinductive:
//! a pair of shared cells met again on the current comparison path is taken
//! as equal, so cyclic graphs compare in finite time.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::{RwLock, RwLockReadGuard};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Coarse classification used by the traversal engine for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Leaf value compared by the equality policy.
    Scalar,
    /// Positional container (`list`, `tuple`).
    Sequence,
    /// Key/value container (`dict`).
    Mapping,
    /// Unordered container without duplicates (`set`, `frozenset`).
    Set,
    /// Attribute-bearing custom object.
    Record,
}

/// A node in a nested data graph.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absence of a value.
    None,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// Exact base-10 number.
    Decimal(Decimal),
    /// UTF-8 text.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Date and time without timezone.
    DateTime(NaiveDateTime),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// UUID.
    Uuid(Uuid),
    /// Mutable-style ordered sequence.
    List(Vec<Value>),
    /// Immutable-style ordered sequence.
    Tuple(Vec<Value>),
    /// Insertion-ordered mapping with arbitrary keys.
    Dict(Vec<(Value, Value)>),
    /// Unordered collection of distinct members.
    Set(Vec<Value>),
    /// Immutable unordered collection of distinct members.
    FrozenSet(Vec<Value>),
    /// Custom object exposing named fields.
    Record(Record),
    /// Custom object that cannot enumerate its fields.
    Opaque(Opaque),
    /// Reference cell giving the inner value an identity.
    Shared(SharedValue),
}

/// A custom object with a qualified type name and ordered named fields.
///
/// Records are the "enumerate fields" capability: the engine diffs them
/// attribute by attribute. Field names are unique within a record.
#[derive(Debug, Clone)]
pub struct Record {
    type_name: String,
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an empty record of the given qualified type (e.g. `"billing.Invoice"`).
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field setter. Replaces an existing field of the same name.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Set a field, replacing an existing one of the same name in place.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Qualified type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consume the record, returning its fields.
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        records_eq(self, other, &mut Vec::new())
    }
}

/// A custom object without field reflection.
///
/// Compared as a scalar: two opaques are equal when both the type name and
/// the identity token match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Opaque {
    type_name: String,
    token: String,
}

impl Opaque {
    /// Create an opaque object of the given qualified type.
    pub fn new(type_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            token: token.into(),
        }
    }

    /// Qualified type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Identity token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Reference cell that gives a value an identity.
///
/// Cloning a `SharedValue` clones the reference, not the value, so a cell
/// can be placed inside its own contents to build a cyclic graph. Reads use
/// recursive read locks: re-entering a cell already being read on the same
/// thread never blocks.
#[derive(Clone)]
pub struct SharedValue(Arc<RwLock<Value>>);

impl SharedValue {
    /// Wrap a value in a new cell.
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Identity of the cell (stable for its lifetime).
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// True when both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Read the contents.
    pub fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.0.read_recursive()
    }

    /// Replace the contents, returning the previous value.
    ///
    /// Must not be called while a read guard of the same cell is alive on
    /// this thread.
    pub fn replace(&self, value: Value) -> Value {
        std::mem::replace(&mut *self.0.write(), value)
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedValue({:#x})", self.id())
    }
}

impl PartialEq for SharedValue {
    fn eq(&self, other: &Self) -> bool {
        values_eq(
            &Value::Shared(self.clone()),
            &Value::Shared(other.clone()),
            &mut Vec::new(),
        )
    }
}

impl Value {
    /// Build a list.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a tuple.
    pub fn tuple<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Build a dict. A repeated key overwrites the earlier value in place.
    pub fn dict<K: Into<Value>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut entries: Vec<(Value, Value)> = Vec::new();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            match entries.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        }
        Self::Dict(entries)
    }

    /// Build a set. Duplicate members are dropped, first occurrence wins.
    pub fn set<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::Set(distinct(items))
    }

    /// Build a frozenset. Duplicate members are dropped, first occurrence wins.
    pub fn frozenset<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::FrozenSet(distinct(items))
    }

    /// Wrap a value in a new shared cell.
    pub fn shared(value: impl Into<Value>) -> Self {
        Self::Shared(SharedValue::new(value.into()))
    }

    /// Coarse kind, looking through shared cells.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::List(_) | Self::Tuple(_) => NodeKind::Sequence,
            Self::Dict(_) => NodeKind::Mapping,
            Self::Set(_) | Self::FrozenSet(_) => NodeKind::Set,
            Self::Record(_) => NodeKind::Record,
            Self::Shared(cell) => cell.read().kind(),
            _ => NodeKind::Scalar,
        }
    }

    /// Short type name as reported in `type_changes` (`int`, `str`, `list`, ...).
    ///
    /// Records and opaque objects report their qualified type name.
    pub fn type_name(&self) -> Cow<'_, str> {
        match self {
            Self::None => Cow::Borrowed("NoneType"),
            Self::Bool(_) => Cow::Borrowed("bool"),
            Self::Int(_) => Cow::Borrowed("int"),
            Self::Float(_) => Cow::Borrowed("float"),
            Self::Decimal(_) => Cow::Borrowed("Decimal"),
            Self::Str(_) => Cow::Borrowed("str"),
            Self::Bytes(_) => Cow::Borrowed("bytes"),
            Self::DateTime(_) => Cow::Borrowed("datetime"),
            Self::Date(_) => Cow::Borrowed("date"),
            Self::Time(_) => Cow::Borrowed("time"),
            Self::Uuid(_) => Cow::Borrowed("UUID"),
            Self::List(_) => Cow::Borrowed("list"),
            Self::Tuple(_) => Cow::Borrowed("tuple"),
            Self::Dict(_) => Cow::Borrowed("dict"),
            Self::Set(_) => Cow::Borrowed("set"),
            Self::FrozenSet(_) => Cow::Borrowed("frozenset"),
            Self::Record(record) => Cow::Borrowed(record.type_name()),
            Self::Opaque(opaque) => Cow::Borrowed(opaque.type_name()),
            Self::Shared(cell) => Cow::Owned(cell.read().type_name().into_owned()),
        }
    }

    /// True for `Int`, `Float` and `Decimal`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_) | Self::Decimal(_))
    }

    /// Numeric value as `f64`, if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            Self::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Integer value, if an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Text, if a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// True for `None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Number of direct children (0 for scalars).
    pub fn child_count(&self) -> usize {
        match self {
            Self::List(items) | Self::Tuple(items) | Self::Set(items) | Self::FrozenSet(items) => {
                items.len()
            }
            Self::Dict(entries) => entries.len(),
            Self::Record(record) => record.len(),
            Self::Shared(cell) => cell.read().child_count(),
            _ => 0,
        }
    }
}

fn distinct<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Vec<Value> {
    let mut members: Vec<Value> = Vec::new();
    for item in items {
        let item = item.into();
        if !members.contains(&item) {
            members.push(item);
        }
    }
    members
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_eq(self, other, &mut Vec::new())
    }
}

/// Coinductive structural equality. `on_path` holds the shared-cell pairs
/// currently being compared.
fn values_eq(a: &Value, b: &Value, on_path: &mut Vec<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Shared(x), Value::Shared(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let pair = (x.id(), y.id());
            if on_path.contains(&pair) {
                return true;
            }
            on_path.push(pair);
            let equal = values_eq(&x.read(), &y.read(), on_path);
            on_path.pop();
            equal
        }
        (Value::Shared(x), other) => values_eq(&x.read(), other, on_path),
        (other, Value::Shared(y)) => values_eq(other, &y.read(), on_path),
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::Decimal(x), Value::Decimal(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::DateTime(x), Value::DateTime(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Time(x), Value::Time(y)) => x == y,
        (Value::Uuid(x), Value::Uuid(y)) => x == y,
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|(left, right)| values_eq(left, right, on_path))
        }
        (Value::Set(x), Value::Set(y)) | (Value::FrozenSet(x), Value::FrozenSet(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|left| y.iter().any(|right| values_eq(left, right, on_path)))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            x.len() == y.len()
                && x.iter().all(|(key, left)| {
                    y.iter()
                        .find(|(other_key, _)| values_eq(key, other_key, on_path))
                        .is_some_and(|(_, right)| values_eq(left, right, on_path))
                })
        }
        (Value::Record(x), Value::Record(y)) => records_eq(x, y, on_path),
        (Value::Opaque(x), Value::Opaque(y)) => x == y,
        _ => false,
    }
}

fn records_eq(a: &Record, b: &Record, on_path: &mut Vec<(usize, usize)>) -> bool {
    a.type_name == b.type_name
        && a.fields.len() == b.fields.len()
        && a.fields.iter().all(|(name, left)| {
            b.field(name)
                .is_some_and(|right| values_eq(left, right, on_path))
        })
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Self::Time(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Self::Record(value)
    }
}

impl From<Opaque> for Value {
    fn from(value: Opaque) -> Self {
        Self::Opaque(value)
    }
}

impl From<SharedValue> for Value {
    fn from(value: SharedValue) -> Self {
        Self::Shared(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::list(value)
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::list(iter)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::list(items),
            serde_json::Value::Object(map) => {
                Self::Dict(map.into_iter().map(|(k, v)| (Self::Str(k), v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_match_builtin_names() {
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::from("b").type_name(), "str");
        assert_eq!(Value::list([1, 2]).type_name(), "list");
        assert_eq!(Value::set([1, 2]).type_name(), "set");
        assert_eq!(Value::None.type_name(), "NoneType");
        assert_eq!(Value::from(Record::new("tests.A")).type_name(), "tests.A");
        assert_eq!(Value::shared(Value::list([1])).type_name(), "list");
    }

    #[test]
    fn test_equality_is_type_strict() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::list([1, 2]), Value::tuple([1, 2]));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn test_decimals_compare_by_value() {
        let a = Value::from(Decimal::new(112, 1));
        assert_eq!(a.type_name(), "Decimal");
        assert_eq!(a, Value::from(Decimal::new(1120, 2)));
        assert_ne!(a, Value::Float(11.2));
        assert_eq!(a.as_f64(), Some(11.2));
    }

    #[test]
    fn test_dict_and_set_equality_ignores_order() {
        assert_eq!(Value::dict([(1, "a"), (2, "b")]), Value::dict([(2, "b"), (1, "a")]));
        assert_eq!(Value::set([1, 2, 3]), Value::set([3, 2, 1]));
        assert_ne!(Value::list([1, 2]), Value::list([2, 1]));
    }

    #[test]
    fn test_set_constructor_drops_duplicates() {
        let set = Value::set([1, 2, 2, 1]);
        assert_eq!(set.child_count(), 2);
    }

    #[test]
    fn test_record_field_replacement_keeps_position() {
        let record = Record::new("m.T").with_field("a", 1).with_field("b", 2).with_field("a", 3);
        assert_eq!(record.fields()[0].0, "a");
        assert_eq!(record.field("a"), Some(&Value::Int(3)));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_cyclic_values_compare_equal() {
        let a = SharedValue::new(Value::None);
        a.replace(Value::List(vec![Value::Int(1), Value::Shared(a.clone())]));
        let b = SharedValue::new(Value::None);
        b.replace(Value::List(vec![Value::Int(1), Value::Shared(b.clone())]));

        assert_eq!(Value::Shared(a.clone()), Value::Shared(b.clone()));
        assert_eq!(a.read().kind(), NodeKind::Sequence);
    }

    #[test]
    fn test_from_json_keeps_integers() {
        let value = Value::from(serde_json::json!({"a": [1, 2.5, null]}));
        assert_eq!(
            value,
            Value::dict([("a", Value::list([Value::Int(1), Value::Float(2.5), Value::None]))])
        );
    }
}
