//! Allow-lists and reconstruction tables.
//!
//! Both are plain values passed to each decode call. Nothing here is global.
//!
//! ## Type Resolution
//!
//! | Type name | Allow-list | Registry | Outcome |
//! |-----------|------------|----------|---------|
//! | builtin safe (`builtins.*`, `datetime.*`, `uuid.UUID`) | not consulted | not consulted | built |
//! | custom | absent | any | `ForbiddenModule` |
//! | custom | present | absent | `ModuleNotFound` |
//! | custom | present | present | built through the registered function |

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::types::Value;

/// Type names every decoder reconstructs without consulting the allow-list.
pub const BUILTIN_SAFE_TYPES: &[&str] = &[
    "builtins.NoneType",
    "builtins.bool",
    "builtins.int",
    "builtins.float",
    "builtins.str",
    "builtins.bytes",
    "builtins.list",
    "builtins.tuple",
    "builtins.dict",
    "builtins.set",
    "builtins.frozenset",
    "builtins.cell",
    "builtins.ref",
    "datetime.datetime",
    "datetime.date",
    "datetime.time",
    "decimal.Decimal",
    "uuid.UUID",
];

/// True for type names in [`BUILTIN_SAFE_TYPES`].
pub fn is_builtin_safe(type_name: &str) -> bool {
    BUILTIN_SAFE_TYPES.contains(&type_name)
}

/// Fully-qualified custom type names a decoder may reconstruct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    names: BTreeSet<String>,
}

impl AllowList {
    /// Only the builtin safe set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, type_name: impl Into<String>) -> Self {
        self.names.insert(type_name.into());
        self
    }

    /// Permit a type name.
    pub fn insert(&mut self, type_name: impl Into<String>) {
        self.names.insert(type_name.into());
    }

    /// True when the name is builtin safe or explicitly permitted.
    pub fn permits(&self, type_name: &str) -> bool {
        is_builtin_safe(type_name) || self.names.contains(type_name)
    }

    /// Explicitly permitted names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&str> for AllowList {
    fn from(type_name: &str) -> Self {
        Self::new().with(type_name)
    }
}

/// Conversion function for one custom type.
///
/// On decode it receives the structurally decoded record (or opaque object)
/// and returns the reconstructed value. On plain JSON projection it receives
/// the live value and returns a JSON-representable stand-in.
pub type Converter = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Explicit per-call table of custom type conversions.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    converters: BTreeMap<String, Converter>,
}

impl TypeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a conversion function for a type name.
    pub fn register<F>(&mut self, type_name: impl Into<String>, converter: F) -> &mut Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.converters.insert(type_name.into(), Arc::new(converter));
        self
    }

    /// Register a type whose decoded structure is used as is.
    pub fn register_passthrough(&mut self, type_name: impl Into<String>) -> &mut Self {
        self.register(type_name, Ok)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, type_name: impl Into<String>, converter: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(type_name, converter);
        self
    }

    /// True when the type name has a conversion.
    pub fn contains(&self, type_name: &str) -> bool {
        self.converters.contains_key(type_name)
    }

    /// The conversion for a type name.
    pub fn get(&self, type_name: &str) -> Option<&Converter> {
        self.converters.get(type_name)
    }

    /// Registered type names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.converters.keys().map(String::as_str)
    }

    /// An allow-list permitting exactly the registered names.
    pub fn allow_list(&self) -> AllowList {
        self.names().collect()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    #[test]
    fn test_builtins_bypass_allow_list() {
        let allow = AllowList::new();
        assert!(allow.permits("builtins.list"));
        assert!(allow.permits("datetime.datetime"));
        assert!(!allow.permits("tests.PicklableClass"));
    }

    #[test]
    fn test_allow_list_from_iterator_and_str() {
        let from_vec: AllowList = vec!["tests.A"].into_iter().collect();
        let from_str = AllowList::from("tests.A");
        assert_eq!(from_vec, from_str);
        assert!(from_str.permits("tests.A"));
    }

    #[test]
    fn test_registry_conversion() {
        let registry = TypeRegistry::new().with("tests.A", |_| Ok(Value::from("obj A")));
        let converter = registry.get("tests.A").unwrap();
        assert_eq!(converter(Record::new("tests.A").into()), Ok(Value::from("obj A")));
        assert!(registry.allow_list().permits("tests.A"));
        assert!(!registry.contains("tests.B"));
    }
}
