//! Canonical hashing.
//!
//! Two families of hashes live here:
//!
//! - **Canonical serde hashes** (`canonical_hash`, `canonical_hash_hex`):
//!   xxh64 over the JSON form of a plain serde struct. Used for config
//!   fingerprints.
//! - **Deep hashes** (`deep_hash`, [`DeepHasher`]): xxh64 structural hash of
//!   a [`Value`] graph that honours the equality policy. Used by the engine
//!   to match dict keys and set members, and by the ignore-order matcher to
//!   group sequence elements.
//!
//! ## Determinism Guarantees
//!
//! - Set members, dict entries and record fields hash order-independently
//! - Sequences hash positionally, or order-independently in ignore-order mode
//! - Cycles hash as a back-reference distance, never as an address
//! - Nesting past `max_depth` is an error, never unbounded recursion
//! - Leaves hash through [`EqualityPolicy::scalar_token`], so leaves the
//!   policy calls equal hash alike

use std::collections::BTreeSet;

use serde::Serialize;
use xxhash_rust::xxh64::{xxh64, Xxh64};

use crate::engine::DiffError;
use crate::policy::{DiffConfig, EqualityPolicy, PathFilter};
use crate::types::{Path, PathComponent, Value};

/// Seed shared by every hash in the crate.
const HASH_SEED: u64 = 0;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// Plain data structs always serialize; a failure yields an empty buffer.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), HASH_SEED)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// Structural hash of a value under a configuration.
///
/// Fails with [`DiffError::DepthExceeded`] when the value nests deeper than
/// `max_depth`.
pub fn deep_hash(value: &Value, config: &DiffConfig) -> Result<u64, DiffError> {
    DeepHasher::from_config(config).hash(value)
}

/// Structural hasher bound to one configuration.
#[derive(Debug, Clone)]
pub struct DeepHasher<'a> {
    policy: EqualityPolicy,
    ignore_order: bool,
    ignore_private_variables: bool,
    exclude_types: &'a BTreeSet<String>,
    max_depth: usize,
    paths: Option<&'a PathFilter>,
}

/// Per-hash walk state.
struct Walk<'p> {
    origin: &'p Path,
    on_path: Vec<usize>,
}

impl<'a> DeepHasher<'a> {
    /// Build a hasher from the options that affect equality.
    pub fn from_config(config: &'a DiffConfig) -> Self {
        Self {
            policy: EqualityPolicy::from_config(config),
            ignore_order: config.ignore_order,
            ignore_private_variables: config.ignore_private_variables,
            exclude_types: &config.exclude_types,
            max_depth: config.max_depth,
            paths: None,
        }
    }

    /// Skip children whose path the filter excludes in [`hash_at`](Self::hash_at).
    pub fn with_path_filter(mut self, filter: &'a PathFilter) -> Self {
        self.paths = (!filter.is_empty()).then_some(filter);
        self
    }

    /// Hash a value as the root of a graph.
    pub fn hash(&self, value: &Value) -> Result<u64, DiffError> {
        self.hash_at(value, &Path::root(), 0)
    }

    /// Hash a node found at `path`, `depth` levels below the root.
    ///
    /// Children at excluded paths do not contribute.
    pub fn hash_at(&self, value: &Value, path: &Path, depth: usize) -> Result<u64, DiffError> {
        let mut walk = Walk {
            origin: path,
            on_path: Vec::new(),
        };
        let located = self.paths.map(|_| path);
        self.hash_node(value, located, depth, &mut walk)
    }

    /// Hash a mapping key or set member found under `path`.
    ///
    /// Keys and members carry no paths of their own, so path exclusions do
    /// not apply inside them.
    pub fn hash_detached(&self, value: &Value, path: &Path, depth: usize) -> Result<u64, DiffError> {
        let mut walk = Walk {
            origin: path,
            on_path: Vec::new(),
        };
        self.hash_node(value, None, depth, &mut walk)
    }

    fn hash_node(&self, value: &Value, path: Option<&Path>, depth: usize, walk: &mut Walk<'_>) -> Result<u64, DiffError> {
        if depth > self.max_depth {
            return Err(DiffError::DepthExceeded {
                max_depth: self.max_depth,
                path: path.unwrap_or(walk.origin).to_string(),
            });
        }
        let hash = match value {
            Value::Shared(cell) => {
                if let Some(pos) = walk.on_path.iter().position(|id| *id == cell.id()) {
                    let back = walk.on_path.len() - pos;
                    return Ok(xxh64(format!("<cycle:{back}>").as_bytes(), HASH_SEED));
                }
                walk.on_path.push(cell.id());
                let hash = self.hash_node(&cell.read(), path, depth, walk);
                walk.on_path.pop();
                hash?
            }
            Value::List(items) | Value::Tuple(items) => {
                let children = self.hash_items(items, path, depth, walk, self.ignore_order)?;
                combine(&value.type_name(), &children)
            }
            Value::Set(items) | Value::FrozenSet(items) => {
                // Members are compared whole, so exclusions never reach inside them.
                let children = self.hash_items(items, None, depth, walk, true)?;
                combine(&value.type_name(), &children)
            }
            Value::Dict(entries) => {
                let mut children = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let Some(hv) = self.hash_child(v, path, || PathComponent::Key(k.clone()), depth, walk)? else {
                        continue;
                    };
                    let pair = [self.hash_node(k, None, depth + 1, walk)?, hv];
                    children.push(combine("item", &pair));
                }
                children.sort_unstable();
                combine("dict", &children)
            }
            Value::Record(record) => {
                let mut children = Vec::with_capacity(record.len());
                for (name, v) in record.fields() {
                    if self.ignore_private_variables && name.starts_with("__") {
                        continue;
                    }
                    let Some(hv) = self.hash_child(v, path, || PathComponent::Attribute(name.clone()), depth, walk)?
                    else {
                        continue;
                    };
                    let pair = [xxh64(name.as_bytes(), HASH_SEED), hv];
                    children.push(combine("field", &pair));
                }
                children.sort_unstable();
                combine(record.type_name(), &children)
            }
            leaf => xxh64(self.policy.scalar_token(leaf).as_bytes(), HASH_SEED),
        };
        Ok(hash)
    }

    fn hash_items(
        &self,
        items: &[Value],
        path: Option<&Path>,
        depth: usize,
        walk: &mut Walk<'_>,
        unordered: bool,
    ) -> Result<Vec<u64>, DiffError> {
        let mut children = Vec::with_capacity(items.len());
        for (i, v) in items.iter().enumerate() {
            if let Some(h) = self.hash_child(v, path, || PathComponent::Index(i), depth, walk)? {
                children.push(h);
            }
        }
        if unordered {
            children.sort_unstable();
        }
        Ok(children)
    }

    /// Hash of a child, or `None` when its type or path is excluded.
    fn hash_child(
        &self,
        value: &Value,
        parent: Option<&Path>,
        component: impl FnOnce() -> PathComponent,
        depth: usize,
        walk: &mut Walk<'_>,
    ) -> Result<Option<u64>, DiffError> {
        if self.is_excluded(value) {
            return Ok(None);
        }
        let child = match (parent, self.paths) {
            (Some(parent), Some(filter)) => {
                let child = parent.child(component());
                if filter.excludes(&child) {
                    return Ok(None);
                }
                Some(child)
            }
            _ => None,
        };
        self.hash_node(value, child.as_ref(), depth + 1, walk).map(Some)
    }

    fn is_excluded(&self, value: &Value) -> bool {
        !self.exclude_types.is_empty() && self.exclude_types.contains(value.type_name().as_ref())
    }
}

fn combine(tag: &str, children: &[u64]) -> u64 {
    let mut hasher = Xxh64::new(HASH_SEED);
    hasher.update(tag.as_bytes());
    hasher.update(&(children.len() as u64).to_le_bytes());
    for child in children {
        hasher.update(&child.to_le_bytes());
    }
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Record, SharedValue};

    #[derive(Serialize)]
    struct TestStruct {
        name: String,
        value: i32,
    }

    #[test]
    fn test_determinism() {
        let s = TestStruct {
            name: "test".to_string(),
            value: 42,
        };

        let h1 = canonical_hash(&s);
        let h2 = canonical_hash(&s);
        assert_eq!(h1, h2);
        assert_eq!(canonical_hash_hex(&s).len(), 16);
    }

    #[test]
    fn test_sets_and_dicts_hash_order_independently() {
        let config = DiffConfig::default();
        assert_eq!(
            deep_hash(&Value::set([1, 2, 3]), &config).unwrap(),
            deep_hash(&Value::set([3, 1, 2]), &config).unwrap()
        );
        assert_eq!(
            deep_hash(&Value::dict([("a", 1), ("b", 2)]), &config).unwrap(),
            deep_hash(&Value::dict([("b", 2), ("a", 1)]), &config).unwrap()
        );
    }

    #[test]
    fn test_sequences_hash_positionally_unless_ignoring_order() {
        let strict = DiffConfig::default();
        let loose = DiffConfig::default().with_ignore_order(true);
        let a = Value::list([1, 2]);
        let b = Value::list([2, 1]);
        assert_ne!(deep_hash(&a, &strict).unwrap(), deep_hash(&b, &strict).unwrap());
        assert_eq!(deep_hash(&a, &loose).unwrap(), deep_hash(&b, &loose).unwrap());
    }

    #[test]
    fn test_types_are_distinguished() {
        let config = DiffConfig::default();
        assert_ne!(deep_hash(&Value::Int(1), &config).unwrap(), deep_hash(&Value::Float(1.0), &config).unwrap());
        assert_ne!(deep_hash(&Value::Int(1), &config).unwrap(), deep_hash(&Value::from("1"), &config).unwrap());
        assert_ne!(
            deep_hash(&Value::list([1]), &config).unwrap(),
            deep_hash(&Value::tuple([1]), &config).unwrap()
        );
    }

    #[test]
    fn test_policy_normalization_applies() {
        let config = DiffConfig::default().with_ignore_string_case(true);
        assert_eq!(deep_hash(&Value::from("ABC"), &config).unwrap(), deep_hash(&Value::from("abc"), &config).unwrap());
    }

    #[test]
    fn test_private_fields_ignored() {
        let config = DiffConfig::default();
        let a = Record::new("m.T").with_field("x", 1).with_field("__secret", 1);
        let b = Record::new("m.T").with_field("x", 1).with_field("__secret", 2);
        assert_eq!(deep_hash(&a.into(), &config).unwrap(), deep_hash(&b.into(), &config).unwrap());
    }

    #[test]
    fn test_cycles_hash_finitely_and_stably() {
        let config = DiffConfig::default();
        let make = || {
            let cell = SharedValue::new(Value::None);
            cell.replace(Value::List(vec![Value::Int(1), Value::Shared(cell.clone())]));
            Value::Shared(cell)
        };
        assert_eq!(deep_hash(&make(), &config).unwrap(), deep_hash(&make(), &config).unwrap());
    }

    #[test]
    fn test_nesting_past_max_depth_is_an_error() {
        let mut deep = Value::Int(0);
        for _ in 0..200 {
            deep = Value::List(vec![deep]);
        }
        let config = DiffConfig::default().with_max_depth(50);
        let err = deep_hash(&deep, &config).unwrap_err();
        assert!(matches!(err, DiffError::DepthExceeded { max_depth: 50, .. }));
        assert!(deep_hash(&deep, &DiffConfig::default()).is_ok());
    }

    #[test]
    fn test_excluded_paths_do_not_contribute() {
        let config = DiffConfig::default().with_exclude_path("root[0]['meta']");
        let filter = PathFilter::from_config(&config).unwrap();
        let hasher = DeepHasher::from_config(&config).with_path_filter(&filter);
        let at = Path::root().child(PathComponent::Index(0));

        let a = Value::dict([("id", Value::Int(1)), ("meta", Value::list([1, 2]))]);
        let b = Value::dict([("id", Value::Int(1)), ("meta", Value::list([3]))]);
        assert_eq!(hasher.hash_at(&a, &at, 1).unwrap(), hasher.hash_at(&b, &at, 1).unwrap());

        let elsewhere = Path::root().child(PathComponent::Index(1));
        assert_ne!(
            hasher.hash_at(&a, &elsewhere, 1).unwrap(),
            hasher.hash_at(&b, &elsewhere, 1).unwrap()
        );
        assert_ne!(hasher.hash_detached(&a, &at, 1).unwrap(), hasher.hash_detached(&b, &at, 1).unwrap());
    }
}
