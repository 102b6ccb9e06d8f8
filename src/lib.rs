//! # deepdiff-kernel
//!
//! Path-addressed structural diffs of nested data graphs.
//!
//! The kernel answers one question:
//!
//! > Given two values, **where** do they differ and **how**?
//!
//! ## Core Contract
//!
//! 1. Walk two graphs in lockstep and classify every discrepancy into a
//!    typed, path-addressed [`DiffTree`]
//! 2. Project that tree into a text view or human sentences
//! 3. Persist and restore trees and values through a codec that only
//!    reconstructs types the caller explicitly allows
//!
//! ## Architecture
//!
//! ```text
//! old, new → DiffEngine ──→ DiffTree ──→ TextView / pretty()
//!               │  ↑            │
//!     EqualityPolicy  Matcher   └──→ codec (encode) ──→ codec (RestrictedDecoder) ──→ DiffTree
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same inputs + same config → identical tree, identical text and pretty output
//! - Categories iterate in wire-name order; entries in detection order
//! - Ignore-order pairing breaks ties by original index
//!
//! ## Example
//!
//! ```
//! use deepdiff_kernel::{diff, Category, DiffConfig, Value};
//!
//! let old = Value::dict([(1, 1), (2, 2), (3, 3)]);
//! let new = Value::dict([(1, 1), (2, 2), (5, 5)]);
//! let tree = diff(&old, &new, &DiffConfig::default()).unwrap();
//!
//! assert_eq!(tree.paths(Category::DictionaryItemAdded), vec!["root[5]"]);
//! assert_eq!(tree.paths(Category::DictionaryItemRemoved), vec!["root[3]"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod policy;
pub mod canonical;
pub mod engine;
pub mod view;
pub mod codec;
pub mod reflect;
pub mod loader;
pub mod error;

// Re-exports
pub use types::{
    Category, DiffEntry, DiffTree, NodeKind, Opaque, Path, PathComponent, Record, Repetition,
    SharedValue, UnknownCategory, Value,
};
pub use policy::{ConfigError, DatetimeTruncation, DiffConfig, EqualityPolicy, PathFilter, MAX_VERBOSE_LEVEL};
pub use canonical::{canonical_hash, canonical_hash_hex, deep_hash, to_canonical_bytes, DeepHasher};
pub use engine::{deep_distance, diff, CacheStats, DiffEngine, DiffError, DiffStats};
pub use view::{pretty_entry, ChangeDetail, RepetitionDetail, TextPayload, TextView};
pub use codec::{
    decode_for_transport, decode_tree, dump, encode_for_transport, encode_tree, load, to_plain_json,
    AllowList, CodecError, DecodeState, RestrictedDecoder, TypeRegistry, DEFAULT_MAX_NESTING, MAGIC_HEADER,
};
pub use reflect::{to_value, ReflectError};
pub use loader::{load_path, Format, LoadError};
pub use error::{Error, Result};

/// Version of the [`DiffConfig`] schema.
/// Increment on breaking changes to configuration fields.
pub const DIFF_CONFIG_VERSION: &str = "1.0.0";
