//! Core types for the diff kernel.

pub mod value;
pub mod repr;
pub mod path;
pub mod tree;

pub use value::{Value, Record, Opaque, SharedValue, NodeKind};
pub use path::{Path, PathComponent};
pub use tree::{Category, DiffEntry, DiffTree, Repetition, UnknownCategory};
