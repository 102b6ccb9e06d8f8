//! Crate-level error aggregate.

use thiserror::Error;

use crate::codec::CodecError;
use crate::engine::DiffError;
use crate::loader::LoadError;
use crate::policy::ConfigError;
use crate::reflect::ReflectError;

/// Any failure surfaced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Traversal failure.
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Encode or decode failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Input file failure.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Reflection failure.
    #[error(transparent)]
    Reflect(#[from] ReflectError),
}

/// Result alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
