//! Serialization guard.
//!
//! Every decode path runs through [`RestrictedDecoder`]: a payload may only
//! reconstruct builtin safe types plus the custom types the caller lists in
//! an [`AllowList`] and provides a conversion for in a [`TypeRegistry`].
//! Both are passed to each call; there is no process-wide table.
//!
//! ## Formats
//!
//! | Format | Producer | Consumer |
//! |--------|----------|----------|
//! | Binary payload | [`dump`] | [`load`] |
//! | Diff tree document (JSON) | [`encode_tree`], [`encode_for_transport`] | [`decode_tree`], [`decode_for_transport`] |
//! | Plain JSON (lossy) | [`to_plain_json`], [`TextView::to_json`](crate::TextView::to_json) | none |
//!
//! Binary payloads are laid out as:
//!
//! ```text
//! DeepDiff Delta Payload v0-0-1\n
//! <sha256 of body, lowercase hex>\n
//! <CBOR-encoded tagged frame>
//! ```

mod decoder;
mod document;
mod json;
mod payload;
mod registry;
mod tagged;

pub use decoder::{DecodeState, RestrictedDecoder, DEFAULT_MAX_NESTING};
pub use document::{decode_for_transport, decode_tree, encode_for_transport, encode_tree};
pub use json::to_plain_json;
pub use payload::{dump, load};
pub use registry::{is_builtin_safe, AllowList, Converter, TypeRegistry, BUILTIN_SAFE_TYPES};
pub use tagged::{custom_types, qualified_type_name, scan_type_names, TaggedEncoder, TYPE_KEY};

use thiserror::Error;

/// Magic first line of every payload and document.
pub const MAGIC_HEADER: &str = "DeepDiff Delta Payload v0-0-1\n";

/// Errors from encoding or decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input is not a well-formed payload or document.
    #[error("Decode format error: {0}")]
    DecodeFormat(String),

    /// A custom type name is not in the caller's allow-list.
    #[error("Module '{0}' is forbidden. You need to explicitly allow it in the decoder's allow-list")]
    ForbiddenModule(String),

    /// A permitted custom type has no registered conversion.
    #[error("Module '{0}' is not found. Register a conversion for it before decoding")]
    ModuleNotFound(String),

    /// A custom type cannot be written to this format.
    #[error("Type '{0}' is not representable without a registered conversion")]
    UnrepresentableType(String),

    /// A registered conversion rejected its input.
    #[error("Failed to reconstruct '{type_name}': {message}")]
    Reconstruct {
        /// Type being reconstructed.
        type_name: String,
        /// Message returned by the conversion.
        message: String,
    },

    /// Plain JSON cannot express a cyclic value.
    #[error("Cyclic value cannot be written as plain JSON")]
    Cyclic,

    /// Encoder failure.
    #[error("Encode error: {0}")]
    Encode(String),
}
