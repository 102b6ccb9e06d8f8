//! Comparison configuration and the leaf equality policy.

pub mod config;
pub mod equality;
pub mod exclusion;

pub use config::{ConfigError, DatetimeTruncation, DiffConfig, MAX_VERBOSE_LEVEL};
pub use equality::{round_to_string, EqualityPolicy};
pub use exclusion::PathFilter;
