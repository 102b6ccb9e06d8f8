//! DiffConfig v1: comparison options and resource cutoffs.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! Float parameters are quantized to integers (factor 1e6) before hashing so
//! the config fingerprint does not depend on float formatting.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::DIFF_CONFIG_VERSION;

/// Quantization factor for float normalization.
const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Highest supported verbosity.
pub const MAX_VERBOSE_LEVEL: u8 = 2;

/// Error type for invalid configurations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Verbosity above the supported range.
    #[error("verbose_level must be 0, 1 or 2, got {0}")]
    InvalidVerboseLevel(u8),
    /// An `exclude_regex_paths` entry does not compile.
    #[error("Invalid exclude_regex_paths pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },
    /// Pairing cutoff outside `(0, 1]`.
    #[error("cutoff_distance_for_pairs must be in (0, 1], got {0}")]
    InvalidCutoff(f64),
    /// Negative or non-finite epsilon.
    #[error("math_epsilon must be a finite non-negative number, got {0}")]
    InvalidEpsilon(f64),
}

/// Granularity to which date-times are truncated before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatetimeTruncation {
    /// Drop sub-second precision.
    Second,
    /// Drop seconds.
    Minute,
    /// Drop minutes.
    Hour,
    /// Drop the time of day.
    Day,
}

/// Comparison configuration.
///
/// ## Parameters
///
/// - `ignore_order`: compare sequences as multisets (ignore-order matcher)
/// - `report_repetition`: report multiplicity changes in ignore-order mode
/// - `significant_digits`: compare numbers after rounding to N decimal places
/// - `ignore_string_case`: compare strings case-insensitively
/// - `verbose_level`: how much the text view shows (0, 1 or 2)
/// - `exclude_paths` / `exclude_regex_paths` / `exclude_types`: nodes never compared
/// - `max_depth`, `max_passes`, `max_diffs`, `max_pairing_candidates`: resource cutoffs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Config version identifier.
    pub version: String,
    /// Compare sequences without regard to position.
    pub ignore_order: bool,
    /// Report multiplicity changes (only with `ignore_order`).
    pub report_repetition: bool,
    /// Decimal places numbers are rounded to before comparison.
    pub significant_digits: Option<u32>,
    /// Case-insensitive string comparison.
    pub ignore_string_case: bool,
    /// Default text view verbosity (0, 1 or 2).
    pub verbose_level: u8,
    /// Rendered paths that are never compared (e.g. `root['meta']`).
    pub exclude_paths: BTreeSet<String>,
    /// Patterns matched against rendered paths; matches are never compared.
    pub exclude_regex_paths: Vec<String>,
    /// Type names that are never compared (e.g. `datetime`, `billing.Invoice`).
    pub exclude_types: BTreeSet<String>,
    /// `int` and `float` compare numerically and never change type.
    pub ignore_numeric_type_changes: bool,
    /// `str` and `bytes` compare as text and never change type.
    pub ignore_string_type_changes: bool,
    /// NaN equals NaN.
    pub ignore_nan_inequality: bool,
    /// Skip record fields whose name starts with `__`.
    pub ignore_private_variables: bool,
    /// Truncate date-times before comparison.
    pub truncate_datetime: Option<DatetimeTruncation>,
    /// Absolute tolerance for float comparison.
    pub math_epsilon: Option<f64>,
    /// Maximum recursion depth.
    pub max_depth: usize,
    /// Budget of pair-distance computations in ignore-order mode.
    pub max_passes: usize,
    /// Stop recording entries after this many.
    pub max_diffs: Option<usize>,
    /// Candidate pairs at or above this distance are never paired.
    pub cutoff_distance_for_pairs: f64,
    /// Skip pairing when `removed * added` exceeds this.
    pub max_pairing_candidates: usize,
    /// Capacity of the pair-distance cache (0 disables it).
    pub cache_size: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            version: DIFF_CONFIG_VERSION.to_string(),
            ignore_order: false,
            report_repetition: false,
            significant_digits: None,
            ignore_string_case: false,
            verbose_level: 1,
            exclude_paths: BTreeSet::new(),
            exclude_regex_paths: Vec::new(),
            exclude_types: BTreeSet::new(),
            ignore_numeric_type_changes: false,
            ignore_string_type_changes: false,
            ignore_nan_inequality: false,
            ignore_private_variables: true,
            truncate_datetime: None,
            math_epsilon: None,
            max_depth: 1000,
            max_passes: 10_000_000,
            max_diffs: None,
            cutoff_distance_for_pairs: 0.3,
            max_pairing_candidates: 10_000,
            cache_size: 5_000,
        }
    }
}

/// Quantized parameters for deterministic hashing.
#[derive(Debug, Clone, Serialize)]
struct QuantizedConfigParams<'a> {
    version: &'a str,
    ignore_order: bool,
    report_repetition: bool,
    significant_digits: Option<u32>,
    ignore_string_case: bool,
    verbose_level: u8,
    exclude_paths: &'a BTreeSet<String>,
    exclude_regex_paths: &'a [String],
    exclude_types: &'a BTreeSet<String>,
    ignore_numeric_type_changes: bool,
    ignore_string_type_changes: bool,
    ignore_nan_inequality: bool,
    ignore_private_variables: bool,
    truncate_datetime: Option<DatetimeTruncation>,
    math_epsilon: Option<i64>,
    max_depth: usize,
    max_passes: usize,
    max_diffs: Option<usize>,
    cutoff_distance_for_pairs: i64,
    max_pairing_candidates: usize,
    cache_size: usize,
}

fn quantize_float(value: f64) -> i64 {
    (value * FLOAT_QUANTIZATION_FACTOR).round() as i64
}

impl DiffConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the config ID.
    pub fn config_id(&self) -> &str {
        &self.version
    }

    /// Enable or disable ignore-order mode.
    pub fn with_ignore_order(mut self, ignore_order: bool) -> Self {
        self.ignore_order = ignore_order;
        self
    }

    /// Enable or disable repetition reporting.
    pub fn with_report_repetition(mut self, report_repetition: bool) -> Self {
        self.report_repetition = report_repetition;
        self
    }

    /// Round numbers to `digits` decimal places before comparison.
    pub fn with_significant_digits(mut self, digits: u32) -> Self {
        self.significant_digits = Some(digits);
        self
    }

    /// Enable or disable case-insensitive string comparison.
    pub fn with_ignore_string_case(mut self, ignore: bool) -> Self {
        self.ignore_string_case = ignore;
        self
    }

    /// Set the default text view verbosity.
    pub fn with_verbose_level(mut self, verbose_level: u8) -> Self {
        self.verbose_level = verbose_level;
        self
    }

    /// Exclude a rendered path.
    pub fn with_exclude_path(mut self, path: impl Into<String>) -> Self {
        self.exclude_paths.insert(path.into());
        self
    }

    /// Exclude paths matching a pattern.
    pub fn with_exclude_regex_path(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_regex_paths.push(pattern.into());
        self
    }

    /// Exclude a type name.
    pub fn with_exclude_type(mut self, type_name: impl Into<String>) -> Self {
        self.exclude_types.insert(type_name.into());
        self
    }

    /// Set the recursion cutoff.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Check ranges. Pattern syntax is checked when an engine compiles them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verbose_level > MAX_VERBOSE_LEVEL {
            return Err(ConfigError::InvalidVerboseLevel(self.verbose_level));
        }
        if !(self.cutoff_distance_for_pairs > 0.0 && self.cutoff_distance_for_pairs <= 1.0) {
            return Err(ConfigError::InvalidCutoff(self.cutoff_distance_for_pairs));
        }
        if let Some(eps) = self.math_epsilon {
            if !eps.is_finite() || eps < 0.0 {
                return Err(ConfigError::InvalidEpsilon(eps));
            }
        }
        Ok(())
    }

    /// Compute a hash of the configuration.
    ///
    /// Floats are multiplied by 1e6 and rounded to i64 before hashing.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&self.to_quantized())
    }

    fn to_quantized(&self) -> QuantizedConfigParams<'_> {
        QuantizedConfigParams {
            version: &self.version,
            ignore_order: self.ignore_order,
            report_repetition: self.report_repetition,
            significant_digits: self.significant_digits,
            ignore_string_case: self.ignore_string_case,
            verbose_level: self.verbose_level,
            exclude_paths: &self.exclude_paths,
            exclude_regex_paths: &self.exclude_regex_paths,
            exclude_types: &self.exclude_types,
            ignore_numeric_type_changes: self.ignore_numeric_type_changes,
            ignore_string_type_changes: self.ignore_string_type_changes,
            ignore_nan_inequality: self.ignore_nan_inequality,
            ignore_private_variables: self.ignore_private_variables,
            truncate_datetime: self.truncate_datetime,
            math_epsilon: self.math_epsilon.map(quantize_float),
            max_depth: self.max_depth,
            max_passes: self.max_passes,
            max_diffs: self.max_diffs,
            cutoff_distance_for_pairs: quantize_float(self.cutoff_distance_for_pairs),
            max_pairing_candidates: self.max_pairing_candidates,
            cache_size: self.cache_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_hash_determinism() {
        let c1 = DiffConfig::default();
        let c2 = DiffConfig::default();
        assert_eq!(c1.params_hash(), c2.params_hash());
    }

    #[test]
    fn test_params_hash_changes_with_options() {
        let base = DiffConfig::default();
        let ordered = DiffConfig::default().with_ignore_order(true);
        assert_ne!(base.params_hash(), ordered.params_hash());
    }

    #[test]
    fn test_float_quantization_absorbs_noise() {
        let a = DiffConfig {
            cutoff_distance_for_pairs: 0.3,
            ..Default::default()
        };
        let b = DiffConfig {
            cutoff_distance_for_pairs: 0.3 + 1e-12,
            ..Default::default()
        };
        assert_eq!(a.params_hash(), b.params_hash());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(DiffConfig::default().validate().is_ok());
        assert_eq!(
            DiffConfig::default().with_verbose_level(3).validate(),
            Err(ConfigError::InvalidVerboseLevel(3))
        );
        let bad_cutoff = DiffConfig {
            cutoff_distance_for_pairs: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad_cutoff.validate(), Err(ConfigError::InvalidCutoff(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DiffConfig = toml::from_str("ignore_order = true\nsignificant_digits = 2\n").unwrap();
        assert!(config.ignore_order);
        assert_eq!(config.significant_digits, Some(2));
        assert_eq!(config.max_depth, 1000);
        assert!(config.ignore_private_variables);
    }

    #[test]
    fn test_truncation_names_are_lowercase() {
        let config: DiffConfig = serde_json::from_str(r#"{"truncate_datetime": "minute"}"#).unwrap();
        assert_eq!(config.truncate_datetime, Some(DatetimeTruncation::Minute));
    }
}
