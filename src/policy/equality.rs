//! Leaf equality under configured tolerances.
//!
//! The policy is a pure function of two scalars and the options that affect
//! leaf comparison. It also produces the normalized token the structural
//! hash uses, so that values the policy calls equal hash alike (with the
//! exception of `math_epsilon`, which is not transitive and cannot be hashed).

use std::borrow::Cow;

use chrono::{NaiveDateTime, NaiveTime, Timelike};

use super::config::{DatetimeTruncation, DiffConfig};
use crate::types::repr::format_float;
use crate::types::Value;

/// Relative tolerance applied together with `math_epsilon`.
const EPSILON_REL_TOL: f64 = 1e-9;

/// Scalar comparison rules extracted from a [`DiffConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EqualityPolicy {
    significant_digits: Option<u32>,
    ignore_string_case: bool,
    ignore_numeric_type_changes: bool,
    ignore_string_type_changes: bool,
    ignore_nan_inequality: bool,
    truncate_datetime: Option<DatetimeTruncation>,
    math_epsilon: Option<f64>,
}

impl EqualityPolicy {
    /// Extract the leaf comparison options.
    pub fn from_config(config: &DiffConfig) -> Self {
        Self {
            significant_digits: config.significant_digits,
            ignore_string_case: config.ignore_string_case,
            ignore_numeric_type_changes: config.ignore_numeric_type_changes,
            ignore_string_type_changes: config.ignore_string_type_changes,
            ignore_nan_inequality: config.ignore_nan_inequality,
            truncate_datetime: config.truncate_datetime,
            math_epsilon: config.math_epsilon,
        }
    }

    /// True when two values may be compared without a `type_changes` entry.
    pub fn same_type_group(&self, a: &Value, b: &Value) -> bool {
        if a.type_name() == b.type_name() {
            return true;
        }
        match (a, b) {
            (
                Value::Int(_) | Value::Float(_) | Value::Decimal(_),
                Value::Int(_) | Value::Float(_) | Value::Decimal(_),
            ) => self.ignore_numeric_type_changes,
            (Value::Str(_) | Value::Bytes(_), Value::Str(_) | Value::Bytes(_)) => {
                self.ignore_string_type_changes
            }
            _ => false,
        }
    }

    /// Decide whether two leaves are equal.
    ///
    /// Callers check [`same_type_group`](Self::same_type_group) first; leaves
    /// of unrelated types are never equal here.
    pub fn scalars_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) if self.significant_digits.is_none() && self.math_epsilon.is_none() => {
                x == y
            }
            (Value::Decimal(x), Value::Decimal(y)) if self.significant_digits.is_none() && self.math_epsilon.is_none() => {
                x == y
            }
            (
                Value::Int(_) | Value::Float(_) | Value::Decimal(_),
                Value::Int(_) | Value::Float(_) | Value::Decimal(_),
            ) => {
                match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => self.numbers_equal(x, y),
                    _ => false,
                }
            }
            (Value::Str(_) | Value::Bytes(_), Value::Str(_) | Value::Bytes(_)) => {
                match (self.text_of(a), self.text_of(b)) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                }
            }
            (Value::DateTime(x), Value::DateTime(y)) => self.truncate(*x) == self.truncate(*y),
            (Value::Time(x), Value::Time(y)) => self.truncate_time(*x) == self.truncate_time(*y),
            _ => a == b,
        }
    }

    fn numbers_equal(&self, x: f64, y: f64) -> bool {
        if x.is_nan() || y.is_nan() {
            return self.ignore_nan_inequality && x.is_nan() && y.is_nan();
        }
        if let Some(digits) = self.significant_digits {
            return round_to_string(x, digits) == round_to_string(y, digits);
        }
        if let Some(eps) = self.math_epsilon {
            return is_close(x, y, eps);
        }
        x == y
    }

    /// Comparable text of a string-like leaf. Bytes only count as text when
    /// string type changes are ignored.
    fn text_of(&self, value: &Value) -> Option<String> {
        let text = match value {
            Value::Str(s) => s.clone(),
            Value::Bytes(b) if self.ignore_string_type_changes => String::from_utf8_lossy(b).into_owned(),
            Value::Bytes(b) => return Some(format!("\u{0}bytes:{}", hex::encode(b))),
            _ => return None,
        };
        Some(if self.ignore_string_case { text.to_lowercase() } else { text })
    }

    fn truncate(&self, dt: NaiveDateTime) -> NaiveDateTime {
        match self.truncate_datetime {
            Some(DatetimeTruncation::Day) => dt.date().and_hms_opt(0, 0, 0).unwrap_or(dt),
            Some(_) => dt.date().and_time(self.truncate_time(dt.time())),
            None => dt,
        }
    }

    fn truncate_time(&self, t: NaiveTime) -> NaiveTime {
        let (h, m, s) = match self.truncate_datetime {
            None => return t,
            Some(DatetimeTruncation::Second) => (t.hour(), t.minute(), t.second()),
            Some(DatetimeTruncation::Minute) => (t.hour(), t.minute(), 0),
            Some(DatetimeTruncation::Hour) => (t.hour(), 0, 0),
            Some(DatetimeTruncation::Day) => (0, 0, 0),
        };
        NaiveTime::from_hms_opt(h, m, s).unwrap_or(t)
    }

    /// Normalized token for a leaf, used by the structural hash.
    ///
    /// Two leaves the policy considers equal produce the same token, except
    /// under `math_epsilon`.
    pub fn scalar_token(&self, value: &Value) -> String {
        match value {
            Value::Int(_) | Value::Float(_) | Value::Decimal(_) => {
                let prefix = if self.ignore_numeric_type_changes {
                    Cow::Borrowed("number")
                } else {
                    value.type_name()
                };
                let n = value.as_f64().unwrap_or(f64::NAN);
                match (value, self.significant_digits) {
                    (_, _) if n.is_nan() => format!("{prefix}:nan"),
                    (_, Some(digits)) => format!("{prefix}:{}", round_to_string(n, digits)),
                    (Value::Int(i), None) if !self.ignore_numeric_type_changes => format!("{prefix}:{i}"),
                    (Value::Decimal(d), None) if !self.ignore_numeric_type_changes => {
                        format!("{prefix}:{}", d.normalize())
                    }
                    _ => format!("{prefix}:{}", format_float(n)),
                }
            }
            Value::Str(_) | Value::Bytes(_) => {
                let prefix = if self.ignore_string_type_changes {
                    Cow::Borrowed("text")
                } else {
                    value.type_name()
                };
                format!("{prefix}:{}", self.text_of(value).unwrap_or_default())
            }
            Value::DateTime(dt) => format!("datetime:{}", self.truncate(*dt)),
            Value::Time(t) => format!("time:{}", self.truncate_time(*t)),
            other => format!("{}:{}", other.type_name(), other.repr()),
        }
    }
}

/// Round to `digits` decimal places, rendering negative zero as zero.
pub fn round_to_string(n: f64, digits: u32) -> String {
    let rendered = format!("{:.*}", digits as usize, n);
    match rendered.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => rendered,
    }
}

/// `|a - b| <= max(rel_tol * max(|a|, |b|), abs_tol)`.
fn is_close(a: f64, b: f64, abs_tol: f64) -> bool {
    if a == b {
        return true;
    }
    if a.is_infinite() || b.is_infinite() {
        return false;
    }
    let diff = (a - b).abs();
    diff <= (EPSILON_REL_TOL * a.abs().max(b.abs())).max(abs_tol)
}
