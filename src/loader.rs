//! File loader: turns input files into [`Value`] graphs.
//!
//! | Extension | Parser |
//! |-----------|--------|
//! | `.json` | serde_json |
//! | `.yaml`, `.yml` | serde_yaml |
//! | `.toml` | toml |
//! | `.csv` | csv, one mapping per row keyed by the header row |
//! | `.ddpayload` | binary payload, builtin safe types only |
//!
//! Any other extension fails with [`LoadError::UnsupportedFormat`].

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use crate::codec::{self, AllowList, CodecError, TypeRegistry};
use crate::types::Value;

/// Errors from loading an input file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The extension maps to no parser.
    #[error("Unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// The file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON parse failure.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse failure.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parse failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV parse failure.
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// Binary payload rejected.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Input formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON text.
    Json,
    /// YAML text.
    Yaml,
    /// TOML text.
    Toml,
    /// CSV text with a header row.
    Csv,
    /// Binary payload.
    Payload,
}

impl Format {
    /// Format implied by a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "csv" => Some(Self::Csv),
            "ddpayload" => Some(Self::Payload),
            _ => None,
        }
    }
}

/// Load a file, choosing the parser by extension.
pub fn load_path(path: impl AsRef<Path>) -> Result<Value, LoadError> {
    let path = path.as_ref();
    let format = Format::from_path(path).ok_or_else(|| LoadError::UnsupportedFormat(path.to_path_buf()))?;
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), format = ?format, bytes = bytes.len(), "Loading input");
    parse_bytes(&bytes, format)
}

/// Parse in-memory input of a known format.
pub fn parse_bytes(bytes: &[u8], format: Format) -> Result<Value, LoadError> {
    match format {
        Format::Json => Ok(serde_json::from_slice::<serde_json::Value>(bytes)?.into()),
        Format::Yaml => Ok(from_yaml(serde_yaml::from_slice(bytes)?)),
        Format::Toml => {
            let text = String::from_utf8_lossy(bytes);
            Ok(from_toml(toml::from_str(&text)?))
        }
        Format::Csv => from_csv(bytes),
        Format::Payload => Ok(codec::load(bytes, &AllowList::new(), &TypeRegistry::new())?),
    }
}

/// Rows become string-valued mappings keyed by the header row. Short rows
/// yield only the columns they have.
fn from_csv(bytes: &[u8]) -> Result<Value, LoadError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(Value::dict(
            headers
                .iter()
                .zip(record.iter())
                .map(|(name, field)| (Value::from(name), Value::from(field))),
        ));
    }
    Ok(Value::List(rows))
}

fn from_yaml(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;
    match value {
        Yaml::Null => Value::None,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Yaml::String(s) => Value::Str(s),
        Yaml::Sequence(items) => Value::List(items.into_iter().map(from_yaml).collect()),
        Yaml::Mapping(map) => Value::dict(map.into_iter().map(|(k, v)| (from_yaml(k), from_yaml(v)))),
        Yaml::Tagged(tagged) => from_yaml(tagged.value),
    }
}

fn from_toml(value: toml::Value) -> Value {
    use toml::Value as Toml;
    match value {
        Toml::String(s) => Value::Str(s),
        Toml::Integer(i) => Value::Int(i),
        Toml::Float(f) => Value::Float(f),
        Toml::Boolean(b) => Value::Bool(b),
        Toml::Datetime(dt) => from_toml_datetime(&dt.to_string()),
        Toml::Array(items) => Value::List(items.into_iter().map(from_toml).collect()),
        Toml::Table(table) => Value::Dict(
            table
                .into_iter()
                .map(|(k, v)| (Value::Str(k), from_toml(v)))
                .collect(),
        ),
    }
}

/// Local date-times, dates and times become chrono values. Offset
/// date-times stay strings.
fn from_toml_datetime(text: &str) -> Value {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Value::DateTime(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Value::DateTime(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Value::Date(d);
    }
    if let Ok(t) = NaiveTime::parse_from_str(text, "%H:%M:%S%.f") {
        return Value::Time(t);
    }
    Value::Str(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_json_file() {
        let file = write_temp(".json", br#"{"a": [1, 2.5]}"#);
        let value = load_path(file.path()).unwrap();
        assert_eq!(value, Value::dict([("a", Value::list([Value::Int(1), Value::Float(2.5)]))]));
    }

    #[test]
    fn test_yaml_keeps_integer_keys() {
        let file = write_temp(".yml", b"1: one\n2: [a, b]\n");
        let value = load_path(file.path()).unwrap();
        assert_eq!(
            value,
            Value::dict([(Value::Int(1), Value::from("one")), (Value::Int(2), Value::list(["a", "b"]))])
        );
    }

    #[test]
    fn test_toml_dates() {
        let file = write_temp(".toml", b"day = 2024-02-29\nname = \"x\"\n");
        let value = load_path(file.path()).unwrap();
        assert_eq!(
            value,
            Value::dict([
                (Value::from("day"), Value::from(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())),
                (Value::from("name"), Value::from("x")),
            ])
        );
    }

    #[test]
    fn test_payload_file() {
        let payload = codec::dump(&Value::set([1, 2])).unwrap();
        let file = write_temp(".ddpayload", &payload);
        assert_eq!(load_path(file.path()).unwrap(), Value::set([1, 2]));
    }

    #[test]
    fn test_csv_rows_are_keyed_by_header() {
        let file = write_temp(".csv", b"first_name,last_name\nJoe,Nobody\n\"Ann, Jr\",Smith\n");
        let value = load_path(file.path()).unwrap();
        assert_eq!(
            value,
            Value::list([
                Value::dict([("first_name", "Joe"), ("last_name", "Nobody")]),
                Value::dict([("first_name", "Ann, Jr"), ("last_name", "Smith")]),
            ])
        );
    }

    #[test]
    fn test_csv_header_only_is_empty_list() {
        let file = write_temp(".CSV", b"a,b\n");
        assert_eq!(load_path(file.path()).unwrap(), Value::List(Vec::new()));
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let file = write_temp(".xml", b"<a/>");
        assert!(matches!(load_path(file.path()), Err(LoadError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_path("/nonexistent/deepdiff/input.json").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
