//! Restricted decoder: the allow-list gated reconstruction state machine.
//!
//! ```text
//! HeaderCheck ──> FrameScan ──> TypeResolve ──> ObjectBuild ──> Done
//!      │                             │               │
//!      └──────────> Rejected <───────┴───────────────┘
//! ```
//!
//! - **HeaderCheck**: the input must start with [`MAGIC_HEADER`](super::MAGIC_HEADER)
//!   and parse into a frame. Failure is a format error, never a type error.
//! - **FrameScan**: collect every qualified type name tagged in the frame.
//! - **TypeResolve**: builtin safe names pass. Any other name must be in the
//!   caller's allow-list (else `ForbiddenModule`) and in the caller's
//!   registry (else `ModuleNotFound`).
//! - **ObjectBuild**: reconstruct values; custom types go through their
//!   registered conversion.
//!
//! No custom type is ever built before every name in the frame resolved.
//!
//! ## Nesting
//!
//! Both parsers are bounded by the decoder's value nesting limit (default
//! [`DEFAULT_MAX_NESTING`], the engine's default `max_depth`). A tagged value
//! occupies up to four levels of the raw frame, so the parser bound scales
//! with the limit. Decoding at the full default limit
//! needs a thread stack of a few megabytes.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::{Map, Value as Frame};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::registry::{is_builtin_safe, AllowList, TypeRegistry};
use super::tagged::{scan_type_names, DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT, TYPE_KEY};
use super::{CodecError, MAGIC_HEADER};
use crate::types::{Opaque, Record, SharedValue, Value};

/// Value nesting accepted by default.
pub const DEFAULT_MAX_NESTING: usize = 1000;

/// Raw frame levels one value level may occupy: a cell wrapper, the tagged
/// object, its items array and a key/value pair.
const FRAME_LEVELS_PER_VALUE: usize = 4;

/// Frame levels of the document envelope around entry values.
const ENVELOPE_LEVELS: usize = 8;

/// Decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Validating the magic header and parsing the frame.
    HeaderCheck,
    /// Collecting type names.
    FrameScan,
    /// Checking type names against the allow-list and registry.
    TypeResolve,
    /// Reconstructing values.
    ObjectBuild,
    /// Finished successfully.
    Done,
    /// Failed; terminal.
    Rejected,
}

/// Allow-list gated decoder for one payload or document.
#[derive(Debug)]
pub struct RestrictedDecoder<'a> {
    allow_list: &'a AllowList,
    registry: &'a TypeRegistry,
    state: DecodeState,
    cells: HashMap<u64, SharedValue>,
    max_nesting: usize,
}

impl<'a> RestrictedDecoder<'a> {
    /// Decoder bound to a caller-supplied allow-list and registry.
    pub fn new(allow_list: &'a AllowList, registry: &'a TypeRegistry) -> Self {
        Self {
            allow_list,
            registry,
            state: DecodeState::HeaderCheck,
            cells: HashMap::new(),
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }

    /// Accept values nested up to `max_nesting` levels.
    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    /// Raw frame depth either parser may reach.
    fn frame_limit(&self) -> usize {
        self.max_nesting
            .saturating_mul(FRAME_LEVELS_PER_VALUE)
            .saturating_add(ENVELOPE_LEVELS)
    }

    /// Current state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Decode a binary payload into a value.
    pub fn decode_payload(&mut self, payload: &[u8]) -> Result<Value, CodecError> {
        let frame = self.check_payload(payload)?;
        self.scan_and_resolve(&frame)?;
        let value = self.build(&frame)?;
        self.finish();
        Ok(value)
    }

    fn transition(&mut self, next: DecodeState) {
        tracing::debug!(from = ?self.state, to = ?next, "Decode state transition");
        self.state = next;
    }

    fn reject(&mut self, error: CodecError) -> CodecError {
        self.transition(DecodeState::Rejected);
        error
    }

    /// HeaderCheck for binary payloads: magic line, digest line, CBOR body.
    pub(crate) fn check_payload(&mut self, payload: &[u8]) -> Result<Frame, CodecError> {
        let Some(rest) = payload.strip_prefix(MAGIC_HEADER.as_bytes()) else {
            return Err(self.reject(CodecError::DecodeFormat("missing payload header".into())));
        };
        let Some(newline) = rest.iter().position(|b| *b == b'\n') else {
            return Err(self.reject(CodecError::DecodeFormat("missing payload digest".into())));
        };
        let (digest, body) = (&rest[..newline], &rest[newline + 1..]);
        if digest != hex::encode(Sha256::digest(body)).as_bytes() {
            return Err(self.reject(CodecError::DecodeFormat("payload digest mismatch".into())));
        }
        ciborium::de::from_reader_with_recursion_limit::<Frame, _>(body, self.frame_limit())
            .map_err(|e| self.reject(CodecError::DecodeFormat(format!("invalid payload body: {e}"))))
    }

    /// HeaderCheck for JSON documents: a `header` field holding the magic line.
    pub(crate) fn check_document(&mut self, text: &str) -> Result<Frame, CodecError> {
        let nesting = json_nesting(text);
        if nesting > self.frame_limit() {
            return Err(self.reject(CodecError::DecodeFormat(format!(
                "document nests {nesting} levels, limit is {}",
                self.frame_limit()
            ))));
        }
        let document = parse_json(text)
            .map_err(|e| self.reject(CodecError::DecodeFormat(format!("invalid document: {e}"))))?;
        let header = document.get("header").and_then(Frame::as_str);
        if header.map(|h| h.trim_end()) != Some(MAGIC_HEADER.trim_end()) {
            return Err(self.reject(CodecError::DecodeFormat("missing document header".into())));
        }
        Ok(document)
    }

    /// FrameScan and TypeResolve.
    pub(crate) fn scan_and_resolve(&mut self, frame: &Frame) -> Result<(), CodecError> {
        self.transition(DecodeState::FrameScan);
        let names = scan_type_names(frame);

        self.transition(DecodeState::TypeResolve);
        for name in &names {
            if is_builtin_safe(name) {
                continue;
            }
            if !self.allow_list.permits(name) {
                tracing::warn!(type_name = %name, "Rejected payload: type not in allow-list");
                return Err(self.reject(CodecError::ForbiddenModule(name.clone())));
            }
            if !self.registry.contains(name) {
                tracing::warn!(type_name = %name, "Rejected payload: type not registered");
                return Err(self.reject(CodecError::ModuleNotFound(name.clone())));
            }
        }
        self.transition(DecodeState::ObjectBuild);
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        self.transition(DecodeState::Done);
    }

    /// ObjectBuild for one frame.
    pub(crate) fn build(&mut self, frame: &Frame) -> Result<Value, CodecError> {
        if self.state != DecodeState::ObjectBuild {
            return Err(CodecError::DecodeFormat(format!(
                "cannot build values in state {:?}",
                self.state
            )));
        }
        self.build_frame(frame, 0).map_err(|e| self.reject(e))
    }

    fn build_frame(&mut self, frame: &Frame, depth: usize) -> Result<Value, CodecError> {
        if depth > self.max_nesting {
            return Err(format_error(format!("value nests deeper than {} levels", self.max_nesting)));
        }
        match frame {
            Frame::Null => Ok(Value::None),
            Frame::Bool(b) => Ok(Value::Bool(*b)),
            Frame::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) if !n.is_f64() => Ok(Value::Int(i)),
                (_, Some(f)) if n.is_f64() => Ok(Value::Float(f)),
                _ => Err(format_error(format!("number out of range: {n}"))),
            },
            Frame::String(s) => Ok(Value::Str(s.clone())),
            Frame::Array(_) => Err(format_error("untagged array")),
            Frame::Object(map) => {
                let name = map
                    .get(TYPE_KEY)
                    .and_then(Frame::as_str)
                    .ok_or_else(|| format_error("untagged object"))?;
                self.build_tagged(name, map, depth)
            }
        }
    }

    fn build_tagged(&mut self, name: &str, map: &Map<String, Frame>, depth: usize) -> Result<Value, CodecError> {
        let next = depth + 1;
        match name {
            "builtins.list" => Ok(Value::List(self.build_items(map, next)?)),
            "builtins.tuple" => Ok(Value::Tuple(self.build_items(map, next)?)),
            "builtins.set" => Ok(Value::Set(self.build_items(map, next)?)),
            "builtins.frozenset" => Ok(Value::FrozenSet(self.build_items(map, next)?)),
            "builtins.dict" => {
                let mut entries = Vec::new();
                for pair in array_field(map, "items")? {
                    let [k, v] = pair_of(pair)?;
                    entries.push((self.build_frame(k, next)?, self.build_frame(v, next)?));
                }
                Ok(Value::Dict(entries))
            }
            "builtins.bytes" => hex::decode(str_field(map, "hex")?)
                .map(Value::Bytes)
                .map_err(|e| format_error(format!("invalid bytes: {e}"))),
            "builtins.float" => match str_field(map, "repr")? {
                "nan" => Ok(Value::Float(f64::NAN)),
                "inf" => Ok(Value::Float(f64::INFINITY)),
                "-inf" => Ok(Value::Float(f64::NEG_INFINITY)),
                other => Err(format_error(format!("invalid float repr {other:?}"))),
            },
            "decimal.Decimal" => Decimal::from_str_exact(str_field(map, "repr")?)
                .map(Value::Decimal)
                .map_err(|e| format_error(format!("invalid decimal: {e}"))),
            "datetime.datetime" => NaiveDateTime::parse_from_str(str_field(map, "iso")?, DATETIME_FORMAT)
                .map(Value::DateTime)
                .map_err(|e| format_error(format!("invalid datetime: {e}"))),
            "datetime.date" => NaiveDate::parse_from_str(str_field(map, "iso")?, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| format_error(format!("invalid date: {e}"))),
            "datetime.time" => NaiveTime::parse_from_str(str_field(map, "iso")?, TIME_FORMAT)
                .map(Value::Time)
                .map_err(|e| format_error(format!("invalid time: {e}"))),
            "uuid.UUID" => Uuid::parse_str(str_field(map, "hex")?)
                .map(Value::Uuid)
                .map_err(|e| format_error(format!("invalid uuid: {e}"))),
            "builtins.cell" => {
                let id = id_field(map)?;
                if self.cells.contains_key(&id) {
                    return Err(format_error(format!("duplicate cell id {id}")));
                }
                let cell = SharedValue::new(Value::None);
                self.cells.insert(id, cell.clone());
                let inner = map.get("value").ok_or_else(|| format_error("cell without value"))?;
                let value = self.build_frame(inner, depth)?;
                cell.replace(value);
                Ok(Value::Shared(cell))
            }
            "builtins.ref" => {
                let id = id_field(map)?;
                self.cells
                    .get(&id)
                    .cloned()
                    .map(Value::Shared)
                    .ok_or_else(|| format_error(format!("dangling reference {id}")))
            }
            custom => self.build_custom(custom, map, next),
        }
    }

    fn build_custom(&mut self, name: &str, map: &Map<String, Frame>, depth: usize) -> Result<Value, CodecError> {
        if !self.allow_list.permits(name) {
            return Err(CodecError::ForbiddenModule(name.to_string()));
        }
        let converter = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| CodecError::ModuleNotFound(name.to_string()))?;

        let raw = if map.contains_key("fields") {
            let mut record = Record::new(name);
            for pair in array_field(map, "fields")? {
                let [field, v] = pair_of(pair)?;
                let field = field.as_str().ok_or_else(|| format_error("field name is not a string"))?;
                record.set_field(field, self.build_frame(v, depth)?);
            }
            Value::Record(record)
        } else {
            Value::Opaque(Opaque::new(name, str_field(map, "token")?))
        };

        converter(raw).map_err(|message| CodecError::Reconstruct {
            type_name: name.to_string(),
            message,
        })
    }

    fn build_items(&mut self, map: &Map<String, Frame>, depth: usize) -> Result<Vec<Value>, CodecError> {
        array_field(map, "items")?
            .iter()
            .map(|item| self.build_frame(item, depth))
            .collect()
    }
}

/// Parse a document with serde_json's own recursion limit lifted. Callers
/// bound the nesting first with [`json_nesting`].
fn parse_json(text: &str) -> serde_json::Result<Frame> {
    use serde::Deserialize;

    let mut de = serde_json::Deserializer::from_str(text);
    de.disable_recursion_limit();
    let frame = Frame::deserialize(&mut de)?;
    de.end()?;
    Ok(frame)
}

/// Deepest array/object nesting in JSON text, ignoring brackets in strings.
fn json_nesting(text: &str) -> usize {
    let (mut depth, mut deepest) = (0usize, 0usize);
    let (mut in_string, mut escaped) = (false, false);
    for byte in text.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

fn format_error(message: impl Into<String>) -> CodecError {
    CodecError::DecodeFormat(message.into())
}

fn array_field<'f>(map: &'f Map<String, Frame>, key: &str) -> Result<&'f Vec<Frame>, CodecError> {
    map.get(key)
        .and_then(Frame::as_array)
        .ok_or_else(|| format_error(format!("missing array field {key:?}")))
}

fn str_field<'f>(map: &'f Map<String, Frame>, key: &str) -> Result<&'f str, CodecError> {
    map.get(key)
        .and_then(Frame::as_str)
        .ok_or_else(|| format_error(format!("missing string field {key:?}")))
}

fn id_field(map: &Map<String, Frame>) -> Result<u64, CodecError> {
    map.get("id")
        .and_then(Frame::as_u64)
        .ok_or_else(|| format_error("missing cell id"))
}

fn pair_of(frame: &Frame) -> Result<[&Frame; 2], CodecError> {
    match frame.as_array().map(Vec::as_slice) {
        Some([a, b]) => Ok([a, b]),
        _ => Err(format_error("expected a two-element pair")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tagged::TaggedEncoder;
    use serde_json::json;

    fn resolve_and_build(frame: &Frame, allow: &AllowList, registry: &TypeRegistry) -> Result<Value, CodecError> {
        let mut decoder = RestrictedDecoder::new(allow, registry);
        decoder.scan_and_resolve(frame)?;
        let value = decoder.build(frame)?;
        decoder.finish();
        Ok(value)
    }

    #[test]
    fn test_builtin_frames_need_no_permission() {
        let value = Value::dict([(Value::tuple([1, 2]), Value::set(["a"]))]);
        let frame = TaggedEncoder::new().encode(&value);
        let rebuilt = resolve_and_build(&frame, &AllowList::new(), &TypeRegistry::new()).unwrap();
        assert_eq!(rebuilt, value);
    }

    #[test]
    fn test_forbidden_before_not_found() {
        let frame = json!({"__type__": "tests.A", "fields": []});
        let registry = TypeRegistry::new();
        let empty = AllowList::new();
        let mut decoder = RestrictedDecoder::new(&empty, &registry);
        let err = decoder.scan_and_resolve(&frame).unwrap_err();
        assert_eq!(err, CodecError::ForbiddenModule("tests.A".into()));
        assert_eq!(decoder.state(), DecodeState::Rejected);

        let allow = AllowList::from("tests.A");
        let err = resolve_and_build(&frame, &allow, &registry).unwrap_err();
        assert_eq!(err, CodecError::ModuleNotFound("tests.A".into()));
    }

    #[test]
    fn test_nothing_is_built_when_any_name_is_forbidden() {
        let frame = json!({"__type__": "builtins.list", "items": [
            {"__type__": "tests.Ok", "fields": []},
            {"__type__": "tests.Bad", "fields": []}
        ]});
        let mut registry = TypeRegistry::new();
        registry.register("tests.Ok", |_| panic!("must not be called"));
        let allow = AllowList::from("tests.Ok");
        let err = resolve_and_build(&frame, &allow, &registry).unwrap_err();
        assert_eq!(err, CodecError::ForbiddenModule("tests.Bad".into()));
    }

    #[test]
    fn test_converter_errors_are_reported() {
        let frame = json!({"__type__": "tests.A", "fields": [["x", 1]]});
        let registry = TypeRegistry::new().with("tests.A", |_| Err("bad field".to_string()));
        let err = resolve_and_build(&frame, &AllowList::from("tests.A"), &registry).unwrap_err();
        assert_eq!(
            err,
            CodecError::Reconstruct {
                type_name: "tests.A".into(),
                message: "bad field".into()
            }
        );
    }

    #[test]
    fn test_dangling_reference_is_a_format_error() {
        let frame = json!({"__type__": "builtins.ref", "id": 7});
        let err = resolve_and_build(&frame, &AllowList::new(), &TypeRegistry::new()).unwrap_err();
        assert!(matches!(err, CodecError::DecodeFormat(_)));
    }

    #[test]
    fn test_header_check_rejects_foreign_input() {
        let registry = TypeRegistry::new();
        let allow = AllowList::new();
        let mut decoder = RestrictedDecoder::new(&allow, &registry);
        let err = decoder.decode_payload(b"not a payload").unwrap_err();
        assert!(matches!(err, CodecError::DecodeFormat(_)));
        assert_eq!(decoder.state(), DecodeState::Rejected);
    }

    #[test]
    fn test_json_nesting_ignores_brackets_in_strings() {
        assert_eq!(json_nesting(r#"{"a": [[1], "[[[", "\\"]}"#), 3);
        assert_eq!(json_nesting(r#""no containers""#), 0);
        assert_eq!(json_nesting(r#"{"k": "quote \" [ inside"}"#), 1);
    }

    #[test]
    fn test_nesting_limit_applies_to_payloads() {
        let mut value = Value::Int(0);
        for _ in 0..40 {
            value = Value::List(vec![value]);
        }
        let payload = crate::codec::dump(&value).unwrap();
        let (allow, registry) = (AllowList::new(), TypeRegistry::new());

        let rebuilt = RestrictedDecoder::new(&allow, &registry).decode_payload(&payload).unwrap();
        assert_eq!(rebuilt, value);

        let mut strict = RestrictedDecoder::new(&allow, &registry).with_max_nesting(10);
        let err = strict.decode_payload(&payload).unwrap_err();
        assert!(matches!(err, CodecError::DecodeFormat(_)));
        assert_eq!(strict.state(), DecodeState::Rejected);
    }

    #[test]
    fn test_nesting_limit_applies_to_documents() {
        let (allow, registry) = (AllowList::new(), TypeRegistry::new());
        let deep = format!("{}{}", "[".repeat(100), "]".repeat(100));
        let mut decoder = RestrictedDecoder::new(&allow, &registry).with_max_nesting(10);
        let err = decoder.check_document(&deep).unwrap_err();
        assert!(err.to_string().contains("nests 100 levels"));
    }
}
