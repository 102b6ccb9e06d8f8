//! Binary value payloads.

use sha2::{Digest, Sha256};

use super::decoder::RestrictedDecoder;
use super::registry::{AllowList, TypeRegistry};
use super::tagged::TaggedEncoder;
use super::{CodecError, MAGIC_HEADER};
use crate::types::Value;

/// Serialize a value into a binary payload.
pub fn dump(value: &Value) -> Result<Vec<u8>, CodecError> {
    let frame = TaggedEncoder::new().encode(value);
    let mut body = Vec::new();
    ciborium::into_writer(&frame, &mut body).map_err(|e| CodecError::Encode(e.to_string()))?;

    let digest = hex::encode(Sha256::digest(&body));
    let mut payload = Vec::with_capacity(MAGIC_HEADER.len() + digest.len() + 1 + body.len());
    payload.extend_from_slice(MAGIC_HEADER.as_bytes());
    payload.extend_from_slice(digest.as_bytes());
    payload.push(b'\n');
    payload.extend_from_slice(&body);
    Ok(payload)
}

/// Reconstruct a value from a binary payload.
///
/// Custom types must be named in `allow_list` and registered in `registry`.
pub fn load(payload: &[u8], allow_list: &AllowList, registry: &TypeRegistry) -> Result<Value, CodecError> {
    RestrictedDecoder::new(allow_list, registry).decode_payload(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Record, SharedValue};

    #[test]
    fn test_payload_starts_with_magic_header() {
        let payload = dump(&Value::list([1, 2])).unwrap();
        assert!(payload.starts_with(MAGIC_HEADER.as_bytes()));
    }

    #[test]
    fn test_header_then_garbage_is_a_format_error() {
        let mut payload = MAGIC_HEADER.as_bytes().to_vec();
        payload.extend_from_slice(b"Blah");
        let err = load(&payload, &AllowList::new(), &TypeRegistry::new()).unwrap_err();
        assert!(matches!(err, CodecError::DecodeFormat(_)));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let mut payload = dump(&Value::from("hello")).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        let err = load(&payload, &AllowList::new(), &TypeRegistry::new()).unwrap_err();
        assert_eq!(err, CodecError::DecodeFormat("payload digest mismatch".into()));
    }

    #[test]
    fn test_builtin_values_survive() {
        let value = Value::dict([
            (Value::from("when"), Value::from(chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())),
            (Value::from("raw"), Value::Bytes(vec![0, 255])),
            (Value::from("ratio"), Value::Float(0.1)),
            (Value::from("gone"), Value::Float(f64::NAN)),
        ]);
        let rebuilt = load(&dump(&value).unwrap(), &AllowList::new(), &TypeRegistry::new()).unwrap();
        assert_eq!(rebuilt, value);
    }

    #[test]
    fn test_custom_type_needs_allow_list_entry() {
        let value = Value::from(Record::new("tests.PicklableClass").with_field("item", 10));
        let payload = dump(&value).unwrap();
        let mut registry = TypeRegistry::new();
        registry.register_passthrough("tests.PicklableClass");

        let err = load(&payload, &AllowList::new(), &registry).unwrap_err();
        assert_eq!(err, CodecError::ForbiddenModule("tests.PicklableClass".into()));

        let allow = AllowList::from("tests.PicklableClass");
        assert_eq!(load(&payload, &allow, &registry).unwrap(), value);
    }

    #[test]
    fn test_shared_cycle_survives() {
        let cell = SharedValue::new(Value::None);
        cell.replace(Value::list([Value::Int(1), Value::Shared(cell.clone())]));
        let payload = dump(&Value::Shared(cell)).unwrap();
        let rebuilt = load(&payload, &AllowList::new(), &TypeRegistry::new()).unwrap();
        let Value::Shared(rebuilt) = rebuilt else {
            panic!("expected a shared cell");
        };
        let inner = rebuilt.read();
        let Value::List(items) = &*inner else {
            panic!("expected a list");
        };
        match &items[1] {
            Value::Shared(back) => assert!(back.ptr_eq(&rebuilt)),
            other => panic!("expected back reference, got {other:?}"),
        }
    }
}
