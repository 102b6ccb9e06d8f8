//! Serialization guard tests.
//!
//! Covers binary payloads, diff tree documents, transport encoding and the
//! plain JSON text view.

use deepdiff_kernel::{
    decode_for_transport, decode_tree, diff, dump, encode_for_transport, encode_tree, load, AllowList,
    Category, CodecError, DiffConfig, DiffTree, Record, RestrictedDecoder, TypeRegistry, Value, MAGIC_HEADER,
};
use rust_decimal::Decimal;
use serde_json::json;
use sha2::{Digest, Sha256};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

const PICKLABLE: &str = "tests.PicklableClass";

fn picklable(item: i64) -> Value {
    Value::from(Record::new(PICKLABLE).with_field("item", item))
}

/// Conversion that checks the decoded structure before accepting it.
fn picklable_registry() -> TypeRegistry {
    TypeRegistry::new().with(PICKLABLE, |value| {
        if matches!(&value, Value::Record(record) if record.field("item").is_some()) {
            Ok(value)
        } else {
            Err(format!("unexpected shape {value:?}"))
        }
    })
}

/// Alternating list and dict nesting, `depth` containers deep.
fn nested(depth: usize) -> Value {
    let mut value = Value::from("leaf");
    for level in 0..depth {
        value = if level % 2 == 0 {
            Value::List(vec![value, Value::Int(level as i64)])
        } else {
            Value::dict([(Value::from("k"), value)])
        };
    }
    value
}

/// Runs `f` on a thread with a generous stack for deep frames.
fn with_big_stack<F: FnOnce() + Send + 'static>(f: F) {
    std::thread::Builder::new()
        .stack_size(256 * 1024 * 1024)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap();
}

/// A well-formed payload around an arbitrary CBOR body.
fn payload_with_body(body: &[u8]) -> Vec<u8> {
    let mut payload = MAGIC_HEADER.as_bytes().to_vec();
    payload.extend_from_slice(hex::encode(Sha256::digest(body)).as_bytes());
    payload.push(b'\n');
    payload.extend_from_slice(body);
    payload
}

fn sample_tree() -> DiffTree {
    let old = Value::dict([
        (Value::from("list"), Value::list([1, 2, 3])),
        (Value::from("set"), Value::set(["a", "b"])),
        (Value::from("when"), Value::from(chrono::NaiveDate::from_ymd_opt(2021, 1, 1).unwrap())),
    ]);
    let new = Value::dict([
        (Value::from("list"), Value::list([1, 4])),
        (Value::from("set"), Value::set(["b", "c"])),
        (Value::from("bytes"), Value::Bytes(b"raw".to_vec())),
    ]);
    diff(&old, &new, &DiffConfig::default()).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Binary payloads
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_forbidden_module_names_the_type() {
    let payload = dump(&Value::list([picklable(10)])).unwrap();
    let registry = picklable_registry();

    let err = load(&payload, &AllowList::new(), &registry).unwrap_err();
    assert_eq!(err, CodecError::ForbiddenModule(PICKLABLE.into()));
    assert!(err.to_string().contains("'tests.PicklableClass'"));

    let allow = AllowList::from(PICKLABLE);
    let value = load(&payload, &allow, &registry).unwrap();
    assert_eq!(value, Value::list([picklable(10)]));
}

#[test]
fn test_allowed_but_unregistered_is_not_found() {
    let payload = dump(&picklable(1)).unwrap();
    let allow = AllowList::from(PICKLABLE);
    let err = load(&payload, &allow, &TypeRegistry::new()).unwrap_err();
    assert_eq!(err, CodecError::ModuleNotFound(PICKLABLE.into()));
    assert!(err.to_string().contains(PICKLABLE));
}

#[test]
fn test_header_check_precedes_type_resolution() {
    let mut payload = dump(&picklable(1)).unwrap();
    payload[0] = b'X';
    let err = load(&payload, &AllowList::new(), &TypeRegistry::new()).unwrap_err();
    assert!(matches!(err, CodecError::DecodeFormat(_)));

    let garbage = format!("{MAGIC_HEADER}Blah");
    let err = load(garbage.as_bytes(), &AllowList::new(), &TypeRegistry::new()).unwrap_err();
    assert!(matches!(err, CodecError::DecodeFormat(_)));
}

#[test]
fn test_allow_lists_are_per_call() {
    let payload = dump(&picklable(3)).unwrap();
    let registry = picklable_registry();
    let allow = AllowList::from(PICKLABLE);

    assert!(load(&payload, &allow, &registry).is_ok());
    assert!(load(&payload, &AllowList::new(), &registry).is_err());
    assert!(load(&payload, &allow, &registry).is_ok());
}

#[test]
fn test_concurrent_decodes_with_different_allow_lists() {
    let payload = std::sync::Arc::new(dump(&picklable(5)).unwrap());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let payload = payload.clone();
            std::thread::spawn(move || {
                let allow = if i % 2 == 0 { AllowList::from(PICKLABLE) } else { AllowList::new() };
                load(&payload, &allow, &picklable_registry()).is_ok() == (i % 2 == 0)
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

#[test]
fn test_decimal_is_builtin_safe() {
    let value = Value::list([Value::from(Decimal::new(112, 1)), Value::from(Decimal::new(-5, 3))]);
    let payload = dump(&value).unwrap();
    assert_eq!(load(&payload, &AllowList::new(), &TypeRegistry::new()).unwrap(), value);
}

#[test]
fn test_deep_value_payload_round_trip() {
    with_big_stack(|| {
        let value = nested(300);
        let payload = dump(&value).unwrap();
        assert_eq!(load(&payload, &AllowList::new(), &TypeRegistry::new()).unwrap(), value);
    });
}

#[test]
fn test_payload_nesting_limit_is_configurable() {
    with_big_stack(|| {
        let value = nested(1_100);
        let payload = dump(&value).unwrap();
        let (allow, registry) = (AllowList::new(), TypeRegistry::new());

        let err = load(&payload, &allow, &registry).unwrap_err();
        assert!(matches!(err, CodecError::DecodeFormat(_)));

        let rebuilt = RestrictedDecoder::new(&allow, &registry)
            .with_max_nesting(2_000)
            .decode_payload(&payload)
            .unwrap();
        assert_eq!(rebuilt, value);
    });
}

#[test]
fn test_hostile_payload_nesting_is_rejected() {
    with_big_stack(|| {
        // 100 000 nested one-element CBOR arrays around a zero.
        let mut body = vec![0x81u8; 100_000];
        body.push(0x00);
        let err = load(&payload_with_body(&body), &AllowList::new(), &TypeRegistry::new()).unwrap_err();
        assert!(matches!(err, CodecError::DecodeFormat(_)));
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tree documents
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_deep_value_tree_round_trip() {
    with_big_stack(|| {
        let tree = diff(&Value::list([0]), &Value::list([Value::Int(0), nested(300)]), &DiffConfig::default()).unwrap();
        assert!(tree.contains(Category::IterableItemAdded));
        let back = decode_tree(&encode_tree(&tree), &AllowList::new(), &TypeRegistry::new()).unwrap();
        assert_eq!(back, tree);
    });
}

#[test]
fn test_hostile_document_nesting_is_rejected() {
    let text = format!("{}{}", "[".repeat(100_000), "]".repeat(100_000));
    let err = decode_tree(&text, &AllowList::new(), &TypeRegistry::new()).unwrap_err();
    assert!(matches!(err, CodecError::DecodeFormat(_)));
}

#[test]
fn test_tree_round_trip_with_builtin_allow_list() {
    let tree = sample_tree();
    let text = encode_tree(&tree);
    let back = decode_tree(&text, &AllowList::new(), &TypeRegistry::new()).unwrap();
    assert_eq!(back, tree);
    assert_eq!(back.pretty(), tree.pretty());
}

#[test]
fn test_tree_document_keeps_sets_distinct_from_lists() {
    let tree = diff(&Value::list([1]), &Value::set([1]), &DiffConfig::default()).unwrap();
    let back = decode_tree(&encode_tree(&tree), &AllowList::new(), &TypeRegistry::new()).unwrap();
    let entry = &back.iter().next().unwrap();
    assert_eq!(entry.new_value, Some(Value::set([1])));
    assert_ne!(entry.new_value, Some(Value::list([1])));
}

#[test]
fn test_transport_requires_registry_entry() {
    let tree = diff(&picklable(1), &picklable(2), &DiffConfig::default()).unwrap();
    let whole = diff(&Value::list([1]), &Value::list([Value::Int(1), picklable(2)]), &DiffConfig::default()).unwrap();

    assert!(encode_for_transport(&tree, &TypeRegistry::new()).is_ok());
    let err = encode_for_transport(&whole, &TypeRegistry::new()).unwrap_err();
    assert_eq!(err, CodecError::UnrepresentableType(PICKLABLE.into()));

    let registry = picklable_registry();
    let text = encode_for_transport(&whole, &registry).unwrap();
    assert_eq!(decode_for_transport(&text, &registry).unwrap(), whole);
}

// ─────────────────────────────────────────────────────────────────────────────
// Plain JSON
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_to_json_uses_default_mapping() {
    let tree = diff(
        &Value::from(Record::new("A")),
        &Value::from(Record::new("B")),
        &DiffConfig::default(),
    )
    .unwrap();

    let err = tree.text().to_json(&TypeRegistry::new()).unwrap_err();
    assert_eq!(err, CodecError::UnrepresentableType("A".into()));

    let registry = TypeRegistry::new()
        .with("A", |_| Ok(Value::from("obj A")))
        .with("B", |_| Ok(Value::from("obj B")));
    let json: serde_json::Value = serde_json::from_str(&tree.text().to_json(&registry).unwrap()).unwrap();
    assert_eq!(
        json,
        json!({"type_changes": {"root": {
            "old_type": "A", "new_type": "B", "old_value": "obj A", "new_value": "obj B"
        }}})
    );
}

#[test]
fn test_to_json_stringifies_keys_and_flattens_sets() {
    let old = Value::dict([(1, Value::set([1]))]);
    let new = Value::dict([(1, Value::set([1])), (2, Value::tuple(["x"]))]);
    let tree = diff(&old, &new, &DiffConfig::default().with_verbose_level(2)).unwrap();
    let json = tree.text().to_json_value(&TypeRegistry::new()).unwrap();
    assert_eq!(json, json!({"dictionary_item_added": {"root[2]": ["x"]}}));
}
