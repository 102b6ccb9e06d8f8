//! Diff tree documents: lossless JSON form of a [`DiffTree`].
//!
//! ```json
//! {
//!   "header": "DeepDiff Delta Payload v0-0-1\n",
//!   "verbose_level": 1,
//!   "entries": [
//!     {"category": "values_changed",
//!      "path": [{"key": "a"}, {"index": 0}],
//!      "old_value": 1, "new_value": 2}
//!   ]
//! }
//! ```
//!
//! Values and path keys are tagged frames, so decoding goes through the same
//! allow-list gate as binary payloads.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value as Frame};

use super::decoder::RestrictedDecoder;
use super::registry::{AllowList, TypeRegistry};
use super::tagged::{custom_types, TaggedEncoder};
use super::{CodecError, MAGIC_HEADER};
use crate::types::{Category, DiffEntry, DiffTree, Path, PathComponent, Repetition, Value};

/// Encode a diff tree as a JSON document.
pub fn encode_tree(tree: &DiffTree) -> String {
    let mut encoder = TaggedEncoder::new();
    let entries: Vec<Frame> = tree.iter().map(|entry| encode_entry(&mut encoder, entry)).collect();
    json!({
        "header": MAGIC_HEADER,
        "verbose_level": tree.verbose_level(),
        "entries": entries,
    })
    .to_string()
}

/// Decode a JSON document back into a diff tree.
pub fn decode_tree(text: &str, allow_list: &AllowList, registry: &TypeRegistry) -> Result<DiffTree, CodecError> {
    let mut decoder = RestrictedDecoder::new(allow_list, registry);
    let document = decoder.check_document(text)?;
    decoder.scan_and_resolve(&document)?;

    let verbose_level = document
        .get("verbose_level")
        .and_then(Frame::as_u64)
        .and_then(|level| u8::try_from(level).ok())
        .unwrap_or(1);
    let entries = document
        .get("entries")
        .and_then(Frame::as_array)
        .ok_or_else(|| CodecError::DecodeFormat("document has no entries".into()))?;

    let mut tree = DiffTree::new(verbose_level);
    for frame in entries {
        let entry = decode_entry(&mut decoder, frame)?;
        if !tree.push(entry) {
            return Err(CodecError::DecodeFormat("duplicate entry path".into()));
        }
    }
    decoder.finish();
    Ok(tree)
}

/// Encode for a consumer that shares `registry`.
///
/// Fails with [`CodecError::UnrepresentableType`] when the tree holds a
/// custom type the registry does not know.
pub fn encode_for_transport(tree: &DiffTree, registry: &TypeRegistry) -> Result<String, CodecError> {
    let mut customs = BTreeSet::new();
    for entry in tree {
        for component in entry.path.components() {
            if let PathComponent::Key(key) | PathComponent::Member(key) = component {
                custom_types(key, &mut customs);
            }
        }
        for value in [&entry.old_value, &entry.new_value].into_iter().flatten() {
            custom_types(value, &mut customs);
        }
    }
    if let Some(missing) = customs.into_iter().find(|name| !registry.contains(name)) {
        return Err(CodecError::UnrepresentableType(missing));
    }
    Ok(encode_tree(tree))
}

/// Decode a document produced by [`encode_for_transport`].
///
/// The registry doubles as the allow-list: exactly the registered custom
/// types may be reconstructed.
pub fn decode_for_transport(text: &str, registry: &TypeRegistry) -> Result<DiffTree, CodecError> {
    decode_tree(text, &registry.allow_list(), registry)
}

impl DiffTree {
    /// JSON document form of this tree. See [`encode_tree`].
    pub fn to_document(&self) -> String {
        encode_tree(self)
    }

    /// Rebuild a tree from its document form. See [`decode_tree`].
    pub fn from_document(text: &str, allow_list: &AllowList, registry: &TypeRegistry) -> Result<Self, CodecError> {
        decode_tree(text, allow_list, registry)
    }
}

fn encode_entry(encoder: &mut TaggedEncoder, entry: &DiffEntry) -> Frame {
    let mut map = Map::new();
    map.insert("category".into(), Frame::String(entry.category.as_str().into()));
    let path: Vec<Frame> = entry
        .path
        .components()
        .iter()
        .map(|component| match component {
            PathComponent::Index(i) => json!({ "index": i }),
            PathComponent::Key(key) => json!({ "key": encoder.encode(key) }),
            PathComponent::Attribute(name) => json!({ "attribute": name }),
            PathComponent::Member(member) => json!({ "member": encoder.encode(member) }),
        })
        .collect();
    map.insert("path".into(), Frame::Array(path));
    if let Some(old_value) = &entry.old_value {
        map.insert("old_value".into(), encoder.encode(old_value));
    }
    if let Some(new_value) = &entry.new_value {
        map.insert("new_value".into(), encoder.encode(new_value));
    }
    if let Some(old_type) = &entry.old_type {
        map.insert("old_type".into(), Frame::String(old_type.clone()));
    }
    if let Some(new_type) = &entry.new_type {
        map.insert("new_type".into(), Frame::String(new_type.clone()));
    }
    if let Some(repetition) = &entry.repetition {
        map.insert("repetition".into(), json!(repetition));
    }
    Frame::Object(map)
}

fn decode_entry(decoder: &mut RestrictedDecoder<'_>, frame: &Frame) -> Result<DiffEntry, CodecError> {
    let format = |message: &str| CodecError::DecodeFormat(message.to_string());
    let map = frame.as_object().ok_or_else(|| format("entry is not an object"))?;

    let category: Category = map
        .get("category")
        .and_then(Frame::as_str)
        .ok_or_else(|| format("entry has no category"))?
        .parse()
        .map_err(|e: crate::types::UnknownCategory| CodecError::DecodeFormat(e.to_string()))?;

    let mut path = Path::root();
    for component in map
        .get("path")
        .and_then(Frame::as_array)
        .ok_or_else(|| format("entry has no path"))?
    {
        path.push(decode_component(decoder, component)?);
    }

    let mut value = |key: &str| -> Result<Option<Value>, CodecError> {
        map.get(key).map(|frame| decoder.build(frame)).transpose()
    };
    let old_value = value("old_value")?;
    let new_value = value("new_value")?;
    let text = |key: &str| map.get(key).and_then(Frame::as_str).map(str::to_string);
    let repetition = map
        .get("repetition")
        .map(|frame| serde_json::from_value::<Repetition>(frame.clone()))
        .transpose()
        .map_err(|e| CodecError::DecodeFormat(format!("invalid repetition: {e}")))?;

    Ok(DiffEntry {
        category,
        path,
        old_value,
        new_value,
        old_type: text("old_type"),
        new_type: text("new_type"),
        repetition,
    })
}

fn decode_component(decoder: &mut RestrictedDecoder<'_>, frame: &Frame) -> Result<PathComponent, CodecError> {
    let map = frame
        .as_object()
        .filter(|map| map.len() == 1)
        .ok_or_else(|| CodecError::DecodeFormat("path component must have exactly one field".into()))?;
    if let Some(index) = map.get("index") {
        let index = index
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| CodecError::DecodeFormat("invalid index component".into()))?;
        return Ok(PathComponent::Index(index));
    }
    if let Some(name) = map.get("attribute") {
        let name = name
            .as_str()
            .ok_or_else(|| CodecError::DecodeFormat("invalid attribute component".into()))?;
        return Ok(PathComponent::Attribute(name.to_string()));
    }
    if let Some(key) = map.get("key") {
        return Ok(PathComponent::Key(decoder.build(key)?));
    }
    if let Some(member) = map.get("member") {
        return Ok(PathComponent::Member(decoder.build(member)?));
    }
    Err(CodecError::DecodeFormat("unknown path component".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::diff;
    use crate::policy::DiffConfig;
    use crate::types::Record;

    #[test]
    fn test_document_round_trip() {
        let old = Value::dict([("a", Value::list([1, 2])), ("b", Value::set(["x"]))]);
        let new = Value::dict([("a", Value::list([1, 3, 4])), ("c", Value::from("y"))]);
        let tree = diff(&old, &new, &DiffConfig::default()).unwrap();
        let text = encode_tree(&tree);
        let back = decode_tree(&text, &AllowList::new(), &TypeRegistry::new()).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_document_needs_header() {
        let err = decode_tree(r#"{"entries": []}"#, &AllowList::new(), &TypeRegistry::new()).unwrap_err();
        assert!(matches!(err, CodecError::DecodeFormat(_)));
    }

    #[test]
    fn test_transport_requires_registered_customs() {
        let old = Value::from(Record::new("tests.A").with_field("x", 1));
        let new = Value::from(Record::new("tests.B").with_field("x", 1));
        let tree = diff(&old, &new, &DiffConfig::default()).unwrap();

        let partial = TypeRegistry::new().with("tests.A", Ok);
        let err = encode_for_transport(&tree, &partial).unwrap_err();
        assert_eq!(err, CodecError::UnrepresentableType("tests.B".into()));

        let registry = partial.with("tests.B", Ok);
        let text = encode_for_transport(&tree, &registry).unwrap();
        assert_eq!(decode_for_transport(&text, &registry).unwrap(), tree);

        let narrow = TypeRegistry::new().with("tests.A", Ok);
        let err = decode_for_transport(&text, &narrow).unwrap_err();
        assert_eq!(err, CodecError::ForbiddenModule("tests.B".into()));
    }
}
