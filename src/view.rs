//! Projections of a [`DiffTree`]: the flat text view and the pretty sentences.
//!
//! ## Text View Payloads
//!
//! | Category | verbose 0 | verbose 1 | verbose 2 |
//! |----------|-----------|-----------|-----------|
//! | `type_changes` | path → types | path → types + values | same as 1 |
//! | `values_changed` | omitted | path → values | same as 1 |
//! | `dictionary_item_*`, `attribute_*` | paths | paths | path → value |
//! | `iterable_item_*` | path → value | path → value | path → value |
//! | `set_item_*` | paths | paths | paths |
//! | `repetition_change` | path → repetition | same | same |
//!
//! Both projections read the same tree; neither recomputes anything.

use std::collections::BTreeMap;

use crate::codec::{to_plain_json, CodecError, TypeRegistry};
use crate::types::{Category, DiffEntry, DiffTree, Value};

/// Old/new details of a change entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeDetail {
    /// Old type name (`type_changes` only).
    pub old_type: Option<String>,
    /// New type name (`type_changes` only).
    pub new_type: Option<String>,
    /// Old value, when the verbosity shows values.
    pub old_value: Option<Value>,
    /// New value, when the verbosity shows values.
    pub new_value: Option<Value>,
}

/// Multiplicity details of a repetition entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RepetitionDetail {
    /// Occurrences on the old side.
    pub old_repeat: usize,
    /// Occurrences on the new side.
    pub new_repeat: usize,
    /// Positions on the old side.
    pub old_indexes: Vec<usize>,
    /// Positions on the new side.
    pub new_indexes: Vec<usize>,
    /// The repeated element.
    pub value: Value,
}

/// Payload of one category in the text view.
#[derive(Debug, Clone, PartialEq)]
pub enum TextPayload {
    /// Rendered paths only.
    Paths(Vec<String>),
    /// Path → the added or removed value.
    Values(Vec<(String, Value)>),
    /// Path → change details.
    Changes(Vec<(String, ChangeDetail)>),
    /// Path → repetition details.
    Repetitions(Vec<(String, RepetitionDetail)>),
}

impl TextPayload {
    /// Rendered paths, whatever the payload shape.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::Paths(paths) => paths.iter().map(String::as_str).collect(),
            Self::Values(items) => items.iter().map(|(p, _)| p.as_str()).collect(),
            Self::Changes(items) => items.iter().map(|(p, _)| p.as_str()).collect(),
            Self::Repetitions(items) => items.iter().map(|(p, _)| p.as_str()).collect(),
        }
    }

    /// Number of paths.
    pub fn len(&self) -> usize {
        match self {
            Self::Paths(paths) => paths.len(),
            Self::Values(items) => items.len(),
            Self::Changes(items) => items.len(),
            Self::Repetitions(items) => items.len(),
        }
    }

    /// True when no path is present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flat category → payload projection of a diff tree.
///
/// Only categories with at least one entry are present.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextView {
    categories: BTreeMap<Category, TextPayload>,
    verbose_level: u8,
}

impl TextView {
    /// Project a tree at the given verbosity.
    pub fn from_tree(tree: &DiffTree, verbose_level: u8) -> Self {
        let mut categories = BTreeMap::new();
        for (category, entries) in tree.categories() {
            if let Some(payload) = project(category, entries, verbose_level) {
                categories.insert(category, payload);
            }
        }
        Self {
            categories,
            verbose_level,
        }
    }

    /// Verbosity the view was projected at.
    pub fn verbose_level(&self) -> u8 {
        self.verbose_level
    }

    /// Payload of one category.
    pub fn get(&self, category: Category) -> Option<&TextPayload> {
        self.categories.get(&category)
    }

    /// Paths of one category (empty when absent).
    pub fn paths(&self, category: Category) -> Vec<&str> {
        self.get(category).map(TextPayload::paths).unwrap_or_default()
    }

    /// Present categories with their payloads, in wire-name order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &TextPayload)> {
        self.categories.iter().map(|(c, p)| (*c, p))
    }

    /// Present category names, in order.
    pub fn keys(&self) -> Vec<&'static str> {
        self.categories.keys().map(Category::as_str).collect()
    }

    /// Number of present categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// True when no category is present.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Plain JSON form of the view.
    ///
    /// Custom records and opaque objects are converted through `registry`;
    /// any other custom type fails with [`CodecError::UnrepresentableType`].
    pub fn to_json_value(&self, registry: &TypeRegistry) -> Result<serde_json::Value, CodecError> {
        let mut out = serde_json::Map::new();
        for (category, payload) in &self.categories {
            let body = match payload {
                TextPayload::Paths(paths) => {
                    serde_json::Value::Array(paths.iter().cloned().map(serde_json::Value::String).collect())
                }
                TextPayload::Values(items) => {
                    let mut map = serde_json::Map::new();
                    for (path, value) in items {
                        map.insert(path.clone(), to_plain_json(value, registry)?);
                    }
                    serde_json::Value::Object(map)
                }
                TextPayload::Changes(items) => {
                    let mut map = serde_json::Map::new();
                    for (path, detail) in items {
                        map.insert(path.clone(), change_json(detail, registry)?);
                    }
                    serde_json::Value::Object(map)
                }
                TextPayload::Repetitions(items) => {
                    let mut map = serde_json::Map::new();
                    for (path, detail) in items {
                        map.insert(
                            path.clone(),
                            serde_json::json!({
                                "old_repeat": detail.old_repeat,
                                "new_repeat": detail.new_repeat,
                                "old_indexes": detail.old_indexes,
                                "new_indexes": detail.new_indexes,
                                "value": to_plain_json(&detail.value, registry)?,
                            }),
                        );
                    }
                    serde_json::Value::Object(map)
                }
            };
            out.insert(category.as_str().to_string(), body);
        }
        Ok(serde_json::Value::Object(out))
    }

    /// Plain JSON text of the view.
    pub fn to_json(&self, registry: &TypeRegistry) -> Result<String, CodecError> {
        Ok(self.to_json_value(registry)?.to_string())
    }
}

fn change_json(detail: &ChangeDetail, registry: &TypeRegistry) -> Result<serde_json::Value, CodecError> {
    let mut map = serde_json::Map::new();
    if let Some(old_type) = &detail.old_type {
        map.insert("old_type".into(), serde_json::Value::String(old_type.clone()));
    }
    if let Some(new_type) = &detail.new_type {
        map.insert("new_type".into(), serde_json::Value::String(new_type.clone()));
    }
    if let Some(old_value) = &detail.old_value {
        map.insert("old_value".into(), to_plain_json(old_value, registry)?);
    }
    if let Some(new_value) = &detail.new_value {
        map.insert("new_value".into(), to_plain_json(new_value, registry)?);
    }
    Ok(serde_json::Value::Object(map))
}

fn project(category: Category, entries: &[DiffEntry], verbose_level: u8) -> Option<TextPayload> {
    let path_of = |e: &DiffEntry| e.path.to_string();
    let values = || {
        entries
            .iter()
            .map(|e| (path_of(e), e.value().cloned().unwrap_or(Value::None)))
            .collect()
    };

    let payload = match category {
        Category::TypeChanges => TextPayload::Changes(
            entries
                .iter()
                .map(|e| {
                    let show = verbose_level >= 1;
                    let detail = ChangeDetail {
                        old_type: e.old_type.clone(),
                        new_type: e.new_type.clone(),
                        old_value: e.old_value.clone().filter(|_| show),
                        new_value: e.new_value.clone().filter(|_| show),
                    };
                    (path_of(e), detail)
                })
                .collect(),
        ),
        Category::ValuesChanged if verbose_level == 0 => return None,
        Category::ValuesChanged => TextPayload::Changes(
            entries
                .iter()
                .map(|e| {
                    let detail = ChangeDetail {
                        old_type: None,
                        new_type: None,
                        old_value: e.old_value.clone(),
                        new_value: e.new_value.clone(),
                    };
                    (path_of(e), detail)
                })
                .collect(),
        ),
        Category::DictionaryItemAdded
        | Category::DictionaryItemRemoved
        | Category::AttributeAdded
        | Category::AttributeRemoved => {
            if verbose_level >= 2 {
                TextPayload::Values(values())
            } else {
                TextPayload::Paths(entries.iter().map(path_of).collect())
            }
        }
        Category::IterableItemAdded | Category::IterableItemRemoved => TextPayload::Values(values()),
        Category::SetItemAdded | Category::SetItemRemoved => {
            TextPayload::Paths(entries.iter().map(path_of).collect())
        }
        Category::RepetitionChange => TextPayload::Repetitions(
            entries
                .iter()
                .filter_map(|e| {
                    let r = e.repetition.as_ref()?;
                    let detail = RepetitionDetail {
                        old_repeat: r.old_repeat,
                        new_repeat: r.new_repeat,
                        old_indexes: r.old_indexes.clone(),
                        new_indexes: r.new_indexes.clone(),
                        value: e.value().cloned().unwrap_or(Value::None),
                    };
                    Some((path_of(e), detail))
                })
                .collect(),
        ),
    };
    Some(payload)
}

/// One sentence for one entry.
pub fn pretty_entry(entry: &DiffEntry) -> String {
    let path = &entry.path;
    match entry.category {
        Category::DictionaryItemAdded => format!("Item {path} added to dictionary."),
        Category::DictionaryItemRemoved => format!("Item {path} removed from dictionary."),
        Category::IterableItemAdded => format!("Item {path} added to iterable."),
        Category::IterableItemRemoved => format!("Item {path} removed from iterable."),
        Category::AttributeAdded => format!("Attribute {path} added."),
        Category::AttributeRemoved => format!("Attribute {path} removed."),
        Category::SetItemAdded => format!("Item {path} added to set."),
        Category::SetItemRemoved => format!("Item {path} removed from set."),
        Category::ValuesChanged => format!(
            "Value of {path} changed from {} to {}.",
            display(entry.old_value.as_ref()),
            display(entry.new_value.as_ref())
        ),
        Category::TypeChanges => format!(
            "Type of {path} changed from {} to {} and value changed from {} to {}.",
            entry.old_type.as_deref().unwrap_or("NoneType"),
            entry.new_type.as_deref().unwrap_or("NoneType"),
            display(entry.old_value.as_ref()),
            display(entry.new_value.as_ref())
        ),
        Category::RepetitionChange => format!("Repetition change for item {path}."),
    }
}

/// Strings are shown in double quotes, everything else in its plain form.
fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::Str(s)) => format!("\"{s}\""),
        Some(Value::Shared(cell)) => display(Some(&cell.read())),
        Some(other) => other.to_string(),
        None => "None".to_string(),
    }
}

impl DiffTree {
    /// Text view at the given verbosity.
    pub fn to_text(&self, verbose_level: u8) -> TextView {
        TextView::from_tree(self, verbose_level)
    }

    /// Text view at the verbosity the tree was computed with.
    pub fn text(&self) -> TextView {
        TextView::from_tree(self, self.verbose_level())
    }

    /// One sentence per entry, in category-then-detection order, joined by newlines.
    pub fn pretty(&self) -> String {
        self.iter().map(pretty_entry).collect::<Vec<_>>().join("\n")
    }
}
