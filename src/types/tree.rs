//! Diff tree: the canonical result of one comparison.
//!
//! A [`DiffTree`] maps each [`Category`] to the entries detected for it, in
//! the order the traversal found them. Categories iterate in the order of
//! their wire names, so every projection of a tree is deterministic.
//!
//! ## Invariants
//!
//! - Within one category, an entry's path is unique.
//! - Entries always carry the values they were detected with. The text view
//!   decides at projection time how much of that to show.
//! - A tree is read-only once the engine hands it out.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::path::Path;
use super::value::Value;

/// Kind of discrepancy.
///
/// Declaration order is the alphabetical order of the wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Record field present only on the new side.
    AttributeAdded,
    /// Record field present only on the old side.
    AttributeRemoved,
    /// Mapping key present only on the new side.
    DictionaryItemAdded,
    /// Mapping key present only on the old side.
    DictionaryItemRemoved,
    /// Sequence element present only on the new side.
    IterableItemAdded,
    /// Sequence element present only on the old side.
    IterableItemRemoved,
    /// Multiplicity change of an element (ignore-order mode).
    RepetitionChange,
    /// Set member present only on the new side.
    SetItemAdded,
    /// Set member present only on the old side.
    SetItemRemoved,
    /// Same location holds values of different types.
    TypeChanges,
    /// Same location holds unequal values of the same type.
    ValuesChanged,
}

impl Category {
    /// Every category, in wire-name order.
    pub const ALL: [Category; 11] = [
        Category::AttributeAdded,
        Category::AttributeRemoved,
        Category::DictionaryItemAdded,
        Category::DictionaryItemRemoved,
        Category::IterableItemAdded,
        Category::IterableItemRemoved,
        Category::RepetitionChange,
        Category::SetItemAdded,
        Category::SetItemRemoved,
        Category::TypeChanges,
        Category::ValuesChanged,
    ];

    /// Wire name (`dictionary_item_added`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttributeAdded => "attribute_added",
            Self::AttributeRemoved => "attribute_removed",
            Self::DictionaryItemAdded => "dictionary_item_added",
            Self::DictionaryItemRemoved => "dictionary_item_removed",
            Self::IterableItemAdded => "iterable_item_added",
            Self::IterableItemRemoved => "iterable_item_removed",
            Self::RepetitionChange => "repetition_change",
            Self::SetItemAdded => "set_item_added",
            Self::SetItemRemoved => "set_item_removed",
            Self::TypeChanges => "type_changes",
            Self::ValuesChanged => "values_changed",
        }
    }

    /// True for categories that report something present only on the new side.
    pub fn is_addition(&self) -> bool {
        matches!(
            self,
            Self::AttributeAdded | Self::DictionaryItemAdded | Self::IterableItemAdded | Self::SetItemAdded
        )
    }

    /// True for categories that report something present only on the old side.
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            Self::AttributeRemoved
                | Self::DictionaryItemRemoved
                | Self::IterableItemRemoved
                | Self::SetItemRemoved
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown diff category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Multiplicity details of a `repetition_change` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repetition {
    /// Occurrences on the old side.
    pub old_repeat: usize,
    /// Occurrences on the new side.
    pub new_repeat: usize,
    /// Positions on the old side.
    pub old_indexes: Vec<usize>,
    /// Positions on the new side.
    pub new_indexes: Vec<usize>,
}

/// One detected discrepancy.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    /// Kind of discrepancy.
    pub category: Category,
    /// Location of the discrepancy.
    pub path: Path,
    /// Value on the old side, absent for additions.
    pub old_value: Option<Value>,
    /// Value on the new side, absent for removals.
    pub new_value: Option<Value>,
    /// Old type name (`type_changes` only).
    pub old_type: Option<String>,
    /// New type name (`type_changes` only).
    pub new_type: Option<String>,
    /// Multiplicity details (`repetition_change` only).
    pub repetition: Option<Repetition>,
}

impl DiffEntry {
    fn bare(category: Category, path: Path) -> Self {
        Self {
            category,
            path,
            old_value: None,
            new_value: None,
            old_type: None,
            new_type: None,
            repetition: None,
        }
    }

    /// Something present only on the new side.
    pub fn added(category: Category, path: Path, value: Value) -> Self {
        Self {
            new_value: Some(value),
            ..Self::bare(category, path)
        }
    }

    /// Something present only on the old side.
    pub fn removed(category: Category, path: Path, value: Value) -> Self {
        Self {
            old_value: Some(value),
            ..Self::bare(category, path)
        }
    }

    /// Unequal values of the same type.
    pub fn value_change(path: Path, old: Value, new: Value) -> Self {
        Self {
            old_value: Some(old),
            new_value: Some(new),
            ..Self::bare(Category::ValuesChanged, path)
        }
    }

    /// Values of different types.
    pub fn type_change(path: Path, old: Value, new: Value) -> Self {
        Self {
            old_type: Some(old.type_name().into_owned()),
            new_type: Some(new.type_name().into_owned()),
            old_value: Some(old),
            new_value: Some(new),
            ..Self::bare(Category::TypeChanges, path)
        }
    }

    /// Multiplicity change of an element.
    pub fn repetition_change(path: Path, value: Value, repetition: Repetition) -> Self {
        Self {
            old_value: Some(value),
            repetition: Some(repetition),
            ..Self::bare(Category::RepetitionChange, path)
        }
    }

    /// The value this entry is about: new side for additions, old side otherwise.
    pub fn value(&self) -> Option<&Value> {
        if self.category.is_addition() {
            self.new_value.as_ref()
        } else {
            self.old_value.as_ref()
        }
    }
}

/// Categorized result of one comparison.
#[derive(Debug, Clone, Default)]
pub struct DiffTree {
    entries: BTreeMap<Category, Vec<DiffEntry>>,
    verbose_level: u8,
    seen: HashSet<(Category, String)>,
}

impl DiffTree {
    pub(crate) fn new(verbose_level: u8) -> Self {
        Self {
            verbose_level,
            ..Self::default()
        }
    }

    /// Record an entry. Returns `false` (and drops the entry) when its path
    /// is already present in the same category.
    pub(crate) fn push(&mut self, entry: DiffEntry) -> bool {
        if !self.seen.insert((entry.category, entry.path.to_string())) {
            tracing::debug!(
                category = %entry.category.as_str(),
                path = %entry.path,
                "Entry dropped, path already recorded in category"
            );
            return false;
        }
        self.entries.entry(entry.category).or_default().push(entry);
        true
    }

    /// Set the verbosity the text view uses by default.
    pub fn with_verbose_level(mut self, verbose_level: u8) -> Self {
        self.verbose_level = verbose_level;
        self
    }

    /// Verbosity the tree was computed with.
    pub fn verbose_level(&self) -> u8 {
        self.verbose_level
    }

    /// Entries of one category, in detection order.
    pub fn get(&self, category: Category) -> &[DiffEntry] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty categories with their entries, in wire-name order.
    pub fn categories(&self) -> impl Iterator<Item = (Category, &[DiffEntry])> {
        self.entries
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(category, entries)| (*category, entries.as_slice()))
    }

    /// Every entry, in category-then-detection order.
    pub fn iter(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.values().flatten()
    }

    /// True when the category holds at least one entry.
    pub fn contains(&self, category: Category) -> bool {
        !self.get(category).is_empty()
    }

    /// Rendered paths of one category.
    pub fn paths(&self, category: Category) -> Vec<String> {
        self.get(category).iter().map(|e| e.path.to_string()).collect()
    }

    /// Distinct rendered paths across all categories, sorted.
    pub fn affected_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.iter().map(|e| e.path.to_string()).collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// True when no difference was found.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for DiffTree {
    fn eq(&self, other: &Self) -> bool {
        self.verbose_level == other.verbose_level
            && self.categories().eq(other.categories())
    }
}

impl<'a> IntoIterator for &'a DiffTree {
    type Item = &'a DiffEntry;
    type IntoIter = Box<dyn Iterator<Item = &'a DiffEntry> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
