//! Recursive traversal engine.
//!
//! The engine walks two value graphs in lockstep and classifies every
//! discrepancy into a [`DiffTree`].
//!
//! ## Algorithm
//!
//! For each pair of nodes, starting at `root`:
//!
//! 1. Fail with [`DiffError::DepthExceeded`] past `max_depth`
//! 2. Skip excluded paths (exact or pattern) and excluded types
//! 3. Stop if the (old, new) identity pair is already on the current path
//! 4. Emit `type_changes` when the types differ (respecting the numeric and
//!    string type groups) and stop
//! 5. Dispatch by kind:
//!    - Scalar: equality policy, mismatch emits `values_changed`
//!    - Mapping: key symmetric difference, recurse into shared keys
//!    - Sequence: pairwise by index, or the ignore-order matcher
//!    - Set: member symmetric difference by structural hash
//!    - Record: field symmetric difference, recurse into shared fields
//!
//! Traversal-local anomalies are entries, never errors. The only errors are
//! an invalid configuration (at construction) and the depth cutoff.

mod matcher;

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::canonical::DeepHasher;
use crate::policy::{ConfigError, DiffConfig, EqualityPolicy, PathFilter};
use crate::types::{Category, DiffEntry, DiffTree, Path, PathComponent, Record, Value};

/// Error type for diff operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiffError {
    /// Recursion cutoff reached.
    #[error("Maximum depth of {max_depth} exceeded at {path}")]
    DepthExceeded {
        /// Configured cutoff.
        max_depth: usize,
        /// Rendered path of the node that crossed it.
        path: String,
    },
    /// Configuration rejected at engine construction.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Counters from the most recent comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Pair distances computed by the ignore-order matcher.
    pub pass_count: usize,
    /// Entries recorded.
    pub diff_count: usize,
    /// Pair distances served from the cache.
    pub distance_cache_hit_count: usize,
    /// `max_passes` was exhausted; remaining candidates became add/remove.
    pub max_pass_limit_reached: bool,
    /// `max_diffs` was reached; later entries were dropped.
    pub max_diff_limit_reached: bool,
}

/// Distance cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
}

type DistanceCache = Arc<RwLock<LruCache<(u64, u64), f64>>>;

/// Reusable comparison engine bound to one configuration.
///
/// The engine is `Sync`: independent comparisons may run on separate threads
/// and share the distance cache.
///
/// ## Example
///
/// ```rust
/// use deepdiff_kernel::{DiffConfig, DiffEngine, Value};
///
/// let engine = DiffEngine::new(DiffConfig::default()).unwrap();
/// let old = Value::dict([(1, 1), (2, 2)]);
/// let new = Value::dict([(1, 1), (2, 3)]);
/// let tree = engine.diff(&old, &new).unwrap();
/// assert_eq!(tree.len(), 1);
/// ```
pub struct DiffEngine {
    config: DiffConfig,
    policy: EqualityPolicy,
    paths: PathFilter,
    cache: Option<DistanceCache>,
    last_stats: RwLock<DiffStats>,
}

impl DiffEngine {
    /// Validate the configuration and compile its path patterns.
    pub fn new(config: DiffConfig) -> Result<Self, DiffError> {
        config.validate()?;
        let paths = PathFilter::from_config(&config)?;
        let cache = NonZeroUsize::new(config.cache_size)
            .map(|size| Arc::new(RwLock::new(LruCache::new(size))));

        Ok(Self {
            policy: EqualityPolicy::from_config(&config),
            config,
            paths,
            cache,
            last_stats: RwLock::new(DiffStats::default()),
        })
    }

    /// The configuration.
    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Compare two graphs.
    pub fn diff(&self, old: &Value, new: &Value) -> Result<DiffTree, DiffError> {
        self.diff_with_stats(old, new).map(|(tree, _)| tree)
    }

    /// Compare two graphs, also returning the run's counters.
    pub fn diff_with_stats(&self, old: &Value, new: &Value) -> Result<(DiffTree, DiffStats), DiffError> {
        tracing::debug!(
            config_hash = %self.config.params_hash(),
            ignore_order = self.config.ignore_order,
            "Diff started"
        );

        let mut run = Traversal::new(self, DiffTree::new(self.config.verbose_level));
        run.compare(old, new, &Path::root(), 0)?;
        let Traversal { tree, stats, .. } = run;

        *self.last_stats.write() = stats;
        tracing::debug!(
            diff_count = stats.diff_count,
            pass_count = stats.pass_count,
            cache_hits = stats.distance_cache_hit_count,
            "Diff finished"
        );
        Ok((tree, stats))
    }

    /// Counters of the most recent comparison run by this engine.
    pub fn stats(&self) -> DiffStats {
        *self.last_stats.read()
    }

    /// The matcher's cost metric for a pair of values, in `[0, 1]`.
    ///
    /// `0` means equal under the configuration. Numbers use the relative
    /// numeric distance capped at `cutoff_distance_for_pairs`; anything else
    /// uses the nested diff size over the rough size of both sides.
    pub fn distance(&self, old: &Value, new: &Value) -> Result<f64, DiffError> {
        let mut run = Traversal::new(self, DiffTree::new(0));
        run.distance(old, new, &Path::root(), 0)
    }

    /// Get distance cache statistics.
    ///
    /// Returns `None` when the cache is disabled (`cache_size = 0`).
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let cache = cache.read();
            CacheStats {
                len: cache.len(),
                cap: cache.cap().get(),
            }
        })
    }

    /// Clear the distance cache.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }

    fn type_excluded(&self, value: &Value) -> bool {
        !self.config.exclude_types.is_empty()
            && self.config.exclude_types.contains(value.type_name().as_ref())
    }
}

impl std::fmt::Debug for DiffEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffEngine")
            .field("config", &self.config)
            .field("exclude_regex", &self.paths.pattern_count())
            .field("cache", &self.cache_stats())
            .finish()
    }
}

/// Compare two graphs under a configuration.
pub fn diff(old: &Value, new: &Value, config: &DiffConfig) -> Result<DiffTree, DiffError> {
    DiffEngine::new(config.clone())?.diff(old, new)
}

/// The ignore-order matcher's distance between two values.
pub fn deep_distance(old: &Value, new: &Value, config: &DiffConfig) -> Result<f64, DiffError> {
    DiffEngine::new(config.clone())?.distance(old, new)
}

/// State of one comparison.
struct Traversal<'e> {
    engine: &'e DiffEngine,
    hasher: DeepHasher<'e>,
    tree: DiffTree,
    visited: HashSet<(usize, usize)>,
    stats: DiffStats,
    trial_run: bool,
}

impl<'e> Traversal<'e> {
    fn new(engine: &'e DiffEngine, tree: DiffTree) -> Self {
        Self {
            engine,
            hasher: DeepHasher::from_config(&engine.config).with_path_filter(&engine.paths),
            tree,
            visited: HashSet::new(),
            stats: DiffStats::default(),
            trial_run: false,
        }
    }

    /// A nested traversal for distance trials. Shares the pass budget, not
    /// results, and is not subject to `max_diffs`.
    fn trial(&self) -> Traversal<'e> {
        let mut trial = Traversal::new(self.engine, DiffTree::new(0));
        trial.stats.pass_count = self.stats.pass_count;
        trial.stats.max_pass_limit_reached = self.stats.max_pass_limit_reached;
        trial.trial_run = true;
        trial
    }

    fn config(&self) -> &'e DiffConfig {
        &self.engine.config
    }

    fn limit_reached(&self) -> bool {
        self.stats.max_diff_limit_reached
    }

    fn record(&mut self, entry: DiffEntry) {
        if let Some(max) = self.config().max_diffs.filter(|_| !self.trial_run) {
            if self.stats.diff_count >= max {
                if !self.stats.max_diff_limit_reached {
                    tracing::warn!(max_diffs = max, "Diff limit reached, further entries dropped");
                }
                self.stats.max_diff_limit_reached = true;
                return;
            }
        }
        if self.tree.push(entry) {
            self.stats.diff_count += 1;
        }
    }

    /// True when a child must not be reported or compared.
    fn skip(&self, path: &Path, value: &Value) -> bool {
        self.engine.type_excluded(value) || self.engine.paths.excludes(path)
    }

    fn compare(&mut self, old: &Value, new: &Value, path: &Path, depth: usize) -> Result<(), DiffError> {
        if depth > self.config().max_depth {
            return Err(DiffError::DepthExceeded {
                max_depth: self.config().max_depth,
                path: path.to_string(),
            });
        }
        if self.limit_reached() {
            return Ok(());
        }
        if self.engine.paths.excludes(path) || self.engine.type_excluded(old) || self.engine.type_excluded(new) {
            return Ok(());
        }

        if matches!(old, Value::Shared(_)) || matches!(new, Value::Shared(_)) {
            return self.compare_shared(old, new, path, depth);
        }

        if !self.engine.policy.same_type_group(old, new) {
            self.record(DiffEntry::type_change(path.clone(), old.clone(), new.clone()));
            return Ok(());
        }

        match (old, new) {
            (Value::Dict(o), Value::Dict(n)) => self.compare_dicts(o, n, path, depth),
            (Value::List(o), Value::List(n)) | (Value::Tuple(o), Value::Tuple(n)) => {
                if self.config().ignore_order {
                    self.compare_unordered(o, n, path, depth)
                } else {
                    self.compare_ordered(o, n, path, depth)
                }
            }
            (Value::Set(o), Value::Set(n)) | (Value::FrozenSet(o), Value::FrozenSet(n)) => {
                self.compare_sets(o, n, path, depth)
            }
            (Value::Record(o), Value::Record(n)) => self.compare_records(o, n, path, depth),
            _ => {
                if !self.engine.policy.scalars_equal(old, new) {
                    self.record(DiffEntry::value_change(path.clone(), old.clone(), new.clone()));
                }
                Ok(())
            }
        }
    }

    /// Resolve shared cells under the visited-pair guard.
    fn compare_shared(&mut self, old: &Value, new: &Value, path: &Path, depth: usize) -> Result<(), DiffError> {
        if let (Value::Shared(o), Value::Shared(n)) = (old, new) {
            if o.ptr_eq(n) {
                return Ok(());
            }
        }
        let pair = (identity(old), identity(new));
        if !self.visited.insert(pair) {
            return Ok(());
        }
        let result = match (old, new) {
            (Value::Shared(o), Value::Shared(n)) => self.compare(&o.read(), &n.read(), path, depth),
            (Value::Shared(o), n) => self.compare(&o.read(), n, path, depth),
            (o, Value::Shared(n)) => self.compare(o, &n.read(), path, depth),
            (o, n) => self.compare(o, n, path, depth),
        };
        self.visited.remove(&pair);
        result
    }

    fn compare_dicts(
        &mut self,
        old: &[(Value, Value)],
        new: &[(Value, Value)],
        path: &Path,
        depth: usize,
    ) -> Result<(), DiffError> {
        let old_hashes = self.key_hashes(old.iter().map(|(k, _)| k), path, depth)?;
        let new_hashes = self.key_hashes(new.iter().map(|(k, _)| k), path, depth)?;
        let old_keys: HashSet<u64> = old_hashes.iter().copied().collect();
        let new_index: HashMap<u64, usize> = new_hashes.iter().enumerate().map(|(j, h)| (*h, j)).collect();

        for ((key, value), hash) in new.iter().zip(&new_hashes) {
            if !old_keys.contains(hash) {
                let child = path.child(PathComponent::Key(key.clone()));
                if !self.skip(&child, value) {
                    self.record(DiffEntry::added(Category::DictionaryItemAdded, child, value.clone()));
                }
            }
        }

        let mut shared = Vec::new();
        for ((key, value), hash) in old.iter().zip(&old_hashes) {
            if let Some(&j) = new_index.get(hash) {
                shared.push((key, value, j));
                continue;
            }
            let child = path.child(PathComponent::Key(key.clone()));
            if !self.skip(&child, value) {
                self.record(DiffEntry::removed(Category::DictionaryItemRemoved, child, value.clone()));
            }
        }

        for (key, old_value, j) in shared {
            let child = path.child(PathComponent::Key(key.clone()));
            self.compare(old_value, &new[j].1, &child, depth + 1)?;
        }
        Ok(())
    }

    fn compare_ordered(&mut self, old: &[Value], new: &[Value], path: &Path, depth: usize) -> Result<(), DiffError> {
        for (i, (o, n)) in old.iter().zip(new).enumerate() {
            self.compare(o, n, &path.child(PathComponent::Index(i)), depth + 1)?;
        }
        for (i, value) in new.iter().enumerate().skip(old.len()) {
            let child = path.child(PathComponent::Index(i));
            if !self.skip(&child, value) {
                self.record(DiffEntry::added(Category::IterableItemAdded, child, value.clone()));
            }
        }
        for (i, value) in old.iter().enumerate().skip(new.len()) {
            let child = path.child(PathComponent::Index(i));
            if !self.skip(&child, value) {
                self.record(DiffEntry::removed(Category::IterableItemRemoved, child, value.clone()));
            }
        }
        Ok(())
    }

    /// Structural hashes of mapping keys or set members one level below `path`.
    fn key_hashes<'v>(
        &self,
        keys: impl Iterator<Item = &'v Value>,
        path: &Path,
        depth: usize,
    ) -> Result<Vec<u64>, DiffError> {
        keys.map(|k| self.hasher.hash_detached(k, path, depth + 1)).collect()
    }

    fn compare_sets(&mut self, old: &[Value], new: &[Value], path: &Path, depth: usize) -> Result<(), DiffError> {
        let old_list = self.key_hashes(old.iter(), path, depth)?;
        let new_list = self.key_hashes(new.iter(), path, depth)?;
        let old_hashes: HashSet<u64> = old_list.iter().copied().collect();
        let new_hashes: HashSet<u64> = new_list.iter().copied().collect();

        for (member, hash) in new.iter().zip(&new_list) {
            if !old_hashes.contains(hash) {
                let child = path.child(PathComponent::Member(member.clone()));
                if !self.skip(&child, member) {
                    self.record(DiffEntry::added(Category::SetItemAdded, child, member.clone()));
                }
            }
        }
        for (member, hash) in old.iter().zip(&old_list) {
            if !new_hashes.contains(hash) {
                let child = path.child(PathComponent::Member(member.clone()));
                if !self.skip(&child, member) {
                    self.record(DiffEntry::removed(Category::SetItemRemoved, child, member.clone()));
                }
            }
        }
        Ok(())
    }

    fn compare_records(&mut self, old: &Record, new: &Record, path: &Path, depth: usize) -> Result<(), DiffError> {
        let private = self.config().ignore_private_variables;
        let visible = |name: &str| !(private && name.starts_with("__"));

        for (name, value) in new.fields() {
            if visible(name) && old.field(name).is_none() {
                let child = path.child(PathComponent::Attribute(name.clone()));
                if !self.skip(&child, value) {
                    self.record(DiffEntry::added(Category::AttributeAdded, child, value.clone()));
                }
            }
        }
        for (name, value) in old.fields() {
            if !visible(name) {
                continue;
            }
            let child = path.child(PathComponent::Attribute(name.clone()));
            match new.field(name) {
                Some(new_value) => self.compare(value, new_value, &child, depth + 1)?,
                None => {
                    if !self.skip(&child, value) {
                        self.record(DiffEntry::removed(Category::AttributeRemoved, child, value.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Matcher cost metric. See [`DiffEngine::distance`].
    ///
    /// `path` is where the pair would be compared, so exclusions below it
    /// apply to the nested diff.
    fn distance(&mut self, old: &Value, new: &Value, path: &Path, depth: usize) -> Result<f64, DiffError> {
        let cutoff = self.config().cutoff_distance_for_pairs;
        if let (Some(a), Some(b)) = (numeric(old), numeric(new)) {
            return Ok(numbers_distance(a, b, cutoff));
        }

        let mut trial = self.trial();
        trial.compare(old, new, path, depth)?;
        self.stats.pass_count = trial.stats.pass_count;
        self.stats.distance_cache_hit_count += trial.stats.distance_cache_hit_count;
        self.stats.max_pass_limit_reached |= trial.stats.max_pass_limit_reached;

        let diff_len = trial.tree.len();
        if diff_len == 0 {
            return Ok(0.0);
        }
        let max_depth = self.config().max_depth;
        let size = rough_size(old, max_depth) + rough_size(new, max_depth);
        Ok((diff_len as f64 / size.max(1) as f64).min(1.0))
    }
}

/// Identity of a node for the visited-pair guard.
fn identity(value: &Value) -> usize {
    match value {
        Value::Shared(cell) => cell.id(),
        other => other as *const Value as usize,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Shared(cell) => numeric(&cell.read()),
        other => other.as_f64(),
    }
}

/// `min(cutoff, |a - b| / (|a + b| / cutoff))`.
fn numbers_distance(a: f64, b: f64, cutoff: f64) -> f64 {
    if a == b {
        return 0.0;
    }
    let divisor = (a + b) / cutoff;
    if divisor == 0.0 || !divisor.is_finite() {
        return cutoff;
    }
    let distance = ((a - b) / divisor).abs();
    if distance.is_nan() {
        cutoff
    } else {
        distance.min(cutoff)
    }
}

/// Node count of a value, visiting each shared cell once. Containers past
/// `max_depth` levels count as one node.
fn rough_size(value: &Value, max_depth: usize) -> usize {
    fn walk(value: &Value, depth: usize, max_depth: usize, seen: &mut HashSet<usize>) -> usize {
        if depth >= max_depth {
            return 1;
        }
        let next = depth + 1;
        match value {
            Value::Shared(cell) => {
                if !seen.insert(cell.id()) {
                    return 1;
                }
                walk(&cell.read(), depth, max_depth, seen)
            }
            Value::List(items) | Value::Tuple(items) | Value::Set(items) | Value::FrozenSet(items) => {
                1 + items.iter().map(|v| walk(v, next, max_depth, seen)).sum::<usize>()
            }
            Value::Dict(entries) => 1 + entries.iter().map(|(_, v)| walk(v, next, max_depth, seen)).sum::<usize>(),
            Value::Record(record) => {
                1 + record.fields().iter().map(|(_, v)| walk(v, next, max_depth, seen)).sum::<usize>()
            }
            _ => 1,
        }
    }
    walk(value, 0, max_depth, &mut HashSet::new())
}
