//! Ignore-order matcher.
//!
//! Computes a best-effort correspondence between the elements of two
//! sequences when position carries no meaning.
//!
//! ## Algorithm
//!
//! 1. Hash every element (order-independent deep hash)
//! 2. Group by hash. For hashes on both sides with differing counts, emit a
//!    `repetition_change` at the new side's first index when repetition is
//!    reported; otherwise the surplus joins the add/remove pools
//! 3. Hashes on one side only join the add/remove pools
//! 4. If `removed * added <= max_pairing_candidates`, compute the distance of
//!    every removed/added pair (bounded by `max_passes`, cached by hash pair)
//!    and keep pairs below `cutoff_distance_for_pairs`
//! 5. Pair greedily by ascending (distance, old index, new index); each pair
//!    emits its nested diff under the new index
//! 6. Unpaired leftovers become `iterable_item_removed` / `iterable_item_added`

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::{DiffError, Traversal};
use crate::types::{Category, DiffEntry, Path, PathComponent, Repetition, Value};

/// One candidate pairing.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    old: usize,
    new: usize,
}

impl Candidate {
    fn order(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.old.cmp(&other.old))
            .then(self.new.cmp(&other.new))
    }
}

/// Element indexes grouped by hash, in order of first appearance.
fn group(hashes: &[(usize, u64)]) -> (Vec<u64>, HashMap<u64, Vec<usize>>) {
    let mut order = Vec::new();
    let mut groups: HashMap<u64, Vec<usize>> = HashMap::new();
    for &(index, hash) in hashes {
        let slot = groups.entry(hash).or_default();
        if slot.is_empty() {
            order.push(hash);
        }
        slot.push(index);
    }
    (order, groups)
}

impl Traversal<'_> {
    pub(super) fn compare_unordered(
        &mut self,
        old: &[Value],
        new: &[Value],
        path: &Path,
        depth: usize,
    ) -> Result<(), DiffError> {
        let old_hashes = self.element_hashes(old, path, depth)?;
        let new_hashes = self.element_hashes(new, path, depth)?;
        let (old_order, old_groups) = group(&old_hashes);
        let (new_order, new_groups) = group(&new_hashes);

        let mut removed: Vec<usize> = Vec::new();
        let mut added: Vec<usize> = Vec::new();

        for hash in &old_order {
            let old_indexes = &old_groups[hash];
            match new_groups.get(hash) {
                None => removed.extend(old_indexes),
                Some(new_indexes) if new_indexes.len() != old_indexes.len() => {
                    if self.config().report_repetition {
                        let first = new_indexes[0];
                        self.record(DiffEntry::repetition_change(
                            path.child(PathComponent::Index(first)),
                            new[first].clone(),
                            Repetition {
                                old_repeat: old_indexes.len(),
                                new_repeat: new_indexes.len(),
                                old_indexes: old_indexes.clone(),
                                new_indexes: new_indexes.clone(),
                            },
                        ));
                    } else {
                        removed.extend(old_indexes.iter().skip(new_indexes.len()));
                        added.extend(new_indexes.iter().skip(old_indexes.len()));
                    }
                }
                Some(_) => {}
            }
        }
        for hash in &new_order {
            if !old_groups.contains_key(hash) {
                added.extend(&new_groups[hash]);
            }
        }
        removed.sort_unstable();
        added.sort_unstable();

        let old_hash_of: HashMap<usize, u64> = old_hashes.into_iter().collect();
        let new_hash_of: HashMap<usize, u64> = new_hashes.into_iter().collect();
        let pairs = self.pair(old, new, &removed, &added, &old_hash_of, &new_hash_of, path, depth)?;

        let paired_old: HashSet<usize> = pairs.iter().map(|c| c.old).collect();
        let paired_new: HashSet<usize> = pairs.iter().map(|c| c.new).collect();

        for candidate in &pairs {
            let child = path.child(PathComponent::Index(candidate.new));
            self.compare(&old[candidate.old], &new[candidate.new], &child, depth + 1)?;
        }
        for &i in removed.iter().filter(|i| !paired_old.contains(i)) {
            let child = path.child(PathComponent::Index(i));
            self.record(DiffEntry::removed(Category::IterableItemRemoved, child, old[i].clone()));
        }
        for &j in added.iter().filter(|j| !paired_new.contains(j)) {
            let child = path.child(PathComponent::Index(j));
            self.record(DiffEntry::added(Category::IterableItemAdded, child, new[j].clone()));
        }
        Ok(())
    }

    /// Hashes of the elements that are not excluded. Excluded paths inside
    /// an element do not contribute to its hash.
    fn element_hashes(&self, items: &[Value], path: &Path, depth: usize) -> Result<Vec<(usize, u64)>, DiffError> {
        let mut hashes = Vec::with_capacity(items.len());
        for (i, v) in items.iter().enumerate() {
            let child = path.child(PathComponent::Index(i));
            if !self.skip(&child, v) {
                hashes.push((i, self.hasher.hash_at(v, &child, depth + 1)?));
            }
        }
        Ok(hashes)
    }

    /// Greedy pairing of removed and added elements. Returned pairs are
    /// ordered by new index.
    #[allow(clippy::too_many_arguments)]
    fn pair(
        &mut self,
        old: &[Value],
        new: &[Value],
        removed: &[usize],
        added: &[usize],
        old_hash_of: &HashMap<usize, u64>,
        new_hash_of: &HashMap<usize, u64>,
        path: &Path,
        depth: usize,
    ) -> Result<Vec<Candidate>, DiffError> {
        if removed.is_empty() || added.is_empty() {
            return Ok(Vec::new());
        }
        let config = self.config();
        if removed.len().saturating_mul(added.len()) > config.max_pairing_candidates {
            tracing::debug!(
                removed = removed.len(),
                added = added.len(),
                max_pairing_candidates = config.max_pairing_candidates,
                "Pairing skipped, too many candidates"
            );
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        'outer: for &i in removed {
            for &j in added {
                let key = (old_hash_of[&i], new_hash_of[&j]);
                let distance = match self.cached_distance(key) {
                    Some(distance) => distance,
                    None => {
                        if self.stats.pass_count >= config.max_passes {
                            if !self.stats.max_pass_limit_reached {
                                tracing::warn!(
                                    max_passes = config.max_passes,
                                    "Pass limit reached, remaining candidates reported as added/removed"
                                );
                            }
                            self.stats.max_pass_limit_reached = true;
                            break 'outer;
                        }
                        self.stats.pass_count += 1;
                        let child = path.child(PathComponent::Index(j));
                        let distance = self.distance(&old[i], &new[j], &child, depth + 1)?;
                        self.store_distance(key, distance);
                        distance
                    }
                };
                if distance < config.cutoff_distance_for_pairs {
                    candidates.push(Candidate { distance, old: i, new: j });
                }
            }
        }

        candidates.sort_by(Candidate::order);
        let mut used_old = HashSet::new();
        let mut used_new = HashSet::new();
        let mut pairs: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| {
                if used_old.contains(&c.old) || used_new.contains(&c.new) {
                    return false;
                }
                used_old.insert(c.old);
                used_new.insert(c.new);
                true
            })
            .collect();
        pairs.sort_by_key(|c| c.new);
        Ok(pairs)
    }

    /// Distances depend on the pair's path once exclusions are configured,
    /// so the shared cache is only used without them.
    fn distance_cache(&self) -> Option<&super::DistanceCache> {
        self.engine.cache.as_ref().filter(|_| self.engine.paths.is_empty())
    }

    fn cached_distance(&mut self, key: (u64, u64)) -> Option<f64> {
        let cache = self.distance_cache()?;
        let hit = cache.read().peek(&key).copied();
        if hit.is_some() {
            self.stats.distance_cache_hit_count += 1;
        }
        hit
    }

    fn store_distance(&self, key: (u64, u64), distance: f64) {
        if let Some(cache) = self.distance_cache() {
            cache.write().put(key, distance);
        }
    }
}
