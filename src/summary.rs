//! Path-neighbor summaries.
//!
//! A leaf records, for every label path leading out of its objects, which
//! graph vertices can be reached along that path. Each entry is either a
//! sorted, duplicate-free id list or [`PnEntry::Ignored`] once the list grew
//! past the configured cap. Entries only move forward through
//! absent -> bounded -> ignored while objects are added.

use crate::error::IndexError;
use reachtree_types::{Label, VertexId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::str::FromStr;

const KEY_PREFIX: &str = "PN";

/// Label path identifying a summary entry. The hop count is the path length.
///
/// Paths are stored in traversal order from the owning object outwards;
/// [`PnKey::reversed`] yields the opposite direction.
///
/// ```
/// use reachtree::PnKey;
///
/// let key: PnKey = "PN_3_7".parse().unwrap();
/// assert_eq!(key.hop_count(), 2);
/// assert_eq!(key.reversed().to_string(), "PN_7_3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PnKey {
    labels: SmallVec<[Label; 4]>,
}

impl PnKey {
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }

    /// One-hop key for neighbors carrying `label`.
    pub fn single(label: Label) -> Self {
        Self::new([label])
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn hop_count(&self) -> usize {
        self.labels.len()
    }

    pub fn reversed(&self) -> Self {
        Self {
            labels: self.labels.iter().rev().copied().collect(),
        }
    }
}

impl fmt::Display for PnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(KEY_PREFIX)?;
        for label in &self.labels {
            write!(f, "_{label}")?;
        }
        Ok(())
    }
}

impl FromStr for PnKey {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('_');
        if parts.next() != Some(KEY_PREFIX) {
            return Err(IndexError::InvalidQuery(format!(
                "summary key {s:?} lacks the {KEY_PREFIX} prefix"
            )));
        }
        let labels = parts
            .map(|part| {
                part.parse::<Label>().map_err(|_| {
                    IndexError::InvalidQuery(format!("bad label {part:?} in summary key {s:?}"))
                })
            })
            .collect::<Result<SmallVec<[Label; 4]>, _>>()?;
        if labels.is_empty() {
            return Err(IndexError::InvalidQuery(format!(
                "summary key {s:?} has no labels"
            )));
        }
        Ok(Self { labels })
    }
}

/// Value of one summary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PnEntry {
    /// Sorted, duplicate-free reachable vertex ids.
    Bounded(Vec<VertexId>),
    /// Too many vertices to enumerate; matches anything when pruning.
    Ignored,
}

impl PnEntry {
    /// Bounded entry from arbitrary ids, or `Ignored` when more than `cap`
    /// distinct ids remain.
    pub fn from_ids(ids: impl IntoIterator<Item = VertexId>, cap: usize) -> Self {
        let mut ids: Vec<VertexId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() > cap {
            PnEntry::Ignored
        } else {
            PnEntry::Bounded(ids)
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, PnEntry::Ignored)
    }

    pub fn ids(&self) -> Option<&[VertexId]> {
        match self {
            PnEntry::Bounded(ids) => Some(ids),
            PnEntry::Ignored => None,
        }
    }
}

/// Path-neighbor summary: label path -> reachable vertices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNeighbors {
    entries: BTreeMap<PnKey, PnEntry>,
}

impl PathNeighbors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of a bounded entry, capped at `cap`.
    pub fn with_entry(
        mut self,
        key: PnKey,
        ids: impl IntoIterator<Item = VertexId>,
        cap: usize,
    ) -> Self {
        self.entries.insert(key, PnEntry::from_ids(ids, cap));
        self
    }

    /// Builder-style insertion of an uncapped bounded entry.
    pub fn with_neighbors(self, key: PnKey, ids: impl IntoIterator<Item = VertexId>) -> Self {
        self.with_entry(key, ids, usize::MAX)
    }

    /// Builder-style insertion of an ignored entry.
    pub fn with_ignored(mut self, key: PnKey) -> Self {
        self.entries.insert(key, PnEntry::Ignored);
        self
    }

    pub fn get(&self, key: &PnKey) -> Option<&PnEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PnKey, &PnEntry)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Union `other` into `self` under the monotonic merge rule.
    ///
    /// An ignored entry in `other` makes the key ignored here. A key missing
    /// here is copied over (capped). A key already ignored here is left alone.
    /// Otherwise the sorted union replaces the list, turning ignored when its
    /// length exceeds `cap`.
    ///
    /// # Returns
    ///
    /// Whether `self` changed.
    pub fn merge(&mut self, other: &PathNeighbors, cap: usize) -> bool {
        let mut changed = false;
        for (key, incoming) in &other.entries {
            match self.entries.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    let entry = match incoming {
                        PnEntry::Bounded(ids) if ids.len() > cap => PnEntry::Ignored,
                        entry => entry.clone(),
                    };
                    slot.insert(entry);
                    changed = true;
                }
                Entry::Occupied(mut slot) => {
                    let replacement = match (slot.get(), incoming) {
                        (PnEntry::Ignored, _) => None,
                        (PnEntry::Bounded(_), PnEntry::Ignored) => Some(PnEntry::Ignored),
                        (PnEntry::Bounded(base), PnEntry::Bounded(ids)) => {
                            let union = sorted_union(base, ids);
                            (union.len() > base.len()).then(|| {
                                if union.len() > cap {
                                    PnEntry::Ignored
                                } else {
                                    PnEntry::Bounded(union)
                                }
                            })
                        }
                    };
                    if let Some(entry) = replacement {
                        slot.insert(entry);
                        changed = true;
                    }
                }
            }
        }
        changed
    }

    /// Number of vertex ids `merge(other)` would add to this summary.
    ///
    /// A missing key costs the length of the incoming list, or `cap` when the
    /// incoming entry is ignored. A key ignored here costs nothing. An
    /// incoming ignored entry against a bounded list costs the room left below
    /// `cap`. Two bounded lists cost the incoming ids not already present.
    pub fn expansion_cost(&self, other: &PathNeighbors, cap: usize) -> usize {
        other
            .entries
            .iter()
            .map(|(key, incoming)| match (self.entries.get(key), incoming) {
                (None, PnEntry::Ignored) => cap,
                (None, PnEntry::Bounded(ids)) => ids.len(),
                (Some(PnEntry::Ignored), _) => 0,
                (Some(PnEntry::Bounded(base)), PnEntry::Ignored) => cap.saturating_sub(base.len()),
                (Some(PnEntry::Bounded(base)), PnEntry::Bounded(ids)) => {
                    sorted_difference_count(ids, base)
                }
            })
            .fold(0usize, usize::saturating_add)
    }

    /// Number of keys currently ignored.
    pub fn ignored_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_ignored()).count()
    }
}

impl FromIterator<(PnKey, PnEntry)> for PathNeighbors {
    fn from_iter<T: IntoIterator<Item = (PnKey, PnEntry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Sorted union of two sorted, duplicate-free slices.
pub fn sorted_union(a: &[VertexId], b: &[VertexId]) -> Vec<VertexId> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Count of ids in `a` that are absent from `b`; both sorted and duplicate-free.
pub fn sorted_difference_count(a: &[VertexId], b: &[VertexId]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                count += 1;
                i += 1;
            }
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    count + (a.len() - i)
}
