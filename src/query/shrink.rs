//! Neighbor-list shrink.
//!
//! For every query vertex within `max_hop_num` hops of the anchor, the leaf
//! holding a candidate says which graph vertices are reachable along the
//! matching label path. A bounded entry narrows that vertex to an explicit
//! id list, an ignored entry leaves it alone, and a missing or empty entry
//! rules the whole leaf out.

use super::pattern::QueryGraph;
use super::{Bindings, VertexBinding};
use crate::config::IndexConfig;
use crate::summary::{PathNeighbors, PnEntry, PnKey};

/// What a summary did to a set of bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkOutcome {
    /// No object of the leaf can reach a vertex matching `vertex`.
    Pruned { vertex: usize },
    /// `shrunk` vertices were narrowed to id lists.
    Applied { shrunk: usize },
}

/// Summary keys to consult for one anchor vertex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShrinkPlan {
    targets: Vec<(usize, PnKey)>,
    prune_missing: bool,
}

impl ShrinkPlan {
    /// Plan for `anchor`. Spatial-only indexes keep no summaries, so their
    /// plan is empty.
    pub fn new(graph: &QueryGraph, anchor: usize, config: &IndexConfig) -> Self {
        if config.is_spatial_only() {
            return Self::default();
        }
        Self {
            targets: graph.label_paths(anchor, config.max_hop_num),
            prune_missing: config.prune_missing_paths,
        }
    }

    pub fn targets(&self) -> &[(usize, PnKey)] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn apply(&self, summary: &PathNeighbors, bindings: &mut Bindings) -> ShrinkOutcome {
        let mut shrunk = 0;
        for (vertex, key) in &self.targets {
            match summary.get(key) {
                Some(PnEntry::Bounded(ids)) if ids.is_empty() => {
                    return ShrinkOutcome::Pruned { vertex: *vertex };
                }
                Some(PnEntry::Bounded(ids)) => {
                    bindings.bind(*vertex, VertexBinding::AnyOf(ids.clone()));
                    shrunk += 1;
                }
                Some(PnEntry::Ignored) => {}
                None if self.prune_missing => {
                    return ShrinkOutcome::Pruned { vertex: *vertex };
                }
                None => {}
            }
        }
        ShrinkOutcome::Applied { shrunk }
    }
}
