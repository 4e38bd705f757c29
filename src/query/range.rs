//! Range queries.

use super::pattern::QueryPattern;
use super::shrink::{ShrinkOutcome, ShrinkPlan};
use super::{Bindings, PatternMatcher, QueryStats, VertexBinding, verify_candidate};
use crate::error::{IndexError, Result};
use crate::monitor::TreeMonitor;
use crate::store::{NodeId, TreeStore};
use crate::tree::ReachTree;
use reachtree_types::ObjectId;
use reachtree_types::envelope::Envelope;

/// Verified range query answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeResult {
    /// Anchor objects with at least one confirmed match
    pub objects: Vec<ObjectId>,
    pub stats: QueryStats,
}

impl<S: TreeStore, M: TreeMonitor> ReachTree<S, M> {
    /// Ids of all objects whose geometry intersects `rect`.
    ///
    /// A zero-area `rect` is widened by `degenerate_epsilon` first.
    pub fn range_query(&self, rect: &Envelope) -> Result<Vec<ObjectId>> {
        let window = self.query_window(rect)?;
        let mut stats = QueryStats::default();
        Ok(self
            .range_candidates(&window, &mut stats)?
            .into_iter()
            .flat_map(|(_, objects)| objects)
            .collect())
    }

    /// Range query driven by the smallest rectangle of `pattern`, with every
    /// candidate verified by `matcher`.
    ///
    /// The other rectangles of the pattern reach the engine as
    /// [`VertexBinding::Within`] constraints; nearby query vertices are
    /// narrowed through the candidate leaf's summary.
    pub fn pattern_range_query<P: PatternMatcher>(
        &self,
        pattern: &QueryPattern,
        matcher: &P,
    ) -> Result<RangeResult> {
        let (anchor, rect) = pattern.anchor().ok_or_else(|| {
            IndexError::InvalidQuery("pattern has no spatial predicate".to_string())
        })?;
        let window = self.query_window(&rect)?;
        let plan = ShrinkPlan::new(pattern.graph(), anchor, &self.config);

        let mut base = Bindings::new();
        for (vertex, range) in pattern.ranges() {
            if vertex != anchor {
                base.bind(vertex, VertexBinding::Within(*range));
            }
        }

        let mut result = RangeResult::default();
        let candidates = self.range_candidates(&window, &mut result.stats)?;
        for (leaf, objects) in candidates {
            if objects.is_empty() {
                continue;
            }
            result.stats.candidates += objects.len() as u64;
            let mut leaf_bindings = base.clone();
            match plan.apply(self.summary_of(leaf)?, &mut leaf_bindings) {
                ShrinkOutcome::Pruned { vertex } => {
                    log::trace!("leaf {leaf} pruned on query vertex {vertex}");
                    result.stats.pruned_by_summary += objects.len() as u64;
                    continue;
                }
                ShrinkOutcome::Applied { shrunk } => {
                    result.stats.shrunk_bindings += shrunk as u64;
                }
            }
            for object in objects {
                let mut bindings = leaf_bindings.clone();
                bindings.bind(anchor, VertexBinding::Exact(object));
                if verify_candidate(matcher, pattern.graph(), &bindings, &mut result.stats)? {
                    result.objects.push(object);
                }
            }
        }
        Ok(result)
    }

    /// Leaves reached by a level-by-level descent, each with its objects
    /// intersecting `window`.
    fn range_candidates(
        &self,
        window: &Envelope,
        stats: &mut QueryStats,
    ) -> Result<Vec<(NodeId, Vec<ObjectId>)>> {
        let root = self.store.root();
        match self.store.node(root)?.envelope {
            Some(env) if env.intersects(window) => {}
            _ => return Ok(Vec::new()),
        }

        let mut level = vec![root];
        while let Some(&first) = level.first() {
            if self.is_leaf(first)? {
                break;
            }
            let mut next = Vec::new();
            for id in level {
                stats.visited_nodes += 1;
                for &child in self.store.node(id)?.children() {
                    if self.envelope_of(child)?.intersects(window) {
                        next.push(child);
                    }
                }
            }
            level = next;
        }

        let mut candidates = Vec::with_capacity(level.len());
        for leaf in level {
            stats.visited_nodes += 1;
            let mut hits = Vec::new();
            for &object in self.store.node(leaf)?.objects() {
                if self.store.object(object)?.envelope().intersects(window) {
                    hits.push(object);
                }
            }
            candidates.push((leaf, hits));
        }
        Ok(candidates)
    }
}
