//! Best-first k-nearest-neighbor search.

use super::pattern::QueryPattern;
use super::shrink::{ShrinkOutcome, ShrinkPlan};
use super::{Bindings, PatternMatcher, QueryStats, VertexBinding, verify_candidate};
use crate::error::{IndexError, Result};
use crate::monitor::TreeMonitor;
use crate::store::{NodeId, TreeStore};
use crate::tree::ReachTree;
use geo::Point;
use reachtree_types::ObjectId;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Verified kNN answer, nearest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnnResult {
    pub neighbors: Vec<(ObjectId, f64)>,
    pub stats: QueryStats,
}

impl KnnResult {
    pub fn ids(&self) -> Vec<ObjectId> {
        self.neighbors.iter().map(|(id, _)| *id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Node(NodeId),
    Object { id: ObjectId, leaf: NodeId },
}

#[derive(Debug, PartialEq)]
struct Queued {
    distance: f64,
    seq: u64,
    item: Item,
}

impl Eq for Queued {}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on distance, then insertion order
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue over tree nodes and objects by lower-bound distance.
struct Frontier {
    heap: BinaryHeap<Queued>,
    seq: u64,
}

impl Frontier {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    fn push(&mut self, distance: f64, item: Item) {
        self.heap.push(Queued {
            distance,
            seq: self.seq,
            item,
        });
        self.seq += 1;
    }

    fn pop(&mut self) -> Option<(f64, Item)> {
        self.heap.pop().map(|q| (q.distance, q.item))
    }
}

impl<S: TreeStore, M: TreeMonitor> ReachTree<S, M> {
    /// The `k` objects closest to `point`, nearest first.
    pub fn nearest_neighbors(&self, point: &Point<f64>, k: usize) -> Result<Vec<(ObjectId, f64)>> {
        let mut stats = QueryStats::default();
        self.best_first(point, k, &mut stats, |_, _, _, _| Ok(true))
    }

    /// The `k` objects closest to `point` that the engine confirms as
    /// `anchor` of `pattern`.
    ///
    /// Candidates are popped in distance order; each is verified with the
    /// anchor bound to the candidate, the pattern's rectangles as `Within`
    /// constraints and nearby vertices narrowed by the candidate's leaf
    /// summary. The search stops after `k` confirmations.
    pub fn knn_query<P: PatternMatcher>(
        &self,
        point: &Point<f64>,
        k: usize,
        pattern: &QueryPattern,
        anchor: usize,
        matcher: &P,
    ) -> Result<KnnResult> {
        pattern.graph().check_vertex(anchor)?;
        let plan = ShrinkPlan::new(pattern.graph(), anchor, &self.config);
        let mut base = Bindings::new();
        for (vertex, range) in pattern.ranges() {
            base.bind(vertex, VertexBinding::Within(*range));
        }

        // per-leaf bindings, None once the summary ruled the leaf out
        let mut leaf_bindings: FxHashMap<NodeId, Option<Bindings>> = FxHashMap::default();
        let mut stats = QueryStats::default();
        let neighbors = self.best_first(point, k, &mut stats, |tree, leaf, object, stats| {
            if !leaf_bindings.contains_key(&leaf) {
                let mut bindings = base.clone();
                let shrunk = match plan.apply(tree.summary_of(leaf)?, &mut bindings) {
                    ShrinkOutcome::Pruned { .. } => None,
                    ShrinkOutcome::Applied { shrunk } => {
                        stats.shrunk_bindings += shrunk as u64;
                        Some(bindings)
                    }
                };
                leaf_bindings.insert(leaf, shrunk);
            }
            let Some(Some(bindings)) = leaf_bindings.get(&leaf) else {
                stats.pruned_by_summary += 1;
                return Ok(false);
            };
            let mut bindings = bindings.clone();
            bindings.bind(anchor, VertexBinding::Exact(object));
            verify_candidate(matcher, pattern.graph(), &bindings, stats)
        })?;
        Ok(KnnResult { neighbors, stats })
    }

    /// Pop nodes and objects in distance order, passing every object to
    /// `accept` until `k` are accepted.
    fn best_first<F>(
        &self,
        point: &Point<f64>,
        k: usize,
        stats: &mut QueryStats,
        mut accept: F,
    ) -> Result<Vec<(ObjectId, f64)>>
    where
        F: FnMut(&Self, NodeId, ObjectId, &mut QueryStats) -> Result<bool>,
    {
        if !point.x().is_finite() || !point.y().is_finite() {
            return Err(IndexError::InvalidQuery(format!(
                "query point {point:?} is not finite"
            )));
        }
        let mut found = Vec::with_capacity(k);
        if k == 0 {
            return Ok(found);
        }

        let root = self.store.root();
        let mut frontier = Frontier::new();
        if let Some(env) = self.store.node(root)?.envelope {
            frontier.push(env.distance_to_point(point), Item::Node(root));
        }

        while let Some((distance, item)) = frontier.pop() {
            match item {
                Item::Node(id) => {
                    stats.visited_nodes += 1;
                    let node = self.store.node(id)?;
                    for &child in node.children() {
                        frontier.push(self.envelope_of(child)?.distance_to_point(point), Item::Node(child));
                    }
                    for &object in node.objects() {
                        let d = self.store.object(object)?.geometry.distance_to_point(point);
                        frontier.push(d, Item::Object { id: object, leaf: id });
                    }
                }
                Item::Object { id, leaf } => {
                    stats.candidates += 1;
                    if accept(self, leaf, id, stats)? {
                        found.push((id, distance));
                        if found.len() == k {
                            break;
                        }
                    }
                }
            }
        }
        Ok(found)
    }
}
