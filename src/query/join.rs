//! Distance joins by synchronized descent of two trees.

use super::pattern::QueryPattern;
use super::shrink::{ShrinkOutcome, ShrinkPlan};
use super::{Bindings, PatternMatcher, QueryStats, VertexBinding, verify_candidate};
use crate::error::{IndexError, Result};
use crate::monitor::TreeMonitor;
use crate::store::{NodeId, TreeStore};
use crate::tree::ReachTree;
use reachtree_types::envelope::Envelope;
use reachtree_types::{Label, ObjectId};
use std::collections::VecDeque;

/// Verified join answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinResult {
    pub pairs: Vec<(ObjectId, ObjectId)>,
    pub stats: QueryStats,
}

/// A joined pair together with the leaves holding each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JoinedPair {
    left: ObjectId,
    left_leaf: NodeId,
    right: ObjectId,
    right_leaf: NodeId,
}

fn label_matches<S: TreeStore, M: TreeMonitor>(
    tree: &ReachTree<S, M>,
    object: ObjectId,
    label: Option<Label>,
) -> Result<bool> {
    Ok(match label {
        None => true,
        Some(label) => tree.store.object(object)?.has_label(label),
    })
}

impl<S: TreeStore, M: TreeMonitor> ReachTree<S, M> {
    /// Ordered pairs of distinct objects of this tree within `distance` of
    /// each other, optionally restricted to a label on each side.
    pub fn distance_join(
        &self,
        distance: f64,
        labels: (Option<Label>, Option<Label>),
    ) -> Result<Vec<(ObjectId, ObjectId)>> {
        self.distance_join_with(self, distance, labels)
    }

    /// Pairs `(a, b)` with `a` from this tree and `b` from `other`, `a != b`
    /// and geometries at most `distance` apart. Sorted ascending.
    pub fn distance_join_with<T: TreeStore, N: TreeMonitor>(
        &self,
        other: &ReachTree<T, N>,
        distance: f64,
        labels: (Option<Label>, Option<Label>),
    ) -> Result<Vec<(ObjectId, ObjectId)>> {
        let mut stats = QueryStats::default();
        let mut pairs: Vec<_> = self
            .joined_pairs(other, distance, labels, &mut stats)?
            .into_iter()
            .map(|p| (p.left, p.right))
            .collect();
        pairs.sort_unstable();
        Ok(pairs)
    }

    /// Distance join between objects labeled `labels.0` and `labels.1`, each
    /// pair verified as the images of query vertices `vertices.0` and
    /// `vertices.1` of `pattern`.
    pub fn join_query<P: PatternMatcher>(
        &self,
        distance: f64,
        labels: (Label, Label),
        pattern: &QueryPattern,
        vertices: (usize, usize),
        matcher: &P,
    ) -> Result<JoinResult> {
        let graph = pattern.graph();
        graph.check_vertex(vertices.0)?;
        graph.check_vertex(vertices.1)?;
        let left_plan = ShrinkPlan::new(graph, vertices.0, &self.config);
        let right_plan = ShrinkPlan::new(graph, vertices.1, &self.config);
        let mut base = Bindings::new();
        for (vertex, range) in pattern.ranges() {
            base.bind(vertex, VertexBinding::Within(*range));
        }

        let mut result = JoinResult::default();
        let mut joined =
            self.joined_pairs(self, distance, (Some(labels.0), Some(labels.1)), &mut result.stats)?;
        joined.sort_unstable_by_key(|p| (p.left, p.right));

        for pair in joined {
            let mut bindings = base.clone();
            let outcomes = [
                left_plan.apply(self.summary_of(pair.left_leaf)?, &mut bindings),
                right_plan.apply(self.summary_of(pair.right_leaf)?, &mut bindings),
            ];
            if outcomes
                .iter()
                .any(|o| matches!(o, ShrinkOutcome::Pruned { .. }))
            {
                result.stats.pruned_by_summary += 1;
                continue;
            }
            for outcome in outcomes {
                if let ShrinkOutcome::Applied { shrunk } = outcome {
                    result.stats.shrunk_bindings += shrunk as u64;
                }
            }
            bindings.bind(vertices.0, VertexBinding::Exact(pair.left));
            bindings.bind(vertices.1, VertexBinding::Exact(pair.right));
            if verify_candidate(matcher, graph, &bindings, &mut result.stats)? {
                result.pairs.push((pair.left, pair.right));
            }
        }
        Ok(result)
    }

    fn joined_pairs<T: TreeStore, N: TreeMonitor>(
        &self,
        other: &ReachTree<T, N>,
        distance: f64,
        labels: (Option<Label>, Option<Label>),
        stats: &mut QueryStats,
    ) -> Result<Vec<JoinedPair>> {
        if !distance.is_finite() || distance < 0.0 {
            return Err(IndexError::InvalidQuery(format!(
                "join distance must be finite and non-negative, got {distance}"
            )));
        }
        let (left_root, right_root) = (self.store.root(), other.store.root());
        let (Some(left_env), Some(right_env)) = (
            self.store.node(left_root)?.envelope,
            other.store.node(right_root)?.envelope,
        ) else {
            return Ok(Vec::new());
        };

        let mut pairs = Vec::new();
        let mut queue = VecDeque::new();
        if left_env.distance(&right_env) <= distance {
            queue.push_back((left_root, right_root));
        }

        while let Some((l, r)) = queue.pop_front() {
            stats.visited_nodes += 1;
            let left = self.store.node(l)?;
            let right = other.store.node(r)?;
            match (left.is_leaf(), right.is_leaf()) {
                (true, true) => {
                    for &a in left.objects() {
                        if !label_matches(self, a, labels.0)? {
                            continue;
                        }
                        let a_geom = self.store.object(a)?.geometry;
                        for &b in right.objects() {
                            if a == b || !label_matches(other, b, labels.1)? {
                                continue;
                            }
                            if a_geom.distance(&other.store.object(b)?.geometry) <= distance {
                                stats.candidates += 1;
                                pairs.push(JoinedPair {
                                    left: a,
                                    left_leaf: l,
                                    right: b,
                                    right_leaf: r,
                                });
                            }
                        }
                    }
                }
                (true, false) => {
                    let left_env = self.envelope_of(l)?;
                    for &child in right.children() {
                        if within(&left_env, &other.envelope_of(child)?, distance) {
                            queue.push_back((l, child));
                        }
                    }
                }
                (false, true) => {
                    let right_env = other.envelope_of(r)?;
                    for &child in left.children() {
                        if within(&self.envelope_of(child)?, &right_env, distance) {
                            queue.push_back((child, r));
                        }
                    }
                }
                (false, false) => {
                    for &lc in left.children() {
                        let lc_env = self.envelope_of(lc)?;
                        for &rc in right.children() {
                            if within(&lc_env, &other.envelope_of(rc)?, distance) {
                                queue.push_back((lc, rc));
                            }
                        }
                    }
                }
            }
        }
        Ok(pairs)
    }
}

fn within(a: &Envelope, b: &Envelope, distance: f64) -> bool {
    a.distance(b) <= distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::object::SpatialObject;
    use crate::query::pattern::QueryGraph;
    use crate::query::testing::RecordingMatcher;
    use crate::summary::{PathNeighbors, PnKey};
    use reachtree_types::geometry::Geometry;

    /// 60 points on a 1-spaced line; even ids labeled 1, odd ids labeled 2.
    fn line(alpha: f64) -> ReachTree {
        let config = IndexConfig::default()
            .with_alpha(alpha)
            .with_max_node_references(10);
        let mut tree = ReachTree::new(config).unwrap();
        for i in 0..60u64 {
            let label = if i % 2 == 0 { 1 } else { 2 };
            let summary = PathNeighbors::new().with_neighbors(PnKey::single(3 - label), [i + 1]);
            tree.insert(
                SpatialObject::new(i, Geometry::point(i as f64, 0.0))
                    .with_label(label)
                    .with_path_neighbors(summary),
            )
            .unwrap();
        }
        tree
    }

    fn brute_force(distance: f64, labels: (Option<Label>, Option<Label>)) -> Vec<(ObjectId, ObjectId)> {
        let label_of = |i: u64| if i % 2 == 0 { 1 } else { 2 };
        let mut pairs = Vec::new();
        for a in 0..60u64 {
            for b in 0..60u64 {
                if a != b
                    && (a as f64 - b as f64).abs() <= distance
                    && labels.0.is_none_or(|l| l == label_of(a))
                    && labels.1.is_none_or(|l| l == label_of(b))
                {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }

    #[test]
    fn test_self_join_matches_brute_force() {
        let tree = line(1.0);
        for distance in [0.0, 1.0, 2.5] {
            for labels in [(None, None), (Some(1), Some(2)), (Some(2), None)] {
                assert_eq!(
                    tree.distance_join(distance, labels).unwrap(),
                    brute_force(distance, labels),
                    "distance {distance} labels {labels:?}"
                );
            }
        }
    }

    #[test]
    fn test_join_between_trees() {
        let left = line(1.0);
        let mut right = ReachTree::new(IndexConfig::default()).unwrap();
        right
            .insert(SpatialObject::new(1_000, Geometry::point(10.0, 0.5)))
            .unwrap();
        let pairs = left.distance_join_with(&right, 1.0, (None, None)).unwrap();
        assert_eq!(pairs, vec![(10, 1_000)]);
    }

    #[test]
    fn test_negative_distance_rejected() {
        let tree = line(1.0);
        assert!(matches!(
            tree.distance_join(-1.0, (None, None)),
            Err(IndexError::InvalidQuery(_))
        ));
        assert!(matches!(
            tree.distance_join(f64::NAN, (None, None)),
            Err(IndexError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_join_query_verifies_each_pair() {
        let tree = line(0.5);
        let mut graph = QueryGraph::new();
        let a = graph.add_vertex(1);
        let b = graph.add_vertex(2);
        graph.add_edge(a, b).unwrap();
        let pattern = QueryPattern::new(graph);
        let matcher = RecordingMatcher::default();

        let result = tree.join_query(1.0, (1, 2), &pattern, (a, b), &matcher).unwrap();
        assert_eq!(result.pairs, brute_force(1.0, (Some(1), Some(2))));
        assert_eq!(result.stats.verified as usize, result.pairs.len());
        for bindings in matcher.calls.borrow().iter() {
            assert_eq!(bindings.get(a).len(), 2);
            assert_eq!(bindings.get(b).len(), 2);
        }
    }
}
