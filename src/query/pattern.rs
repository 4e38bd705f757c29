//! Query graphs and their spatial predicates.

use crate::error::{IndexError, Result};
use crate::summary::PnKey;
use reachtree_types::Label;
use reachtree_types::envelope::Envelope;
use std::collections::{BTreeMap, VecDeque};

/// Small undirected labeled graph describing the pattern to match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryGraph {
    labels: Vec<Label>,
    adjacency: Vec<Vec<usize>>,
}

impl QueryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex and return its index.
    pub fn add_vertex(&mut self, label: Label) -> usize {
        self.labels.push(label);
        self.adjacency.push(Vec::new());
        self.labels.len() - 1
    }

    pub fn add_edge(&mut self, a: usize, b: usize) -> Result<()> {
        self.check_vertex(a)?;
        self.check_vertex(b)?;
        if a == b {
            return Err(IndexError::InvalidQuery(format!(
                "self loop on query vertex {a}"
            )));
        }
        if !self.adjacency[a].contains(&b) {
            self.adjacency[a].push(b);
            self.adjacency[b].push(a);
        }
        Ok(())
    }

    pub fn label(&self, vertex: usize) -> Option<Label> {
        self.labels.get(vertex).copied()
    }

    pub fn neighbors(&self, vertex: usize) -> &[usize] {
        self.adjacency.get(vertex).map_or(&[], Vec::as_slice)
    }

    pub fn vertex_count(&self) -> usize {
        self.labels.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    pub(crate) fn check_vertex(&self, vertex: usize) -> Result<()> {
        if vertex >= self.vertex_count() {
            return Err(IndexError::InvalidQuery(format!(
                "query vertex {vertex} does not exist ({} vertices)",
                self.vertex_count()
            )));
        }
        Ok(())
    }

    /// Breadth-first predecessors and hop distances from `from`.
    fn bfs(&self, from: usize) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
        let mut hops = vec![None; self.vertex_count()];
        let mut previous = vec![None; self.vertex_count()];
        let mut queue = VecDeque::new();
        if from < hops.len() {
            hops[from] = Some(0);
            queue.push_back(from);
        }
        while let Some(v) = queue.pop_front() {
            let next_hop = hops[v].map(|h| h + 1);
            for &w in &self.adjacency[v] {
                if hops[w].is_none() {
                    hops[w] = next_hop;
                    previous[w] = Some(v);
                    queue.push_back(w);
                }
            }
        }
        (hops, previous)
    }

    /// Hop distance of every vertex from `from`; `None` when unreachable.
    pub fn hop_distances(&self, from: usize) -> Vec<Option<usize>> {
        self.bfs(from).0
    }

    /// Summary keys leading from `from` to every vertex between 1 and
    /// `max_hops` hops away.
    ///
    /// Each key lists the labels along one shortest path, starting with the
    /// first vertex after `from` and ending with the target's own label.
    pub fn label_paths(&self, from: usize, max_hops: usize) -> Vec<(usize, PnKey)> {
        let (hops, previous) = self.bfs(from);
        let mut paths = Vec::new();
        for (vertex, hop) in hops.iter().enumerate() {
            let Some(hop) = *hop else { continue };
            if hop == 0 || hop > max_hops {
                continue;
            }
            let mut labels = Vec::with_capacity(hop);
            let mut current = vertex;
            while current != from {
                labels.push(self.labels[current]);
                match previous[current] {
                    Some(p) => current = p,
                    None => break,
                }
            }
            labels.reverse();
            paths.push((vertex, PnKey::new(labels)));
        }
        paths
    }
}

/// A query graph plus rectangle predicates on some of its vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPattern {
    graph: QueryGraph,
    ranges: BTreeMap<usize, Envelope>,
}

impl QueryPattern {
    pub fn new(graph: QueryGraph) -> Self {
        Self {
            graph,
            ranges: BTreeMap::new(),
        }
    }

    /// Require `vertex` to lie inside `range`.
    pub fn with_range(mut self, vertex: usize, range: Envelope) -> Result<Self> {
        self.graph.check_vertex(vertex)?;
        if !range.is_finite() {
            return Err(IndexError::InvalidQuery(format!(
                "range on query vertex {vertex} is not finite"
            )));
        }
        self.ranges.insert(vertex, range);
        Ok(self)
    }

    pub fn graph(&self) -> &QueryGraph {
        &self.graph
    }

    pub fn range(&self, vertex: usize) -> Option<&Envelope> {
        self.ranges.get(&vertex)
    }

    pub fn ranges(&self) -> impl Iterator<Item = (usize, &Envelope)> {
        self.ranges.iter().map(|(v, r)| (*v, r))
    }

    /// The vertex whose rectangle is smallest; it drives the index descent.
    /// Ties go to the lowest vertex index.
    pub fn anchor(&self) -> Option<(usize, Envelope)> {
        let mut best: Option<(usize, Envelope)> = None;
        for (&vertex, range) in &self.ranges {
            if best.is_none_or(|(_, b)| range.area() < b.area()) {
                best = Some((vertex, *range));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0(label 1) - 1(label 2) - 2(label 3) - 3(label 4), plus 0 - 4(label 5)
    fn chain() -> QueryGraph {
        let mut g = QueryGraph::new();
        for label in 1..=5 {
            g.add_vertex(label);
        }
        g.add_edge(0, 1).unwrap();
        g.add_edge(1, 2).unwrap();
        g.add_edge(2, 3).unwrap();
        g.add_edge(0, 4).unwrap();
        g
    }

    #[test]
    fn test_edges_validated() {
        let mut g = chain();
        assert!(g.add_edge(0, 9).is_err());
        assert!(g.add_edge(2, 2).is_err());
        g.add_edge(1, 0).unwrap();
        assert_eq!(g.edge_count(), 4);
    }

    #[test]
    fn test_hop_distances() {
        let g = chain();
        assert_eq!(
            g.hop_distances(0),
            vec![Some(0), Some(1), Some(2), Some(3), Some(1)]
        );
    }

    #[test]
    fn test_label_paths_within_radius() {
        let g = chain();
        let paths = g.label_paths(0, 2);
        assert_eq!(
            paths,
            vec![
                (1, PnKey::new([2])),
                (2, PnKey::new([2, 3])),
                (4, PnKey::new([5])),
            ]
        );
        assert_eq!(g.label_paths(3, 1), vec![(2, PnKey::new([3]))]);
    }

    #[test]
    fn test_anchor_is_smallest_range() {
        let pattern = QueryPattern::new(chain())
            .with_range(0, Envelope::new(0.0, 0.0, 10.0, 10.0))
            .unwrap()
            .with_range(3, Envelope::new(0.0, 0.0, 1.0, 1.0))
            .unwrap();
        assert_eq!(pattern.anchor().map(|(v, _)| v), Some(3));
        assert!(
            QueryPattern::new(chain())
                .with_range(7, Envelope::new(0.0, 0.0, 1.0, 1.0))
                .is_err()
        );
    }
}
