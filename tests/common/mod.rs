#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reachtree::prelude::*;
use reachtree::{CostStats, Label, ObjectId, Verification, VertexId};
use std::collections::BTreeSet;
use std::convert::Infallible;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Uniform random points in `[0, extent)^2`, ids `0..n`.
pub fn random_points(n: u64, extent: f64, seed: u64) -> Vec<SpatialObject> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|id| {
            let x = rng.gen_range(0.0..extent);
            let y = rng.gen_range(0.0..extent);
            SpatialObject::new(id, Geometry::point(x, y))
        })
        .collect()
}

pub fn point_of(object: &SpatialObject) -> (f64, f64) {
    let env = object.envelope();
    (env.min_x(), env.min_y())
}

/// A labeled graph whose vertices have coordinates.
pub struct SpatialGraph {
    pub labels: Vec<Label>,
    pub coords: Vec<(f64, f64)>,
    pub adjacency: Vec<BTreeSet<usize>>,
}

impl SpatialGraph {
    /// `n` vertices with labels `1..=label_count`, each joined to `degree`
    /// random others.
    pub fn random(n: usize, label_count: Label, degree: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let labels = (0..n).map(|_| rng.gen_range(1..=label_count)).collect();
        let coords = (0..n)
            .map(|_| (rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)))
            .collect();
        let mut adjacency = vec![BTreeSet::new(); n];
        for v in 0..n {
            for _ in 0..degree {
                let w = rng.gen_range(0..n);
                if w != v {
                    adjacency[v].insert(w);
                    adjacency[w].insert(v);
                }
            }
        }
        Self {
            labels,
            coords,
            adjacency,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// One- and two-hop path-neighbor contribution of vertex `v`.
    pub fn contribution(&self, v: usize) -> PathNeighbors {
        let mut entries: std::collections::BTreeMap<PnKey, BTreeSet<VertexId>> =
            std::collections::BTreeMap::new();
        for &w in &self.adjacency[v] {
            entries
                .entry(PnKey::single(self.labels[w]))
                .or_default()
                .insert(w as VertexId);
            for &x in &self.adjacency[w] {
                if x != v {
                    entries
                        .entry(PnKey::new([self.labels[w], self.labels[x]]))
                        .or_default()
                        .insert(x as VertexId);
                }
            }
        }
        entries
            .into_iter()
            .fold(PathNeighbors::new(), |acc, (key, ids)| {
                acc.with_neighbors(key, ids)
            })
    }

    pub fn objects(&self) -> Vec<SpatialObject> {
        (0..self.len())
            .map(|v| {
                let (x, y) = self.coords[v];
                SpatialObject::new(v as ObjectId, Geometry::point(x, y))
                    .with_label(self.labels[v])
                    .with_path_neighbors(self.contribution(v))
            })
            .collect()
    }

    fn satisfies(&self, vertex: usize, constraints: &[VertexBinding]) -> bool {
        constraints.iter().all(|c| match c {
            VertexBinding::Exact(id) => *id == vertex as VertexId,
            VertexBinding::AnyOf(ids) => ids.binary_search(&(vertex as VertexId)).is_ok(),
            VertexBinding::Within(rect) => {
                let (x, y) = self.coords[vertex];
                rect.contains(&Envelope::from_point(x, y))
            }
        })
    }
}

/// Backtracking subgraph matcher over a [`SpatialGraph`].
pub struct GraphMatcher<'a> {
    pub graph: &'a SpatialGraph,
}

impl GraphMatcher<'_> {
    fn extend(
        &self,
        query: &QueryGraph,
        bindings: &Bindings,
        assigned: &mut Vec<usize>,
        limit: u64,
        found: &mut u64,
    ) {
        if *found >= limit {
            return;
        }
        let q = assigned.len();
        if q == query.vertex_count() {
            *found += 1;
            return;
        }
        for v in 0..self.graph.len() {
            if Some(self.graph.labels[v]) != query.label(q)
                || assigned.contains(&v)
                || !self.graph.satisfies(v, bindings.get(q))
            {
                continue;
            }
            let connected = query
                .neighbors(q)
                .iter()
                .filter(|&&p| p < q)
                .all(|&p| self.graph.adjacency[v].contains(&assigned[p]));
            if !connected {
                continue;
            }
            assigned.push(v);
            self.extend(query, bindings, assigned, limit, found);
            assigned.pop();
        }
    }
}

impl PatternMatcher for GraphMatcher<'_> {
    type Error = Infallible;

    fn verify(
        &self,
        graph: &QueryGraph,
        bindings: &Bindings,
        limit: Option<usize>,
    ) -> std::result::Result<Verification, Infallible> {
        let mut found = 0;
        let limit = limit.map_or(u64::MAX, |l| l as u64);
        self.extend(graph, bindings, &mut Vec::new(), limit, &mut found);
        Ok(Verification {
            match_count: found,
            stats: CostStats {
                rows: found,
                page_hits: bindings.len() as u64,
            },
        })
    }
}

/// Path query: vertex 0 labeled `labels[0]`, joined to 1, joined to 2, ...
pub fn path_query(labels: &[Label]) -> QueryGraph {
    let mut graph = QueryGraph::new();
    for &label in labels {
        graph.add_vertex(label);
    }
    for i in 1..labels.len() {
        graph.add_edge(i - 1, i).unwrap();
    }
    graph
}
