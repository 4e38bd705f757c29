//! Queries over a [`ReachTree`](crate::ReachTree).
//!
//! Plain spatial queries (`range_query`, `nearest_neighbors`,
//! `distance_join`) answer from the tree alone. Their pattern-verified
//! counterparts hand every spatial candidate to a [`PatternMatcher`], after
//! narrowing the bindings of nearby query vertices with the candidate leaf's
//! path-neighbor summary (see [`ShrinkPlan`]).

mod join;
mod knn;
mod pattern;
mod range;
mod shrink;

pub use join::JoinResult;
pub use knn::KnnResult;
pub use pattern::{QueryGraph, QueryPattern};
pub use range::RangeResult;
pub use shrink::{ShrinkOutcome, ShrinkPlan};

use crate::error::{IndexError, Result};
use crate::monitor::TreeMonitor;
use crate::store::TreeStore;
use crate::tree::ReachTree;
use reachtree_types::VertexId;
use reachtree_types::envelope::Envelope;
use std::collections::BTreeMap;
use std::convert::Infallible;

/// Constraint placed on one query vertex for a verification call.
#[derive(Debug, Clone, PartialEq)]
pub enum VertexBinding {
    /// The vertex is this graph vertex.
    Exact(VertexId),
    /// The vertex is one of these graph vertices.
    AnyOf(Vec<VertexId>),
    /// The vertex lies inside this rectangle.
    Within(Envelope),
}

/// Constraints per query vertex. Several constraints on one vertex must all
/// hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    vertices: BTreeMap<usize, Vec<VertexBinding>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, vertex: usize, binding: VertexBinding) {
        self.vertices.entry(vertex).or_default().push(binding);
    }

    pub fn get(&self, vertex: usize) -> &[VertexBinding] {
        self.vertices.get(&vertex).map_or(&[], Vec::as_slice)
    }

    pub fn is_bound(&self, vertex: usize) -> bool {
        self.vertices.contains_key(&vertex)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[VertexBinding])> {
        self.vertices.iter().map(|(v, b)| (*v, b.as_slice()))
    }

    /// Number of constrained vertices
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Cost statistics reported by the engine; instrumentation only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CostStats {
    pub rows: u64,
    pub page_hits: u64,
}

/// Outcome of one verification call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verification {
    pub match_count: u64,
    pub stats: CostStats,
}

impl Verification {
    pub fn matched(&self) -> bool {
        self.match_count > 0
    }
}

/// The external graph-pattern engine.
///
/// `verify` counts the embeddings of `graph` that satisfy `bindings`,
/// stopping after `limit` matches when given. Engine failures are surfaced
/// as [`IndexError::Engine`] and never retried.
pub trait PatternMatcher {
    type Error: std::error::Error + Send + Sync + 'static;

    fn verify(
        &self,
        graph: &QueryGraph,
        bindings: &Bindings,
        limit: Option<usize>,
    ) -> std::result::Result<Verification, Self::Error>;
}

impl<P: PatternMatcher + ?Sized> PatternMatcher for &P {
    type Error = P::Error;

    fn verify(
        &self,
        graph: &QueryGraph,
        bindings: &Bindings,
        limit: Option<usize>,
    ) -> std::result::Result<Verification, Self::Error> {
        (**self).verify(graph, bindings, limit)
    }
}

/// Matcher that accepts every candidate. Turns the verified queries into
/// summary-pruned spatial queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysMatch;

impl PatternMatcher for AlwaysMatch {
    type Error = Infallible;

    fn verify(
        &self,
        _graph: &QueryGraph,
        _bindings: &Bindings,
        _limit: Option<usize>,
    ) -> std::result::Result<Verification, Infallible> {
        Ok(Verification {
            match_count: 1,
            stats: CostStats::default(),
        })
    }
}

/// Counters collected while answering a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Tree nodes whose entries were examined
    pub visited_nodes: u64,
    /// Objects that passed the spatial predicate
    pub candidates: u64,
    /// Candidates dropped because a leaf summary ruled them out
    pub pruned_by_summary: u64,
    /// Vertex bindings narrowed to an explicit id list
    pub shrunk_bindings: u64,
    /// Verification calls made
    pub verified: u64,
    /// Candidates the engine confirmed
    pub matches: u64,
    pub rows: u64,
    pub page_hits: u64,
}

impl QueryStats {
    fn record(&mut self, verification: &Verification) {
        self.verified += 1;
        self.rows += verification.stats.rows;
        self.page_hits += verification.stats.page_hits;
        if verification.matched() {
            self.matches += 1;
        }
    }
}

/// Run one verification call, folding its statistics into `stats`.
fn verify_candidate<P: PatternMatcher>(
    matcher: &P,
    graph: &QueryGraph,
    bindings: &Bindings,
    stats: &mut QueryStats,
) -> Result<bool> {
    let verification = matcher
        .verify(graph, bindings, Some(1))
        .map_err(IndexError::engine)?;
    stats.record(&verification);
    Ok(verification.matched())
}

impl<S: TreeStore, M: TreeMonitor> ReachTree<S, M> {
    /// Validate a query rectangle, widening zero-area ones by the configured
    /// epsilon so point-on-point tests still hit.
    pub(crate) fn query_window(&self, rect: &Envelope) -> Result<Envelope> {
        if !rect.is_finite() {
            return Err(IndexError::InvalidQuery(format!(
                "query rectangle {rect:?} is not finite"
            )));
        }
        if rect.is_degenerate() {
            log::debug!(
                "expanding degenerate query rectangle by {}",
                self.config.degenerate_epsilon
            );
            return Ok(rect.buffered(self.config.degenerate_epsilon));
        }
        Ok(*rect)
    }
}
