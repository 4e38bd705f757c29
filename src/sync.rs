//! Thread-safe wrapper for concurrent index access.
//!
//! `SyncReachTree` keeps a [`ReachTree`] behind `Arc<RwLock<_>>`: queries
//! share the read lock, mutations take the write lock. Each call holds the
//! lock for its whole duration and releases it on return, error included.
//!
//! Enable the `sync` feature to use this module:
//!
//! ```toml
//! [dependencies]
//! reachtree = { version = "0.1", features = ["sync"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use reachtree::prelude::*;
//! use reachtree::SyncReachTree;
//! use std::thread;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let index = SyncReachTree::new(IndexConfig::default())?;
//!
//! let writer = index.clone();
//! let handle = thread::spawn(move || {
//!     writer
//!         .insert(SpatialObject::new(1, Geometry::point(1.0, 1.0)))
//!         .unwrap();
//! });
//! index.insert(SpatialObject::new(2, Geometry::point(2.0, 2.0)))?;
//! handle.join().unwrap();
//!
//! assert_eq!(index.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::config::IndexConfig;
use crate::error::Result;
use crate::monitor::{NullMonitor, TreeMonitor};
use crate::object::SpatialObject;
use crate::query::{JoinResult, KnnResult, PatternMatcher, QueryPattern, RangeResult};
use crate::store::{MemoryStore, TreeStore};
use crate::tree::{BulkLoadReport, IndexStats, ReachTree};
use geo::Point;
use parking_lot::RwLock;
use reachtree_types::envelope::Envelope;
use reachtree_types::{Label, ObjectId};
use std::sync::Arc;

/// Thread-safe handle to a shared [`ReachTree`]. Cloning shares the index.
pub struct SyncReachTree<S: TreeStore = MemoryStore, M: TreeMonitor = NullMonitor> {
    inner: Arc<RwLock<ReachTree<S, M>>>,
}

impl<S: TreeStore, M: TreeMonitor> Clone for SyncReachTree<S, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SyncReachTree<MemoryStore, NullMonitor> {
    /// Creates an empty in-memory index.
    pub fn new(config: IndexConfig) -> Result<Self> {
        Ok(Self::from_tree(ReachTree::new(config)?))
    }
}

impl<S: TreeStore, M: TreeMonitor> SyncReachTree<S, M> {
    pub fn from_tree(tree: ReachTree<S, M>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    /// Run `f` under the read lock.
    pub fn read<T>(&self, f: impl FnOnce(&ReachTree<S, M>) -> T) -> T {
        f(&self.inner.read())
    }

    /// Run `f` under the write lock.
    pub fn write<T>(&self, f: impl FnOnce(&mut ReachTree<S, M>) -> T) -> T {
        f(&mut self.inner.write())
    }

    // ===== Mutations =====

    pub fn insert(&self, object: SpatialObject) -> Result<()> {
        self.inner.write().insert(object)
    }

    pub fn bulk_load(&self, objects: Vec<SpatialObject>) -> Result<BulkLoadReport> {
        self.inner.write().bulk_load(objects)
    }

    pub fn bulk_insert(
        &self,
        objects: Vec<SpatialObject>,
        loading_factor: f64,
    ) -> Result<BulkLoadReport> {
        self.inner.write().bulk_insert(objects, loading_factor)
    }

    pub fn remove(&self, id: ObjectId) -> Result<SpatialObject> {
        self.inner.write().remove(id)
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.write().clear()
    }

    // ===== Queries =====

    pub fn range_query(&self, rect: &Envelope) -> Result<Vec<ObjectId>> {
        self.inner.read().range_query(rect)
    }

    pub fn pattern_range_query<P: PatternMatcher>(
        &self,
        pattern: &QueryPattern,
        matcher: &P,
    ) -> Result<RangeResult> {
        self.inner.read().pattern_range_query(pattern, matcher)
    }

    pub fn nearest_neighbors(&self, point: &Point<f64>, k: usize) -> Result<Vec<(ObjectId, f64)>> {
        self.inner.read().nearest_neighbors(point, k)
    }

    pub fn knn_query<P: PatternMatcher>(
        &self,
        point: &Point<f64>,
        k: usize,
        pattern: &QueryPattern,
        anchor: usize,
        matcher: &P,
    ) -> Result<KnnResult> {
        self.inner
            .read()
            .knn_query(point, k, pattern, anchor, matcher)
    }

    pub fn distance_join(
        &self,
        distance: f64,
        labels: (Option<Label>, Option<Label>),
    ) -> Result<Vec<(ObjectId, ObjectId)>> {
        self.inner.read().distance_join(distance, labels)
    }

    pub fn join_query<P: PatternMatcher>(
        &self,
        distance: f64,
        labels: (Label, Label),
        pattern: &QueryPattern,
        vertices: (usize, usize),
        matcher: &P,
    ) -> Result<JoinResult> {
        self.inner
            .read()
            .join_query(distance, labels, pattern, vertices, matcher)
    }

    // ===== Bookkeeping =====

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.inner.read().contains(id)
    }

    pub fn is_poisoned(&self) -> bool {
        self.inner.read().is_poisoned()
    }

    pub fn stats(&self) -> Result<IndexStats> {
        self.inner.read().stats()
    }

    pub fn validate(&self) -> Result<()> {
        self.inner.read().validate()
    }
}
