//! The graph-aware R-tree.
//!
//! [`ReachTree`] keeps a height-balanced tree of envelopes whose leaves also
//! carry path-neighbor summaries. Maintenance lives in the submodules:
//! single insertion in `insert`, node splitting in `split`, bulk loading in
//! `bulk` and removal in `remove`. Queries are implemented in
//! [`crate::query`].

mod bulk;
mod insert;
mod remove;
mod split;

pub use bulk::BulkLoadReport;

use crate::config::IndexConfig;
use crate::cost::CostModel;
use crate::error::{IndexError, Result};
use crate::monitor::{NullMonitor, TreeMonitor};
use crate::object::SpatialObject;
use crate::store::{MemoryStore, NodeId, NodeKind, StoreStats, TreeNode, TreeStore};
use crate::summary::{PathNeighbors, PnEntry};
use reachtree_types::ObjectId;
use reachtree_types::envelope::Envelope;

/// Graph-reachability-aware R-tree.
///
/// # Examples
///
/// ```rust
/// use reachtree::prelude::*;
///
/// let mut tree = ReachTree::new(IndexConfig::default().with_alpha(0.5))?;
/// let summary = PathNeighbors::new().with_neighbors(PnKey::single(1), [10, 11]);
/// tree.insert(SpatialObject::new(1, Geometry::point(0.5, 0.5)).with_path_neighbors(summary))?;
/// tree.insert(SpatialObject::new(2, Geometry::point(3.0, 1.0)))?;
///
/// let hits = tree.range_query(&Envelope::new(0.0, 0.0, 1.0, 1.0))?;
/// assert_eq!(hits, vec![1]);
/// # Ok::<(), reachtree::IndexError>(())
/// ```
#[derive(Debug)]
pub struct ReachTree<S: TreeStore = MemoryStore, M: TreeMonitor = NullMonitor> {
    pub(crate) store: S,
    pub(crate) config: IndexConfig,
    pub(crate) cost: CostModel,
    pub(crate) monitor: M,
    poisoned: bool,
}

/// Shape statistics of a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub object_count: usize,
    pub height: usize,
    pub node_count: usize,
    pub leaf_count: usize,
    /// Bounded summary entries across all leaves
    pub bounded_entries: usize,
    /// Ignored summary entries across all leaves
    pub ignored_entries: usize,
    /// Longest bounded summary list
    pub longest_entry: usize,
}

impl ReachTree<MemoryStore, NullMonitor> {
    /// Create an empty in-memory index.
    pub fn new(config: IndexConfig) -> Result<Self> {
        Self::with_parts(MemoryStore::new(), config, NullMonitor)
    }
}

impl<S: TreeStore, M: TreeMonitor> ReachTree<S, M> {
    /// Create an index over an existing store with a custom monitor.
    ///
    /// The store must be empty or hold a tree built with the same
    /// configuration.
    pub fn with_parts(store: S, config: IndexConfig, monitor: M) -> Result<Self> {
        config.validate()?;
        let cost = CostModel::from_config(&config);
        Ok(Self {
            store,
            config,
            cost,
            monitor,
            poisoned: false,
        })
    }

    /// Replace the monitor, keeping the tree.
    pub fn with_monitor<N: TreeMonitor>(self, monitor: N) -> ReachTree<S, N> {
        ReachTree {
            store: self.store,
            config: self.config,
            cost: self.cost,
            monitor,
            poisoned: self.poisoned,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut M {
        &mut self.monitor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn root(&self) -> NodeId {
        self.store.root()
    }

    pub fn len(&self) -> usize {
        self.store.object_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.store.contains_object(id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&SpatialObject> {
        self.store.object(id).ok()
    }

    /// True after a structural failure; mutations are refused from then on.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Envelope of everything indexed, `None` when empty.
    pub fn bounding_box(&self) -> Result<Option<Envelope>> {
        Ok(self.store.node(self.store.root())?.envelope)
    }

    /// Number of levels from the root down to the leaves (1 for a lone leaf).
    pub fn height(&self) -> Result<usize> {
        self.height_of(self.store.root())
    }

    /// Summary of the leaf currently holding `id`.
    pub fn leaf_summary(&self, id: ObjectId) -> Result<&PathNeighbors> {
        let leaf = self.store.leaf_of(id).ok_or(IndexError::ObjectNotFound(id))?;
        self.summary_of(leaf)
    }

    /// Remove everything and reset the root to an empty leaf.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()?;
        self.poisoned = false;
        Ok(())
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let mut stats = IndexStats {
            object_count: self.len(),
            height: self.height()?,
            ..IndexStats::default()
        };
        let mut stack = vec![self.store.root()];
        while let Some(id) = stack.pop() {
            let node = self.store.node(id)?;
            stats.node_count += 1;
            match &node.kind {
                NodeKind::Index { children } => stack.extend_from_slice(children),
                NodeKind::Leaf { summary, .. } => {
                    stats.leaf_count += 1;
                    for (_, entry) in summary.iter() {
                        match entry {
                            PnEntry::Bounded(ids) => {
                                stats.bounded_entries += 1;
                                stats.longest_entry = stats.longest_entry.max(ids.len());
                            }
                            PnEntry::Ignored => stats.ignored_entries += 1,
                        }
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Check every structural invariant of the tree.
    ///
    /// Verifies that all leaves sit at the same depth, that non-root nodes
    /// hold between `min_node_references` and `max_node_references` entries,
    /// that envelopes are the tight union of their entries, that parent and
    /// leaf links agree with the node contents, and that every leaf summary
    /// equals the merge of its members' contributions within the cap.
    pub fn validate(&self) -> Result<()> {
        let root = self.store.root();
        if self.store.parent(root)?.is_some() {
            return Err(violation(format!("root {root} has a parent")));
        }
        let mut leaf_depth = None;
        let mut objects_seen = 0usize;
        let mut stack = vec![(root, 1usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.store.node(id)?;
            let count = node.entry_count();
            if count > self.config.max_node_references {
                return Err(violation(format!("node {id} holds {count} entries")));
            }
            if id != root && count < self.config.min_node_references() {
                return Err(violation(format!(
                    "non-root node {id} holds only {count} entries"
                )));
            }
            let expected = self.tight_envelope(node)?;
            if node.envelope != expected {
                return Err(violation(format!(
                    "node {id} envelope {:?} differs from its entries' union {:?}",
                    node.envelope, expected
                )));
            }
            match &node.kind {
                NodeKind::Index { children } => {
                    if children.is_empty() {
                        return Err(violation(format!("index node {id} has no children")));
                    }
                    for &child in children {
                        if self.store.parent(child)? != Some(id) {
                            return Err(violation(format!(
                                "child {child} does not report {id} as parent"
                            )));
                        }
                        stack.push((child, depth + 1));
                    }
                }
                NodeKind::Leaf { objects, summary } => {
                    match leaf_depth {
                        None => leaf_depth = Some(depth),
                        Some(d) if d != depth => {
                            return Err(violation(format!(
                                "leaf {id} at depth {depth}, expected {d}"
                            )));
                        }
                        Some(_) => {}
                    }
                    for &object in objects {
                        if self.store.leaf_of(object) != Some(id) {
                            return Err(violation(format!(
                                "object {object} does not report leaf {id}"
                            )));
                        }
                    }
                    objects_seen += objects.len();
                    self.validate_summary(id, objects, summary)?;
                }
            }
        }
        if objects_seen != self.len() {
            return Err(violation(format!(
                "{objects_seen} objects referenced, {} stored",
                self.len()
            )));
        }
        Ok(())
    }

    fn validate_summary(
        &self,
        id: NodeId,
        objects: &[ObjectId],
        summary: &PathNeighbors,
    ) -> Result<()> {
        let cap = self.config.pn_cap();
        for (key, entry) in summary.iter() {
            if let PnEntry::Bounded(ids) = entry {
                if ids.len() > cap {
                    return Err(violation(format!(
                        "leaf {id} entry {key} holds {} ids over the cap",
                        ids.len()
                    )));
                }
                if ids.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(violation(format!(
                        "leaf {id} entry {key} is not strictly sorted"
                    )));
                }
            }
        }
        let expected = self.summary_from_members(objects)?;
        if *summary != expected {
            return Err(violation(format!(
                "leaf {id} summary differs from the union of its members"
            )));
        }
        Ok(())
    }

    /// Run a mutation, poisoning the index if it fails structurally.
    pub(crate) fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.poisoned {
            return Err(IndexError::Poisoned);
        }
        let result = op(self);
        if let Err(err) = &result
            && err.is_structural()
        {
            log::error!("structural failure, index poisoned: {err}");
            self.poisoned = true;
        }
        result
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.poisoned {
            return Err(IndexError::Poisoned);
        }
        Ok(())
    }

    pub(crate) fn check_geometry(&self, object: &SpatialObject) -> Result<()> {
        if !object.geometry.is_finite() {
            log::warn!("rejecting object {} with non-finite geometry", object.id);
            return Err(IndexError::InvalidGeometry(format!(
                "object {} has non-finite coordinates",
                object.id
            )));
        }
        Ok(())
    }

    pub(crate) fn envelope_of(&self, id: NodeId) -> Result<Envelope> {
        self.store
            .node(id)?
            .envelope
            .ok_or(IndexError::MissingEnvelope(id))
    }

    pub(crate) fn summary_of(&self, leaf: NodeId) -> Result<&PathNeighbors> {
        self.store
            .node(leaf)?
            .summary()
            .ok_or(IndexError::UnexpectedNodeKind {
                node: leaf,
                expected: "leaf",
            })
    }

    pub(crate) fn is_leaf(&self, id: NodeId) -> Result<bool> {
        Ok(self.store.node(id)?.is_leaf())
    }

    pub(crate) fn entry_count(&self, id: NodeId) -> Result<usize> {
        Ok(self.store.node(id)?.entry_count())
    }

    pub(crate) fn height_of(&self, id: NodeId) -> Result<usize> {
        let mut height = 1;
        let mut node = self.store.node(id)?;
        while let Some(&first) = node.children().first() {
            node = self.store.node(first)?;
            height += 1;
        }
        Ok(height)
    }

    /// Union of the envelopes of a node's entries, `None` if it has none.
    pub(crate) fn tight_envelope(&self, node: &TreeNode) -> Result<Option<Envelope>> {
        let mut union: Option<Envelope> = None;
        match &node.kind {
            NodeKind::Index { children } => {
                for &child in children {
                    let env = self.envelope_of(child)?;
                    union = Some(union.map_or(env, |u| u.union(&env)));
                }
            }
            NodeKind::Leaf { objects, .. } => {
                for &object in objects {
                    let env = self.store.object(object)?.envelope();
                    union = Some(union.map_or(env, |u| u.union(&env)));
                }
            }
        }
        Ok(union)
    }

    /// Recompute a node's envelope from its entries.
    ///
    /// # Returns
    ///
    /// Whether the stored envelope changed.
    pub(crate) fn refresh_envelope(&mut self, id: NodeId) -> Result<bool> {
        let tight = self.tight_envelope(self.store.node(id)?)?;
        let node = self.store.node_mut(id)?;
        if node.envelope == tight {
            return Ok(false);
        }
        node.envelope = tight;
        Ok(true)
    }

    /// Grow a node's envelope to cover `envelope`.
    pub(crate) fn expand_envelope(&mut self, id: NodeId, envelope: &Envelope) -> Result<bool> {
        let node = self.store.node_mut(id)?;
        Ok(match &mut node.envelope {
            Some(current) => current.expand_to_include(envelope),
            None => {
                node.envelope = Some(*envelope);
                true
            }
        })
    }

    /// Recompute ancestor envelopes upwards from `id`, stopping at the first
    /// ancestor that does not change.
    pub(crate) fn adjust_path(&mut self, id: NodeId) -> Result<()> {
        let mut current = id;
        while let Some(parent) = self.store.parent(current)? {
            if !self.refresh_envelope(parent)? {
                break;
            }
            current = parent;
        }
        Ok(())
    }

    /// Link `child` under `parent` and grow the parent's envelope.
    pub(crate) fn attach_child(&mut self, parent: NodeId, child: NodeId) -> Result<bool> {
        let envelope = self.envelope_of(child)?;
        self.store.add_child(parent, child)?;
        self.expand_envelope(parent, &envelope)
    }

    /// Merge of every member's summary contribution.
    pub(crate) fn summary_from_members(&self, objects: &[ObjectId]) -> Result<PathNeighbors> {
        let mut summary = PathNeighbors::new();
        if self.cost.is_spatial_only() {
            return Ok(summary);
        }
        let cap = self.config.pn_cap();
        for &object in objects {
            summary.merge(&self.store.object(object)?.path_neighbors, cap);
        }
        Ok(summary)
    }

    /// Every node at `depth` below `root` (the root is depth 0).
    pub(crate) fn nodes_at_depth(&self, root: NodeId, depth: usize) -> Result<Vec<NodeId>> {
        let mut level = vec![root];
        for _ in 0..depth {
            let mut next = Vec::new();
            for id in level {
                next.extend_from_slice(self.store.node(id)?.children());
            }
            level = next;
        }
        Ok(level)
    }
}

fn violation(message: String) -> IndexError {
    IndexError::InvariantViolation(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::CountingMonitor;
    use reachtree_types::geometry::Geometry;

    #[test]
    fn test_empty_tree() {
        let tree = ReachTree::new(IndexConfig::default()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.height().unwrap(), 1);
        assert_eq!(tree.bounding_box().unwrap(), None);
        tree.validate().unwrap();

        let stats = tree.stats().unwrap();
        assert_eq!(stats.node_count, 1);
        assert_eq!(stats.leaf_count, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = IndexConfig::default().with_max_node_references(4);
        assert!(matches!(
            ReachTree::new(config),
            Err(IndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_monitor_swap_keeps_contents() {
        let mut tree = ReachTree::new(IndexConfig::default()).unwrap();
        tree.insert(SpatialObject::new(1, Geometry::point(1.0, 2.0)))
            .unwrap();
        let tree = tree.with_monitor(CountingMonitor::new());
        assert!(tree.contains(1));
        assert_eq!(tree.monitor().splits(), 0);
    }

    #[test]
    fn test_clear_resets() {
        let mut tree = ReachTree::new(IndexConfig::default().with_max_node_references(10)).unwrap();
        for i in 0..50u64 {
            tree.insert(SpatialObject::new(i, Geometry::point(i as f64, 0.0)))
                .unwrap();
        }
        assert!(tree.height().unwrap() > 1);
        tree.clear().unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.height().unwrap(), 1);
        tree.validate().unwrap();
    }
}
