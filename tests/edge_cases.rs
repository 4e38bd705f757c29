mod common;

use common::{GraphMatcher, SpatialGraph, init_logging, path_query};
use reachtree::prelude::*;
use reachtree::store::{MemoryStore, NodeId, StoreStats, TreeNode, TreeStore};
use reachtree::{NullMonitor, ObjectId, Verification};
use std::sync::atomic::{AtomicBool, Ordering};

fn config() -> IndexConfig {
    IndexConfig::default()
        .with_alpha(0.5)
        .with_max_node_references(10)
}

/// Store that refuses to allocate nodes once armed.
#[derive(Debug, Default)]
struct FlakyStore {
    inner: MemoryStore,
    full: AtomicBool,
}

#[derive(Debug, thiserror::Error)]
#[error("node arena exhausted")]
struct ArenaExhausted;

impl TreeStore for FlakyStore {
    fn root(&self) -> NodeId {
        self.inner.root()
    }

    fn set_root(&mut self, root: NodeId) -> reachtree::Result<()> {
        self.inner.set_root(root)
    }

    fn create_node(&mut self, node: TreeNode) -> reachtree::Result<NodeId> {
        if self.full.load(Ordering::Relaxed) {
            return Err(IndexError::store(ArenaExhausted));
        }
        self.inner.create_node(node)
    }

    fn delete_node(&mut self, id: NodeId) -> reachtree::Result<TreeNode> {
        self.inner.delete_node(id)
    }

    fn node(&self, id: NodeId) -> reachtree::Result<&TreeNode> {
        self.inner.node(id)
    }

    fn node_mut(&mut self, id: NodeId) -> reachtree::Result<&mut TreeNode> {
        self.inner.node_mut(id)
    }

    fn parent(&self, id: NodeId) -> reachtree::Result<Option<NodeId>> {
        self.inner.parent(id)
    }

    fn add_child(&mut self, parent: NodeId, child: NodeId) -> reachtree::Result<()> {
        self.inner.add_child(parent, child)
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> reachtree::Result<()> {
        self.inner.remove_child(parent, child)
    }

    fn take_children(&mut self, parent: NodeId) -> reachtree::Result<Vec<NodeId>> {
        self.inner.take_children(parent)
    }

    fn add_reference(&mut self, leaf: NodeId, object: ObjectId) -> reachtree::Result<()> {
        self.inner.add_reference(leaf, object)
    }

    fn remove_reference(&mut self, leaf: NodeId, object: ObjectId) -> reachtree::Result<()> {
        self.inner.remove_reference(leaf, object)
    }

    fn take_references(&mut self, leaf: NodeId) -> reachtree::Result<Vec<ObjectId>> {
        self.inner.take_references(leaf)
    }

    fn leaf_of(&self, object: ObjectId) -> Option<NodeId> {
        self.inner.leaf_of(object)
    }

    fn put_object(&mut self, object: SpatialObject) -> reachtree::Result<()> {
        self.inner.put_object(object)
    }

    fn object(&self, id: ObjectId) -> reachtree::Result<&SpatialObject> {
        self.inner.object(id)
    }

    fn remove_object(&mut self, id: ObjectId) -> reachtree::Result<SpatialObject> {
        self.inner.remove_object(id)
    }

    fn contains_object(&self, id: ObjectId) -> bool {
        self.inner.contains_object(id)
    }

    fn object_count(&self) -> usize {
        self.inner.object_count()
    }

    fn stats(&self) -> StoreStats {
        self.inner.stats()
    }

    fn clear(&mut self) -> reachtree::Result<()> {
        self.full.store(false, Ordering::Relaxed);
        self.inner.clear()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("engine offline")]
struct EngineOffline;

struct OfflineMatcher;

impl PatternMatcher for OfflineMatcher {
    type Error = EngineOffline;

    fn verify(
        &self,
        _graph: &QueryGraph,
        _bindings: &Bindings,
        _limit: Option<usize>,
    ) -> std::result::Result<Verification, EngineOffline> {
        Err(EngineOffline)
    }
}

/// Test 1: zero-area query rectangles still find points they touch
#[test]
fn test_degenerate_query_rectangle() {
    let mut tree = ReachTree::new(config()).unwrap();
    for i in 0..30u64 {
        tree.insert(SpatialObject::new(i, Geometry::point(i as f64, i as f64)))
            .unwrap();
    }
    let hits = tree.range_query(&Envelope::from_point(12.0, 12.0)).unwrap();
    assert_eq!(hits, vec![12]);

    // a zero-width line
    let mut hits = tree.range_query(&Envelope::new(5.0, 0.0, 5.0, 100.0)).unwrap();
    hits.sort_unstable();
    assert_eq!(hits, vec![5]);
}

/// Test 2: every query on an empty index answers with nothing
#[test]
fn test_queries_on_empty_tree() {
    let tree = ReachTree::new(config()).unwrap();
    let window = Envelope::new(0.0, 0.0, 10.0, 10.0);
    assert!(tree.range_query(&window).unwrap().is_empty());
    assert!(tree.nearest_neighbors(&Point::new(0.0, 0.0), 5).unwrap().is_empty());
    assert!(tree.distance_join(100.0, (None, None)).unwrap().is_empty());

    let pattern = QueryPattern::new(path_query(&[1, 2]))
        .with_range(0, window)
        .unwrap();
    let result = tree.pattern_range_query(&pattern, &AlwaysMatch).unwrap();
    assert!(result.objects.is_empty());
    assert_eq!(result.stats.verified, 0);
    assert_eq!(tree.bounding_box().unwrap(), None);
    tree.validate().unwrap();
}

/// Test 3: duplicate ids are refused and leave the index untouched
#[test]
fn test_duplicate_insert_rejected() {
    let mut tree = ReachTree::new(config()).unwrap();
    tree.insert(SpatialObject::new(1, Geometry::point(1.0, 1.0)))
        .unwrap();
    let before = tree.bounding_box().unwrap();

    let err = tree
        .insert(SpatialObject::new(1, Geometry::point(90.0, 90.0)))
        .unwrap_err();
    assert!(matches!(err, IndexError::DuplicateObject(1)));
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.bounding_box().unwrap(), before);
    assert!(!tree.is_poisoned());
}

/// Test 4: non-finite geometry and query input are rejected
#[test]
fn test_non_finite_input_rejected() {
    init_logging();
    let mut tree = ReachTree::new(config()).unwrap();
    let err = tree
        .insert(SpatialObject::new(1, Geometry::point(f64::NAN, 0.0)))
        .unwrap_err();
    assert!(matches!(err, IndexError::InvalidGeometry(_)));
    let err = tree
        .insert(SpatialObject::new(2, Geometry::rect(0.0, 0.0, f64::INFINITY, 1.0)))
        .unwrap_err();
    assert!(matches!(err, IndexError::InvalidGeometry(_)));
    assert!(tree.is_empty());

    tree.insert(SpatialObject::new(3, Geometry::point(0.0, 0.0)))
        .unwrap();
    assert!(matches!(
        tree.range_query(&Envelope::new(0.0, 0.0, f64::NAN, 1.0)),
        Err(IndexError::InvalidQuery(_))
    ));
    assert!(matches!(
        tree.nearest_neighbors(&Point::new(f64::INFINITY, 0.0), 1),
        Err(IndexError::InvalidQuery(_))
    ));
    assert!(matches!(
        tree.distance_join(f64::NAN, (None, None)),
        Err(IndexError::InvalidQuery(_))
    ));
}

/// Test 5: a store failure mid-split poisons the index until cleared
#[test]
fn test_store_failure_poisons_index() {
    init_logging();
    let mut tree = ReachTree::with_parts(FlakyStore::default(), config(), NullMonitor).unwrap();
    for i in 0..10u64 {
        tree.insert(SpatialObject::new(i, Geometry::point(i as f64, 0.0)))
            .unwrap();
    }
    tree.store().full.store(true, Ordering::Relaxed);

    let err = tree
        .insert(SpatialObject::new(10, Geometry::point(10.0, 0.0)))
        .unwrap_err();
    assert!(matches!(err, IndexError::Store(_)));
    assert!(tree.is_poisoned());

    assert!(matches!(
        tree.insert(SpatialObject::new(11, Geometry::point(11.0, 0.0))),
        Err(IndexError::Poisoned)
    ));
    assert!(matches!(tree.remove(0), Err(IndexError::Poisoned)));
    assert!(matches!(
        tree.bulk_load(vec![SpatialObject::new(12, Geometry::point(1.0, 1.0))]),
        Err(IndexError::Poisoned)
    ));

    tree.clear().unwrap();
    assert!(!tree.is_poisoned());
    tree.insert(SpatialObject::new(0, Geometry::point(0.0, 0.0)))
        .unwrap();
    assert_eq!(tree.len(), 1);
}

/// Test 6: engine failures surface without poisoning the index
#[test]
fn test_engine_failure_is_reported() {
    let mut tree = ReachTree::new(config()).unwrap();
    tree.insert(SpatialObject::new(1, Geometry::point(0.0, 0.0)).with_label(1))
        .unwrap();
    let pattern = QueryPattern::new(path_query(&[1]))
        .with_range(0, Envelope::new(-1.0, -1.0, 1.0, 1.0))
        .unwrap();

    let err = tree.pattern_range_query(&pattern, &OfflineMatcher).unwrap_err();
    assert!(matches!(err, IndexError::Engine(_)));
    assert_eq!(err.to_string(), "pattern engine failure: engine offline");
    assert!(!tree.is_poisoned());
}

/// Test 7: many objects at one location split without losing anything
#[test]
fn test_coincident_points() {
    for alpha in [0.0, 0.5, 1.0] {
        let mut tree = ReachTree::new(config().with_alpha(alpha)).unwrap();
        for i in 0..60u64 {
            let contribution = PathNeighbors::new().with_neighbors(PnKey::single(1), [i % 7]);
            tree.insert(
                SpatialObject::new(i, Geometry::point(3.0, 3.0)).with_path_neighbors(contribution),
            )
            .unwrap();
        }
        tree.validate().unwrap();
        assert_eq!(tree.range_query(&Envelope::from_point(3.0, 3.0)).unwrap().len(), 60);

        let nearest = tree.nearest_neighbors(&Point::new(3.0, 3.0), 5).unwrap();
        assert_eq!(nearest.len(), 5);
        assert!(nearest.iter().all(|(_, d)| *d == 0.0));
    }
}

/// Test 8: removing unknown or already removed objects fails cleanly
#[test]
fn test_remove_missing_object() {
    let mut tree = ReachTree::new(config()).unwrap();
    assert!(matches!(tree.remove(9), Err(IndexError::ObjectNotFound(9))));

    tree.insert(SpatialObject::new(9, Geometry::point(0.0, 0.0)))
        .unwrap();
    tree.remove(9).unwrap();
    assert!(matches!(tree.remove(9), Err(IndexError::ObjectNotFound(9))));
    assert!(!tree.is_poisoned());
}

/// Test 9: invalid configurations never produce an index
#[test]
fn test_invalid_configuration() {
    for config in [
        IndexConfig::default().with_alpha(1.5),
        IndexConfig::default().with_alpha(f64::NAN),
        IndexConfig::default().with_max_node_references(4),
        IndexConfig::default().with_loading_factor(0.0),
        IndexConfig::default().with_area_norm(0.0),
        IndexConfig::default().with_vertex_count_norm(0),
    ] {
        assert!(matches!(
            ReachTree::new(config),
            Err(IndexError::InvalidConfig(_))
        ));
    }
    assert!(IndexConfig::from_json(r#"{ "fanout": 10 }"#).is_err());
}

/// Test 10: malformed patterns are rejected before any verification
#[test]
fn test_malformed_patterns() {
    let mut tree = ReachTree::new(config()).unwrap();
    tree.insert(SpatialObject::new(1, Geometry::point(0.0, 0.0)).with_label(1))
        .unwrap();
    let window = Envelope::new(-1.0, -1.0, 1.0, 1.0);

    let mut graph = path_query(&[1, 2]);
    assert!(matches!(graph.add_edge(0, 5), Err(IndexError::InvalidQuery(_))));
    assert!(matches!(graph.add_edge(1, 1), Err(IndexError::InvalidQuery(_))));
    assert!(matches!(
        QueryPattern::new(graph.clone()).with_range(3, window),
        Err(IndexError::InvalidQuery(_))
    ));

    let pattern = QueryPattern::new(graph);
    assert!(matches!(
        tree.pattern_range_query(&pattern, &AlwaysMatch),
        Err(IndexError::InvalidQuery(_))
    ));
    assert!(matches!(
        tree.knn_query(&Point::new(0.0, 0.0), 1, &pattern, 7, &AlwaysMatch),
        Err(IndexError::InvalidQuery(_))
    ));
    assert!(matches!(
        tree.join_query(1.0, (1, 2), &pattern, (0, 2), &AlwaysMatch),
        Err(IndexError::InvalidQuery(_))
    ));
}

/// Test 11: leaves missing a label path survive when pruning is off
#[test]
fn test_missing_paths_kept_when_pruning_disabled() {
    let graph = SpatialGraph::random(120, 3, 1, 4);
    let objects = graph.objects();
    let matcher = GraphMatcher { graph: &graph };
    let pattern = QueryPattern::new(path_query(&[1, 2]))
        .with_range(0, Envelope::new(0.0, 0.0, 100.0, 100.0))
        .unwrap();

    let mut answers = Vec::new();
    for prune in [true, false] {
        let mut tree = ReachTree::new(config().with_prune_missing_paths(prune)).unwrap();
        for object in &objects {
            tree.insert(object.clone()).unwrap();
        }
        let mut result = tree.pattern_range_query(&pattern, &matcher).unwrap();
        if !prune {
            assert_eq!(result.stats.pruned_by_summary, 0);
        }
        result.objects.sort_unstable();
        answers.push(result.objects);
    }
    assert_eq!(answers[0], answers[1]);
}

/// Test 12: asking for more neighbors than objects returns them all
#[test]
fn test_knn_larger_than_index() {
    let mut tree = ReachTree::new(config()).unwrap();
    for i in 0..4u64 {
        tree.insert(SpatialObject::new(i, Geometry::rect(i as f64, 0.0, i as f64 + 0.5, 1.0)))
            .unwrap();
    }
    let found = tree.nearest_neighbors(&Point::new(-1.0, 0.5), 10).unwrap();
    let ids: Vec<ObjectId> = found.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert!(tree.nearest_neighbors(&Point::new(0.0, 0.0), 0).unwrap().is_empty());
}

/// Test 13: spatial-only indexes skip summaries on every path
#[test]
fn test_spatial_only_ignores_summaries() {
    let graph = SpatialGraph::random(150, 3, 2, 90);
    let mut tree = ReachTree::new(config().with_alpha(1.0)).unwrap();
    tree.bulk_load(graph.objects()).unwrap();
    let stats = tree.stats().unwrap();
    assert_eq!(stats.bounded_entries + stats.ignored_entries, 0);

    let pattern = QueryPattern::new(path_query(&[1, 2, 3]))
        .with_range(0, Envelope::new(0.0, 0.0, 100.0, 100.0))
        .unwrap();
    let result = tree
        .pattern_range_query(&pattern, &GraphMatcher { graph: &graph })
        .unwrap();
    assert_eq!(result.stats.shrunk_bindings, 0);
    assert_eq!(result.stats.pruned_by_summary, 0);
    assert_eq!(result.stats.verified, 150);
}
