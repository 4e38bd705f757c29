//! Store abstraction for tree nodes and indexed objects.
//!
//! The index never owns its nodes directly: it addresses them by [`NodeId`]
//! handles through a [`TreeStore`]. Parent lookups are answered by the store
//! from its own link table, so the tree keeps no back-pointers.

use crate::error::{IndexError, Result};
use crate::object::SpatialObject;
use crate::summary::PathNeighbors;
use reachtree_types::ObjectId;
use reachtree_types::envelope::Envelope;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a tree node inside a [`TreeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Relationship between a tree node and one of its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Index node -> child tree node.
    TreeChild,
    /// Leaf node -> indexed object.
    ObjectReference,
}

/// Node payload: index nodes hold children, leaves hold objects and the
/// path-neighbor summary of those objects.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Index {
        children: Vec<NodeId>,
    },
    Leaf {
        objects: Vec<ObjectId>,
        summary: PathNeighbors,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// `None` only for an empty node.
    pub envelope: Option<Envelope>,
    pub kind: NodeKind,
}

impl TreeNode {
    pub fn leaf() -> Self {
        Self {
            envelope: None,
            kind: NodeKind::Leaf {
                objects: Vec::new(),
                summary: PathNeighbors::new(),
            },
        }
    }

    pub fn index() -> Self {
        Self {
            envelope: None,
            kind: NodeKind::Index {
                children: Vec::new(),
            },
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Relation kind of this node's entries.
    pub fn relation_kind(&self) -> RelationKind {
        match self.kind {
            NodeKind::Index { .. } => RelationKind::TreeChild,
            NodeKind::Leaf { .. } => RelationKind::ObjectReference,
        }
    }

    /// Number of children (index) or objects (leaf).
    pub fn entry_count(&self) -> usize {
        match &self.kind {
            NodeKind::Index { children } => children.len(),
            NodeKind::Leaf { objects, .. } => objects.len(),
        }
    }

    /// Child handles; empty for a leaf.
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Index { children } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    /// Object references; empty for an index node.
    pub fn objects(&self) -> &[ObjectId] {
        match &self.kind {
            NodeKind::Index { .. } => &[],
            NodeKind::Leaf { objects, .. } => objects,
        }
    }

    pub fn summary(&self) -> Option<&PathNeighbors> {
        match &self.kind {
            NodeKind::Index { .. } => None,
            NodeKind::Leaf { summary, .. } => Some(summary),
        }
    }

    pub fn summary_mut(&mut self) -> Option<&mut PathNeighbors> {
        match &mut self.kind {
            NodeKind::Index { .. } => None,
            NodeKind::Leaf { summary, .. } => Some(summary),
        }
    }
}

/// Trait for tree store implementations
///
/// A store owns every node and every indexed object. Structural links are
/// changed only through the `add_*`/`remove_*`/`take_*` methods so that the
/// store can answer [`TreeStore::parent`] and [`TreeStore::leaf_of`]; node
/// envelopes and leaf summaries are edited in place through
/// [`TreeStore::node_mut`]. Failures of a custom store should be wrapped with
/// [`IndexError::store`].
pub trait TreeStore: Send + Sync {
    /// Current root handle
    fn root(&self) -> NodeId;

    /// Replace the root handle
    fn set_root(&mut self, root: NodeId) -> Result<()>;

    /// Allocate a node and return its handle
    fn create_node(&mut self, node: TreeNode) -> Result<NodeId>;

    /// Remove a node. Links to and from it are dropped; its entries are not
    /// deleted.
    fn delete_node(&mut self, id: NodeId) -> Result<TreeNode>;

    fn node(&self, id: NodeId) -> Result<&TreeNode>;

    fn node_mut(&mut self, id: NodeId) -> Result<&mut TreeNode>;

    /// Index node currently holding `id` as a child
    fn parent(&self, id: NodeId) -> Result<Option<NodeId>>;

    /// Append `child` to an index node
    fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()>;

    /// Detach `child` from an index node
    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()>;

    /// Detach and return every child of an index node
    fn take_children(&mut self, parent: NodeId) -> Result<Vec<NodeId>>;

    /// Append an object reference to a leaf
    fn add_reference(&mut self, leaf: NodeId, object: ObjectId) -> Result<()>;

    /// Detach an object reference from a leaf
    fn remove_reference(&mut self, leaf: NodeId, object: ObjectId) -> Result<()>;

    /// Detach and return every object reference of a leaf
    fn take_references(&mut self, leaf: NodeId) -> Result<Vec<ObjectId>>;

    /// Leaf currently referencing `object`
    fn leaf_of(&self, object: ObjectId) -> Option<NodeId>;

    /// Store an object record; fails if the id is taken
    fn put_object(&mut self, object: SpatialObject) -> Result<()>;

    fn object(&self, id: ObjectId) -> Result<&SpatialObject>;

    /// Remove an object record
    fn remove_object(&mut self, id: ObjectId) -> Result<SpatialObject>;

    fn contains_object(&self, id: ObjectId) -> bool;

    /// Number of stored object records
    fn object_count(&self) -> usize;

    /// Store statistics
    fn stats(&self) -> StoreStats;

    /// Drop everything and start over with a single empty leaf as root
    fn clear(&mut self) -> Result<()>;
}

/// Store statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Live tree nodes
    pub node_count: usize,
    /// Stored objects
    pub object_count: usize,
    /// Structural operations performed
    pub operations_count: u64,
}

/// In-memory arena store.
///
/// Nodes live in a slot vector addressed by [`NodeId`]; freed slots are
/// reused. Parent and owning-leaf lookups are side tables keyed by handle.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    slots: Vec<Option<TreeNode>>,
    free: Vec<usize>,
    parents: FxHashMap<NodeId, NodeId>,
    owners: FxHashMap<ObjectId, NodeId>,
    objects: FxHashMap<ObjectId, SpatialObject>,
    root: NodeId,
    operations: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            slots: vec![Some(TreeNode::leaf())],
            free: Vec::new(),
            parents: FxHashMap::default(),
            owners: FxHashMap::default(),
            objects: FxHashMap::default(),
            root: NodeId(0),
            operations: 0,
        }
    }

    /// Create with a capacity hint for the expected number of objects
    pub fn with_capacity(objects: usize) -> Self {
        let mut store = Self::new();
        store.objects.reserve(objects);
        store.owners.reserve(objects);
        store
    }

    fn slot(id: NodeId) -> usize {
        id.0 as usize
    }

    fn index_children_mut(&mut self, id: NodeId) -> Result<&mut Vec<NodeId>> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Index { children } => Ok(children),
            NodeKind::Leaf { .. } => Err(IndexError::UnexpectedNodeKind {
                node: id,
                expected: "index",
            }),
        }
    }

    fn leaf_objects_mut(&mut self, id: NodeId) -> Result<&mut Vec<ObjectId>> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Leaf { objects, .. } => Ok(objects),
            NodeKind::Index { .. } => Err(IndexError::UnexpectedNodeKind {
                node: id,
                expected: "leaf",
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore for MemoryStore {
    fn root(&self) -> NodeId {
        self.root
    }

    fn set_root(&mut self, root: NodeId) -> Result<()> {
        self.node(root)?;
        self.parents.remove(&root);
        self.root = root;
        self.operations += 1;
        Ok(())
    }

    fn create_node(&mut self, node: TreeNode) -> Result<NodeId> {
        self.operations += 1;
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(node);
            return Ok(NodeId(slot as u64));
        }
        self.slots.push(Some(node));
        Ok(NodeId((self.slots.len() - 1) as u64))
    }

    fn delete_node(&mut self, id: NodeId) -> Result<TreeNode> {
        let slot = Self::slot(id);
        let node = self
            .slots
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or(IndexError::MissingNode(id))?;

        if let Some(parent) = self.parents.remove(&id)
            && let Some(Some(TreeNode {
                kind: NodeKind::Index { children },
                ..
            })) = self.slots.get_mut(Self::slot(parent))
        {
            children.retain(|c| *c != id);
        }
        for child in node.children() {
            if self.parents.get(child) == Some(&id) {
                self.parents.remove(child);
            }
        }
        for object in node.objects() {
            if self.owners.get(object) == Some(&id) {
                self.owners.remove(object);
            }
        }

        self.free.push(slot);
        self.operations += 1;
        Ok(node)
    }

    fn node(&self, id: NodeId) -> Result<&TreeNode> {
        self.slots
            .get(Self::slot(id))
            .and_then(Option::as_ref)
            .ok_or(IndexError::MissingNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut TreeNode> {
        self.slots
            .get_mut(Self::slot(id))
            .and_then(Option::as_mut)
            .ok_or(IndexError::MissingNode(id))
    }

    fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.node(id)?;
        Ok(self.parents.get(&id).copied())
    }

    fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(child)?;
        if let Some(existing) = self.parents.get(&child) {
            return Err(IndexError::InvariantViolation(format!(
                "node {child} already has parent {existing}"
            )));
        }
        self.index_children_mut(parent)?.push(child);
        self.parents.insert(child, parent);
        self.operations += 1;
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let children = self.index_children_mut(parent)?;
        let Some(pos) = children.iter().position(|c| *c == child) else {
            return Err(IndexError::InvariantViolation(format!(
                "node {child} is not a child of {parent}"
            )));
        };
        children.remove(pos);
        self.parents.remove(&child);
        self.operations += 1;
        Ok(())
    }

    fn take_children(&mut self, parent: NodeId) -> Result<Vec<NodeId>> {
        let children = std::mem::take(self.index_children_mut(parent)?);
        for child in &children {
            self.parents.remove(child);
        }
        self.operations += 1;
        Ok(children)
    }

    fn add_reference(&mut self, leaf: NodeId, object: ObjectId) -> Result<()> {
        if !self.objects.contains_key(&object) {
            return Err(IndexError::ObjectNotFound(object));
        }
        if let Some(existing) = self.owners.get(&object) {
            return Err(IndexError::InvariantViolation(format!(
                "object {object} is already referenced by leaf {existing}"
            )));
        }
        self.leaf_objects_mut(leaf)?.push(object);
        self.owners.insert(object, leaf);
        self.operations += 1;
        Ok(())
    }

    fn remove_reference(&mut self, leaf: NodeId, object: ObjectId) -> Result<()> {
        let objects = self.leaf_objects_mut(leaf)?;
        let Some(pos) = objects.iter().position(|o| *o == object) else {
            return Err(IndexError::InvariantViolation(format!(
                "object {object} is not referenced by leaf {leaf}"
            )));
        };
        objects.remove(pos);
        self.owners.remove(&object);
        self.operations += 1;
        Ok(())
    }

    fn take_references(&mut self, leaf: NodeId) -> Result<Vec<ObjectId>> {
        let objects = std::mem::take(self.leaf_objects_mut(leaf)?);
        for object in &objects {
            self.owners.remove(object);
        }
        self.operations += 1;
        Ok(objects)
    }

    fn leaf_of(&self, object: ObjectId) -> Option<NodeId> {
        self.owners.get(&object).copied()
    }

    fn put_object(&mut self, object: SpatialObject) -> Result<()> {
        if self.objects.contains_key(&object.id) {
            return Err(IndexError::DuplicateObject(object.id));
        }
        self.objects.insert(object.id, object);
        self.operations += 1;
        Ok(())
    }

    fn object(&self, id: ObjectId) -> Result<&SpatialObject> {
        self.objects.get(&id).ok_or(IndexError::ObjectNotFound(id))
    }

    fn remove_object(&mut self, id: ObjectId) -> Result<SpatialObject> {
        let object = self
            .objects
            .remove(&id)
            .ok_or(IndexError::ObjectNotFound(id))?;
        self.owners.remove(&id);
        self.operations += 1;
        Ok(object)
    }

    fn contains_object(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            node_count: self.slots.len() - self.free.len(),
            object_count: self.objects.len(),
            operations_count: self.operations,
        }
    }

    fn clear(&mut self) -> Result<()> {
        *self = Self::new();
        Ok(())
    }
}
