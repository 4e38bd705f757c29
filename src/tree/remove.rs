//! Object removal with tree condensation.

use super::ReachTree;
use crate::error::{IndexError, Result};
use crate::monitor::TreeMonitor;
use crate::object::SpatialObject;
use crate::store::{NodeId, TreeNode, TreeStore};
use reachtree_types::ObjectId;

impl<S: TreeStore, M: TreeMonitor> ReachTree<S, M> {
    /// Remove an object and return its record.
    ///
    /// Nodes left underfull are dissolved and their objects reinserted; the
    /// leaf that held the object gets its summary rebuilt from the remaining
    /// members. The root is shortened while it is an index node with a
    /// single child.
    pub fn remove(&mut self, id: ObjectId) -> Result<SpatialObject> {
        self.ensure_writable()?;
        let leaf = self
            .store
            .leaf_of(id)
            .ok_or(IndexError::ObjectNotFound(id))?;

        self.guarded(|tree| {
            tree.store.remove_reference(leaf, id)?;
            let object = tree.store.remove_object(id)?;
            let orphans = tree.condense(leaf)?;
            tree.shorten_root()?;

            if !orphans.is_empty() {
                log::debug!("reinserting {} objects after removing {id}", orphans.len());
            }
            for orphan in orphans {
                let root = tree.store.root();
                tree.add_below(root, orphan)?;
            }
            Ok(object)
        })
    }

    /// Walk from `leaf` to the root, dissolving underfull nodes and
    /// tightening the rest.
    ///
    /// # Returns
    ///
    /// Objects detached from dissolved subtrees.
    fn condense(&mut self, leaf: NodeId) -> Result<Vec<ObjectId>> {
        let min = self.config.min_node_references();
        let mut orphans = Vec::new();
        let mut node = leaf;
        loop {
            let parent = self.store.parent(node)?;
            match parent {
                Some(parent) if self.entry_count(node)? < min => {
                    self.store.remove_child(parent, node)?;
                    self.dissolve(node, &mut orphans)?;
                }
                _ => {
                    self.refresh_envelope(node)?;
                    if node == leaf {
                        self.rebuild_summary(leaf)?;
                    }
                }
            }
            match parent {
                Some(parent) => node = parent,
                None => return Ok(orphans),
            }
        }
    }

    /// Delete a detached subtree, collecting its objects.
    fn dissolve(&mut self, subtree: NodeId, orphans: &mut Vec<ObjectId>) -> Result<()> {
        let mut stack = vec![subtree];
        while let Some(id) = stack.pop() {
            if self.is_leaf(id)? {
                orphans.extend(self.store.take_references(id)?);
            } else {
                stack.extend(self.store.take_children(id)?);
            }
            self.store.delete_node(id)?;
        }
        Ok(())
    }

    fn rebuild_summary(&mut self, leaf: NodeId) -> Result<()> {
        if self.cost.is_spatial_only() {
            return Ok(());
        }
        let members = self.store.node(leaf)?.objects().to_vec();
        let summary = self.summary_from_members(&members)?;
        *self
            .store
            .node_mut(leaf)?
            .summary_mut()
            .ok_or(IndexError::UnexpectedNodeKind {
                node: leaf,
                expected: "leaf",
            })? = summary;
        self.monitor.add_summary_rebuilt(leaf);
        Ok(())
    }

    fn shorten_root(&mut self) -> Result<()> {
        loop {
            let root = self.store.root();
            let node = self.store.node(root)?;
            if node.is_leaf() {
                return Ok(());
            }
            let children = node.children().to_vec();
            match children[..] {
                [] => {
                    let leaf = self.store.create_node(TreeNode::leaf())?;
                    self.store.set_root(leaf)?;
                    self.store.delete_node(root)?;
                    log::debug!("root {root} emptied, replaced by leaf {leaf}");
                    return Ok(());
                }
                [only] => {
                    self.store.remove_child(root, only)?;
                    self.store.set_root(only)?;
                    self.store.delete_node(root)?;
                    log::debug!("root {root} shortened to {only}");
                }
                _ => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::monitor::CountingMonitor;
    use crate::store::MemoryStore;
    use crate::summary::{PathNeighbors, PnKey};
    use reachtree_types::envelope::Envelope;
    use reachtree_types::geometry::Geometry;

    fn tree(alpha: f64) -> ReachTree<MemoryStore, CountingMonitor> {
        let config = IndexConfig::default()
            .with_alpha(alpha)
            .with_max_node_references(10);
        ReachTree::with_parts(MemoryStore::new(), config, CountingMonitor::new()).unwrap()
    }

    #[test]
    fn test_remove_missing_object() {
        let mut t = tree(1.0);
        assert!(matches!(t.remove(7), Err(IndexError::ObjectNotFound(7))));
        assert!(!t.is_poisoned());
    }

    #[test]
    fn test_remove_returns_record_and_tightens() {
        let mut t = tree(1.0);
        t.insert(SpatialObject::new(1, Geometry::point(0.0, 0.0)))
            .unwrap();
        t.insert(SpatialObject::new(2, Geometry::point(5.0, 5.0)))
            .unwrap();

        let removed = t.remove(2).unwrap();
        assert_eq!(removed.id, 2);
        assert!(!t.contains(2));
        assert_eq!(
            t.bounding_box().unwrap(),
            Some(Envelope::from_point(0.0, 0.0))
        );

        t.remove(1).unwrap();
        assert!(t.is_empty());
        assert_eq!(t.bounding_box().unwrap(), None);
        t.validate().unwrap();
    }

    #[test]
    fn test_remove_rebuilds_summary() {
        let mut t = tree(0.5);
        let key = PnKey::single(2);
        t.insert(
            SpatialObject::new(1, Geometry::point(0.0, 0.0))
                .with_path_neighbors(PathNeighbors::new().with_neighbors(key.clone(), [1, 2])),
        )
        .unwrap();
        t.insert(
            SpatialObject::new(2, Geometry::point(1.0, 1.0))
                .with_path_neighbors(PathNeighbors::new().with_neighbors(key.clone(), [3])),
        )
        .unwrap();

        t.remove(2).unwrap();
        let summary = t.leaf_summary(1).unwrap();
        assert_eq!(summary.get(&key).unwrap().ids(), Some(&[1, 2][..]));
        assert_eq!(t.monitor().summaries_rebuilt(), 1);
        t.validate().unwrap();
    }

    #[test]
    fn test_remove_condenses_and_shortens() {
        let mut t = tree(1.0);
        for i in 0..300u64 {
            let x = (i % 20) as f64;
            let y = (i / 20) as f64;
            t.insert(SpatialObject::new(i, Geometry::point(x, y)))
                .unwrap();
        }
        let tall = t.height().unwrap();
        assert!(tall >= 3);

        for i in 0..295u64 {
            t.remove(i).unwrap();
            if i % 25 == 0 {
                t.validate().unwrap();
            }
        }
        assert_eq!(t.len(), 5);
        assert_eq!(t.height().unwrap(), 1);
        t.validate().unwrap();
    }
}
