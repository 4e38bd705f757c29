//! Single-object insertion: choose-subtree descent, leaf insertion and
//! upward envelope propagation.

use super::ReachTree;
use crate::error::{IndexError, Result};
use crate::monitor::{SubtreeChoice, TreeMonitor};
use crate::object::SpatialObject;
use crate::store::{NodeId, TreeStore};
use reachtree_types::ObjectId;
use reachtree_types::envelope::Envelope;

impl<S: TreeStore, M: TreeMonitor> ReachTree<S, M> {
    /// Insert one object.
    ///
    /// The object's geometry must be finite and its id unused. Its
    /// path-neighbor contribution is merged into the receiving leaf unless the
    /// index is spatial-only.
    pub fn insert(&mut self, object: SpatialObject) -> Result<()> {
        self.ensure_writable()?;
        self.check_geometry(&object)?;
        if self.store.contains_object(object.id) {
            return Err(IndexError::DuplicateObject(object.id));
        }
        self.guarded(|tree| {
            let id = object.id;
            tree.store.put_object(object)?;
            let root = tree.store.root();
            tree.add_below(root, id)
        })
    }

    /// Descend from `start` to a leaf, insert the stored object there and
    /// restore the invariants on the way back up.
    pub(crate) fn add_below(&mut self, start: NodeId, object: ObjectId) -> Result<()> {
        let envelope = self.store.object(object)?.envelope();
        let mut node = start;
        while !self.is_leaf(node)? {
            node = self.choose_subtree(node, object, &envelope)?;
        }
        let changed = self.insert_in_leaf(node, object)?;
        if self.entry_count(node)? > self.config.max_node_references {
            self.split_and_adjust(node)
        } else if changed {
            self.adjust_path(node)
        } else {
            Ok(())
        }
    }

    /// Reference `object` from `leaf`, growing its envelope and merging the
    /// object's summary contribution.
    ///
    /// # Returns
    ///
    /// Whether the leaf envelope changed.
    pub(crate) fn insert_in_leaf(&mut self, leaf: NodeId, object: ObjectId) -> Result<bool> {
        let record = self.store.object(object)?;
        let envelope = record.envelope();
        let contribution = (!self.cost.is_spatial_only() && !record.path_neighbors.is_empty())
            .then(|| record.path_neighbors.clone());

        self.store.add_reference(leaf, object)?;
        let changed = self.expand_envelope(leaf, &envelope)?;
        if let Some(contribution) = contribution {
            let cap = self.config.pn_cap();
            self.store
                .node_mut(leaf)?
                .summary_mut()
                .ok_or(IndexError::UnexpectedNodeKind {
                    node: leaf,
                    expected: "leaf",
                })?
                .merge(&contribution, cap);
        }
        Ok(changed)
    }

    /// Pick the child of `parent` that should receive `object`.
    ///
    /// Children that already contain the object win outright: the smallest
    /// one above leaf level, the one whose summary grows least at leaf level.
    /// Otherwise the child with the lowest blended enlargement cost wins, with
    /// ties going to the smallest resulting area.
    pub(crate) fn choose_subtree(
        &mut self,
        parent: NodeId,
        object: ObjectId,
        envelope: &Envelope,
    ) -> Result<NodeId> {
        let children = self.store.node(parent)?.children();
        let Some(&first) = children.first() else {
            return Err(IndexError::NoCandidateSubtree(parent));
        };
        let use_graph = self.store.node(first)?.is_leaf() && !self.cost.is_spatial_only();
        let cap = self.config.pn_cap();
        let contribution = &self.store.object(object)?.path_neighbors;

        let mut containers = Vec::new();
        for &child in children {
            let env = self.envelope_of(child)?;
            if env.contains(envelope) {
                containers.push((child, env.area()));
            }
        }

        let (chosen, choice) = if !containers.is_empty() {
            let mut best: Option<(NodeId, f64)> = None;
            for &(child, area) in &containers {
                let cost = if use_graph {
                    let growth = self.summary_of(child)?.expansion_cost(contribution, cap);
                    self.cost.container_cost(area, growth)
                } else {
                    area
                };
                if best.is_none_or(|(_, c)| cost < c) {
                    best = Some((child, cost));
                }
            }
            let (child, _) = best.ok_or(IndexError::NoCandidateSubtree(parent))?;
            let choice = SubtreeChoice::Container {
                candidates: containers.len(),
            };
            (child, choice)
        } else {
            let mut best: Option<Candidate> = None;
            let mut spatial_best: Option<Candidate> = None;
            let mut tied = false;
            for &child in children {
                let env = self.envelope_of(child)?;
                let enlargement = env.enlargement(envelope);
                let resulting_area = env.union(envelope).area();
                let cost = if use_graph {
                    let growth = self.summary_of(child)?.expansion_cost(contribution, cap);
                    self.cost.blended_cost(enlargement, growth)
                } else {
                    enlargement
                };

                let candidate = Candidate {
                    node: child,
                    cost,
                    area: resulting_area,
                };
                match &best {
                    Some(b) if cost == b.cost => {
                        tied = true;
                        if resulting_area < b.area {
                            best = Some(candidate);
                        }
                    }
                    Some(b) if cost > b.cost => {}
                    _ => {
                        tied = false;
                        best = Some(candidate);
                    }
                }

                let spatial = Candidate {
                    node: child,
                    cost: enlargement,
                    area: resulting_area,
                };
                if spatial_best
                    .as_ref()
                    .is_none_or(|s| spatial.cost < s.cost || (spatial.cost == s.cost && spatial.area < s.area))
                {
                    spatial_best = Some(spatial);
                }
            }
            let best = best.ok_or(IndexError::NoCandidateSubtree(parent))?;
            let diverged = spatial_best.is_some_and(|s| s.node != best.node);
            (best.node, SubtreeChoice::Enlargement { tied, diverged })
        };

        log::trace!("choose_subtree: {parent} -> {chosen} ({choice:?})");
        self.monitor.on_subtree_choice(choice);
        Ok(chosen)
    }
}

struct Candidate {
    node: NodeId,
    cost: f64,
    area: f64,
}
