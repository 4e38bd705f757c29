//! Node splitting.
//!
//! An overfull node is emptied, its entries are divided into two groups and
//! the second group moves into a new sibling. Leaf summaries are rebuilt by
//! re-merging the members of each group.

use super::ReachTree;
use crate::config::SplitMode;
use crate::error::{IndexError, Result};
use crate::monitor::TreeMonitor;
use crate::store::{NodeId, NodeKind, TreeNode, TreeStore};
use crate::summary::PathNeighbors;
use reachtree_types::ObjectId;
use reachtree_types::envelope::Envelope;

#[derive(Debug, Clone, Copy)]
enum Member {
    Object(ObjectId),
    Node(NodeId),
}

#[derive(Debug)]
struct SplitEntry {
    member: Member,
    envelope: Envelope,
    summary: Option<PathNeighbors>,
}

#[derive(Debug)]
struct Group {
    members: Vec<usize>,
    envelope: Envelope,
    summary: PathNeighbors,
}

impl Group {
    fn seeded(index: usize, entry: &SplitEntry) -> Self {
        Self {
            members: vec![index],
            envelope: entry.envelope,
            summary: entry.summary.clone().unwrap_or_default(),
        }
    }

    fn add(&mut self, index: usize, entry: &SplitEntry, cap: usize) {
        self.members.push(index);
        self.envelope.expand_to_include(&entry.envelope);
        if let Some(summary) = &entry.summary {
            self.summary.merge(summary, cap);
        }
    }
}

impl<S: TreeStore, M: TreeMonitor> ReachTree<S, M> {
    /// Split an overfull node and repair everything above it, splitting
    /// ancestors in turn when they overflow.
    pub(crate) fn split_and_adjust(&mut self, node: NodeId) -> Result<()> {
        let sibling = match self.config.split_mode {
            SplitMode::Quadratic => self.quadratic_split(node)?,
            SplitMode::Greene => self.greene_split(node)?,
        };
        log::debug!(
            "split {node} ({} entries) off into {sibling} ({} entries)",
            self.entry_count(node)?,
            self.entry_count(sibling)?
        );
        self.monitor.add_split(node, sibling);

        match self.store.parent(node)? {
            None => self.create_new_root(node, sibling),
            Some(parent) => {
                self.store.add_child(parent, sibling)?;
                self.refresh_envelope(parent)?;
                if self.entry_count(parent)? > self.config.max_node_references {
                    self.split_and_adjust(parent)
                } else {
                    self.adjust_path(parent)
                }
            }
        }
    }

    fn create_new_root(&mut self, left: NodeId, right: NodeId) -> Result<()> {
        let root = self.store.create_node(TreeNode::index())?;
        self.attach_child(root, left)?;
        self.attach_child(root, right)?;
        self.store.set_root(root)?;
        log::debug!("new root {root} over {left} and {right}");
        Ok(())
    }

    /// Quadratic split. Seeds are the pair with the largest separation and
    /// every remaining entry goes, cheapest first, to the group it grows
    /// least. Summary growth joins both measures at leaf level and one level
    /// above unless the index is spatial-only.
    fn quadratic_split(&mut self, node: NodeId) -> Result<NodeId> {
        let entries = self.extract_entries(node)?;
        let use_graph = !self.cost.is_spatial_only() && entries.iter().all(|e| e.summary.is_some());
        let cap = self.config.pn_cap();
        let min = self.config.min_node_references();

        let (first, second) = self.pick_seeds(&entries, use_graph);
        let mut groups = [
            Group::seeded(first, &entries[first]),
            Group::seeded(second, &entries[second]),
        ];
        let mut remaining: Vec<usize> = (0..entries.len())
            .filter(|&i| i != first && i != second)
            .collect();

        while !remaining.is_empty() {
            // one group can only reach the minimum by taking everything left
            if let Some(forced) = (0..2).find(|&g| groups[g].members.len() + remaining.len() <= min)
            {
                for index in remaining.drain(..) {
                    groups[forced].add(index, &entries[index], cap);
                }
                break;
            }

            let mut best: Option<(usize, usize, f64)> = None;
            for (pos, &index) in remaining.iter().enumerate() {
                let entry = &entries[index];
                let c0 = self.group_cost(&groups[0], entry, use_graph, cap);
                let c1 = self.group_cost(&groups[1], entry, use_graph, cap);
                let best_cost = best.map_or(f64::INFINITY, |(_, _, c)| c);
                if c0 < c1 && c0 < best_cost {
                    best = Some((pos, 0, c0));
                } else if c1 < c0 && c1 < best_cost {
                    best = Some((pos, 1, c1));
                } else if c0 == c1 && c0 < best_cost {
                    let smaller = if groups[1].envelope.area() < groups[0].envelope.area() {
                        1
                    } else {
                        0
                    };
                    best = Some((pos, smaller, c0));
                }
            }
            let (pos, group, _) = best.ok_or(IndexError::SplitFailed(node))?;
            let index = remaining.remove(pos);
            groups[group].add(index, &entries[index], cap);
        }

        let [left, right] = groups;
        self.reconnect(node, &entries, &left.members, &right.members)
    }

    /// Greene's split: order entries by centre along the longest axis of
    /// their union and cut the sequence in half.
    fn greene_split(&mut self, node: NodeId) -> Result<NodeId> {
        let entries = self.extract_entries(node)?;
        let Some(bounds) = entries
            .iter()
            .map(|e| e.envelope)
            .reduce(|a, b| a.union(&b))
        else {
            return Err(IndexError::SplitFailed(node));
        };
        let axis = bounds.longest_axis();
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by(|&a, &b| {
            entries[a]
                .envelope
                .centre(axis)
                .total_cmp(&entries[b].envelope.centre(axis))
        });
        let (left, right) = order.split_at(order.len() / 2);
        self.reconnect(node, &entries, left, right)
    }

    fn group_cost(&self, group: &Group, entry: &SplitEntry, use_graph: bool, cap: usize) -> f64 {
        let enlargement = group.envelope.enlargement(&entry.envelope);
        match (&entry.summary, use_graph) {
            (Some(summary), true) => self
                .cost
                .blended_cost(enlargement, group.summary.expansion_cost(summary, cap)),
            _ => enlargement,
        }
    }

    /// The two entries farthest apart by dead space, blended with summary
    /// growth measured in both directions when `use_graph` holds.
    fn pick_seeds(&self, entries: &[SplitEntry], use_graph: bool) -> (usize, usize) {
        let cap = self.config.pn_cap();
        let mut worst = f64::NEG_INFINITY;
        let mut seeds = (0, 1);
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let (a, b) = (&entries[i], &entries[j]);
                let dead_space = a.envelope.dead_space(&b.envelope);
                let separation = match (&a.summary, &b.summary, use_graph) {
                    (Some(sa), Some(sb), true) => {
                        let growth = sa
                            .expansion_cost(sb, cap)
                            .saturating_add(sb.expansion_cost(sa, cap));
                        self.cost.seed_separation(dead_space, growth)
                    }
                    _ => dead_space,
                };
                if separation > worst {
                    worst = separation;
                    seeds = (i, j);
                }
            }
        }
        seeds
    }

    /// Detach every entry of `node`, resetting its envelope and summary.
    fn extract_entries(&mut self, node: NodeId) -> Result<Vec<SplitEntry>> {
        let spatial_only = self.cost.is_spatial_only();
        let mut entries = Vec::new();
        if self.is_leaf(node)? {
            for object in self.store.take_references(node)? {
                let record = self.store.object(object)?;
                entries.push(SplitEntry {
                    member: Member::Object(object),
                    envelope: record.envelope(),
                    summary: (!spatial_only).then(|| record.path_neighbors.clone()),
                });
            }
        } else {
            for child in self.store.take_children(node)? {
                let child_node = self.store.node(child)?;
                entries.push(SplitEntry {
                    member: Member::Node(child),
                    envelope: child_node.envelope.ok_or(IndexError::MissingEnvelope(child))?,
                    summary: child_node.summary().filter(|_| !spatial_only).cloned(),
                });
            }
        }
        if entries.len() < 2 {
            return Err(IndexError::SplitFailed(node));
        }

        let emptied = self.store.node_mut(node)?;
        emptied.envelope = None;
        if let NodeKind::Leaf { summary, .. } = &mut emptied.kind {
            summary.clear();
        }
        Ok(entries)
    }

    /// Put `left` back into `node` and `right` into a new sibling of the same
    /// kind, rebuilding envelopes and leaf summaries as the entries land.
    fn reconnect(
        &mut self,
        node: NodeId,
        entries: &[SplitEntry],
        left: &[usize],
        right: &[usize],
    ) -> Result<NodeId> {
        let sibling = if self.is_leaf(node)? {
            self.store.create_node(TreeNode::leaf())?
        } else {
            self.store.create_node(TreeNode::index())?
        };
        for (target, group) in [(node, left), (sibling, right)] {
            for &index in group {
                match entries[index].member {
                    Member::Object(object) => {
                        self.insert_in_leaf(target, object)?;
                    }
                    Member::Node(child) => {
                        self.attach_child(target, child)?;
                    }
                }
            }
        }
        Ok(sibling)
    }
}
