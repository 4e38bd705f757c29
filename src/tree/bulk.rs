//! Bulk loading by seeded clustering.
//!
//! A batch is first distributed over the existing children of the root by
//! containment. Each cluster is then either pushed further down, inserted
//! object by object, or packed into a freshly built subtree that is grafted
//! (or merged) at the level where its height matches. Objects no child
//! contains are inserted one at a time once the batch is placed.

use super::ReachTree;
use crate::error::{IndexError, Result};
use crate::monitor::TreeMonitor;
use crate::object::SpatialObject;
use crate::store::{NodeId, TreeNode, TreeStore};
use reachtree_types::ObjectId;
use reachtree_types::envelope::Envelope;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;

/// Two subtrees overlapping by more than this fraction are merged.
const MERGE_OVERLAP_THRESHOLD: f64 = 0.1;

const PROGRESS_INTERVAL: usize = 10_000;

/// What a bulk load did with its batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkLoadReport {
    pub inserted: usize,
    /// Objects placed through a containing subtree
    pub clustered: usize,
    /// Objects inserted one at a time because no subtree contained them
    pub outliers: usize,
    /// Subtrees packed from scratch
    pub fresh_subtrees: usize,
    /// Subtree pairs merged by overlap
    pub merged_subtrees: usize,
}

impl<S: TreeStore, M: TreeMonitor> ReachTree<S, M> {
    /// Bulk load with the configured loading factor.
    pub fn bulk_load(&mut self, objects: Vec<SpatialObject>) -> Result<BulkLoadReport> {
        let loading_factor = self.config.loading_factor;
        self.bulk_insert(objects, loading_factor)
    }

    /// Insert a batch of objects.
    ///
    /// An empty index is packed from scratch. Otherwise the batch is clustered
    /// under the existing top-level children and the leftovers are inserted
    /// individually.
    ///
    /// # Arguments
    ///
    /// * `objects` - Objects with unique, unused ids and finite geometry
    /// * `loading_factor` - Target node fill for packed subtrees, in [0.1, 1]
    pub fn bulk_insert(
        &mut self,
        objects: Vec<SpatialObject>,
        loading_factor: f64,
    ) -> Result<BulkLoadReport> {
        self.ensure_writable()?;
        if !(0.1..=1.0).contains(&loading_factor) {
            return Err(IndexError::InvalidConfig(format!(
                "loading_factor must be within [0.1, 1], got {loading_factor}"
            )));
        }
        let mut seen = FxHashSet::default();
        for object in &objects {
            self.check_geometry(object)?;
            if self.store.contains_object(object.id) || !seen.insert(object.id) {
                return Err(IndexError::DuplicateObject(object.id));
            }
        }
        if objects.is_empty() {
            return Ok(BulkLoadReport::default());
        }

        self.guarded(|tree| {
            let was_empty = tree.is_empty();
            let mut report = BulkLoadReport {
                inserted: objects.len(),
                ..BulkLoadReport::default()
            };
            let ids: Vec<ObjectId> = objects.iter().map(|o| o.id).collect();
            for object in objects {
                tree.store.put_object(object)?;
            }

            if was_empty && tree.store.node(tree.store.root())?.entry_count() == 0 {
                tree.load_empty(ids, loading_factor, &mut report)?;
            } else {
                let root = tree.store.root();
                let height = tree.height_of(root)?;
                let outliers = tree.seeded_insertion(root, height, ids, loading_factor, &mut report)?;
                report.outliers = outliers.len();
                for (done, id) in outliers.into_iter().enumerate() {
                    if done > 0 && done % PROGRESS_INTERVAL == 0 {
                        log::info!("bulk load: {done}/{} outliers inserted", report.outliers);
                    }
                    let root = tree.store.root();
                    tree.add_below(root, id)?;
                }
                report.clustered = report.inserted - report.outliers;
            }

            log::info!(
                "bulk load: {} objects ({} clustered, {} outliers, {} fresh subtrees, {} merges)",
                report.inserted,
                report.clustered,
                report.outliers,
                report.fresh_subtrees,
                report.merged_subtrees
            );
            Ok(report)
        })
    }

    fn load_empty(
        &mut self,
        ids: Vec<ObjectId>,
        loading_factor: f64,
        report: &mut BulkLoadReport,
    ) -> Result<()> {
        let Some(height) = self.choose_height(ids.len(), true, loading_factor) else {
            self.monitor.add_case("empty tree: insert one by one");
            report.outliers = ids.len();
            for id in ids {
                let root = self.store.root();
                self.add_below(root, id)?;
            }
            return Ok(());
        };
        self.monitor.add_case("empty tree: build from scratch");
        let old_root = self.store.root();
        let new_root = self.build_subtree(ids, height, true, loading_factor)?;
        self.store.set_root(new_root)?;
        self.store.delete_node(old_root)?;
        report.fresh_subtrees += 1;
        report.clustered = report.inserted;
        log::debug!("packed empty tree into {new_root} with height {height}");
        Ok(())
    }

    /// Distribute `ids` over the children of `root` (whose height is
    /// `root_height`) and place each cluster.
    ///
    /// # Returns
    ///
    /// Objects no child contains.
    fn seeded_insertion(
        &mut self,
        root: NodeId,
        root_height: usize,
        ids: Vec<ObjectId>,
        loading_factor: f64,
        report: &mut BulkLoadReport,
    ) -> Result<Vec<ObjectId>> {
        let children = self.store.node(root)?.children().to_vec();
        if children.is_empty() {
            return Ok(ids);
        }

        let mut ranked = Vec::with_capacity(children.len());
        for child in children {
            ranked.push((child, self.envelope_of(child)?));
        }
        ranked.sort_by(|a, b| a.1.area().total_cmp(&b.1.area()));

        let mut clusters: Vec<Vec<ObjectId>> = vec![Vec::new(); ranked.len()];
        let mut outliers = Vec::new();
        for id in ids {
            let envelope = self.store.object(id)?.envelope();
            match ranked.iter().position(|(_, env)| env.contains(&envelope)) {
                Some(slot) => clusters[slot].push(id),
                None => outliers.push(id),
            }
        }

        // height of the subtrees hanging below each child
        let below = root_height.saturating_sub(2);
        let small_cluster =
            self.config.max_node_references as f64 * loading_factor / 2.0;

        for ((child, _), cluster) in ranked.into_iter().zip(clusters) {
            if cluster.is_empty() {
                continue;
            }
            if below == 0 {
                self.monitor.add_case("leaf child: insert one by one");
                for id in cluster {
                    self.add_below(child, id)?;
                }
                continue;
            }

            let expected = self.expected_height(cluster.len(), loading_factor);
            match expected.cmp(&below) {
                Ordering::Less => {
                    self.monitor.add_case("cluster shorter than subtree: descend");
                    let nested =
                        self.seeded_insertion(child, root_height - 1, cluster, loading_factor, report)?;
                    outliers.extend(nested);
                }
                Ordering::Equal if (cluster.len() as f64) < small_cluster => {
                    self.monitor.add_case("small cluster: insert one by one");
                    for id in cluster {
                        self.add_below(root, id)?;
                    }
                }
                Ordering::Equal => {
                    if !self.fits(cluster.len(), below, false, loading_factor) {
                        self.monitor.add_case("unpackable cluster: insert one by one");
                        for id in cluster {
                            self.add_below(child, id)?;
                        }
                        continue;
                    }
                    self.monitor.add_case("cluster matches subtree: graft");
                    let subtree = self.build_subtree(cluster, below, false, loading_factor)?;
                    report.fresh_subtrees += 1;
                    self.graft(child, vec![subtree], report)?;
                }
                Ordering::Greater => {
                    let height = self
                        .choose_height(cluster.len(), true, loading_factor)
                        .filter(|&h| h > below);
                    let Some(height) = height else {
                        self.monitor.add_case("unpackable cluster: insert one by one");
                        for id in cluster {
                            self.add_below(child, id)?;
                        }
                        continue;
                    };
                    self.monitor.add_case("cluster taller than subtree: graft slice");
                    let fresh = self.build_subtree(cluster, height, true, loading_factor)?;
                    report.fresh_subtrees += 1;
                    let slice = self.detach_slice(fresh, height - below)?;
                    self.graft(child, slice, report)?;
                }
            }
        }
        Ok(outliers)
    }

    /// Height a packed tree of `size` objects needs at the given loading.
    pub(crate) fn expected_height(&self, size: usize, loading_factor: f64) -> usize {
        if size <= 1 {
            return 1;
        }
        let target = (self.config.max_node_references as f64 * loading_factor)
            .floor()
            .max(2.0);
        ((size as f64).ln() / target.ln()).ceil().max(1.0) as usize
    }

    fn target_loading(&self, loading_factor: f64) -> usize {
        let max = self.config.max_node_references;
        ((max as f64 * loading_factor).round() as usize).clamp(2, max)
    }

    /// Fewest and most objects a valid non-root subtree of `height` holds.
    fn subtree_capacity(&self, height: usize) -> (usize, usize) {
        let exp = height as u32;
        (
            self.config.min_node_references().saturating_pow(exp),
            self.config.max_node_references.saturating_pow(exp),
        )
    }

    /// Sizes of the groups `n` objects are cut into below a node of
    /// `height >= 2`, or `None` if no valid fanout exists.
    fn partition_sizes(
        &self,
        n: usize,
        height: usize,
        is_root: bool,
        loading_factor: f64,
    ) -> Option<Vec<usize>> {
        let (child_min, child_max) = self.subtree_capacity(height - 1);
        let lower = if is_root {
            2
        } else {
            self.config.min_node_references()
        };
        let fewest = lower.max(n.div_ceil(child_max));
        let most = self.config.max_node_references.min(n / child_min.max(1));
        if fewest > most {
            return None;
        }
        let subtree = self
            .target_loading(loading_factor)
            .saturating_pow((height - 1) as u32);
        let groups = n.div_ceil(subtree).clamp(fewest, most);
        let (base, extra) = (n / groups, n % groups);
        Some(
            (0..groups)
                .map(|g| if g < extra { base + 1 } else { base })
                .collect(),
        )
    }

    fn fits(&self, n: usize, height: usize, is_root: bool, loading_factor: f64) -> bool {
        match height {
            0 => false,
            1 => {
                let lower = if is_root {
                    1
                } else {
                    self.config.min_node_references()
                };
                (lower..=self.config.max_node_references).contains(&n)
            }
            _ => self
                .partition_sizes(n, height, is_root, loading_factor)
                .is_some(),
        }
    }

    /// Height closest to the expected one at which `n` objects pack validly.
    fn choose_height(&self, n: usize, is_root: bool, loading_factor: f64) -> Option<usize> {
        let expected = self.expected_height(n, loading_factor);
        (expected..expected + 8)
            .chain((1..expected).rev())
            .find(|&h| self.fits(n, h, is_root, loading_factor))
    }

    /// Pack objects into a detached subtree of exactly `height` levels.
    fn build_subtree(
        &mut self,
        ids: Vec<ObjectId>,
        height: usize,
        is_root: bool,
        loading_factor: f64,
    ) -> Result<NodeId> {
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            entries.push((id, self.store.object(id)?.envelope()));
        }
        self.partition(&mut entries, height, is_root, loading_factor)
    }

    /// Sort by centre along the longest axis, cut into balanced groups and
    /// recurse until a group fits in one leaf.
    fn partition(
        &mut self,
        entries: &mut [(ObjectId, Envelope)],
        height: usize,
        is_root: bool,
        loading_factor: f64,
    ) -> Result<NodeId> {
        if height <= 1 {
            let leaf = self.store.create_node(TreeNode::leaf())?;
            for &(id, _) in entries.iter() {
                self.insert_in_leaf(leaf, id)?;
            }
            return Ok(leaf);
        }

        let sizes = self
            .partition_sizes(entries.len(), height, is_root, loading_factor)
            .ok_or(IndexError::HeightMismatch {
                expected: height,
                found: self.expected_height(entries.len(), loading_factor),
            })?;
        let Some(bounds) = entries.iter().map(|e| e.1).reduce(|a, b| a.union(&b)) else {
            return Err(IndexError::HeightMismatch {
                expected: height,
                found: 0,
            });
        };
        let axis = bounds.longest_axis();
        entries.sort_by(|a, b| a.1.centre(axis).total_cmp(&b.1.centre(axis)));

        let node = self.store.create_node(TreeNode::index())?;
        let mut start = 0;
        for size in sizes {
            let child = self.partition(
                &mut entries[start..start + size],
                height - 1,
                false,
                loading_factor,
            )?;
            self.attach_child(node, child)?;
            start += size;
        }
        Ok(node)
    }

    /// Detach the nodes `depth` levels below a packed root and delete
    /// everything above them.
    fn detach_slice(&mut self, root: NodeId, depth: usize) -> Result<Vec<NodeId>> {
        let mut upper = Vec::new();
        for level in 0..depth {
            upper.extend(self.nodes_at_depth(root, level)?);
        }
        let slice = self.nodes_at_depth(root, depth)?;
        for &node in &slice {
            if let Some(parent) = self.store.parent(node)? {
                self.store.remove_child(parent, node)?;
            }
        }
        for node in upper {
            self.store.delete_node(node)?;
        }
        Ok(slice)
    }

    /// Hang detached subtrees below `target`, or merge them into its
    /// children when tree merging is enabled.
    fn graft(
        &mut self,
        target: NodeId,
        subtrees: Vec<NodeId>,
        report: &mut BulkLoadReport,
    ) -> Result<()> {
        if self.config.should_merge_trees {
            self.merge_subtrees(target, subtrees, report)
        } else {
            for subtree in subtrees {
                self.insert_subtree(target, subtree)?;
            }
            Ok(())
        }
    }

    /// Attach one subtree and split `parent` if it overflows.
    fn insert_subtree(&mut self, parent: NodeId, subtree: NodeId) -> Result<()> {
        self.attach_child(parent, subtree)?;
        if self.entry_count(parent)? > self.config.max_node_references {
            self.split_and_adjust(parent)
        } else {
            self.adjust_path(parent)
        }
    }

    /// Greedily pair incoming subtrees with existing children of `parent`
    /// that overlap them by more than [`MERGE_OVERLAP_THRESHOLD`], highest
    /// overlap first, and fold each pair together. Unpaired subtrees are
    /// attached as new children.
    fn merge_subtrees(
        &mut self,
        parent: NodeId,
        incoming: Vec<NodeId>,
        report: &mut BulkLoadReport,
    ) -> Result<()> {
        self.monitor.before_merge_tree(parent, &incoming);
        let existing = self.store.node(parent)?.children().to_vec();

        let mut pairs = Vec::new();
        for &left in &existing {
            let left_env = self.envelope_of(left)?;
            for &right in &incoming {
                let overlap = left_env.overlap(&self.envelope_of(right)?);
                if overlap > MERGE_OVERLAP_THRESHOLD {
                    pairs.push((overlap, left, right));
                }
            }
        }
        // ascending, so the largest overlap pops first
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut absorbed = FxHashSet::default();
        while let Some((overlap, left, right)) = pairs.pop() {
            pairs.retain(|&(_, l, r)| l != left && r != right);
            absorbed.insert(right);
            log::debug!("merging subtree {right} into {left} (overlap {overlap:.3})");
            report.merged_subtrees += 1;
            self.merge_pair(left, right, report)?;
        }

        for subtree in incoming {
            if !absorbed.contains(&subtree) {
                self.insert_subtree(parent, subtree)?;
            }
        }
        self.monitor.after_merge_tree(parent);
        Ok(())
    }

    /// Fold subtree `right` into `left`; both have the same height.
    fn merge_pair(
        &mut self,
        left: NodeId,
        right: NodeId,
        report: &mut BulkLoadReport,
    ) -> Result<()> {
        if self.is_leaf(left)? != self.is_leaf(right)? {
            return Err(IndexError::HeightMismatch {
                expected: self.height_of(left)?,
                found: self.height_of(right)?,
            });
        }
        if self.is_leaf(right)? {
            let objects = self.store.take_references(right)?;
            self.store.delete_node(right)?;
            for object in objects {
                let changed = self.insert_in_leaf(left, object)?;
                if self.entry_count(left)? > self.config.max_node_references {
                    self.split_and_adjust(left)?;
                } else if changed {
                    self.adjust_path(left)?;
                }
            }
            Ok(())
        } else {
            let children = self.store.take_children(right)?;
            self.store.delete_node(right)?;
            self.merge_subtrees(left, children, report)
        }
    }
}
