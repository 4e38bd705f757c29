//! Instrumentation hooks for tree maintenance.
//!
//! A [`TreeMonitor`] is handed to the index at construction and receives a
//! callback for every maintenance decision worth counting. The default
//! [`NullMonitor`] ignores them all.

use crate::store::NodeId;
use std::collections::BTreeMap;

/// How choose-subtree settled on a child at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtreeChoice {
    /// One or more children already contained the object.
    Container { candidates: usize },
    /// No child contained the object; the cheapest enlargement won.
    Enlargement {
        /// Several children shared the lowest cost and area decided.
        tied: bool,
        /// The blended choice differs from the pure area-growth choice.
        diverged: bool,
    },
}

pub trait TreeMonitor: Send + Sync {
    /// A named maintenance case was taken (bulk-load branches, fallbacks).
    fn add_case(&mut self, _case: &str) {}

    /// `node` was split and `sibling` created.
    fn add_split(&mut self, _node: NodeId, _sibling: NodeId) {}

    /// A leaf summary was rebuilt from its members.
    fn add_summary_rebuilt(&mut self, _leaf: NodeId) {}

    fn on_subtree_choice(&mut self, _choice: SubtreeChoice) {}

    fn before_merge_tree(&mut self, _target: NodeId, _incoming: &[NodeId]) {}

    fn after_merge_tree(&mut self, _target: NodeId) {}
}

/// Monitor that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl TreeMonitor for NullMonitor {}

/// Monitor that counts events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountingMonitor {
    cases: BTreeMap<String, u64>,
    splits: u64,
    summaries_rebuilt: u64,
    container_choices: u64,
    enlargement_choices: u64,
    tied_choices: u64,
    diverged_choices: u64,
    merges: u64,
    merge_depth: usize,
    max_merge_depth: usize,
}

impl CountingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_count(&self, case: &str) -> u64 {
        self.cases.get(case).copied().unwrap_or(0)
    }

    pub fn cases(&self) -> &BTreeMap<String, u64> {
        &self.cases
    }

    pub fn splits(&self) -> u64 {
        self.splits
    }

    pub fn summaries_rebuilt(&self) -> u64 {
        self.summaries_rebuilt
    }

    pub fn container_choices(&self) -> u64 {
        self.container_choices
    }

    pub fn enlargement_choices(&self) -> u64 {
        self.enlargement_choices
    }

    pub fn tied_choices(&self) -> u64 {
        self.tied_choices
    }

    /// Choices where summary growth overruled the smallest area growth.
    pub fn diverged_choices(&self) -> u64 {
        self.diverged_choices
    }

    pub fn merges(&self) -> u64 {
        self.merges
    }

    pub fn max_merge_depth(&self) -> usize {
        self.max_merge_depth
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl TreeMonitor for CountingMonitor {
    fn add_case(&mut self, case: &str) {
        *self.cases.entry(case.to_string()).or_default() += 1;
    }

    fn add_split(&mut self, _node: NodeId, _sibling: NodeId) {
        self.splits += 1;
    }

    fn add_summary_rebuilt(&mut self, _leaf: NodeId) {
        self.summaries_rebuilt += 1;
    }

    fn on_subtree_choice(&mut self, choice: SubtreeChoice) {
        match choice {
            SubtreeChoice::Container { .. } => self.container_choices += 1,
            SubtreeChoice::Enlargement { tied, diverged } => {
                self.enlargement_choices += 1;
                self.tied_choices += u64::from(tied);
                self.diverged_choices += u64::from(diverged);
            }
        }
    }

    fn before_merge_tree(&mut self, _target: NodeId, _incoming: &[NodeId]) {
        self.merges += 1;
        self.merge_depth += 1;
        self.max_merge_depth = self.max_merge_depth.max(self.merge_depth);
    }

    fn after_merge_tree(&mut self, _target: NodeId) {
        self.merge_depth = self.merge_depth.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_monitor() {
        let mut monitor = CountingMonitor::new();
        monitor.add_case("small cluster");
        monitor.add_case("small cluster");
        monitor.add_split(NodeId::new(1), NodeId::new(2));
        monitor.on_subtree_choice(SubtreeChoice::Container { candidates: 2 });
        monitor.on_subtree_choice(SubtreeChoice::Enlargement {
            tied: true,
            diverged: false,
        });

        assert_eq!(monitor.case_count("small cluster"), 2);
        assert_eq!(monitor.case_count("missing"), 0);
        assert_eq!(monitor.splits(), 1);
        assert_eq!(monitor.container_choices(), 1);
        assert_eq!(monitor.enlargement_choices(), 1);
        assert_eq!(monitor.tied_choices(), 1);
        assert_eq!(monitor.diverged_choices(), 0);

        monitor.reset();
        assert_eq!(monitor, CountingMonitor::default());
    }

    #[test]
    fn test_merge_depth_tracking() {
        let mut monitor = CountingMonitor::new();
        let (a, b) = (NodeId::new(1), NodeId::new(2));
        monitor.before_merge_tree(a, &[b]);
        monitor.before_merge_tree(b, &[]);
        monitor.after_merge_tree(b);
        monitor.after_merge_tree(a);
        assert_eq!(monitor.merges(), 2);
        assert_eq!(monitor.max_merge_depth(), 2);
    }
}
