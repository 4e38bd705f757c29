//! Index builder for flexible configuration
//!
//! Collects configuration (typed or as key/value strings), an optional store
//! capacity hint and an optional initial batch, and produces a ready
//! [`ReachTree`]. The initial batch is bulk loaded.

use crate::config::IndexConfig;
use crate::error::Result;
use crate::monitor::{NullMonitor, TreeMonitor};
use crate::object::SpatialObject;
use crate::store::MemoryStore;
use crate::tree::ReachTree;

/// Builder for in-memory indexes.
#[derive(Debug)]
pub struct ReachTreeBuilder {
    config: IndexConfig,
    options: Vec<(String, String)>,
    capacity: Option<usize>,
    objects: Vec<SpatialObject>,
}

impl ReachTreeBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: IndexConfig::default(),
            options: Vec::new(),
            capacity: None,
            objects: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Set one option by name, as accepted by [`IndexConfig::apply`].
    /// Options are applied in order at build time, after `config`.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// Reserve room for this many objects.
    pub fn capacity(mut self, objects: usize) -> Self {
        self.capacity = Some(objects);
        self
    }

    /// Objects to bulk load into the new index.
    pub fn objects(mut self, objects: impl IntoIterator<Item = SpatialObject>) -> Self {
        self.objects.extend(objects);
        self
    }

    /// Build the index, validating the configuration and loading the
    /// initial objects.
    pub fn build(self) -> Result<ReachTree> {
        self.build_with_monitor(NullMonitor)
    }

    pub fn build_with_monitor<M: TreeMonitor>(self, monitor: M) -> Result<ReachTree<MemoryStore, M>> {
        let mut config = self.config;
        config.apply_all(self.options.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

        let store = match self.capacity {
            Some(objects) => MemoryStore::with_capacity(objects),
            None => MemoryStore::new(),
        };
        let mut tree = ReachTree::with_parts(store, config, monitor)?;
        if !self.objects.is_empty() {
            tree.bulk_load(self.objects)?;
        }
        Ok(tree)
    }
}

impl Default for ReachTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
