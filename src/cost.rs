//! Graph-spatial distance (GSD): the blended cost that steers subtree choice
//! and node splitting.

use crate::config::IndexConfig;

/// Cost parameters fixed for the lifetime of an index instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    alpha: f64,
    area_norm: f64,
    vertex_norm: f64,
    graph_only_coefficient: f64,
    area_tie_coefficient: f64,
    spatial_only: bool,
    graph_only: bool,
}

impl CostModel {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            alpha: config.alpha,
            area_norm: config.area_norm,
            vertex_norm: config.vertex_count_norm as f64,
            graph_only_coefficient: config.graph_only_coefficient,
            area_tie_coefficient: config.area_tie_coefficient,
            spatial_only: config.is_spatial_only(),
            graph_only: config.is_graph_only(),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Summaries are neither maintained nor consulted.
    pub fn is_spatial_only(&self) -> bool {
        self.spatial_only
    }

    pub fn is_graph_only(&self) -> bool {
        self.graph_only
    }

    /// `alpha * area / area_norm + (1 - alpha) * pn / vertex_norm`.
    pub fn gsd(&self, area: f64, pn_expansion: usize) -> f64 {
        self.alpha * (area / self.area_norm)
            + (1.0 - self.alpha) * (pn_expansion as f64 / self.vertex_norm)
    }

    /// Graph-only cost: summary growth with a minuscule area term so that
    /// equal growth still resolves deterministically.
    pub fn graph_only_cost(&self, area: f64, pn_expansion: usize) -> f64 {
        self.graph_only_coefficient * (area / self.area_norm)
            + pn_expansion as f64 / self.vertex_norm
    }

    /// Cost of growing a candidate by `area_enlargement` and `pn_expansion`.
    ///
    /// Spatial-only indexes compare raw area growth, graph-only indexes use
    /// [`CostModel::graph_only_cost`], everything else the blend.
    pub fn blended_cost(&self, area_enlargement: f64, pn_expansion: usize) -> f64 {
        if self.spatial_only {
            area_enlargement
        } else if self.graph_only {
            self.graph_only_cost(area_enlargement, pn_expansion)
        } else {
            self.gsd(area_enlargement, pn_expansion)
        }
    }

    /// Ranking of a leaf that already contains the new object.
    pub fn container_cost(&self, area: f64, pn_expansion: usize) -> f64 {
        self.area_tie_coefficient * area + pn_expansion as f64
    }

    /// Separation of two split seeds: spatial dead space blended with the
    /// summary growth measured in both directions.
    pub fn seed_separation(&self, dead_space: f64, pn_both_ways: usize) -> f64 {
        self.gsd(dead_space, pn_both_ways)
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::from_config(&IndexConfig::default())
    }
}
