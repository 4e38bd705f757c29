//! Index configuration.
//!
//! Every tuning knob of an index instance lives in [`IndexConfig`], which is
//! threaded through maintenance and query code instead of global state, so
//! several indexes with different settings can coexist.

use crate::error::{IndexError, Result};
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Node split strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Quadratic seed picking and greedy assignment, blending path-neighbor
    /// growth into both steps when `alpha < 1`.
    #[default]
    Quadratic,
    /// Sort entries by centre along the longest axis and cut in half.
    Greene,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitMode::Quadratic => f.write_str("quadratic"),
            SplitMode::Greene => f.write_str("greene"),
        }
    }
}

impl FromStr for SplitMode {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quadratic" => Ok(SplitMode::Quadratic),
            "greene" | "greenes" => Ok(SplitMode::Greene),
            other => Err(IndexError::UnknownSplitMode(other.to_string())),
        }
    }
}

/// Index configuration
///
/// # Example
///
/// ```rust
/// use reachtree::{IndexConfig, SplitMode};
///
/// let config = IndexConfig::default()
///     .with_alpha(0.5)
///     .with_max_pn_size(64)
///     .with_split_mode(SplitMode::Greene);
/// assert!(config.validate().is_ok());
///
/// let json = r#"{ "alpha": 0.0, "max_node_references": 10 }"#;
/// let config = IndexConfig::from_json(json).unwrap();
/// assert_eq!(config.min_node_references(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Blend weight between spatial and graph cost (1 = spatial-only, 0 = graph-only)
    #[serde(default = "IndexConfig::default_alpha")]
    pub alpha: f64,

    /// Largest bounded summary entry; larger unions become ignored (None = unbounded)
    #[serde(default)]
    pub max_pn_size: Option<usize>,

    /// Fanout cap for every node
    #[serde(default = "IndexConfig::default_max_node_references")]
    pub max_node_references: usize,

    #[serde(default)]
    pub split_mode: SplitMode,

    /// Merge freshly built subtrees into overlapping siblings during bulk load
    #[serde(default)]
    pub should_merge_trees: bool,

    /// Target node fill for bulk loading, in [0.1, 1]
    #[serde(default = "IndexConfig::default_loading_factor")]
    pub loading_factor: f64,

    /// Normalisation constant for area terms
    #[serde(default = "IndexConfig::default_area_norm")]
    pub area_norm: f64,

    /// Normalisation constant for path-neighbor terms (total vertex count)
    #[serde(default = "IndexConfig::default_vertex_count_norm")]
    pub vertex_count_norm: u64,

    /// Spatial weight used in place of alpha when alpha is 0
    #[serde(default = "IndexConfig::default_tie_coefficient")]
    pub graph_only_coefficient: f64,

    /// Area weight when ranking containing leaves by summary growth
    #[serde(default = "IndexConfig::default_tie_coefficient")]
    pub area_tie_coefficient: f64,

    /// Alpha within this distance of 0 or 1 counts as graph-only or spatial-only
    #[serde(default = "IndexConfig::default_blend_threshold")]
    pub blend_threshold: f64,

    /// Hop radius used when shrinking neighbor lists during queries
    #[serde(default = "IndexConfig::default_max_hop_num")]
    pub max_hop_num: usize,

    /// Prune a leaf whose summary has no entry for a required label path
    #[serde(default = "IndexConfig::default_prune_missing_paths")]
    pub prune_missing_paths: bool,

    /// Margin added around zero-area query rectangles
    #[serde(default = "IndexConfig::default_degenerate_epsilon")]
    pub degenerate_epsilon: f64,
}

impl IndexConfig {
    pub const MIN_NODE_REFERENCES_LIMIT: usize = 10;
    pub const MAX_NODE_REFERENCES_LIMIT: usize = 1_000_000;

    const fn default_alpha() -> f64 {
        1.0
    }

    const fn default_max_node_references() -> usize {
        100
    }

    const fn default_loading_factor() -> f64 {
        0.7
    }

    const fn default_area_norm() -> f64 {
        // 360 * 180 degrees
        64_800.0
    }

    const fn default_vertex_count_norm() -> u64 {
        1
    }

    const fn default_tie_coefficient() -> f64 {
        1e-12
    }

    const fn default_blend_threshold() -> f64 {
        1e-8
    }

    const fn default_max_hop_num() -> usize {
        2
    }

    const fn default_prune_missing_paths() -> bool {
        true
    }

    const fn default_degenerate_epsilon() -> f64 {
        1e-9
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_pn_size(mut self, cap: usize) -> Self {
        self.max_pn_size = Some(cap);
        self
    }

    pub fn with_max_node_references(mut self, max: usize) -> Self {
        self.max_node_references = max;
        self
    }

    pub fn with_split_mode(mut self, mode: SplitMode) -> Self {
        self.split_mode = mode;
        self
    }

    pub fn with_merge_trees(mut self, enabled: bool) -> Self {
        self.should_merge_trees = enabled;
        self
    }

    pub fn with_loading_factor(mut self, factor: f64) -> Self {
        self.loading_factor = factor;
        self
    }

    pub fn with_area_norm(mut self, norm: f64) -> Self {
        self.area_norm = norm;
        self
    }

    pub fn with_vertex_count_norm(mut self, count: u64) -> Self {
        self.vertex_count_norm = count;
        self
    }

    pub fn with_max_hop_num(mut self, hops: usize) -> Self {
        self.max_hop_num = hops;
        self
    }

    pub fn with_prune_missing_paths(mut self, prune: bool) -> Self {
        self.prune_missing_paths = prune;
        self
    }

    /// Lower fanout bound for non-root nodes.
    pub fn min_node_references(&self) -> usize {
        self.max_node_references / 2
    }

    /// Cap applied to bounded summary entries; unbounded maps to `usize::MAX`.
    pub fn pn_cap(&self) -> usize {
        self.max_pn_size.unwrap_or(usize::MAX)
    }

    /// True when alpha is close enough to 1 that summaries are not maintained.
    pub fn is_spatial_only(&self) -> bool {
        self.alpha >= 1.0 - self.blend_threshold
    }

    /// True when alpha is close enough to 0 that only summary growth counts.
    pub fn is_graph_only(&self) -> bool {
        self.alpha <= self.blend_threshold
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(IndexError::InvalidConfig(format!(
                "alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }

        if !(Self::MIN_NODE_REFERENCES_LIMIT..=Self::MAX_NODE_REFERENCES_LIMIT)
            .contains(&self.max_node_references)
        {
            return Err(IndexError::InvalidConfig(format!(
                "max_node_references must be within [{}, {}], got {}",
                Self::MIN_NODE_REFERENCES_LIMIT,
                Self::MAX_NODE_REFERENCES_LIMIT,
                self.max_node_references
            )));
        }

        if self.max_pn_size == Some(0) {
            return Err(IndexError::InvalidConfig(
                "max_pn_size must be greater than zero".to_string(),
            ));
        }

        if !(0.1..=1.0).contains(&self.loading_factor) {
            return Err(IndexError::InvalidConfig(format!(
                "loading_factor must be within [0.1, 1], got {}",
                self.loading_factor
            )));
        }

        if !(self.area_norm.is_finite() && self.area_norm > 0.0) {
            return Err(IndexError::InvalidConfig(
                "area_norm must be positive and finite".to_string(),
            ));
        }

        if self.vertex_count_norm == 0 {
            return Err(IndexError::InvalidConfig(
                "vertex_count_norm must be greater than zero".to_string(),
            ));
        }

        for (name, value) in [
            ("graph_only_coefficient", self.graph_only_coefficient),
            ("area_tie_coefficient", self.area_tie_coefficient),
            ("blend_threshold", self.blend_threshold),
            ("degenerate_epsilon", self.degenerate_epsilon),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(IndexError::InvalidConfig(format!(
                    "{name} must be non-negative and finite, got {value}"
                )));
            }
        }

        if self.max_hop_num > 16 {
            log::warn!(
                "max_hop_num of {} makes query shrinking expensive; summaries rarely carry paths this long",
                self.max_hop_num
            );
        }

        Ok(())
    }

    /// Set a single option from its textual form.
    ///
    /// Accepts the serialized key names (`alpha`, `max_pn_size`,
    /// `max_node_references`, `split_mode`, ...) and rejects anything else.
    /// `max_pn_size` accepts `none` or a negative number for "unbounded".
    /// The updated configuration is validated before it is kept.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        let value = value.trim();
        match key {
            "alpha" => next.alpha = parse_value(key, value)?,
            "max_pn_size" => {
                next.max_pn_size = if value.eq_ignore_ascii_case("none") || value.starts_with('-')
                {
                    None
                } else {
                    Some(parse_value(key, value)?)
                }
            }
            "max_node_references" => next.max_node_references = parse_value(key, value)?,
            "split_mode" => next.split_mode = value.parse()?,
            "should_merge_trees" => next.should_merge_trees = parse_value(key, value)?,
            "loading_factor" => next.loading_factor = parse_value(key, value)?,
            "area_norm" => next.area_norm = parse_value(key, value)?,
            "vertex_count_norm" => next.vertex_count_norm = parse_value(key, value)?,
            "graph_only_coefficient" => next.graph_only_coefficient = parse_value(key, value)?,
            "area_tie_coefficient" => next.area_tie_coefficient = parse_value(key, value)?,
            "blend_threshold" => next.blend_threshold = parse_value(key, value)?,
            "max_hop_num" => next.max_hop_num = parse_value(key, value)?,
            "prune_missing_paths" => next.prune_missing_paths = parse_value(key, value)?,
            "degenerate_epsilon" => next.degenerate_epsilon = parse_value(key, value)?,
            other => return Err(IndexError::UnknownConfigKey(other.to_string())),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Apply a batch of key/value options, stopping at the first rejection.
    pub fn apply_all<'a, I>(&mut self, options: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in options {
            self.apply(key, value)?;
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: IndexConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: IndexConfig = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            alpha: Self::default_alpha(),
            max_pn_size: None,
            max_node_references: Self::default_max_node_references(),
            split_mode: SplitMode::default(),
            should_merge_trees: false,
            loading_factor: Self::default_loading_factor(),
            area_norm: Self::default_area_norm(),
            vertex_count_norm: Self::default_vertex_count_norm(),
            graph_only_coefficient: Self::default_tie_coefficient(),
            area_tie_coefficient: Self::default_tie_coefficient(),
            blend_threshold: Self::default_blend_threshold(),
            max_hop_num: Self::default_max_hop_num(),
            prune_missing_paths: Self::default_prune_missing_paths(),
            degenerate_epsilon: Self::default_degenerate_epsilon(),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| IndexError::InvalidConfig(format!("cannot parse {key} from {value:?}")))
}
