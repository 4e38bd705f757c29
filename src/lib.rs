//! Graph-reachability-aware R-tree.
//!
//! Leaves of the tree carry path-neighbor summaries: for each label path
//! leading out of their objects, the graph vertices reachable along it.
//! Insertion, splitting and bulk loading weigh area growth against summary
//! growth, and range, kNN and join queries use the summaries to narrow or
//! skip graph-pattern verification.
//!
//! ```rust
//! use reachtree::prelude::*;
//!
//! let mut tree = ReachTree::new(IndexConfig::default().with_alpha(0.5))?;
//! let contribution = PathNeighbors::new().with_neighbors(PnKey::single(2), [100]);
//! tree.insert(
//!     SpatialObject::new(1, Geometry::point(0.0, 0.0))
//!         .with_label(1)
//!         .with_path_neighbors(contribution),
//! )?;
//!
//! let nearest = tree.nearest_neighbors(&Point::new(1.0, 1.0), 1)?;
//! assert_eq!(nearest[0].0, 1);
//! # Ok::<(), reachtree::IndexError>(())
//! ```

pub mod builder;
pub mod config;
pub mod cost;
pub mod error;
pub mod monitor;
pub mod object;
pub mod query;
pub mod store;
pub mod summary;
pub mod tree;

#[cfg(feature = "sync")]
pub mod sync;

pub use builder::ReachTreeBuilder;
pub use config::{IndexConfig, SplitMode};
pub use cost::CostModel;
pub use error::{IndexError, Result};
pub use monitor::{CountingMonitor, NullMonitor, SubtreeChoice, TreeMonitor};
pub use object::SpatialObject;
pub use query::{
    AlwaysMatch, Bindings, CostStats, JoinResult, KnnResult, PatternMatcher, QueryGraph,
    QueryPattern, QueryStats, RangeResult, ShrinkOutcome, ShrinkPlan, Verification,
    VertexBinding,
};
pub use store::{MemoryStore, NodeId, NodeKind, RelationKind, StoreStats, TreeNode, TreeStore};
pub use summary::{PathNeighbors, PnEntry, PnKey};
pub use tree::{BulkLoadReport, IndexStats, ReachTree};

#[cfg(feature = "sync")]
pub use sync::SyncReachTree;

pub use geo::Point;
pub use reachtree_types::envelope::{Axis, Envelope};
pub use reachtree_types::geometry::Geometry;
pub use reachtree_types::{Label, ObjectId, VertexId};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{IndexConfig, IndexError, ReachTree, ReachTreeBuilder, Result, SplitMode};

    pub use crate::{PathNeighbors, PnEntry, PnKey, SpatialObject};

    pub use crate::{AlwaysMatch, Bindings, PatternMatcher, QueryGraph, QueryPattern, VertexBinding};

    pub use crate::{Envelope, Geometry, Point};

    pub use crate::{CountingMonitor, TreeMonitor};

    #[cfg(feature = "sync")]
    pub use crate::SyncReachTree;
}
