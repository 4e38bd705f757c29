//! Objects stored in the index.

use crate::summary::PathNeighbors;
use reachtree_types::envelope::Envelope;
use reachtree_types::geometry::Geometry;
use reachtree_types::{Label, ObjectId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A spatial object: an id, its geometry, its graph labels and the one-hop
/// path-neighbor contribution supplied by the caller.
///
/// ```
/// use reachtree::{PathNeighbors, PnKey, SpatialObject};
/// use reachtree_types::geometry::Geometry;
///
/// let object = SpatialObject::new(7, Geometry::point(1.0, 2.0))
///     .with_label(3)
///     .with_path_neighbors(PathNeighbors::new().with_neighbors(PnKey::single(1), [10, 11]));
/// assert!(object.has_label(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialObject {
    pub id: ObjectId,
    pub geometry: Geometry,
    #[serde(default)]
    pub labels: SmallVec<[Label; 2]>,
    #[serde(default)]
    pub path_neighbors: PathNeighbors,
}

impl SpatialObject {
    pub fn new(id: ObjectId, geometry: Geometry) -> Self {
        Self {
            id,
            geometry,
            labels: SmallVec::new(),
            path_neighbors: PathNeighbors::new(),
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        if !self.labels.contains(&label) {
            self.labels.push(label);
        }
        self
    }

    pub fn with_path_neighbors(mut self, summary: PathNeighbors) -> Self {
        self.path_neighbors = summary;
        self
    }

    pub fn envelope(&self) -> Envelope {
        self.geometry.envelope()
    }

    pub fn has_label(&self, label: Label) -> bool {
        self.labels.contains(&label)
    }
}
