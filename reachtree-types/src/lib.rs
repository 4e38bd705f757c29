//! # reachtree-types
//!
//! Value types shared by the reachtree index and its callers.
//!
//! - **Envelopes**: [`envelope::Envelope`], the axis-aligned bounding rectangle
//!   every tree node and object carries
//! - **Geometries**: [`geometry::Geometry`], the point or rectangle stored for an
//!   indexed object
//! - **Identifiers**: [`ObjectId`], [`VertexId`] and [`Label`]
//!
//! All types are serializable with Serde and interoperate with the `geo`
//! crate's primitives.
//!
//! ## Examples
//!
//! ```rust
//! use reachtree_types::envelope::Envelope;
//!
//! let a = Envelope::new(0.0, 0.0, 2.0, 2.0);
//! let b = Envelope::new(1.0, 1.0, 3.0, 3.0);
//! assert_eq!(a.union(&b), Envelope::new(0.0, 0.0, 3.0, 3.0));
//! assert!(a.intersects(&b));
//! ```

pub mod envelope;
pub mod geometry;

/// Identifier of an indexed spatial object.
pub type ObjectId = u64;

/// Identifier of a graph vertex, as listed in path-neighbor summaries.
pub type VertexId = u64;

/// Numeric graph label.
pub type Label = u32;
