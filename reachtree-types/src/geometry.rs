use crate::envelope::Envelope;
use geo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Geometry of an indexed object: a point or an axis-aligned rectangle.
///
/// # Examples
///
/// ```
/// use reachtree_types::geometry::Geometry;
/// use geo::Point;
///
/// let a = Geometry::point(0.0, 0.0);
/// let b = Geometry::rect(3.0, 4.0, 5.0, 6.0);
/// assert_eq!(a.distance(&b), 5.0);
/// assert_eq!(b.distance_to_point(&Point::new(4.0, 5.0)), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point<f64>),
    Rect(Rect<f64>),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Point::new(x, y))
    }

    /// Rectangle from two opposite corners, in any order.
    pub fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Geometry::Rect(Envelope::new(x1, y1, x2, y2).to_rect())
    }

    /// Tight envelope of the geometry.
    pub fn envelope(&self) -> Envelope {
        match self {
            Geometry::Point(p) => Envelope::from_point(p.x(), p.y()),
            Geometry::Rect(r) => Envelope::from_rect(r),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.envelope().is_finite()
    }

    /// Euclidean distance from the geometry to `point`; zero inside a rectangle.
    pub fn distance_to_point(&self, point: &Point<f64>) -> f64 {
        self.envelope().distance_to_point(point)
    }

    /// Minimum Euclidean distance between two geometries.
    pub fn distance(&self, other: &Geometry) -> f64 {
        self.envelope().distance(&other.envelope())
    }
}

impl From<Point<f64>> for Geometry {
    fn from(point: Point<f64>) -> Self {
        Geometry::Point(point)
    }
}

impl From<Rect<f64>> for Geometry {
    fn from(rect: Rect<f64>) -> Self {
        Geometry::Rect(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_envelope_is_degenerate() {
        let geometry = Geometry::point(1.5, -2.0);
        let env = geometry.envelope();
        assert!(env.is_degenerate());
        assert_eq!(env.min_x(), 1.5);
        assert_eq!(env.max_y(), -2.0);
    }

    #[test]
    fn test_rect_distance() {
        let a = Geometry::rect(0.0, 0.0, 1.0, 1.0);
        let b = Geometry::rect(4.0, 5.0, 6.0, 6.0);
        assert_eq!(a.distance(&b), 5.0);
    }

    #[test]
    fn test_non_finite_detected() {
        assert!(!Geometry::point(f64::NAN, 0.0).is_finite());
        assert!(Geometry::point(0.0, 0.0).is_finite());
    }
}
