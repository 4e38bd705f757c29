use geo::{Coord, Point, Rect};
use serde::{Deserialize, Serialize};

/// One of the two axes of the plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

/// Axis-aligned bounding rectangle.
///
/// Envelopes are immutable values: every combining operation returns a new
/// envelope. The constructor orders the corners, so `min_x <= max_x` and
/// `min_y <= max_y` always hold.
///
/// # Examples
///
/// ```
/// use reachtree_types::envelope::Envelope;
///
/// let env = Envelope::new(4.0, 3.0, 0.0, 0.0);
/// assert_eq!(env.min_x(), 0.0);
/// assert_eq!(env.area(), 12.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Envelope {
    /// Create an envelope from two opposite corners, in any order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Degenerate envelope covering a single point.
    pub fn from_point(x: f64, y: f64) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    pub fn from_rect(rect: &Rect<f64>) -> Self {
        let (min, max) = (rect.min(), rect.max());
        Self::new(min.x, min.y, max.x, max.y)
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_x,
                y: self.min_y,
            },
            Coord {
                x: self.max_x,
                y: self.max_y,
            },
        )
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Extent along the given axis.
    pub fn extent(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.width(),
            Axis::Y => self.height(),
        }
    }

    /// Centre coordinate along the given axis.
    pub fn centre(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => (self.min_x + self.max_x) / 2.0,
            Axis::Y => (self.min_y + self.max_y) / 2.0,
        }
    }

    /// The axis along which this envelope is widest. Ties favour `X`.
    pub fn longest_axis(&self) -> Axis {
        if self.height() > self.width() {
            Axis::Y
        } else {
            Axis::X
        }
    }

    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }

    /// True when the envelope has no area (a point or a line segment).
    pub fn is_degenerate(&self) -> bool {
        self.area() == 0.0
    }

    /// Smallest envelope covering both `self` and `other`.
    pub fn union(&self, other: &Envelope) -> Envelope {
        Envelope {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow this envelope to cover `other`.
    ///
    /// # Returns
    ///
    /// `true` if any bound moved.
    pub fn expand_to_include(&mut self, other: &Envelope) -> bool {
        let expanded = self.union(other);
        if expanded == *self {
            return false;
        }
        *self = expanded;
        true
    }

    /// Area added to `self` by covering `other` as well.
    pub fn enlargement(&self, other: &Envelope) -> f64 {
        self.union(other).area() - self.area()
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// True when `other` lies entirely inside `self` (boundaries included).
    pub fn contains(&self, other: &Envelope) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    pub fn contains_point(&self, point: &Point<f64>) -> bool {
        self.contains(&Envelope::from_point(point.x(), point.y()))
    }

    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        if !self.intersects(other) {
            return None;
        }
        Some(Envelope {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Fraction of the smaller envelope covered by the intersection of both.
    ///
    /// When the smaller envelope has no area the result is `1.0` if the two
    /// touch and `0.0` otherwise.
    pub fn overlap(&self, other: &Envelope) -> f64 {
        let Some(common) = self.intersection(other) else {
            return 0.0;
        };
        let smaller = self.area().min(other.area());
        if smaller == 0.0 {
            return 1.0;
        }
        common.area() / smaller
    }

    /// Area of the union of `self` and `other` covered by neither of them.
    pub fn dead_space(&self, other: &Envelope) -> f64 {
        let shared = self.intersection(other).map_or(0.0, |e| e.area());
        self.union(other).area() - self.area() - other.area() + shared
    }

    /// Envelope grown by `margin` on every side.
    pub fn buffered(&self, margin: f64) -> Envelope {
        Envelope {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    /// Euclidean distance from the closest point of this envelope to `point`.
    /// Zero when the point is inside.
    pub fn distance_to_point(&self, point: &Point<f64>) -> f64 {
        let dx = axis_gap(point.x(), point.x(), self.min_x, self.max_x);
        let dy = axis_gap(point.y(), point.y(), self.min_y, self.max_y);
        dx.hypot(dy)
    }

    /// Minimum Euclidean distance between any two points of the envelopes.
    pub fn distance(&self, other: &Envelope) -> f64 {
        let dx = axis_gap(self.min_x, self.max_x, other.min_x, other.max_x);
        let dy = axis_gap(self.min_y, self.max_y, other.min_y, other.max_y);
        dx.hypot(dy)
    }
}

impl From<Rect<f64>> for Envelope {
    fn from(rect: Rect<f64>) -> Self {
        Envelope::from_rect(&rect)
    }
}

impl From<Point<f64>> for Envelope {
    fn from(point: Point<f64>) -> Self {
        Envelope::from_point(point.x(), point.y())
    }
}

#[inline]
fn axis_gap(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> f64 {
    if a_max < b_min {
        b_min - a_max
    } else if b_max < a_min {
        a_min - b_max
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_orders_corners() {
        let env = Envelope::new(5.0, 7.0, 1.0, 2.0);
        assert_eq!(env.min_x(), 1.0);
        assert_eq!(env.min_y(), 2.0);
        assert_eq!(env.max_x(), 5.0);
        assert_eq!(env.max_y(), 7.0);
    }

    #[test]
    fn test_expand_reports_change() {
        let mut env = Envelope::new(0.0, 0.0, 1.0, 1.0);
        assert!(!env.expand_to_include(&Envelope::from_point(0.5, 0.5)));
        assert!(env.expand_to_include(&Envelope::from_point(2.0, 0.5)));
        assert_eq!(env, Envelope::new(0.0, 0.0, 2.0, 1.0));
    }

    #[test]
    fn test_dead_space() {
        let a = Envelope::new(0.0, 0.0, 1.0, 1.0);
        let b = Envelope::new(2.0, 2.0, 3.0, 3.0);
        // union 3x3 = 9, minus both unit squares
        assert_eq!(a.dead_space(&b), 7.0);

        let c = Envelope::new(0.0, 0.0, 2.0, 2.0);
        let d = Envelope::new(1.0, 1.0, 3.0, 3.0);
        assert_eq!(c.dead_space(&d), 9.0 - 4.0 - 4.0 + 1.0);
    }

    #[test]
    fn test_overlap_ratio() {
        let big = Envelope::new(0.0, 0.0, 10.0, 10.0);
        let small = Envelope::new(5.0, 5.0, 7.0, 7.0);
        assert_eq!(big.overlap(&small), 1.0);

        let half = Envelope::new(9.0, 0.0, 11.0, 2.0);
        assert!((big.overlap(&half) - 0.5).abs() < 1e-12);

        let far = Envelope::new(20.0, 20.0, 21.0, 21.0);
        assert_eq!(big.overlap(&far), 0.0);

        let point = Envelope::from_point(1.0, 1.0);
        assert_eq!(big.overlap(&point), 1.0);
    }

    #[test]
    fn test_distances() {
        let env = Envelope::new(0.0, 0.0, 2.0, 2.0);
        assert_eq!(env.distance_to_point(&Point::new(1.0, 1.0)), 0.0);
        assert_eq!(env.distance_to_point(&Point::new(5.0, 6.0)), 5.0);

        let other = Envelope::new(5.0, 6.0, 7.0, 8.0);
        assert_eq!(env.distance(&other), 5.0);
        assert_eq!(other.distance(&env), 5.0);
        assert_eq!(env.distance(&Envelope::new(1.0, 1.0, 3.0, 3.0)), 0.0);
    }

    #[test]
    fn test_longest_axis_and_centre() {
        let env = Envelope::new(0.0, 0.0, 2.0, 6.0);
        assert_eq!(env.longest_axis(), Axis::Y);
        assert_eq!(env.centre(Axis::Y), 3.0);
        assert_eq!(env.extent(Axis::X), 2.0);
    }

    #[test]
    fn test_rect_conversion() {
        let env = Envelope::new(-1.0, -2.0, 3.0, 4.0);
        assert_eq!(Envelope::from_rect(&env.to_rect()), env);
    }
}
