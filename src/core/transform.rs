use crate::core::geo::Point;
use serde::{Deserialize, Serialize};

/// 2D affine transform stored as the six coefficients `[a, b, c, d, e, f]`
/// of the matrix
///
/// ```text
/// [ a c e ]
/// [ b d f ]
/// [ 0 0 1 ]
/// ```
///
/// so that `x' = a*x + c*y + e` and `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform([f64; 6]);

impl Transform {
    pub fn new(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    pub fn identity() -> Self {
        Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
    }

    /// Composes `translate(dx1, dy1) * scale(sx, sy) * rotate(angle) *
    /// translate(dx2, dy2)` into a single transform.
    ///
    /// This is the shape every per-frame transform in the renderer takes:
    /// move the origin to some anchor, scale/rotate around it, move back.
    pub fn compose(dx1: f64, dy1: f64, sx: f64, sy: f64, angle: f64, dx2: f64, dy2: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self([
            sx * cos,
            sy * sin,
            -sx * sin,
            sy * cos,
            dx2 * sx * cos - dy2 * sx * sin + dx1,
            dx2 * sy * sin + dy2 * sy * cos + dy1,
        ])
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// Applies the transform to a point
    pub fn apply(&self, point: Point) -> Point {
        let [a, b, c, d, e, f] = self.0;
        Point::new(a * point.x + c * point.y + e, b * point.x + d * point.y + f)
    }

    /// Multiplies with another transform: `self * other` applies `other` first
    pub fn multiply(&self, other: &Transform) -> Transform {
        let a = self.0;
        let b = other.0;
        Self([
            a[0] * b[0] + a[2] * b[1],
            a[1] * b[0] + a[3] * b[1],
            a[0] * b[2] + a[2] * b[3],
            a[1] * b[2] + a[3] * b[3],
            a[0] * b[4] + a[2] * b[5] + a[4],
            a[1] * b[4] + a[3] * b[5] + a[5],
        ])
    }

    pub fn determinant(&self) -> f64 {
        self.0[0] * self.0[3] - self.0[1] * self.0[2]
    }

    /// Returns the exact inverse.
    ///
    /// All transforms built by the renderer carry non-zero scale, so the
    /// determinant is never zero there; a degenerate transform is a
    /// programming error caught in debug builds.
    pub fn inverted(&self) -> Transform {
        let det = self.determinant();
        debug_assert!(det.abs() > f64::EPSILON, "non-invertible transform");
        let [a, b, c, d, e, f] = self.0;
        Self([
            d / det,
            -b / det,
            -c / det,
            a / det,
            (c * f - d * e) / det,
            (b * e - a * f) / det,
        ])
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point, b: Point) {
        assert!((a.x - b.x).abs() < 1e-9, "{:?} != {:?}", a, b);
        assert!((a.y - b.y).abs() < 1e-9, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_identity_apply() {
        let p = Point::new(3.5, -2.0);
        assert_close(Transform::identity().apply(p), p);
    }

    #[test]
    fn test_compose_scale_around_anchor() {
        // scale by 2 around (10, 10): the anchor stays put
        let t = Transform::compose(10.0, 10.0, 2.0, 2.0, 0.0, -10.0, -10.0);
        assert_close(t.apply(Point::new(10.0, 10.0)), Point::new(10.0, 10.0));
        assert_close(t.apply(Point::new(11.0, 10.0)), Point::new(12.0, 10.0));
    }

    #[test]
    fn test_compose_rotation() {
        let t = Transform::compose(0.0, 0.0, 1.0, 1.0, std::f64::consts::FRAC_PI_2, 0.0, 0.0);
        assert_close(t.apply(Point::new(1.0, 0.0)), Point::new(0.0, 1.0));
    }

    #[test]
    fn test_invert_round_trip() {
        let t = Transform::compose(12.0, -7.0, 1.3, 0.77, 0.4, -3.0, 5.0);
        let inverse = t.inverted();
        let p = Point::new(42.0, 17.0);
        assert_close(inverse.apply(t.apply(p)), p);
        assert_close(t.apply(inverse.apply(p)), p);
    }

    #[test]
    fn test_multiply_matches_sequential_apply() {
        let a = Transform::compose(1.0, 2.0, 2.0, 2.0, 0.0, 0.0, 0.0);
        let b = Transform::compose(0.0, 0.0, 1.0, 1.0, 0.3, -4.0, 9.0);
        let p = Point::new(-2.0, 6.5);
        assert_close(a.multiply(&b).apply(p), a.apply(b.apply(p)));
    }
}
