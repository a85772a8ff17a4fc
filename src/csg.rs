//! Composable constructive-solid-geometry membership predicates.
//!
//! A [`Csg`] value answers one question: is a point inside the solid? Leaves
//! ([`Cuboid`], [`Sphere`]) answer it directly; combinators ([`Union`],
//! [`Subtract`], [`Intersect`]) combine the answers of the two operands they
//! own. Evaluation is pure, and the plain floating-point sign tests are *not*
//! robust predicates: points on a face may classify either way.

use nalgebra::Point;

use crate::Float;

/// Capability trait for CSG membership tests.
///
/// `Send + Sync` is a supertrait because [`SpaceTree`](crate::space::SpaceTree)
/// evaluates the predicate from parallel construction tasks; implementations
/// must be reentrant, which for a pure `&self` method the bounds enforce.
pub trait Csg<R: Float, const N: usize>: Send + Sync {
    /// Membership test. Must be pure: no interior mutability, no observable
    /// side effects.
    fn is_inside(&self, p: &Point<R, N>) -> bool;
}

/// An axis-aligned box spanned by two corner points, in either order.
#[derive(Debug, Clone)]
pub struct Cuboid<R: Float, const N: usize> {
    a: Point<R, N>,
    b: Point<R, N>,
}

impl<R: Float, const N: usize> Cuboid<R, N> {
    pub fn new(a: Point<R, N>, b: Point<R, N>) -> Self {
        Self { a, b }
    }
}

impl<R: Float, const N: usize> Csg<R, N> for Cuboid<R, N> {
    /// True iff, on every axis, `p` lies strictly between the two corners
    /// (sign-agreement test; corner order does not matter).
    fn is_inside(&self, p: &Point<R, N>) -> bool {
        (0..N).all(|axis| (p[axis] - self.a[axis]) * (self.b[axis] - p[axis]) > R::ZERO)
    }
}

/// A solid ball; the bounding sphere itself is included.
#[derive(Debug, Clone)]
pub struct Sphere<R: Float, const N: usize> {
    center: Point<R, N>,
    radius: R,
}

impl<R: Float, const N: usize> Sphere<R, N> {
    pub fn new(center: Point<R, N>, radius: R) -> Self {
        Self { center, radius }
    }
}

impl<R: Float, const N: usize> Csg<R, N> for Sphere<R, N> {
    fn is_inside(&self, p: &Point<R, N>) -> bool {
        let mut d2 = R::ZERO;
        for axis in 0..N {
            let d = p[axis] - self.center[axis];
            d2 += d * d;
        }
        d2 <= self.radius * self.radius
    }
}

/// `left ∨ right`. Owns both operands.
pub struct Union<R: Float, const N: usize> {
    left: Box<dyn Csg<R, N>>,
    right: Box<dyn Csg<R, N>>,
}

impl<R: Float, const N: usize> Union<R, N> {
    pub fn new(left: impl Csg<R, N> + 'static, right: impl Csg<R, N> + 'static) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl<R: Float, const N: usize> Csg<R, N> for Union<R, N> {
    fn is_inside(&self, p: &Point<R, N>) -> bool {
        self.left.is_inside(p) || self.right.is_inside(p)
    }
}

/// `left ∧ ¬right`. Owns both operands.
pub struct Subtract<R: Float, const N: usize> {
    left: Box<dyn Csg<R, N>>,
    right: Box<dyn Csg<R, N>>,
}

impl<R: Float, const N: usize> Subtract<R, N> {
    pub fn new(left: impl Csg<R, N> + 'static, right: impl Csg<R, N> + 'static) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl<R: Float, const N: usize> Csg<R, N> for Subtract<R, N> {
    fn is_inside(&self, p: &Point<R, N>) -> bool {
        self.left.is_inside(p) && !self.right.is_inside(p)
    }
}

/// `left ∧ right`. Owns both operands.
pub struct Intersect<R: Float, const N: usize> {
    left: Box<dyn Csg<R, N>>,
    right: Box<dyn Csg<R, N>>,
}

impl<R: Float, const N: usize> Intersect<R, N> {
    pub fn new(left: impl Csg<R, N> + 'static, right: impl Csg<R, N> + 'static) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl<R: Float, const N: usize> Csg<R, N> for Intersect<R, N> {
    fn is_inside(&self, p: &Point<R, N>) -> bool {
        self.left.is_inside(p) && self.right.is_inside(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::point;

    fn unit_sphere() -> Sphere<f64, 3> {
        Sphere::new(point![0.0, 0.0, 0.0], 1.0)
    }

    #[test]
    fn cuboid_strict_interior() {
        let c = Cuboid::new(point![0.0_f64, 0.0, 0.0], point![1.0, 1.0, 1.0]);
        assert!(c.is_inside(&point![0.5, 0.5, 0.5]));
        // a face point is not strictly between the corners
        assert!(!c.is_inside(&point![0.0, 0.5, 0.5]));
        // outside on a single axis is enough
        assert!(!c.is_inside(&point![0.5, 0.5, 1.5]));
        assert!(!c.is_inside(&point![-0.5, 0.5, 0.5]));
    }

    #[test]
    fn cuboid_corner_order_agnostic() {
        let fwd = Cuboid::new(point![0.0_f64, 0.0, 0.0], point![1.0, 1.0, 1.0]);
        let rev = Cuboid::new(point![1.0_f64, 1.0, 1.0], point![0.0, 0.0, 0.0]);
        let p = point![0.25, 0.75, 0.5];
        assert_eq!(fwd.is_inside(&p), rev.is_inside(&p));
        assert!(rev.is_inside(&p));
    }

    #[test]
    fn sphere_includes_surface() {
        let s = unit_sphere();
        assert!(s.is_inside(&point![0.0, 0.0, 0.0]));
        assert!(s.is_inside(&point![1.0, 0.0, 0.0]));
        assert!(!s.is_inside(&point![1.0, 1.0, 1.0]));
    }

    /// Predicates with a fixed answer at the probe point, for truth tables.
    fn fixed(inside: bool) -> Sphere<f64, 3> {
        let radius = if inside { 1.0 } else { 0.5 };
        Sphere::new(point![2.0, 0.0, 0.0], radius)
    }

    #[test]
    fn combinator_truth_tables() {
        let p = point![1.0, 0.0, 0.0];
        for l in [false, true] {
            for r in [false, true] {
                assert_eq!(Union::new(fixed(l), fixed(r)).is_inside(&p), l || r);
                assert_eq!(Subtract::new(fixed(l), fixed(r)).is_inside(&p), l && !r);
                assert_eq!(Intersect::new(fixed(l), fixed(r)).is_inside(&p), l && r);
            }
        }
    }
}
