//! Axis-aligned regions of N-dimensional space.

use nalgebra::{Point, SVector};

use crate::Float;
use crate::Octant;

/// An axis-aligned box, the volume owned by one tree node.
///
/// Similar to [`parry3d`'s `Aabb`], except generic over the scalar type and
/// the dimension. The invariant `mins ≤ maxs` per axis is a caller
/// obligation; it is not enforced here.
///
/// [`parry3d`'s `Aabb`]: https://docs.rs/parry3d
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region<R: Float, const N: usize> {
    pub mins: Point<R, N>,
    pub maxs: Point<R, N>,
}

impl<R: Float, const N: usize> Region<R, N> {
    #[inline]
    pub fn new(mins: Point<R, N>, maxs: Point<R, N>) -> Self {
        Self { mins, maxs }
    }

    /// Determine whether `p` lies within `self`; faces are included.
    #[inline]
    pub fn contains(&self, p: &Point<R, N>) -> bool {
        (0..N).all(|a| p[a] >= self.mins[a] && p[a] <= self.maxs[a])
    }

    /// Determine the center of `self`.
    #[inline]
    pub fn center(&self) -> Point<R, N> {
        Point::from(SVector::<R, N>::from_fn(|a, _| {
            (self.mins[a] + self.maxs[a]) / R::TWO
        }))
    }

    /// The extent of `self` along one axis.
    #[inline]
    pub fn extent(&self, axis: usize) -> R {
        self.maxs[axis] - self.mins[axis]
    }

    /// The extent of `self` along the first axis. Trees built from cubical
    /// roots keep their nodes cubical, so this is *the* edge length.
    #[inline]
    pub fn edge_length(&self) -> R {
        self.extent(0)
    }

    /// Construct the `index`th of the 2^N half-extent children of `self`.
    /// Bit `N-1-a` of `index` selects the upper half along axis `a`, so for
    /// N = 3 the index is an [`Octant`] child array index.
    ///
    /// # Panics
    /// * `index` ∉ 0..2^N (debug builds)
    pub fn child(&self, index: usize) -> Self {
        debug_assert!(index < (1 << N), "child index out of range: {index}");
        let c = self.center();
        let mut mins = self.mins;
        let mut maxs = c;
        for a in 0..N {
            if (index >> (N - 1 - a)) & 1 == 1 {
                mins[a] = c[a];
                maxs[a] = self.maxs[a];
            }
        }
        Self { mins, maxs }
    }

    /// The index of the child of `self` whose volume holds `p`, by per-axis
    /// comparison against the center. Points exactly on a center plane
    /// resolve to the upper child.
    pub fn child_containing(&self, p: &Point<R, N>) -> usize {
        let c = self.center();
        let mut index = 0usize;
        for a in 0..N {
            index <<= 1;
            if p[a] >= c[a] {
                index |= 1;
            }
        }
        index
    }

    /// World position of the stencil sample with per-axis `digits` on an
    /// `m`-samples-per-axis grid spanning `self`.
    pub fn sample_position(&self, digits: &[usize; N], m: usize) -> Point<R, N> {
        Point::from(SVector::<R, N>::from_fn(|a, _| {
            self.mins[a] + self.extent(a) * R::of_usize(digits[a]) / R::of_usize(m - 1)
        }))
    }
}

impl<R: Float> Region<R, 3> {
    /// Construct the child region for an [`Octant`].
    #[inline]
    pub fn child_octant(&self, oct: Octant) -> Self {
        self.child(oct.index())
    }
}
