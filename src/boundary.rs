//! Adaptive boundary classification of a CSG predicate.
//!
//! A [`BoundaryOctree`] samples its predicate on a 3×3×3 stencil per node and
//! recursively splits every node whose stencil is not uniformly inside or
//! outside the solid, so that refinement concentrates on the surface.

use nalgebra::Point3;
use tracing::debug;

use crate::csg::Csg;
use crate::spatial::Region;
use crate::stencil::{corner_share, Stencil};
use crate::{Float, NodeIndex, Octant};

/// One node of a [`BoundaryOctree`]: a region, its stencil samples, and up to
/// 8 children.
#[derive(Debug, Clone)]
pub struct BoundaryNode<R: Float> {
    bounds: Region<R, 3>,
    level: u32,
    parent: NodeIndex,
    children: Option<[NodeIndex; 8]>,
    samples: Stencil,
}

impl<R: Float> BoundaryNode<R> {
    /// The region this node spans.
    #[inline]
    pub fn bounds(&self) -> &Region<R, 3> {
        &self.bounds
    }

    /// Subdivision depth; the root is 0.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Arena index of the parent; the root is its own parent.
    #[inline]
    pub fn parent(&self) -> NodeIndex {
        self.parent
    }

    /// The stencil samples; read-only, also for rendering consumers.
    #[inline]
    pub fn samples(&self) -> &Stencil {
        &self.samples
    }

    #[inline]
    pub fn center(&self) -> Point3<R> {
        self.bounds.center()
    }

    #[inline]
    pub fn edge_length(&self) -> R {
        self.bounds.edge_length()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Child node indices, if this node has been subdivided.
    #[inline]
    pub fn children(&self) -> Option<&[NodeIndex; 8]> {
        self.children.as_ref()
    }
}

/// An adaptive octree classifying the boundary of a CSG predicate.
///
/// The tree owns its predicate; every node shares it. Nodes live in an arena
/// and are addressed by [`NodeIndex`], so child links never dangle and a
/// partially built tree is always droppable.
pub struct BoundaryOctree<R: Float> {
    nodes: Vec<Option<BoundaryNode<R>>>,
    geometry: Box<dyn Csg<R, 3>>,
    root: NodeIndex,
}

impl<R: Float> BoundaryOctree<R> {
    /// Construct a tree over `bounds`. The root starts unevaluated; `divide`
    /// evaluates it, or call [`evaluate_all`](Self::evaluate_all) directly.
    pub fn new(bounds: Region<R, 3>, geometry: impl Csg<R, 3> + 'static) -> Self {
        Self {
            nodes: vec![Some(BoundaryNode {
                bounds,
                level: 0,
                parent: 0,
                children: None,
                samples: Stencil::default(),
            })],
            geometry: Box::new(geometry),
            root: 0,
        }
    }

    /// Index of the root node.
    #[inline]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// The node at `index`, if that slot is occupied.
    pub fn node(&self, index: NodeIndex) -> Option<&BoundaryNode<R>> {
        self.nodes.get(index as usize)?.as_ref()
    }

    fn node_unchecked(&self, index: NodeIndex) -> &BoundaryNode<R> {
        self.nodes[index as usize].as_ref().unwrap()
    }

    /// Number of materialized nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Unconditionally evaluate all 27 root samples. Used once, at the root;
    /// children evaluate during construction. Idempotent: the predicate is
    /// pure, so re-evaluating an unmodified tree yields identical samples.
    pub fn evaluate_all(&mut self) {
        let root = self.root as usize;
        let bounds = self.nodes[root].as_ref().unwrap().bounds;
        let mut samples = Stencil::default();
        for k in 0..Stencil::LEN {
            let p = bounds.sample_position(&Stencil::digits_of(k), 3);
            samples.set(k, self.geometry.is_inside(&p));
        }
        self.nodes[root].as_mut().unwrap().samples = samples;
    }

    /// Construct the 8 children of `target`, reusing the parent's corner
    /// samples and evaluating the other 19 per child. The child array is
    /// installed only after every child exists, so the node is never left
    /// half-subdivided.
    fn subdivide(&mut self, target: NodeIndex) -> [NodeIndex; 8] {
        let parent = self.node_unchecked(target).clone();
        let mut children = [0 as NodeIndex; 8];
        for oct in Octant::all() {
            let bounds = parent.bounds.child_octant(oct);
            let mut samples = Stencil::default();
            let shared = corner_share(oct);
            for &(child_idx, parent_idx) in shared {
                samples.set(child_idx, parent.samples.get(parent_idx));
            }
            for k in 0..Stencil::LEN {
                let d = Stencil::digits_of(k);
                if d.iter().all(|&di| di % 2 == 0) {
                    continue; // copied from the parent above
                }
                let p = bounds.sample_position(&d, 3);
                samples.set(k, self.geometry.is_inside(&p));
            }
            let index = self.nodes.len() as NodeIndex;
            self.nodes.push(Some(BoundaryNode {
                bounds,
                level: parent.level + 1,
                parent: target,
                children: None,
                samples,
            }));
            children[oct.index()] = index;
        }
        self.nodes[target as usize].as_mut().unwrap().children = Some(children);
        children
    }

    /// Refine the tree: every node below `min_level` is split
    /// unconditionally, and boundary nodes keep splitting until `max_level`.
    pub fn divide(&mut self, min_level: u32, max_level: u32) {
        self.evaluate_all();
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = self.node_unchecked(index);
            let (level, boundary, existing) = (node.level, node.samples.is_boundary(), node.children);
            if level >= max_level {
                continue;
            }
            if level < min_level || boundary {
                let children = match existing {
                    Some(children) => children,
                    None => self.subdivide(index),
                };
                stack.extend_from_slice(&children);
            }
        }
        debug!(
            nodes = self.node_count(),
            min_level, max_level, "divided boundary octree"
        );
    }

    /// World coordinates of every sample flagged inside, collected from the
    /// leaves.
    pub fn interior_points(&self) -> Vec<Point3<R>> {
        let mut points = Vec::new();
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = self.node_unchecked(index);
            match node.children {
                Some(children) => stack.extend_from_slice(&children),
                None => {
                    for (k, inside) in node.samples.iter() {
                        if inside {
                            points.push(node.bounds.sample_position(&Stencil::digits_of(k), 3));
                        }
                    }
                }
            }
        }
        points
    }

    /// Iterate over the leaves, in depth-first [`Octant`] order.
    pub fn leaves(&self) -> LeafIter<'_, R> {
        LeafIter {
            tree: self,
            stack: vec![self.root],
        }
    }
}

/// A depth-first iterator over the leaves of a [`BoundaryOctree`].
pub struct LeafIter<'tree, R: Float> {
    tree: &'tree BoundaryOctree<R>,
    stack: Vec<NodeIndex>,
}

impl<'tree, R: Float> Iterator for LeafIter<'tree, R> {
    type Item = &'tree BoundaryNode<R>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(index) = self.stack.pop() {
            let node = self.tree.node_unchecked(index);
            match node.children {
                Some(children) => {
                    // reversed so that octant 0 is yielded first
                    self.stack.extend(children.iter().rev());
                }
                None => return Some(node),
            }
        }
        None
    }
}

impl<'tree, R: Float> std::iter::FusedIterator for LeafIter<'tree, R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csg::{Cuboid, Sphere};
    use nalgebra::point;

    fn unit_sphere_tree() -> BoundaryOctree<f64> {
        BoundaryOctree::new(
            Region::new(point![-1.0, -1.0, -1.0], point![1.0, 1.0, 1.0]),
            Sphere::new(point![0.0, 0.0, 0.0], 1.0),
        )
    }

    #[test]
    fn sphere_center_in_corners_out() {
        let mut tree = unit_sphere_tree();
        tree.evaluate_all();
        let samples = tree.node(tree.root()).unwrap().samples();
        assert!(samples.get(13));
        for corner in [0, 2, 6, 8, 18, 20, 24, 26] {
            assert!(!samples.get(corner), "corner {corner} should be outside");
        }
    }

    #[test]
    fn evaluate_all_is_idempotent() {
        let mut tree = unit_sphere_tree();
        tree.evaluate_all();
        let first = *tree.node(tree.root()).unwrap().samples();
        tree.evaluate_all();
        assert_eq!(first, *tree.node(tree.root()).unwrap().samples());
    }

    #[test]
    fn tiny_cuboid_hits_only_the_center() {
        let mut tree = BoundaryOctree::new(
            Region::new(point![-0.5, -0.5, -0.5], point![0.5, 0.5, 0.5]),
            Cuboid::new(point![-0.1, -0.1, -0.1], point![0.1, 0.1, 0.1]),
        );
        tree.evaluate_all();
        let samples = tree.node(tree.root()).unwrap().samples();
        for k in 0..Stencil::LEN {
            assert_eq!(samples.get(k), k == 13);
        }
        let interior = tree.interior_points();
        assert_eq!(interior.len(), 1);
        let p = interior[0];
        assert!(p.coords.norm_squared() < 1e-12);
    }

    #[test]
    fn divide_respects_level_bounds() {
        let mut tree = unit_sphere_tree();
        tree.divide(1, 3);
        let mut stack = vec![tree.root()];
        while let Some(index) = stack.pop() {
            let node = tree.node(index).unwrap();
            assert!(node.level() <= 3);
            if node.level() < 1 {
                let children = node.children().expect("forced split below min_level");
                stack.extend_from_slice(children);
            } else if let Some(children) = node.children() {
                stack.extend_from_slice(children);
            }
        }
    }

    #[test]
    fn children_reuse_parent_corners() {
        let mut tree = unit_sphere_tree();
        tree.divide(1, 1);
        let root = tree.node(tree.root()).unwrap();
        let children = root.children().unwrap();
        for oct in Octant::all() {
            let child = tree.node(children[oct.index()]).unwrap();
            for &(ci, pi) in corner_share(oct) {
                assert_eq!(child.samples().get(ci), root.samples().get(pi));
            }
        }
    }

    #[test]
    fn leaves_iterates_every_leaf() {
        let mut tree = unit_sphere_tree();
        tree.divide(1, 2);
        let leaves: Vec<_> = tree.leaves().collect();
        assert!(leaves.iter().all(|n| n.is_leaf()));
        // leaf regions tile the root without materialized internal nodes
        let total: usize = leaves.len();
        assert!(total >= 8);
    }
}
