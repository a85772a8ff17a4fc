//! Partitioning of a caller-owned point set by recursive octant subdivision.
//!
//! A [`PartitionOctree`] borrows its point set for its whole lifetime; nodes
//! hold indices into that slice (the "active" points known to lie inside the
//! node's region), never copies. Children materialize lazily during
//! [`locate`](PartitionOctree::locate) or eagerly during
//! [`divide`](PartitionOctree::divide).

use nalgebra::Point3;
use tracing::{debug, trace};

use crate::error::GeometryError;
use crate::spatial::Region;
use crate::{Error, Float, NodeIndex, Octant};

/// One node of a [`PartitionOctree`]: a region, the active subset of the
/// tree's points, and per-slot lazy children.
#[derive(Debug, Clone)]
pub struct PartitionNode<R: Float> {
    bounds: Region<R, 3>,
    level: u32,
    parent: NodeIndex,
    children: [Option<NodeIndex>; 8],
    active: Vec<u32>,
}

impl<R: Float> PartitionNode<R> {
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

    /// Indices into the tree's point slice of the points inside this node.
    #[inline]
    pub fn active(&self) -> &[u32] {
        &self.active
    }

    /// The child occupying `oct`, if materialized.
    #[inline]
    pub fn child(&self, oct: Octant) -> Option<NodeIndex> {
        self.children[oct.index()]
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Whether `p` lies inside this node's region, under the node's own
    /// membership semantics: axes are scanned in order, and the first axis
    /// where `p` differs from *both* bounds decides containment alone.
    /// Degenerate axes (`p` exactly on a bound) are skipped; a point
    /// degenerate on every axis counts as inside.
    ///
    /// This asymmetric shortcut is load-bearing: `locate` and
    /// `find_containing_node` rely on it. In ≥ 2 dimensions it admits points
    /// that a full per-axis test would reject.
    pub fn contains(&self, p: &Point3<R>) -> bool {
        for a in 0..3 {
            let lo = p[a] - self.bounds.mins[a];
            let hi = self.bounds.maxs[a] - p[a];
            if lo != R::ZERO && hi != R::ZERO {
                return lo > R::ZERO && hi > R::ZERO;
            }
        }
        true
    }
}

/// An octree partitioning a borrowed point set.
///
/// The lifetime parameter carries the contract: the caller's point array
/// must outlive the tree, and the borrow checker enforces it.
pub struct PartitionOctree<'p, R: Float> {
    nodes: Vec<Option<PartitionNode<R>>>,
    points: &'p [Point3<R>],
    root: NodeIndex,
}

impl<'p, R: Float> PartitionOctree<'p, R> {
    /// Construct a tree over `bounds`, filtering `points` into the root's
    /// active set. Points are neither copied nor reordered.
    pub fn new(bounds: Region<R, 3>, points: &'p [Point3<R>]) -> Self {
        let mut root = PartitionNode {
            bounds,
            level: 0,
            parent: 0,
            children: [None; 8],
            active: Vec::new(),
        };
        let active = (0..points.len() as u32)
            .filter(|&i| root.contains(&points[i as usize]))
            .collect();
        root.active = active;
        Self {
            nodes: vec![Some(root)],
            points,
            root: 0,
        }
    }

    /// Index of the root node.
    #[inline]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// The point slice this tree partitions.
    #[inline]
    pub fn points(&self) -> &'p [Point3<R>] {
        self.points
    }

    /// The node at `index`, if that slot is occupied.
    pub fn node(&self, index: NodeIndex) -> Option<&PartitionNode<R>> {
        self.nodes.get(index as usize)?.as_ref()
    }

    fn node_unchecked(&self, index: NodeIndex) -> &PartitionNode<R> {
        self.nodes[index as usize].as_ref().unwrap()
    }

    /// Number of materialized nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Materialize the `oct` child of `target`, filtering the parent's active
    /// set into it.
    fn materialize(&mut self, target: NodeIndex, oct: Octant) -> NodeIndex {
        let parent = self.node_unchecked(target);
        let mut child = PartitionNode {
            bounds: parent.bounds.child_octant(oct),
            level: parent.level + 1,
            parent: target,
            children: [None; 8],
            active: Vec::new(),
        };
        let active = parent
            .active
            .iter()
            .copied()
            .filter(|&i| child.contains(&self.points[i as usize]))
            .collect();
        child.active = active;
        let index = self.nodes.len() as NodeIndex;
        self.nodes.push(Some(child));
        self.nodes[target as usize].as_mut().unwrap().children[oct.index()] = Some(index);
        index
    }

    /// Descend toward the leaf containing `target`, materializing at most the
    /// one child per level that contains it. A leaf is a node whose edge
    /// length is below `tolerance` or that holds exactly one active point.
    ///
    /// Returns `None` if the root does not contain `target`.
    ///
    /// # Errors
    /// * [`GeometryError::NonPositiveTolerance`] if `tolerance` ≤ 0
    pub fn locate(
        &mut self,
        target: &Point3<R>,
        tolerance: R,
    ) -> Result<Option<NodeIndex>, Error> {
        if tolerance <= R::ZERO {
            return Err(GeometryError::NonPositiveTolerance.into());
        }
        if !self.node_unchecked(self.root).contains(target) {
            return Ok(None);
        }
        let mut index = self.root;
        loop {
            let node = self.node_unchecked(index);
            let (edge, population, center, level) = (
                node.bounds.edge_length(),
                node.active.len(),
                node.bounds.center(),
                node.level,
            );
            let oct = Octant::from_center(&center, target);
            let existing = node.children[oct.index()];
            if edge < tolerance || population == 1 {
                trace!(index, level, "located leaf");
                return Ok(Some(index));
            }
            index = match existing {
                Some(child) => child,
                None => self.materialize(index, oct),
            };
        }
    }

    fn divide_node(&mut self, index: NodeIndex, min_level: u32, max_level: u32, threshold: usize) {
        let node = self.node_unchecked(index);
        let (level, population) = (node.level, node.active.len());
        if level >= max_level {
            return;
        }
        if level >= min_level && population <= threshold {
            return;
        }
        for oct in Octant::all() {
            let existing = self.node_unchecked(index).children[oct.index()];
            let child = match existing {
                Some(child) => child,
                None => self.materialize(index, oct),
            };
            self.divide_node(child, min_level, max_level, threshold);
        }
    }

    /// Eagerly build all 8 children of every node holding more than one
    /// active point (or below `min_level`), stopping at `max_level`.
    pub fn divide(&mut self, min_level: u32, max_level: u32) {
        self.divide_node(self.root, min_level, max_level, 1);
        debug!(
            nodes = self.node_count(),
            min_level, max_level, "divided partition octree"
        );
    }

    /// Like [`divide`](Self::divide), but skips subdivision wherever the
    /// active count is already at most `max_points`.
    pub fn divide_capped(
        &mut self,
        min_level: u32,
        max_level: u32,
        max_points: usize,
    ) {
        self.divide_node(self.root, min_level, max_level, max_points.max(1));
        debug!(
            nodes = self.node_count(),
            min_level, max_level, max_points, "divided partition octree (capped)"
        );
    }

    /// Walk into materialized children whose region contains `target` until
    /// none matches; returns the deepest such node, or `None` if the root
    /// itself does not contain `target`. Read-only counterpart of
    /// [`locate`](Self::locate).
    pub fn find_containing_node(&self, target: &Point3<R>) -> Option<NodeIndex> {
        if !self.node_unchecked(self.root).contains(target) {
            return None;
        }
        let mut index = self.root;
        'descend: loop {
            let node = self.node_unchecked(index);
            for child in node.children.iter().flatten() {
                if self.node_unchecked(*child).contains(target) {
                    index = *child;
                    continue 'descend;
                }
            }
            return Some(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::point;

    fn diagonal_points() -> Vec<Point3<f64>> {
        (0..=10)
            .map(|i| {
                let c = f64::from(i) / 10.0;
                point![c, c, c]
            })
            .collect()
    }

    fn unit_region() -> Region<f64, 3> {
        Region::new(point![0.0, 0.0, 0.0], point![1.0, 1.0, 1.0])
    }

    #[test]
    fn root_captures_all_points() {
        let points = diagonal_points();
        let tree = PartitionOctree::new(unit_region(), &points);
        assert_eq!(tree.node(tree.root()).unwrap().active().len(), 11);
    }

    #[test]
    fn locate_rejects_bad_tolerance() {
        let points = diagonal_points();
        let mut tree = PartitionOctree::new(unit_region(), &points);
        assert!(tree.locate(&point![0.5, 0.5, 0.5], 0.0).is_err());
        assert!(tree.locate(&point![0.5, 0.5, 0.5], -1.0).is_err());
    }

    #[test]
    fn locate_finds_each_point() {
        let points = diagonal_points();
        let mut tree = PartitionOctree::new(unit_region(), &points);
        for p in &points {
            let leaf = tree
                .locate(p, 1e-5)
                .unwrap()
                .expect("point inside the root must locate");
            assert!(tree.node(leaf).unwrap().contains(p));
        }
    }

    #[test]
    fn locate_outside_is_none() {
        let points = diagonal_points();
        let mut tree = PartitionOctree::new(unit_region(), &points);
        assert_eq!(tree.locate(&point![2.0, 0.5, 0.5], 1e-5).unwrap(), None);
    }

    #[test]
    fn locate_materializes_one_path() {
        let points = diagonal_points();
        let mut tree = PartitionOctree::new(unit_region(), &points);
        let before = tree.node_count();
        assert_eq!(before, 1);
        tree.locate(&point![0.31, 0.28, 0.33], 1e-2).unwrap();
        // one new child per level descended, never a full fan-out
        let created = tree.node_count() - before;
        let mut levels = 0;
        let mut index = tree.root();
        loop {
            let node = tree.node(index).unwrap();
            match node.children.iter().flatten().next() {
                Some(&c) => {
                    levels += 1;
                    index = c;
                }
                None => break,
            }
        }
        assert_eq!(created, levels);
    }

    #[test]
    fn divide_respects_levels_and_population() {
        let points = diagonal_points();
        let mut tree = PartitionOctree::new(unit_region(), &points);
        tree.divide(1, 4);
        let mut stack = vec![tree.root()];
        while let Some(index) = stack.pop() {
            let node = tree.node(index).unwrap();
            assert!(node.level() <= 4);
            if node.level() < 1 && node.level() < 4 {
                assert!(!node.is_leaf(), "below min_level every node is split");
            }
            if !node.is_leaf() {
                for oct in Octant::all() {
                    let child = node.child(oct).expect("divide builds all 8 children");
                    stack.push(child);
                }
            }
        }
    }

    #[test]
    fn divide_capped_stops_early() {
        let points = diagonal_points();
        let mut capped = PartitionOctree::new(unit_region(), &points);
        capped.divide_capped(0, 6, 11);
        // the root already satisfies the cap, so nothing splits
        assert_eq!(capped.node_count(), 1);

        let mut uncapped = PartitionOctree::new(unit_region(), &points);
        uncapped.divide(0, 6);
        assert!(uncapped.node_count() > 1);
    }

    #[test]
    fn find_containing_node_cross_validates_locate() {
        let points = diagonal_points();
        let mut tree = PartitionOctree::new(unit_region(), &points);
        tree.divide(0, 5);
        for p in &points {
            let found = tree
                .find_containing_node(p)
                .expect("points inside the root are containable");
            assert!(tree.node(found).unwrap().contains(p));
        }
        assert_eq!(tree.find_containing_node(&point![2.0, 0.5, 0.5]), None);
    }

    #[test]
    fn first_axis_decides_containment() {
        let points = [point![0.5, 7.0, 7.0]];
        let tree = PartitionOctree::new(unit_region(), &points);
        // the first non-degenerate axis (x, strictly inside) decides, so the
        // far-outside y and z never get a say
        assert!(tree.node(tree.root()).unwrap().contains(&points[0]));
        assert_eq!(tree.node(tree.root()).unwrap().active().len(), 1);
    }
}
