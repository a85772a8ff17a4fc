//! N-dimensional, M-resolution generalization of the boundary octree, with
//! task-parallel construction.
//!
//! A [`SpaceTree`] samples its predicate on an M×⋯×M grid per node (M odd,
//! > 1) and splits boundary nodes into 2^N children. Construction forks one
//! task per child inside a single parallel region entered at the root; each
//! task reads only the parent and the predicate and writes only its own
//! freshly allocated child. The closure borrow rules enforce that discipline,
//! so no locking is involved.

use std::io;

use nalgebra::Point;
use rayon::prelude::*;
use tracing::debug;

use crate::csg::Csg;
use crate::error::GeometryError;
use crate::index::{uint_pow, DomainError};
use crate::spatial::Region;
use crate::stencil::mixed_prefix;
use crate::{Error, Float};

/// Per-axis digits of flat sample index `k` on a base-`m` grid,
/// most-significant first. Infallible companion of
/// [`digits`](crate::index::digits) for internal loops over validated grids.
fn sample_digits<const N: usize>(mut k: usize, m: usize) -> [usize; N] {
    let mut d = [0usize; N];
    for di in d.iter_mut().rev() {
        *di = k % m;
        k /= m;
    }
    d
}

/// Per-axis upper/lower selections of child index `c`, most-significant
/// first; the N-dimensional [`base2`](crate::index::base2).
fn child_bits<const N: usize>(c: usize) -> [bool; N] {
    let mut b = [false; N];
    for (a, bi) in b.iter_mut().enumerate() {
        *bi = (c >> (N - 1 - a)) & 1 == 1;
    }
    b
}

/// A deferred sample-sharing record: a freshly evaluated face sample whose
/// coincident duplicate lives in a neighbour region that was not built when
/// this node was constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRequest {
    /// Flat index of the face sample within the owning node.
    pub sample: usize,
}

/// Result of a [`neighbour`](SpaceTree::neighbour) query.
#[derive(Debug)]
pub enum Neighbour<'tree, R: Float, const N: usize, const M: usize> {
    /// The queried face lies on the outer boundary of the whole tree.
    Boundary,
    /// No node of the queried node's level is materialized across the face.
    Unbuilt,
    /// The adjacent same-level node, and the flat index of the coincident
    /// sample within it.
    Found {
        node: &'tree SpaceNode<R, N, M>,
        sample: usize,
    },
}

/// One node of a [`SpaceTree`]: a region, M^N samples, per-slot owned
/// children, and the pending-evaluation queue.
#[derive(Debug)]
pub struct SpaceNode<R: Float, const N: usize, const M: usize> {
    bounds: Region<R, N>,
    level: u32,
    samples: Vec<bool>,
    children: Vec<Option<Box<SpaceNode<R, N, M>>>>,
    pending: Vec<SampleRequest>,
}

impl<R: Float, const N: usize, const M: usize> SpaceNode<R, N, M> {
    fn evaluate(bounds: Region<R, N>, level: u32, geometry: &dyn Csg<R, N>, len: usize) -> Self {
        let mut samples = vec![false; len];
        for (k, s) in samples.iter_mut().enumerate() {
            let d = sample_digits::<N>(k, M);
            *s = geometry.is_inside(&bounds.sample_position(&d, M));
        }
        Self {
            bounds,
            level,
            samples,
            children: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Construct the `c`th child, copying the parent samples that coincide
    /// (all per-axis digits even) and evaluating the rest. Fresh samples on
    /// the child's outer faces are queued as [`SampleRequest`]s: their
    /// duplicates belong to neighbours that may not exist yet.
    fn child(&self, c: usize, geometry: &dyn Csg<R, N>) -> Self {
        let bits = child_bits::<N>(c);
        let bounds = self.bounds.child(c);
        let len = self.samples.len();
        let mut samples = vec![false; len];
        let mut pending = Vec::new();
        for (k, s) in samples.iter_mut().enumerate() {
            let d = sample_digits::<N>(k, M);
            if d.iter().all(|&di| di % 2 == 0) {
                // coincides with a parent sample at digit b·(M−1)/2 + d/2
                let mut parent = 0usize;
                for (a, &di) in d.iter().enumerate() {
                    parent = parent * M + (bits[a] as usize) * (M - 1) / 2 + di / 2;
                }
                *s = self.samples[parent];
            } else {
                *s = geometry.is_inside(&bounds.sample_position(&d, M));
                if d.iter().any(|&di| di == 0 || di == M - 1) {
                    pending.push(SampleRequest { sample: k });
                }
            }
        }
        Self {
            bounds,
            level: self.level + 1,
            samples,
            children: Vec::new(),
            pending,
        }
    }

    /// The region this node spans.
    #[inline]
    pub fn bounds(&self) -> &Region<R, N> {
        &self.bounds
    }

    /// Subdivision depth; the root is 0.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// The flat M^N sample vector; read-only, also for rendering consumers.
    #[inline]
    pub fn samples(&self) -> &[bool] {
        &self.samples
    }

    #[inline]
    pub fn center(&self) -> Point<R, N> {
        self.bounds.center()
    }

    #[inline]
    pub fn edge_length(&self) -> R {
        self.bounds.edge_length()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The `c`th child, if materialized.
    pub fn child_at(&self, c: usize) -> Option<&SpaceNode<R, N, M>> {
        self.children.get(c)?.as_deref()
    }

    /// Unresolved sample-sharing requests recorded at construction.
    #[inline]
    pub fn pending(&self) -> &[SampleRequest] {
        &self.pending
    }

    /// Whether the samples are not uniformly inside/outside; same prefix
    /// heuristic as [`Stencil::is_boundary`](crate::stencil::Stencil).
    pub fn is_boundary(&self) -> bool {
        mixed_prefix(&self.samples)
    }

    /// Recursively free all descendants without removing this node itself.
    /// Used to collapse a node found to no longer need refinement.
    pub fn wipe(&mut self) {
        self.children.clear();
    }

    fn divide_recursive(&mut self, geometry: &dyn Csg<R, N>, min_level: u32, max_level: u32) {
        if self.level >= max_level {
            return;
        }
        if self.level >= min_level && !self.is_boundary() {
            return;
        }
        let parent = &*self;
        // one task per child; tasks read only `parent` and the predicate
        let children: Vec<Option<Box<SpaceNode<R, N, M>>>> = (0..(1usize << N))
            .into_par_iter()
            .map(|c| {
                let mut child = parent.child(c, geometry);
                child.divide_recursive(geometry, min_level, max_level);
                Some(Box::new(child))
            })
            .collect();
        self.children = children;
    }

    fn write_row<W: io::Write>(&self, out: &mut W) -> Result<(), Error> {
        write!(out, "{}", self.bounds.extent(0))?;
        let center = self.bounds.center();
        for a in 0..N {
            write!(out, ",{}", center[a])?;
        }
        for &s in &self.samples {
            write!(out, ",{}", u8::from(s))?;
        }
        writeln!(out)?;
        for child in self.children.iter().flatten() {
            child.write_row(out)?;
        }
        Ok(())
    }

    fn count(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(|c| c.count())
            .sum::<usize>()
    }

    fn collect_pending(&self, path: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, usize)>) {
        for req in &self.pending {
            out.push((path.clone(), req.sample));
        }
        for (c, child) in self.children.iter().enumerate() {
            if let Some(child) = child {
                path.push(c);
                child.collect_pending(path, out);
                path.pop();
            }
        }
    }

    fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut SpaceNode<R, N, M>> {
        match path.split_first() {
            None => Some(self),
            Some((&c, rest)) => self.children.get_mut(c)?.as_deref_mut()?.at_path_mut(rest),
        }
    }
}

/// An N-dimensional adaptive sampling tree over a CSG predicate, M samples
/// per axis.
pub struct SpaceTree<R: Float, const N: usize, const M: usize> {
    root: SpaceNode<R, N, M>,
    geometry: Box<dyn Csg<R, N>>,
}

impl<R: Float, const N: usize, const M: usize> SpaceTree<R, N, M> {
    /// Construct a tree over `bounds` and fully evaluate the root samples.
    ///
    /// # Errors
    /// * [`GeometryError::InvalidResolution`] if `M` is even or < 3
    /// * [`OverflowError`](crate::index::OverflowError) if M^N does not fit
    ///   the address space
    pub fn new(bounds: Region<R, N>, geometry: impl Csg<R, N> + 'static) -> Result<Self, Error> {
        if M < 3 || M % 2 == 0 {
            return Err(GeometryError::InvalidResolution(M).into());
        }
        let len = uint_pow(M as u64, N as u32)? as usize;
        let geometry: Box<dyn Csg<R, N>> = Box::new(geometry);
        let root = SpaceNode::evaluate(bounds, 0, geometry.as_ref(), len);
        Ok(Self { root, geometry })
    }

    /// The root node.
    #[inline]
    pub fn root(&self) -> &SpaceNode<R, N, M> {
        &self.root
    }

    /// Mutable root access, for [`SpaceNode::wipe`].
    #[inline]
    pub fn root_mut(&mut self) -> &mut SpaceNode<R, N, M> {
        &mut self.root
    }

    /// Number of materialized nodes.
    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    /// Refine the tree: every node below `min_level` is split
    /// unconditionally, and boundary nodes keep splitting until `max_level`.
    /// One fork-join parallel region, entered here.
    pub fn divide(&mut self, min_level: u32, max_level: u32) {
        let geometry = self.geometry.as_ref();
        self.root.divide_recursive(geometry, min_level, max_level);
        debug!(
            nodes = self.node_count(),
            min_level, max_level, "divided space tree"
        );
    }

    /// Serialize the materialized tree: a header row
    /// `length,center0..center{N-1},value0..value{M^N-1}`, then one
    /// depth-first, parent-first row per node.
    ///
    /// # Errors
    /// * [`Error::Io`] if the stream fails
    pub fn write<W: io::Write>(&self, out: &mut W) -> Result<(), Error> {
        write!(out, "length")?;
        for a in 0..N {
            write!(out, ",center{a}")?;
        }
        for v in 0..self.root.samples.len() {
            write!(out, ",value{v}")?;
        }
        writeln!(out)?;
        self.root.write_row(out)
    }

    fn node_at(&self, path: &[usize]) -> Result<Option<&SpaceNode<R, N, M>>, Error> {
        let mut node = &self.root;
        for &c in path {
            if c >= (1 << N) {
                return Err(DomainError::IndexOutOfRange(c, 1 << N).into());
            }
            node = match node.children.get(c).and_then(|s| s.as_deref()) {
                Some(child) => child,
                None => return Ok(None),
            };
        }
        Ok(Some(node))
    }

    /// Find the node adjacent to the one addressed by `path` across the face
    /// carrying `sample`.
    ///
    /// `path` addresses a node by child indices from the root; `sample` must
    /// have at least one per-axis digit on an outer face (0 or M−1).
    /// Returns [`Neighbour::Boundary`] when the face is the tree's outer
    /// boundary, [`Neighbour::Unbuilt`] when no same-level node is
    /// materialized across it (including when `path` itself is unbuilt), and
    /// otherwise the adjacent node together with the flat index of the
    /// coincident sample. Where the sample touches several neighbours at
    /// once (an edge or corner), ties resolve toward the upper region on
    /// each undecided axis.
    ///
    /// # Errors
    /// * [`DomainError::IndexOutOfRange`] if a path element is ≥ 2^N or
    ///   `sample` ≥ M^N
    /// * [`DomainError::NotAFaceSample`] if `sample` is interior
    pub fn neighbour(
        &self,
        path: &[usize],
        sample: usize,
    ) -> Result<Neighbour<'_, R, N, M>, Error> {
        let node = match self.node_at(path)? {
            Some(node) => node,
            None => return Ok(Neighbour::Unbuilt),
        };
        if sample >= node.samples.len() {
            return Err(DomainError::IndexOutOfRange(sample, node.samples.len()).into());
        }
        let d = sample_digits::<N>(sample, M);
        if !d.iter().any(|&di| di == 0 || di == M - 1) {
            return Err(DomainError::NotAFaceSample(sample).into());
        }
        let position = node.bounds.sample_position(&d, M);

        // probe half a sample spacing beyond the face
        let mut probe = position;
        for a in 0..N {
            let half_step = node.bounds.extent(a) / (R::TWO * R::of_usize(M - 1));
            if d[a] == 0 {
                probe[a] = probe[a] - half_step;
            } else if d[a] == M - 1 {
                probe[a] = probe[a] + half_step;
            }
        }
        if !self.root.bounds.contains(&probe) {
            return Ok(Neighbour::Boundary);
        }

        let mut current = &self.root;
        while current.level < node.level {
            if current.children.is_empty() {
                return Ok(Neighbour::Unbuilt);
            }
            let c = current.bounds.child_containing(&probe);
            current = match current.children.get(c).and_then(|s| s.as_deref()) {
                Some(child) => child,
                None => return Ok(Neighbour::Unbuilt),
            };
        }

        // same-level node sharing the face: the sample aligns with its grid
        let mut flat = 0usize;
        for a in 0..N {
            let step = current.bounds.extent(a) / R::of_usize(M - 1);
            let rel = (position[a] - current.bounds.mins[a]) / step;
            let digit = match rel.round().to_usize() {
                Some(digit) if digit < M => digit,
                _ => return Ok(Neighbour::Unbuilt),
            };
            flat = flat * M + digit;
        }
        Ok(Neighbour::Found {
            node: current,
            sample: flat,
        })
    }

    /// Drain the pending-evaluation queues: requests whose neighbour is now
    /// materialized, or whose face turned out to be the tree boundary, are
    /// dropped; requests into still-unbuilt regions are kept for a later
    /// pass. Sequential; call after [`divide`](Self::divide).
    ///
    /// Returns the number of requests resolved.
    pub fn resolve_pending(&mut self) -> usize {
        let mut requests = Vec::new();
        self.root.collect_pending(&mut Vec::new(), &mut requests);

        let mut resolved = Vec::new();
        for (path, sample) in &requests {
            let settled = match self.neighbour(path, *sample) {
                Ok(Neighbour::Unbuilt) => false,
                // Boundary and Found both settle the request; errors cannot
                // occur for queue entries, which are face samples by
                // construction
                _ => true,
            };
            if settled {
                resolved.push((path.clone(), *sample));
            }
        }
        for (path, sample) in &resolved {
            if let Some(node) = self.root.at_path_mut(path) {
                node.pending.retain(|req| req.sample != *sample);
            }
        }
        debug!(
            resolved = resolved.len(),
            outstanding = requests.len() - resolved.len(),
            "resolved pending sample requests"
        );
        resolved.len()
    }
}
