//! Plain-text export of point sets.
//!
//! The tabular tree format lives with [`SpaceTree::write`](crate::space::SpaceTree::write);
//! this module covers the point-cloud side: comma-separated coordinates, one
//! point per line, as consumed by external plotting tools.

use std::io;

use nalgebra::Point;

use crate::{Error, Float};

/// Write `points` as comma-separated coordinates, one point per line.
///
/// # Errors
/// * [`Error::Io`] if the stream fails
pub fn write_points<R: Float, const N: usize, W: io::Write>(
    points: &[Point<R, N>],
    out: &mut W,
) -> Result<(), Error> {
    for p in points {
        for a in 0..N {
            if a > 0 {
                write!(out, ",")?;
            }
            write!(out, "{}", p[a])?;
        }
        writeln!(out)?;
    }
    Ok(())
}
