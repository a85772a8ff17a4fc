//! Crate-level error type, aggregating the per-module taxonomies.

pub use crate::index::{DomainError, OverflowError};

/// Errors raised by geometric preconditions.
///
/// These are programmer errors, not transient conditions: callers are expected
/// to validate inputs before calling `divide`/`locate` rather than retry.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("tolerance must be positive")]
    NonPositiveTolerance,
    #[error("samples per axis must be odd and greater than 1: {0}")]
    InvalidResolution(usize),
}

/// Any error raised by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Overflow(#[from] OverflowError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("export stream failure: {0}")]
    Io(#[from] std::io::Error),
}
