//! Typed errors for the amplitude solver.
//!
//! Configuration problems abort a solve and surface as [`SolverError`].
//! Non-convergence and divergence are not errors: they are reported through
//! [`crate::solver_impl::SolveStatus`]. A singular extrapolation system is
//! reported as [`ExtrapolationError`] and handled inside the solver loop.

use crate::amplitudes::Rank;
use std::fmt;

/// Fatal errors raised while configuring or running a sector solve.
#[derive(Debug)]
pub enum SolverError {
    /// The acceleration history would grow past its hard ceiling.
    QueueOverflow { capacity: usize },

    /// A rank is active in the amplitude set but the updater cannot build it.
    MissingUpdater(Rank),

    /// A history push carried a different set of ranks than the queue tracks.
    RankMismatch { expected: Vec<Rank>, found: Vec<Rank> },

    /// Tensor shapes or element counts disagree.
    ShapeMismatch { expected: Vec<usize>, found: Vec<usize> },

    /// A configuration value is outside its allowed range.
    InvalidConfig(String),

    /// Checkpoint file could not be written or read.
    Io(std::io::Error),

    /// Checkpoint payload could not be encoded or decoded.
    Serialization(bincode::Error),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueOverflow { capacity } => {
                write!(f, "Convergence queue overflow: hard limit is {capacity} entries")
            }
            Self::MissingUpdater(rank) => {
                write!(f, "No construction routine for active rank {rank}")
            }
            Self::RankMismatch { expected, found } => write!(
                f,
                "Rank mismatch in convergence queue: tracking {expected:?}, got {found:?}"
            ),
            Self::ShapeMismatch { expected, found } => {
                write!(f, "Shape mismatch: expected {expected:?}, found {found:?}")
            }
            Self::InvalidConfig(msg) => write!(f, "Invalid solver configuration: {msg}"),
            Self::Io(e) => write!(f, "Checkpoint I/O failed: {e}"),
            Self::Serialization(e) => write!(f, "Checkpoint serialization failed: {e}"),
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Serialization(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SolverError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<bincode::Error> for SolverError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e)
    }
}

/// Recoverable failures of a single extrapolation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtrapolationError {
    /// Nothing has been pushed yet.
    EmptyHistory,

    /// The bordered Pulay system has no usable solution.
    Singular,
}

impl fmt::Display for ExtrapolationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyHistory => write!(f, "extrapolation requested on an empty history"),
            Self::Singular => write!(f, "Pulay matrix is singular"),
        }
    }
}

impl std::error::Error for ExtrapolationError {}
