//! Self-consistent solution of the amplitude equations
//!
//! Per iteration k = 1, 2, ... the solver
//!
//! 1. builds a working update for every active rank through the
//!    [`AmplitudeUpdater`],
//! 2. lets the updater post-process the updates jointly,
//! 3. divides by energy denominators and zeroes ranks excluded by the model,
//! 4. measures the largest change and the largest amplitude per rank,
//! 5. extrapolates (k ≥ 2) and damps unless the iteration already converged
//!    or diverged,
//! 6. commits the working amplitudes and checkpoints every
//!    `checkpoint_every` iterations.
//!
//! Divergence wins over convergence when both hold. A singular extrapolation
//! disables acceleration for the rest of the solve instead of aborting it.

mod hooks;
mod solver;
#[cfg(test)]
mod tests;

pub use hooks::{
    AmplitudeUpdater, DenominatorPolicy, DiagonalDenominators, NoDenominators, SolveHooks,
};
pub use solver::{AmplitudeSolver, IterationReport, SolveStatus, SolveSummary, SolverConfig};
