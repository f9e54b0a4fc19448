//! Coupled-cluster amplitude solver with DIIS/CROP acceleration
//!
//! The crate drives the amplitude equations of a coupled-cluster model to
//! self-consistency. The equations themselves are supplied by the caller
//! through [`AmplitudeUpdater`]; the solver owns the iteration: denominators,
//! model truncation, convergence and divergence checks, extrapolation,
//! damping and checkpointing.

pub mod accel_impl;
pub mod amplitudes;
pub mod checkpoint;
pub mod damping;
pub mod error;
pub mod model;
pub mod problem;
pub mod solver_impl;
pub mod tensor;

pub use accel_impl::{
    create_accelerator, AccelerationConfig, AccelerationMethod, ConvergenceAccelerator, Crop,
    Diis, MAX_QUEUE_LENGTH,
};
pub use amplitudes::{AmplitudeSet, Rank, RankSlots, Role, TensorKey, TensorStore};
pub use checkpoint::{BincodeCheckpointer, Checkpointer, NoCheckpoint};
pub use damping::{DampingConfig, DampingSchedule};
pub use error::{ExtrapolationError, SolverError};
pub use model::{CcModel, Sector};
pub use problem::{ModelProblem, ProblemParams};
pub use solver_impl::{
    AmplitudeSolver, AmplitudeUpdater, DenominatorPolicy, DiagonalDenominators, IterationReport,
    NoDenominators, SolveHooks, SolveStatus, SolveSummary, SolverConfig,
};
pub use tensor::{AmplitudeTensor, DenseTensor, ExtremalElement, PhasedScalar};
