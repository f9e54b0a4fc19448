//! Convergence acceleration for the amplitude equations
//!
//! Both strategies keep a bounded, aligned history of (vector, residual)
//! snapshots for every tracked rank and extrapolate with Pulay's bordered
//! linear system:
//!
//! ```text
//! | B    -1 | | x |   |  0 |
//! | -1ᵀ   0 | | λ | = | -1 |
//! ```
//!
//! where B_ij = Σ_rank Re⟨e_i|e_j⟩. Only the real part of the inner product
//! enters B, also for complex amplitudes. The interior block is scaled by its
//! largest element before solving.
//!
//! * [`Crop`] stores the previous amplitudes t_i and residuals e_i and
//!   returns Σ x_i t_i + Σ x_i e_i.
//! * [`Diis`] stores the new amplitudes and the residuals and returns
//!   Σ x_i t_i(new).

mod crop;
mod diis;

pub use crop::Crop;
pub use diis::Diis;

extern crate nalgebra as na;

use crate::amplitudes::{AmplitudeSet, Rank, RankSlots};
use crate::error::{ExtrapolationError, SolverError};
use crate::tensor::AmplitudeTensor;
use na::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Hard ceiling on the number of stored history entries
pub const MAX_QUEUE_LENGTH: usize = 32;

/// Acceleration strategy selected in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationMethod {
    None,
    Diis,
    #[default]
    Crop,
}

impl FromStr for AccelerationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "diis" => Ok(Self::Diis),
            "crop" => Ok(Self::Crop),
            _ => Err(format!("Unknown acceleration method: {s}")),
        }
    }
}

impl fmt::Display for AccelerationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Diis => "DIIS",
            Self::Crop => "CROP",
        };
        f.write_str(name)
    }
}

/// Strategy plus the history depth kept after each push
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationConfig {
    pub method: AccelerationMethod,
    pub max_history_depth: usize,
}

impl Default for AccelerationConfig {
    fn default() -> Self {
        AccelerationConfig {
            method: AccelerationMethod::Crop,
            max_history_depth: 10,
        }
    }
}

impl AccelerationConfig {
    pub fn none() -> Self {
        AccelerationConfig {
            method: AccelerationMethod::None,
            ..Self::default()
        }
    }

    pub fn new(method: AccelerationMethod, max_history_depth: usize) -> Self {
        AccelerationConfig {
            method,
            max_history_depth,
        }
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        if self.method == AccelerationMethod::None {
            return Ok(());
        }
        if self.max_history_depth == 0 || self.max_history_depth >= MAX_QUEUE_LENGTH {
            return Err(SolverError::InvalidConfig(format!(
                "max_history_depth must lie in 1..{}, got {}",
                MAX_QUEUE_LENGTH, self.max_history_depth
            )));
        }
        Ok(())
    }
}

/// One aligned snapshot across all tracked ranks
#[derive(Debug, Clone)]
pub struct HistoryEntry<T> {
    /// Iteration that produced the entry
    pub tag: usize,
    pub vectors: RankSlots<T>,
    pub residuals: RankSlots<T>,
}

/// Bounded queue of history entries shared by both strategies
#[derive(Debug, Clone)]
pub struct History<T> {
    ranks: Vec<Rank>,
    entries: VecDeque<HistoryEntry<T>>,
}

impl<T: AmplitudeTensor> History<T> {
    pub fn new(ranks: Vec<Rank>) -> Self {
        History {
            ranks,
            entries: VecDeque::new(),
        }
    }

    pub fn ranks(&self) -> &[Rank] {
        &self.ranks
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries holding a residual for `rank`
    pub fn len_for(&self, rank: Rank) -> usize {
        self.entries
            .iter()
            .filter(|e| e.residuals.contains(rank))
            .count()
    }

    /// Entries from oldest to newest
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry<T>> {
        self.entries.iter()
    }

    /// Append an entry at the tail
    pub fn push(&mut self, entry: HistoryEntry<T>) -> Result<(), SolverError> {
        let found = entry.residuals.ranks();
        if found != self.ranks || entry.vectors.ranks() != self.ranks {
            return Err(SolverError::RankMismatch {
                expected: self.ranks.clone(),
                found,
            });
        }
        if self.entries.len() >= MAX_QUEUE_LENGTH {
            return Err(SolverError::QueueOverflow {
                capacity: MAX_QUEUE_LENGTH,
            });
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Drop the oldest entries until at most `max_depth` remain
    pub fn truncate(&mut self, max_depth: usize) {
        while self.entries.len() > max_depth {
            if let Some(evicted) = self.entries.pop_front() {
                debug!("Evicted history entry from iteration {}", evicted.tag);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Bordered Pulay matrix with its interior scaled to unit maximum
    pub fn pulay_matrix(&self) -> DMatrix<f64> {
        let n = self.entries.len();
        let mut b = DMatrix::zeros(n + 1, n + 1);

        for i in 0..n {
            for j in i..n {
                let overlap: f64 = self.entries[i]
                    .residuals
                    .iter()
                    .filter_map(|(rank, e_i)| {
                        self.entries[j]
                            .residuals
                            .get(rank)
                            .map(|e_j| e_i.inner_product_re(e_j))
                    })
                    .sum();
                b[(i, j)] = overlap;
                b[(j, i)] = overlap;
            }
            b[(i, n)] = -1.0;
            b[(n, i)] = -1.0;
        }
        b[(n, n)] = 0.0;

        let scale = b.view((0, 0), (n, n)).amax();
        if scale > 0.0 && scale.is_finite() {
            for i in 0..n {
                for j in 0..n {
                    b[(i, j)] /= scale;
                }
            }
        }
        b
    }

    /// Extrapolation weights x_0 .. x_{n-1}
    pub fn coefficients(&self) -> Result<DVector<f64>, ExtrapolationError> {
        if self.entries.is_empty() {
            return Err(ExtrapolationError::EmptyHistory);
        }
        solve_pulay(self.pulay_matrix())
    }

    /// Σ x_i v_i per rank, plus Σ x_i e_i when `add_residuals` is set
    ///
    /// The sums are accumulated in fresh tensors; the queue is not touched.
    pub fn combine(&self, coeffs: &DVector<f64>, add_residuals: bool) -> RankSlots<T> {
        let mut result = RankSlots::new();
        for &rank in &self.ranks {
            let Some(mut vector_sum) = weighted_sum(
                self.entries.iter().map(|e| e.vectors.get(rank)),
                coeffs,
            ) else {
                continue;
            };
            if add_residuals {
                if let Some(residual_sum) = weighted_sum(
                    self.entries.iter().map(|e| e.residuals.get(rank)),
                    coeffs,
                ) {
                    vector_sum.scaled_add(1.0, &residual_sum);
                }
            }
            result.insert(rank, vector_sum);
        }
        result
    }

    pub fn size_in_bytes(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|e| e.vectors.iter().chain(e.residuals.iter()))
            .map(|(_, t)| t.size_in_bytes())
            .sum()
    }
}

fn weighted_sum<'a, T: AmplitudeTensor + 'a>(
    tensors: impl Iterator<Item = Option<&'a T>>,
    coeffs: &DVector<f64>,
) -> Option<T> {
    let mut sum: Option<T> = None;
    for (tensor, &x) in tensors.zip(coeffs.iter()) {
        let tensor = tensor?;
        match sum.as_mut() {
            Some(acc) => acc.scaled_add(x, tensor),
            None => {
                let mut first = tensor.clone();
                first.scale(x);
                sum = Some(first);
            }
        }
    }
    sum
}

/// Solve the bordered system `B x = (0, .., 0, -1)` and return the leading
/// `n` components
pub fn solve_pulay(b: DMatrix<f64>) -> Result<DVector<f64>, ExtrapolationError> {
    let m = b.nrows();
    if m < 2 {
        return Err(ExtrapolationError::EmptyHistory);
    }
    let n = m - 1;

    // A vanishing interior means every residual is zero
    let interior = b.view((0, 0), (n, n)).amax();
    if !(interior > 0.0 && interior.is_finite()) {
        return Err(ExtrapolationError::Singular);
    }

    let mut rhs = DVector::zeros(m);
    rhs[n] = -1.0;

    // Only an exactly vanishing pivot is singular
    let lu = b.lu();
    if lu.u().diagonal().iter().any(|p| *p == 0.0 || !p.is_finite()) {
        return Err(ExtrapolationError::Singular);
    }

    let solution = lu.solve(&rhs).ok_or(ExtrapolationError::Singular)?;
    if solution.iter().any(|x| !x.is_finite()) {
        return Err(ExtrapolationError::Singular);
    }
    Ok(solution.rows(0, n).into_owned())
}

/// Interface of a convergence accelerator
///
/// The queue is owned by a single solve. Implementors provide `push` and
/// `extrapolate`; the bookkeeping is shared through [`History`].
pub trait ConvergenceAccelerator<T: AmplitudeTensor> {
    fn name(&self) -> &'static str;

    fn history(&self) -> &History<T>;

    fn history_mut(&mut self) -> &mut History<T>;

    /// Record the (current, working) pair of every tracked rank
    fn push(&mut self, amplitudes: &AmplitudeSet<T>, tag: usize) -> Result<(), SolverError>;

    /// Extrapolated amplitudes; leaves the history unchanged
    fn extrapolate(&self) -> Result<RankSlots<T>, ExtrapolationError>;

    fn truncate(&mut self, max_depth: usize) {
        self.history_mut().truncate(max_depth);
    }

    fn len(&self) -> usize {
        self.history().len()
    }

    fn is_empty(&self) -> bool {
        self.history().is_empty()
    }

    fn len_for(&self, rank: Rank) -> usize {
        self.history().len_for(rank)
    }

    fn clear(&mut self) {
        self.history_mut().clear();
    }

    fn pulay_matrix(&self) -> DMatrix<f64> {
        self.history().pulay_matrix()
    }

    fn size_in_bytes(&self) -> usize {
        self.history().size_in_bytes()
    }
}

/// Create the accelerator chosen in `config` for the given ranks
pub fn create_accelerator<T: AmplitudeTensor + 'static>(
    config: &AccelerationConfig,
    ranks: Vec<Rank>,
) -> Option<Box<dyn ConvergenceAccelerator<T>>> {
    match config.method {
        AccelerationMethod::None => None,
        AccelerationMethod::Diis => Some(Box::new(Diis::new(ranks))),
        AccelerationMethod::Crop => Some(Box::new(Crop::new(ranks))),
    }
}

/// Residual `working - current` of one rank
fn residual<T: AmplitudeTensor>(current: &T, working: &T) -> T {
    let mut e = working.clone();
    e.scaled_add(-1.0, current);
    e
}

/// Pairs of every active rank, or a rank mismatch naming what was found
fn collect_pairs<'a, T: AmplitudeTensor>(
    amplitudes: &'a AmplitudeSet<T>,
    ranks: &[Rank],
) -> Result<Vec<(Rank, &'a T, &'a T)>, SolverError> {
    ranks
        .iter()
        .map(|&rank| {
            amplitudes
                .pair(rank)
                .map(|(current, working)| (rank, current, working))
                .ok_or_else(|| SolverError::RankMismatch {
                    expected: ranks.to_vec(),
                    found: amplitudes.active_ranks(),
                })
        })
        .collect()
}
