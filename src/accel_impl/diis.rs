//! DIIS (Direct Inversion in the Iterative Subspace) history

use super::{collect_pairs, residual, ConvergenceAccelerator, History, HistoryEntry};
use crate::amplitudes::{AmplitudeSet, Rank, RankSlots};
use crate::error::{ExtrapolationError, SolverError};
use crate::tensor::AmplitudeTensor;
use tracing::debug;

/// DIIS accelerator
///
/// Keeps the new amplitudes together with their residuals and returns
/// t_DIIS = Σ c_i t_i(new), with c_i minimizing ||Σ c_i e_i||² under Σ c_i = 1.
#[derive(Debug, Clone)]
pub struct Diis<T> {
    history: History<T>,
}

impl<T: AmplitudeTensor> Diis<T> {
    pub fn new(ranks: Vec<Rank>) -> Self {
        Diis {
            history: History::new(ranks),
        }
    }
}

impl<T: AmplitudeTensor> ConvergenceAccelerator<T> for Diis<T> {
    fn name(&self) -> &'static str {
        "DIIS"
    }

    fn history(&self) -> &History<T> {
        &self.history
    }

    fn history_mut(&mut self) -> &mut History<T> {
        &mut self.history
    }

    fn push(&mut self, amplitudes: &AmplitudeSet<T>, tag: usize) -> Result<(), SolverError> {
        let pairs = collect_pairs(amplitudes, self.history.ranks())?;

        let mut vectors = RankSlots::new();
        let mut residuals = RankSlots::new();
        for (rank, current, working) in pairs {
            vectors.insert(rank, working.clone());
            residuals.insert(rank, residual(current, working));
        }

        self.history.push(HistoryEntry {
            tag,
            vectors,
            residuals,
        })
    }

    fn extrapolate(&self) -> Result<RankSlots<T>, ExtrapolationError> {
        let coeffs = self.history.coefficients()?;
        debug!(
            "DIIS extrapolation with {} vectors, coefficients {:?}",
            self.history.len(),
            coeffs.as_slice()
        );
        Ok(self.history.combine(&coeffs, false))
    }
}
