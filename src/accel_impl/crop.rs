//! CROP (Conjugate Residual with OPtimal trial vectors) history

use super::{collect_pairs, residual, ConvergenceAccelerator, History, HistoryEntry};
use crate::amplitudes::{AmplitudeSet, Rank, RankSlots};
use crate::error::{ExtrapolationError, SolverError};
use crate::tensor::AmplitudeTensor;
use tracing::debug;

/// CROP accelerator
///
/// Keeps the amplitudes each update started from and the residuals
/// `working - current`. The extrapolated amplitude applies the same weights
/// to both histories and adds the sums.
#[derive(Debug, Clone)]
pub struct Crop<T> {
    history: History<T>,
}

impl<T: AmplitudeTensor> Crop<T> {
    pub fn new(ranks: Vec<Rank>) -> Self {
        Crop {
            history: History::new(ranks),
        }
    }
}

impl<T: AmplitudeTensor> ConvergenceAccelerator<T> for Crop<T> {
    fn name(&self) -> &'static str {
        "CROP"
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
            vectors.insert(rank, current.clone());
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
            "CROP coefficients over {} entries: {:?}",
            self.history.len(),
            coeffs.as_slice()
        );
        Ok(self.history.combine(&coeffs, true))
    }
}
