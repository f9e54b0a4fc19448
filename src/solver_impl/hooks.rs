//! Collaborators injected into the amplitude solver

extern crate nalgebra as na;

use crate::amplitudes::{Rank, RankSlots, TensorStore};
use crate::checkpoint::Checkpointer;
use crate::model::Sector;
use crate::tensor::DenseTensor;
use na::ComplexField;

/// Builds the next unconstrained amplitude update from the current amplitudes
///
/// Amplitudes are read through the [`TensorStore`] handed in. One method per
/// rank. A rank without an implementation returns `None`;
/// the solver treats that as a configuration error when the rank is active.
pub trait AmplitudeUpdater<T> {
    fn construct_singles(&mut self, _amplitudes: &dyn TensorStore<T>) -> Option<T> {
        None
    }

    fn construct_doubles(&mut self, _amplitudes: &dyn TensorStore<T>) -> Option<T> {
        None
    }

    fn construct_triples(&mut self, _amplitudes: &dyn TensorStore<T>) -> Option<T> {
        None
    }

    /// Joint post-processing of all working updates before denominators
    fn back_substitute(&mut self, _amplitudes: &mut dyn TensorStore<T>) {}

    /// Effective operator built from the committed amplitudes, saved with
    /// checkpoints
    fn effective_operator(&mut self, _amplitudes: &dyn TensorStore<T>) -> Option<T> {
        None
    }

    fn construct(&mut self, rank: Rank, amplitudes: &dyn TensorStore<T>) -> Option<T> {
        match rank {
            Rank::Singles => self.construct_singles(amplitudes),
            Rank::Doubles => self.construct_doubles(amplitudes),
            Rank::Triples => self.construct_triples(amplitudes),
        }
    }
}

/// Division by energy denominators and zeroing of forbidden elements
pub trait DenominatorPolicy<T> {
    fn apply(&self, sector: Sector, rank: Rank, working: &mut T);
}

/// Leaves working amplitudes untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDenominators;

impl<T> DenominatorPolicy<T> for NoDenominators {
    fn apply(&self, _: Sector, _: Rank, _: &mut T) {}
}

/// Element-wise division by stored denominators
///
/// Elements whose denominator is smaller in magnitude than the selection
/// threshold are set to zero.
#[derive(Debug, Clone)]
pub struct DiagonalDenominators {
    denominators: RankSlots<DenseTensor<f64>>,
    selection_threshold: f64,
}

impl DiagonalDenominators {
    pub fn new(selection_threshold: f64) -> Self {
        DiagonalDenominators {
            denominators: RankSlots::new(),
            selection_threshold,
        }
    }

    pub fn with_rank(mut self, rank: Rank, denominators: DenseTensor<f64>) -> Self {
        self.denominators.insert(rank, denominators);
        self
    }
}

impl<T: ComplexField<RealField = f64>> DenominatorPolicy<DenseTensor<T>> for DiagonalDenominators {
    fn apply(&self, _sector: Sector, rank: Rank, working: &mut DenseTensor<T>) {
        let Some(denominators) = self.denominators.get(rank) else {
            return;
        };
        debug_assert_eq!(denominators.shape(), working.shape());
        for (w, &d) in working
            .as_mut_slice()
            .iter_mut()
            .zip(denominators.as_slice())
        {
            if d.abs() < self.selection_threshold {
                *w = T::zero();
            } else {
                *w = w.clone().unscale(d);
            }
        }
    }
}

fn keep_all(_: Rank) -> bool {
    false
}

/// Everything the solver calls out to during one sector solve
pub struct SolveHooks<'h, T> {
    pub updater: &'h mut dyn AmplitudeUpdater<T>,
    pub denominators: &'h dyn DenominatorPolicy<T>,
    /// Model truncation: ranks whose working amplitudes are zeroed
    pub must_clear: &'h dyn Fn(Rank) -> bool,
    pub checkpointer: &'h mut dyn Checkpointer<T>,
}

impl<'h, T> SolveHooks<'h, T> {
    pub fn new(
        updater: &'h mut dyn AmplitudeUpdater<T>,
        denominators: &'h dyn DenominatorPolicy<T>,
        checkpointer: &'h mut dyn Checkpointer<T>,
    ) -> Self {
        SolveHooks {
            updater,
            denominators,
            must_clear: &keep_all,
            checkpointer,
        }
    }

    pub fn with_must_clear(mut self, must_clear: &'h dyn Fn(Rank) -> bool) -> Self {
        self.must_clear = must_clear;
        self
    }
}
