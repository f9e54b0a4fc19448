//! Tests for the amplitude solver driver

use super::*;
use crate::accel_impl::{AccelerationConfig, AccelerationMethod};
use crate::amplitudes::{AmplitudeSet, Rank, TensorStore};
use crate::checkpoint::{Checkpointer, NoCheckpoint};
use crate::damping::DampingConfig;
use crate::error::SolverError;
use crate::model::{CcModel, Sector};
use crate::tensor::{AmplitudeTensor, DenseTensor};
use num_complex::Complex64;

type Tensor = DenseTensor<f64>;

fn vector(values: &[f64]) -> Tensor {
    DenseTensor::from_vec(&[values.len()], values.to_vec()).unwrap()
}

/// Updater driven by a closure over (rank, amplitudes)
struct FnUpdater<F> {
    f: F,
    calls: usize,
    heff: bool,
}

impl<F> FnUpdater<F> {
    fn new(f: F) -> Self {
        FnUpdater {
            f,
            calls: 0,
            heff: false,
        }
    }
}

impl<T, F> AmplitudeUpdater<T> for FnUpdater<F>
where
    T: AmplitudeTensor,
    F: FnMut(Rank, &dyn TensorStore<T>) -> Option<T>,
{
    fn construct(&mut self, rank: Rank, amplitudes: &dyn TensorStore<T>) -> Option<T> {
        self.calls += 1;
        (self.f)(rank, amplitudes)
    }

    fn effective_operator(&mut self, amplitudes: &dyn TensorStore<T>) -> Option<T> {
        if self.heff {
            amplitudes.current(Rank::Singles).cloned()
        } else {
            None
        }
    }
}

/// Records the iterations it was called at
#[derive(Default)]
struct CountingCheckpointer {
    iterations: Vec<usize>,
    had_heff: bool,
}

impl<T: AmplitudeTensor> Checkpointer<T> for CountingCheckpointer {
    fn write(
        &mut self,
        _sector: Sector,
        iteration: usize,
        amplitudes: &AmplitudeSet<T>,
    ) -> Result<(), SolverError> {
        self.iterations.push(iteration);
        self.had_heff |= amplitudes.effective_operator().is_some();
        Ok(())
    }
}

fn config(max_iter: usize, acceleration: AccelerationConfig) -> SolverConfig {
    SolverConfig {
        max_iter,
        acceleration,
        ..SolverConfig::default()
    }
}

fn run<T, F>(
    cfg: SolverConfig,
    amplitudes: &mut AmplitudeSet<T>,
    updater: &mut FnUpdater<F>,
) -> Result<SolveSummary, SolverError>
where
    T: AmplitudeTensor + 'static,
    F: FnMut(Rank, &dyn TensorStore<T>) -> Option<T>,
{
    let solver = AmplitudeSolver::new(cfg)?;
    let mut checkpointer = NoCheckpoint;
    let mut hooks = SolveHooks::new(updater, &NoDenominators, &mut checkpointer);
    solver.solve(Sector::vacuum(), false, amplitudes, &mut hooks)
}

/// t -> A t + b with fixed point (1, -2) and slow plain convergence
fn linear_update(rank: Rank, amps: &dyn TensorStore<Tensor>) -> Option<Tensor> {
    let t = amps.current(rank)?.as_slice();
    let a = [[0.9, 0.05], [0.0, 0.8]];
    let fixed = [1.0, -2.0];
    let next = (0..2)
        .map(|i| a[i][0] * (t[0] - fixed[0]) + a[i][1] * (t[1] - fixed[1]) + fixed[i])
        .collect();
    DenseTensor::from_vec(&[2], next).ok()
}

#[test]
fn test_fixed_point_converges_in_one_iteration() {
    let mut amps = AmplitudeSet::new().with_rank(Rank::Doubles, vector(&[0.25, -0.5]));
    let mut updater =
        FnUpdater::new(|rank, amps: &dyn TensorStore<Tensor>| amps.current(rank).cloned());
    let summary = run(SolverConfig::default(), &mut amps, &mut updater).unwrap();

    assert_eq!(summary.status, SolveStatus::Converged);
    assert_eq!(summary.iterations, 1);
    assert!(!summary.acceleration_disabled);
    assert_eq!(amps.current(Rank::Doubles).unwrap().as_slice(), &[0.25, -0.5]);
}

#[test]
fn test_fixed_point_reached_from_second_iteration() {
    let fixed = [0.3, -0.7];
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[0.0, 0.0]));
    let mut calls = 0;
    let mut updater = FnUpdater::new(move |_, _: &dyn TensorStore<Tensor>| {
        calls += 1;
        if calls == 1 {
            Some(vector(&[0.1, 0.1]))
        } else {
            Some(vector(&fixed))
        }
    });
    let cfg = SolverConfig {
        conv_thresh: 1e-10,
        ..config(20, AccelerationConfig::new(AccelerationMethod::Crop, 8))
    };
    let summary = run(cfg, &mut amps, &mut updater).unwrap();

    // Iteration 2 extrapolates, iteration 3 sees no change and commits the raw update
    assert_eq!(summary.status, SolveStatus::Converged);
    assert_eq!(summary.iterations, 3);
    assert!(!summary.acceleration_disabled);
    assert_eq!(amps.current(Rank::Singles).unwrap().as_slice(), &fixed);
}

#[test]
fn test_doubling_update_diverges() {
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[1.0]));
    let mut updater = FnUpdater::new(|rank, amps: &dyn TensorStore<Tensor>| {
        let mut t = amps.current(rank)?.clone();
        t.scale(2.0);
        Some(t)
    });
    let cfg = SolverConfig {
        div_thresh: 100.0,
        ..config(50, AccelerationConfig::none())
    };
    let summary = run(cfg, &mut amps, &mut updater).unwrap();

    // 2^7 = 128 is the first value above 100
    assert_eq!(summary.status, SolveStatus::Diverged);
    assert_eq!(summary.iterations, 7);
    let report = summary.last_report.unwrap();
    assert_eq!(report.max.get(Rank::Singles).unwrap().magnitude, 128.0);
}

#[test]
fn test_nan_counts_as_divergence() {
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[0.0, 1.0]));
    let mut updater =
        FnUpdater::new(|_, _: &dyn TensorStore<Tensor>| Some(vector(&[f64::NAN, 0.0])));
    let summary = run(SolverConfig::default(), &mut amps, &mut updater).unwrap();
    assert_eq!(summary.status, SolveStatus::Diverged);
    assert_eq!(summary.iterations, 1);
}

#[test]
fn test_oscillation_exhausts_iterations() {
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[1.0]));
    let mut updater = FnUpdater::new(|rank, amps: &dyn TensorStore<Tensor>| {
        let t = amps.current(rank)?.as_slice()[0];
        Some(vector(&[if t == 1.0 { 2.0 } else { 1.0 }]))
    });
    let summary = run(config(10, AccelerationConfig::none()), &mut amps, &mut updater).unwrap();

    assert_eq!(summary.status, SolveStatus::NoConvergence);
    assert_eq!(summary.iterations, 10);
    assert_eq!(updater.calls, 10);
    let report = summary.last_report.unwrap();
    assert_eq!(report.diff.get(Rank::Singles).unwrap().magnitude, 1.0);
}

#[test]
fn test_skipped_sector_calls_nothing() {
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[1.0]));
    let mut updater =
        FnUpdater::new(|_, _: &dyn TensorStore<Tensor>| -> Option<Tensor> { None });
    let mut checkpointer = CountingCheckpointer::default();
    let solver = AmplitudeSolver::new(SolverConfig {
        checkpoint_every: 1,
        ..SolverConfig::default()
    })
    .unwrap();
    let mut hooks: SolveHooks<'_, Tensor> = SolveHooks::new(&mut updater, &NoDenominators, &mut checkpointer);
    let summary = solver
        .solve(Sector::new(1, 1), true, &mut amps, &mut hooks)
        .unwrap();

    assert_eq!(summary.status, SolveStatus::Converged);
    assert_eq!(summary.iterations, 0);
    assert!(summary.last_report.is_none());
    assert_eq!(updater.calls, 0);
    assert!(checkpointer.iterations.is_empty());
}

#[test]
fn test_singular_extrapolation_disables_acceleration() {
    // Constant residual: every history entry carries the same e
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[0.0, 0.0]));
    let mut updater = FnUpdater::new(|rank, amps: &dyn TensorStore<Tensor>| {
        let mut t = amps.current(rank)?.clone();
        t.scaled_add(1.0, &vector(&[0.125, -0.25]));
        Some(t)
    });
    let summary = run(config(8, AccelerationConfig::default()), &mut amps, &mut updater).unwrap();

    assert!(summary.acceleration_disabled);
    assert_eq!(summary.status, SolveStatus::NoConvergence);
    assert_eq!(summary.iterations, 8);
    // Plain iteration continued after the failure
    assert_eq!(amps.current(Rank::Singles).unwrap().as_slice(), &[1.0, -2.0]);
}

#[test]
fn test_missing_updater_is_an_error() {
    let mut amps = AmplitudeSet::new()
        .with_rank(Rank::Singles, vector(&[1.0]))
        .with_rank(Rank::Doubles, vector(&[2.0]));
    let mut updater = FnUpdater::new(|rank, amps: &dyn TensorStore<Tensor>| match rank {
        Rank::Singles => Some(vector(&[amps.current(rank)?.as_slice()[0] + 1.0])),
        _ => None,
    });
    let err = run(SolverConfig::default(), &mut amps, &mut updater).unwrap_err();

    assert!(matches!(err, SolverError::MissingUpdater(Rank::Doubles)));
    assert_eq!(amps.working(Rank::Singles).unwrap().as_slice(), &[1.0]);
}

#[test]
fn test_must_clear_zeroes_truncated_rank() {
    let mut amps = AmplitudeSet::new()
        .with_rank(Rank::Singles, vector(&[0.0]))
        .with_rank(Rank::Triples, vector(&[0.5, 0.5]));
    let mut updater = FnUpdater::new(|rank, amps: &dyn TensorStore<Tensor>| {
        let mut t = amps.current(rank)?.clone();
        t.scaled_add(1.0, &amps.current(rank)?.clone());
        match rank {
            Rank::Singles => Some(vector(&[0.5])),
            _ => Some(t),
        }
    });
    let model = CcModel::Ccsd;
    let must_clear = move |rank: Rank| model.must_clear(rank);
    let solver = AmplitudeSolver::new(config(5, AccelerationConfig::none())).unwrap();
    let mut checkpointer = NoCheckpoint;
    let mut hooks: SolveHooks<'_, Tensor> = SolveHooks::new(&mut updater, &NoDenominators, &mut checkpointer)
        .with_must_clear(&must_clear);
    let summary = solver
        .solve(Sector::vacuum(), false, &mut amps, &mut hooks)
        .unwrap();

    // Iteration 1 moves both ranks, iteration 2 changes nothing
    assert_eq!(summary.status, SolveStatus::Converged);
    assert_eq!(summary.iterations, 2);
    assert_eq!(amps.current(Rank::Triples).unwrap().as_slice(), &[0.0, 0.0]);
    assert_eq!(amps.current(Rank::Singles).unwrap().as_slice(), &[0.5]);
}

#[test]
fn test_damping_mixes_previous_amplitude() {
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[0.0]));
    let mut updater = FnUpdater::new(|_, _: &dyn TensorStore<Tensor>| Some(vector(&[1.0])));
    let mut cfg = config(1, AccelerationConfig::none());
    cfg.damping.set(Rank::Singles, DampingConfig::new(0.5, 1));
    let summary = run(cfg.clone(), &mut amps, &mut updater).unwrap();

    assert_eq!(summary.status, SolveStatus::NoConvergence);
    assert_eq!(amps.current(Rank::Singles).unwrap().as_slice(), &[0.5]);

    // Past stop_iteration the raw update goes through
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[0.0]));
    cfg.max_iter = 10;
    let summary = run(cfg, &mut amps, &mut updater).unwrap();
    assert_eq!(summary.status, SolveStatus::Converged);
    assert_eq!(summary.iterations, 3);
    assert_eq!(amps.current(Rank::Singles).unwrap().as_slice(), &[1.0]);
}

#[test]
fn test_denominators_divide_working_amplitudes() {
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[0.0, 0.0, 0.0]));
    let mut updater =
        FnUpdater::new(|_, _: &dyn TensorStore<Tensor>| Some(vector(&[1.0, 1.0, 1.0])));
    let denominators =
        DiagonalDenominators::new(1e-6).with_rank(Rank::Singles, vector(&[2.0, -4.0, 1e-8]));
    let solver = AmplitudeSolver::new(config(1, AccelerationConfig::none())).unwrap();
    let mut checkpointer = NoCheckpoint;
    let mut hooks: SolveHooks<'_, Tensor> = SolveHooks::new(&mut updater, &denominators, &mut checkpointer);
    solver
        .solve(Sector::vacuum(), false, &mut amps, &mut hooks)
        .unwrap();

    assert_eq!(amps.current(Rank::Singles).unwrap().as_slice(), &[0.5, -0.25, 0.0]);
}

#[test]
fn test_checkpoint_cadence() {
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[1.0]));
    let mut updater = FnUpdater::new(|rank, amps: &dyn TensorStore<Tensor>| {
        let t = amps.current(rank)?.as_slice()[0];
        Some(vector(&[-t]))
    });
    updater.heff = true;
    let mut checkpointer = CountingCheckpointer::default();
    let solver = AmplitudeSolver::new(SolverConfig {
        checkpoint_every: 3,
        ..config(10, AccelerationConfig::none())
    })
    .unwrap();
    let mut hooks: SolveHooks<'_, Tensor> = SolveHooks::new(&mut updater, &NoDenominators, &mut checkpointer);
    let summary = solver
        .solve(Sector::vacuum(), false, &mut amps, &mut hooks)
        .unwrap();

    assert_eq!(summary.iterations, 10);
    assert_eq!(checkpointer.iterations, vec![3, 6, 9]);
    assert!(checkpointer.had_heff);
    assert!(amps.effective_operator().is_some());
}

#[test]
fn test_crop_beats_plain_iteration() {
    let start = vector(&[0.0, 0.0]);
    let cfg_plain = config(500, AccelerationConfig::none());
    let cfg_crop = config(500, AccelerationConfig::new(AccelerationMethod::Crop, 6));

    let mut plain = AmplitudeSet::new().with_rank(Rank::Singles, start.clone());
    let plain_summary = run(cfg_plain, &mut plain, &mut FnUpdater::new(linear_update)).unwrap();
    let mut crop = AmplitudeSet::new().with_rank(Rank::Singles, start);
    let crop_summary = run(cfg_crop, &mut crop, &mut FnUpdater::new(linear_update)).unwrap();

    assert!(plain_summary.is_converged());
    assert!(crop_summary.is_converged());
    assert!(
        crop_summary.iterations < plain_summary.iterations / 4,
        "crop {} vs plain {}",
        crop_summary.iterations,
        plain_summary.iterations
    );
    let t = crop.current(Rank::Singles).unwrap().as_slice();
    assert!((t[0] - 1.0).abs() < 1e-8 && (t[1] + 2.0).abs() < 1e-8, "{t:?}");
}

#[test]
fn test_diis_converges_linear_problem() {
    let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[0.0, 0.0]));
    let cfg = config(100, AccelerationConfig::new(AccelerationMethod::Diis, 6));
    let summary = run(cfg, &mut amps, &mut FnUpdater::new(linear_update)).unwrap();
    assert!(summary.is_converged());
}

#[test]
fn test_complex_amplitudes_converge() {
    let fixed = Complex64::new(0.5, -0.25);
    let mut amps = AmplitudeSet::new()
        .with_rank(Rank::Doubles, DenseTensor::<Complex64>::zeros(&[1, 1, 1, 1]));
    let mut updater = FnUpdater::new(move |rank, amps: &dyn TensorStore<DenseTensor<Complex64>>| {
        let t = amps.current(rank)?.as_slice()[0];
        let next = (t - fixed) * Complex64::new(0.6, 0.3) + fixed;
        DenseTensor::from_vec(&[1, 1, 1, 1], vec![next]).ok()
    });
    let summary = run(config(100, AccelerationConfig::default()), &mut amps, &mut updater).unwrap();

    assert!(summary.is_converged());
    let t = amps.current(Rank::Doubles).unwrap().as_slice()[0];
    assert!((t - fixed).norm() < 1e-8);
}

#[test]
fn test_config_validation() {
    assert!(AmplitudeSolver::new(SolverConfig::default()).is_ok());
    let bad = [
        SolverConfig {
            max_iter: 0,
            ..SolverConfig::default()
        },
        SolverConfig {
            conv_thresh: 0.0,
            ..SolverConfig::default()
        },
        SolverConfig {
            div_thresh: 1e-12,
            ..SolverConfig::default()
        },
        SolverConfig {
            acceleration: AccelerationConfig::new(AccelerationMethod::Crop, 40),
            ..SolverConfig::default()
        },
    ];
    for cfg in bad {
        assert!(matches!(
            AmplitudeSolver::new(cfg),
            Err(SolverError::InvalidConfig(_))
        ));
    }
}

#[test]
fn test_no_active_ranks_converges_immediately() {
    let mut amps = AmplitudeSet::<Tensor>::new();
    let mut updater = FnUpdater::new(|_, _: &dyn TensorStore<Tensor>| -> Option<Tensor> { None });
    let summary = run(SolverConfig::default(), &mut amps, &mut updater).unwrap();
    assert_eq!(summary.status, SolveStatus::Converged);
    assert_eq!(summary.iterations, 1);
    assert_eq!(updater.calls, 0);
}
