//! Driver loop for the amplitude equations

use super::hooks::SolveHooks;
use crate::accel_impl::{create_accelerator, AccelerationConfig, ConvergenceAccelerator};
use crate::amplitudes::{AmplitudeSet, Rank, RankSlots, TensorKey, TensorStore};
use crate::damping::{damp_in_place, DampingSchedule};
use crate::error::{ExtrapolationError, SolverError};
use crate::model::Sector;
use crate::tensor::{AmplitudeTensor, ExtremalElement};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Numerical settings of a sector solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_iter: usize,
    /// Largest allowed change of any amplitude at convergence
    pub conv_thresh: f64,
    /// Amplitude magnitude that counts as divergence
    pub div_thresh: f64,
    pub damping: DampingSchedule,
    pub acceleration: AccelerationConfig,
    /// Checkpoint interval in iterations, 0 disables checkpoints
    pub checkpoint_every: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_iter: 50,
            conv_thresh: 1e-9,
            div_thresh: 1e3,
            damping: DampingSchedule::default(),
            acceleration: AccelerationConfig::default(),
            checkpoint_every: 0,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), SolverError> {
        if self.max_iter == 0 {
            return Err(SolverError::InvalidConfig(
                "max_iter must be at least 1".to_string(),
            ));
        }
        if !(self.conv_thresh > 0.0) {
            return Err(SolverError::InvalidConfig(format!(
                "conv_thresh must be positive, got {}",
                self.conv_thresh
            )));
        }
        if !(self.div_thresh > self.conv_thresh) {
            return Err(SolverError::InvalidConfig(format!(
                "div_thresh ({}) must exceed conv_thresh ({})",
                self.div_thresh, self.conv_thresh
            )));
        }
        self.damping.validate()?;
        self.acceleration.validate()
    }
}

/// Outcome of a sector solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    Diverged,
    NoConvergence,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SolveStatus::Converged => "converged",
            SolveStatus::Diverged => "diverged",
            SolveStatus::NoConvergence => "not converged",
        };
        f.write_str(text)
    }
}

/// Diagnostics of one iteration
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: usize,
    /// max |working - current| per rank
    pub diff: RankSlots<ExtremalElement>,
    /// max |working| per rank
    pub max: RankSlots<ExtremalElement>,
    pub accelerated: bool,
    /// Wall time of this iteration
    pub elapsed: Duration,
    /// Wall time since the solve started
    pub total: Duration,
    /// Bytes held by amplitudes and history
    pub memory_bytes: usize,
}

impl IterationReport {
    fn log_header(ranks: &[Rank]) {
        let mut header = format!("{:>5}", "Iter");
        for rank in ranks {
            header.push_str(&format!(
                " {:>14} {:>14}",
                format!("diff({rank})"),
                format!("max({rank})")
            ));
        }
        header.push_str(&format!(
            " {:>9} {:>9} {:>10}",
            "time(s)", "total(s)", "mem(MB)"
        ));
        info!("{}", header);
        info!("{}", "-".repeat(header.len()));
    }

    fn log_row(&self, ranks: &[Rank]) {
        let mut row = format!("{:5}", self.iteration);
        for &rank in ranks {
            let diff = self.diff.get(rank).map_or(0.0, |e| e.magnitude);
            let max = self.max.get(rank).map_or(0.0, |e| e.magnitude);
            row.push_str(&format!(" {:14.6e} {:14.6e}", diff, max));
        }
        row.push_str(&format!(
            " {:9.3} {:9.3} {:10.2}{}",
            self.elapsed.as_secs_f64(),
            self.total.as_secs_f64(),
            self.memory_bytes as f64 / 1_048_576.0,
            if self.accelerated { "  *" } else { "" }
        ));
        info!("{}", row);

        for (rank, e) in self.diff.iter() {
            debug!("  {} largest change at {:?}", rank, e.index);
        }
        for (rank, e) in self.max.iter() {
            debug!("  {} largest amplitude at {:?}", rank, e.index);
        }
    }
}

/// Result of [`AmplitudeSolver::solve`]
#[derive(Debug, Clone)]
pub struct SolveSummary {
    pub status: SolveStatus,
    /// Iterations run, 0 for a skipped sector
    pub iterations: usize,
    /// Extrapolation failed at some point and the rest of the run was unaccelerated
    pub acceleration_disabled: bool,
    pub last_report: Option<IterationReport>,
}

impl SolveSummary {
    fn skipped() -> Self {
        SolveSummary {
            status: SolveStatus::Converged,
            iterations: 0,
            acceleration_disabled: false,
            last_report: None,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

/// Fixed-point solver for coupled amplitude equations
///
/// Each iteration builds new amplitudes through the injected
/// [`AmplitudeUpdater`](super::AmplitudeUpdater), applies denominators and
/// model truncation, checks convergence and divergence, extrapolates with
/// DIIS or CROP, damps, commits, and periodically checkpoints.
#[derive(Debug, Clone)]
pub struct AmplitudeSolver {
    config: SolverConfig,
}

impl AmplitudeSolver {
    pub fn new(config: SolverConfig) -> Result<Self, SolverError> {
        config.validate()?;
        Ok(AmplitudeSolver { config })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Drive the active ranks of `amplitudes` to self-consistency
    ///
    /// A skipped sector returns `Converged` without calling any hook.
    pub fn solve<T: AmplitudeTensor + 'static>(
        &self,
        sector: Sector,
        skip: bool,
        amplitudes: &mut AmplitudeSet<T>,
        hooks: &mut SolveHooks<'_, T>,
    ) -> Result<SolveSummary, SolverError> {
        if skip {
            info!("Sector {} is skipped", sector);
            return Ok(SolveSummary::skipped());
        }

        let cfg = &self.config;
        let ranks = amplitudes.active_ranks();
        if ranks.is_empty() {
            warn!("Sector {}: no amplitude ranks are active", sector);
        }

        info!("===========================================");
        info!("     Amplitude equations, sector {}", sector);
        info!("===========================================");
        info!(
            "Active ranks: {}",
            ranks.iter().map(|r| r.label()).collect::<Vec<_>>().join(", ")
        );
        info!("Max iterations: {}", cfg.max_iter);
        info!("Convergence threshold: {:.2e}", cfg.conv_thresh);
        info!("Divergence threshold: {:.2e}", cfg.div_thresh);
        info!(
            "Acceleration: {} (max history {})",
            cfg.acceleration.method, cfg.acceleration.max_history_depth
        );
        for &rank in &ranks {
            let damping = cfg.damping.for_rank(rank);
            if damping.enabled {
                info!(
                    "Damping {}: factor {:.3} up to iteration {}",
                    rank, damping.factor, damping.stop_iteration
                );
            }
        }
        info!("");

        let mut accelerator = create_accelerator::<T>(&cfg.acceleration, ranks.clone());
        let mut acceleration_disabled = false;
        let mut status = SolveStatus::NoConvergence;
        let mut last_report = None;
        let mut iterations = 0;
        let start = Instant::now();

        IterationReport::log_header(&ranks);

        for iteration in 1..=cfg.max_iter {
            let iteration_start = Instant::now();
            iterations = iteration;

            // Build every update before touching the working tensors
            let mut updates = Vec::with_capacity(ranks.len());
            for &rank in &ranks {
                let update = hooks
                    .updater
                    .construct(rank, &*amplitudes)
                    .ok_or(SolverError::MissingUpdater(rank))?;
                updates.push((rank, update));
            }
            for (rank, update) in updates {
                amplitudes.put(TensorKey::working(rank), update);
            }

            hooks.updater.back_substitute(amplitudes);

            for &rank in &ranks {
                if let Some(working) = amplitudes.working_mut(rank) {
                    hooks.denominators.apply(sector, rank, working);
                    if (hooks.must_clear)(rank) {
                        working.clear();
                    }
                }
            }

            let mut diff = RankSlots::new();
            let mut max = RankSlots::new();
            for &rank in &ranks {
                if let Some((current, working)) = amplitudes.pair(rank) {
                    diff.insert(rank, working.max_abs_difference(current));
                    max.insert(rank, working.max_abs_element());
                }
            }

            let converged = diff.iter().all(|(_, e)| e.magnitude <= cfg.conv_thresh);
            let diverged = max
                .iter()
                .any(|(_, e)| e.magnitude > cfg.div_thresh || e.magnitude.is_nan());

            let mut accelerated = false;
            if !converged && !diverged {
                let outcome = match accelerator.as_deref_mut() {
                    Some(acc) if iteration >= 2 => Some(accelerate(
                        acc,
                        amplitudes,
                        iteration,
                        cfg.acceleration.max_history_depth,
                    )?),
                    _ => None,
                };
                match outcome {
                    Some(Ok(())) => accelerated = true,
                    Some(Err(e)) => {
                        warn!(
                            "{} extrapolation failed at iteration {}: {}; continuing without acceleration",
                            cfg.acceleration.method, iteration, e
                        );
                        accelerator = None;
                        acceleration_disabled = true;
                    }
                    None => {}
                }

                for &rank in &ranks {
                    if let Some((current, working)) = amplitudes.pair_mut(rank) {
                        damp_in_place(current, working, iteration, cfg.damping.for_rank(rank));
                    }
                }
            }

            amplitudes.commit_all();
            if let Some(heff) = hooks.updater.effective_operator(&*amplitudes) {
                amplitudes.set_effective_operator(heff);
            }

            if cfg.checkpoint_every > 0 && iteration % cfg.checkpoint_every == 0 {
                hooks.checkpointer.write(sector, iteration, amplitudes)?;
            }

            let history_bytes = accelerator.as_ref().map_or(0, |a| a.size_in_bytes());
            let report = IterationReport {
                iteration,
                diff,
                max,
                accelerated,
                elapsed: iteration_start.elapsed(),
                total: start.elapsed(),
                memory_bytes: amplitudes.size_in_bytes() + history_bytes,
            };
            report.log_row(&ranks);
            last_report = Some(report);

            if diverged {
                status = SolveStatus::Diverged;
                break;
            }
            if converged {
                status = SolveStatus::Converged;
                break;
            }
        }

        info!("");
        info!("===========================================");
        match status {
            SolveStatus::Converged => {
                info!("   Sector {} converged in {} iterations", sector, iterations)
            }
            SolveStatus::Diverged => {
                warn!("   Sector {} diverged at iteration {}", sector, iterations)
            }
            SolveStatus::NoConvergence => warn!(
                "   Sector {} not converged after {} iterations",
                sector, iterations
            ),
        }
        info!("Wall time: {:.3} s", start.elapsed().as_secs_f64());
        info!("===========================================");

        Ok(SolveSummary {
            status,
            iterations,
            acceleration_disabled,
            last_report,
        })
    }
}

/// Push, truncate and extrapolate; overwrite the working tensors on success
fn accelerate<T: AmplitudeTensor>(
    accelerator: &mut dyn ConvergenceAccelerator<T>,
    amplitudes: &mut AmplitudeSet<T>,
    iteration: usize,
    max_depth: usize,
) -> Result<Result<(), ExtrapolationError>, SolverError> {
    accelerator.push(amplitudes, iteration)?;
    accelerator.truncate(max_depth);
    let mut extrapolated = match accelerator.extrapolate() {
        Ok(slots) => slots,
        Err(e) => return Ok(Err(e)),
    };
    for rank in amplitudes.active_ranks() {
        if let Some(tensor) = extrapolated.remove(rank) {
            amplitudes.set_working(rank, tensor);
        }
    }
    Ok(Ok(()))
}
