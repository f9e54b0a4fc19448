use crate::config::Config;
use crate::io::SectorResult;
use ccamp::checkpoint::{self, BincodeCheckpointer, Checkpointer, NoCheckpoint};
use ccamp::{
    AmplitudeSet, AmplitudeSolver, AmplitudeTensor, DenseTensor, ModelProblem, PhasedScalar, Rank,
    Sector, SolveHooks,
};
use color_eyre::eyre::{Result, WrapErr};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Build the model equations of one sector and solve them
pub fn run_sector<T>(
    config: &Config,
    sector: Sector,
    skip: bool,
    restart: bool,
) -> Result<SectorResult>
where
    T: PhasedScalar + Serialize + DeserializeOwned,
{
    let ranks = config.active_ranks();
    let model = config.model();
    if !skip {
        check_model_ranks(config, &ranks);
    }

    let mut problem = ModelProblem::<T>::new(config.problem_params(), sector)?;
    let mut amplitudes = problem.initial_amplitudes(&ranks);
    if restart && !skip {
        restore_amplitudes(config, sector, &problem, &mut amplitudes)?;
    }
    let denominators = problem.denominator_policy(&ranks);
    let mut checkpointer = create_checkpointer::<T>(config)?;
    let must_clear = move |rank: Rank| model.must_clear(rank);
    let solver = AmplitudeSolver::new(config.solver_config())?;

    info!("\nSolving {} amplitude equations for sector {}...", model, sector);
    let summary = {
        let mut hooks = SolveHooks::new(&mut problem, &denominators, checkpointer.as_mut())
            .with_must_clear(&must_clear);
        solver.solve(sector, skip, &mut amplitudes, &mut hooks)?
    };
    if skip {
        return Ok(SectorResult {
            sector,
            skipped: true,
            status: summary.status,
            iterations: summary.iterations,
            max_amplitude: 0.0,
            energy: 0.0,
            acceleration_disabled: summary.acceleration_disabled,
        });
    }

    let max_amplitude = ranks
        .iter()
        .filter_map(|&rank| amplitudes.current(rank))
        .map(|t| t.max_abs_element().magnitude)
        .fold(0.0, f64::max);

    Ok(SectorResult {
        sector,
        skipped: false,
        status: summary.status,
        iterations: summary.iterations,
        max_amplitude,
        energy: problem.correlation_energy(&amplitudes),
        acceleration_disabled: summary.acceleration_disabled,
    })
}

fn check_model_ranks(config: &Config, ranks: &[Rank]) {
    let model = config.model();
    for &rank in ranks {
        if model.must_clear(rank) {
            warn!("{} amplitudes are tracked but {} keeps them at zero", rank, model);
        }
    }
    for rank in model.ranks() {
        if !ranks.contains(&rank) {
            warn!("{} uses {} amplitudes, but they are not tracked", model, rank);
        }
    }
}

fn create_checkpointer<T>(config: &Config) -> Result<Box<dyn Checkpointer<DenseTensor<T>>>>
where
    T: PhasedScalar + Serialize,
{
    let every = config.solver.checkpoint_every.unwrap_or(0);
    match (&config.solver.checkpoint_dir, every) {
        (Some(dir), every) if every > 0 => {
            let checkpointer = BincodeCheckpointer::new(dir)
                .wrap_err_with(|| format!("Unable to create checkpoint directory: {}", dir))?;
            info!("Checkpoints every {} iterations in {}", every, dir);
            Ok(Box::new(checkpointer))
        }
        (None, every) if every > 0 => {
            warn!("checkpoint_every is set but no checkpoint_dir is given; checkpoints disabled");
            Ok(Box::new(NoCheckpoint))
        }
        _ => Ok(Box::new(NoCheckpoint)),
    }
}

fn restore_amplitudes<T>(
    config: &Config,
    sector: Sector,
    problem: &ModelProblem<T>,
    amplitudes: &mut AmplitudeSet<DenseTensor<T>>,
) -> Result<()>
where
    T: PhasedScalar + DeserializeOwned,
{
    let Some(dir) = config.solver.checkpoint_dir.as_deref() else {
        warn!("Restart requested without checkpoint_dir; starting from the initial guess");
        return Ok(());
    };
    let dir = Path::new(dir);

    for rank in amplitudes.active_ranks() {
        let restored: Option<DenseTensor<T>> = checkpoint::restore(dir, sector, rank)
            .wrap_err_with(|| format!("Unable to read {} checkpoint for sector {}", rank, sector))?;
        match restored {
            Some(t) if t.shape() == problem.shape(rank).as_slice() => {
                info!("Restarting {} of sector {} from {}", rank, sector, dir.display());
                amplitudes.enable(rank, t);
            }
            Some(t) => warn!(
                "Ignoring {} checkpoint with shape {:?}, expected {:?}",
                rank,
                t.shape(),
                problem.shape(rank)
            ),
            None => info!("No {} checkpoint for sector {}", rank, sector),
        }
    }
    if let Some(heff) = checkpoint::restore_effective_operator::<DenseTensor<T>>(dir, sector)? {
        amplitudes.set_effective_operator(heff);
    }
    Ok(())
}
