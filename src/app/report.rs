use crate::io::SectorResult;
use ccamp::SolveStatus;
use tracing::{info, warn};

pub fn report_sector(result: &SectorResult) {
    if result.skipped {
        return;
    }
    info!("\nSector {} finished: {}", result.sector, result.status);
    info!("  Iterations:           {}", result.iterations);
    info!("  Largest amplitude:    {:.6e}", result.max_amplitude);
    info!("  Correlation energy:   {:.10} au", result.energy);
    if result.acceleration_disabled {
        warn!("  Extrapolation became singular; the rest of the solve ran unaccelerated");
    }
}

pub fn report_summary(results: &[SectorResult]) {
    let solved: Vec<_> = results.iter().filter(|r| !r.skipped).collect();
    let converged = solved
        .iter()
        .filter(|r| r.status == SolveStatus::Converged)
        .count();
    info!(
        "\n{} of {} solved sectors converged ({} skipped)",
        converged,
        solved.len(),
        results.len() - solved.len()
    );
    for r in solved.iter().filter(|r| r.status != SolveStatus::Converged) {
        warn!("  Sector {}: {}", r.sector, r.status);
    }
}
