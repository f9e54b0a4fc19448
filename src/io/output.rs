//! Output formatting and logging utilities

use ccamp::{Sector, SolveStatus};
use color_eyre::eyre::Result;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::time::SystemTime as StdSystemTime;
use tracing::info;
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt,
    util::SubscriberInitExt, Registry,
};

/// Wall-clock timer with second precision
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let duration = StdSystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        let total_seconds = duration.as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Setup output logging to file or stdout
pub fn setup_output(output_path: Option<&String>) {
    match output_path {
        Some(path) => match File::create(path) {
            Ok(log) => {
                let file_layer = layer()
                    .with_writer(log)
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false);
                Registry::default().with(file_layer).init();
                info!("Output will be written to: {}", path);
            }
            Err(e) => eprintln!("Could not create output file {}: {}", path, e),
        },
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            Registry::default().with(stdout_layer).init();
        }
    }
}

/// Outcome of one sector, as shown in the final table
#[derive(Debug, Clone)]
pub struct SectorResult {
    pub sector: Sector,
    pub skipped: bool,
    pub status: SolveStatus,
    pub iterations: usize,
    pub max_amplitude: f64,
    pub energy: f64,
    pub acceleration_disabled: bool,
}

/// Print the per-sector result table to a writer
pub fn print_summary<W: Write>(writer: &mut W, results: &[SectorResult]) -> Result<()> {
    writeln!(writer, "Amplitude Solver Summary")?;
    writeln!(writer, "========================\n")?;
    writeln!(
        writer,
        "{:>8} {:>15} {:>6} {:>14} {:>18}",
        "Sector", "Status", "Iter", "max|t|", "Energy"
    )?;
    writeln!(writer, "{}", "-".repeat(65))?;

    for r in results {
        let status = if r.skipped {
            "skipped".to_string()
        } else {
            r.status.to_string()
        };
        writeln!(
            writer,
            "{:>8} {:>15} {:>6} {:>14.6e} {:>18.10}{}",
            r.sector.to_string(),
            status,
            r.iterations,
            r.max_amplitude,
            r.energy,
            if r.acceleration_disabled { "  (unaccelerated)" } else { "" }
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_table() {
        let results = vec![
            SectorResult {
                sector: Sector::vacuum(),
                skipped: false,
                status: SolveStatus::Converged,
                iterations: 14,
                max_amplitude: 0.0421,
                energy: -0.0123456789,
                acceleration_disabled: false,
            },
            SectorResult {
                sector: Sector::new(1, 0),
                skipped: true,
                status: SolveStatus::Converged,
                iterations: 0,
                max_amplitude: 0.0,
                energy: 0.0,
                acceleration_disabled: false,
            },
        ];
        let mut buffer = Vec::new();
        print_summary(&mut buffer, &results).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("0h0p"));
        assert!(text.contains("converged"));
        assert!(text.contains("skipped"));
        assert!(text.contains("-0.0123456789"));
    }
}
