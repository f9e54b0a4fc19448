//! Amplitude Solver Command-Line Interface
//!
//! Solves model coupled-cluster amplitude equations sector by sector, as
//! described by a YAML configuration.

use color_eyre::eyre::Result;

mod app;
mod config;
mod io;

use app::CcampApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    CcampApplication::from_cli()?.run()
}
