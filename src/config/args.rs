//! Command-line argument parsing for amplitude solves

use ccamp::{AccelerationMethod, CcModel};
use clap::Parser;

/// Coupled-cluster amplitude solver with DIIS/CROP acceleration
#[derive(Parser, Debug)]
#[command(name = "ccamp")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override maximum number of iterations
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// Override convergence threshold
    #[arg(long)]
    pub conv_thresh: Option<f64>,

    /// Override divergence threshold
    #[arg(long)]
    pub div_thresh: Option<f64>,

    /// Acceleration method (none, diis, crop)
    #[arg(long)]
    pub acceleration: Option<AccelerationMethod>,

    /// Override the number of history entries kept for extrapolation
    #[arg(long)]
    pub max_history_depth: Option<usize>,

    /// Write a checkpoint every N iterations (0 disables)
    #[arg(long)]
    pub checkpoint_every: Option<usize>,

    /// Directory for checkpoint files
    #[arg(long)]
    pub checkpoint_dir: Option<String>,

    /// Coupled-cluster model (ccs, ccd, ccsd, ccsdt)
    #[arg(long)]
    pub model: Option<CcModel>,

    /// Use complex amplitudes
    #[arg(long)]
    pub complex: bool,

    /// Start from the amplitudes found in the checkpoint directory
    #[arg(long)]
    pub restart: bool,
}
