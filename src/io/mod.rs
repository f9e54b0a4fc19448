//! Input/Output operations for amplitude solves
//!
//! This module handles logging setup and the final result table.

mod output;

pub use output::{print_summary, setup_output, SectorResult};
