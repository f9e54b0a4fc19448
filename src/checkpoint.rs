//! Amplitude checkpoints
//!
//! The solver hands the committed amplitudes to a [`Checkpointer`] every
//! `checkpoint_every` iterations. [`BincodeCheckpointer`] writes one file per
//! tensor, `<dir>/<sector>_<rank>.chk` and `<dir>/<sector>_heff.chk` for the
//! effective operator. Files are written to a temporary name first and renamed,
//! so a crash never leaves a truncated checkpoint behind.
//!
//! The convergence history is not part of a checkpoint; a restart begins with
//! an empty queue.

use crate::amplitudes::{AmplitudeSet, Rank};
use crate::error::SolverError;
use crate::model::Sector;
use crate::tensor::AmplitudeTensor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Serialization collaborator used for checkpointing
pub trait Checkpointer<T> {
    fn write(
        &mut self,
        sector: Sector,
        iteration: usize,
        amplitudes: &AmplitudeSet<T>,
    ) -> Result<(), SolverError>;
}

/// Checkpointer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCheckpoint;

impl<T> Checkpointer<T> for NoCheckpoint {
    fn write(&mut self, _: Sector, _: usize, _: &AmplitudeSet<T>) -> Result<(), SolverError> {
        Ok(())
    }
}

/// Binary checkpoints in a directory
#[derive(Debug, Clone)]
pub struct BincodeCheckpointer {
    dir: PathBuf,
    writes: usize,
}

impl BincodeCheckpointer {
    /// Create the checkpoint directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SolverError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(BincodeCheckpointer { dir, writes: 0 })
    }

    /// Number of completed checkpoint writes
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl<T: AmplitudeTensor + Serialize> Checkpointer<T> for BincodeCheckpointer {
    fn write(
        &mut self,
        sector: Sector,
        iteration: usize,
        amplitudes: &AmplitudeSet<T>,
    ) -> Result<(), SolverError> {
        for rank in amplitudes.active_ranks() {
            if let Some(tensor) = amplitudes.current(rank) {
                write_tensor(&rank_path(&self.dir, sector, rank), tensor)?;
            }
        }
        if let Some(heff) = amplitudes.effective_operator() {
            write_tensor(&heff_path(&self.dir, sector), heff)?;
        }
        self.writes += 1;
        info!(
            "Checkpoint written for sector {} at iteration {} ({})",
            sector,
            iteration,
            self.dir.display()
        );
        Ok(())
    }
}

/// File holding the amplitude of one rank
pub fn rank_path(dir: &Path, sector: Sector, rank: Rank) -> PathBuf {
    dir.join(format!("{}_{}.chk", sector, rank.label().to_lowercase()))
}

/// File holding the effective operator
pub fn heff_path(dir: &Path, sector: Sector) -> PathBuf {
    dir.join(format!("{}_heff.chk", sector))
}

fn write_tensor<T: Serialize>(path: &Path, tensor: &T) -> Result<(), SolverError> {
    let tmp = path.with_extension("chk.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        bincode::serialize_into(&mut writer, tensor)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Read one rank's amplitude back; `None` when no checkpoint exists
pub fn restore<T: DeserializeOwned>(
    dir: &Path,
    sector: Sector,
    rank: Rank,
) -> Result<Option<T>, SolverError> {
    read_tensor(&rank_path(dir, sector, rank))
}

/// Read the effective operator back; `None` when no checkpoint exists
pub fn restore_effective_operator<T: DeserializeOwned>(
    dir: &Path,
    sector: Sector,
) -> Result<Option<T>, SolverError> {
    read_tensor(&heff_path(dir, sector))
}

fn read_tensor<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SolverError> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    let tensor = bincode::deserialize_from(reader)?;
    debug!("Read {}", path.display());
    Ok(Some(tensor))
}
