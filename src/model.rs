//! Coupled-cluster models and Fock-space sectors
//!
//! A [`CcModel`] restricts which excitation ranks may carry non-zero
//! amplitudes. The solver does not know about models; it only receives the
//! `must_clear` predicate built from one.

use crate::amplitudes::Rank;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Truncation level of the cluster operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CcModel {
    Ccs,
    Ccd,
    Ccsd,
    Ccsdt,
}

impl CcModel {
    /// Whether amplitudes of `rank` have to be zeroed under this model
    pub fn must_clear(self, rank: Rank) -> bool {
        match self {
            CcModel::Ccs => rank != Rank::Singles,
            CcModel::Ccd => rank != Rank::Doubles,
            CcModel::Ccsd => rank == Rank::Triples,
            CcModel::Ccsdt => false,
        }
    }

    /// Ranks the model needs to track
    pub fn ranks(self) -> Vec<Rank> {
        Rank::ALL
            .into_iter()
            .filter(|&r| !self.must_clear(r))
            .collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            CcModel::Ccs => "CCS",
            CcModel::Ccd => "CCD",
            CcModel::Ccsd => "CCSD",
            CcModel::Ccsdt => "CCSDT",
        }
    }
}

impl fmt::Display for CcModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CcModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ccs" => Ok(CcModel::Ccs),
            "ccd" => Ok(CcModel::Ccd),
            "ccsd" => Ok(CcModel::Ccsd),
            "ccsdt" => Ok(CcModel::Ccsdt),
            _ => Err(format!("Unknown coupled-cluster model: {s}")),
        }
    }
}

/// Fock-space sector: number of holes and particles relative to the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Sector {
    pub holes: usize,
    pub particles: usize,
}

impl Sector {
    pub fn new(holes: usize, particles: usize) -> Self {
        Sector { holes, particles }
    }

    /// The ground-state sector 0h0p
    pub fn vacuum() -> Self {
        Sector::default()
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h{}p", self.holes, self.particles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_must_clear_rules() {
        assert!(CcModel::Ccs.must_clear(Rank::Doubles));
        assert!(CcModel::Ccs.must_clear(Rank::Triples));
        assert!(!CcModel::Ccs.must_clear(Rank::Singles));

        assert!(CcModel::Ccd.must_clear(Rank::Singles));
        assert!(CcModel::Ccd.must_clear(Rank::Triples));
        assert!(!CcModel::Ccd.must_clear(Rank::Doubles));

        assert_eq!(CcModel::Ccsd.ranks(), vec![Rank::Singles, Rank::Doubles]);
        assert_eq!(CcModel::Ccsdt.ranks(), Rank::ALL.to_vec());
    }

    #[test]
    fn test_model_from_str() {
        assert_eq!("CCSD".parse::<CcModel>(), Ok(CcModel::Ccsd));
        assert!("ccsd(t)".parse::<CcModel>().is_err());
    }

    #[test]
    fn test_sector_display() {
        assert_eq!(Sector::vacuum().to_string(), "0h0p");
        assert_eq!(Sector::new(1, 2).to_string(), "1h2p");
    }
}
