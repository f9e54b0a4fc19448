//! Damping of amplitude updates
//!
//! Early iterations are stabilized by mixing part of the previous amplitude
//! into the new one:
//!
//! t' = (1 - α) t_new + α t_old
//!
//! Damping is configured per rank and switched off after `stop_iteration`.

use crate::amplitudes::Rank;
use crate::error::SolverError;
use crate::tensor::AmplitudeTensor;
use serde::{Deserialize, Serialize};

/// Damping settings of one rank
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DampingConfig {
    pub enabled: bool,
    /// Weight α of the previous amplitude, in [0, 1)
    pub factor: f64,
    /// Last iteration (1-based) at which damping is applied
    pub stop_iteration: usize,
}

impl Default for DampingConfig {
    fn default() -> Self {
        DampingConfig::disabled()
    }
}

impl DampingConfig {
    pub fn disabled() -> Self {
        DampingConfig {
            enabled: false,
            factor: 0.0,
            stop_iteration: 0,
        }
    }

    pub fn new(factor: f64, stop_iteration: usize) -> Self {
        DampingConfig {
            enabled: true,
            factor,
            stop_iteration,
        }
    }

    /// Whether damping acts at the given iteration
    pub fn is_active(&self, iteration: usize) -> bool {
        self.enabled && iteration <= self.stop_iteration
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        if self.enabled && !(0.0..1.0).contains(&self.factor) {
            return Err(SolverError::InvalidConfig(format!(
                "damping factor must lie in [0, 1), got {}",
                self.factor
            )));
        }
        Ok(())
    }
}

/// Damping settings for all ranks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DampingSchedule {
    #[serde(default)]
    pub singles: DampingConfig,
    #[serde(default)]
    pub doubles: DampingConfig,
    #[serde(default)]
    pub triples: DampingConfig,
}

impl DampingSchedule {
    pub fn for_rank(&self, rank: Rank) -> &DampingConfig {
        match rank {
            Rank::Singles => &self.singles,
            Rank::Doubles => &self.doubles,
            Rank::Triples => &self.triples,
        }
    }

    pub fn set(&mut self, rank: Rank, config: DampingConfig) {
        match rank {
            Rank::Singles => self.singles = config,
            Rank::Doubles => self.doubles = config,
            Rank::Triples => self.triples = config,
        }
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        Rank::ALL
            .into_iter()
            .try_for_each(|rank| self.for_rank(rank).validate())
    }
}

/// Damped update: `(1 - α)·working + α·current` while damping is active,
/// `working` unchanged otherwise
pub fn damp<T: AmplitudeTensor>(
    current: &T,
    mut working: T,
    iteration: usize,
    config: &DampingConfig,
) -> T {
    damp_in_place(current, &mut working, iteration, config);
    working
}

/// In-place form of [`damp`]; returns whether the working tensor changed
pub fn damp_in_place<T: AmplitudeTensor>(
    current: &T,
    working: &mut T,
    iteration: usize,
    config: &DampingConfig,
) -> bool {
    if !config.is_active(iteration) || config.factor == 0.0 {
        return false;
    }
    working.scale(1.0 - config.factor);
    working.scaled_add(config.factor, current);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DenseTensor;

    fn vector(values: &[f64]) -> DenseTensor<f64> {
        DenseTensor::from_vec(&[values.len()], values.to_vec()).unwrap()
    }

    #[test]
    fn test_affine_combination_while_active() {
        let current = vector(&[1.0, -2.0, 0.3]);
        let working = vector(&[0.7, 4.0, -1.1]);
        for &alpha in &[0.0, 0.1, 0.25, 0.5, 0.9, 0.999] {
            let cfg = DampingConfig::new(alpha, 5);
            for iteration in 1..=5 {
                let damped = damp(&current, working.clone(), iteration, &cfg);
                for (k, value) in damped.as_slice().iter().enumerate() {
                    let expected =
                        (1.0 - alpha) * working.as_slice()[k] + alpha * current.as_slice()[k];
                    assert_eq!(*value, expected, "alpha={alpha} iteration={iteration}");
                }
            }
        }
    }

    #[test]
    fn test_identity_after_stop_iteration() {
        let current = vector(&[1.0, 1.0]);
        let working = vector(&[3.0, -3.0]);
        let cfg = DampingConfig::new(0.5, 3);
        for iteration in 4..10 {
            assert_eq!(damp(&current, working.clone(), iteration, &cfg), working);
        }
    }

    #[test]
    fn test_disabled_is_identity() {
        let current = vector(&[1.0]);
        let working = vector(&[2.0]);
        let mut out = working.clone();
        assert!(!damp_in_place(&current, &mut out, 1, &DampingConfig::disabled()));
        assert_eq!(out, working);
    }

    #[test]
    fn test_validate_rejects_factor_of_one() {
        assert!(DampingConfig::new(1.0, 10).validate().is_err());
        assert!(DampingConfig::new(-0.1, 10).validate().is_err());
        assert!(DampingConfig::new(0.95, 10).validate().is_ok());
        // Disabled entries are not checked
        let mut cfg = DampingConfig::new(2.0, 10);
        cfg.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_schedule_active_ranks() {
        let mut schedule = DampingSchedule::default();
        schedule.set(Rank::Doubles, DampingConfig::new(0.3, 2));
        let active = |iteration| {
            Rank::ALL
                .into_iter()
                .filter(|&r| schedule.for_rank(r).is_active(iteration))
                .collect::<Vec<_>>()
        };
        assert_eq!(active(2), vec![Rank::Doubles]);
        assert!(active(3).is_empty());
    }
}
