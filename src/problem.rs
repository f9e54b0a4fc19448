//! Synthetic amplitude equations
//!
//! A small, dense stand-in for the coupled-cluster equations that exercises
//! the solver end to end:
//!
//! ```text
//! D_r · t_r = v_r + c·K(t_r) + λ·P_r(t) + c·Q_r(t_{r+1})
//! ```
//!
//! * `D_r` orbital-energy denominators, `Σ ε_a - Σ ε_i` plus a sector shift
//! * `v_r` a fixed driving term (the "integrals")
//! * `K` a banded mixing kernel over the flattened tensor
//! * `P_r` the quadratic term: t1∘t1 for singles, t1⊗t1 for doubles,
//!   t1⊗t2 for triples
//! * `Q_r` the mean over the extra index pair of the next-higher rank
//!
//! The updater returns the right-hand side; division by `D_r` is left to the
//! solver's [`DiagonalDenominators`].

use crate::amplitudes::{AmplitudeSet, Rank, RankSlots, TensorStore};
use crate::error::SolverError;
use crate::model::Sector;
use crate::solver_impl::{AmplitudeUpdater, DiagonalDenominators};
use crate::tensor::{AmplitudeTensor, DenseTensor, PhasedScalar};
use rayon::prelude::*;

/// Orbital-energy spacing within the occupied and virtual blocks
const LEVEL_SPACING: f64 = 0.1;

/// Denominator shift per hole or particle of the sector
const SECTOR_SHIFT: f64 = 0.1;

/// Half-width of the banded mixing kernel
const KERNEL_WIDTH: usize = 2;

/// Denominators below this magnitude zero the amplitude
pub const SELECTION_THRESHOLD: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProblemParams {
    pub nocc: usize,
    pub nvirt: usize,
    /// Strength c of the linear couplings
    pub coupling: f64,
    /// Strength λ of the quadratic term
    pub nonlinearity: f64,
    /// HOMO-LUMO half gap
    pub gap: f64,
}

impl Default for ProblemParams {
    fn default() -> Self {
        ProblemParams {
            nocc: 4,
            nvirt: 8,
            coupling: 0.3,
            nonlinearity: 0.5,
            gap: 0.5,
        }
    }
}

impl ProblemParams {
    pub fn validate(&self) -> Result<(), SolverError> {
        if self.nocc == 0 || self.nvirt == 0 {
            return Err(SolverError::InvalidConfig(format!(
                "problem needs occupied and virtual orbitals, got nocc={} nvirt={}",
                self.nocc, self.nvirt
            )));
        }
        if !(self.gap > 0.0) {
            return Err(SolverError::InvalidConfig(format!(
                "problem gap must be positive, got {}",
                self.gap
            )));
        }
        Ok(())
    }
}

/// Model amplitude equations of one sector
#[derive(Debug, Clone)]
pub struct ModelProblem<T: PhasedScalar> {
    params: ProblemParams,
    sector: Sector,
    eps_occ: Vec<f64>,
    eps_virt: Vec<f64>,
    driving: RankSlots<DenseTensor<T>>,
}

impl<T: PhasedScalar> ModelProblem<T> {
    pub fn new(params: ProblemParams, sector: Sector) -> Result<Self, SolverError> {
        params.validate()?;
        let eps_occ = (0..params.nocc)
            .map(|i| -params.gap - LEVEL_SPACING * i as f64)
            .collect();
        let eps_virt = (0..params.nvirt)
            .map(|a| params.gap + LEVEL_SPACING * a as f64)
            .collect();

        let mut problem = ModelProblem {
            params,
            sector,
            eps_occ,
            eps_virt,
            driving: RankSlots::new(),
        };
        for rank in Rank::ALL {
            let v = DenseTensor::from_fn(&problem.shape(rank), driving_element::<T>);
            problem.driving.insert(rank, v);
        }
        Ok(problem)
    }

    pub fn sector(&self) -> Sector {
        self.sector
    }

    /// [o; l] followed by [v; l] for excitation level l
    pub fn shape(&self, rank: Rank) -> Vec<usize> {
        let level = rank.excitation_level();
        let mut shape = vec![self.params.nocc; level];
        shape.extend(std::iter::repeat(self.params.nvirt).take(level));
        shape
    }

    pub fn driving_term(&self, rank: Rank) -> Option<&DenseTensor<T>> {
        self.driving.get(rank)
    }

    pub fn denominators(&self, rank: Rank) -> DenseTensor<f64> {
        let level = rank.excitation_level();
        let shift = SECTOR_SHIFT * (self.sector.holes + self.sector.particles) as f64;
        DenseTensor::from_fn(&self.shape(rank), |idx| {
            let occ: f64 = idx[..level].iter().map(|&i| self.eps_occ[i]).sum();
            let virt: f64 = idx[level..].iter().map(|&a| self.eps_virt[a]).sum();
            virt - occ + shift
        })
    }

    /// Denominator policy covering `ranks`
    pub fn denominator_policy(&self, ranks: &[Rank]) -> DiagonalDenominators {
        ranks
            .iter()
            .fold(DiagonalDenominators::new(SELECTION_THRESHOLD), |policy, &rank| {
                policy.with_rank(rank, self.denominators(rank))
            })
    }

    /// Zero singles and triples, first-order doubles v/D
    pub fn initial_amplitudes(&self, ranks: &[Rank]) -> AmplitudeSet<DenseTensor<T>> {
        let mut amplitudes = AmplitudeSet::new();
        for &rank in ranks {
            let guess = match (rank, self.driving.get(rank)) {
                (Rank::Doubles, Some(v)) => {
                    let d = self.denominators(rank);
                    let values = v
                        .as_slice()
                        .iter()
                        .zip(d.as_slice())
                        .map(|(&x, &d)| x.unscale(d))
                        .collect();
                    DenseTensor::from_vec(v.shape(), values)
                        .unwrap_or_else(|_| DenseTensor::zeros(v.shape()))
                }
                _ => DenseTensor::zeros(&self.shape(rank)),
            };
            amplitudes.enable(rank, guess);
        }
        amplitudes
    }

    /// Re⟨v1|t1⟩ + ¼ Re⟨v2|t2⟩ over the active ranks
    pub fn correlation_energy(&self, amplitudes: &dyn TensorStore<DenseTensor<T>>) -> f64 {
        let mut energy = 0.0;
        for (rank, weight) in [(Rank::Singles, 1.0), (Rank::Doubles, 0.25)] {
            if let (Some(v), Some(t)) = (self.driving.get(rank), amplitudes.current(rank)) {
                energy += weight * v.inner_product_re(t);
            }
        }
        energy
    }

    /// Right-hand side of the equations for `rank`
    fn numerator(
        &self,
        rank: Rank,
        amplitudes: &dyn TensorStore<DenseTensor<T>>,
    ) -> Option<DenseTensor<T>> {
        let t = amplitudes.current(rank)?;
        let v = self.driving.get(rank)?;
        let singles = amplitudes.current(Rank::Singles);
        let doubles = amplitudes.current(Rank::Doubles);
        let higher = match rank {
            Rank::Singles => amplitudes.current(Rank::Doubles),
            Rank::Doubles => amplitudes.current(Rank::Triples),
            Rank::Triples => None,
        };
        let c = self.params.coupling;
        let lambda = self.params.nonlinearity;
        let level = rank.excitation_level();

        let values: Vec<T> = (0..t.len())
            .into_par_iter()
            .map(|p| {
                let idx = t.unravel(p);
                let mut value = v.as_slice()[p] + banded_mixing(t.as_slice(), p).scale(c);
                value += quadratic_term(rank, &idx, t, singles, doubles).scale(lambda);
                if let Some(h) = higher {
                    value += self.higher_rank_mean(&idx, level, h).scale(c);
                }
                value
            })
            .collect();

        DenseTensor::from_vec(t.shape(), values).ok()
    }

    /// Mean of t_{r+1}[occ.., k, virt.., c] over the extra pair (k, c)
    fn higher_rank_mean(&self, idx: &[usize], level: usize, higher: &DenseTensor<T>) -> T {
        let (occ, virt) = idx.split_at(level);
        let mut full = Vec::with_capacity(idx.len() + 2);
        let mut sum = T::zero();
        for k in 0..self.params.nocc {
            for c in 0..self.params.nvirt {
                full.clear();
                full.extend_from_slice(occ);
                full.push(k);
                full.extend_from_slice(virt);
                full.push(c);
                sum += higher.get(&full);
            }
        }
        sum.unscale((self.params.nocc * self.params.nvirt) as f64)
    }
}

impl<T: PhasedScalar> AmplitudeUpdater<DenseTensor<T>> for ModelProblem<T> {
    fn construct_singles(
        &mut self,
        amplitudes: &dyn TensorStore<DenseTensor<T>>,
    ) -> Option<DenseTensor<T>> {
        self.numerator(Rank::Singles, amplitudes)
    }

    fn construct_doubles(
        &mut self,
        amplitudes: &dyn TensorStore<DenseTensor<T>>,
    ) -> Option<DenseTensor<T>> {
        self.numerator(Rank::Doubles, amplitudes)
    }

    fn construct_triples(
        &mut self,
        amplitudes: &dyn TensorStore<DenseTensor<T>>,
    ) -> Option<DenseTensor<T>> {
        self.numerator(Rank::Triples, amplitudes)
    }

    /// One-element tensor holding the correlation energy
    fn effective_operator(
        &mut self,
        amplitudes: &dyn TensorStore<DenseTensor<T>>,
    ) -> Option<DenseTensor<T>> {
        let energy = self.correlation_energy(amplitudes);
        DenseTensor::from_vec(&[1], vec![T::from_real(energy)]).ok()
    }
}

/// v[i.., a..] = 0.1 / (1 + Σidx/2), with a phase for complex scalars
fn driving_element<T: PhasedScalar>(idx: &[usize]) -> T {
    let level = idx.len() / 2;
    let occ: usize = idx[..level].iter().sum();
    let virt: usize = idx[level..].iter().sum();
    let magnitude = 0.1 / (1.0 + 0.5 * (occ + virt) as f64);
    T::with_phase(magnitude, 0.4 * (occ as f64 - virt as f64))
}

/// Σ_{0<|p-q|≤w} t[q] / (1 + |p-q|)
fn banded_mixing<T: PhasedScalar>(t: &[T], p: usize) -> T {
    let lo = p.saturating_sub(KERNEL_WIDTH);
    let hi = (p + KERNEL_WIDTH).min(t.len().saturating_sub(1));
    let mut sum = T::zero();
    for q in lo..=hi {
        if q != p {
            sum += t[q].unscale(1.0 + p.abs_diff(q) as f64);
        }
    }
    sum
}

fn quadratic_term<T: PhasedScalar>(
    rank: Rank,
    idx: &[usize],
    t: &DenseTensor<T>,
    singles: Option<&DenseTensor<T>>,
    doubles: Option<&DenseTensor<T>>,
) -> T {
    match (rank, idx) {
        (Rank::Doubles, &[i, j, a, b]) => match singles {
            Some(t1) => t1.get(&[i, a]) * t1.get(&[j, b]),
            None => square(t.get(idx)),
        },
        (Rank::Triples, &[i, j, k, a, b, c]) => match (singles, doubles) {
            (Some(t1), Some(t2)) => t1.get(&[i, a]) * t2.get(&[j, k, b, c]),
            _ => square(t.get(idx)),
        },
        _ => square(t.get(idx)),
    }
}

fn square<T: PhasedScalar>(x: T) -> T {
    x * x
}
