//! Configuration management for amplitude solves
//!
//! YAML sections are structs of optional fields; `with_defaults` fills in
//! whatever the file leaves out, and the accessor methods turn the result
//! into the library's configuration types.

mod args;

pub use args::Args;

use ccamp::{
    AccelerationConfig, AccelerationMethod, CcModel, DampingConfig, DampingSchedule,
    ProblemParams, Rank, Sector, SolverConfig,
};
use color_eyre::eyre::{bail, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub solver: SolverParams,
    #[serde(default)]
    pub ranks: RankParams,
    #[serde(default)]
    pub damping: DampingParams,
    #[serde(default)]
    pub acceleration: AccelerationParams,
    pub model: Option<CcModel>,
    /// Sectors solved in order; the vacuum sector when empty
    #[serde(default)]
    pub sectors: Vec<SectorParams>,
    #[serde(default)]
    pub problem: ProblemConfig,
}

/// Iteration control
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SolverParams {
    pub max_iter: Option<usize>,
    pub conv_thresh: Option<f64>,
    pub div_thresh: Option<f64>,
    /// Checkpoint interval, 0 disables checkpoints
    pub checkpoint_every: Option<usize>,
    pub checkpoint_dir: Option<String>,
}

impl Default for SolverParams {
    fn default() -> Self {
        SolverParams {
            max_iter: Some(50),
            conv_thresh: Some(1e-9),
            div_thresh: Some(1e3),
            checkpoint_every: Some(0),
            checkpoint_dir: None,
        }
    }
}

impl SolverParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.max_iter.is_none() {
            self.max_iter = defaults.max_iter;
        }
        if self.conv_thresh.is_none() {
            self.conv_thresh = defaults.conv_thresh;
        }
        if self.div_thresh.is_none() {
            self.div_thresh = defaults.div_thresh;
        }
        if self.checkpoint_every.is_none() {
            self.checkpoint_every = defaults.checkpoint_every;
        }
        self
    }
}

/// Which amplitude ranks are tracked
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RankParams {
    pub singles: Option<bool>,
    pub doubles: Option<bool>,
    pub triples: Option<bool>,
}

impl Default for RankParams {
    fn default() -> Self {
        RankParams {
            singles: Some(true),
            doubles: Some(true),
            triples: Some(false),
        }
    }
}

impl RankParams {
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.singles.is_none() {
            self.singles = defaults.singles;
        }
        if self.doubles.is_none() {
            self.doubles = defaults.doubles;
        }
        if self.triples.is_none() {
            self.triples = defaults.triples;
        }
        self
    }
}

/// Damping of one rank; disabled unless a factor is given
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RankDamping {
    pub enabled: Option<bool>,
    pub factor: Option<f64>,
    pub stop_iteration: Option<usize>,
}

impl RankDamping {
    fn to_config(&self) -> DampingConfig {
        match self.factor {
            Some(factor) if self.enabled.unwrap_or(true) => {
                DampingConfig::new(factor, self.stop_iteration.unwrap_or(usize::MAX))
            }
            _ => DampingConfig::disabled(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DampingParams {
    #[serde(default)]
    pub singles: RankDamping,
    #[serde(default)]
    pub doubles: RankDamping,
    #[serde(default)]
    pub triples: RankDamping,
}

impl DampingParams {
    fn ranks(&self) -> [(&'static str, &RankDamping); 3] {
        [
            ("singles", &self.singles),
            ("doubles", &self.doubles),
            ("triples", &self.triples),
        ]
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AccelerationParams {
    pub method: Option<AccelerationMethod>,
    pub max_history_depth: Option<usize>,
}

impl Default for AccelerationParams {
    fn default() -> Self {
        let defaults = AccelerationConfig::default();
        AccelerationParams {
            method: Some(defaults.method),
            max_history_depth: Some(defaults.max_history_depth),
        }
    }
}

impl AccelerationParams {
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.method.is_none() {
            self.method = defaults.method;
        }
        if self.max_history_depth.is_none() {
            self.max_history_depth = defaults.max_history_depth;
        }
        self
    }
}

/// One Fock-space sector
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SectorParams {
    pub holes: usize,
    pub particles: usize,
    #[serde(default)]
    pub skip: bool,
}

/// Parameters of the synthetic amplitude equations
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProblemConfig {
    pub nocc: Option<usize>,
    pub nvirt: Option<usize>,
    pub coupling: Option<f64>,
    pub nonlinearity: Option<f64>,
    pub gap: Option<f64>,
    /// Solve with complex amplitudes
    pub complex: Option<bool>,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        let defaults = ProblemParams::default();
        ProblemConfig {
            nocc: Some(defaults.nocc),
            nvirt: Some(defaults.nvirt),
            coupling: Some(defaults.coupling),
            nonlinearity: Some(defaults.nonlinearity),
            gap: Some(defaults.gap),
            complex: Some(false),
        }
    }
}

impl ProblemConfig {
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.nocc.is_none() {
            self.nocc = defaults.nocc;
        }
        if self.nvirt.is_none() {
            self.nvirt = defaults.nvirt;
        }
        if self.coupling.is_none() {
            self.coupling = defaults.coupling;
        }
        if self.nonlinearity.is_none() {
            self.nonlinearity = defaults.nonlinearity;
        }
        if self.gap.is_none() {
            self.gap = defaults.gap;
        }
        if self.complex.is_none() {
            self.complex = defaults.complex;
        }
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        self.solver = self.solver.with_defaults();
        self.ranks = self.ranks.with_defaults();
        self.acceleration = self.acceleration.with_defaults();
        self.problem = self.problem.with_defaults();
        if self.model.is_none() {
            self.model = Some(CcModel::Ccsd);
        }
        self
    }

    /// Reject damping that is enabled without a factor
    pub fn validate(&self) -> Result<()> {
        for (name, damping) in self.damping.ranks() {
            if damping.enabled == Some(true) && damping.factor.is_none() {
                bail!("damping.{}: enabled without a factor", name);
            }
        }
        Ok(())
    }

    /// Numerical settings handed to the solver
    pub fn solver_config(&self) -> SolverConfig {
        let defaults = SolverConfig::default();
        let mut damping = DampingSchedule::default();
        damping.set(Rank::Singles, self.damping.singles.to_config());
        damping.set(Rank::Doubles, self.damping.doubles.to_config());
        damping.set(Rank::Triples, self.damping.triples.to_config());

        SolverConfig {
            max_iter: self.solver.max_iter.unwrap_or(defaults.max_iter),
            conv_thresh: self.solver.conv_thresh.unwrap_or(defaults.conv_thresh),
            div_thresh: self.solver.div_thresh.unwrap_or(defaults.div_thresh),
            damping,
            acceleration: AccelerationConfig::new(
                self.acceleration
                    .method
                    .unwrap_or(defaults.acceleration.method),
                self.acceleration
                    .max_history_depth
                    .unwrap_or(defaults.acceleration.max_history_depth),
            ),
            checkpoint_every: self.solver.checkpoint_every.unwrap_or(0),
        }
    }

    pub fn model(&self) -> CcModel {
        self.model.unwrap_or(CcModel::Ccsd)
    }

    /// Tracked ranks in ascending order
    pub fn active_ranks(&self) -> Vec<Rank> {
        let flags = [
            (Rank::Singles, self.ranks.singles.unwrap_or(true)),
            (Rank::Doubles, self.ranks.doubles.unwrap_or(true)),
            (Rank::Triples, self.ranks.triples.unwrap_or(false)),
        ];
        flags
            .into_iter()
            .filter_map(|(rank, on)| on.then_some(rank))
            .collect()
    }

    /// Sectors with their skip flags, in solve order
    pub fn sectors(&self) -> Vec<(Sector, bool)> {
        if self.sectors.is_empty() {
            return vec![(Sector::vacuum(), false)];
        }
        self.sectors
            .iter()
            .map(|s| (Sector::new(s.holes, s.particles), s.skip))
            .collect()
    }

    pub fn problem_params(&self) -> ProblemParams {
        let defaults = ProblemParams::default();
        ProblemParams {
            nocc: self.problem.nocc.unwrap_or(defaults.nocc),
            nvirt: self.problem.nvirt.unwrap_or(defaults.nvirt),
            coupling: self.problem.coupling.unwrap_or(defaults.coupling),
            nonlinearity: self.problem.nonlinearity.unwrap_or(defaults.nonlinearity),
            gap: self.problem.gap.unwrap_or(defaults.gap),
        }
    }

    pub fn is_complex(&self) -> bool {
        self.problem.complex.unwrap_or(false)
    }

    /// Fold command-line overrides into the configuration
    pub fn apply_overrides(&mut self, args: &Args) {
        if let Some(max_iter) = args.max_iter {
            self.solver.max_iter = Some(max_iter);
        }
        if let Some(conv) = args.conv_thresh {
            self.solver.conv_thresh = Some(conv);
        }
        if let Some(div) = args.div_thresh {
            self.solver.div_thresh = Some(div);
        }
        if let Some(every) = args.checkpoint_every {
            self.solver.checkpoint_every = Some(every);
        }
        if let Some(dir) = &args.checkpoint_dir {
            self.solver.checkpoint_dir = Some(dir.clone());
        }
        if let Some(method) = args.acceleration {
            self.acceleration.method = Some(method);
        }
        if let Some(depth) = args.max_history_depth {
            self.acceleration.max_history_depth = Some(depth);
        }
        if let Some(model) = args.model {
            self.model = Some(model);
        }
        if args.complex {
            self.problem.complex = Some(true);
        }
    }
}
