use std::fs;
use std::path::Path;

use ldats_core::errors::ErrorInfo;
use ldats_core::LdatsError;
use serde::{Deserialize, Serialize};

use crate::select::{Measurer, Selector};

/// YAML-configurable control parameters for a single changepoint fit.
///
/// The configuration is immutable once a run starts; every component reads it
/// by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Total sampler iterations, burn-in included.
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Leading iterations discarded before draws are retained.
    #[serde(default)]
    pub burnin: usize,
    /// Retention interval for post burn-in draws.
    #[serde(default = "default_thin")]
    pub thin: usize,
    /// Temperature ladder specification.
    #[serde(default)]
    pub ladder: LadderConfig,
    /// Proposal scales per move type.
    #[serde(default)]
    pub proposal: ProposalConfig,
    /// Standard deviation of the zero-centred Gaussian coefficient prior.
    #[serde(default = "default_prior_sd")]
    pub prior_sd: f64,
    /// Ridge added to the Newton system when fitting segment regressions.
    #[serde(default = "default_ridge")]
    pub ridge: f64,
    /// Interleaving of move types within an iteration.
    #[serde(default)]
    pub cadence: CadenceConfig,
    /// Optional burn-in adaptation of the coefficient step size.
    #[serde(default)]
    pub adaptation: AdaptationConfig,
    /// Mass of the central credible interval reported by the summarizer.
    #[serde(default = "default_summary_prob")]
    pub summary_prob: f64,
    /// Update chains on the rayon thread pool.
    #[serde(default)]
    pub parallel: bool,
    /// Maximum number of cached segment fits per chain (0 disables caching).
    #[serde(default = "default_fit_cache_capacity")]
    pub fit_cache_capacity: usize,
    /// Master seed and substream policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Reduction of a fitted model to a scalar score.
    #[serde(default)]
    pub measurer: Measurer,
    /// Rule choosing the best score among candidate models.
    #[serde(default)]
    pub selector: Selector,
}

fn default_iterations() -> usize {
    10_000
}

fn default_thin() -> usize {
    1
}

fn default_prior_sd() -> f64 {
    10.0
}

fn default_ridge() -> f64 {
    1e-6
}

fn default_summary_prob() -> f64 {
    0.95
}

fn default_fit_cache_capacity() -> usize {
    4096
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            burnin: 0,
            thin: default_thin(),
            ladder: LadderConfig::default(),
            proposal: ProposalConfig::default(),
            prior_sd: default_prior_sd(),
            ridge: default_ridge(),
            cadence: CadenceConfig::default(),
            adaptation: AdaptationConfig::default(),
            summary_prob: default_summary_prob(),
            parallel: false,
            fit_cache_capacity: default_fit_cache_capacity(),
            seed_policy: SeedPolicy::default(),
            measurer: Measurer::default(),
            selector: Selector::default(),
        }
    }
}

impl ControlConfig {
    /// Parses a YAML document; missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, LdatsError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|err| {
            LdatsError::Serde(ErrorInfo::new("config-parse", err.to_string()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, LdatsError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            LdatsError::Serde(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        Self::from_yaml_str(&contents).map_err(|err| match err {
            LdatsError::Serde(info) => {
                LdatsError::Serde(info.with_context("path", path.display()))
            }
            other => other,
        })
    }

    /// Number of draws the run will retain.
    pub fn retained_draws(&self) -> usize {
        if self.thin == 0 {
            return 0;
        }
        self.iterations.saturating_sub(self.burnin) / self.thin
    }

    /// Checks every run-independent constraint; ladder shape is checked by
    /// [`crate::tempering::build_ladder`].
    pub fn validate(&self) -> Result<(), LdatsError> {
        if self.iterations == 0 {
            return Err(config_error("iterations-zero", "iterations must be positive"));
        }
        if self.thin == 0 {
            return Err(config_error("thin-zero", "thin must be positive"));
        }
        if self.burnin >= self.iterations {
            return Err(LdatsError::Config(
                ErrorInfo::new("burnin-too-long", "burn-in must be shorter than the run")
                    .with_context("burnin", self.burnin)
                    .with_context("iterations", self.iterations),
            ));
        }
        if self.retained_draws() == 0 {
            return Err(LdatsError::Config(
                ErrorInfo::new("no-retained-draws", "thinning leaves no posterior draws")
                    .with_context("iterations", self.iterations)
                    .with_context("burnin", self.burnin)
                    .with_context("thin", self.thin),
            ));
        }
        positive_finite("prior_sd", self.prior_sd)?;
        if !self.ridge.is_finite() || self.ridge < 0.0 {
            return Err(LdatsError::Config(
                ErrorInfo::new("invalid-ridge", "ridge must be finite and non-negative")
                    .with_context("ridge", self.ridge),
            ));
        }
        if !(self.summary_prob > 0.0 && self.summary_prob < 1.0) {
            return Err(LdatsError::Config(
                ErrorInfo::new("invalid-summary-prob", "summary_prob must lie in (0, 1)")
                    .with_context("summary_prob", self.summary_prob),
            ));
        }
        self.proposal.validate()?;
        self.cadence.validate()?;
        self.adaptation.validate()?;
        Ok(())
    }
}

fn config_error(code: &str, message: &str) -> LdatsError {
    LdatsError::config(code, message)
}

fn positive_finite(name: &str, value: f64) -> Result<(), LdatsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LdatsError::Config(
            ErrorInfo::new("invalid-scale", "value must be finite and positive")
                .with_context("field", name)
                .with_context("value", value),
        ))
    }
}

/// Temperature ladder construction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderConfig {
    /// Number of chains in the ladder (ignored by the manual policy).
    #[serde(default = "default_chains")]
    pub chains: usize,
    /// Policy used to generate the temperatures.
    #[serde(default)]
    pub policy: LadderPolicy,
}

fn default_chains() -> usize {
    6
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            policy: LadderPolicy::default(),
        }
    }
}

/// Supported ladder construction strategies. The cold temperature is always one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LadderPolicy {
    /// Geometric progression `1, r, r^2, ...`.
    Geometric {
        /// Multiplicative spacing ratio between adjacent chains.
        #[serde(default = "default_ratio")]
        ratio: f64,
    },
    /// Explicit increasing list starting at one (overrides `chains`).
    Manual {
        /// Ordered list of temperatures.
        temperatures: Vec<f64>,
    },
}

fn default_ratio() -> f64 {
    2.0
}

impl Default for LadderPolicy {
    fn default() -> Self {
        LadderPolicy::Geometric {
            ratio: default_ratio(),
        }
    }
}

/// Proposal scales per move type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalConfig {
    /// Largest absolute offset of a changepoint jitter.
    #[serde(default = "default_max_jitter")]
    pub max_jitter: i64,
    /// Probability that a changepoint move is a uniform jump instead of a jitter.
    #[serde(default = "default_jump_probability")]
    pub jump_probability: f64,
    /// Standard deviation of the coefficient random walk.
    #[serde(default = "default_coefficient_step")]
    pub coefficient_step: f64,
}

fn default_max_jitter() -> i64 {
    5
}

fn default_jump_probability() -> f64 {
    0.1
}

fn default_coefficient_step() -> f64 {
    0.1
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            max_jitter: default_max_jitter(),
            jump_probability: default_jump_probability(),
            coefficient_step: default_coefficient_step(),
        }
    }
}

impl ProposalConfig {
    fn validate(&self) -> Result<(), LdatsError> {
        if self.max_jitter < 1 {
            return Err(LdatsError::Config(
                ErrorInfo::new("invalid-jitter", "max_jitter must be at least one")
                    .with_context("max_jitter", self.max_jitter),
            ));
        }
        if !(0.0..=1.0).contains(&self.jump_probability) {
            return Err(LdatsError::Config(
                ErrorInfo::new("invalid-jump-probability", "jump_probability must lie in [0, 1]")
                    .with_context("jump_probability", self.jump_probability),
            ));
        }
        positive_finite("coefficient_step", self.coefficient_step)
    }
}

/// Number of moves of each type per iteration and the swap period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Changepoint proposals per chain per iteration.
    #[serde(default = "default_moves")]
    pub changepoint_moves_per_iteration: usize,
    /// Coefficient updates per segment per chain per iteration.
    #[serde(default = "default_moves")]
    pub parameter_updates_per_iteration: usize,
    /// Swap attempts happen every `swap_interval` iterations.
    #[serde(default = "default_moves")]
    pub swap_interval: usize,
}

fn default_moves() -> usize {
    1
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            changepoint_moves_per_iteration: default_moves(),
            parameter_updates_per_iteration: default_moves(),
            swap_interval: default_moves(),
        }
    }
}

impl CadenceConfig {
    fn validate(&self) -> Result<(), LdatsError> {
        for (field, value) in [
            (
                "changepoint_moves_per_iteration",
                self.changepoint_moves_per_iteration,
            ),
            (
                "parameter_updates_per_iteration",
                self.parameter_updates_per_iteration,
            ),
            ("swap_interval", self.swap_interval),
        ] {
            if value == 0 {
                return Err(LdatsError::Config(
                    ErrorInfo::new("invalid-cadence", "cadence entries must be positive")
                        .with_context("field", field),
                ));
            }
        }
        Ok(())
    }
}

/// Burn-in adaptation of the coefficient step, frozen once sampling starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Enables adaptation.
    #[serde(default)]
    pub enabled: bool,
    /// Iterations between adjustments.
    #[serde(default = "default_adapt_interval")]
    pub interval: usize,
    /// Coefficient acceptance rate the step size is steered towards.
    #[serde(default = "default_target_acceptance")]
    pub target_acceptance: f64,
}

fn default_adapt_interval() -> usize {
    50
}

fn default_target_acceptance() -> f64 {
    0.3
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_adapt_interval(),
            target_acceptance: default_target_acceptance(),
        }
    }
}

impl AdaptationConfig {
    fn validate(&self) -> Result<(), LdatsError> {
        if self.interval == 0 {
            return Err(config_error(
                "invalid-adaptation",
                "adaptation interval must be positive",
            ));
        }
        if !(self.target_acceptance > 0.0 && self.target_acceptance < 1.0) {
            return Err(LdatsError::Config(
                ErrorInfo::new("invalid-adaptation", "target_acceptance must lie in (0, 1)")
                    .with_context("target_acceptance", self.target_acceptance),
            ));
        }
        Ok(())
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label recorded alongside the seed.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_fills_defaults() {
        let config = ControlConfig::from_yaml_str(
            "iterations: 200\nburnin: 50\nthin: 3\nladder:\n  policy:\n    type: manual\n    temperatures: [1.0, 2.0]\n",
        )
        .unwrap();
        assert_eq!(config.retained_draws(), 50);
        assert_eq!(config.proposal, ProposalConfig::default());
        assert!(matches!(config.ladder.policy, LadderPolicy::Manual { .. }));
    }

    #[test]
    fn rejects_invalid_counts() {
        let mut config = ControlConfig::default();
        config.iterations = 0;
        assert_eq!(config.validate().unwrap_err().info().code, "iterations-zero");

        let mut config = ControlConfig::default();
        config.burnin = config.iterations;
        assert_eq!(config.validate().unwrap_err().info().code, "burnin-too-long");

        let mut config = ControlConfig::default();
        config.thin = 0;
        assert!(config.validate().unwrap_err().is_config());

        let mut config = ControlConfig::default();
        config.cadence.swap_interval = 0;
        assert_eq!(config.validate().unwrap_err().info().code, "invalid-cadence");
    }
}
