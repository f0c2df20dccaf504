#![deny(missing_docs)]
#![doc = include_str!("../docs/ensemble-api.md")]

//! Parallel-tempering changepoint sampler for multinomial time series.

/// Per-chain state and the single-iteration update.
pub mod chain;
/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Run controller and the public `fit` entry point.
pub mod kernel;
/// Segment regression fitting and scoring.
pub mod likelihood;
/// Acceptance, swap and round-trip diagnostics.
pub mod metrics;
/// Changepoint proposal utilities.
pub mod moves_changepoint;
/// Random-walk coefficient updates.
pub mod regression;
/// Model scores and cross-model selection.
pub mod select;
/// Retained posterior draws.
pub mod store;
/// Posterior summaries and the fitted-model object.
pub mod summary;
/// Parallel tempering ladder helpers.
pub mod tempering;

pub use config::{
    AdaptationConfig, CadenceConfig, ControlConfig, LadderConfig, LadderPolicy, ProposalConfig,
    SeedPolicy,
};
pub use kernel::{fit, RunController, RunPhase};
pub use likelihood::{fit_segment, FitCache, SegmentEvaluator, SegmentFit};
pub use metrics::{Diagnostics, MoveKind, MoveTally};
pub use select::{Measurer, ModelCollection, Selector};
pub use store::{PosteriorDraw, PosteriorSampleStore};
pub use summary::{CoefficientSummary, FittedModel, MarginalSummary};
pub use tempering::Ensemble;
