use ldats_core::errors::ErrorInfo;
use ldats_core::{LdatsError, RngHandle, TimeSeriesDataset};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::chain::{self, ChainState, StepContext};
use crate::config::ControlConfig;
use crate::determinism;
use crate::likelihood::SegmentEvaluator;
use crate::metrics::{DiagnosticsRecorder, MoveKind, MoveTally};
use crate::moves_changepoint;
use crate::store::PosteriorSampleStore;
use crate::summary::{self, FittedModel};
use crate::tempering::{self, Ensemble};

/// Bounds applied to the adaptive coefficient step multiplier.
const SCALE_BOUNDS: (f64, f64) = (1e-3, 1e3);

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    /// Chains not yet placed or scored.
    Initializing,
    /// Iterations are executed but nothing is retained.
    BurningIn,
    /// Iterations retain every `thin`-th cold state.
    Sampling,
    /// Iteration budget exhausted; ready to summarize.
    Done,
}

/// Drives the ensemble through burn-in and sampling.
pub struct RunController<'a> {
    data: &'a TimeSeriesDataset,
    config: &'a ControlConfig,
    k: usize,
    temperatures: Vec<f64>,
    ensemble: Option<Ensemble<ChainState>>,
    store: PosteriorSampleStore,
    recorder: DiagnosticsRecorder,
    scales: Vec<f64>,
    adaptation_window: Vec<MoveTally>,
    iteration: usize,
    phase: RunPhase,
}

impl<'a> RunController<'a> {
    /// Validates the configuration against the dataset and prepares a run
    /// fitting `k` changepoints.
    pub fn new(
        data: &'a TimeSeriesDataset,
        k: usize,
        config: &'a ControlConfig,
    ) -> Result<Self, LdatsError> {
        config.validate()?;
        let temperatures = tempering::build_ladder(&config.ladder)?;
        if k as i64 > data.interior_positions() {
            return Err(LdatsError::Config(
                ErrorInfo::new(
                    "too-many-changepoints",
                    "changepoints do not fit strictly inside the time range",
                )
                .with_context("k", k)
                .with_context("first_time", data.first_time())
                .with_context("last_time", data.last_time())
                .with_hint("reduce k or extend the time axis"),
            ));
        }
        let chains = temperatures.len();
        Ok(Self {
            data,
            config,
            k,
            store: PosteriorSampleStore::with_capacity(config.retained_draws()),
            recorder: DiagnosticsRecorder::new(chains),
            scales: vec![1.0; chains],
            adaptation_window: vec![MoveTally::default(); chains],
            temperatures,
            ensemble: None,
            iteration: 0,
            phase: RunPhase::Initializing,
        })
    }

    /// Current phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Iterations completed so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Draws retained so far.
    pub fn store(&self) -> &PosteriorSampleStore {
        &self.store
    }

    /// Cold-chain state, once initialized.
    pub fn cold_state(&self) -> Option<&ChainState> {
        self.ensemble.as_ref().map(Ensemble::cold)
    }

    /// Coefficient step multiplier per rank.
    pub fn coefficient_scales(&self) -> &[f64] {
        &self.scales
    }

    /// Advances the state machine by one step: initialization or one iteration.
    pub fn step(&mut self) -> RunPhase {
        match self.phase {
            RunPhase::Initializing => self.initialize(),
            RunPhase::BurningIn | RunPhase::Sampling => self.iterate(),
            RunPhase::Done => {}
        }
        self.phase
    }

    /// Runs to completion and summarizes.
    pub fn run(mut self) -> Result<FittedModel, LdatsError> {
        let span = info_span!("ptmcmc", k = self.k, chains = self.temperatures.len());
        let _guard = span.enter();
        while self.step() != RunPhase::Done {}
        self.finish()
    }

    /// Summarizes a completed run.
    pub fn finish(self) -> Result<FittedModel, LdatsError> {
        if self.phase != RunPhase::Done {
            return Err(LdatsError::Config(
                ErrorInfo::new("run-incomplete", "the run has not reached its iteration budget")
                    .with_context("iteration", self.iteration)
                    .with_context("iterations", self.config.iterations),
            ));
        }
        let Some(ensemble) = self.ensemble else {
            return Err(LdatsError::config("run-incomplete", "ensemble was never initialized"));
        };
        let fit_cache = ensemble
            .states()
            .iter()
            .map(ChainState::cache_stats)
            .fold((0, 0), |acc, stats| (acc.0 + stats.0, acc.1 + stats.1));
        let diagnostics = self.recorder.finish(
            &self.temperatures,
            &self.scales,
            ensemble.trips(),
            self.config.iterations,
            ensemble.cold().degenerate_segments(),
            fit_cache,
        );
        let model = summary::summarize(self.data, self.k, self.config, self.store, diagnostics)?;
        info!(
            k = self.k,
            draws = model.draws.len(),
            log_lik = model.log_lik,
            score = model.score,
            "changepoint fit complete"
        );
        Ok(model)
    }

    fn initialize(&mut self) {
        let evaluator = SegmentEvaluator::new(self.data, self.config.ridge);
        let seed = self.config.seed_policy.master_seed;
        // `new` already checked that k positions fit inside the time range.
        let start = moves_changepoint::evenly_spaced(
            self.k,
            self.data.first_time(),
            self.data.last_time(),
        )
        .unwrap_or_default();
        let states: Vec<ChainState> = (0..self.temperatures.len())
            .map(|handle| {
                let mut rng = RngHandle::from_seed(determinism::chain_seed(seed, handle));
                ChainState::initialize(&evaluator, start.clone(), self.config, &mut rng)
            })
            .collect();
        if let Some(cold) = states.first() {
            if cold.degenerate_segments() > 0 {
                warn!(
                    degenerate = cold.degenerate_segments(),
                    "initial changepoints leave segments too small to fit"
                );
            }
        }
        debug!(changepoints = ?start, temperatures = ?self.temperatures, "chains initialized");
        self.ensemble = Some(Ensemble::new(self.temperatures.clone(), states));
        self.phase = if self.config.burnin > 0 {
            RunPhase::BurningIn
        } else {
            RunPhase::Sampling
        };
    }

    fn iterate(&mut self) {
        let Some(ensemble) = self.ensemble.as_mut() else {
            return;
        };
        let config = self.config;
        let iteration = self.iteration;
        let ctx = StepContext {
            evaluator: SegmentEvaluator::new(self.data, config.ridge),
            config,
            iteration,
        };

        let ranks = ensemble.ranks_by_handle();
        let temperatures = &self.temperatures;
        let scales = &self.scales;
        let step_one = |(handle, state): (usize, &mut ChainState)| {
            let rank = ranks[handle];
            chain::step_chain(&ctx, state, handle, temperatures[rank], scales[rank])
        };
        let tallies: Vec<MoveTally> = if config.parallel {
            ensemble
                .states_mut()
                .par_iter_mut()
                .enumerate()
                .map(step_one)
                .collect()
        } else {
            ensemble
                .states_mut()
                .iter_mut()
                .enumerate()
                .map(step_one)
                .collect()
        };
        for (handle, tally) in tallies.iter().enumerate() {
            self.recorder.note_moves(ranks[handle], tally);
            self.adaptation_window[ranks[handle]].merge(tally);
        }

        if (iteration + 1) % config.cadence.swap_interval == 0 {
            let seed = config.seed_policy.master_seed;
            let outcomes = ensemble.attempt_swaps_with(
                ChainState::log_lik,
                |pair| RngHandle::from_seed(determinism::swap_seed(seed, iteration, pair)),
                |pair, lower, upper, rng| {
                    lower.trade_coefficients(
                        upper,
                        &ctx.evaluator,
                        temperatures[pair],
                        temperatures[pair + 1],
                        config.prior_sd,
                        rng,
                    );
                },
            );
            self.recorder.note_swaps(&outcomes);
        }
        self.recorder.note_cold_handle(ensemble.handle_at(0));

        if self.phase == RunPhase::BurningIn
            && config.adaptation.enabled
            && (iteration + 1) % config.adaptation.interval == 0
        {
            self.adapt();
        }

        if self.phase == RunPhase::Sampling && (iteration + 1 - config.burnin) % config.thin == 0 {
            if let Some(ensemble) = self.ensemble.as_ref() {
                self.store.push(ensemble.cold().to_draw(iteration));
            }
        }

        self.iteration += 1;
        if self.iteration >= config.iterations {
            self.phase = RunPhase::Done;
        } else if self.iteration == config.burnin {
            debug!(
                iteration = self.iteration,
                scales = ?self.scales,
                "burn-in complete, proposal scales frozen"
            );
            self.phase = RunPhase::Sampling;
        }
    }

    fn adapt(&mut self) {
        let target = self.config.adaptation.target_acceptance;
        for (rank, window) in self.adaptation_window.iter_mut().enumerate() {
            if let Some(rate) = window.rate(MoveKind::Coefficient) {
                let scale = (self.scales[rank] * (rate - target).exp())
                    .clamp(SCALE_BOUNDS.0, SCALE_BOUNDS.1);
                self.scales[rank] = scale;
            }
            *window = MoveTally::default();
        }
        debug!(iteration = self.iteration, scales = ?self.scales, "adapted coefficient steps");
    }
}

/// Fits `k` changepoints to `data` under `config`.
pub fn fit(
    data: &TimeSeriesDataset,
    k: usize,
    config: &ControlConfig,
) -> Result<FittedModel, LdatsError> {
    RunController::new(data, k, config)?.run()
}
