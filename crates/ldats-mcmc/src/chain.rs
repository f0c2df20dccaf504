use ldats_core::{RngHandle, TimeSeriesDataset};
use nalgebra::DMatrix;

use crate::config::ControlConfig;
use crate::determinism;
use crate::likelihood::{ConfigurationScore, FitCache, SegmentEvaluator};
use crate::metrics::{MoveKind, MoveTally};
use crate::moves_changepoint::{self, ChangepointMoveKind};
use crate::regression::{self, SegmentParameters};
use crate::store::PosteriorDraw;

/// Standard deviation of the starting coefficients.
const INITIAL_COEFFICIENT_SD: f64 = 0.01;

/// Mutable state of one chain.
///
/// The temperature is not stored here: it belongs to whichever ladder rank the
/// state currently occupies.
#[derive(Debug, Clone)]
pub struct ChainState {
    changepoints: Vec<i64>,
    segments: Vec<SegmentParameters>,
    log_lik: f64,
    degenerate_segments: usize,
    cache: FitCache,
}

impl ChainState {
    /// Scores `changepoints` and seeds near-zero coefficients for every segment.
    pub fn initialize(
        evaluator: &SegmentEvaluator<'_>,
        changepoints: Vec<i64>,
        config: &ControlConfig,
        rng: &mut RngHandle,
    ) -> Self {
        let data = evaluator.data();
        let mut cache = FitCache::with_capacity(config.fit_cache_capacity);
        let score = evaluator.evaluate(&changepoints, &mut cache);
        let n_free_categories = data.n_categories() - 1;
        let segments = score
            .segments
            .iter()
            .map(|segment| {
                let coefficients = DMatrix::from_fn(data.n_terms(), n_free_categories, |_, _| {
                    INITIAL_COEFFICIENT_SD * rng.standard_normal()
                });
                SegmentParameters::with_coefficients(
                    data,
                    segment.span,
                    segment.fit.rows,
                    coefficients,
                    config.prior_sd,
                )
            })
            .collect();
        Self {
            changepoints,
            segments,
            log_lik: score.total_log_lik,
            degenerate_segments: score.degenerate_segments(),
            cache,
        }
    }

    /// Current changepoints.
    pub fn changepoints(&self) -> &[i64] {
        &self.changepoints
    }

    /// Current segment parameters in time order.
    pub fn segments(&self) -> &[SegmentParameters] {
        &self.segments
    }

    /// Profile log-likelihood of the current changepoint configuration.
    pub fn log_lik(&self) -> f64 {
        self.log_lik
    }

    /// Log-likelihood at the current sampled coefficients.
    pub fn coefficient_log_lik(&self) -> f64 {
        self.segments.iter().map(|segment| segment.log_lik).sum()
    }

    /// Log-prior of the current coefficients.
    pub fn log_prior(&self) -> f64 {
        self.segments.iter().map(|segment| segment.log_prior).sum()
    }

    /// Segments of the current configuration scored with the degenerate penalty.
    pub fn degenerate_segments(&self) -> usize {
        self.degenerate_segments
    }

    /// Segment fit cache `(hits, misses)`.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    /// Snapshot for the posterior store.
    pub fn to_draw(&self, iteration: usize) -> PosteriorDraw {
        PosteriorDraw {
            iteration,
            changepoints: self.changepoints.clone(),
            coefficients: self
                .segments
                .iter()
                .map(|segment| segment.coefficients.clone())
                .collect(),
            log_lik: self.log_lik,
            coefficient_log_lik: self.coefficient_log_lik(),
        }
    }

    /// Moves to an accepted configuration.
    fn adopt(
        &mut self,
        data: &TimeSeriesDataset,
        candidate: Vec<i64>,
        score: ConfigurationScore,
        temperature: f64,
        prior_sd: f64,
        rng: &mut RngHandle,
    ) {
        self.changepoints = candidate;
        self.log_lik = score.total_log_lik;
        self.degenerate_segments = score.degenerate_segments();
        self.realign(data, &score, temperature, prior_sd, rng);
    }

    /// Matches the coefficient sets to the current spans. Segments whose span
    /// is unchanged keep their draws; the rest are redrawn around their fit.
    fn realign(
        &mut self,
        data: &TimeSeriesDataset,
        score: &ConfigurationScore,
        temperature: f64,
        prior_sd: f64,
        rng: &mut RngHandle,
    ) {
        let mut previous = std::mem::take(&mut self.segments).into_iter();
        self.segments = score
            .segments
            .iter()
            .map(|segment| match previous.next() {
                Some(existing) if existing.span == segment.span => existing,
                _ => SegmentParameters::from_laplace(
                    data,
                    segment.span,
                    &segment.fit,
                    temperature,
                    prior_sd,
                    rng,
                ),
            })
            .collect();
    }

    /// Hands coefficient sets back across an accepted swap.
    ///
    /// After a swap `self` sits at `temperature` and `other` at
    /// `other_temperature`, but each carries the coefficients sampled at the
    /// other's temperature. Coefficients belong to the rank, so the sets are
    /// exchanged and then realigned with each state's changepoints.
    pub fn trade_coefficients(
        &mut self,
        other: &mut ChainState,
        evaluator: &SegmentEvaluator<'_>,
        temperature: f64,
        other_temperature: f64,
        prior_sd: f64,
        rng: &mut RngHandle,
    ) {
        std::mem::swap(&mut self.segments, &mut other.segments);
        let data = evaluator.data();
        let score = evaluator.evaluate(&self.changepoints, &mut self.cache);
        self.realign(data, &score, temperature, prior_sd, rng);
        let score = evaluator.evaluate(&other.changepoints, &mut other.cache);
        other.realign(data, &score, other_temperature, prior_sd, rng);
    }
}

/// Read-only inputs shared by every chain during one iteration.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Likelihood evaluator over the dataset.
    pub evaluator: SegmentEvaluator<'a>,
    /// Run configuration.
    pub config: &'a ControlConfig,
    /// Zero-based iteration number.
    pub iteration: usize,
}

/// Runs one iteration of changepoint and coefficient moves for a single chain.
///
/// Every move draws from its own substream keyed by `(handle, iteration, slot)`,
/// so chains can be stepped in any order or in parallel.
pub fn step_chain(
    ctx: &StepContext<'_>,
    state: &mut ChainState,
    handle: usize,
    temperature: f64,
    coefficient_scale: f64,
) -> MoveTally {
    let config = ctx.config;
    let data = ctx.evaluator.data();
    let seed = config.seed_policy.master_seed;
    let mut tally = MoveTally::default();
    let cadence = &config.cadence;

    for slot in 0..cadence.changepoint_moves_per_iteration {
        let mut rng =
            RngHandle::from_seed(determinism::move_seed(seed, handle, ctx.iteration, slot));
        let Some(proposal) = moves_changepoint::propose(
            &state.changepoints,
            data.first_time(),
            data.last_time(),
            &config.proposal,
            &mut rng,
        ) else {
            break;
        };
        let kind = match proposal.kind {
            ChangepointMoveKind::Jitter => MoveKind::ChangepointJitter,
            ChangepointMoveKind::Jump => MoveKind::ChangepointJump,
        };
        if !proposal.valid {
            tally.invalid_proposals += 1;
            tally.record(kind, false);
            continue;
        }
        let score = ctx
            .evaluator
            .evaluate(&proposal.candidate, &mut state.cache);
        let log_ratio =
            moves_changepoint::metropolis_log_ratio(score.total_log_lik, state.log_lik, temperature);
        let accepted = rng.accept_log(log_ratio);
        tally.record(kind, accepted);
        if accepted {
            state.adopt(
                data,
                proposal.candidate,
                score,
                temperature,
                config.prior_sd,
                &mut rng,
            );
        }
    }

    let step = config.proposal.coefficient_step * coefficient_scale;
    let n_segments = state.segments.len();
    for update in 0..cadence.parameter_updates_per_iteration {
        for (index, segment) in state.segments.iter_mut().enumerate() {
            let slot = cadence.changepoint_moves_per_iteration + update * n_segments + index;
            let mut rng =
                RngHandle::from_seed(determinism::move_seed(seed, handle, ctx.iteration, slot));
            let accepted = regression::update_segment(
                data,
                segment,
                temperature,
                step,
                config.prior_sd,
                &mut rng,
            );
            tally.record(MoveKind::Coefficient, accepted);
        }
    }
    tally
}
