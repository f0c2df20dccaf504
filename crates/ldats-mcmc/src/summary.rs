//! Posterior summaries and the fitted-model object.

use std::collections::BTreeMap;

use ldats_core::errors::ErrorInfo;
use ldats_core::{LdatsError, TimeSeriesDataset};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::config::ControlConfig;
use crate::likelihood;
use crate::metrics::Diagnostics;
use crate::select::Measurer;
use crate::store::PosteriorSampleStore;

/// Lag used for the reported autocorrelation.
pub const AUTOCORRELATION_LAG: usize = 10;

/// Marginal posterior summary of one scalar quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalSummary {
    /// Posterior mean.
    #[serde(with = "ldats_core::float_serde")]
    pub mean: f64,
    /// Posterior median.
    #[serde(with = "ldats_core::float_serde")]
    pub median: f64,
    /// Most frequent value; reported for integer-valued quantities only.
    pub mode: Option<f64>,
    /// Lower bound of the central credible interval.
    #[serde(with = "ldats_core::float_serde")]
    pub lower: f64,
    /// Upper bound of the central credible interval.
    #[serde(with = "ldats_core::float_serde")]
    pub upper: f64,
    /// Posterior standard deviation.
    #[serde(with = "ldats_core::float_serde")]
    pub sd: f64,
    /// Monte Carlo standard error of the mean.
    #[serde(with = "ldats_core::float_serde")]
    pub mcmc_error: f64,
    /// Lag-10 autocorrelation of the trace.
    #[serde(with = "ldats_core::float_serde")]
    pub ac10: f64,
    /// Effective sample size.
    #[serde(with = "ldats_core::float_serde")]
    pub ess: f64,
}

impl MarginalSummary {
    /// Summarizes a trace with a central credible interval of mass `prob`.
    pub fn from_trace(trace: &[f64], prob: f64, with_mode: bool) -> Self {
        let n = trace.len();
        let mean = mean(trace);
        let sd = sample_sd(trace, mean);
        let mut sorted = trace.to_vec();
        sorted.sort_by(f64::total_cmp);
        let tail = (1.0 - prob) / 2.0;
        let ess = effective_sample_size(trace);
        Self {
            mean,
            median: quantile(&sorted, 0.5),
            mode: if with_mode { mode(&sorted) } else { None },
            lower: quantile(&sorted, tail),
            upper: quantile(&sorted, 1.0 - tail),
            sd,
            mcmc_error: if ess > 0.0 { sd / ess.sqrt() } else { f64::NAN },
            ac10: autocorrelation(trace, AUTOCORRELATION_LAG),
            ess: if n == 0 { 0.0 } else { ess },
        }
    }
}

/// Summary of one regression coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSummary {
    /// Zero-based segment index.
    pub segment: usize,
    /// Predictor term name.
    pub term: String,
    /// Non-reference category the coefficient belongs to.
    pub category: String,
    /// Marginal summary over retained draws.
    pub summary: MarginalSummary,
}

/// Result of one changepoint fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    /// Number of changepoints.
    pub k: usize,
    /// Design column names, intercept first when present.
    pub term_names: Vec<String>,
    /// Response categories; the first is the reference.
    pub categories: Vec<String>,
    /// Observations in the dataset.
    pub n_observations: usize,
    /// One summary per changepoint, in order.
    pub changepoints: Vec<MarginalSummary>,
    /// One summary per segment, category and term.
    pub coefficients: Vec<CoefficientSummary>,
    /// Mean profile log-likelihood over retained draws.
    #[serde(with = "ldats_core::float_serde")]
    pub log_lik: f64,
    /// Largest profile log-likelihood among retained draws.
    #[serde(with = "ldats_core::float_serde")]
    pub max_log_lik: f64,
    /// Parameter count used by the score.
    pub df: usize,
    /// Score under `measurer`.
    #[serde(with = "ldats_core::float_serde")]
    pub score: f64,
    /// Measurer that produced `score`.
    pub measurer: Measurer,
    /// Retained cold-chain draws.
    pub draws: PosteriorSampleStore,
    /// Sampler diagnostics.
    pub diagnostics: Diagnostics,
    /// Configuration the model was fitted with.
    pub config: ControlConfig,
}

impl FittedModel {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, LdatsError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| LdatsError::Serde(ErrorInfo::new("model-json", err.to_string())))
    }

    /// Posterior-mean coefficient matrix of `segment` (`n_terms × (n_categories − 1)`).
    pub fn mean_coefficients(&self, segment: usize) -> Option<DMatrix<f64>> {
        if segment > self.k {
            return None;
        }
        let mut matrix = DMatrix::zeros(self.term_names.len(), self.categories.len() - 1);
        let lookup: BTreeMap<(&str, &str), f64> = self
            .coefficients
            .iter()
            .filter(|entry| entry.segment == segment)
            .map(|entry| ((entry.term.as_str(), entry.category.as_str()), entry.summary.mean))
            .collect();
        for (term_idx, term) in self.term_names.iter().enumerate() {
            for (cat_idx, category) in self.categories.iter().skip(1).enumerate() {
                matrix[(term_idx, cat_idx)] = *lookup.get(&(term.as_str(), category.as_str()))?;
            }
        }
        Some(matrix)
    }

    /// Category proportions of `segment` at a design row, using posterior-mean
    /// coefficients.
    pub fn segment_proportions(&self, segment: usize, predictors: &[f64]) -> Option<Vec<f64>> {
        if predictors.len() != self.term_names.len() {
            return None;
        }
        let coefficients = self.mean_coefficients(segment)?;
        Some(likelihood::category_probabilities(predictors, &coefficients))
    }
}

/// Parameter count of a model with `k` changepoints.
pub fn degrees_of_freedom(n_terms: usize, n_categories: usize, k: usize) -> usize {
    n_terms * (n_categories - 1) * (k + 1) + k
}

/// Reduces a completed run to a [`FittedModel`].
pub fn summarize(
    data: &TimeSeriesDataset,
    k: usize,
    config: &ControlConfig,
    store: PosteriorSampleStore,
    diagnostics: Diagnostics,
) -> Result<FittedModel, LdatsError> {
    if store.is_empty() {
        return Err(LdatsError::Numeric(
            ErrorInfo::new("no-draws", "the run retained no posterior draws")
                .with_context("iterations", config.iterations)
                .with_context("burnin", config.burnin)
                .with_context("thin", config.thin),
        ));
    }
    let prob = config.summary_prob;
    let changepoints = (0..k)
        .map(|idx| MarginalSummary::from_trace(&store.changepoint_trace(idx), prob, true))
        .collect();

    let mut coefficients = Vec::new();
    for segment in 0..=k {
        for (cat_idx, category) in data.categories().iter().enumerate().skip(1) {
            for (term_idx, term) in data.term_names().iter().enumerate() {
                let trace = store.coefficient_trace(segment, term_idx, cat_idx - 1);
                coefficients.push(CoefficientSummary {
                    segment,
                    term: term.clone(),
                    category: category.clone(),
                    summary: MarginalSummary::from_trace(&trace, prob, false),
                });
            }
        }
    }

    let log_liks = store.log_lik_trace();
    let log_lik = mean(&log_liks);
    let max_log_lik = log_liks.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let df = degrees_of_freedom(data.n_terms(), data.n_categories(), k);
    let score = config.measurer.score(log_lik, df, data.len());

    Ok(FittedModel {
        k,
        term_names: data.term_names().to_vec(),
        categories: data.categories().to_vec(),
        n_observations: data.len(),
        changepoints,
        coefficients,
        log_lik,
        max_log_lik,
        df,
        score,
        measurer: config.measurer,
        draws: store,
        diagnostics,
        config: config.clone(),
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_sd(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|value| (value - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Linear-interpolation quantile of sorted data (Hyndman and Fan type 7).
pub fn quantile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Most frequent value of sorted data; the smallest wins ties.
fn mode(sorted: &[f64]) -> Option<f64> {
    let mut best: Option<(f64, usize)> = None;
    let mut idx = 0;
    while idx < sorted.len() {
        let value = sorted[idx];
        let run = sorted[idx..].iter().take_while(|&&x| x == value).count();
        if best.map_or(true, |(_, count)| run > count) {
            best = Some((value, run));
        }
        idx += run;
    }
    best.map(|(value, _)| value)
}

/// Sample autocorrelation at `lag`; zero for constant or too-short traces.
pub fn autocorrelation(trace: &[f64], lag: usize) -> f64 {
    let n = trace.len();
    if lag >= n {
        return 0.0;
    }
    let m = mean(trace);
    let denominator: f64 = trace.iter().map(|x| (x - m).powi(2)).sum();
    if denominator <= 0.0 {
        return 0.0;
    }
    let numerator: f64 = (0..n - lag)
        .map(|t| (trace[t] - m) * (trace[t + lag] - m))
        .sum();
    numerator / denominator
}

/// Largest lag summed by [`effective_sample_size`].
pub const MAX_ESS_LAG: usize = 1000;

/// Effective sample size using Geyer's initial positive sequence.
///
/// Autocorrelations are summed up to [`MAX_ESS_LAG`]. Constant traces report
/// the full length.
pub fn effective_sample_size(trace: &[f64]) -> f64 {
    let n = trace.len();
    if n < 2 {
        return n as f64;
    }
    let m = mean(trace);
    let centered: Vec<f64> = trace.iter().map(|x| x - m).collect();
    let denominator: f64 = centered.iter().map(|x| x * x).sum();
    if denominator <= 0.0 {
        return n as f64;
    }
    let rho = |lag: usize| {
        let covariance: f64 = centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum();
        covariance / denominator
    };
    let max_lag = (n - 1).min(MAX_ESS_LAG);
    let mut tau = -1.0;
    let mut lag = 0;
    while lag < max_lag {
        let pair = rho(lag) + rho(lag + 1);
        if pair <= 0.0 {
            break;
        }
        tau += 2.0 * pair;
        lag += 2;
    }
    if tau <= 0.0 {
        return n as f64;
    }
    (n as f64 / tau).min(n as f64)
}
