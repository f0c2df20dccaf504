use std::sync::Arc;

use indexmap::IndexMap;
use ldats_core::TimeSeriesDataset;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Score assigned to a segment too small to identify its regression.
///
/// Finite so that totals stay comparable and the Metropolis rule rejects the
/// configuration instead of producing `NaN`.
pub const DEGENERATE_SEGMENT_LOG_LIK: f64 = -1.0e10;

const NEWTON_MAX_ITER: usize = 100;
const NEWTON_TOLERANCE: f64 = 1e-10;
const MIN_STEP: f64 = 1e-10;

/// Inclusive time span covered by a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentSpan {
    /// First time index (inclusive).
    pub start: i64,
    /// Last time index (inclusive).
    pub end: i64,
}

/// Half-open row range of the dataset covered by a segment.
pub type RowRange = (usize, usize);

/// Splits the time axis into `changepoints.len() + 1` inclusive spans.
///
/// A row sitting exactly on a changepoint belongs to the earlier segment.
pub fn segment_spans(data: &TimeSeriesDataset, changepoints: &[i64]) -> Vec<SegmentSpan> {
    let mut spans = Vec::with_capacity(changepoints.len() + 1);
    let mut start = data.first_time();
    for &cp in changepoints {
        spans.push(SegmentSpan { start, end: cp });
        start = cp + 1;
    }
    spans.push(SegmentSpan {
        start,
        end: data.last_time(),
    });
    spans
}

/// Rows covered by `span`.
pub fn span_rows(data: &TimeSeriesDataset, span: SegmentSpan) -> RowRange {
    let range = data.rows_in_span(span.start, span.end);
    (range.start, range.end)
}

/// Number of free coefficients of one segment regression.
pub fn free_coefficients(data: &TimeSeriesDataset) -> usize {
    data.n_terms() * (data.n_categories() - 1)
}

/// Weighted multinomial-logit log-likelihood of `rows` at `coefficients`.
///
/// `coefficients` has one row per design column and one column per
/// non-reference category. Non-finite results collapse to `-inf`.
pub fn log_likelihood(
    data: &TimeSeriesDataset,
    rows: RowRange,
    coefficients: &DMatrix<f64>,
) -> f64 {
    let n_free_categories = data.n_categories() - 1;
    let mut eta = vec![0.0; n_free_categories + 1];
    let mut total = 0.0;
    for obs in &data.observations()[rows.0..rows.1] {
        linear_predictor(&obs.predictors, coefficients, &mut eta);
        let lse = log_sum_exp(&eta);
        let mut row_ll = 0.0;
        for (category, &share) in obs.response.iter().enumerate() {
            if share > 0.0 {
                row_ll += share * (eta[category] - lse);
            }
        }
        total += obs.weight * row_ll;
    }
    if total.is_finite() {
        total
    } else {
        f64::NEG_INFINITY
    }
}

/// Softmax probabilities for one design row.
pub fn category_probabilities(predictors: &[f64], coefficients: &DMatrix<f64>) -> Vec<f64> {
    let mut eta = vec![0.0; coefficients.ncols() + 1];
    linear_predictor(predictors, coefficients, &mut eta);
    let lse = log_sum_exp(&eta);
    eta.iter().map(|value| (value - lse).exp()).collect()
}

fn linear_predictor(predictors: &[f64], coefficients: &DMatrix<f64>, eta: &mut [f64]) {
    eta[0] = 0.0;
    for category in 0..coefficients.ncols() {
        let mut value = 0.0;
        for (term, x) in predictors.iter().enumerate() {
            value += x * coefficients[(term, category)];
        }
        eta[category + 1] = value;
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|value| (value - max).exp()).sum::<f64>().ln()
}

/// Maximum-likelihood fit of one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentFit {
    /// Rows covered by the fit.
    pub rows: RowRange,
    /// Fitted coefficients (zeros for degenerate segments).
    pub coefficients: DMatrix<f64>,
    /// Log-likelihood at the fitted coefficients, or the degenerate penalty.
    pub log_lik: f64,
    /// Segment had too few rows to identify the regression.
    pub degenerate: bool,
    /// Newton iterations used.
    pub iterations: usize,
    /// Whether the Newton solver met its tolerance.
    pub converged: bool,
    /// Observed information at the fit, flattened category-major
    /// (`c * n_terms + p`); `None` for degenerate segments.
    pub information: Option<DMatrix<f64>>,
}

/// Fits the weighted multinomial-logit regression over `rows` by damped Newton.
///
/// `ridge` is a small quadratic penalty keeping the Hessian invertible when a
/// category is absent from the segment; it is not part of the returned score.
pub fn fit_segment(data: &TimeSeriesDataset, rows: RowRange, ridge: f64) -> SegmentFit {
    let n_terms = data.n_terms();
    let n_free_categories = data.n_categories() - 1;
    let n_free = n_terms * n_free_categories;
    let n_rows = rows.1 - rows.0;
    if n_rows == 0 || n_rows < n_free {
        return SegmentFit {
            rows,
            coefficients: DMatrix::zeros(n_terms, n_free_categories),
            log_lik: DEGENERATE_SEGMENT_LOG_LIK,
            degenerate: true,
            iterations: 0,
            converged: false,
            information: None,
        };
    }

    let penalty = |beta: &DMatrix<f64>| 0.5 * ridge * beta.iter().map(|b| b * b).sum::<f64>();
    let mut beta = DMatrix::zeros(n_terms, n_free_categories);
    let mut objective = log_likelihood(data, rows, &beta) - penalty(&beta);
    let mut converged = false;
    let mut iterations = 0;

    while iterations < NEWTON_MAX_ITER {
        iterations += 1;
        let (gradient, information) = score_and_information(data, rows, &beta, ridge);
        let Some(direction) = solve_newton(information, &gradient) else {
            break;
        };
        let mut step = 1.0;
        let mut improved = false;
        while step > MIN_STEP {
            let candidate = &beta + unflatten(&direction, n_terms, n_free_categories) * step;
            let candidate_objective = log_likelihood(data, rows, &candidate) - penalty(&candidate);
            if candidate_objective.is_finite() && candidate_objective >= objective - 1e-12 {
                let gain = candidate_objective - objective;
                beta = candidate;
                objective = candidate_objective;
                improved = true;
                if gain.abs() <= NEWTON_TOLERANCE * (objective.abs() + NEWTON_TOLERANCE) {
                    converged = true;
                }
                break;
            }
            step *= 0.5;
        }
        if !improved || converged || direction.amax() * step < NEWTON_TOLERANCE {
            converged = converged || improved;
            break;
        }
    }

    let (_, information) = score_and_information(data, rows, &beta, ridge);
    SegmentFit {
        rows,
        log_lik: log_likelihood(data, rows, &beta),
        coefficients: beta,
        degenerate: false,
        iterations,
        converged,
        information: Some(information),
    }
}

/// Gradient of the penalised log-likelihood and the (positive) information matrix.
///
/// Parameters are flattened category-major: index `c * n_terms + p`.
fn score_and_information(
    data: &TimeSeriesDataset,
    rows: RowRange,
    beta: &DMatrix<f64>,
    ridge: f64,
) -> (DVector<f64>, DMatrix<f64>) {
    let n_terms = beta.nrows();
    let n_free_categories = beta.ncols();
    let n_free = n_terms * n_free_categories;
    let mut gradient = DVector::zeros(n_free);
    let mut information = DMatrix::zeros(n_free, n_free);

    for obs in &data.observations()[rows.0..rows.1] {
        let probs = category_probabilities(&obs.predictors, beta);
        let w = obs.weight;
        for c in 0..n_free_categories {
            let residual = obs.response[c + 1] - probs[c + 1];
            for p in 0..n_terms {
                gradient[c * n_terms + p] += w * obs.predictors[p] * residual;
            }
            for d in 0..n_free_categories {
                let cov = if c == d {
                    probs[c + 1] * (1.0 - probs[c + 1])
                } else {
                    -probs[c + 1] * probs[d + 1]
                };
                for p in 0..n_terms {
                    for q in 0..n_terms {
                        information[(c * n_terms + p, d * n_terms + q)] +=
                            w * cov * obs.predictors[p] * obs.predictors[q];
                    }
                }
            }
        }
    }

    for c in 0..n_free_categories {
        for p in 0..n_terms {
            let idx = c * n_terms + p;
            gradient[idx] -= ridge * beta[(p, c)];
            information[(idx, idx)] += ridge;
        }
    }
    (gradient, information)
}

fn solve_newton(information: DMatrix<f64>, gradient: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(cholesky) = information.clone().cholesky() {
        return Some(cholesky.solve(gradient));
    }
    let n = information.nrows();
    let jittered = information + DMatrix::identity(n, n) * 1e-8;
    jittered.lu().solve(gradient)
}

pub(crate) fn unflatten(
    direction: &DVector<f64>,
    n_terms: usize,
    n_free_categories: usize,
) -> DMatrix<f64> {
    DMatrix::from_fn(n_terms, n_free_categories, |p, c| direction[c * n_terms + p])
}

pub(crate) fn flatten(coefficients: &DMatrix<f64>) -> DVector<f64> {
    let n_terms = coefficients.nrows();
    DVector::from_fn(n_terms * coefficients.ncols(), |idx, _| {
        coefficients[(idx % n_terms, idx / n_terms)]
    })
}

/// Bounded per-chain cache of segment fits keyed by row range.
///
/// Entries are evicted in insertion order once `capacity` is reached.
#[derive(Debug, Clone, Default)]
pub struct FitCache {
    capacity: usize,
    entries: IndexMap<RowRange, Arc<SegmentFit>>,
    hits: u64,
    misses: u64,
}

impl FitCache {
    /// Creates a cache holding at most `capacity` fits.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: IndexMap::with_capacity(capacity.min(1024)),
            hits: 0,
            misses: 0,
        }
    }

    /// Number of cached fits.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    fn get_or_fit(
        &mut self,
        rows: RowRange,
        fit: impl FnOnce() -> SegmentFit,
    ) -> Arc<SegmentFit> {
        if let Some(found) = self.entries.get(&rows) {
            self.hits += 1;
            return Arc::clone(found);
        }
        self.misses += 1;
        let fitted = Arc::new(fit());
        if self.capacity > 0 {
            if self.entries.len() >= self.capacity {
                self.entries.shift_remove_index(0);
            }
            self.entries.insert(rows, Arc::clone(&fitted));
        }
        fitted
    }
}

/// Scored segment of a changepoint configuration.
#[derive(Debug, Clone)]
pub struct SegmentScore {
    /// Time span of the segment.
    pub span: SegmentSpan,
    /// Maximum-likelihood fit over the segment's rows.
    pub fit: Arc<SegmentFit>,
}

/// Per-segment and total log-likelihood of a changepoint configuration.
#[derive(Debug, Clone)]
pub struct ConfigurationScore {
    /// One entry per segment, in time order.
    pub segments: Vec<SegmentScore>,
    /// Sum of the segment log-likelihoods.
    pub total_log_lik: f64,
}

impl ConfigurationScore {
    /// Number of segments scored with the degenerate penalty.
    pub fn degenerate_segments(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| segment.fit.degenerate)
            .count()
    }
}

/// Scores changepoint configurations against a dataset.
#[derive(Debug, Clone, Copy)]
pub struct SegmentEvaluator<'a> {
    data: &'a TimeSeriesDataset,
    ridge: f64,
}

impl<'a> SegmentEvaluator<'a> {
    /// Creates an evaluator over `data`.
    pub fn new(data: &'a TimeSeriesDataset, ridge: f64) -> Self {
        Self { data, ridge }
    }

    /// Dataset being evaluated.
    pub fn data(&self) -> &'a TimeSeriesDataset {
        self.data
    }

    /// Fits and scores every segment implied by `changepoints`.
    pub fn evaluate(&self, changepoints: &[i64], cache: &mut FitCache) -> ConfigurationScore {
        let mut total = 0.0;
        let segments = segment_spans(self.data, changepoints)
            .into_iter()
            .map(|span| {
                let rows = span_rows(self.data, span);
                let fit = cache.get_or_fit(rows, || fit_segment(self.data, rows, self.ridge));
                total += fit.log_lik;
                SegmentScore { span, fit }
            })
            .collect();
        ConfigurationScore {
            segments,
            total_log_lik: if total.is_nan() { f64::NEG_INFINITY } else { total },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldats_core::{Observation, TimeSeriesDataset};

    fn binary_series(shares: &[f64]) -> TimeSeriesDataset {
        let weights = vec![1.0; shares.len()];
        weighted_series(shares, &weights)
    }

    fn weighted_series(shares: &[f64], weights: &[f64]) -> TimeSeriesDataset {
        let observations = shares
            .iter()
            .zip(weights)
            .enumerate()
            .map(|(idx, (&share, &weight))| Observation {
                time: idx as i64 + 1,
                predictors: vec![1.0],
                response: vec![1.0 - share, share],
                weight,
            })
            .collect();
        TimeSeriesDataset::new(
            vec!["(Intercept)".into()],
            vec!["a".into(), "b".into()],
            observations,
        )
        .unwrap()
    }

    #[test]
    fn intercept_fit_recovers_weighted_mean_logit() {
        let data = binary_series(&[0.2, 0.3, 0.1, 0.2]);
        let fit = fit_segment(&data, (0, 4), 0.0);
        assert!(fit.converged);
        let expected = (0.2f64 / 0.8).ln();
        assert!((fit.coefficients[(0, 0)] - expected).abs() < 1e-6);
        let probs = category_probabilities(&[1.0], &fit.coefficients);
        assert!((probs[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn weights_scale_each_row_log_density() {
        let shares = [0.2, 0.7, 0.4];
        let beta = DMatrix::from_element(1, 1, 0.3);
        let unit = binary_series(&shares);
        let tripled = weighted_series(&shares, &[3.0; 3]);
        let unit_ll = log_likelihood(&unit, (0, 3), &beta);
        assert!((log_likelihood(&tripled, (0, 3), &beta) - 3.0 * unit_ll).abs() < 1e-12);

        let mixed = weighted_series(&shares, &[2.0, 0.5, 1.0]);
        let expected: f64 = (0..3)
            .map(|row| {
                let single = binary_series(&shares[row..=row]);
                [2.0, 0.5, 1.0][row] * log_likelihood(&single, (0, 1), &beta)
            })
            .sum();
        assert!((log_likelihood(&mixed, (0, 3), &beta) - expected).abs() < 1e-12);
    }

    #[test]
    fn uneven_weights_move_the_intercept_fit() {
        let shares = [0.2, 0.6];
        let fit = fit_segment(&weighted_series(&shares, &[3.0, 1.0]), (0, 2), 0.0);
        assert!(fit.converged);
        let weighted_mean: f64 = (3.0 * 0.2 + 0.6) / 4.0;
        let expected = (weighted_mean / (1.0 - weighted_mean)).ln();
        assert!((fit.coefficients[(0, 0)] - expected).abs() < 1e-6);

        let unweighted = fit_segment(&binary_series(&shares), (0, 2), 0.0);
        assert!((unweighted.coefficients[(0, 0)] - (0.4f64 / 0.6).ln()).abs() < 1e-6);
        let information = fit.information.as_ref().unwrap();
        let expected_information = 4.0 * weighted_mean * (1.0 - weighted_mean);
        assert!((information[(0, 0)] - expected_information).abs() < 1e-6);
    }

    #[test]
    fn empty_and_undersized_segments_are_penalised() {
        let data = binary_series(&[0.2, 0.3]);
        let fit = fit_segment(&data, (1, 1), 1e-6);
        assert!(fit.degenerate);
        assert_eq!(fit.log_lik, DEGENERATE_SEGMENT_LOG_LIK);
        assert!(fit.log_lik.is_finite());
        assert!(fit.information.is_none());
    }

    #[test]
    fn spans_assign_boundary_rows_to_the_left() {
        let data = binary_series(&[0.5; 6]);
        let spans = segment_spans(&data, &[3]);
        assert_eq!(spans[0], SegmentSpan { start: 1, end: 3 });
        assert_eq!(spans[1], SegmentSpan { start: 4, end: 6 });
        assert_eq!(span_rows(&data, spans[0]), (0, 3));
        assert_eq!(span_rows(&data, spans[1]), (3, 6));
    }

    #[test]
    fn log_likelihood_ignores_zero_shares() {
        let data = binary_series(&[0.0, 1.0]);
        let beta = DMatrix::from_element(1, 1, 50.0);
        assert!(log_likelihood(&data, (0, 2), &beta).is_finite());
    }

    #[test]
    fn cache_reuses_and_evicts() {
        let data = binary_series(&[0.2, 0.4, 0.6, 0.8]);
        let evaluator = SegmentEvaluator::new(&data, 1e-6);
        let mut cache = FitCache::with_capacity(2);
        let first = evaluator.evaluate(&[2], &mut cache);
        let second = evaluator.evaluate(&[2], &mut cache);
        assert_eq!(first.total_log_lik, second.total_log_lik);
        assert_eq!(cache.stats(), (2, 2));
        evaluator.evaluate(&[3], &mut cache);
        assert_eq!(cache.len(), 2);
    }
}
