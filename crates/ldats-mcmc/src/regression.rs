use ldats_core::{RngHandle, TimeSeriesDataset};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::likelihood::{self, RowRange, SegmentFit, SegmentSpan};

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Coefficients of one segment together with their cached scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentParameters {
    /// Time span owning these coefficients.
    pub span: SegmentSpan,
    /// Rows covered by the span.
    pub rows: RowRange,
    /// `(n_terms, n_categories - 1)` coefficient matrix, category 0 is the reference.
    pub coefficients: DMatrix<f64>,
    /// Log-likelihood of the segment at `coefficients`.
    pub log_lik: f64,
    /// Gaussian log-prior of `coefficients`.
    pub log_prior: f64,
}

impl SegmentParameters {
    /// Draws fresh coefficients for a rebuilt segment from the Gaussian
    /// approximation of its tempered posterior.
    ///
    /// The precision is `information / temperature + I / prior_sd²` and the
    /// mean shrinks the fitted coefficients by the prior. Degenerate fits, or
    /// fits whose precision is not positive definite, keep the fitted point.
    pub fn from_laplace(
        data: &TimeSeriesDataset,
        span: SegmentSpan,
        fit: &SegmentFit,
        temperature: f64,
        prior_sd: f64,
        rng: &mut RngHandle,
    ) -> Self {
        let coefficients = fit
            .information
            .as_ref()
            .and_then(|information| {
                laplace_draw(information, &fit.coefficients, temperature, prior_sd, rng)
            })
            .unwrap_or_else(|| fit.coefficients.clone());
        Self::with_coefficients(data, span, fit.rows, coefficients, prior_sd)
    }

    /// Builds parameters from explicit coefficients.
    pub fn with_coefficients(
        data: &TimeSeriesDataset,
        span: SegmentSpan,
        rows: RowRange,
        coefficients: DMatrix<f64>,
        prior_sd: f64,
    ) -> Self {
        Self {
            span,
            rows,
            log_lik: likelihood::log_likelihood(data, rows, &coefficients),
            log_prior: log_prior(&coefficients, prior_sd),
            coefficients,
        }
    }
}

/// Independent zero-centred Gaussian log-density of every coefficient.
pub fn log_prior(coefficients: &DMatrix<f64>, prior_sd: f64) -> f64 {
    let norm = prior_sd.ln() + LN_SQRT_2PI;
    coefficients
        .iter()
        .map(|b| -0.5 * (b / prior_sd).powi(2) - norm)
        .sum()
}

fn laplace_draw(
    information: &DMatrix<f64>,
    mode: &DMatrix<f64>,
    temperature: f64,
    prior_sd: f64,
    rng: &mut RngHandle,
) -> Option<DMatrix<f64>> {
    let n = information.nrows();
    let scaled = information / temperature;
    let precision = &scaled + DMatrix::identity(n, n) / (prior_sd * prior_sd);
    let covariance = precision.cholesky()?.inverse();
    let mean = &covariance * (scaled * likelihood::flatten(mode));
    let factor = covariance.cholesky()?.l();
    let noise = DVector::from_fn(n, |_, _| rng.standard_normal());
    let draw = mean + factor * noise;
    Some(likelihood::unflatten(&draw, mode.nrows(), mode.ncols()))
}

/// Random-walk Metropolis update of one segment's coefficient matrix.
///
/// The likelihood is tempered by `temperature`, the prior is not. Returns
/// whether the proposal was accepted; on rejection `params` is untouched.
pub fn update_segment(
    data: &TimeSeriesDataset,
    params: &mut SegmentParameters,
    temperature: f64,
    step: f64,
    prior_sd: f64,
    rng: &mut RngHandle,
) -> bool {
    let candidate = params
        .coefficients
        .map(|value| value + step * rng.standard_normal());
    let candidate_ll = likelihood::log_likelihood(data, params.rows, &candidate);
    let candidate_prior = log_prior(&candidate, prior_sd);
    let log_ratio = (candidate_ll - params.log_lik) / temperature
        + (candidate_prior - params.log_prior);
    if !rng.accept_log(log_ratio) {
        return false;
    }
    params.coefficients = candidate;
    params.log_lik = candidate_ll;
    params.log_prior = candidate_prior;
    true
}
