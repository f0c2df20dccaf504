use ldats_core::errors::ErrorInfo;
use ldats_core::LdatsError;
use serde::{Deserialize, Serialize};

use crate::summary::FittedModel;

/// Reduction of a fitted model to a scalar score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Measurer {
    /// `-2 LL + 2 df`.
    #[default]
    Aic,
    /// AIC with the small-sample correction; infinite when `n <= df + 1`.
    Aicc,
    /// `-2 LL + df ln n`.
    Bic,
    /// `-LL`.
    NegLogLik,
}

impl Measurer {
    /// Scores a log-likelihood with `df` parameters over `n` observations.
    pub fn score(&self, log_lik: f64, df: usize, n: usize) -> f64 {
        let df = df as f64;
        let n = n as f64;
        match self {
            Measurer::Aic => -2.0 * log_lik + 2.0 * df,
            Measurer::Aicc => {
                let denominator = n - df - 1.0;
                if denominator <= 0.0 {
                    f64::INFINITY
                } else {
                    -2.0 * log_lik + 2.0 * df + 2.0 * df * (df + 1.0) / denominator
                }
            }
            Measurer::Bic => -2.0 * log_lik + df * n.ln(),
            Measurer::NegLogLik => -log_lik,
        }
    }

    /// Scores a fitted model.
    pub fn measure(&self, model: &FittedModel) -> f64 {
        self.score(model.log_lik, model.df, model.n_observations)
    }
}

/// Rule for choosing the best score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Selector {
    /// Lowest score wins.
    #[default]
    Min,
    /// Highest score wins.
    Max,
}

impl Selector {
    /// Index of the winning score, ignoring NaN. Ties go to the earliest entry.
    pub fn pick(&self, scores: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, &score) in scores.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, current)) => match self {
                    Selector::Min => score < current,
                    Selector::Max => score > current,
                },
            };
            if better {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

/// Non-empty set of fitted models over the same dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCollection {
    models: Vec<FittedModel>,
}

impl ModelCollection {
    /// Wraps a single model.
    pub fn single(model: FittedModel) -> Self {
        Self {
            models: vec![model],
        }
    }

    /// Builds a collection, rejecting an empty list.
    pub fn new(models: Vec<FittedModel>) -> Result<Self, LdatsError> {
        if models.is_empty() {
            return Err(LdatsError::config(
                "empty-collection",
                "a model collection needs at least one model",
            ));
        }
        Ok(Self { models })
    }

    /// Adds a model.
    pub fn push(&mut self, model: FittedModel) {
        self.models.push(model);
    }

    /// Models in insertion order.
    pub fn models(&self) -> &[FittedModel] {
        &self.models
    }

    /// Number of models; never zero.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Always false.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Scores of every model under `measurer`.
    pub fn scores(&self, measurer: Measurer) -> Vec<f64> {
        self.models
            .iter()
            .map(|model| measurer.measure(model))
            .collect()
    }

    /// Best model under a measurer and selector.
    pub fn best(&self, measurer: Measurer, selector: Selector) -> Result<&FittedModel, LdatsError> {
        self.select_with(|model| measurer.measure(model), |scores| selector.pick(scores))
    }

    /// Best model under caller-supplied measure and selection functions.
    pub fn select_with<M, S>(&self, measure: M, select: S) -> Result<&FittedModel, LdatsError>
    where
        M: Fn(&FittedModel) -> f64,
        S: FnOnce(&[f64]) -> Option<usize>,
    {
        let scores: Vec<f64> = self.models.iter().map(measure).collect();
        let chosen = select(&scores).ok_or_else(|| {
            LdatsError::Numeric(
                ErrorInfo::new("no-selectable-model", "every model score is undefined")
                    .with_context("models", self.models.len()),
            )
        })?;
        self.models.get(chosen).ok_or_else(|| {
            LdatsError::Config(
                ErrorInfo::new("selection-out-of-range", "selector returned an unknown index")
                    .with_context("index", chosen)
                    .with_context("models", self.models.len()),
            )
        })
    }
}

impl From<FittedModel> for ModelCollection {
    fn from(model: FittedModel) -> Self {
        Self::single(model)
    }
}
