//! Time-indexed compositional datasets consumed by the sampler.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, LdatsError};
use crate::terms::TermSet;

/// Tolerance applied when checking that a response row sums to one.
pub const RESPONSE_SUM_TOLERANCE: f64 = 1e-6;

/// Column-oriented numeric table, the raw form handed over by upstream tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl DataTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a named column. All columns must share a length.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), LdatsError> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(LdatsError::Data(
                ErrorInfo::new("duplicate-column", "column name already present")
                    .with_context("column", &name),
            ));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != values.len() {
                return Err(LdatsError::Data(
                    ErrorInfo::new("ragged-columns", "column length differs from the table")
                        .with_context("column", &name)
                        .with_context("expected", first.len())
                        .with_context("found", values.len()),
                ));
            }
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Builder-style variant of [`DataTable::push_column`].
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, LdatsError> {
        self.push_column(name, values)?;
        Ok(self)
    }

    /// Column names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    fn require(&self, name: &str) -> Result<&[f64], LdatsError> {
        self.column(name).ok_or_else(|| {
            LdatsError::Config(
                ErrorInfo::new("unknown-column", "column not found in dataset")
                    .with_context("column", name)
                    .with_context("columns", self.names.join(",")),
            )
        })
    }
}

/// One row of the time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Integer position on the time axis.
    pub time: i64,
    /// Design-matrix row (intercept first when present).
    pub predictors: Vec<f64>,
    /// Category proportions, non-negative and summing to one.
    pub response: Vec<f64>,
    /// Likelihood multiplier for the row.
    pub weight: f64,
}

/// Largest accepted time magnitude; every such integer is exact in `f64`
/// and spans between them cannot overflow `i64`.
pub const MAX_ABS_TIME: i64 = 1 << 53;

fn time_out_of_range(row: usize, time: f64) -> LdatsError {
    LdatsError::Data(
        ErrorInfo::new("time-out-of-range", "time values must lie within 2^53 of zero")
            .with_context("row", row)
            .with_context("time", time)
            .with_context("limit", MAX_ABS_TIME),
    )
}

/// Validated, time-ordered dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesDataset {
    term_names: Vec<String>,
    categories: Vec<String>,
    observations: Vec<Observation>,
}

impl TimeSeriesDataset {
    /// Validates and wraps a set of observations.
    pub fn new(
        term_names: Vec<String>,
        categories: Vec<String>,
        observations: Vec<Observation>,
    ) -> Result<Self, LdatsError> {
        if observations.is_empty() {
            return Err(LdatsError::data("empty-dataset", "dataset has no rows"));
        }
        if term_names.is_empty() {
            return Err(LdatsError::config(
                "empty-design",
                "a model needs at least one design column",
            ));
        }
        if categories.len() < 2 {
            return Err(LdatsError::Data(
                ErrorInfo::new("too-few-categories", "need at least two response categories")
                    .with_context("categories", categories.len()),
            ));
        }
        for (row, obs) in observations.iter().enumerate() {
            if obs.predictors.len() != term_names.len() {
                return Err(LdatsError::Data(
                    ErrorInfo::new("predictor-width", "predictor row has the wrong width")
                        .with_context("row", row)
                        .with_context("expected", term_names.len())
                        .with_context("found", obs.predictors.len()),
                ));
            }
            if obs.predictors.iter().any(|value| !value.is_finite()) {
                return Err(LdatsError::Data(
                    ErrorInfo::new("non-finite-predictor", "predictor values must be finite")
                        .with_context("row", row),
                ));
            }
            if obs.response.len() != categories.len() {
                return Err(LdatsError::Data(
                    ErrorInfo::new("response-width", "response row has the wrong width")
                        .with_context("row", row)
                        .with_context("expected", categories.len())
                        .with_context("found", obs.response.len()),
                ));
            }
            if obs.response.iter().any(|value| !value.is_finite() || *value < 0.0) {
                return Err(LdatsError::Data(
                    ErrorInfo::new("negative-response", "response values must be non-negative")
                        .with_context("row", row),
                ));
            }
            let total: f64 = obs.response.iter().sum();
            if (total - 1.0).abs() > RESPONSE_SUM_TOLERANCE {
                return Err(LdatsError::Data(
                    ErrorInfo::new("response-sum", "response proportions must sum to one")
                        .with_context("row", row)
                        .with_context("sum", total),
                ));
            }
            if !obs.weight.is_finite() || obs.weight <= 0.0 {
                return Err(LdatsError::Config(
                    ErrorInfo::new("invalid-weight", "observation weights must be positive")
                        .with_context("row", row)
                        .with_context("weight", obs.weight),
                ));
            }
            if !(-MAX_ABS_TIME..=MAX_ABS_TIME).contains(&obs.time) {
                return Err(time_out_of_range(row, obs.time as f64));
            }
            if row > 0 && obs.time <= observations[row - 1].time {
                return Err(LdatsError::Data(
                    ErrorInfo::new("unsorted-time", "time indices must be strictly increasing")
                        .with_context("row", row)
                        .with_context("previous", observations[row - 1].time)
                        .with_context("time", obs.time)
                        .with_hint("sort the rows by time and drop duplicates upstream"),
                ));
            }
        }
        Ok(Self {
            term_names,
            categories,
            observations,
        })
    }

    /// Builds a dataset from named columns.
    ///
    /// `weights` of `None` means uniform weight one.
    pub fn from_table(
        table: &DataTable,
        time_column: &str,
        response_columns: &[String],
        terms: &TermSet,
        weights: Option<&[f64]>,
    ) -> Result<Self, LdatsError> {
        let times = table.require(time_column)?;
        let predictor_columns = terms
            .resolve(table.names())?
            .into_iter()
            .map(|idx| table.columns[idx].as_slice())
            .collect::<Vec<_>>();
        let responses = response_columns
            .iter()
            .map(|name| table.require(name))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(weights) = weights {
            if weights.len() != table.rows() {
                return Err(LdatsError::Config(
                    ErrorInfo::new("weight-length", "one weight is required per row")
                        .with_context("rows", table.rows())
                        .with_context("weights", weights.len()),
                ));
            }
        }

        let mut observations = Vec::with_capacity(table.rows());
        for row in 0..table.rows() {
            let raw_time = times[row];
            if !raw_time.is_finite() || raw_time.fract() != 0.0 {
                return Err(LdatsError::Data(
                    ErrorInfo::new("non-integer-time", "time values must be integers")
                        .with_context("row", row)
                        .with_context("time", raw_time),
                ));
            }
            if raw_time.abs() > MAX_ABS_TIME as f64 {
                return Err(time_out_of_range(row, raw_time));
            }
            let mut predictors = Vec::with_capacity(terms.len());
            if terms.has_intercept() {
                predictors.push(1.0);
            }
            predictors.extend(predictor_columns.iter().map(|column| column[row]));
            observations.push(Observation {
                time: raw_time as i64,
                predictors,
                response: responses.iter().map(|column| column[row]).collect(),
                weight: weights.map_or(1.0, |w| w[row]),
            });
        }
        Self::new(terms.column_names(), response_columns.to_vec(), observations)
    }

    /// Design column names.
    pub fn term_names(&self) -> &[String] {
        &self.term_names
    }

    /// Response category names; the first is the reference category.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Rows in time order.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Always false for a validated dataset.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Number of design columns.
    pub fn n_terms(&self) -> usize {
        self.term_names.len()
    }

    /// Number of response categories.
    pub fn n_categories(&self) -> usize {
        self.categories.len()
    }

    /// Time of the first row.
    pub fn first_time(&self) -> i64 {
        self.observations[0].time
    }

    /// Time of the last row.
    pub fn last_time(&self) -> i64 {
        self.observations[self.observations.len() - 1].time
    }

    /// Number of integer positions strictly between the first and last time.
    pub fn interior_positions(&self) -> i64 {
        self.last_time()
            .saturating_sub(self.first_time())
            .saturating_sub(1)
            .max(0)
    }

    /// Row indices whose time lies in the inclusive span `[start, end]`.
    pub fn rows_in_span(&self, start: i64, end: i64) -> Range<usize> {
        let lo = self.observations.partition_point(|obs| obs.time < start);
        let hi = self.observations.partition_point(|obs| obs.time <= end);
        lo..hi.max(lo)
    }
}
