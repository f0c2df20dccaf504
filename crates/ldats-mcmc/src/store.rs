use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// One retained cold-chain state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorDraw {
    /// Zero-based iteration at which the draw was retained.
    pub iteration: usize,
    /// Changepoint locations.
    pub changepoints: Vec<i64>,
    /// Coefficient matrix per segment.
    pub coefficients: Vec<DMatrix<f64>>,
    /// Profile log-likelihood of the changepoint configuration.
    #[serde(with = "ldats_core::float_serde")]
    pub log_lik: f64,
    /// Log-likelihood at the sampled coefficients.
    #[serde(with = "ldats_core::float_serde")]
    pub coefficient_log_lik: f64,
}

/// Append-only store of retained draws.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSampleStore {
    draws: Vec<PosteriorDraw>,
}

impl PosteriorSampleStore {
    /// Creates an empty store sized for `capacity` draws.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            draws: Vec::with_capacity(capacity),
        }
    }

    /// Appends a draw.
    pub fn push(&mut self, draw: PosteriorDraw) {
        self.draws.push(draw);
    }

    /// Retained draws in iteration order.
    pub fn draws(&self) -> &[PosteriorDraw] {
        &self.draws
    }

    /// Number of retained draws.
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    /// True when nothing was retained.
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Trace of changepoint `index`.
    pub fn changepoint_trace(&self, index: usize) -> Vec<f64> {
        self.draws
            .iter()
            .map(|draw| draw.changepoints[index] as f64)
            .collect()
    }

    /// Trace of one coefficient.
    pub fn coefficient_trace(&self, segment: usize, term: usize, category: usize) -> Vec<f64> {
        self.draws
            .iter()
            .map(|draw| draw.coefficients[segment][(term, category)])
            .collect()
    }

    /// Trace of the profile log-likelihood.
    pub fn log_lik_trace(&self) -> Vec<f64> {
        self.draws.iter().map(|draw| draw.log_lik).collect()
    }

    /// Writes the draws as CSV, one row per draw.
    ///
    /// Coefficient columns are named `s{segment}:{term}:{category}` using the
    /// non-reference category names.
    pub fn write_csv<P: AsRef<Path>>(
        &self,
        path: P,
        term_names: &[String],
        categories: &[String],
    ) -> std::io::Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        let Some(first) = self.draws.first() else {
            writeln!(file, "iteration,log_lik,coefficient_log_lik")?;
            return file.flush();
        };
        let mut header = vec![
            "iteration".to_string(),
            "log_lik".to_string(),
            "coefficient_log_lik".to_string(),
        ];
        header.extend((0..first.changepoints.len()).map(|idx| format!("cp{}", idx + 1)));
        for segment in 0..first.coefficients.len() {
            for category in categories.iter().skip(1) {
                for term in term_names {
                    header.push(format!("s{}:{}:{}", segment + 1, term, category));
                }
            }
        }
        writeln!(file, "{}", header.join(","))?;

        for draw in &self.draws {
            let mut row = vec![
                draw.iteration.to_string(),
                format!("{:.6}", draw.log_lik),
                format!("{:.6}", draw.coefficient_log_lik),
            ];
            row.extend(draw.changepoints.iter().map(|cp| cp.to_string()));
            for matrix in &draw.coefficients {
                for category in 0..matrix.ncols() {
                    for term in 0..matrix.nrows() {
                        row.push(format!("{:.6}", matrix[(term, category)]));
                    }
                }
            }
            writeln!(file, "{}", row.join(","))?;
        }
        file.flush()
    }
}
