use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use ldats_core::{LdatsError, TermSet, TimeSeriesDataset};
use ldats_mcmc::{fit, ControlConfig, FittedModel, ModelCollection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::table::load_table;

#[derive(Args, Debug, Clone)]
pub struct FitArgs {
    /// CSV dataset with a header row.
    #[arg(long)]
    pub data: PathBuf,
    /// YAML control configuration; defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Name of the integer time column.
    #[arg(long, default_value = "time")]
    pub time: String,
    /// Response columns, reference category first.
    #[arg(long, value_delimiter = ',', required = true)]
    pub responses: Vec<String>,
    /// Predictor formula, e.g. `~ 1` or `~ x + y`.
    #[arg(long, default_value = "~ 1")]
    pub formula: String,
    /// Changepoint counts to fit; one model per value.
    #[arg(long, value_delimiter = ',', default_value = "1")]
    pub changepoints: Vec<usize>,
    /// Optional column of per-row weights.
    #[arg(long)]
    pub weights_column: Option<String>,
    /// Overrides the configured master seed.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Output directory.
    #[arg(long)]
    pub out: PathBuf,
}

/// Score of one candidate model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub k: usize,
    #[serde(with = "ldats_core::float_serde")]
    pub score: f64,
    #[serde(with = "ldats_core::float_serde")]
    pub log_lik: f64,
    pub df: usize,
}

/// Contents of `selection.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    pub measurer: ldats_mcmc::Measurer,
    pub selector: ldats_mcmc::Selector,
    pub candidates: Vec<CandidateScore>,
    pub best_k: usize,
}

pub fn run(args: &FitArgs) -> Result<SelectionReport, Box<dyn Error>> {
    fs::create_dir_all(&args.out)?;
    let mut config = match &args.config {
        Some(path) => ControlConfig::load(path)?,
        None => ControlConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed_policy.master_seed = seed;
    }
    config.validate()?;

    let data = load_dataset(args)?;
    info!(
        rows = data.len(),
        categories = data.n_categories(),
        terms = data.n_terms(),
        "dataset loaded"
    );

    if args.changepoints.is_empty() {
        return Err("provide at least one --changepoints value".into());
    }
    let mut models = Vec::with_capacity(args.changepoints.len());
    for &k in &args.changepoints {
        let model = fit(&data, k, &config)?;
        if model.diagnostics.final_degenerate_segments > 0 {
            warn!(
                k,
                degenerate = model.diagnostics.final_degenerate_segments,
                "final cold state contains segments too small to fit"
            );
        }
        persist_model(&args.out, &model)?;
        models.push(model);
    }

    let collection = ModelCollection::new(models)?;
    let best = collection.best(config.measurer, config.selector)?;
    let report = SelectionReport {
        measurer: config.measurer,
        selector: config.selector,
        candidates: collection
            .models()
            .iter()
            .map(|model| CandidateScore {
                k: model.k,
                score: model.score,
                log_lik: model.log_lik,
                df: model.df,
            })
            .collect(),
        best_k: best.k,
    };
    fs::write(
        args.out.join("selection.json"),
        serde_json::to_string_pretty(&report)?,
    )?;
    fs::write(args.out.join("config.yaml"), serde_yaml::to_string(&config)?)?;
    info!(best_k = report.best_k, "model selection written");
    Ok(report)
}

fn load_dataset(args: &FitArgs) -> Result<TimeSeriesDataset, LdatsError> {
    let table = load_table(&args.data)?;
    let terms = TermSet::parse(&args.formula)?;
    let weights = match &args.weights_column {
        Some(name) => Some(table.column(name).map(<[f64]>::to_vec).ok_or_else(|| {
            LdatsError::config("unknown-weights-column", format!("no column named {name}"))
        })?),
        None => None,
    };
    TimeSeriesDataset::from_table(
        &table,
        &args.time,
        &args.responses,
        &terms,
        weights.as_deref(),
    )
}

fn persist_model(out: &Path, model: &FittedModel) -> Result<(), Box<dyn Error>> {
    fs::write(
        out.join(format!("model_k{}.json", model.k)),
        model.to_json()?,
    )?;
    model.draws.write_csv(
        out.join(format!("draws_k{}.csv", model.k)),
        &model.term_names,
        &model.categories,
    )?;
    Ok(())
}
