use std::fs;

use ldats_core::{Observation, TimeSeriesDataset};
use ldats_mcmc::{
    fit, ControlConfig, FittedModel, LadderConfig, LadderPolicy, Measurer, ModelCollection,
    Selector,
};

fn step_series() -> TimeSeriesDataset {
    let observations = (1..=24)
        .map(|time| {
            let response = if time <= 12 {
                vec![0.6, 0.3, 0.1]
            } else {
                vec![0.2, 0.3, 0.5]
            };
            Observation {
                time,
                predictors: vec![1.0],
                response,
                weight: 4.0,
            }
        })
        .collect();
    TimeSeriesDataset::new(
        vec!["(Intercept)".into()],
        vec!["a".into(), "b".into(), "c".into()],
        observations,
    )
    .unwrap()
}

fn quick_config() -> ControlConfig {
    let mut config = ControlConfig::default();
    config.iterations = 120;
    config.burnin = 20;
    config.thin = 4;
    config.ladder = LadderConfig {
        chains: 2,
        policy: LadderPolicy::Geometric { ratio: 2.0 },
    };
    config
}

#[test]
fn draws_export_as_csv_with_named_columns() {
    let data = step_series();
    let model = fit(&data, 1, &quick_config()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("draws.csv");
    model
        .draws
        .write_csv(&path, &model.term_names, &model.categories)
        .unwrap();

    let contents = fs::read_to_string(&path).unwrap();
    let mut lines = contents.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    assert_eq!(&header[..4], &["iteration", "log_lik", "coefficient_log_lik", "cp1"]);
    assert!(header.contains(&"s1:(Intercept):b"));
    assert!(header.contains(&"s2:(Intercept):c"));
    assert_eq!(header.len(), 4 + 2 * 2);
    assert_eq!(lines.count(), model.draws.len());
}

#[test]
fn fitted_model_round_trips_through_json() {
    let data = step_series();
    let model = fit(&data, 1, &quick_config()).unwrap();
    let json = model.to_json().unwrap();
    let parsed: FittedModel = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.k, 1);
    assert_eq!(parsed.draws, model.draws);
    assert_eq!(parsed.coefficients.len(), 2 * 2);
    assert_eq!(parsed.measurer, Measurer::Aic);
}

#[test]
fn infinite_aicc_score_round_trips_through_json() {
    let data = step_series();
    let mut config = quick_config();
    config.measurer = Measurer::Aicc;
    let model = fit(&data, 10, &config).unwrap();
    assert!(model.df + 1 >= model.n_observations);
    assert_eq!(model.score, f64::INFINITY);

    let json = model.to_json().unwrap();
    assert!(json.contains(r#""score": "inf""#));
    let parsed: FittedModel = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.score, f64::INFINITY);
    assert!((parsed.log_lik - model.log_lik).abs() <= 1e-9 * model.log_lik.abs());
    assert_eq!(parsed.draws.len(), model.draws.len());
}

#[test]
fn collection_picks_the_lowest_aic() {
    let data = step_series();
    let config = quick_config();
    let models = (0..=2)
        .map(|k| fit(&data, k, &config))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let collection = ModelCollection::new(models).unwrap();
    assert_eq!(collection.len(), 3);

    let scores = collection.scores(Measurer::Aic);
    let best = collection.best(Measurer::Aic, Selector::Min).unwrap();
    let lowest = scores.iter().copied().fold(f64::INFINITY, f64::min);
    assert_eq!(best.score, lowest);
    assert_ne!(best.k, 0);

    let by_k = collection
        .select_with(|model| model.k as f64, |scores| Selector::Max.pick(scores))
        .unwrap();
    assert_eq!(by_k.k, 2);
    assert!(ModelCollection::new(Vec::new()).unwrap_err().is_config());
}
