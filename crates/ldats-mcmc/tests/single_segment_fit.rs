use ldats_core::{Observation, TimeSeriesDataset};
use ldats_mcmc::{fit, fit_segment, ControlConfig, LadderConfig, LadderPolicy};

const TRUE_COEFFICIENTS: [[f64; 2]; 2] = [[0.4, -0.3], [0.8, 0.5]];

fn regression_series() -> TimeSeriesDataset {
    let observations = (0..80)
        .map(|time| {
            let x = (time as f64 - 40.0) / 40.0;
            let eta = [
                0.0,
                TRUE_COEFFICIENTS[0][0] + TRUE_COEFFICIENTS[1][0] * x,
                TRUE_COEFFICIENTS[0][1] + TRUE_COEFFICIENTS[1][1] * x,
            ];
            let total: f64 = eta.iter().map(|value| value.exp()).sum();
            Observation {
                time,
                predictors: vec![1.0, x],
                response: eta.iter().map(|value| value.exp() / total).collect(),
                weight: 3.0,
            }
        })
        .collect();
    TimeSeriesDataset::new(
        vec!["(Intercept)".into(), "x".into()],
        vec!["ref".into(), "b".into(), "c".into()],
        observations,
    )
    .unwrap()
}

#[test]
fn no_changepoints_matches_direct_regression() {
    let data = regression_series();
    let mut config = ControlConfig::default();
    let reference = fit_segment(&data, (0, data.len()), config.ridge);
    assert!(reference.converged);
    for term in 0..2 {
        for category in 0..2 {
            let fitted = reference.coefficients[(term, category)];
            assert!((fitted - TRUE_COEFFICIENTS[term][category]).abs() < 1e-5);
        }
    }

    config.iterations = 24000;
    config.burnin = 4000;
    config.thin = 2;
    config.ladder = LadderConfig {
        chains: 2,
        policy: LadderPolicy::Geometric { ratio: 2.0 },
    };
    config.adaptation.enabled = true;
    config.adaptation.interval = 50;
    config.adaptation.target_acceptance = 0.25;
    let model = fit(&data, 0, &config).unwrap();

    assert!(model.changepoints.is_empty());
    assert_eq!(model.df, 4);
    let sampled = model.mean_coefficients(0).unwrap();
    for term in 0..2 {
        for category in 0..2 {
            let diff = (sampled[(term, category)] - reference.coefficients[(term, category)]).abs();
            assert!(diff < 0.1, "term {term} category {category}: {sampled}");
        }
    }

    let information = reference.information.clone().unwrap();
    let covariance = information.try_inverse().unwrap();
    for category in 0..2 {
        for term in 0..2 {
            let trace = model.draws.coefficient_trace(0, term, category);
            let mean = trace.iter().sum::<f64>() / trace.len() as f64;
            let variance =
                trace.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / trace.len() as f64;
            let expected = covariance[(category * 2 + term, category * 2 + term)].sqrt();
            let ratio = variance.sqrt() / expected;
            assert!(
                (0.8..1.25).contains(&ratio),
                "term {term} category {category}: sd ratio {ratio}"
            );
        }
    }
    let profile = model.draws.log_lik_trace();
    assert!(profile.iter().all(|&ll| (ll - reference.log_lik).abs() < 1e-9));
}
