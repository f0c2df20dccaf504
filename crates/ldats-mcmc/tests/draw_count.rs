use ldats_core::{Observation, TimeSeriesDataset};
use ldats_mcmc::{fit, ControlConfig, LadderConfig, LadderPolicy, RunController, RunPhase};

fn noisy_series(len: i64) -> TimeSeriesDataset {
    let observations = (0..len)
        .map(|time| {
            let share = 0.3 + 0.4 * ((time as f64) * 0.7).sin().abs();
            Observation {
                time,
                predictors: vec![1.0],
                response: vec![1.0 - share, share],
                weight: 1.0,
            }
        })
        .collect();
    TimeSeriesDataset::new(
        vec!["(Intercept)".into()],
        vec!["a".into(), "b".into()],
        observations,
    )
    .unwrap()
}

fn short_config(iterations: usize, burnin: usize, thin: usize) -> ControlConfig {
    let mut config = ControlConfig::default();
    config.iterations = iterations;
    config.burnin = burnin;
    config.thin = thin;
    config.ladder = LadderConfig {
        chains: 2,
        policy: LadderPolicy::Geometric { ratio: 3.0 },
    };
    config
}

#[test]
fn retained_draws_follow_floor_rule() {
    let data = noisy_series(20);
    for (iterations, burnin, thin) in [(10, 0, 1), (10, 3, 2), (17, 4, 5), (30, 29, 1), (12, 0, 12)] {
        let config = short_config(iterations, burnin, thin);
        let model = fit(&data, 1, &config).unwrap();
        let expected = (iterations - burnin) / thin;
        assert_eq!(model.draws.len(), expected, "{iterations}/{burnin}/{thin}");
        assert_eq!(config.retained_draws(), expected);
        for draw in model.draws.draws() {
            assert!(draw.iteration >= burnin);
        }
    }
}

#[test]
fn controller_walks_through_phases() {
    let data = noisy_series(15);
    let config = short_config(6, 2, 1);
    let mut controller = RunController::new(&data, 2, &config).unwrap();
    assert_eq!(controller.phase(), RunPhase::Initializing);
    assert!(controller.cold_state().is_none());

    assert_eq!(controller.step(), RunPhase::BurningIn);
    assert_eq!(controller.iteration(), 0);
    assert_eq!(controller.step(), RunPhase::BurningIn);
    assert_eq!(controller.step(), RunPhase::Sampling);
    assert!(controller.store().is_empty());
    assert_eq!(controller.step(), RunPhase::Sampling);
    assert_eq!(controller.store().len(), 1);
    while controller.step() != RunPhase::Done {}
    assert_eq!(controller.iteration(), 6);
    assert_eq!(controller.store().len(), 4);
    assert_eq!(controller.step(), RunPhase::Done);

    let model = controller.finish().unwrap();
    assert_eq!(model.diagnostics.cold_handles.len(), 6);
}

#[test]
fn finishing_early_is_rejected() {
    let data = noisy_series(15);
    let config = short_config(6, 0, 1);
    let mut controller = RunController::new(&data, 1, &config).unwrap();
    controller.step();
    assert!(controller.finish().unwrap_err().is_config());
}

#[test]
fn adaptation_freezes_after_burn_in() {
    let data = noisy_series(30);
    let mut config = short_config(120, 60, 1);
    config.adaptation.enabled = true;
    config.adaptation.interval = 10;
    config.proposal.coefficient_step = 5.0;
    let mut controller = RunController::new(&data, 1, &config).unwrap();
    while controller.phase() != RunPhase::Sampling {
        controller.step();
    }
    let frozen = controller.coefficient_scales().to_vec();
    assert!(frozen.iter().any(|&scale| scale != 1.0));
    while controller.step() != RunPhase::Done {}
    assert_eq!(controller.coefficient_scales(), frozen.as_slice());
}
