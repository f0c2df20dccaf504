use ldats_mcmc::moves_changepoint::acceptance_probability;
use ldats_mcmc::tempering::{swap_acceptance, swap_log_ratio};
use proptest::prelude::*;

#[test]
fn swap_acceptance_is_symmetric() {
    let (ll_a, ll_b) = (-120.5, -98.25);
    let (t_a, t_b) = (1.0, 2.5);
    let forward = swap_acceptance(ll_a, t_a, ll_b, t_b);
    let backward = swap_acceptance(ll_b, t_b, ll_a, t_a);
    assert!((forward - backward).abs() < 1e-12);
    assert_eq!(forward, 1.0);
}

#[test]
fn worse_state_moving_cold_is_penalised() {
    let probability = swap_acceptance(-10.0, 1.0, -14.0, 2.0);
    assert!((probability - (-2.0f64).exp()).abs() < 1e-12);
}

#[test]
fn equal_temperatures_always_swap() {
    assert_eq!(swap_acceptance(-5.0, 3.0, -500.0, 3.0), 1.0);
}

#[test]
fn changepoint_ratio_is_tempered() {
    let cold = acceptance_probability(-12.0, -10.0, 1.0);
    let hot = acceptance_probability(-12.0, -10.0, 4.0);
    assert!((cold - (-2.0f64).exp()).abs() < 1e-12);
    assert!((hot - (-0.5f64).exp()).abs() < 1e-12);
    assert_eq!(acceptance_probability(f64::NEG_INFINITY, -10.0, 1.0), 0.0);
}

proptest! {
    #[test]
    fn swap_ratio_symmetry_holds_everywhere(
        ll_a in -1e4f64..0.0,
        ll_b in -1e4f64..0.0,
        t_a in 1.0f64..50.0,
        gap in 0.01f64..50.0,
    ) {
        let t_b = t_a + gap;
        let forward = swap_log_ratio(ll_a, t_a, ll_b, t_b);
        let backward = swap_log_ratio(ll_b, t_b, ll_a, t_a);
        prop_assert!((forward - backward).abs() <= 1e-9 * forward.abs().max(1.0));
        let p = swap_acceptance(ll_a, t_a, ll_b, t_b);
        prop_assert!((0.0..=1.0).contains(&p));
    }
}
