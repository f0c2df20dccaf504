use ldats_core::RngHandle;
use serde::{Deserialize, Serialize};

use crate::config::ProposalConfig;

/// Kind of changepoint move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangepointMoveKind {
    /// Bounded offset of a single boundary.
    Jitter,
    /// Uniform relocation of a single boundary over the interior.
    Jump,
}

/// Candidate changepoint configuration produced by a move.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangepointProposal {
    /// Move that produced the candidate.
    pub kind: ChangepointMoveKind,
    /// Index of the boundary that moved.
    pub boundary: usize,
    /// Full candidate configuration.
    pub candidate: Vec<i64>,
    /// Whether the candidate satisfies ordering and bounds.
    pub valid: bool,
}

/// True when `changepoints` is strictly increasing and strictly inside `(first, last)`.
pub fn is_valid(changepoints: &[i64], first: i64, last: i64) -> bool {
    changepoints.iter().all(|&cp| cp > first && cp < last)
        && changepoints.windows(2).all(|pair| pair[0] < pair[1])
}

/// Proposes a new configuration by moving one boundary.
///
/// Both move kinds are symmetric, so the Metropolis–Hastings ratio reduces to
/// the tempered likelihood ratio. Returns `None` when there is nothing to move.
pub fn propose(
    current: &[i64],
    first: i64,
    last: i64,
    config: &ProposalConfig,
    rng: &mut RngHandle,
) -> Option<ChangepointProposal> {
    if current.is_empty() {
        return None;
    }
    let boundary = rng.index(current.len());
    let mut candidate = current.to_vec();
    let kind = if rng.uniform() < config.jump_probability && last - first >= 2 {
        candidate[boundary] = rng.integer(first + 1, last - 1);
        ChangepointMoveKind::Jump
    } else {
        let magnitude = rng.integer(1, config.max_jitter.max(1));
        let offset = if rng.uniform() < 0.5 { -magnitude } else { magnitude };
        candidate[boundary] += offset;
        ChangepointMoveKind::Jitter
    };
    let valid = is_valid(&candidate, first, last);
    Some(ChangepointProposal {
        kind,
        boundary,
        candidate,
        valid,
    })
}

/// Log Metropolis ratio of a changepoint move at `temperature`.
pub fn metropolis_log_ratio(log_lik_new: f64, log_lik_old: f64, temperature: f64) -> f64 {
    (log_lik_new - log_lik_old) / temperature
}

/// `min(1, exp((LL_new - LL_old) / T))`, zero for undefined ratios.
pub fn acceptance_probability(log_lik_new: f64, log_lik_old: f64, temperature: f64) -> f64 {
    let ratio = metropolis_log_ratio(log_lik_new, log_lik_old, temperature);
    if ratio.is_nan() {
        0.0
    } else {
        ratio.exp().min(1.0)
    }
}

/// Evenly spaced starting configuration, repaired to satisfy [`is_valid`].
///
/// Returns `None` when `k` positions cannot fit strictly inside `(first, last)`.
pub fn evenly_spaced(k: usize, first: i64, last: i64) -> Option<Vec<i64>> {
    let interior = last - first - 1;
    if (k as i64) > interior.max(0) {
        return None;
    }
    let span = (last - first) as f64;
    let mut positions: Vec<i64> = (1..=k)
        .map(|j| first + (span * j as f64 / (k + 1) as f64).round() as i64)
        .collect();
    let mut floor = first;
    for position in positions.iter_mut() {
        *position = (*position).max(floor + 1);
        floor = *position;
    }
    let mut ceiling = last;
    for position in positions.iter_mut().rev() {
        *position = (*position).min(ceiling - 1);
        ceiling = *position;
    }
    Some(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_requires_order_and_bounds() {
        assert!(is_valid(&[], 0, 1));
        assert!(is_valid(&[2, 5], 1, 6));
        assert!(!is_valid(&[5, 2], 1, 6));
        assert!(!is_valid(&[2, 2], 1, 6));
        assert!(!is_valid(&[1, 3], 1, 6));
        assert!(!is_valid(&[3, 6], 1, 6));
    }

    #[test]
    fn even_spacing_fills_tight_ranges() {
        assert_eq!(evenly_spaced(1, 1, 50), Some(vec![26]));
        assert_eq!(
            evenly_spaced(10, 1, 12),
            Some((2..=11).collect::<Vec<i64>>())
        );
        assert_eq!(evenly_spaced(11, 1, 12), None);
        assert_eq!(evenly_spaced(0, 1, 2), Some(Vec::new()));
    }

    #[test]
    fn empty_configuration_has_no_moves() {
        let mut rng = RngHandle::from_seed(1);
        assert!(propose(&[], 0, 10, &ProposalConfig::default(), &mut rng).is_none());
    }

    #[test]
    fn acceptance_is_tempered() {
        let cold = acceptance_probability(-12.0, -10.0, 1.0);
        let hot = acceptance_probability(-12.0, -10.0, 4.0);
        assert!(hot > cold);
        assert_eq!(acceptance_probability(-1.0, -2.0, 1.0), 1.0);
        assert_eq!(
            acceptance_probability(f64::NEG_INFINITY, f64::NEG_INFINITY, 1.0),
            0.0
        );
    }
}
