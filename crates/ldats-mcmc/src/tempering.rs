use ldats_core::errors::ErrorInfo;
use ldats_core::{LdatsError, RngHandle};

use crate::config::{LadderConfig, LadderPolicy};

/// Builds the temperature ladder, rejecting malformed schedules.
///
/// The ladder always starts at the cold temperature `1.0` and is strictly
/// increasing.
pub fn build_ladder(config: &LadderConfig) -> Result<Vec<f64>, LdatsError> {
    let ladder = match &config.policy {
        LadderPolicy::Geometric { ratio } => {
            if config.chains == 0 {
                return Err(LdatsError::config(
                    "empty-ladder",
                    "the ladder needs at least one chain",
                ));
            }
            if !ratio.is_finite() || *ratio <= 1.0 {
                return Err(LdatsError::Config(
                    ErrorInfo::new("invalid-ladder-ratio", "geometric ratio must exceed one")
                        .with_context("ratio", ratio),
                ));
            }
            (0..config.chains)
                .map(|rank| ratio.powi(rank as i32))
                .collect::<Vec<_>>()
        }
        LadderPolicy::Manual { temperatures } => temperatures.clone(),
    };
    validate_ladder(&ladder)?;
    Ok(ladder)
}

/// Checks that a schedule is non-empty, starts at one, and strictly increases.
pub fn validate_ladder(temperatures: &[f64]) -> Result<(), LdatsError> {
    let Some(&first) = temperatures.first() else {
        return Err(LdatsError::config(
            "empty-ladder",
            "the ladder needs at least one temperature",
        ));
    };
    if first != 1.0 {
        return Err(LdatsError::Config(
            ErrorInfo::new("cold-temperature", "the first temperature must be exactly 1")
                .with_context("first", first),
        ));
    }
    for (rank, pair) in temperatures.windows(2).enumerate() {
        if !pair[1].is_finite() || pair[1] <= pair[0] {
            return Err(LdatsError::Config(
                ErrorInfo::new("unordered-ladder", "temperatures must strictly increase")
                    .with_context("rank", rank + 1)
                    .with_context("temperature", pair[1]),
            ));
        }
    }
    Ok(())
}

/// Log acceptance ratio of swapping the states at two temperatures.
///
/// `(LL_a - LL_b) * (1/T_b - 1/T_a)`; symmetric under exchanging the roles of
/// the two chains.
pub fn swap_log_ratio(log_lik_a: f64, temp_a: f64, log_lik_b: f64, temp_b: f64) -> f64 {
    (log_lik_a - log_lik_b) * (1.0 / temp_b - 1.0 / temp_a)
}

/// Parallel-tempering swap acceptance probability.
pub fn swap_acceptance(log_lik_a: f64, temp_a: f64, log_lik_b: f64, temp_b: f64) -> f64 {
    let ratio = swap_log_ratio(log_lik_a, temp_a, log_lik_b, temp_b);
    if ratio.is_nan() {
        0.0
    } else {
        ratio.exp().min(1.0)
    }
}

/// Attempts a swap using the provided RNG handle.
pub fn attempt_swap(
    log_lik_a: f64,
    temp_a: f64,
    log_lik_b: f64,
    temp_b: f64,
    rng: &mut RngHandle,
) -> (bool, f64) {
    let acceptance = swap_acceptance(log_lik_a, temp_a, log_lik_b, temp_b);
    let accepted = rng.accept_log(swap_log_ratio(log_lik_a, temp_a, log_lik_b, temp_b));
    (accepted, acceptance)
}

/// Last ladder extreme visited by a state, used for round-trip counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Cold,
    Hot,
}

/// Ladder of temperatures and the assignment of state handles to ranks.
///
/// States never move in memory; a swap exchanges two entries of `slots`.
#[derive(Debug, Clone)]
pub struct Ensemble<S> {
    temperatures: Vec<f64>,
    states: Vec<S>,
    slots: Vec<usize>,
    last_extreme: Vec<Option<Extreme>>,
    trips: Vec<usize>,
}

impl<S> Ensemble<S> {
    /// Creates an ensemble where state `i` starts at rank `i`.
    pub fn new(temperatures: Vec<f64>, states: Vec<S>) -> Self {
        debug_assert_eq!(temperatures.len(), states.len());
        let count = states.len();
        let mut last_extreme = vec![None; count];
        if let Some(first) = last_extreme.first_mut() {
            *first = Some(Extreme::Cold);
        }
        Self {
            temperatures,
            states,
            slots: (0..count).collect(),
            last_extreme,
            trips: vec![0; count],
        }
    }

    /// Ladder temperatures by rank.
    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    /// Number of chains.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True for an empty ensemble.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Handle of the state currently at `rank`.
    pub fn handle_at(&self, rank: usize) -> usize {
        self.slots[rank]
    }

    /// State currently at `rank`.
    pub fn at_rank(&self, rank: usize) -> &S {
        &self.states[self.slots[rank]]
    }

    /// State at the cold rank.
    pub fn cold(&self) -> &S {
        self.at_rank(0)
    }

    /// Rank of every state, indexed by handle.
    pub fn ranks_by_handle(&self) -> Vec<usize> {
        let mut ranks = vec![0; self.slots.len()];
        for (rank, &handle) in self.slots.iter().enumerate() {
            ranks[handle] = rank;
        }
        ranks
    }

    /// Mutable access to all states, indexed by handle.
    pub fn states_mut(&mut self) -> &mut [S] {
        &mut self.states
    }

    /// All states, indexed by handle.
    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// Exchanges the states at `rank` and `rank + 1`.
    pub fn swap_ranks(&mut self, rank: usize) {
        self.slots.swap(rank, rank + 1);
    }

    /// Completed cold → hot → cold round trips per handle.
    pub fn trips(&self) -> &[usize] {
        &self.trips
    }

    /// Updates round-trip bookkeeping after a round of swaps.
    pub fn note_extremes(&mut self) {
        let count = self.slots.len();
        if count < 2 {
            return;
        }
        let cold = self.slots[0];
        if self.last_extreme[cold] == Some(Extreme::Hot) {
            self.trips[cold] += 1;
        }
        self.last_extreme[cold] = Some(Extreme::Cold);
        let hot = self.slots[count - 1];
        if self.last_extreme[hot] == Some(Extreme::Cold) {
            self.last_extreme[hot] = Some(Extreme::Hot);
        }
    }

    /// Mutable states at `rank` and `rank + 1`, in that order.
    fn pair_mut(&mut self, rank: usize) -> (&mut S, &mut S) {
        let (lower, upper) = (self.slots[rank], self.slots[rank + 1]);
        if lower < upper {
            let (head, tail) = self.states.split_at_mut(upper);
            (&mut head[lower], &mut tail[0])
        } else {
            let (head, tail) = self.states.split_at_mut(lower);
            (&mut tail[0], &mut head[upper])
        }
    }

    /// Attempts swaps for every adjacent pair in order, lowest rank first.
    ///
    /// `score` extracts the log-likelihood that enters the swap criterion and
    /// `rng_for_pair` supplies the RNG for each pair. Returns the acceptance
    /// probability and outcome per pair.
    pub fn attempt_swaps(
        &mut self,
        score: impl Fn(&S) -> f64,
        rng_for_pair: impl FnMut(usize) -> RngHandle,
    ) -> Vec<(bool, f64)> {
        self.attempt_swaps_with(score, rng_for_pair, |_, _, _, _| {})
    }

    /// Like [`Ensemble::attempt_swaps`], but calls `exchange` after every
    /// accepted swap with the pair index, the states now at `pair` and
    /// `pair + 1`, and the pair's RNG.
    ///
    /// `exchange` hands back whatever belongs to the rank rather than to the
    /// state, so that part never changes temperature.
    pub fn attempt_swaps_with(
        &mut self,
        score: impl Fn(&S) -> f64,
        mut rng_for_pair: impl FnMut(usize) -> RngHandle,
        mut exchange: impl FnMut(usize, &mut S, &mut S, &mut RngHandle),
    ) -> Vec<(bool, f64)> {
        let mut outcomes = Vec::with_capacity(self.len().saturating_sub(1));
        for pair in 0..self.len().saturating_sub(1) {
            let mut rng = rng_for_pair(pair);
            let (accepted, probability) = attempt_swap(
                score(self.at_rank(pair)),
                self.temperatures[pair],
                score(self.at_rank(pair + 1)),
                self.temperatures[pair + 1],
                &mut rng,
            );
            if accepted {
                self.swap_ranks(pair);
                let (lower, upper) = self.pair_mut(pair);
                exchange(pair, lower, upper, &mut rng);
            }
            outcomes.push((accepted, probability));
        }
        self.note_extremes();
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometric_ladder_starts_cold() {
        let ladder = build_ladder(&LadderConfig {
            chains: 4,
            policy: LadderPolicy::Geometric { ratio: 2.0 },
        })
        .unwrap();
        assert_eq!(ladder, vec![1.0, 2.0, 4.0, 8.0]);
    }

    #[test]
    fn malformed_ladders_are_config_errors() {
        for temperatures in [vec![], vec![2.0, 4.0], vec![1.0, 1.0], vec![1.0, f64::NAN]] {
            let config = LadderConfig {
                chains: 0,
                policy: LadderPolicy::Manual { temperatures },
            };
            assert!(build_ladder(&config).unwrap_err().is_config());
        }
    }

    #[test]
    fn swaps_move_handles_and_count_trips() {
        let mut ensemble = Ensemble::new(vec![1.0, 2.0], vec![-10.0_f64, -1.0]);
        let outcomes = ensemble.attempt_swaps(|ll| *ll, |pair| RngHandle::from_seed(pair as u64));
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].0, "a better hot state always moves down");
        assert_eq!(ensemble.handle_at(0), 1);
        assert_eq!(*ensemble.cold(), -1.0);
        assert_eq!(ensemble.ranks_by_handle(), vec![1, 0]);

        ensemble.swap_ranks(0);
        ensemble.note_extremes();
        assert_eq!(ensemble.trips(), &[1, 0]);
    }

    #[test]
    fn exchange_hook_sees_the_swapped_pair() {
        let mut ensemble = Ensemble::new(
            vec![1.0, 2.0, 4.0],
            vec![(-9.0, 'a'), (-1.0, 'b'), (-5.0, 'c')],
        );
        let mut seen = Vec::new();
        ensemble.attempt_swaps_with(
            |state| state.0,
            |pair| RngHandle::from_seed(pair as u64),
            |pair, lower, upper, _| {
                seen.push((pair, lower.1, upper.1));
                std::mem::swap(&mut lower.1, &mut upper.1);
            },
        );
        assert_eq!(seen.first(), Some(&(0, 'b', 'a')));
        assert_eq!(ensemble.cold().1, 'a', "rank-owned part stays at the cold rank");
        assert_eq!(ensemble.handle_at(0), 1);
    }
}
