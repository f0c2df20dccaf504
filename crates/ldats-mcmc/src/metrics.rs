use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of move performed by the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    /// Bounded offset of one changepoint.
    ChangepointJitter,
    /// Uniform relocation of one changepoint.
    ChangepointJump,
    /// Random-walk update of one segment's coefficients.
    Coefficient,
}

impl MoveKind {
    /// Stable label used in diagnostics output.
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveKind::ChangepointJitter => "changepoint-jitter",
            MoveKind::ChangepointJump => "changepoint-jump",
            MoveKind::Coefficient => "coefficient",
        }
    }
}

/// Proposed/accepted counts per move kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTally {
    counts: BTreeMap<MoveKind, (usize, usize)>,
    /// Changepoint proposals rejected for violating ordering or bounds.
    pub invalid_proposals: usize,
}

impl MoveTally {
    /// Records one proposal.
    pub fn record(&mut self, kind: MoveKind, accepted: bool) {
        let entry = self.counts.entry(kind).or_insert((0, 0));
        entry.0 += 1;
        if accepted {
            entry.1 += 1;
        }
    }

    /// Adds another tally into this one.
    pub fn merge(&mut self, other: &MoveTally) {
        for (kind, (proposed, accepted)) in &other.counts {
            let entry = self.counts.entry(*kind).or_insert((0, 0));
            entry.0 += proposed;
            entry.1 += accepted;
        }
        self.invalid_proposals += other.invalid_proposals;
    }

    /// `(proposed, accepted)` for `kind`.
    pub fn counts(&self, kind: MoveKind) -> (usize, usize) {
        self.counts.get(&kind).copied().unwrap_or((0, 0))
    }

    /// Acceptance rate for `kind`, `None` when nothing was proposed.
    pub fn rate(&self, kind: MoveKind) -> Option<f64> {
        let (proposed, accepted) = self.counts(kind);
        (proposed > 0).then(|| accepted as f64 / proposed as f64)
    }

    /// Acceptance rates keyed by move label.
    pub fn rates(&self) -> BTreeMap<String, f64> {
        self.counts
            .iter()
            .filter(|(_, (proposed, _))| *proposed > 0)
            .map(|(kind, (proposed, accepted))| {
                (
                    kind.as_str().to_string(),
                    *accepted as f64 / *proposed as f64,
                )
            })
            .collect()
    }
}

/// Acceptance statistics for one ladder rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankDiagnostics {
    /// Temperature of the rank.
    pub temperature: f64,
    /// Acceptance rates per move label.
    pub acceptance_rates: BTreeMap<String, f64>,
    /// Raw counts behind the rates.
    pub tally: MoveTally,
    /// Coefficient step multiplier in force at the end of the run.
    pub coefficient_scale: f64,
}

/// Swap statistics for the pair of ranks `(rank, rank + 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapDiagnostics {
    /// Lower rank of the pair.
    pub rank: usize,
    /// Swap attempts.
    pub attempted: usize,
    /// Accepted swaps.
    pub accepted: usize,
    /// Mean acceptance probability over attempts.
    pub mean_acceptance: f64,
}

/// Sampler diagnostics returned with every fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Per-rank move acceptance, cold rank first.
    pub ranks: Vec<RankDiagnostics>,
    /// Per-pair swap acceptance.
    pub swaps: Vec<SwapDiagnostics>,
    /// Completed cold → hot → cold round trips per state handle.
    pub trips: Vec<usize>,
    /// Round trips per iteration per state handle.
    pub trip_rates: Vec<f64>,
    /// Handle occupying the cold rank after every iteration.
    pub cold_handles: Vec<usize>,
    /// Segments scored with the degenerate penalty in the final cold state.
    pub final_degenerate_segments: usize,
    /// Segment fit cache `(hits, misses)` summed over chains.
    pub fit_cache: (u64, u64),
}

/// Collects per-iteration statistics while the run progresses.
#[derive(Debug, Default)]
pub struct DiagnosticsRecorder {
    rank_tallies: Vec<MoveTally>,
    swap_attempts: Vec<usize>,
    swap_accepts: Vec<usize>,
    swap_probability_totals: Vec<f64>,
    cold_handles: Vec<usize>,
}

impl DiagnosticsRecorder {
    /// Creates a recorder for a ladder of `ranks` chains.
    pub fn new(ranks: usize) -> Self {
        let pairs = ranks.saturating_sub(1);
        Self {
            rank_tallies: vec![MoveTally::default(); ranks],
            swap_attempts: vec![0; pairs],
            swap_accepts: vec![0; pairs],
            swap_probability_totals: vec![0.0; pairs],
            cold_handles: Vec::new(),
        }
    }

    /// Adds one chain's iteration tally to the rank it ran at.
    pub fn note_moves(&mut self, rank: usize, tally: &MoveTally) {
        if let Some(total) = self.rank_tallies.get_mut(rank) {
            total.merge(tally);
        }
    }

    /// Records swap outcomes for each pair.
    pub fn note_swaps(&mut self, outcomes: &[(bool, f64)]) {
        for (pair, (accepted, probability)) in outcomes.iter().enumerate() {
            self.swap_attempts[pair] += 1;
            self.swap_probability_totals[pair] += probability;
            if *accepted {
                self.swap_accepts[pair] += 1;
            }
        }
    }

    /// Records which handle held the cold rank.
    pub fn note_cold_handle(&mut self, handle: usize) {
        self.cold_handles.push(handle);
    }

    /// Cumulative tally for a rank.
    pub fn rank_tally(&self, rank: usize) -> Option<&MoveTally> {
        self.rank_tallies.get(rank)
    }

    /// Builds the final diagnostics.
    pub fn finish(
        self,
        temperatures: &[f64],
        scales: &[f64],
        trips: &[usize],
        iterations: usize,
        final_degenerate_segments: usize,
        fit_cache: (u64, u64),
    ) -> Diagnostics {
        let ranks = self
            .rank_tallies
            .into_iter()
            .enumerate()
            .map(|(rank, tally)| RankDiagnostics {
                temperature: temperatures[rank],
                acceptance_rates: tally.rates(),
                tally,
                coefficient_scale: scales.get(rank).copied().unwrap_or(1.0),
            })
            .collect();
        let swaps = (0..self.swap_attempts.len())
            .map(|pair| SwapDiagnostics {
                rank: pair,
                attempted: self.swap_attempts[pair],
                accepted: self.swap_accepts[pair],
                mean_acceptance: if self.swap_attempts[pair] == 0 {
                    0.0
                } else {
                    self.swap_probability_totals[pair] / self.swap_attempts[pair] as f64
                },
            })
            .collect();
        let trip_rates = trips
            .iter()
            .map(|&count| count as f64 / iterations.max(1) as f64)
            .collect();
        Diagnostics {
            ranks,
            swaps,
            trips: trips.to_vec(),
            trip_rates,
            cold_handles: self.cold_handles,
            final_degenerate_segments,
            fit_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tallies_merge_and_report_rates() {
        let mut a = MoveTally::default();
        a.record(MoveKind::Coefficient, true);
        a.record(MoveKind::Coefficient, false);
        let mut b = MoveTally::default();
        b.record(MoveKind::ChangepointJitter, true);
        b.invalid_proposals = 2;
        a.merge(&b);
        assert_eq!(a.rate(MoveKind::Coefficient), Some(0.5));
        assert_eq!(a.rate(MoveKind::ChangepointJump), None);
        assert_eq!(a.rates().len(), 2);
        assert_eq!(a.invalid_proposals, 2);
    }

    #[test]
    fn swap_means_are_per_attempt() {
        let mut recorder = DiagnosticsRecorder::new(3);
        recorder.note_swaps(&[(true, 1.0), (false, 0.2)]);
        recorder.note_swaps(&[(false, 0.5), (false, 0.0)]);
        let diagnostics = recorder.finish(&[1.0, 2.0, 4.0], &[1.0; 3], &[0, 0, 0], 2, 0, (0, 0));
        assert_eq!(diagnostics.swaps[0].accepted, 1);
        assert!((diagnostics.swaps[0].mean_acceptance - 0.75).abs() < 1e-12);
        assert!((diagnostics.swaps[1].mean_acceptance - 0.1).abs() < 1e-12);
    }
}
