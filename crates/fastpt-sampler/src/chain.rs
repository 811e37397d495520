//! Per-temperature chain slots.
//!
//! A [`ChainSlot`] is fixed to one temperature. The [`ChainState`] inside it
//! (parameters, accelerator, Fisher diagonal and cached log-densities) is an
//! owned value that moves to a neighbouring slot when a tempering swap is
//! accepted. The random generator and acceptance counters stay with the slot.

use crate::acceptance::AcceptanceCounts;
use fastpt_core::{LikelihoodAccelerator, ParameterState};
use ndarray::Array1;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Everything that travels with a state across a swap.
#[derive(Debug, Clone)]
pub struct ChainState<A> {
    pub params: ParameterState,
    pub accelerator: A,
    /// Proposal standard deviation per parameter.
    pub fisher: Array1<f64>,
    pub log_likelihood: f64,
    pub log_prior: f64,
}

impl<A: LikelihoodAccelerator> ChainState<A> {
    /// Log-posterior at temperature `temperature`; only the likelihood is
    /// tempered.
    pub fn tempered_log_posterior(&self, temperature: f64) -> f64 {
        self.log_likelihood / temperature + self.log_prior
    }
}

/// Result of one jump attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Accepted,
    Rejected,
    /// Rejected by the accelerator's admissibility check before any update.
    Inadmissible,
    /// Nothing to jump.
    Skipped,
}

impl StepOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StepOutcome::Accepted)
    }
}

#[derive(Debug)]
pub struct ChainSlot<A> {
    temperature: f64,
    rng: ChaCha8Rng,
    counts: AcceptanceCounts,
    state: ChainState<A>,
}

impl<A: LikelihoodAccelerator> ChainSlot<A> {
    pub fn new(temperature: f64, rng: ChaCha8Rng, state: ChainState<A>) -> Self {
        let counts = AcceptanceCounts::new(state.params.len());
        Self {
            temperature,
            rng,
            counts,
            state,
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn state(&self) -> &ChainState<A> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ChainState<A> {
        &mut self.state
    }

    pub fn counts(&self) -> &AcceptanceCounts {
        &self.counts
    }

    pub fn counts_mut(&mut self) -> &mut AcceptanceCounts {
        &mut self.counts
    }

    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Split borrows for updaters that need the generator, counters and
    /// state at once.
    pub fn parts_mut(&mut self) -> (f64, &mut ChaCha8Rng, &mut AcceptanceCounts, &mut ChainState<A>) {
        (
            self.temperature,
            &mut self.rng,
            &mut self.counts,
            &mut self.state,
        )
    }

    /// Exchange states with `other`, leaving temperatures, generators and
    /// counters in place.
    pub fn swap_states(&mut self, other: &mut ChainSlot<A>) {
        std::mem::swap(&mut self.state, &mut other.state);
    }
}

/// Tempered Metropolis-Hastings log acceptance ratio.
///
/// `log a = L'/T + log pi' - L/T - log pi`
pub fn tempered_log_ratio(
    current_ll: f64,
    current_lp: f64,
    proposed_ll: f64,
    proposed_lp: f64,
    temperature: f64,
) -> f64 {
    proposed_ll / temperature + proposed_lp - current_ll / temperature - current_lp
}

/// Log of a uniform draw on (0, 1].
///
/// Never `-inf`, so a `-inf` ratio is always rejected.
pub fn log_uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    (1.0 - rng.gen::<f64>()).ln()
}

/// Accept when `log_u <= log_ratio`; a NaN ratio is rejected.
pub fn accept(log_u: f64, log_ratio: f64) -> bool {
    log_u <= log_ratio
}
