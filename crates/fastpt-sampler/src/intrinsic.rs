//! Expensive jumps over one intrinsic class.
//!
//! Each block every chain makes one intrinsic jump over a uniformly chosen
//! class:
//!
//! - [`JumpClass::Distance`]: the distances of a few distinct units
//! - [`JumpClass::Noise`]: every noise parameter
//! - [`JumpClass::Shared`]: the whole shared intrinsic set
//!
//! After the admissibility guard, the class's cache update runs and the
//! tempered Metropolis-Hastings rule decides. Distance and shared jumps are
//! undone by restoring an accelerator snapshot; noise jumps are undone by
//! recomputing the noise statistics at the reverted state.

use crate::chain::{accept, log_uniform, tempered_log_ratio, ChainSlot, ChainState, StepOutcome};
use crate::acceptance::AcceptanceCounts;
use fastpt_core::{reflect, LikelihoodAccelerator, ParameterLayout, Prior};
use ndarray::Array1;
use rand::seq::index::sample;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JumpClass {
    Distance,
    Noise,
    Shared,
}

/// The parameters and units moved by one intrinsic jump.
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicMove {
    pub class: JumpClass,
    pub indices: Vec<usize>,
    pub units: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct IntrinsicUpdater<'a> {
    layout: &'a ParameterLayout,
    prior: &'a Prior,
    n_distance_jumps: usize,
}

impl<'a> IntrinsicUpdater<'a> {
    pub fn new(layout: &'a ParameterLayout, prior: &'a Prior, n_distance_jumps: usize) -> Self {
        Self {
            layout,
            prior,
            n_distance_jumps,
        }
    }

    /// Classes with at least one parameter.
    pub fn available_classes(&self) -> Vec<JumpClass> {
        let mut classes = Vec::with_capacity(3);
        if !self.layout.distances().is_empty() && self.n_distance_jumps > 0 {
            classes.push(JumpClass::Distance);
        }
        if !self.layout.noise().is_empty() {
            classes.push(JumpClass::Noise);
        }
        if !self.layout.shared_intrinsic().is_empty() {
            classes.push(JumpClass::Shared);
        }
        classes
    }

    /// Draw the parameters for a jump of `class`.
    pub fn choose<R: Rng + ?Sized>(&self, class: JumpClass, rng: &mut R) -> IntrinsicMove {
        match class {
            JumpClass::Distance => {
                let distances = self.layout.distances();
                let amount = self.n_distance_jumps.min(distances.len());
                let mut picks = sample(rng, distances.len(), amount).into_vec();
                picks.sort_unstable();
                IntrinsicMove {
                    class,
                    indices: picks.iter().map(|&k| distances[k]).collect(),
                    units: picks
                        .iter()
                        .map(|&k| self.layout.distance_units()[k])
                        .collect(),
                }
            }
            JumpClass::Noise => IntrinsicMove {
                class,
                indices: self.layout.noise().to_vec(),
                units: self.layout.noise_units(),
            },
            JumpClass::Shared => IntrinsicMove {
                class,
                indices: self.layout.shared_intrinsic().to_vec(),
                units: Vec::new(),
            },
        }
    }

    /// Joint jump scale for a move over `n` parameters.
    pub fn scale(class: JumpClass, n: usize, temperature: f64) -> f64 {
        let base = temperature.sqrt();
        match class {
            JumpClass::Noise => base * 2.38 / (n.max(1) as f64).sqrt(),
            JumpClass::Distance | JumpClass::Shared => base,
        }
    }

    /// Proposal from fixed standard-normal draws, one per moved parameter.
    pub fn propose(
        &self,
        jump: &IntrinsicMove,
        current: &[f64],
        fisher: &Array1<f64>,
        temperature: f64,
        normals: &[f64],
    ) -> Vec<f64> {
        let scale = Self::scale(jump.class, jump.indices.len(), temperature);
        let mut proposal = current.to_vec();
        for (&i, z) in jump.indices.iter().zip(normals) {
            proposal[i] += scale * fisher[i] * z;
        }
        if jump.class == JumpClass::Shared {
            reflect::correct_intrinsic(self.layout, &mut proposal);
        }
        proposal
    }

    /// One intrinsic jump of a uniformly chosen class.
    pub fn step<A: LikelihoodAccelerator>(&self, slot: &mut ChainSlot<A>) -> StepOutcome {
        let classes = self.available_classes();
        if classes.is_empty() {
            return StepOutcome::Skipped;
        }
        let (temperature, rng, counts, state) = slot.parts_mut();
        let class = classes[rng.gen_range(0..classes.len())];
        let jump = self.choose(class, rng);
        let normals: Vec<f64> = (0..jump.indices.len())
            .map(|_| rng.sample(StandardNormal))
            .collect();
        let log_u = log_uniform(rng);
        self.apply(&jump, state, counts, temperature, &normals, log_u)
    }

    /// Run a jump with fixed draws.
    ///
    /// Split from [`Self::step`] so a specific class, proposal and accept
    /// decision can be replayed.
    pub fn apply<A: LikelihoodAccelerator>(
        &self,
        jump: &IntrinsicMove,
        state: &mut ChainState<A>,
        counts: &mut AcceptanceCounts,
        temperature: f64,
        normals: &[f64],
        log_u: f64,
    ) -> StepOutcome {
        let current = state.params.values().to_vec();
        let proposal = self.propose(jump, &current, &state.fisher, temperature, normals);

        state.params.assign_from(&proposal);
        if !state.accelerator.is_admissible(&state.params) {
            state.params.assign_from(&current);
            counts.record_many(&jump.indices, false);
            return StepOutcome::Inadmissible;
        }
        let proposed_lp = self.prior.log_prior(&proposal);
        if proposed_lp == f64::NEG_INFINITY {
            state.params.assign_from(&current);
            counts.record_many(&jump.indices, false);
            return StepOutcome::Rejected;
        }

        let snapshot = match jump.class {
            JumpClass::Noise => None,
            JumpClass::Distance | JumpClass::Shared => Some(state.accelerator.snapshot()),
        };
        match jump.class {
            JumpClass::Distance => {
                for &unit in &jump.units {
                    state.accelerator.update_unit_distance(&state.params, unit);
                }
            }
            JumpClass::Noise => state.accelerator.update_unit_noise(&state.params, &jump.units),
            JumpClass::Shared => state.accelerator.update_intrinsic(&state.params),
        }

        let proposed_ll = state.accelerator.evaluate(&state.params);
        let log_ratio = tempered_log_ratio(
            state.log_likelihood,
            state.log_prior,
            proposed_ll,
            proposed_lp,
            temperature,
        );
        let accepted = accept(log_u, log_ratio);
        if accepted {
            state.log_likelihood = proposed_ll;
            state.log_prior = proposed_lp;
        } else {
            state.params.assign_from(&current);
            match snapshot {
                Some(snapshot) => state.accelerator.restore(snapshot),
                None => state.accelerator.update_unit_noise(&state.params, &jump.units),
            }
        }
        counts.record_many(&jump.indices, accepted);
        if accepted {
            StepOutcome::Accepted
        } else {
            StepOutcome::Rejected
        }
    }
}
