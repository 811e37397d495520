//! Cheap jumps over the whole extrinsic set.

use crate::acceptance::AcceptanceCounts;
use crate::chain::{accept, log_uniform, tempered_log_ratio, ChainSlot, ChainState, StepOutcome};
use fastpt_core::{reflect, LikelihoodAccelerator, ParameterLayout, Prior};
use ndarray::Array1;
use rand::Rng;
use rand_distr::StandardNormal;

#[derive(Debug, Clone, Copy)]
pub struct ExtrinsicUpdater<'a> {
    layout: &'a ParameterLayout,
    prior: &'a Prior,
}

impl<'a> ExtrinsicUpdater<'a> {
    pub fn new(layout: &'a ParameterLayout, prior: &'a Prior) -> Self {
        Self { layout, prior }
    }

    /// Joint jump scale: `2.38 / sqrt(n_ext) * sqrt(T)`.
    pub fn scale(&self, temperature: f64) -> f64 {
        let n = self.layout.extrinsic().len().max(1) as f64;
        2.38 / n.sqrt() * temperature.sqrt()
    }

    /// Proposal from fixed standard-normal draws, one per extrinsic
    /// parameter, with angles and cosines corrected.
    pub fn propose(
        &self,
        current: &[f64],
        fisher: &Array1<f64>,
        temperature: f64,
        normals: &[f64],
    ) -> Vec<f64> {
        let scale = self.scale(temperature);
        let mut proposal = current.to_vec();
        for (&i, z) in self.layout.extrinsic().iter().zip(normals) {
            proposal[i] += scale * fisher[i] * z;
        }
        reflect::correct_extrinsic(self.layout, &mut proposal);
        proposal
    }

    /// One Metropolis-Hastings jump of the slot's current state.
    ///
    /// Only the cheap evaluation is used, so a rejection just restores the
    /// parameter values; the accelerator is never modified.
    pub fn step<A: LikelihoodAccelerator>(&self, slot: &mut ChainSlot<A>) -> StepOutcome {
        if self.layout.extrinsic().is_empty() {
            return StepOutcome::Skipped;
        }
        let (temperature, rng, counts, state) = slot.parts_mut();
        let normals: Vec<f64> = (0..self.layout.extrinsic().len())
            .map(|_| rng.sample(StandardNormal))
            .collect();
        let log_u = log_uniform(rng);
        self.apply(state, counts, temperature, &normals, log_u)
    }

    /// Run a jump with fixed draws.
    pub fn apply<A: LikelihoodAccelerator>(
        &self,
        state: &mut ChainState<A>,
        counts: &mut AcceptanceCounts,
        temperature: f64,
        normals: &[f64],
        log_u: f64,
    ) -> StepOutcome {
        let current = state.params.values().to_vec();
        let proposal = self.propose(&current, &state.fisher, temperature, &normals);
        let proposed_lp = self.prior.log_prior(&proposal);

        let accepted = if proposed_lp == f64::NEG_INFINITY {
            false
        } else {
            state.params.assign_from(&proposal);
            let proposed_ll = state.accelerator.evaluate(&state.params);
            let log_ratio = tempered_log_ratio(
                state.log_likelihood,
                state.log_prior,
                proposed_ll,
                proposed_lp,
                temperature,
            );
            if accept(log_u, log_ratio) {
                state.log_likelihood = proposed_ll;
                state.log_prior = proposed_lp;
                true
            } else {
                state.params.assign_from(&current);
                false
            }
        };
        counts.record_extrinsic(accepted);
        if accepted {
            StepOutcome::Accepted
        } else {
            StepOutcome::Rejected
        }
    }
}
