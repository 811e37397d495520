//! Adjacent-temperature exchanges.

use crate::chain::{accept, log_uniform, ChainSlot};
use fastpt_core::LikelihoodAccelerator;
use rand::Rng;

/// Log acceptance ratio for exchanging the states of a cooler slot (`lower`)
/// and a hotter slot (`upper`).
///
/// The priors cancel because they are not tempered.
pub fn swap_log_ratio(ll_lower: f64, ll_upper: f64, t_lower: f64, t_upper: f64) -> f64 {
    ll_lower / t_upper + ll_upper / t_lower - ll_lower / t_lower - ll_upper / t_upper
}

/// One swap sweep from the hottest pair down to the coldest.
///
/// Each pair's outcome is recorded on the cooler slot of the pair. Because
/// the sweep runs top-down, a state can descend several rungs in one sweep.
pub fn pt_swap<A, R>(slots: &mut [ChainSlot<A>], rng: &mut R)
where
    A: LikelihoodAccelerator,
    R: Rng + ?Sized,
{
    for j in (0..slots.len().saturating_sub(1)).rev() {
        let (lower, upper) = slots.split_at_mut(j + 1);
        let cool = &mut lower[j];
        let hot = &mut upper[0];
        let log_ratio = swap_log_ratio(
            cool.state().log_likelihood,
            hot.state().log_likelihood,
            cool.temperature(),
            hot.temperature(),
        );
        let accepted = accept(log_uniform(rng), log_ratio);
        if accepted {
            cool.swap_states(hot);
        }
        cool.counts_mut().record_swap(accepted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainState;
    use fastpt_core::{LayoutBuilder, ParameterState};
    use ndarray::Array1;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    struct Tagged(u32);

    impl LikelihoodAccelerator for Tagged {
        type Snapshot = u32;
        fn evaluate(&self, _state: &ParameterState) -> f64 {
            0.0
        }
        fn update_intrinsic(&mut self, _state: &ParameterState) {}
        fn update_unit_distance(&mut self, _state: &ParameterState, _unit: usize) {}
        fn update_unit_noise(&mut self, _state: &ParameterState, _units: &[usize]) {}
        fn snapshot(&self) -> u32 {
            self.0
        }
        fn restore(&mut self, snapshot: u32) {
            self.0 = snapshot;
        }
        fn isolate_unit(&mut self, _unit: usize) {}
    }

    fn slots(lls: &[f64], temps: &[f64]) -> Vec<ChainSlot<Tagged>> {
        let mut builder = LayoutBuilder::new();
        builder.extrinsic("x");
        let layout = Arc::new(builder.build().unwrap());
        lls.iter()
            .zip(temps)
            .enumerate()
            .map(|(j, (&ll, &t))| {
                ChainSlot::new(
                    t,
                    ChaCha8Rng::seed_from_u64(100 + j as u64),
                    ChainState {
                        params: ParameterState::new(layout.clone(), vec![j as f64]).unwrap(),
                        accelerator: Tagged(j as u32),
                        fisher: Array1::from_elem(1, j as f64),
                        log_likelihood: ll,
                        log_prior: 0.0,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_symmetric_under_relabelling() {
        for &(la, lb, ta, tb) in &[
            (-3.0, -10.0, 1.0, 2.0),
            (5.0, 1.0, 1.0, 1.7),
            (-100.0, -90.0, 1.3, 3.0),
        ] {
            let forward = swap_log_ratio(la, lb, ta, tb);
            let reverse = swap_log_ratio(lb, la, ta, tb);
            assert!((forward + reverse).abs() < 1e-12);
        }
    }

    #[test]
    fn test_equal_temperatures_always_swap() {
        assert_eq!(swap_log_ratio(-3.0, -50.0, 2.0, 2.0), 0.0);
    }

    #[test]
    fn test_better_state_moves_down() {
        // the hot chain holds a much better state; the swap must be accepted
        let mut slots = slots(&[-1000.0, 0.0], &[1.0, 2.0]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        pt_swap(&mut slots, &mut rng);

        let cold = slots[0].state();
        assert_eq!(cold.log_likelihood, 0.0);
        assert_eq!(cold.accelerator.0, 1);
        assert_eq!(cold.params.get(0), 1.0);
        assert_eq!(cold.fisher[0], 1.0);
        assert_eq!(slots[0].temperature(), 1.0);
        assert_eq!(slots[0].counts().accepted(slots[0].counts().swap_category()), 1);
        assert_eq!(slots[1].counts().accepted(1) + slots[1].counts().rejected(1), 0);
    }

    #[test]
    fn test_sweep_is_top_down() {
        // the hottest state is best and can reach the cold slot in one sweep
        let mut slots = slots(&[-1000.0, -900.0, 0.0], &[1.0, 1.5, 2.0]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        pt_swap(&mut slots, &mut rng);
        assert_eq!(slots[0].state().accelerator.0, 2);
    }

    #[test]
    fn test_single_slot_is_noop() {
        let mut slots = slots(&[-1.0], &[1.0]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        pt_swap(&mut slots, &mut rng);
        assert_eq!(slots[0].state().accelerator.0, 0);
    }
}
