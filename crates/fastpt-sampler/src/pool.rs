//! The chain pool and its block scheduler.
//!
//! A block of `n_int_block` elementary steps runs `(n_int_block - 2) / 2`
//! rounds of a parallel extrinsic jump followed by a swap sweep, then one
//! parallel intrinsic jump and a final swap sweep. Every elementary step
//! appends one row to the [`SampleBuffer`]. After each block the pool may
//! re-estimate the Fisher diagonals, flush the buffer to a
//! [`CheckpointWriter`] and emit a status event, in that order.
//!
//! # Random streams
//!
//! All generators are ChaCha8 seeded from `RunConfig::seed`:
//!
//! - stream 0 drives the swap sweeps
//! - stream `j + 1` belongs to slot `j` (its jumps and Fisher probe rows)
//! - stream `n_chain + 1` draws prior starting points
//!
//! Parallel phases only touch a slot's own generator, so results do not
//! depend on thread scheduling.

use crate::acceptance::{AcceptanceCounts, AcceptanceTable};
use crate::buffer::SampleBuffer;
use crate::chain::{ChainSlot, ChainState};
use crate::checkpoint::{CheckpointWriter, Flush};
use crate::extrinsic::ExtrinsicUpdater;
use crate::fisher::FisherEstimator;
use crate::intrinsic::IntrinsicUpdater;
use crate::swap::pt_swap;
use crate::{Error, Result};
use fastpt_core::{
    LikelihoodAccelerator, ParameterLayout, ParameterState, Prior, RunConfig, TemperatureLadder,
};
use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How chains choose their starting points.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainInit {
    /// One full parameter vector per chain, coldest first
    Explicit(Vec<Vec<f64>>),
    /// Independent prior draws per chain.
    ///
    /// Parameters without a prior keep their value from `defaults`; names in
    /// `fixed` are held at the given value in every chain.
    FromPrior {
        fixed: IndexMap<String, f64>,
        defaults: Vec<f64>,
    },
}

impl ChainInit {
    fn starting_points(
        &self,
        config: &RunConfig,
        layout: &ParameterLayout,
        prior: &Prior,
    ) -> Result<Vec<Vec<f64>>> {
        match self {
            ChainInit::Explicit(points) => {
                if points.len() != config.n_chain {
                    return Err(Error::InvalidParameter(format!(
                        "{} starting points given for {} chains",
                        points.len(),
                        config.n_chain
                    )));
                }
                Ok(points.clone())
            }
            ChainInit::FromPrior { fixed, defaults } => {
                if defaults.len() != layout.len() {
                    return Err(Error::InvalidParameter(format!(
                        "expected {} default values, got {}",
                        layout.len(),
                        defaults.len()
                    )));
                }
                let fixed = fixed
                    .iter()
                    .map(|(name, &value)| Ok((layout.index_of(name)?, value)))
                    .collect::<fastpt_core::FastPtResult<Vec<_>>>()?;
                let mut rng = stream(config.seed, config.n_chain as u64 + 1);
                Ok((0..config.n_chain)
                    .map(|_| {
                        let mut values = defaults.clone();
                        prior.sample_into(&mut rng, &mut values);
                        for &(i, value) in &fixed {
                            values[i] = value;
                        }
                        values
                    })
                    .collect())
            }
        }
    }
}

fn stream(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// Owns one chain per temperature and drives the block cycle.
pub struct ChainPool<A> {
    config: RunConfig,
    layout: Arc<ParameterLayout>,
    prior: Prior,
    ladder: TemperatureLadder,
    slots: Vec<ChainSlot<A>>,
    swap_rng: ChaCha8Rng,
    buffer: SampleBuffer,
    blocks_done: usize,
    n_flushes: usize,
    last_status: Option<AcceptanceTable>,
    started: Instant,
}

impl<A: LikelihoodAccelerator> ChainPool<A> {
    /// Build the pool.
    ///
    /// The configuration is validated first; any violated divisibility rule
    /// is fatal. Each chain gets its own accelerator from
    /// `make_accelerator` and an initial Fisher diagonal estimated at its
    /// own starting point.
    ///
    /// # Arguments
    ///
    /// * `config` - Run configuration
    /// * `layout` - Parameter layout shared by every chain
    /// * `prior` - Prior over the layout
    /// * `init` - Starting points
    /// * `make_accelerator` - Builds an accelerator synchronised with a state
    pub fn new<F>(
        config: RunConfig,
        layout: Arc<ParameterLayout>,
        prior: Prior,
        init: ChainInit,
        mut make_accelerator: F,
    ) -> Result<Self>
    where
        F: FnMut(&ParameterState) -> fastpt_core::FastPtResult<A>,
    {
        config.validate()?;
        let ladder = TemperatureLadder::geometric(config.n_chain, config.t_max)?;
        debug!(temperatures = ?ladder.temperatures(), "built temperature ladder");

        let estimator = FisherEstimator::new(&config.fisher, &layout);
        let mut slots = Vec::with_capacity(config.n_chain);
        for (j, values) in init
            .starting_points(&config, &layout, &prior)?
            .into_iter()
            .enumerate()
        {
            let params = ParameterState::new(layout.clone(), values)?;
            let log_prior = prior.log_prior(params.values());
            if log_prior == f64::NEG_INFINITY {
                return Err(Error::InvalidParameter(format!(
                    "chain {} starts outside the prior support",
                    j
                )));
            }
            let accelerator = make_accelerator(&params)?;
            let log_likelihood = accelerator.evaluate(&params);
            let mut state = ChainState {
                params,
                accelerator,
                fisher: Array1::ones(layout.len()),
                log_likelihood,
                log_prior,
            };
            let start = state.params.values().to_vec();
            state.fisher = estimator.estimate(&mut state, &start);
            slots.push(ChainSlot::new(
                ladder.get(j),
                stream(config.seed, j as u64 + 1),
                state,
            ));
        }

        let mut buffer = SampleBuffer::new(config.n_chain, config.save_every_n, layout.len());
        buffer.seed(&slots);

        Ok(Self {
            swap_rng: stream(config.seed, 0),
            config,
            layout,
            prior,
            ladder,
            slots,
            buffer,
            blocks_done: 0,
            n_flushes: 0,
            last_status: None,
            started: Instant::now(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn layout(&self) -> &Arc<ParameterLayout> {
        &self.layout
    }

    pub fn ladder(&self) -> &TemperatureLadder {
        &self.ladder
    }

    pub fn slots(&self) -> &[ChainSlot<A>] {
        &self.slots
    }

    /// State of the T = 1 chain.
    pub fn cold(&self) -> &ChainState<A> {
        self.slots[0].state()
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn blocks_done(&self) -> usize {
        self.blocks_done
    }

    pub fn n_flushes(&self) -> usize {
        self.n_flushes
    }

    /// Acceptance table of the most recent status report.
    pub fn last_status(&self) -> Option<&AcceptanceTable> {
        self.last_status.as_ref()
    }

    /// Elementary steps recorded so far.
    pub fn iteration(&self) -> usize {
        self.blocks_done * self.config.n_int_block
    }

    /// Run `n_blocks` more blocks, flushing to `writer` when the buffer fills.
    pub fn advance<W: CheckpointWriter + ?Sized>(
        &mut self,
        n_blocks: usize,
        writer: &mut W,
    ) -> Result<()> {
        if self.blocks_done + n_blocks > self.config.n_blocks() {
            return Err(Error::SamplingError(format!(
                "cannot advance {} blocks: {} of {} already done",
                n_blocks,
                self.blocks_done,
                self.config.n_blocks()
            )));
        }
        for _ in 0..n_blocks {
            self.run_block()?;
            self.blocks_done += 1;

            if self.blocks_done % self.config.blocks_per_fisher_update() == 0 {
                self.refresh_fisher();
            }
            // counters reset on flush, so the table is built before it
            let status_due = self.blocks_done % self.config.blocks_per_status() == 0;
            let flush_due = self.buffer.is_full();
            if !(status_due || flush_due) {
                continue;
            }
            let acceptance = self.acceptance();
            if flush_due {
                self.flush(writer, acceptance.clone())?;
            }
            if status_due {
                self.report_status(acceptance);
            }
        }
        Ok(())
    }

    /// Run every remaining block of the configured run.
    pub fn run<W: CheckpointWriter + ?Sized>(&mut self, writer: &mut W) -> Result<()> {
        let remaining = self.config.n_blocks() - self.blocks_done;
        self.advance(remaining, writer)?;
        info!(
            flushes = self.n_flushes,
            elapsed_s = self.started.elapsed().as_secs_f64(),
            "sampling finished"
        );
        Ok(())
    }

    fn run_block(&mut self) -> Result<()> {
        let extrinsic = ExtrinsicUpdater::new(&self.layout, &self.prior);
        for _ in 0..self.config.extrinsic_steps_per_block() {
            self.slots.par_iter_mut().for_each(|slot| {
                extrinsic.step(slot);
            });
            self.buffer.record(&self.slots)?;
            pt_swap(&mut self.slots, &mut self.swap_rng);
            self.buffer.record(&self.slots)?;
        }

        let intrinsic =
            IntrinsicUpdater::new(&self.layout, &self.prior, self.config.n_distance_jumps);
        self.slots.par_iter_mut().for_each(|slot| {
            intrinsic.step(slot);
        });
        self.buffer.record(&self.slots)?;
        pt_swap(&mut self.slots, &mut self.swap_rng);
        self.buffer.record(&self.slots)
    }

    /// Re-estimate every slot's Fisher diagonal at a cold-chain row drawn
    /// uniformly from the rows recorded since the last flush.
    fn refresh_fisher(&mut self) {
        let estimator = FisherEstimator::new(&self.config.fisher, &self.layout);
        let buffer = &self.buffer;
        let last = buffer.position();
        self.slots.par_iter_mut().for_each(|slot| {
            let row = slot.rng_mut().gen_range(0..=last);
            let probe = buffer.cold_row(row).to_vec();
            let fisher = estimator.estimate(slot.state_mut(), &probe);
            slot.state_mut().fisher = fisher;
        });
        debug!(block = self.blocks_done, "refreshed Fisher diagonals");
    }

    fn acceptance(&self) -> AcceptanceTable {
        let counts: Vec<&AcceptanceCounts> = self.slots.iter().map(ChainSlot::counts).collect();
        AcceptanceTable::summarize(&self.layout, &counts)
    }

    fn flush<W: CheckpointWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        acceptance: AcceptanceTable,
    ) -> Result<()> {
        let (samples, log_likelihood) = self.buffer.thinned_cold(self.config.thin);
        let fisher = Array2::from_shape_fn((self.slots.len(), self.layout.len()), |(j, i)| {
            self.slots[j].state().fisher[i]
        });
        let flush = Flush {
            index: self.n_flushes,
            iteration: self.iteration(),
            param_names: self.layout.names().map(str::to_string).collect(),
            temperatures: self.ladder.temperatures().to_vec(),
            samples,
            log_likelihood,
            acceptance,
            fisher,
        };
        writer.write(&flush)?;
        info!(
            flush = flush.index,
            iteration = flush.iteration,
            samples = flush.samples.nrows(),
            "wrote checkpoint"
        );

        self.buffer.carry_forward();
        for slot in self.slots.iter_mut() {
            slot.counts_mut().reset();
        }
        self.n_flushes += 1;
        Ok(())
    }

    fn report_status(&mut self, acceptance: AcceptanceTable) {
        let progress = 100.0 * self.blocks_done as f64 / self.config.n_blocks() as f64;
        info!(
            progress = %format!("{:.1}%", progress),
            elapsed_s = self.started.elapsed().as_secs_f64(),
            log_likelihood = self.cold().log_likelihood,
            acceptance = %format_acceptance(&acceptance),
            "status"
        );
        for (j, slot) in self.slots.iter().enumerate() {
            let state = slot.state();
            if !state.accelerator.is_synchronized(&state.params) {
                warn!(slot = j, "accelerator cache does not match the chain state");
            }
        }
        self.last_status = Some(acceptance);
    }
}

/// `row=f0/f1/...` per table row, one fraction per slot.
fn format_acceptance(table: &AcceptanceTable) -> String {
    let fractions = table.fractions();
    table
        .rows
        .iter()
        .zip(fractions.rows())
        .map(|(name, row)| {
            let values: Vec<String> = row.iter().map(|f| format!("{:.2}", f)).collect();
            format!("{}={}", name, values.join("/"))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryStore;
    use fastpt_core::{FastPtError, LayoutBuilder, PriorDistribution};
    use fastpt_models::GaussianAccelerator;
    use ndarray::array;

    fn layout() -> Arc<ParameterLayout> {
        let mut builder = LayoutBuilder::new();
        builder.shared_intrinsic("s").extrinsic("x").extrinsic("y");
        Arc::new(builder.build().unwrap())
    }

    fn prior(layout: &ParameterLayout) -> Prior {
        let mut priors = IndexMap::new();
        for name in layout.names() {
            priors.insert(name.to_string(), PriorDistribution::uniform(-10.0, 10.0));
        }
        Prior::for_layout(layout, &priors).unwrap()
    }

    fn config() -> RunConfig {
        RunConfig {
            n_iterations: 400,
            n_chain: 3,
            t_max: 2.0,
            n_int_block: 8,
            save_every_n: 80,
            n_update_fisher: 40,
            n_status_update: 5,
            thin: 4,
            ..RunConfig::default()
        }
    }

    fn pool(config: RunConfig, init: ChainInit) -> Result<ChainPool<GaussianAccelerator>> {
        let layout = layout();
        let prior = prior(&layout);
        let accelerator_layout = layout.clone();
        ChainPool::new(config, layout, prior, init, move |state| {
            GaussianAccelerator::new(
                &accelerator_layout,
                array![0.5, -1.0, 1.0],
                Array2::eye(3),
                state,
            )
        })
    }

    fn explicit(n: usize) -> ChainInit {
        ChainInit::Explicit(vec![vec![0.0, 0.0, 0.0]; n])
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let bad = RunConfig {
            n_int_block: 7,
            ..config()
        };
        match pool(bad, explicit(3)) {
            Err(Error::Core(FastPtError::Configuration(_))) => {}
            other => panic!("expected a configuration error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_wrong_number_of_starts() {
        assert!(matches!(
            pool(config(), explicit(2)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_start_outside_prior() {
        let init = ChainInit::Explicit(vec![vec![0.0, 20.0, 0.0]; 3]);
        assert!(matches!(pool(config(), init), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_ladder_and_streams() {
        let pool = pool(config(), explicit(3)).unwrap();
        let temps: Vec<f64> = pool.slots().iter().map(ChainSlot::temperature).collect();
        assert_eq!(temps[0], 1.0);
        assert_eq!(temps[2], 2.0);
        // every slot starts with a Fisher diagonal from its own state
        for slot in pool.slots() {
            assert!(slot.state().fisher.iter().all(|s| *s > 0.0 && *s <= 0.5));
        }
    }

    #[test]
    fn test_prior_initialisation_with_fixed_values() {
        let mut fixed = IndexMap::new();
        fixed.insert("y".to_string(), 1.5);
        let init = ChainInit::FromPrior {
            fixed,
            defaults: vec![0.0; 3],
        };
        let pool = pool(config(), init).unwrap();
        let starts: Vec<f64> = pool.slots().iter().map(|s| s.state().params.get(1)).collect();
        assert!(starts[0] != starts[1] && starts[1] != starts[2]);
        for slot in pool.slots() {
            assert_eq!(slot.state().params.get(2), 1.5);
        }
    }

    #[test]
    fn test_advance_flushes_on_cadence() {
        let mut pool = pool(config(), explicit(3)).unwrap();
        let mut store = MemoryStore::new();
        // one flush every 10 blocks of 8 steps
        pool.advance(9, &mut store).unwrap();
        assert_eq!(store.n_samples(), 0);
        assert_eq!(pool.buffer().position(), 72);
        pool.advance(1, &mut store).unwrap();
        assert_eq!(pool.n_flushes(), 1);
        assert_eq!(store.n_samples(), 20);
        assert_eq!(pool.buffer().position(), 0);

        pool.run(&mut store).unwrap();
        assert_eq!(pool.blocks_done(), 50);
        assert_eq!(store.n_samples(), 100);
        let run = store.run().unwrap();
        assert_eq!(run.iteration, 400);
        assert_eq!(run.fisher.dim(), (3, 3));
        assert_eq!(run.temperatures.len(), 3);
        assert!(pool.advance(1, &mut store).is_err());
    }

    #[test]
    fn test_counters_cover_one_flush() {
        let mut pool = pool(config(), explicit(3)).unwrap();
        let mut store = MemoryStore::new();
        pool.advance(10, &mut store).unwrap();
        let table = &store.run().unwrap().acceptance;
        let extrinsic = table.rows.iter().position(|r| r == "extrinsic").unwrap();
        let swap = table.rows.iter().position(|r| r == "pt_swap").unwrap();
        let s = table.rows.iter().position(|r| r == "s").unwrap();
        for slot in 0..3 {
            // 3 extrinsic jumps per block
            assert_eq!(table.accepted[[extrinsic, slot]] + table.rejected[[extrinsic, slot]], 30);
            // one intrinsic jump of the only class per block
            assert_eq!(table.accepted[[s, slot]] + table.rejected[[s, slot]], 10);
        }
        // 4 sweeps per block; the hottest slot never owns a pair
        assert_eq!(table.accepted[[swap, 0]] + table.rejected[[swap, 0]], 40);
        assert_eq!(table.accepted[[swap, 2]] + table.rejected[[swap, 2]], 0);
        // reset after the flush
        for slot in pool.slots() {
            assert_eq!(slot.counts().totals(&[3, 4]), (0, 0));
        }
    }

    #[test]
    fn test_status_on_flush_boundary_sees_flushed_counts() {
        let mut pool = pool(config(), explicit(3)).unwrap();
        let mut store = MemoryStore::new();
        // status and flush both fall every 10 blocks
        pool.advance(9, &mut store).unwrap();
        assert!(pool.last_status().is_none());
        pool.advance(1, &mut store).unwrap();
        let status = pool.last_status().unwrap();
        assert_eq!(status, &store.run().unwrap().acceptance);
        for slot in 0..3 {
            assert!(status.fraction("extrinsic", slot).unwrap().is_finite());
        }

        pool.run(&mut store).unwrap();
        let status = pool.last_status().unwrap();
        assert!(status.fraction("s", 0).unwrap().is_finite());
        assert!(status.fraction("pt_swap", 0).unwrap().is_finite());
    }

    #[test]
    fn test_runs_are_reproducible() {
        let mut first = MemoryStore::new();
        let mut second = MemoryStore::new();
        pool(config(), explicit(3)).unwrap().run(&mut first).unwrap();
        pool(config(), explicit(3)).unwrap().run(&mut second).unwrap();
        assert_eq!(first.run(), second.run());
    }

    #[test]
    fn test_caches_stay_synchronised() {
        let mut pool = pool(config(), explicit(3)).unwrap();
        let mut store = MemoryStore::new();
        pool.advance(20, &mut store).unwrap();
        for slot in pool.slots() {
            let state = slot.state();
            assert!(state.accelerator.is_synchronized(&state.params));
            assert_eq!(state.log_likelihood, state.accelerator.evaluate(&state.params));
        }
    }
}
