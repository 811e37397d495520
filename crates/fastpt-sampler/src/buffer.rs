use crate::chain::ChainSlot;
use crate::{Error, Result};
use ndarray::{s, Array1, Array2, Array3, ArrayView1};

/// Rolling per-slot record of states between checkpoint flushes.
///
/// Holds `capacity + 1` rows per slot. Row 0 is the state carried over from
/// the previous flush; every elementary step appends one row. When
/// `capacity` rows have been appended the buffer is full, rows
/// `0..capacity` are flushed and row `capacity` becomes the new row 0.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Array3<f64>,
    log_likelihood: Array2<f64>,
    position: usize,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(n_chain: usize, capacity: usize, n_params: usize) -> Self {
        Self {
            samples: Array3::zeros((n_chain, capacity + 1, n_params)),
            log_likelihood: Array2::zeros((n_chain, capacity + 1)),
            position: 0,
            capacity,
        }
    }

    /// Index of the most recently written row.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.position == self.capacity
    }

    fn write_row<A>(&mut self, row: usize, slots: &[ChainSlot<A>])
    where
        A: fastpt_core::LikelihoodAccelerator,
    {
        for (j, slot) in slots.iter().enumerate() {
            let state = slot.state();
            self.samples
                .slice_mut(s![j, row, ..])
                .assign(&ArrayView1::from(state.params.values()));
            self.log_likelihood[[j, row]] = state.log_likelihood;
        }
    }

    /// Overwrite row 0 with the slots' current states.
    pub fn seed<A: fastpt_core::LikelihoodAccelerator>(&mut self, slots: &[ChainSlot<A>]) {
        self.write_row(0, slots);
        self.position = 0;
    }

    /// Append the slots' current states as the next row.
    pub fn record<A: fastpt_core::LikelihoodAccelerator>(
        &mut self,
        slots: &[ChainSlot<A>],
    ) -> Result<()> {
        if self.is_full() {
            return Err(Error::SamplingError(format!(
                "sample buffer overflow: {} rows already recorded",
                self.capacity
            )));
        }
        self.position += 1;
        self.write_row(self.position, slots);
        Ok(())
    }

    /// Row `row` of the cold chain.
    pub fn cold_row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.samples.slice(s![0, row, ..])
    }

    /// Every `thin`-th cold-chain row in `0..capacity` and its
    /// log-likelihood.
    pub fn thinned_cold(&self, thin: usize) -> (Array2<f64>, Array1<f64>) {
        let samples = self
            .samples
            .slice(s![0, 0..self.capacity;thin, ..])
            .to_owned();
        let log_likelihood = self
            .log_likelihood
            .slice(s![0, 0..self.capacity;thin])
            .to_owned();
        (samples, log_likelihood)
    }

    /// Move the last row to row 0 and rewind.
    pub fn carry_forward(&mut self) {
        let last_samples = self.samples.slice(s![.., self.position, ..]).to_owned();
        let last_ll = self.log_likelihood.slice(s![.., self.position]).to_owned();
        self.samples.fill(0.0);
        self.log_likelihood.fill(0.0);
        self.samples.slice_mut(s![.., 0, ..]).assign(&last_samples);
        self.log_likelihood.slice_mut(s![.., 0]).assign(&last_ll);
        self.position = 0;
    }
}
