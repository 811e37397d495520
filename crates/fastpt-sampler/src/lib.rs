//! Parallel-tempered block sampler.
//!
//! A [`ChainPool`] owns one [`ChainSlot`] per temperature. Every block runs
//! cheap extrinsic jumps interleaved with tempering swaps, then one
//! expensive intrinsic jump and a final swap. Proposal scales come from a
//! periodically re-estimated Fisher diagonal and the cold chain is written
//! to a [`CheckpointWriter`] in thinned batches.
//!
//! # Module Organisation
//!
//! - [`pool`]: the scheduler that owns the chains and drives the block cycle
//! - [`chain`]: per-slot state and the tempered Metropolis-Hastings rule
//! - [`extrinsic`], [`intrinsic`]: the two block updaters
//! - [`swap`]: adjacent-temperature exchanges
//! - [`fisher`]: finite-difference Fisher-diagonal estimation
//! - [`buffer`], [`acceptance`]: per-flush sample and acceptance bookkeeping
//! - [`checkpoint`]: in-memory and on-disk stores
//! - [`diagnostics`]: autocorrelation, effective sample size and R-hat

pub mod acceptance;
pub mod buffer;
pub mod chain;
pub mod checkpoint;
pub mod diagnostics;
pub mod extrinsic;
pub mod fisher;
pub mod intrinsic;
pub mod pool;
pub mod swap;

pub use acceptance::{AcceptanceCounts, AcceptanceTable};
pub use buffer::SampleBuffer;
pub use chain::{ChainSlot, ChainState, StepOutcome};
pub use checkpoint::{CheckpointWriter, FileStore, Flush, MemoryStore, StoredRun};
pub use extrinsic::ExtrinsicUpdater;
pub use fisher::FisherEstimator;
pub use intrinsic::{IntrinsicUpdater, JumpClass};
pub use pool::{ChainInit, ChainPool};

use fastpt_core::FastPtError;

/// Error type for sampling operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Sampling error: {0}")]
    SamplingError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Core(#[from] FastPtError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for sampling operations.
pub type Result<T> = std::result::Result<T, Error>;
