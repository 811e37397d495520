//! Parallel-tempered block MCMC for likelihoods whose parameters split into
//! a cheap extrinsic set and an expensive intrinsic set.
//!
//! This crate re-exports the workspace members:
//!
//! - [`core`]: parameter layouts, priors, run configuration and the
//!   likelihood accelerator contract
//! - [`sampler`]: the chain pool, block updaters, swaps, Fisher scales and
//!   checkpoint stores
//! - [`models`]: reference accelerators (Gaussian and pulsar timing array)

pub use fastpt_core as core;
pub use fastpt_models as models;
pub use fastpt_sampler as sampler;

pub use fastpt_core::{
    LikelihoodAccelerator, ParameterLayout, ParameterState, Prior, PriorDistribution, RunConfig,
};
pub use fastpt_sampler::{ChainInit, ChainPool, CheckpointWriter, FileStore, MemoryStore};
