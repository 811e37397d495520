//! Core types for the fastpt parallel-tempered sampler.
//!
//! # Module Organisation
//!
//! - [`config`]: run configuration loaded from TOML, with cadence validation
//! - [`ladder`]: the geometric temperature ladder
//! - [`parameters`]: parameter roles, layouts and per-chain state
//! - [`prior`]: independent uniform and normal priors
//! - [`likelihood`]: the cached likelihood accelerator contract
//! - [`reflect`]: cosine/angle correction applied after jumps
//! - [`errors`]: the crate error type

pub mod config;
pub mod errors;
pub mod ladder;
pub mod likelihood;
pub mod parameters;
pub mod prior;
pub mod reflect;

pub use config::{FisherSettings, RunConfig};
pub use errors::{FastPtError, FastPtResult};
pub use ladder::TemperatureLadder;
pub use likelihood::{CacheGuard, LikelihoodAccelerator};
pub use parameters::{LayoutBuilder, ParameterLayout, ParameterRole, ParameterState};
pub use prior::{Prior, PriorDistribution};
