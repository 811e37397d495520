//! Reference likelihood accelerators for the fastpt sampler.
//!
//! - [`gaussian`]: a multivariate Gaussian whose intrinsic coordinates are
//!   read from a cache, used to validate the sampler end to end
//! - [`timing_array`]: a continuous-wave search over a pulsar timing array
//!   with per-pulsar cached statistics
//! - [`chirp`]: leading-order binary evolution behind the timing array's
//!   admissibility check

pub mod chirp;
pub mod gaussian;
pub mod timing_array;

pub use gaussian::{GaussianAccelerator, GaussianCache};
pub use timing_array::{
    CwSource, Pulsar, TimingArray, TimingArrayAccelerator, TimingArrayCache,
};
