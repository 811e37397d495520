//! Multivariate Gaussian likelihood with cached intrinsic coordinates.
//!
//! The values of the intrinsic coordinates are captured by the update hooks
//! and [`GaussianAccelerator::evaluate`] reads those captured values rather
//! than the state, so a cache that was not refreshed after an intrinsic move
//! gives a visibly wrong log-likelihood.

use fastpt_core::{
    FastPtError, FastPtResult, LikelihoodAccelerator, ParameterLayout, ParameterRole,
    ParameterState,
};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use std::f64::consts::PI;
use std::sync::Arc;

/// Intrinsic coordinate values the cache was last built for.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianCache {
    values: Vec<f64>,
}

/// Shared, read-only part of the model.
#[derive(Debug)]
struct GaussianModel {
    mean: Array1<f64>,
    precision: Array2<f64>,
    log_norm: f64,
    /// (parameter index, role) for every intrinsic coordinate
    intrinsic: Vec<(usize, ParameterRole)>,
}

#[derive(Debug, Clone)]
pub struct GaussianAccelerator {
    model: Arc<GaussianModel>,
    cache: GaussianCache,
}

impl GaussianAccelerator {
    /// Build an accelerator synchronised with `state`.
    ///
    /// # Arguments
    ///
    /// * `layout` - Parameter layout; its intrinsic coordinates are cached
    /// * `mean` - Mean vector, one entry per parameter
    /// * `covariance` - Symmetric positive-definite covariance matrix
    /// * `state` - Initial state the cache is built for
    pub fn new(
        layout: &ParameterLayout,
        mean: Array1<f64>,
        covariance: Array2<f64>,
        state: &ParameterState,
    ) -> FastPtResult<Self> {
        let n = layout.len();
        if mean.len() != n {
            return Err(FastPtError::DimensionMismatch {
                expected: n,
                got: mean.len(),
            });
        }
        if covariance.dim() != (n, n) {
            return Err(FastPtError::DimensionMismatch {
                expected: n * n,
                got: covariance.len(),
            });
        }

        let cov = DMatrix::from_fn(n, n, |i, j| covariance[[i, j]]);
        let cholesky = cov.cholesky().ok_or_else(|| {
            FastPtError::Error("covariance matrix is not positive definite".to_string())
        })?;
        let log_det: f64 = 2.0 * cholesky.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
        let inverse = cholesky.inverse();
        let precision = Array2::from_shape_fn((n, n), |(i, j)| inverse[(i, j)]);

        let intrinsic = layout
            .intrinsic()
            .iter()
            .map(|&i| (i, layout.role(i)))
            .collect::<Vec<_>>();
        let model = GaussianModel {
            mean,
            precision,
            log_norm: -0.5 * (n as f64 * (2.0 * PI).ln() + log_det),
            intrinsic,
        };
        let cache = GaussianCache {
            values: model.intrinsic.iter().map(|(i, _)| state.get(*i)).collect(),
        };
        Ok(Self {
            model: Arc::new(model),
            cache,
        })
    }

    fn refresh(&mut self, state: &ParameterState, keep: impl Fn(ParameterRole) -> bool) {
        for ((index, role), cached) in self.model.intrinsic.iter().zip(&mut self.cache.values) {
            if keep(*role) {
                *cached = state.get(*index);
            }
        }
    }
}

impl LikelihoodAccelerator for GaussianAccelerator {
    type Snapshot = GaussianCache;

    fn evaluate(&self, state: &ParameterState) -> f64 {
        let mut x: Vec<f64> = state.values().to_vec();
        for ((index, _), cached) in self.model.intrinsic.iter().zip(&self.cache.values) {
            x[*index] = *cached;
        }
        let d = Array1::from(x) - &self.model.mean;
        self.model.log_norm - 0.5 * d.dot(&self.model.precision.dot(&d))
    }

    fn update_intrinsic(&mut self, state: &ParameterState) {
        self.refresh(state, |_| true);
    }

    fn update_unit_distance(&mut self, state: &ParameterState, unit: usize) {
        self.refresh(state, |role| role == ParameterRole::Distance { unit });
    }

    fn update_unit_noise(&mut self, state: &ParameterState, units: &[usize]) {
        self.refresh(state, |role| match role {
            ParameterRole::Noise { unit } => units.contains(&unit),
            _ => false,
        });
    }

    fn snapshot(&self) -> GaussianCache {
        self.cache.clone()
    }

    fn restore(&mut self, snapshot: GaussianCache) {
        self.cache = snapshot;
    }

    // The Gaussian has no per-unit blocks to zero.
    fn isolate_unit(&mut self, _unit: usize) {}

    fn is_synchronized(&self, state: &ParameterState) -> bool {
        self.model
            .intrinsic
            .iter()
            .zip(&self.cache.values)
            .all(|((index, _), cached)| state.get(*index) == *cached)
    }
}
