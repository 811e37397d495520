//! Finite-difference Fisher-diagonal estimation.
//!
//! For parameter `i` with step `eps` the curvature of the log-likelihood is
//!
//! ```text
//! H_ii = -(L(x + 2 eps e_i) - 2 L(x) + L(x - 2 eps e_i)) / (4 eps^2)
//! ```
//!
//! and the proposal scale is `1 / sqrt(max(H_ii, eig_limit))`. How `L` is
//! evaluated depends on the parameter's role: extrinsic parameters only
//! need the cheap evaluation, per-unit phases and distances are probed with
//! every other unit switched off, and shared intrinsic parameters need a
//! full cache update on each side. Noise parameters use their default scale
//! unless `use_default_noise_sigma` is off, in which case they are probed by
//! recomputing the unit's noise statistics on each side.

use crate::chain::ChainState;
use fastpt_core::{
    CacheGuard, FisherSettings, LikelihoodAccelerator, ParameterLayout, ParameterRole,
    ParameterState,
};
use ndarray::Array1;

/// Convert a curvature estimate to a proposal scale.
///
/// Unusable estimates (non-finite or non-positive) take `default`; the result
/// is floored at `eig_limit`, so the scale is at most `1 / sqrt(eig_limit)`.
pub fn curvature_to_scale(curvature: f64, default: f64, eig_limit: f64) -> f64 {
    let h = if curvature.is_finite() && curvature > 0.0 {
        curvature
    } else if default.is_finite() && default > 0.0 {
        default
    } else {
        eig_limit
    };
    1.0 / h.max(eig_limit).sqrt()
}

fn second_difference(plus: f64, centre: f64, minus: f64, eps: f64) -> f64 {
    -(plus - 2.0 * centre + minus) / (4.0 * eps * eps)
}

#[derive(Debug, Clone, Copy)]
pub struct FisherEstimator<'a> {
    settings: &'a FisherSettings,
    layout: &'a ParameterLayout,
}

impl<'a> FisherEstimator<'a> {
    pub fn new(settings: &'a FisherSettings, layout: &'a ParameterLayout) -> Self {
        Self { settings, layout }
    }

    /// Proposal scales for every parameter, probed at `probe`.
    ///
    /// The chain's parameters are never touched and its accelerator is
    /// restored to its entry state on return, including when a probe
    /// panics.
    ///
    /// # Arguments
    ///
    /// * `state` - Chain whose accelerator is borrowed for the probes
    /// * `probe` - Full parameter vector at which curvature is measured
    pub fn estimate<A: LikelihoodAccelerator>(
        &self,
        state: &mut ChainState<A>,
        probe: &[f64],
    ) -> Array1<f64> {
        let mut point = state.params.clone();
        point.assign_from(probe);

        let mut guard = CacheGuard::new(&mut state.accelerator);
        guard.update_intrinsic(&point);
        let at_probe = guard.snapshot();
        let centre = guard.evaluate(&point);

        let eig_limit = self.settings.eig_limit;
        let mut scales = Array1::zeros(self.layout.len());
        for i in 0..self.layout.len() {
            let role = self.layout.role(i);
            let default = self.settings.default_curvature(role);
            let curvature = match role {
                ParameterRole::Noise { .. } if self.settings.use_default_noise_sigma => default,
                ParameterRole::Phase { .. } | ParameterRole::Distance { .. }
                    if self.settings.use_default_unit_sigmas =>
                {
                    default
                }
                ParameterRole::Extrinsic => {
                    let eps = self.settings.epsilon(self.layout.name(i), role);
                    let (plus, minus) = probe_pair(&mut point, i, eps, |p| guard.evaluate(p));
                    second_difference(plus, centre, minus, eps)
                }
                ParameterRole::Phase { unit } => {
                    let eps = self.settings.epsilon(self.layout.name(i), role);
                    guard.isolate_unit(unit);
                    let local = guard.evaluate(&point);
                    let (plus, minus) = probe_pair(&mut point, i, eps, |p| guard.evaluate(p));
                    guard.restore(at_probe.clone());
                    second_difference(plus, local, minus, eps)
                }
                ParameterRole::Distance { unit } => {
                    let eps = self.settings.epsilon(self.layout.name(i), role);
                    guard.isolate_unit(unit);
                    let local = guard.evaluate(&point);
                    let (plus, minus) = probe_pair(&mut point, i, eps, |p| {
                        guard.update_unit_distance(p, unit);
                        guard.evaluate(p)
                    });
                    guard.restore(at_probe.clone());
                    second_difference(plus, local, minus, eps)
                }
                ParameterRole::Noise { unit } => {
                    let eps = self.settings.epsilon(self.layout.name(i), role);
                    let (plus, minus) = probe_pair(&mut point, i, eps, |p| {
                        guard.update_unit_noise(p, &[unit]);
                        guard.evaluate(p)
                    });
                    guard.restore(at_probe.clone());
                    second_difference(plus, centre, minus, eps)
                }
                ParameterRole::SharedIntrinsic => {
                    let eps = self.settings.epsilon(self.layout.name(i), role);
                    let (plus, minus) = probe_pair(&mut point, i, eps, |p| {
                        guard.update_intrinsic(p);
                        guard.evaluate(p)
                    });
                    guard.restore(at_probe.clone());
                    second_difference(plus, centre, minus, eps)
                }
            };
            scales[i] = curvature_to_scale(curvature, default, eig_limit);
        }
        scales
    }
}

/// Evaluate `f` at `x + 2 eps e_i` and `x - 2 eps e_i`, leaving `x` as found.
fn probe_pair<F>(point: &mut ParameterState, i: usize, eps: f64, mut f: F) -> (f64, f64)
where
    F: FnMut(&ParameterState) -> f64,
{
    let original = point.get(i);
    point.set(i, original + 2.0 * eps);
    let plus = f(point);
    point.set(i, original - 2.0 * eps);
    let minus = f(point);
    point.set(i, original);
    (plus, minus)
}
