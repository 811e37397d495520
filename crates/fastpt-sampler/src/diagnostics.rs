//! Convergence diagnostics for stored cold-chain samples.
//!
//! The integrated autocorrelation time is
//!
//! ```text
//! tau = 1 + 2 * sum_k rho(k)
//! ```
//!
//! where `rho(k)` is the normalised autocorrelation at lag `k`. The standard
//! estimate stops at the first non-positive lag; the conservative estimate
//! sums `|rho(k)|` over a fixed window and is used for error bars.
//!
//! Only the cold chain is persisted, so R-hat is computed by splitting the
//! single chain into segments.

use crate::checkpoint::StoredRun;
use indexmap::IndexMap;
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Lags beyond this are never summed.
pub const MAX_LAG: usize = 100;

/// Normalised autocorrelation at lags `1..=max_lag`.
///
/// A constant chain has zero autocorrelation at every lag.
pub fn autocorrelation(chain: &[f64], max_lag: usize) -> Vec<f64> {
    let n = chain.len();
    if n == 0 {
        return vec![0.0; max_lag];
    }
    let mean = chain.iter().sum::<f64>() / n as f64;
    let variance = chain.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    if variance == 0.0 {
        return vec![0.0; max_lag];
    }

    (1..=max_lag)
        .map(|lag| {
            if lag >= n {
                return 0.0;
            }
            let covariance = chain[..n - lag]
                .iter()
                .zip(&chain[lag..])
                .map(|(a, b)| (a - mean) * (b - mean))
                .sum::<f64>()
                / (n - lag) as f64;
            covariance / variance
        })
        .collect()
}

fn window(n: usize) -> usize {
    (n / 2).min(MAX_LAG)
}

/// Integrated autocorrelation time, truncated at the first non-positive lag.
pub fn autocorr_time(chain: &[f64]) -> f64 {
    let sum: f64 = autocorrelation(chain, window(chain.len()))
        .into_iter()
        .take_while(|&rho| rho > 0.0)
        .sum();
    1.0 + 2.0 * sum
}

/// Upper-bound autocorrelation time: `1 + 2 * sum |rho(k)|` over the full
/// window.
pub fn conservative_autocorr_time(chain: &[f64]) -> f64 {
    let sum: f64 = autocorrelation(chain, window(chain.len()))
        .into_iter()
        .map(f64::abs)
        .sum();
    1.0 + 2.0 * sum
}

pub fn effective_sample_size(chain: &[f64]) -> f64 {
    chain.len() as f64 / autocorr_time(chain)
}

/// Standard error of the chain mean, inflated by the conservative
/// autocorrelation time.
pub fn standard_error(chain: &[f64]) -> f64 {
    let n = chain.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = chain.iter().sum::<f64>() / n as f64;
    let variance = chain.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (variance * conservative_autocorr_time(chain) / n as f64).sqrt()
}

/// Gelman-Rubin statistic of `chain` split into `n_segments` equal pieces.
///
/// Returns NaN when a segment would hold fewer than two samples.
pub fn split_r_hat(chain: &[f64], n_segments: usize) -> f64 {
    if n_segments < 2 {
        return f64::NAN;
    }
    let len = chain.len() / n_segments;
    if len < 2 {
        return f64::NAN;
    }

    let (means, vars): (Vec<f64>, Vec<f64>) = chain
        .chunks_exact(len)
        .take(n_segments)
        .map(|segment| {
            let mean = segment.iter().sum::<f64>() / len as f64;
            let var = segment.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (len - 1) as f64;
            (mean, var)
        })
        .unzip();

    let m = n_segments as f64;
    let w = vars.iter().sum::<f64>() / m;
    let overall = means.iter().sum::<f64>() / m;
    let b = len as f64 * means.iter().map(|&x| (x - overall).powi(2)).sum::<f64>() / (m - 1.0);
    let var_plus = ((len - 1) as f64 * w + b) / len as f64;
    (var_plus / w).sqrt()
}

/// Sample mean and unbiased sample covariance of the rows of `samples`.
pub fn mean_and_covariance(samples: ArrayView2<'_, f64>) -> (Array1<f64>, Array2<f64>) {
    let n = samples.nrows();
    let dim = samples.ncols();
    let Some(mean) = samples.mean_axis(Axis(0)) else {
        return (
            Array1::from_elem(dim, f64::NAN),
            Array2::from_elem((dim, dim), f64::NAN),
        );
    };
    let centred = &samples - &mean;
    let covariance = if n > 1 {
        centred.t().dot(&centred) / (n - 1) as f64
    } else {
        Array2::from_elem((dim, dim), f64::NAN)
    };
    (mean, covariance)
}

/// Per-parameter summary of a stored run.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSummary {
    pub mean: f64,
    pub std: f64,
    pub standard_error: f64,
    pub autocorr_time: f64,
    pub ess: f64,
    pub r_hat: f64,
}

/// Summarise every parameter after dropping the first `discard` samples.
///
/// Returns an empty map if fewer than 10 samples remain.
pub fn summarize(run: &StoredRun, discard: usize) -> IndexMap<String, ParameterSummary> {
    let mut result = IndexMap::new();
    if run.n_samples() < discard + 10 {
        return result;
    }
    for (i, name) in run.param_names.iter().enumerate() {
        let chain: Vec<f64> = run.samples.column(i).iter().skip(discard).copied().collect();
        let n = chain.len() as f64;
        let mean = chain.iter().sum::<f64>() / n;
        let std = (chain.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
        result.insert(
            name.clone(),
            ParameterSummary {
                mean,
                std,
                standard_error: standard_error(&chain),
                autocorr_time: autocorr_time(&chain),
                ess: effective_sample_size(&chain),
                r_hat: split_r_hat(&chain, 4),
            },
        );
    }
    result
}
