//! Independent per-parameter priors.
//!
//! The log-prior is additive over parameters: uniform parameters contribute
//! `-ln(high - low)` inside their bounds and `-inf` outside, normal
//! parameters contribute their Gaussian log-density. Parameters without a
//! distribution contribute nothing.

use crate::errors::{FastPtError, FastPtResult};
use crate::parameters::ParameterLayout;
use indexmap::IndexMap;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Distribution of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriorDistribution {
    Uniform { low: f64, high: f64 },
    Normal { mu: f64, sigma: f64 },
}

impl PriorDistribution {
    pub fn uniform(low: f64, high: f64) -> Self {
        PriorDistribution::Uniform { low, high }
    }

    pub fn normal(mu: f64, sigma: f64) -> Self {
        PriorDistribution::Normal { mu, sigma }
    }

    fn check(&self, name: &str) -> FastPtResult<()> {
        let reason = match *self {
            PriorDistribution::Uniform { low, high } => {
                if !(low.is_finite() && high.is_finite() && low < high) {
                    Some(format!("uniform bounds [{}, {}] are not a finite interval", low, high))
                } else {
                    None
                }
            }
            PriorDistribution::Normal { mu, sigma } => {
                if !(mu.is_finite() && sigma.is_finite() && sigma > 0.0) {
                    Some(format!("normal({}, {}) needs finite mu and sigma > 0", mu, sigma))
                } else {
                    None
                }
            }
        };
        match reason {
            Some(reason) => Err(FastPtError::InvalidPrior {
                name: name.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Log-density at `x`.
    pub fn ln_pdf(&self, x: f64) -> f64 {
        match *self {
            PriorDistribution::Uniform { low, high } => {
                if (low..=high).contains(&x) {
                    -(high - low).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            PriorDistribution::Normal { mu, sigma } => {
                let z = (x - mu) / sigma;
                -0.5 * z * z - sigma.ln() - LN_SQRT_2PI
            }
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            PriorDistribution::Uniform { low, high } => Uniform::new(low, high).sample(rng),
            PriorDistribution::Normal { mu, sigma } => match Normal::new(mu, sigma) {
                Ok(normal) => normal.sample(rng),
                Err(_) => mu,
            },
        }
    }
}

/// Priors resolved against a layout.
///
/// Uniform and normal parameters are kept in separate index lists so the
/// log-prior is a pair of tight loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prior {
    distributions: IndexMap<String, PriorDistribution>,
    uniform_ids: Vec<usize>,
    lows: Vec<f64>,
    highs: Vec<f64>,
    normal_ids: Vec<usize>,
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    log_norm: f64,
}

impl Prior {
    /// Resolve named distributions to layout indices.
    ///
    /// Fails on names the layout does not know and on invalid distributions.
    pub fn for_layout(
        layout: &ParameterLayout,
        distributions: &IndexMap<String, PriorDistribution>,
    ) -> FastPtResult<Self> {
        let mut prior = Prior {
            distributions: distributions.clone(),
            uniform_ids: Vec::new(),
            lows: Vec::new(),
            highs: Vec::new(),
            normal_ids: Vec::new(),
            mus: Vec::new(),
            sigmas: Vec::new(),
            log_norm: 0.0,
        };
        for (name, dist) in distributions {
            dist.check(name)?;
            let index = layout.index_of(name)?;
            match *dist {
                PriorDistribution::Uniform { low, high } => {
                    prior.uniform_ids.push(index);
                    prior.lows.push(low);
                    prior.highs.push(high);
                    prior.log_norm -= (high - low).ln();
                }
                PriorDistribution::Normal { mu, sigma } => {
                    prior.normal_ids.push(index);
                    prior.mus.push(mu);
                    prior.sigmas.push(sigma);
                    prior.log_norm -= sigma.ln() + LN_SQRT_2PI;
                }
            }
        }
        Ok(prior)
    }

    /// Require every layout parameter to have a distribution.
    pub fn ensure_complete(&self, layout: &ParameterLayout) -> FastPtResult<()> {
        match layout
            .names()
            .find(|name| !self.distributions.contains_key(*name))
        {
            Some(name) => Err(FastPtError::MissingPrior(name.to_string())),
            None => Ok(()),
        }
    }

    pub fn distributions(&self) -> &IndexMap<String, PriorDistribution> {
        &self.distributions
    }

    /// Log-prior of a full parameter vector.
    pub fn log_prior(&self, values: &[f64]) -> f64 {
        for ((&i, &low), &high) in self.uniform_ids.iter().zip(&self.lows).zip(&self.highs) {
            let x = values[i];
            if !(low..=high).contains(&x) {
                return f64::NEG_INFINITY;
            }
        }
        let mut log_p = self.log_norm;
        for ((&i, &mu), &sigma) in self.normal_ids.iter().zip(&self.mus).zip(&self.sigmas) {
            let z = (values[i] - mu) / sigma;
            log_p -= 0.5 * z * z;
        }
        log_p
    }

    /// Overwrite every parameter that has a distribution with a prior draw.
    ///
    /// Values of parameters without a distribution are left as given.
    pub fn sample_into<R: Rng + ?Sized>(&self, rng: &mut R, values: &mut [f64]) {
        for ((&i, &low), &high) in self.uniform_ids.iter().zip(&self.lows).zip(&self.highs) {
            values[i] = PriorDistribution::uniform(low, high).sample(rng);
        }
        for ((&i, &mu), &sigma) in self.normal_ids.iter().zip(&self.mus).zip(&self.sigmas) {
            values[i] = PriorDistribution::normal(mu, sigma).sample(rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::LayoutBuilder;
    use is_close::is_close;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn layout() -> ParameterLayout {
        let mut builder = LayoutBuilder::new();
        builder.extrinsic("a").extrinsic("b").distance("d", 0);
        builder.build().unwrap()
    }

    fn priors() -> IndexMap<String, PriorDistribution> {
        let mut map = IndexMap::new();
        map.insert("a".to_string(), PriorDistribution::uniform(-1.0, 3.0));
        map.insert("b".to_string(), PriorDistribution::uniform(0.0, 0.5));
        map.insert("d".to_string(), PriorDistribution::normal(1.0, 2.0));
        map
    }

    #[test]
    fn test_log_prior_is_additive() {
        let layout = layout();
        let prior = Prior::for_layout(&layout, &priors()).unwrap();
        let values = [0.5, 0.25, 3.0];
        let expected: f64 = priors()
            .iter()
            .zip(values.iter())
            .map(|((_, dist), x)| dist.ln_pdf(*x))
            .sum();
        assert!(is_close!(prior.log_prior(&values), expected));
        assert!(is_close!(
            PriorDistribution::normal(1.0, 2.0).ln_pdf(3.0),
            -0.5 - 2.0_f64.ln() - LN_SQRT_2PI
        ));
    }

    #[test]
    fn test_outside_uniform_bounds() {
        let layout = layout();
        let prior = Prior::for_layout(&layout, &priors()).unwrap();
        assert_eq!(prior.log_prior(&[3.5, 0.25, 0.0]), f64::NEG_INFINITY);
        assert_eq!(prior.log_prior(&[0.0, -0.1, 0.0]), f64::NEG_INFINITY);
        // bounds are inclusive
        assert!(prior.log_prior(&[3.0, 0.0, 0.0]).is_finite());
    }

    #[test]
    fn test_unknown_and_invalid_priors() {
        let layout = layout();
        let mut map = priors();
        map.insert("z".to_string(), PriorDistribution::uniform(0.0, 1.0));
        assert!(matches!(
            Prior::for_layout(&layout, &map),
            Err(FastPtError::UnknownParameter(_))
        ));

        let mut map = IndexMap::new();
        map.insert("a".to_string(), PriorDistribution::uniform(1.0, 1.0));
        assert!(matches!(
            Prior::for_layout(&layout, &map),
            Err(FastPtError::InvalidPrior { .. })
        ));

        let mut map = IndexMap::new();
        map.insert("d".to_string(), PriorDistribution::normal(0.0, -1.0));
        assert!(Prior::for_layout(&layout, &map).is_err());
    }

    #[test]
    fn test_completeness_check() {
        let layout = layout();
        let mut map = priors();
        map.shift_remove("b");
        let prior = Prior::for_layout(&layout, &map).unwrap();
        assert!(matches!(
            prior.ensure_complete(&layout),
            Err(FastPtError::MissingPrior(name)) if name == "b"
        ));
    }

    #[test]
    fn test_sample_respects_bounds_and_defaults() {
        let layout = layout();
        let mut map = priors();
        map.shift_remove("b");
        let prior = Prior::for_layout(&layout, &map).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..200 {
            let mut values = [0.0, 42.0, 0.0];
            prior.sample_into(&mut rng, &mut values);
            assert!((-1.0..3.0).contains(&values[0]));
            assert_eq!(values[1], 42.0);
            assert!(values[2].is_finite());
        }
    }

    #[test]
    fn test_toml_representation() {
        let text = r#"
            a = { kind = "uniform", low = -1.0, high = 3.0 }
            d = { kind = "normal", mu = 1.0, sigma = 2.0 }
        "#;
        let map: IndexMap<String, PriorDistribution> = toml::from_str(text).unwrap();
        assert_eq!(map["a"], PriorDistribution::uniform(-1.0, 3.0));
        assert_eq!(map["d"], PriorDistribution::normal(1.0, 2.0));
    }
}
