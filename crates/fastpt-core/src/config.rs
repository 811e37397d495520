//! Run configuration.
//!
//! A [`RunConfig`] carries every run-wide constant the sampler needs: the
//! chain count and temperature range, the block size and the cadences for
//! checkpointing, Fisher re-estimation and status updates. It is normally
//! loaded from a TOML file and must pass [`RunConfig::validate`] before a
//! chain pool is built from it.
//!
//! ```toml
//! n_iterations = 100000
//! n_chain = 4
//! t_max = 3.0
//! n_int_block = 10
//! save_every_n = 10000
//!
//! [fisher]
//! sigma_phase_default = 0.25
//! ```

use crate::errors::{FastPtError, FastPtResult};
use crate::parameters::ParameterRole;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for the finite-difference Fisher-diagonal estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FisherSettings {
    /// Step for shared intrinsic parameters.
    pub eps_shared: f64,
    /// Step for extrinsic parameters other than per-unit phases.
    pub eps_extrinsic: f64,
    /// Step for per-unit phases.
    pub eps_phase: f64,
    /// Step for per-unit distances.
    pub eps_distance: f64,
    /// Step for per-unit noise parameters.
    pub eps_noise: f64,
    /// Per-parameter step overrides, keyed by name.
    pub eps_overrides: IndexMap<String, f64>,
    pub sigma_phase_default: f64,
    pub sigma_distance_default: f64,
    pub sigma_noise_default: f64,
    /// Skip the finite differences for per-unit phases and distances and use
    /// the default sigmas instead.
    pub use_default_unit_sigmas: bool,
    /// Use the default sigma for noise parameters instead of differencing
    /// the likelihood through a noise recomputation.
    pub use_default_noise_sigma: bool,
    /// Minimum curvature; bounds every step at `1 / sqrt(eig_limit)`.
    pub eig_limit: f64,
}

impl Default for FisherSettings {
    fn default() -> Self {
        Self {
            eps_shared: 1e-4,
            eps_extrinsic: 1e-4,
            eps_phase: 1e-4,
            eps_distance: 1e-4,
            eps_noise: 1e-4,
            eps_overrides: IndexMap::new(),
            sigma_phase_default: 0.25,
            sigma_distance_default: 0.5,
            sigma_noise_default: 0.5,
            use_default_unit_sigmas: false,
            use_default_noise_sigma: true,
            eig_limit: 4.0,
        }
    }
}

impl FisherSettings {
    /// Finite-difference step for a parameter, honouring per-name overrides.
    pub fn epsilon(&self, name: &str, role: ParameterRole) -> f64 {
        if let Some(eps) = self.eps_overrides.get(name) {
            return *eps;
        }
        match role {
            ParameterRole::SharedIntrinsic => self.eps_shared,
            ParameterRole::Extrinsic => self.eps_extrinsic,
            ParameterRole::Phase { .. } => self.eps_phase,
            ParameterRole::Distance { .. } => self.eps_distance,
            ParameterRole::Noise { .. } => self.eps_noise,
        }
    }

    /// Curvature used when the estimate for a parameter is unusable.
    ///
    /// Per-unit classes have configured sigmas; the shared intrinsic and
    /// extrinsic classes fall back to the floor, which gives the widest
    /// permitted step.
    pub fn default_curvature(&self, role: ParameterRole) -> f64 {
        match role {
            ParameterRole::Phase { .. } => 1.0 / self.sigma_phase_default.powi(2),
            ParameterRole::Distance { .. } => 1.0 / self.sigma_distance_default.powi(2),
            ParameterRole::Noise { .. } => 1.0 / self.sigma_noise_default.powi(2),
            ParameterRole::SharedIntrinsic | ParameterRole::Extrinsic => self.eig_limit,
        }
    }

    fn validate(&self) -> FastPtResult<()> {
        let steps = [
            ("eps_shared", self.eps_shared),
            ("eps_extrinsic", self.eps_extrinsic),
            ("eps_phase", self.eps_phase),
            ("eps_distance", self.eps_distance),
            ("eps_noise", self.eps_noise),
            ("sigma_phase_default", self.sigma_phase_default),
            ("sigma_distance_default", self.sigma_distance_default),
            ("sigma_noise_default", self.sigma_noise_default),
            ("eig_limit", self.eig_limit),
        ];
        for (name, value) in steps
            .into_iter()
            .chain(self.eps_overrides.iter().map(|(k, v)| (k.as_str(), *v)))
        {
            if !(value.is_finite() && value > 0.0) {
                return Err(FastPtError::Configuration(format!(
                    "fisher setting '{}' must be finite and positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Run-wide sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Total number of elementary steps.
    pub n_iterations: usize,
    /// Number of tempered chains, including the cold chain.
    pub n_chain: usize,
    /// Temperature of the hottest chain.
    pub t_max: f64,
    /// Elementary steps per block. Must be even and at least 4.
    pub n_int_block: usize,
    /// Buffer rows between checkpoint flushes.
    pub save_every_n: usize,
    /// Steps between Fisher re-estimations.
    pub n_update_fisher: usize,
    /// Number of status updates over the whole run.
    pub n_status_update: usize,
    /// Keep every `thin`-th buffer row when flushing.
    pub thin: usize,
    /// Units whose distances move together in a distance jump.
    pub n_distance_jumps: usize,
    pub seed: u64,
    pub fisher: FisherSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n_iterations: 1_000_000,
            n_chain: 4,
            t_max: 3.0,
            n_int_block: 10_000,
            save_every_n: 100_000,
            n_update_fisher: 100_000,
            n_status_update: 100,
            thin: 100,
            n_distance_jumps: 5,
            seed: 0,
            fisher: FisherSettings::default(),
        }
    }
}

impl RunConfig {
    /// Parse a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> FastPtResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> FastPtResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check the divisibility relations between cadences.
    ///
    /// Every violation is fatal: the scheduler relies on flushes, Fisher
    /// refreshes and status updates all landing on block boundaries.
    pub fn validate(&self) -> FastPtResult<()> {
        let fail = |msg: String| Err(FastPtError::Configuration(msg));

        if self.n_chain == 0 {
            return fail("n_chain must be at least 1".to_string());
        }
        if !(self.t_max.is_finite() && self.t_max >= 1.0) {
            return fail(format!("t_max must be finite and >= 1, got {}", self.t_max));
        }
        if self.n_int_block < 4 || self.n_int_block % 2 != 0 {
            return fail(format!(
                "n_int_block must be even and >= 4, got {}",
                self.n_int_block
            ));
        }
        for (name, value) in [
            ("n_iterations", self.n_iterations),
            ("save_every_n", self.save_every_n),
            ("n_update_fisher", self.n_update_fisher),
            ("n_status_update", self.n_status_update),
            ("thin", self.thin),
        ] {
            if value == 0 {
                return fail(format!("{} must be positive", name));
            }
        }
        if self.save_every_n % self.n_int_block != 0 {
            return fail(format!(
                "save_every_n ({}) must be a multiple of n_int_block ({})",
                self.save_every_n, self.n_int_block
            ));
        }
        if self.n_update_fisher % self.n_int_block != 0 {
            return fail(format!(
                "n_update_fisher ({}) must be a multiple of n_int_block ({})",
                self.n_update_fisher, self.n_int_block
            ));
        }
        if self.n_iterations % self.n_status_update != 0 {
            return fail(format!(
                "n_iterations ({}) must be a multiple of n_status_update ({})",
                self.n_iterations, self.n_status_update
            ));
        }
        if (self.n_iterations / self.n_status_update) % self.n_int_block != 0 {
            return fail(format!(
                "the status period ({}) must be a multiple of n_int_block ({})",
                self.n_iterations / self.n_status_update,
                self.n_int_block
            ));
        }
        if self.n_iterations % self.save_every_n != 0 {
            return fail(format!(
                "n_iterations ({}) must be a multiple of save_every_n ({})",
                self.n_iterations, self.save_every_n
            ));
        }
        if self.n_iterations % self.n_int_block != 0 {
            return fail(format!(
                "n_iterations ({}) must be a multiple of n_int_block ({})",
                self.n_iterations, self.n_int_block
            ));
        }
        if self.save_every_n % self.thin != 0 {
            return fail(format!(
                "save_every_n ({}) must be a multiple of thin ({})",
                self.save_every_n, self.thin
            ));
        }
        self.fisher.validate()
    }

    /// Total number of blocks in a full run.
    pub fn n_blocks(&self) -> usize {
        self.n_iterations / self.n_int_block
    }

    /// Extrinsic half-steps per block; each is followed by a swap.
    pub fn extrinsic_steps_per_block(&self) -> usize {
        (self.n_int_block - 2) / 2
    }

    /// Blocks between checkpoint flushes.
    pub fn blocks_per_flush(&self) -> usize {
        self.save_every_n / self.n_int_block
    }

    /// Blocks between Fisher re-estimations.
    pub fn blocks_per_fisher_update(&self) -> usize {
        self.n_update_fisher / self.n_int_block
    }

    /// Blocks between status updates.
    pub fn blocks_per_status(&self) -> usize {
        self.n_iterations / self.n_status_update / self.n_int_block
    }

    /// Thinned samples written by each flush.
    pub fn samples_per_flush(&self) -> usize {
        self.save_every_n / self.thin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn small() -> RunConfig {
        RunConfig {
            n_iterations: 1500,
            n_chain: 4,
            t_max: 3.0,
            n_int_block: 10,
            save_every_n: 500,
            n_update_fisher: 100,
            n_status_update: 5,
            thin: 10,
            n_distance_jumps: 2,
            seed: 1,
            fisher: FisherSettings::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let config = small();
        config.validate().unwrap();
        assert_eq!(config.n_blocks(), 150);
        assert_eq!(config.extrinsic_steps_per_block(), 4);
        assert_eq!(config.blocks_per_flush(), 50);
        assert_eq!(config.blocks_per_fisher_update(), 10);
        assert_eq!(config.blocks_per_status(), 30);
        assert_eq!(config.samples_per_flush(), 50);
    }

    #[test]
    fn test_default_config_is_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn test_block_size_rules() {
        let mut config = small();
        config.n_int_block = 7;
        assert!(matches!(
            config.validate(),
            Err(FastPtError::Configuration(_))
        ));

        config.n_int_block = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_divisibility_rules() {
        let mut config = small();
        config.save_every_n = 505;
        assert!(config.validate().is_err());

        let mut config = small();
        config.n_update_fisher = 105;
        assert!(config.validate().is_err());

        let mut config = small();
        config.n_status_update = 7;
        assert!(config.validate().is_err());

        // 1500 / 12 = 125 is not a block multiple
        let mut config = small();
        config.n_status_update = 12;
        assert!(config.validate().is_err());

        let mut config = small();
        config.n_iterations = 1600;
        config.n_status_update = 4;
        assert!(config.validate().is_err());

        let mut config = small();
        config.thin = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chain_and_temperature_rules() {
        let mut config = small();
        config.n_chain = 0;
        assert!(config.validate().is_err());

        let mut config = small();
        config.t_max = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_fisher_settings() {
        let mut config = small();
        config.fisher.eig_limit = 0.0;
        assert!(config.validate().is_err());

        let mut config = small();
        config.fisher.eps_overrides.insert("x".to_string(), -1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_with_defaults() {
        let text = r#"
            n_iterations = 1500
            n_int_block = 10
            save_every_n = 500
            n_update_fisher = 100
            n_status_update = 5
            thin = 10

            [fisher]
            sigma_phase_default = 0.1

            [fisher.eps_overrides]
            "0_log10_fgw" = 1e-5
        "#;
        let config = RunConfig::from_toml_str(text).unwrap();
        assert_eq!(config.n_chain, 4);
        assert_eq!(config.fisher.sigma_phase_default, 0.1);
        assert_eq!(config.fisher.eig_limit, 4.0);
        assert_eq!(
            config
                .fisher
                .epsilon("0_log10_fgw", ParameterRole::SharedIntrinsic),
            1e-5
        );
        assert_eq!(
            config.fisher.epsilon("other", ParameterRole::SharedIntrinsic),
            1e-4
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_from_toml_rejects_bad_types() {
        let result = RunConfig::from_toml_str("n_chain = \"four\"");
        assert!(matches!(result, Err(FastPtError::ConfigParse(_))));
    }

    #[test]
    fn test_default_curvatures() {
        let settings = FisherSettings::default();
        assert!(is_close!(
            settings.default_curvature(ParameterRole::Phase { unit: 0 }),
            16.0
        ));
        assert_eq!(
            settings.default_curvature(ParameterRole::Extrinsic),
            settings.eig_limit
        );
    }
}
