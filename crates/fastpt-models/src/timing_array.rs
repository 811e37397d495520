//! Continuous-wave search over a pulsar timing array.
//!
//! Each pulsar contributes sufficient statistics `N_u` (a 4-vector) and
//! `M_u` (a 4x4 matrix) that depend only on the intrinsic parameters: the
//! shared sky position, frequency and chirp mass, the pulsar's distance and
//! its red-noise parameters. The extrinsic parameters enter through the
//! amplitude vector `a_u`, so
//!
//! ```text
//! log L = sum_u [ a_u . N_u - 1/2 a_u^T M_u a_u + c_u ]
//! ```
//!
//! is cheap to evaluate once the statistics are cached. The first two
//! components of each block belong to the Earth term, the last two to the
//! pulsar term; only the pulsar term depends on the pulsar distance.
//!
//! The response model is deliberately simplified: it keeps the dependency
//! structure of a real continuous-wave likelihood without its detail.

use crate::chirp::{
    chirp_mass_seconds, has_merged, orbital_angular_frequency, retarded_frequency, KPC_SECONDS,
    YEAR_SECONDS,
};
use fastpt_core::{
    FastPtResult, LayoutBuilder, LikelihoodAccelerator, ParameterLayout, ParameterState,
    PriorDistribution,
};
use indexmap::IndexMap;
use ndarray::{s, Array1, Array2, Array3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

const RED_NOISE_SCALE: f64 = YEAR_SECONDS * YEAR_SECONDS / (12.0 * PI * PI);

pub const COS_GWTHETA: &str = "0_cos_gwtheta";
pub const GWPHI: &str = "0_gwphi";
pub const LOG10_FGW: &str = "0_log10_fgw";
pub const LOG10_MC: &str = "0_log10_mc";
pub const COS_INC: &str = "0_cos_inc";
pub const LOG10_H: &str = "0_log10_h";
pub const PHASE0: &str = "0_phase0";
pub const PSI: &str = "0_psi";

/// One pulsar and its reduced timing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulsar {
    pub name: String,
    pub cos_theta: f64,
    pub phi: f64,
    pub distance_kpc: f64,
    pub distance_error_kpc: f64,
    pub n_toa: usize,
    /// White-noise standard deviation in seconds.
    pub white_sigma: f64,
    /// Observation span in seconds.
    pub span: f64,
    /// Mean squared timing residual in seconds squared.
    pub mean_square_residual: f64,
    /// Residuals projected on the unit-normalised Earth and pulsar filters.
    pub data: [f64; 4],
}

impl Pulsar {
    pub fn distance_name(&self) -> String {
        format!("{}_cw0_p_dist", self.name)
    }

    pub fn phase_name(&self) -> String {
        format!("{}_cw0_p_phase", self.name)
    }

    pub fn gamma_name(&self) -> String {
        format!("{}_red_noise_gamma", self.name)
    }

    pub fn log10_a_name(&self) -> String {
        format!("{}_red_noise_log10_A", self.name)
    }

    fn position(&self) -> [f64; 3] {
        let sin_theta = (1.0 - self.cos_theta * self.cos_theta).max(0.0).sqrt();
        [
            sin_theta * self.phi.cos(),
            sin_theta * self.phi.sin(),
            self.cos_theta,
        ]
    }
}

/// Parameters of a continuous-wave source plus common red noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CwSource {
    pub cos_gwtheta: f64,
    pub gwphi: f64,
    pub log10_fgw: f64,
    pub log10_mc: f64,
    pub cos_inc: f64,
    pub log10_h: f64,
    pub phase0: f64,
    pub psi: f64,
    pub gamma: f64,
    pub log10_a: f64,
}

impl Default for CwSource {
    fn default() -> Self {
        Self {
            cos_gwtheta: 0.3,
            gwphi: 1.8,
            log10_fgw: -7.9,
            log10_mc: 9.0,
            cos_inc: 0.5,
            log10_h: -14.7,
            phase0: 1.0,
            psi: 0.8,
            gamma: 13.0 / 3.0,
            log10_a: -14.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Shared {
    cos_gwtheta: f64,
    gwphi: f64,
    log10_fgw: f64,
    log10_mc: f64,
}

/// Statistics of one pulsar.
struct UnitStatistics {
    nn: [f64; 4],
    mm: [[f64; 4]; 4],
    noise_term: f64,
}

/// A set of pulsars observed between `t_ref` and `max_toa`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingArray {
    pub pulsars: Vec<Pulsar>,
    pub t_ref: f64,
    pub max_toa: f64,
}

impl TimingArray {
    /// Simulate `n_pulsars` pulsars observing `source`.
    ///
    /// Sky positions, distances and white-noise levels are drawn from a
    /// seeded generator. The projected data are the injected signal seen
    /// through the filter overlap, plus Gaussian noise at the injected noise
    /// level.
    pub fn synthetic(n_pulsars: usize, source: &CwSource, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let span = 10.0 * YEAR_SECONDS;
        let mut array = TimingArray {
            pulsars: Vec::with_capacity(n_pulsars),
            t_ref: 0.0,
            max_toa: span,
        };
        for u in 0..n_pulsars {
            let distance_kpc = rng.gen_range(0.5..3.0);
            array.pulsars.push(Pulsar {
                name: format!("psr{:02}", u),
                cos_theta: rng.gen_range(-1.0..1.0),
                phi: rng.gen_range(0.0..2.0 * PI),
                distance_kpc,
                distance_error_kpc: 0.1 * distance_kpc,
                n_toa: rng.gen_range(300..800),
                white_sigma: rng.gen_range(1e-7..5e-7),
                span,
                mean_square_residual: 0.0,
                data: [0.0; 4],
            });
        }

        let shared = Shared {
            cos_gwtheta: source.cos_gwtheta,
            gwphi: source.gwphi,
            log10_fgw: source.log10_fgw,
            log10_mc: source.log10_mc,
        };
        for u in 0..n_pulsars {
            let p_phase = rng.gen_range(0.0..2.0 * PI);
            let (filters, rho) = array.filters(u, &shared, 0.0);
            let amps = amplitudes(
                source.cos_inc,
                source.psi,
                source.phase0,
                p_phase,
                source.log10_h,
                orbital_angular_frequency(source.log10_fgw),
            );
            let sigma2 = array.noise_variance(u, source.log10_fgw, source.gamma, source.log10_a);
            let scatter = (sigma2 / array.pulsars[u].n_toa as f64).sqrt();
            let signal: Vec<f64> = (0..4).map(|k| filters[k] * amps[k]).collect();
            let pulsar = &mut array.pulsars[u];
            pulsar.mean_square_residual = sigma2;
            for k in 0..4 {
                let noise: f64 = rng.sample(StandardNormal);
                pulsar.data[k] = signal[k] + rho * signal[(k + 2) % 4] + scatter * noise;
            }
        }
        array
    }

    pub fn n_pulsars(&self) -> usize {
        self.pulsars.len()
    }

    /// Layout with the shared intrinsic block first, then the source's
    /// extrinsic parameters, then four parameters per pulsar.
    pub fn layout(&self) -> FastPtResult<ParameterLayout> {
        let mut builder = LayoutBuilder::new();
        builder
            .shared_intrinsic(COS_GWTHETA)
            .shared_intrinsic(GWPHI)
            .shared_intrinsic(LOG10_FGW)
            .shared_intrinsic(LOG10_MC)
            .extrinsic(COS_INC)
            .extrinsic(LOG10_H)
            .extrinsic(PHASE0)
            .extrinsic(PSI)
            .cosine_pair(COS_GWTHETA, GWPHI, PI, 2.0 * PI)
            .cosine_pair(COS_INC, PSI, PI / 2.0, PI)
            .periodic(PHASE0, 2.0 * PI);
        for (u, pulsar) in self.pulsars.iter().enumerate() {
            builder
                .distance(pulsar.distance_name(), u)
                .phase(pulsar.phase_name(), u)
                .noise(pulsar.gamma_name(), u)
                .noise(pulsar.log10_a_name(), u)
                .periodic(pulsar.phase_name(), 2.0 * PI);
        }
        builder.build()
    }

    pub fn priors(&self) -> IndexMap<String, PriorDistribution> {
        let mut priors = IndexMap::new();
        priors.insert(COS_GWTHETA.to_string(), PriorDistribution::uniform(-1.0, 1.0));
        priors.insert(GWPHI.to_string(), PriorDistribution::uniform(0.0, 2.0 * PI));
        priors.insert(
            LOG10_FGW.to_string(),
            PriorDistribution::uniform(3.5e-9f64.log10(), -7.0),
        );
        priors.insert(LOG10_MC.to_string(), PriorDistribution::uniform(7.0, 10.0));
        priors.insert(COS_INC.to_string(), PriorDistribution::uniform(-1.0, 1.0));
        priors.insert(LOG10_H.to_string(), PriorDistribution::uniform(-18.0, -11.0));
        priors.insert(PHASE0.to_string(), PriorDistribution::uniform(0.0, 2.0 * PI));
        priors.insert(PSI.to_string(), PriorDistribution::uniform(0.0, PI));
        for pulsar in &self.pulsars {
            priors.insert(pulsar.distance_name(), PriorDistribution::normal(0.0, 1.0));
            priors.insert(pulsar.phase_name(), PriorDistribution::uniform(0.0, 2.0 * PI));
            priors.insert(pulsar.gamma_name(), PriorDistribution::uniform(0.0, 7.0));
            priors.insert(pulsar.log10_a_name(), PriorDistribution::uniform(-20.0, -11.0));
        }
        priors
    }

    /// Parameter vector for `source` with zero distance offsets and phases.
    pub fn source_values(
        &self,
        layout: &ParameterLayout,
        source: &CwSource,
    ) -> FastPtResult<Vec<f64>> {
        let mut values = vec![0.0; layout.len()];
        for (name, value) in [
            (COS_GWTHETA, source.cos_gwtheta),
            (GWPHI, source.gwphi),
            (LOG10_FGW, source.log10_fgw),
            (LOG10_MC, source.log10_mc),
            (COS_INC, source.cos_inc),
            (LOG10_H, source.log10_h),
            (PHASE0, source.phase0),
            (PSI, source.psi),
        ] {
            values[layout.index_of(name)?] = value;
        }
        for pulsar in &self.pulsars {
            values[layout.index_of(&pulsar.gamma_name())?] = source.gamma;
            values[layout.index_of(&pulsar.log10_a_name())?] = source.log10_a;
        }
        Ok(values)
    }

    /// Earth and pulsar filter values and the overlap between the two terms.
    fn filters(&self, unit: usize, shared: &Shared, p_dist: f64) -> ([f64; 4], f64) {
        let pulsar = &self.pulsars[unit];
        let sin_theta = (1.0 - shared.cos_gwtheta * shared.cos_gwtheta)
            .max(0.0)
            .sqrt();
        let omega = [
            -sin_theta * shared.gwphi.cos(),
            -sin_theta * shared.gwphi.sin(),
            -shared.cos_gwtheta,
        ];
        let p = pulsar.position();
        let cos_mu = omega[0] * p[0] + omega[1] * p[1] + omega[2] * p[2];
        let response = 0.5 * (1.0 - cos_mu) + 0.05;

        let w0 = orbital_angular_frequency(shared.log10_fgw);
        let mc = chirp_mass_seconds(shared.log10_mc);
        let distance = (pulsar.distance_kpc + p_dist * pulsar.distance_error_kpc).max(0.0);
        let tau = distance * KPC_SECONDS * (1.0 - cos_mu);
        let w_p = retarded_frequency(w0, mc, tau);

        let beta_e = w0 * pulsar.span;
        let beta_p = w_p * pulsar.span;
        let evolution = (w0 / w_p).powf(1.0 / 3.0);
        let filters = [
            response * beta_e.cos(),
            response * beta_e.sin(),
            response * evolution * beta_p.cos(),
            response * evolution * beta_p.sin(),
        ];
        let detune = (w0 - w_p) * pulsar.span;
        (filters, 1.0 / (1.0 + detune * detune))
    }

    fn noise_variance(&self, unit: usize, log10_fgw: f64, gamma: f64, log10_a: f64) -> f64 {
        let pulsar = &self.pulsars[unit];
        let f_ratio = 10f64.powf(log10_fgw) * YEAR_SECONDS;
        pulsar.white_sigma.powi(2)
            + 10f64.powf(2.0 * log10_a) * f_ratio.powf(-gamma) * RED_NOISE_SCALE
    }

    fn unit_statistics(
        &self,
        unit: usize,
        shared: &Shared,
        p_dist: f64,
        gamma: f64,
        log10_a: f64,
    ) -> UnitStatistics {
        let pulsar = &self.pulsars[unit];
        let (f, rho) = self.filters(unit, shared, p_dist);
        let sigma2 = self.noise_variance(unit, shared.log10_fgw, gamma, log10_a);
        let n = pulsar.n_toa as f64;
        let weight = n / sigma2;

        // inner-product metric: Earth and pulsar components overlap by rho
        let mut metric = [[0.0; 4]; 4];
        for (k, row) in metric.iter_mut().enumerate() {
            row[k] = 1.0;
            row[(k + 2) % 4] = rho;
        }

        let mut nn = [0.0; 4];
        let mut mm = [[0.0; 4]; 4];
        for k in 0..4 {
            nn[k] = weight * f[k] * pulsar.data[k];
            for l in 0..4 {
                mm[k][l] = weight * f[k] * f[l] * metric[k][l];
            }
        }
        let noise_term = -0.5 * n * (pulsar.mean_square_residual / sigma2 + sigma2.ln());
        UnitStatistics {
            nn,
            mm,
            noise_term,
        }
    }
}

/// Earth and pulsar amplitude vector of one pulsar.
fn amplitudes(
    cos_inc: f64,
    psi: f64,
    phase0: f64,
    p_phase: f64,
    log10_h: f64,
    w0: f64,
) -> [f64; 4] {
    let amp = 10f64.powf(log10_h) / w0;
    let plus = 1.0 + cos_inc * cos_inc;
    let cross = 2.0 * cos_inc;
    let (s2, c2) = (2.0 * psi).sin_cos();
    let project = |phase: f64| {
        let (sp, cp) = phase.sin_cos();
        [
            0.5 * (plus * c2 * cp - cross * s2 * sp),
            0.5 * (plus * c2 * sp + cross * s2 * cp),
        ]
    };
    let earth = project(phase0);
    let psr = project(phase0 + p_phase);
    [
        amp * earth[0],
        amp * earth[1],
        -amp * psr[0],
        -amp * psr[1],
    ]
}

/// Resolved layout indices.
#[derive(Debug, Clone)]
struct ModelIndex {
    shared: [usize; 4],
    cos_inc: usize,
    log10_h: usize,
    phase0: usize,
    psi: usize,
    p_dist: Vec<usize>,
    p_phase: Vec<usize>,
    gamma: Vec<usize>,
    log10_a: Vec<usize>,
}

/// Every mutable field of the accelerator.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingArrayCache {
    nn: Array2<f64>,
    mm: Array3<f64>,
    noise_term: Array1<f64>,
    /// Shared intrinsic values the statistics were built for.
    tracked_shared: [f64; 4],
    tracked_distance: Vec<f64>,
    tracked_noise: Vec<[f64; 2]>,
}

impl TimingArrayCache {
    pub fn nn(&self) -> &Array2<f64> {
        &self.nn
    }

    pub fn mm(&self) -> &Array3<f64> {
        &self.mm
    }

    pub fn noise_term(&self) -> &Array1<f64> {
        &self.noise_term
    }
}

#[derive(Debug, Clone)]
pub struct TimingArrayAccelerator {
    array: Arc<TimingArray>,
    index: Arc<ModelIndex>,
    cache: TimingArrayCache,
}

impl TimingArrayAccelerator {
    /// Build an accelerator whose cache matches `state`.
    pub fn new(
        array: Arc<TimingArray>,
        layout: &ParameterLayout,
        state: &ParameterState,
    ) -> FastPtResult<Self> {
        let lookup = |name: &str| layout.index_of(name);
        let mut index = ModelIndex {
            shared: [
                lookup(COS_GWTHETA)?,
                lookup(GWPHI)?,
                lookup(LOG10_FGW)?,
                lookup(LOG10_MC)?,
            ],
            cos_inc: lookup(COS_INC)?,
            log10_h: lookup(LOG10_H)?,
            phase0: lookup(PHASE0)?,
            psi: lookup(PSI)?,
            p_dist: Vec::new(),
            p_phase: Vec::new(),
            gamma: Vec::new(),
            log10_a: Vec::new(),
        };
        for pulsar in &array.pulsars {
            index.p_dist.push(lookup(&pulsar.distance_name())?);
            index.p_phase.push(lookup(&pulsar.phase_name())?);
            index.gamma.push(lookup(&pulsar.gamma_name())?);
            index.log10_a.push(lookup(&pulsar.log10_a_name())?);
        }

        let n = array.n_pulsars();
        let mut acc = Self {
            array,
            index: Arc::new(index),
            cache: TimingArrayCache {
                nn: Array2::zeros((n, 4)),
                mm: Array3::zeros((n, 4, 4)),
                noise_term: Array1::zeros(n),
                tracked_shared: [0.0; 4],
                tracked_distance: vec![0.0; n],
                tracked_noise: vec![[0.0; 2]; n],
            },
        };
        acc.update_intrinsic(state);
        Ok(acc)
    }

    pub fn cache(&self) -> &TimingArrayCache {
        &self.cache
    }

    fn shared(&self, state: &ParameterState) -> Shared {
        let [a, b, c, d] = self.index.shared;
        Shared {
            cos_gwtheta: state.get(a),
            gwphi: state.get(b),
            log10_fgw: state.get(c),
            log10_mc: state.get(d),
        }
    }

    fn compute_unit(&self, state: &ParameterState, unit: usize) -> UnitStatistics {
        self.array.unit_statistics(
            unit,
            &self.shared(state),
            state.get(self.index.p_dist[unit]),
            state.get(self.index.gamma[unit]),
            state.get(self.index.log10_a[unit]),
        )
    }

    fn store_unit(&mut self, unit: usize, stats: &UnitStatistics) {
        for k in 0..4 {
            self.cache.nn[[unit, k]] = stats.nn[k];
            for l in 0..4 {
                self.cache.mm[[unit, k, l]] = stats.mm[k][l];
            }
        }
        self.cache.noise_term[unit] = stats.noise_term;
    }

    fn track_noise(&mut self, state: &ParameterState, unit: usize) {
        self.cache.tracked_noise[unit] = [
            state.get(self.index.gamma[unit]),
            state.get(self.index.log10_a[unit]),
        ];
    }
}

impl LikelihoodAccelerator for TimingArrayAccelerator {
    type Snapshot = TimingArrayCache;

    fn evaluate(&self, state: &ParameterState) -> f64 {
        let idx = &self.index;
        let w0 = orbital_angular_frequency(self.cache.tracked_shared[2]);
        let mut log_l = 0.0;
        for unit in 0..self.array.n_pulsars() {
            let a = amplitudes(
                state.get(idx.cos_inc),
                state.get(idx.psi),
                state.get(idx.phase0),
                state.get(idx.p_phase[unit]),
                state.get(idx.log10_h),
                w0,
            );
            let nn = self.cache.nn.row(unit);
            let mm = self.cache.mm.slice(s![unit, .., ..]);
            for k in 0..4 {
                log_l += a[k] * nn[k];
                for l in 0..4 {
                    log_l -= 0.5 * a[k] * mm[[k, l]] * a[l];
                }
            }
            log_l += self.cache.noise_term[unit];
        }
        log_l
    }

    fn update_intrinsic(&mut self, state: &ParameterState) {
        for unit in 0..self.array.n_pulsars() {
            let stats = self.compute_unit(state, unit);
            self.store_unit(unit, &stats);
            self.cache.tracked_distance[unit] = state.get(self.index.p_dist[unit]);
            self.track_noise(state, unit);
        }
        let [a, b, c, d] = self.index.shared;
        self.cache.tracked_shared = [state.get(a), state.get(b), state.get(c), state.get(d)];
    }

    /// Only the pulsar-term rows and columns depend on the distance.
    fn update_unit_distance(&mut self, state: &ParameterState, unit: usize) {
        let stats = self.compute_unit(state, unit);
        for k in 2..4 {
            self.cache.nn[[unit, k]] = stats.nn[k];
            for l in 0..4 {
                self.cache.mm[[unit, k, l]] = stats.mm[k][l];
                self.cache.mm[[unit, l, k]] = stats.mm[l][k];
            }
        }
        self.cache.tracked_distance[unit] = state.get(self.index.p_dist[unit]);
    }

    fn update_unit_noise(&mut self, state: &ParameterState, units: &[usize]) {
        for &unit in units {
            let stats = self.compute_unit(state, unit);
            self.store_unit(unit, &stats);
            self.track_noise(state, unit);
        }
    }

    fn snapshot(&self) -> TimingArrayCache {
        self.cache.clone()
    }

    fn restore(&mut self, snapshot: TimingArrayCache) {
        self.cache = snapshot;
    }

    fn isolate_unit(&mut self, unit: usize) {
        for other in (0..self.array.n_pulsars()).filter(|u| *u != unit) {
            self.cache.nn.row_mut(other).fill(0.0);
            self.cache.mm.slice_mut(s![other, .., ..]).fill(0.0);
        }
        self.cache.noise_term.fill(0.0);
        self.cache.nn.slice_mut(s![unit, 0..2]).fill(0.0);
        self.cache.mm.slice_mut(s![unit, 0..2, 0..2]).fill(0.0);
    }

    fn is_admissible(&self, state: &ParameterState) -> bool {
        let shared = self.shared(state);
        !has_merged(
            shared.log10_fgw,
            shared.log10_mc,
            self.array.t_ref,
            self.array.max_toa,
        )
    }

    fn is_synchronized(&self, state: &ParameterState) -> bool {
        let [a, b, c, d] = self.index.shared;
        let shared = [state.get(a), state.get(b), state.get(c), state.get(d)];
        shared == self.cache.tracked_shared
            && (0..self.array.n_pulsars()).all(|u| {
                self.cache.tracked_distance[u] == state.get(self.index.p_dist[u])
                    && self.cache.tracked_noise[u]
                        == [
                            state.get(self.index.gamma[u]),
                            state.get(self.index.log10_a[u]),
                        ]
            })
    }
}
