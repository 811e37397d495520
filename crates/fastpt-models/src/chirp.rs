//! Leading-order chirp evolution of a circular binary.

use std::f64::consts::PI;

/// Solar mass in seconds (G M_sun / c^3).
pub const T_SUN: f64 = 4.925_490_947e-6;
/// One kiloparsec in light-seconds.
pub const KPC_SECONDS: f64 = 1.029_271_250_3e11;
pub const YEAR_SECONDS: f64 = 365.25 * 86400.0;

/// Chirp mass in seconds from `log10` solar masses.
pub fn chirp_mass_seconds(log10_mc: f64) -> f64 {
    10f64.powf(log10_mc) * T_SUN
}

/// Angular orbital frequency `pi * f_gw`.
pub fn orbital_angular_frequency(log10_fgw: f64) -> f64 {
    PI * 10f64.powf(log10_fgw)
}

/// `256/5 Mc^(5/3) w0^(8/3)`, the rate at which `w^(-8/3)` decreases.
fn chirp_rate(mc_s: f64, w0: f64) -> f64 {
    256.0 / 5.0 * mc_s.powf(5.0 / 3.0) * w0.powf(8.0 / 3.0)
}

/// Whether a binary seen at `log10_fgw` at `t_ref` has merged before
/// `t_last`.
pub fn has_merged(log10_fgw: f64, log10_mc: f64, t_ref: f64, t_last: f64) -> bool {
    let mc_s = chirp_mass_seconds(log10_mc);
    let w0 = orbital_angular_frequency(log10_fgw);
    1.0 - chirp_rate(mc_s, w0) * (t_last - t_ref) < 0.0
}

/// Orbital angular frequency a time `tau` before the reference time.
pub fn retarded_frequency(w0: f64, mc_s: f64, tau: f64) -> f64 {
    w0 * (1.0 + chirp_rate(mc_s, w0) * tau).powf(-3.0 / 8.0)
}
