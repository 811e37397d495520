use crate::errors::{FastPtError, FastPtResult};
use serde::{Deserialize, Serialize};

/// Increasing list of chain temperatures starting at 1.0.
///
/// Slot 0 is the cold chain whose samples are the output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureLadder {
    temperatures: Vec<f64>,
}

impl TemperatureLadder {
    /// Geometric ladder from 1.0 to `t_max`: `T_k = c^k` with
    /// `c = t_max^(1 / (n_chain - 1))`.
    ///
    /// A single chain always runs at 1.0.
    pub fn geometric(n_chain: usize, t_max: f64) -> FastPtResult<Self> {
        if n_chain == 0 {
            return Err(FastPtError::Configuration(
                "a temperature ladder needs at least one chain".to_string(),
            ));
        }
        if !(t_max.is_finite() && t_max >= 1.0) {
            return Err(FastPtError::Configuration(format!(
                "t_max must be finite and >= 1, got {}",
                t_max
            )));
        }
        if n_chain == 1 {
            return Ok(Self {
                temperatures: vec![1.0],
            });
        }

        let c = t_max.powf(1.0 / (n_chain - 1) as f64);
        let mut temperatures: Vec<f64> = (0..n_chain).map(|k| c.powi(k as i32)).collect();
        // pin the ends exactly
        temperatures[0] = 1.0;
        temperatures[n_chain - 1] = t_max;
        Ok(Self { temperatures })
    }

    /// Ladder from explicit temperatures, which must start at 1.0 and be
    /// non-decreasing.
    pub fn from_temperatures(temperatures: Vec<f64>) -> FastPtResult<Self> {
        match temperatures.first() {
            Some(t) if *t == 1.0 => {}
            _ => {
                return Err(FastPtError::Configuration(
                    "the first temperature must be exactly 1.0".to_string(),
                ))
            }
        }
        if temperatures
            .windows(2)
            .any(|w| !(w[1].is_finite() && w[1] >= w[0]))
        {
            return Err(FastPtError::Configuration(
                "temperatures must be finite and non-decreasing".to_string(),
            ));
        }
        Ok(Self { temperatures })
    }

    pub fn len(&self) -> usize {
        self.temperatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temperatures.is_empty()
    }

    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    pub fn get(&self, slot: usize) -> f64 {
        self.temperatures[slot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn test_geometric_ladder() {
        let ladder = TemperatureLadder::geometric(4, 3.0).unwrap();
        assert_eq!(ladder.len(), 4);
        assert_eq!(ladder.get(0), 1.0);
        assert!(is_close!(ladder.get(1), 3.0_f64.powf(1.0 / 3.0)));
        assert!(is_close!(ladder.get(2), 3.0_f64.powf(2.0 / 3.0)));
        assert_eq!(ladder.get(3), 3.0);
    }

    #[test]
    fn test_ratio_is_constant() {
        let ladder = TemperatureLadder::geometric(6, 10.0).unwrap();
        let t = ladder.temperatures();
        let c = t[1] / t[0];
        for w in t.windows(2) {
            assert!(is_close!(w[1] / w[0], c));
        }
    }

    #[test]
    fn test_single_chain() {
        let ladder = TemperatureLadder::geometric(1, 5.0).unwrap();
        assert_eq!(ladder.temperatures(), &[1.0]);
    }

    #[test]
    fn test_invalid_ladders() {
        assert!(TemperatureLadder::geometric(0, 3.0).is_err());
        assert!(TemperatureLadder::geometric(3, 0.5).is_err());
        assert!(TemperatureLadder::geometric(3, f64::NAN).is_err());
        assert!(TemperatureLadder::from_temperatures(vec![2.0, 3.0]).is_err());
        assert!(TemperatureLadder::from_temperatures(vec![1.0, 3.0, 2.0]).is_err());
        assert!(TemperatureLadder::from_temperatures(vec![]).is_err());
        assert!(TemperatureLadder::from_temperatures(vec![1.0, 1.0, 4.0]).is_ok());
    }
}
