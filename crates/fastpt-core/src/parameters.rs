//! Parameter layouts and per-chain parameter state.
//!
//! Every parameter has exactly one [`ParameterRole`]. The roles fix the
//! partition into the expensive intrinsic set (shared intrinsic parameters,
//! per-unit distances and per-unit noise) and the cheap extrinsic set
//! (everything else, including per-unit phases). A [`ParameterLayout`] is
//! immutable once built and shared between chains through an `Arc`.

use crate::errors::{FastPtError, FastPtResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which cache a parameter feeds and how it is jumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ParameterRole {
    /// Sky position, frequency, chirp mass and similar; changing one forces a
    /// full recomputation of the cached statistics.
    SharedIntrinsic,
    Distance { unit: usize },
    Noise { unit: usize },
    /// Per-unit phase; extrinsic but tied to one unit.
    Phase { unit: usize },
    Extrinsic,
}

impl ParameterRole {
    pub fn is_intrinsic(&self) -> bool {
        matches!(
            self,
            ParameterRole::SharedIntrinsic
                | ParameterRole::Distance { .. }
                | ParameterRole::Noise { .. }
        )
    }

    pub fn unit(&self) -> Option<usize> {
        match self {
            ParameterRole::Distance { unit }
            | ParameterRole::Noise { unit }
            | ParameterRole::Phase { unit } => Some(*unit),
            _ => None,
        }
    }
}

/// A cosine coordinate paired with an angle.
///
/// When the cosine leaves [-1, 1] it is reflected back and the angle is
/// rotated by `rotation`; the angle is then reduced modulo `period`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CosinePair {
    pub cosine: usize,
    pub angle: usize,
    pub rotation: f64,
    pub period: f64,
}

/// An extrinsic coordinate wrapped modulo `period` after every jump.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodicCoordinate {
    pub index: usize,
    pub period: f64,
}

/// Builder for [`ParameterLayout`].
///
/// Parameters are stored in declaration order.
#[derive(Debug, Clone, Default)]
pub struct LayoutBuilder {
    entries: Vec<(String, ParameterRole)>,
    pairs: Vec<(String, String, f64, f64)>,
    periodic: Vec<(String, f64)>,
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameter(&mut self, name: impl Into<String>, role: ParameterRole) -> &mut Self {
        self.entries.push((name.into(), role));
        self
    }

    pub fn shared_intrinsic(&mut self, name: impl Into<String>) -> &mut Self {
        self.parameter(name, ParameterRole::SharedIntrinsic)
    }

    pub fn extrinsic(&mut self, name: impl Into<String>) -> &mut Self {
        self.parameter(name, ParameterRole::Extrinsic)
    }

    pub fn distance(&mut self, name: impl Into<String>, unit: usize) -> &mut Self {
        self.parameter(name, ParameterRole::Distance { unit })
    }

    pub fn phase(&mut self, name: impl Into<String>, unit: usize) -> &mut Self {
        self.parameter(name, ParameterRole::Phase { unit })
    }

    pub fn noise(&mut self, name: impl Into<String>, unit: usize) -> &mut Self {
        self.parameter(name, ParameterRole::Noise { unit })
    }

    /// Declare a cosine/angle pair. Both must be shared intrinsic or both
    /// extrinsic.
    pub fn cosine_pair(
        &mut self,
        cosine: impl Into<String>,
        angle: impl Into<String>,
        rotation: f64,
        period: f64,
    ) -> &mut Self {
        self.pairs
            .push((cosine.into(), angle.into(), rotation, period));
        self
    }

    /// Declare an extrinsic coordinate that wraps modulo `period`.
    pub fn periodic(&mut self, name: impl Into<String>, period: f64) -> &mut Self {
        self.periodic.push((name.into(), period));
        self
    }

    /// Validate the declarations and compute the index sets.
    ///
    /// The number of units is one more than the largest unit index used by
    /// any per-unit role.
    pub fn build(&self) -> FastPtResult<ParameterLayout> {
        let mut roles: IndexMap<String, ParameterRole> = IndexMap::new();
        for (name, role) in &self.entries {
            if roles.insert(name.clone(), *role).is_some() {
                return Err(FastPtError::DuplicateParameter(name.clone()));
            }
        }

        let n_units = roles
            .values()
            .filter_map(|role| role.unit())
            .max()
            .map_or(0, |u| u + 1);

        let mut layout = ParameterLayout {
            roles,
            n_units,
            shared_intrinsic: Vec::new(),
            distances: Vec::new(),
            distance_units: Vec::new(),
            phases: Vec::new(),
            noise: Vec::new(),
            noise_by_unit: vec![Vec::new(); n_units],
            extrinsic: Vec::new(),
            intrinsic: Vec::new(),
            extrinsic_pairs: Vec::new(),
            intrinsic_pairs: Vec::new(),
            periodic: Vec::new(),
        };

        let mut distances: Vec<(usize, usize)> = Vec::new();
        for (idx, role) in layout.roles.values().enumerate() {
            match role {
                ParameterRole::SharedIntrinsic => layout.shared_intrinsic.push(idx),
                ParameterRole::Distance { unit } => distances.push((*unit, idx)),
                ParameterRole::Noise { unit } => {
                    layout.noise.push(idx);
                    layout.noise_by_unit[*unit].push(idx);
                }
                ParameterRole::Phase { .. } => layout.phases.push(idx),
                ParameterRole::Extrinsic => {}
            }
            if role.is_intrinsic() {
                layout.intrinsic.push(idx);
            } else {
                layout.extrinsic.push(idx);
            }
        }

        distances.sort_unstable();
        for pair in distances.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(FastPtError::DuplicateParameter(format!(
                    "distance of unit {}",
                    pair[0].0
                )));
            }
        }
        layout.distance_units = distances.iter().map(|(unit, _)| *unit).collect();
        layout.distances = distances.iter().map(|(_, idx)| *idx).collect();

        for (cosine, angle, rotation, period) in &self.pairs {
            let ci = layout.index_of(cosine)?;
            let ai = layout.index_of(angle)?;
            let pair = CosinePair {
                cosine: ci,
                angle: ai,
                rotation: *rotation,
                period: *period,
            };
            match (layout.role(ci), layout.role(ai)) {
                (ParameterRole::SharedIntrinsic, ParameterRole::SharedIntrinsic) => {
                    layout.intrinsic_pairs.push(pair)
                }
                (a, b) if !a.is_intrinsic() && !b.is_intrinsic() => {
                    layout.extrinsic_pairs.push(pair)
                }
                _ => {
                    return Err(FastPtError::MixedPair {
                        first: cosine.clone(),
                        second: angle.clone(),
                    })
                }
            }
        }

        for (name, period) in &self.periodic {
            let index = layout.index_of(name)?;
            if layout.role(index).is_intrinsic() {
                return Err(FastPtError::IntrinsicPeriodic(name.clone()));
            }
            layout.periodic.push(PeriodicCoordinate {
                index,
                period: *period,
            });
        }

        Ok(layout)
    }
}

/// Immutable description of the parameter vector and its index sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterLayout {
    roles: IndexMap<String, ParameterRole>,
    n_units: usize,
    shared_intrinsic: Vec<usize>,
    distances: Vec<usize>,
    distance_units: Vec<usize>,
    phases: Vec<usize>,
    noise: Vec<usize>,
    noise_by_unit: Vec<Vec<usize>>,
    extrinsic: Vec<usize>,
    intrinsic: Vec<usize>,
    extrinsic_pairs: Vec<CosinePair>,
    intrinsic_pairs: Vec<CosinePair>,
    periodic: Vec<PeriodicCoordinate>,
}

impl ParameterLayout {
    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn n_units(&self) -> usize {
        self.n_units
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn name(&self, index: usize) -> &str {
        self.roles
            .get_index(index)
            .map(|(name, _)| name.as_str())
            .unwrap_or("")
    }

    pub fn role(&self, index: usize) -> ParameterRole {
        self.roles[index]
    }

    pub fn index_of(&self, name: &str) -> FastPtResult<usize> {
        self.roles
            .get_index_of(name)
            .ok_or_else(|| FastPtError::UnknownParameter(name.to_string()))
    }

    pub fn shared_intrinsic(&self) -> &[usize] {
        &self.shared_intrinsic
    }

    /// Distance indices ordered by unit.
    pub fn distances(&self) -> &[usize] {
        &self.distances
    }

    /// Unit owning each entry of [`Self::distances`].
    pub fn distance_units(&self) -> &[usize] {
        &self.distance_units
    }

    pub fn phases(&self) -> &[usize] {
        &self.phases
    }

    pub fn noise(&self) -> &[usize] {
        &self.noise
    }

    pub fn noise_of_unit(&self, unit: usize) -> &[usize] {
        self.noise_by_unit
            .get(unit)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Units that own at least one noise parameter.
    pub fn noise_units(&self) -> Vec<usize> {
        (0..self.n_units)
            .filter(|u| !self.noise_by_unit[*u].is_empty())
            .collect()
    }

    /// Everything outside the intrinsic set, including per-unit phases.
    pub fn extrinsic(&self) -> &[usize] {
        &self.extrinsic
    }

    pub fn intrinsic(&self) -> &[usize] {
        &self.intrinsic
    }

    pub fn extrinsic_pairs(&self) -> &[CosinePair] {
        &self.extrinsic_pairs
    }

    pub fn intrinsic_pairs(&self) -> &[CosinePair] {
        &self.intrinsic_pairs
    }

    pub fn periodic(&self) -> &[PeriodicCoordinate] {
        &self.periodic
    }
}

/// The mutable parameter vector owned by one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterState {
    layout: Arc<ParameterLayout>,
    values: Vec<f64>,
}

impl ParameterState {
    pub fn new(layout: Arc<ParameterLayout>, values: Vec<f64>) -> FastPtResult<Self> {
        if values.len() != layout.len() {
            return Err(FastPtError::DimensionMismatch {
                expected: layout.len(),
                got: values.len(),
            });
        }
        Ok(Self { layout, values })
    }

    pub fn layout(&self) -> &Arc<ParameterLayout> {
        &self.layout
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn set(&mut self, index: usize, value: f64) {
        self.values[index] = value;
    }

    pub fn value(&self, name: &str) -> FastPtResult<f64> {
        Ok(self.values[self.layout.index_of(name)?])
    }

    pub fn set_value(&mut self, name: &str, value: f64) -> FastPtResult<()> {
        let index = self.layout.index_of(name)?;
        self.values[index] = value;
        Ok(())
    }

    /// Overwrite every value from a slice of the same dimension.
    ///
    /// # Panics
    ///
    /// Panics if `values` has the wrong length.
    pub fn assign_from(&mut self, values: &[f64]) {
        self.values.copy_from_slice(values);
    }
}
