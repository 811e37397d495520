use fastpt_core::ParameterLayout;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Accept and reject tallies for one chain slot.
///
/// There is one category per parameter, followed by the tempering swap
/// between this slot and the one above it, and the aggregate bucket for
/// whole-extrinsic jumps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCounts {
    accepted: Vec<u64>,
    rejected: Vec<u64>,
    n_params: usize,
}

impl AcceptanceCounts {
    pub fn new(n_params: usize) -> Self {
        Self {
            accepted: vec![0; n_params + 2],
            rejected: vec![0; n_params + 2],
            n_params,
        }
    }

    pub fn swap_category(&self) -> usize {
        self.n_params
    }

    pub fn extrinsic_category(&self) -> usize {
        self.n_params + 1
    }

    pub fn record(&mut self, category: usize, accepted: bool) {
        if accepted {
            self.accepted[category] += 1;
        } else {
            self.rejected[category] += 1;
        }
    }

    /// Record the same outcome for every parameter moved by a joint jump.
    pub fn record_many(&mut self, indices: &[usize], accepted: bool) {
        for &i in indices {
            self.record(i, accepted);
        }
    }

    pub fn record_swap(&mut self, accepted: bool) {
        self.record(self.swap_category(), accepted);
    }

    pub fn record_extrinsic(&mut self, accepted: bool) {
        self.record(self.extrinsic_category(), accepted);
    }

    pub fn accepted(&self, category: usize) -> u64 {
        self.accepted[category]
    }

    pub fn rejected(&self, category: usize) -> u64 {
        self.rejected[category]
    }

    /// Total accepts and rejects over a set of categories.
    pub fn totals(&self, categories: &[usize]) -> (u64, u64) {
        categories.iter().fold((0, 0), |(a, r), &c| {
            (a + self.accepted[c], r + self.rejected[c])
        })
    }

    pub fn reset(&mut self) {
        self.accepted.iter_mut().for_each(|c| *c = 0);
        self.rejected.iter_mut().for_each(|c| *c = 0);
    }
}

/// Acceptance summary across slots.
///
/// Rows are one per shared intrinsic parameter, then `distance`, `noise`,
/// `pt_swap` and `extrinsic`; columns are chain slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceTable {
    pub rows: Vec<String>,
    pub accepted: Array2<u64>,
    pub rejected: Array2<u64>,
}

impl AcceptanceTable {
    pub fn summarize(layout: &ParameterLayout, counts: &[&AcceptanceCounts]) -> Self {
        let mut groups: Vec<(String, Vec<usize>)> = layout
            .shared_intrinsic()
            .iter()
            .map(|&i| (layout.name(i).to_string(), vec![i]))
            .collect();
        groups.push(("distance".to_string(), layout.distances().to_vec()));
        groups.push(("noise".to_string(), layout.noise().to_vec()));
        let n = layout.len();
        groups.push(("pt_swap".to_string(), vec![n]));
        groups.push(("extrinsic".to_string(), vec![n + 1]));

        let mut accepted = Array2::zeros((groups.len(), counts.len()));
        let mut rejected = Array2::zeros((groups.len(), counts.len()));
        for (row, (_, categories)) in groups.iter().enumerate() {
            for (col, slot) in counts.iter().enumerate() {
                let (a, r) = slot.totals(categories);
                accepted[[row, col]] = a;
                rejected[[row, col]] = r;
            }
        }
        Self {
            rows: groups.into_iter().map(|(name, _)| name).collect(),
            accepted,
            rejected,
        }
    }

    /// Acceptance fraction per row and slot; NaN where nothing was tried.
    pub fn fractions(&self) -> Array2<f64> {
        let mut out = Array2::from_elem(self.accepted.dim(), f64::NAN);
        for ((idx, a), r) in self.accepted.indexed_iter().zip(self.rejected.iter()) {
            let total = a + r;
            if total > 0 {
                out[idx] = *a as f64 / total as f64;
            }
        }
        out
    }

    /// Acceptance fraction of a named row for one slot.
    pub fn fraction(&self, row: &str, slot: usize) -> Option<f64> {
        let r = self.rows.iter().position(|name| name == row)?;
        Some(self.fractions()[[r, slot]])
    }

    pub fn n_slots(&self) -> usize {
        self.accepted.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastpt_core::LayoutBuilder;

    fn layout() -> ParameterLayout {
        let mut builder = LayoutBuilder::new();
        builder
            .shared_intrinsic("f")
            .shared_intrinsic("mc")
            .extrinsic("h")
            .distance("d0", 0)
            .distance("d1", 1)
            .noise("n0", 0);
        builder.build().unwrap()
    }

    #[test]
    fn test_categories() {
        let mut counts = AcceptanceCounts::new(6);
        counts.record_swap(true);
        counts.record_extrinsic(false);
        counts.record_many(&[3, 4], true);
        assert_eq!(counts.accepted(6), 1);
        assert_eq!(counts.rejected(7), 1);
        assert_eq!(counts.totals(&[3, 4]), (2, 0));
        counts.reset();
        assert_eq!(counts.totals(&[0, 1, 2, 3, 4, 5, 6, 7]), (0, 0));
    }

    #[test]
    fn test_summary_table() {
        let layout = layout();
        let mut cold = AcceptanceCounts::new(layout.len());
        let mut hot = AcceptanceCounts::new(layout.len());
        cold.record(0, true);
        cold.record(0, false);
        cold.record_many(&[3, 4], false);
        cold.record_swap(true);
        hot.record_extrinsic(true);
        hot.record(5, true);

        let table = AcceptanceTable::summarize(&layout, &[&cold, &hot]);
        assert_eq!(
            table.rows,
            vec!["f", "mc", "distance", "noise", "pt_swap", "extrinsic"]
        );
        assert_eq!(table.n_slots(), 2);
        assert_eq!(table.fraction("f", 0), Some(0.5));
        assert!(table.fraction("mc", 0).unwrap().is_nan());
        assert_eq!(table.fraction("distance", 0), Some(0.0));
        assert_eq!(table.rejected[[2, 0]], 2);
        assert_eq!(table.fraction("pt_swap", 0), Some(1.0));
        assert_eq!(table.fraction("noise", 1), Some(1.0));
        assert_eq!(table.fraction("extrinsic", 1), Some(1.0));
        assert_eq!(table.fraction("missing", 0), None);
    }
}
