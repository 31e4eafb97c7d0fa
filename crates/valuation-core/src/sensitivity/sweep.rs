use serde::{Deserialize, Serialize};

use super::{linspace, SensitivityToolkit};
use crate::valuation::{AssumptionField, Metric, ValuationAssumptions};

/// One point of a 1D sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// Axis value in display units
    pub value: f64,
    pub per_share: f64,
}

impl SensitivityToolkit {
    /// Per-share value at `steps + 1` evenly spaced values of `field`
    /// between `min` and `max` (display units). Bypasses the grid cache.
    pub fn sweep_1d(
        &self,
        base: &ValuationAssumptions,
        field: AssumptionField,
        min: f64,
        max: f64,
        steps: usize,
    ) -> Vec<SweepPoint> {
        linspace(min, max, steps)
            .into_iter()
            .map(|value| SweepPoint {
                value,
                per_share: self.evaluate(&field.with_value(base, value), Metric::PerShare),
            })
            .collect()
    }
}
