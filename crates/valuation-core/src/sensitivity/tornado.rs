use serde::{Deserialize, Serialize};

use super::SensitivityToolkit;
use crate::valuation::{AssumptionField, Metric, ValuationAssumptions};

/// A driver perturbed by `± delta` (display units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TornadoDriver {
    pub field: AssumptionField,
    pub delta: f64,
}

/// Outcome of perturbing one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TornadoResult {
    pub field: AssumptionField,
    pub label: String,
    pub delta: f64,
    /// Metric with the driver lowered by `delta`
    pub value_at_minus: f64,
    /// Metric with the driver raised by `delta`
    pub value_at_plus: f64,
    pub low: f64,
    pub high: f64,
    pub swing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TornadoAnalysis {
    pub metric: Metric,
    pub baseline: f64,
    /// Largest swing first
    pub bars: Vec<TornadoResult>,
}

/// WACC ±1pp, terminal growth ±0.5pp, EBIT margin ±2pp, sales-to-capital ±0.25.
pub fn default_drivers() -> Vec<TornadoDriver> {
    vec![
        TornadoDriver { field: AssumptionField::Wacc, delta: 1.0 },
        TornadoDriver { field: AssumptionField::TerminalGrowth, delta: 0.5 },
        TornadoDriver { field: AssumptionField::EbitMargin, delta: 2.0 },
        TornadoDriver { field: AssumptionField::SalesToCapital, delta: 0.25 },
    ]
}

impl SensitivityToolkit {
    /// One-at-a-time ± perturbation of each driver around the base case.
    pub fn tornado(
        &self,
        base: &ValuationAssumptions,
        drivers: &[TornadoDriver],
        metric: Metric,
    ) -> TornadoAnalysis {
        let baseline = self.evaluate(base, metric);

        let mut bars: Vec<TornadoResult> = drivers
            .iter()
            .map(|d| {
                let value_at_minus = self.evaluate(&d.field.shifted(base, -d.delta), metric);
                let value_at_plus = self.evaluate(&d.field.shifted(base, d.delta), metric);
                let low = value_at_minus.min(value_at_plus);
                let high = value_at_minus.max(value_at_plus);
                TornadoResult {
                    field: d.field,
                    label: d.field.label(),
                    delta: d.delta,
                    value_at_minus,
                    value_at_plus,
                    low,
                    high,
                    swing: high - low,
                }
            })
            .collect();

        bars.sort_by(|a, b| rank(b.swing).total_cmp(&rank(a.swing)));

        TornadoAnalysis {
            metric,
            baseline,
            bars,
        }
    }
}

fn rank(swing: f64) -> f64 {
    if swing.is_nan() {
        f64::NEG_INFINITY
    } else {
        swing
    }
}
