use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::SensitivityToolkit;
use crate::valuation::{project_with_policy, AssumptionField, Metric, ValuationAssumptions};

const DEFAULT_MAX_ITERATIONS: usize = 60;
const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Find the value of `field` (display units, within `[low, high]`) at which
/// `metric` equals `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRequest {
    pub field: AssumptionField,
    #[serde(default)]
    pub metric: Metric,
    pub target: f64,
    pub low: f64,
    pub high: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl SolveRequest {
    pub fn new(field: AssumptionField, metric: Metric, target: f64, low: f64, high: f64) -> Self {
        SolveRequest {
            field,
            metric,
            target,
            low,
            high,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveIteration {
    pub iteration: usize,
    pub low: f64,
    pub high: f64,
    pub candidate: f64,
    /// NaN when the candidate was infeasible
    pub metric_value: f64,
    pub diff: f64,
}

/// Best candidate found. `converged` is false when the tolerance was never
/// reached, e.g. the bounds do not bracket the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub value: f64,
    pub achieved: f64,
    pub diff: f64,
    pub converged: bool,
    pub iterations: Vec<SolveIteration>,
}

impl SensitivityToolkit {
    /// Bisection on a metric assumed monotonic in the field.
    ///
    /// The direction is read from the endpoint evaluations, falling back to
    /// [`AssumptionField::raises_value`] when an endpoint is not finite.
    /// Candidates where perpetuity growth is not below WACC count as
    /// infeasible (NaN) and shrink the bracket from that side.
    pub fn solve(&self, base: &ValuationAssumptions, request: &SolveRequest) -> SolveOutcome {
        let eval = |x: f64| self.evaluate_feasible(&request.field.with_value(base, x), request.metric);

        let (mut lo, mut hi) = if request.low <= request.high {
            (request.low, request.high)
        } else {
            (request.high, request.low)
        };
        let f_lo = eval(lo);
        let f_hi = eval(hi);

        let increasing = if f_lo.is_finite() && f_hi.is_finite() {
            f_hi >= f_lo
        } else {
            request.field.raises_value()
        };
        // Side that produced a non-finite metric, if any
        let hi_infeasible = !f_hi.is_finite() && f_lo.is_finite();

        let bracketed = f_lo.is_finite()
            && f_hi.is_finite()
            && (f_lo - request.target) * (f_hi - request.target) <= 0.0;
        if !bracketed {
            warn!(
                field = %request.field.label(),
                target = request.target,
                f_lo,
                f_hi,
                "solver bounds do not bracket the target"
            );
        }

        let mut best: Option<(f64, f64)> = None;
        let consider = |x: f64, fx: f64, best: &mut Option<(f64, f64)>| {
            if fx.is_finite() {
                let better = match best {
                    Some((_, fb)) => (fx - request.target).abs() < (*fb - request.target).abs(),
                    None => true,
                };
                if better {
                    *best = Some((x, fx));
                }
            }
        };
        consider(lo, f_lo, &mut best);
        consider(hi, f_hi, &mut best);

        let mut iterations = Vec::new();
        let within = |b: &Option<(f64, f64)>| {
            b.is_some_and(|(_, fb)| (fb - request.target).abs() < request.tolerance)
        };

        let mut iteration = 0;
        while iteration < request.max_iterations && !within(&best) {
            iteration += 1;
            let mid = lo + (hi - lo) / 2.0;
            let f_mid = eval(mid);
            let diff = f_mid - request.target;

            iterations.push(SolveIteration {
                iteration,
                low: lo,
                high: hi,
                candidate: mid,
                metric_value: f_mid,
                diff,
            });
            debug!(iteration, candidate = mid, metric = f_mid, diff, "bisection step");

            if !f_mid.is_finite() {
                if hi_infeasible {
                    hi = mid;
                } else {
                    lo = mid;
                }
                continue;
            }

            consider(mid, f_mid, &mut best);
            if (diff < 0.0) == increasing {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let converged = within(&best);
        let (value, achieved) = best.unwrap_or((lo + (hi - lo) / 2.0, f64::NAN));
        SolveOutcome {
            value,
            achieved,
            diff: achieved - request.target,
            converged,
            iterations,
        }
    }
}

impl SensitivityToolkit {
    /// Metric value, or NaN when the projector had to lower terminal growth
    /// below WACC to produce it.
    fn evaluate_feasible(&self, assumptions: &ValuationAssumptions, metric: Metric) -> f64 {
        let result = project_with_policy(assumptions, &self.policy);
        if result.terminal_growth_adjusted {
            f64::NAN
        } else {
            metric.of(&result)
        }
    }
}
