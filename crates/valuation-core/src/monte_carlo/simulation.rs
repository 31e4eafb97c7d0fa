use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::time::Instant;
use tracing::info;

use super::correlation::{Cholesky2, TrialShocks};
use super::rng::{resolve_seed, Mulberry32};
use crate::config::EnginePolicy;
use crate::control::{report_interval, CancellationToken, Progress, ProgressObserver};
use crate::error::EngineError;
use crate::valuation::{project_with_policy, Stage, ValuationAssumptions};
use crate::EngineResult;

const MIN_TRIALS: u32 = 100;
const MAX_TRIALS: u32 = 10_000;
const MAX_CORRELATION: f64 = 0.99;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration of a Monte Carlo valuation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of trials, 100..=10000
    #[serde(default = "default_trials")]
    pub trials: u32,
    /// Std-dev of additive growth shocks, in percentage points
    #[serde(default = "default_growth_vol")]
    pub growth_vol_pp: f64,
    /// Std-dev of additive EBIT-margin shocks, in percentage points
    #[serde(default = "default_margin_vol")]
    pub margin_vol_pp: f64,
    /// Relative std-dev of multiplicative sales-to-capital shocks
    #[serde(default = "default_sales_to_capital_vol")]
    pub sales_to_capital_vol: f64,
    /// Correlation between growth and margin shocks, -0.99..=0.99
    #[serde(default)]
    pub correlation: f64,
    /// Seed string for reproducible runs; entropy when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

fn default_trials() -> u32 {
    1_000
}

fn default_growth_vol() -> f64 {
    2.0
}

fn default_margin_vol() -> f64 {
    1.0
}

fn default_sales_to_capital_vol() -> f64 {
    0.10
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            trials: default_trials(),
            growth_vol_pp: default_growth_vol(),
            margin_vol_pp: default_margin_vol(),
            sales_to_capital_vol: default_sales_to_capital_vol(),
            correlation: 0.0,
            seed: None,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(MIN_TRIALS..=MAX_TRIALS).contains(&self.trials) {
            return Err(EngineError::InvalidInput {
                field: "trials".into(),
                reason: format!("Must be between {MIN_TRIALS} and {MAX_TRIALS}"),
            });
        }
        if !(self.correlation.abs() <= MAX_CORRELATION) {
            return Err(EngineError::InvalidInput {
                field: "correlation".into(),
                reason: format!("Must be between -{MAX_CORRELATION} and {MAX_CORRELATION}"),
            });
        }
        for (field, vol) in [
            ("growth_vol_pp", self.growth_vol_pp),
            ("margin_vol_pp", self.margin_vol_pp),
            ("sales_to_capital_vol", self.sales_to_capital_vol),
        ] {
            if !(vol.is_finite() && vol >= 0.0) {
                return Err(EngineError::InvalidInput {
                    field: field.into(),
                    reason: "Volatility must be a non-negative number".into(),
                });
            }
        }
        Ok(())
    }
}

/// Summary of a per-share outcome sample. NaN when the sample is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Output of a Monte Carlo valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloRun {
    pub config: MonteCarloConfig,
    /// Seed the generator actually started from
    pub resolved_seed: u32,
    pub requested_trials: usize,
    /// Finite per-share outcomes, ascending
    pub sample: Vec<f64>,
    pub stats: MonteCarloStats,
    /// Trials dropped because the outcome was not finite
    pub discarded: usize,
    /// True when the run stopped early on request
    pub cancelled: bool,
    pub elapsed_us: u64,
}

/// A single histogram bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

impl MonteCarloRun {
    /// Equal-width bins spanning the run's `min..=max`. A run whose outcomes
    /// are all equal gets a single bin; an empty run gets none.
    pub fn histogram(&self, bins: usize) -> Vec<HistogramBin> {
        bin_sorted(&self.sample, self.stats.min, self.stats.max, bins)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Resumable simulation: each `step` runs a bounded number of trials so a
/// caller-side scheduler can interleave other work.
#[derive(Debug)]
pub struct MonteCarloSession {
    base: ValuationAssumptions,
    config: MonteCarloConfig,
    policy: EnginePolicy,
    rng: Mulberry32,
    factor: Cholesky2,
    resolved_seed: u32,
    outcomes: Vec<f64>,
    total: usize,
    report_every: usize,
    cancelled: bool,
    started: Instant,
}

impl MonteCarloSession {
    pub fn new(base: &ValuationAssumptions, config: &MonteCarloConfig) -> EngineResult<Self> {
        config.validate()?;
        let policy = EnginePolicy::default();
        let resolved_seed = resolve_seed(config.seed.as_deref());
        let total = config.trials as usize;
        info!(seed = resolved_seed, trials = total, "starting Monte Carlo valuation");

        Ok(MonteCarloSession {
            base: base.clone(),
            config: config.clone(),
            report_every: report_interval(total, policy.progress_updates),
            policy,
            rng: Mulberry32::new(resolved_seed),
            factor: Cholesky2::new(config.correlation),
            resolved_seed,
            outcomes: Vec::with_capacity(total),
            total,
            cancelled: false,
            started: Instant::now(),
        })
    }

    pub fn with_policy(mut self, policy: EnginePolicy) -> Self {
        self.report_every = report_interval(self.total, policy.progress_updates);
        self.policy = policy;
        self
    }

    pub fn completed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_finished(&self) -> bool {
        self.cancelled || self.outcomes.len() >= self.total
    }

    /// Run up to `max_trials` trials. The cancellation flag is checked before
    /// every trial. Returns `true` once the run is finished or cancelled.
    pub fn step(
        &mut self,
        max_trials: usize,
        cancel: Option<&CancellationToken>,
        mut observer: Option<&mut dyn ProgressObserver>,
    ) -> bool {
        let mut ran = 0;
        while ran < max_trials && !self.is_finished() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!(completed = self.outcomes.len(), total = self.total, "Monte Carlo run cancelled");
                self.cancelled = true;
                break;
            }

            let outcome = self.run_trial();
            self.outcomes.push(outcome);
            ran += 1;

            let completed = self.outcomes.len();
            if completed % self.report_every == 0 || completed == self.total {
                if let Some(obs) = observer.as_deref_mut() {
                    obs.on_progress(&Progress {
                        completed,
                        total: self.total,
                        elapsed: self.started.elapsed(),
                    });
                }
            }
        }
        self.is_finished()
    }

    /// Close the session and summarise whatever sample was collected.
    pub fn finish(self) -> MonteCarloRun {
        let raw = self.outcomes.len();
        let mut sample: Vec<f64> = self.outcomes.into_iter().filter(|v| v.is_finite()).collect();
        sample.sort_by(f64::total_cmp);
        let stats = summarize(&sample);
        let elapsed_us = self.started.elapsed().as_micros() as u64;

        info!(
            seed = self.resolved_seed,
            trials = raw,
            cancelled = self.cancelled,
            mean = stats.mean,
            elapsed_us,
            "Monte Carlo valuation finished"
        );

        MonteCarloRun {
            config: self.config,
            resolved_seed: self.resolved_seed,
            requested_trials: self.total,
            discarded: raw - sample.len(),
            sample,
            stats,
            cancelled: self.cancelled,
            elapsed_us,
        }
    }

    fn run_trial(&mut self) -> f64 {
        let shocks = TrialShocks::draw(&mut self.rng, &self.factor);
        let mut trial = self.base.clone();
        for stage in Stage::ALL {
            let i = stage.index();
            let base_ratio = self.base.stage_sales_to_capital(stage);
            let st = trial.stage_mut(stage);
            st.growth = st
                .growth
                .offset_points(self.config.growth_vol_pp * shocks.growth[i]);
            st.ebit_margin = st
                .ebit_margin
                .offset_points(self.config.margin_vol_pp * shocks.margin[i]);
            let ratio = base_ratio * (1.0 + self.config.sales_to_capital_vol * shocks.sales_to_capital[i]);
            st.sales_to_capital = Some(ratio.max(self.policy.min_sales_to_capital));
        }
        project_with_policy(&trial, &self.policy).value_per_share
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a full Monte Carlo valuation in one call.
///
/// Each trial perturbs growth, margin and sales-to-capital in all three
/// stages and re-projects the DCF. A cancelled run returns the partial
/// sample with `cancelled` set.
pub fn simulate(
    base: &ValuationAssumptions,
    config: &MonteCarloConfig,
    cancel: Option<&CancellationToken>,
    observer: Option<&mut dyn ProgressObserver>,
) -> EngineResult<MonteCarloRun> {
    simulate_with_policy(base, config, &EnginePolicy::default(), cancel, observer)
}

/// [`simulate`] under a caller-supplied policy (sales-to-capital floor,
/// progress cadence and projector thresholds).
pub fn simulate_with_policy(
    base: &ValuationAssumptions,
    config: &MonteCarloConfig,
    policy: &EnginePolicy,
    cancel: Option<&CancellationToken>,
    observer: Option<&mut dyn ProgressObserver>,
) -> EngineResult<MonteCarloRun> {
    let mut session = MonteCarloSession::new(base, config)?.with_policy(policy.clone());
    session.step(usize::MAX, cancel, observer);
    Ok(session.finish())
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Walk a sorted sample once, cutting it at each upper edge.
fn bin_sorted(sorted: &[f64], lo: f64, hi: f64, bins: usize) -> Vec<HistogramBin> {
    if sorted.is_empty() || !(lo.is_finite() && hi.is_finite()) {
        return Vec::new();
    }
    let bins = if hi > lo { bins.max(1) } else { 1 };
    let width = (hi - lo) / bins as f64;
    let total = sorted.len() as f64;

    let mut rest = sorted;
    (0..bins)
        .map(|i| {
            let last = i + 1 == bins;
            let upper = if last { hi } else { lo + width * (i + 1) as f64 };
            let taken = if last {
                rest.len()
            } else {
                rest.partition_point(|&v| v < upper)
            };
            rest = &rest[taken..];
            HistogramBin {
                lower: lo + width * i as f64,
                upper,
                count: taken as u32,
                frequency: taken as f64 / total,
            }
        })
        .collect()
}

/// Value at fractional rank `p` of a sorted sample, by index.
fn percentile_by_index(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let idx = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn summarize(sorted: &[f64]) -> MonteCarloStats {
    MonteCarloStats {
        count: sorted.len(),
        mean: sorted.iter().mean(),
        median: percentile_by_index(sorted, 0.5),
        p10: percentile_by_index(sorted, 0.1),
        p90: percentile_by_index(sorted, 0.9),
        std_dev: match sorted.len() {
            0 => f64::NAN,
            1 => 0.0,
            _ => sorted.iter().std_dev(),
        },
        min: sorted.first().copied().unwrap_or(f64::NAN),
        max: sorted.last().copied().unwrap_or(f64::NAN),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::project;

    fn seeded(trials: u32) -> MonteCarloConfig {
        MonteCarloConfig {
            trials,
            seed: Some("unit".into()),
            ..MonteCarloConfig::default()
        }
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: MonteCarloConfig = serde_json::from_str(r#"{ "trials": 500 }"#).unwrap();
        assert_eq!(config.trials, 500);
        assert_eq!(config.growth_vol_pp, 2.0);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_trial_bounds() {
        let base = ValuationAssumptions::default();
        assert!(simulate(&base, &seeded(99), None, None).is_err());
        assert!(simulate(&base, &seeded(10_001), None, None).is_err());
    }

    #[test]
    fn test_correlation_bounds() {
        let mut config = seeded(100);
        config.correlation = 0.995;
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidInput { ref field, .. }) if field == "correlation"
        ));
    }

    #[test]
    fn test_negative_vol_rejected() {
        let mut config = seeded(100);
        config.margin_vol_pp = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_sorted_and_counted() {
        let run = simulate(&ValuationAssumptions::default(), &seeded(500), None, None).unwrap();
        assert_eq!(run.stats.count + run.discarded, 500);
        assert!(run.sample.windows(2).all(|w| w[0] <= w[1]));
        assert!(run.stats.p10 <= run.stats.median && run.stats.median <= run.stats.p90);
        assert!(!run.cancelled);
    }

    #[test]
    fn test_chunked_session_matches_single_call() {
        let base = ValuationAssumptions::default();
        let config = seeded(300);
        let whole = simulate(&base, &config, None, None).unwrap();

        let mut session = MonteCarloSession::new(&base, &config).unwrap();
        let mut calls = 0;
        while !session.step(37, None, None) {
            calls += 1;
        }
        assert!(calls >= 8);
        let chunked = session.finish();
        assert_eq!(whole.sample, chunked.sample);
    }

    #[test]
    fn test_progress_cadence() {
        let mut updates = Vec::new();
        let mut observer = |p: &Progress| updates.push(p.completed);
        simulate(
            &ValuationAssumptions::default(),
            &seeded(1000),
            None,
            Some(&mut observer),
        )
        .unwrap();
        assert_eq!(updates.len(), 20);
        assert_eq!(updates[0], 50);
        assert_eq!(*updates.last().unwrap(), 1000);
    }

    #[test]
    fn test_percentile_by_index() {
        let sorted: Vec<f64> = (0..10).map(f64::from).collect();
        assert_eq!(percentile_by_index(&sorted, 0.1), 1.0);
        assert_eq!(percentile_by_index(&sorted, 0.5), 5.0);
        assert_eq!(percentile_by_index(&sorted, 0.9), 9.0);
        assert!(percentile_by_index(&[], 0.5).is_nan());
    }

    #[test]
    fn test_empty_summary_is_nan() {
        let stats = summarize(&[]);
        assert_eq!(stats.count, 0);
        assert!(stats.mean.is_nan() && stats.median.is_nan());
    }

    #[test]
    fn test_histogram() {
        let sorted: Vec<f64> = (0..100).map(f64::from).collect();
        let bins = bin_sorted(&sorted, 0.0, 99.0, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins.iter().map(|b| b.count).sum::<u32>(), 100);
        assert!(bins.iter().all(|b| b.count == 10));
        assert_eq!(bins[9].upper, 99.0);
        assert!(bin_sorted(&[], f64::NAN, f64::NAN, 10).is_empty());
        let flat = bin_sorted(&[3.0, 3.0], 3.0, 3.0, 5);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].frequency, 1.0);
    }

    #[test]
    fn test_policy_floor_applies_to_trials() {
        let base = ValuationAssumptions::default();
        let config = MonteCarloConfig {
            trials: 200,
            sales_to_capital_vol: 0.0,
            growth_vol_pp: 0.0,
            margin_vol_pp: 0.0,
            seed: Some("floor".into()),
            ..MonteCarloConfig::default()
        };
        // A floor above every stage ratio pins the whole sample to one projection
        let policy = EnginePolicy {
            min_sales_to_capital: 5.0,
            ..EnginePolicy::default()
        };
        let run = simulate_with_policy(&base, &config, &policy, None, None).unwrap();
        let expected = project_with_policy(&base, &policy).value_per_share;
        assert!((run.stats.mean - expected).abs() < 1e-9);
        assert!(expected > project(&base).value_per_share);
    }

    #[test]
    fn test_policy_progress_cadence() {
        let base = ValuationAssumptions::default();
        let config = MonteCarloConfig {
            trials: 1_000,
            seed: Some("cadence".into()),
            ..MonteCarloConfig::default()
        };
        let policy = EnginePolicy {
            progress_updates: 4,
            ..EnginePolicy::default()
        };
        let mut seen = Vec::new();
        let mut observer = |p: &Progress| seen.push(p.completed);
        simulate_with_policy(&base, &config, &policy, None, Some(&mut observer)).unwrap();
        assert_eq!(seen, vec![250, 500, 750, 1_000]);
    }
}
