//! Sweeps, cached 2D grids, tornado decompositions and bisection solving
//! over the DCF projector.

pub mod cache;
pub mod grid;
pub mod solver;
pub mod sweep;
pub mod tornado;

use crate::config::EnginePolicy;
use crate::valuation::{project_with_policy, Metric, ValuationAssumptions};

pub use cache::{CacheStats, GridCache, GridKey};
pub use grid::{GridAxis, GridRow, GridRows, SensitivityGrid};
pub use solver::{SolveIteration, SolveOutcome, SolveRequest};
pub use sweep::SweepPoint;
pub use tornado::{default_drivers, TornadoAnalysis, TornadoDriver, TornadoResult};

/// Owner of the grid cache and the policy used by every sensitivity run.
///
/// The cache is the only state kept between calls; build one toolkit per
/// isolated workload or call [`SensitivityToolkit::reset_cache`].
#[derive(Debug)]
pub struct SensitivityToolkit {
    cache: GridCache,
    policy: EnginePolicy,
}

impl Default for SensitivityToolkit {
    fn default() -> Self {
        Self::new(EnginePolicy::default())
    }
}

impl SensitivityToolkit {
    pub fn new(policy: EnginePolicy) -> Self {
        SensitivityToolkit {
            cache: GridCache::new(policy.grid_cache_capacity),
            policy,
        }
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    pub fn cache(&self) -> &GridCache {
        &self.cache
    }

    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }

    fn evaluate(&self, assumptions: &ValuationAssumptions, metric: Metric) -> f64 {
        metric.of(&project_with_policy(assumptions, &self.policy))
    }
}

/// `steps + 1` evenly spaced points from `min` to `max`; zero steps count as one.
pub(crate) fn linspace(min: f64, max: f64, steps: usize) -> Vec<f64> {
    let steps = steps.max(1);
    let width = (max - min) / steps as f64;
    (0..=steps)
        .map(|i| if i == steps { max } else { min + width * i as f64 })
        .collect()
}
