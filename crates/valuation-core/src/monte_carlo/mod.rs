//! Seeded Monte Carlo simulation over the stage assumptions.

pub mod correlation;
pub mod rng;
pub mod simulation;

pub use simulation::{
    simulate, simulate_with_policy, HistogramBin, MonteCarloConfig, MonteCarloRun, MonteCarloSession, MonteCarloStats,
};
