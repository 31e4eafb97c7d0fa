use serde::{Deserialize, Serialize};

use crate::types::{Rate, Ratio};
use crate::EngineResult;

/// Policy constants and tunables shared by the projector, the simulation
/// engine and the sensitivity toolkit.
///
/// Every field has a default, so a partial JSON document is enough to
/// override a single threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginePolicy {
    /// NWC cash release (fraction of that year's revenue) above which a warning is raised.
    #[serde(default = "default_nwc_release_threshold")]
    pub nwc_release_threshold: Rate,
    /// Share of enterprise value from the terminal value above which a warning is raised.
    #[serde(default = "default_terminal_dominance_threshold")]
    pub terminal_dominance_threshold: Rate,
    /// Gap kept between WACC and terminal growth when growth has to be lowered.
    #[serde(default = "default_terminal_growth_buffer")]
    pub terminal_growth_buffer: Rate,
    /// Decimal places kept when rounding values into grid cache keys.
    #[serde(default = "default_grid_key_decimals")]
    pub grid_key_decimals: u32,
    /// Maximum number of entries held by the grid cache.
    #[serde(default = "default_grid_cache_capacity")]
    pub grid_cache_capacity: usize,
    /// Target number of progress notifications over a full run.
    #[serde(default = "default_progress_updates")]
    pub progress_updates: usize,
    /// Floor applied to every sales-to-capital ratio.
    #[serde(default = "default_min_sales_to_capital")]
    pub min_sales_to_capital: Ratio,
}

fn default_nwc_release_threshold() -> Rate {
    0.05
}

fn default_terminal_dominance_threshold() -> Rate {
    0.85
}

fn default_terminal_growth_buffer() -> Rate {
    0.005
}

fn default_grid_key_decimals() -> u32 {
    3
}

fn default_grid_cache_capacity() -> usize {
    5_000
}

fn default_progress_updates() -> usize {
    20
}

fn default_min_sales_to_capital() -> Ratio {
    0.1
}

impl Default for EnginePolicy {
    fn default() -> Self {
        EnginePolicy {
            nwc_release_threshold: default_nwc_release_threshold(),
            terminal_dominance_threshold: default_terminal_dominance_threshold(),
            terminal_growth_buffer: default_terminal_growth_buffer(),
            grid_key_decimals: default_grid_key_decimals(),
            grid_cache_capacity: default_grid_cache_capacity(),
            progress_updates: default_progress_updates(),
            min_sales_to_capital: default_min_sales_to_capital(),
        }
    }
}

impl EnginePolicy {
    /// Parse a policy from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Scale factor used when rounding values into grid cache keys.
    pub fn grid_key_scale(&self) -> f64 {
        10f64.powi(self.grid_key_decimals as i32)
    }
}
