use serde::{Deserialize, Serialize};
use tracing::debug;

use super::assumptions::TerminalMethod;
use crate::config::EnginePolicy;
use crate::types::{Money, Rate};

/// Inputs for the continuing-value calculation.
#[derive(Debug, Clone, Copy)]
pub struct TerminalInput {
    /// FCFF of the final explicit year
    pub final_fcff: Money,
    pub terminal_growth: Rate,
    pub wacc: Rate,
    pub method: TerminalMethod,
    /// Discounting periods to the valuation date
    pub years: u32,
}

/// Continuing value and its present value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalValue {
    pub value: Money,
    pub present_value: Money,
    /// Growth actually applied (may be lower than requested)
    pub growth_used: Rate,
    pub growth_adjusted: bool,
}

/// Compute the terminal value and discount it to the valuation date.
///
/// Under the perpetuity method a growth rate at or above WACC is lowered to
/// `WACC - policy.terminal_growth_buffer` and a warning is appended; the
/// denominator is therefore always positive.
pub fn terminal_value(
    input: &TerminalInput,
    policy: &EnginePolicy,
    warnings: &mut Vec<String>,
) -> TerminalValue {
    let wacc = input.wacc;
    let mut g = input.terminal_growth;
    let mut growth_adjusted = false;

    let value = match input.method {
        TerminalMethod::Perpetuity => {
            if !(wacc > g) {
                let lowered = wacc - policy.terminal_growth_buffer;
                debug!(requested = g, used = lowered, wacc, "terminal growth lowered below WACC");
                warnings.push(format!(
                    "Terminal growth ({:.2}%) is not below WACC ({:.2}%); using {:.2}% instead",
                    g * 100.0,
                    wacc * 100.0,
                    lowered * 100.0
                ));
                g = lowered;
                growth_adjusted = true;
            }
            input.final_fcff * (1.0 + g) / (wacc - g)
        }
        TerminalMethod::ExitMultiple { multiple } => multiple * input.final_fcff * (1.0 + g),
    };

    let present_value = value / (1.0 + wacc).powi(input.years as i32);

    TerminalValue {
        value,
        present_value,
        growth_used: g,
        growth_adjusted,
    }
}
