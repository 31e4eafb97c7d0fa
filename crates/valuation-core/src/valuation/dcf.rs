use serde::{Deserialize, Serialize};

use super::assumptions::{Stage, ValuationAssumptions};
use super::terminal::{terminal_value, TerminalInput};
use super::validation::validate;
use crate::config::EnginePolicy;
use crate::error::EngineError;
use crate::types::{Money, Rate, Ratio};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Projection for a single explicit-forecast year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionYear {
    pub year: u32,
    pub stage: Stage,
    pub revenue: Money,
    pub growth: Rate,
    pub ebit_margin: Rate,
    pub ebit: Money,
    pub nopat: Money,
    pub nwc_ratio: Rate,
    pub nwc: Money,
    /// Negative when working capital releases cash
    pub nwc_change: Money,
    pub sales_to_capital: Ratio,
    /// Incremental revenue / sales-to-capital, never negative
    pub capex: Money,
    /// capex + nwc_change
    pub reinvestment: Money,
    pub fcff: Money,
    pub discount_factor: Rate,
    pub pv_fcff: Money,
}

/// Output of a single DCF projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub projections: Vec<ProjectionYear>,
    /// Sum of discounted explicit-period FCFF
    pub pv_of_fcff: Money,
    /// Undiscounted terminal value
    pub terminal_value: Money,
    pub pv_of_terminal: Money,
    pub enterprise_value: Money,
    /// Enterprise value less net debt
    pub equity_value: Money,
    pub value_per_share: Money,
    /// PV(TV) / EV
    pub terminal_value_share: Rate,
    /// Terminal growth applied after any auto-adjustment
    pub terminal_growth_used: Rate,
    /// Set when the requested perpetuity growth was not below WACC
    #[serde(default)]
    pub terminal_growth_adjusted: bool,
    pub warnings: Vec<String>,
}

/// Scalar read from a [`ValuationResult`] by tornado and solver runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    PerShare,
    EnterpriseValue,
    EquityValue,
    TerminalValueShare,
}

impl Metric {
    pub fn of(self, result: &ValuationResult) -> f64 {
        match self {
            Metric::PerShare => result.value_per_share,
            Metric::EnterpriseValue => result.enterprise_value,
            Metric::EquityValue => result.equity_value,
            Metric::TerminalValueShare => result.terminal_value_share,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Project a three-stage FCFF DCF with the default policy.
pub fn project(assumptions: &ValuationAssumptions) -> ValuationResult {
    project_with_policy(assumptions, &EnginePolicy::default())
}

/// Project a three-stage FCFF DCF.
///
/// Pure and infallible: degenerate inputs are clamped (negative rates to
/// zero, sales-to-capital to the policy floor, terminal growth below WACC)
/// and reported through `warnings`.
pub fn project_with_policy(a: &ValuationAssumptions, policy: &EnginePolicy) -> ValuationResult {
    let mut warnings: Vec<String> = Vec::new();
    let n_years = a.horizon();
    let wacc = a.wacc.as_fraction();

    let projections = build_projections(a, n_years, wacc, policy, &mut warnings);
    let pv_of_fcff: Money = projections.iter().map(|p| p.pv_fcff).sum();
    let final_fcff = projections.last().map_or(0.0, |p| p.fcff);

    let tv = terminal_value(
        &TerminalInput {
            final_fcff,
            terminal_growth: a.terminal_growth.as_fraction(),
            wacc,
            method: a.terminal_method,
            years: n_years,
        },
        policy,
        &mut warnings,
    );

    let enterprise_value = pv_of_fcff + tv.present_value;
    let equity_value = enterprise_value - a.net_debt;
    let value_per_share = equity_value / a.shares_outstanding.max(1.0);

    let terminal_value_share = if enterprise_value == 0.0 {
        0.0
    } else {
        tv.present_value / enterprise_value
    };
    if terminal_value_share > policy.terminal_dominance_threshold {
        warnings.push(format!(
            "Terminal value represents {:.1}% of enterprise value; consider extending the explicit forecast period",
            terminal_value_share * 100.0
        ));
    }

    ValuationResult {
        projections,
        pv_of_fcff,
        terminal_value: tv.value,
        pv_of_terminal: tv.present_value,
        enterprise_value,
        equity_value,
        value_per_share,
        terminal_value_share,
        terminal_growth_used: tv.growth_used,
        terminal_growth_adjusted: tv.growth_adjusted,
        warnings,
    }
}

/// Validate first and only project when no issues are reported.
pub fn try_project(assumptions: &ValuationAssumptions) -> EngineResult<ValuationResult> {
    let issues = validate(assumptions);
    if !issues.is_empty() {
        return Err(EngineError::Validation { issues });
    }
    Ok(project(assumptions))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn build_projections(
    a: &ValuationAssumptions,
    n_years: u32,
    wacc: Rate,
    policy: &EnginePolicy,
    warnings: &mut Vec<String>,
) -> Vec<ProjectionYear> {
    let tax = a.tax_rate.as_fraction();
    let mut projections = Vec::with_capacity(n_years as usize);
    let mut prev_revenue = a.starting_revenue;
    let mut prev_nwc = a.starting_revenue * a.stage1.nwc_ratio.non_negative().as_fraction();
    let mut discount_factor = 1.0;

    for year in 1..=n_years {
        let stage = a.stage_for_year(year);
        let inputs = a.stage(stage);
        let growth = inputs.growth.non_negative().as_fraction();
        let ebit_margin = inputs.ebit_margin.non_negative().as_fraction();
        let nwc_ratio = inputs.nwc_ratio.non_negative().as_fraction();
        let sales_to_capital = a
            .stage_sales_to_capital(stage)
            .max(policy.min_sales_to_capital);

        let revenue = prev_revenue * (1.0 + growth);
        let ebit = revenue * ebit_margin;
        let nopat = ebit * (1.0 - tax);

        let nwc = revenue * nwc_ratio;
        let nwc_change = nwc - prev_nwc;
        if nwc_change < 0.0 && -nwc_change > policy.nwc_release_threshold * revenue {
            warnings.push(format!(
                "Large NWC cash release in year {year}: {:.1} ({:.1}% of revenue)",
                -nwc_change,
                -nwc_change / revenue * 100.0
            ));
        }

        let capex = ((revenue - prev_revenue) / sales_to_capital).max(0.0);
        let reinvestment = capex + nwc_change;
        let fcff = nopat - reinvestment;

        discount_factor /= 1.0 + wacc;
        let pv_fcff = fcff * discount_factor;

        projections.push(ProjectionYear {
            year,
            stage,
            revenue,
            growth,
            ebit_margin,
            ebit,
            nopat,
            nwc_ratio,
            nwc,
            nwc_change,
            sales_to_capital,
            capex,
            reinvestment,
            fcff,
            discount_factor,
            pv_fcff,
        });

        prev_revenue = revenue;
        prev_nwc = nwc;
    }

    projections
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
