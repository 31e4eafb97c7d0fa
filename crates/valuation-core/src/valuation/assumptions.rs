use serde::{Deserialize, Serialize};

use crate::types::{Money, Percentage, Ratio};
use crate::EngineResult;

/// Hard ceiling on the projected horizon; validation is far stricter.
pub const MAX_HORIZON_YEARS: u32 = 100;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One of the three ramp stages of the explicit forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    One,
    Two,
    Three,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::One, Stage::Two, Stage::Three];

    pub fn index(self) -> usize {
        match self {
            Stage::One => 0,
            Stage::Two => 1,
            Stage::Three => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::One => "stage1",
            Stage::Two => "stage2",
            Stage::Three => "stage3",
        }
    }
}

/// Operating assumptions applied during one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAssumptions {
    /// Annual revenue growth
    pub growth: Percentage,
    /// EBIT as a share of revenue
    pub ebit_margin: Percentage,
    /// Incremental revenue per unit of incremental capital; falls back to the
    /// model-level ratio when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_to_capital: Option<Ratio>,
    /// Net working capital as a share of revenue
    #[serde(default)]
    pub nwc_ratio: Percentage,
    /// Last projection year (inclusive) of this stage. Stage three always
    /// runs to the horizon, so its boundary is informational.
    #[serde(default)]
    pub end_year: u32,
}

/// How the continuing value beyond the horizon is estimated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TerminalMethod {
    /// Gordon growth: TV = FCFF_N * (1+g) / (WACC - g)
    #[default]
    Perpetuity,
    /// TV = multiple * FCFF_N * (1+g)
    ExitMultiple { multiple: Ratio },
}

/// Inputs for one valuation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationAssumptions {
    /// Year-0 revenue
    pub starting_revenue: Money,
    /// Explicit forecast horizon in years
    pub years: u32,
    /// Discount rate
    pub wacc: Percentage,
    /// Perpetual growth after the horizon
    pub terminal_growth: Percentage,
    pub tax_rate: Percentage,
    pub shares_outstanding: f64,
    /// Debt minus cash, deducted from enterprise value
    pub net_debt: Money,
    /// Model-level sales-to-capital, used by stages without their own ratio
    pub sales_to_capital: Ratio,
    #[serde(default)]
    pub terminal_method: TerminalMethod,
    pub stage1: StageAssumptions,
    pub stage2: StageAssumptions,
    pub stage3: StageAssumptions,
}

impl Default for ValuationAssumptions {
    /// A five-year, three-stage base case.
    fn default() -> Self {
        ValuationAssumptions {
            starting_revenue: 1000.0,
            years: 5,
            wacc: Percentage::from_percent(10.0),
            terminal_growth: Percentage::from_percent(2.5),
            tax_rate: Percentage::from_percent(25.0),
            shares_outstanding: 100.0,
            net_debt: 200.0,
            sales_to_capital: 2.0,
            terminal_method: TerminalMethod::Perpetuity,
            stage1: StageAssumptions {
                growth: Percentage::from_percent(15.0),
                ebit_margin: Percentage::from_percent(20.0),
                sales_to_capital: Some(2.0),
                nwc_ratio: Percentage::from_percent(10.0),
                end_year: 2,
            },
            stage2: StageAssumptions {
                growth: Percentage::from_percent(10.0),
                ebit_margin: Percentage::from_percent(22.0),
                sales_to_capital: Some(2.5),
                nwc_ratio: Percentage::from_percent(10.0),
                end_year: 4,
            },
            stage3: StageAssumptions {
                growth: Percentage::from_percent(5.0),
                ebit_margin: Percentage::from_percent(24.0),
                sales_to_capital: Some(3.0),
                nwc_ratio: Percentage::from_percent(10.0),
                end_year: 5,
            },
        }
    }
}

impl ValuationAssumptions {
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn stage(&self, stage: Stage) -> &StageAssumptions {
        match stage {
            Stage::One => &self.stage1,
            Stage::Two => &self.stage2,
            Stage::Three => &self.stage3,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageAssumptions {
        match stage {
            Stage::One => &mut self.stage1,
            Stage::Two => &mut self.stage2,
            Stage::Three => &mut self.stage3,
        }
    }

    /// Projection horizon, clamped into `1..=MAX_HORIZON_YEARS`.
    pub fn horizon(&self) -> u32 {
        self.years.clamp(1, MAX_HORIZON_YEARS)
    }

    /// Stage boundaries clamped into `1..=horizon` and made non-decreasing.
    pub fn stage_bounds(&self) -> (u32, u32) {
        let n = self.horizon();
        let end1 = self.stage1.end_year.min(n);
        let end2 = self.stage2.end_year.clamp(end1, n);
        (end1, end2)
    }

    /// Stage in force during projection year `year` (1-based).
    pub fn stage_for_year(&self, year: u32) -> Stage {
        let (end1, end2) = self.stage_bounds();
        if year <= end1 {
            Stage::One
        } else if year <= end2 {
            Stage::Two
        } else {
            Stage::Three
        }
    }

    /// Sales-to-capital used by a stage before any floor is applied.
    pub fn stage_sales_to_capital(&self, stage: Stage) -> Ratio {
        self.stage(stage)
            .sales_to_capital
            .unwrap_or(self.sales_to_capital)
    }
}

// ---------------------------------------------------------------------------
// Addressable fields
// ---------------------------------------------------------------------------

/// A scalar assumption that sweeps, grids, tornado drivers and the solver can vary.
///
/// Values crossing this API are in display units: percentage points for
/// percent-denominated fields, raw numbers otherwise. Fields spanning all
/// stages read the stage-three value and write every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumptionField {
    StartingRevenue,
    Wacc,
    TerminalGrowth,
    TaxRate,
    SharesOutstanding,
    NetDebt,
    ExitMultiple,
    RevenueGrowth,
    EbitMargin,
    SalesToCapital,
    StageGrowth(Stage),
    StageMargin(Stage),
    StageSalesToCapital(Stage),
    StageNwcRatio(Stage),
}

impl AssumptionField {
    pub fn label(self) -> String {
        match self {
            AssumptionField::StartingRevenue => "starting_revenue".into(),
            AssumptionField::Wacc => "wacc".into(),
            AssumptionField::TerminalGrowth => "terminal_growth".into(),
            AssumptionField::TaxRate => "tax_rate".into(),
            AssumptionField::SharesOutstanding => "shares_outstanding".into(),
            AssumptionField::NetDebt => "net_debt".into(),
            AssumptionField::ExitMultiple => "exit_multiple".into(),
            AssumptionField::RevenueGrowth => "growth".into(),
            AssumptionField::EbitMargin => "ebit_margin".into(),
            AssumptionField::SalesToCapital => "sales_to_capital".into(),
            AssumptionField::StageGrowth(s) => format!("{}.growth", s.label()),
            AssumptionField::StageMargin(s) => format!("{}.ebit_margin", s.label()),
            AssumptionField::StageSalesToCapital(s) => format!("{}.sales_to_capital", s.label()),
            AssumptionField::StageNwcRatio(s) => format!("{}.nwc_ratio", s.label()),
        }
    }

    /// Whether display values are percentage points.
    pub fn is_percent(self) -> bool {
        matches!(
            self,
            AssumptionField::Wacc
                | AssumptionField::TerminalGrowth
                | AssumptionField::TaxRate
                | AssumptionField::RevenueGrowth
                | AssumptionField::EbitMargin
                | AssumptionField::StageGrowth(_)
                | AssumptionField::StageMargin(_)
                | AssumptionField::StageNwcRatio(_)
        )
    }

    /// Whether raising this field typically raises per-share value.
    pub fn raises_value(self) -> bool {
        !matches!(
            self,
            AssumptionField::Wacc
                | AssumptionField::TaxRate
                | AssumptionField::SharesOutstanding
                | AssumptionField::NetDebt
                | AssumptionField::StageNwcRatio(_)
        )
    }

    /// Current value in display units. `ExitMultiple` reads NaN under the
    /// perpetuity method.
    pub fn get(self, a: &ValuationAssumptions) -> f64 {
        match self {
            AssumptionField::StartingRevenue => a.starting_revenue,
            AssumptionField::Wacc => a.wacc.as_percent(),
            AssumptionField::TerminalGrowth => a.terminal_growth.as_percent(),
            AssumptionField::TaxRate => a.tax_rate.as_percent(),
            AssumptionField::SharesOutstanding => a.shares_outstanding,
            AssumptionField::NetDebt => a.net_debt,
            AssumptionField::ExitMultiple => match a.terminal_method {
                TerminalMethod::ExitMultiple { multiple } => multiple,
                TerminalMethod::Perpetuity => f64::NAN,
            },
            AssumptionField::RevenueGrowth => a.stage3.growth.as_percent(),
            AssumptionField::EbitMargin => a.stage3.ebit_margin.as_percent(),
            AssumptionField::SalesToCapital => a.stage_sales_to_capital(Stage::Three),
            AssumptionField::StageGrowth(s) => a.stage(s).growth.as_percent(),
            AssumptionField::StageMargin(s) => a.stage(s).ebit_margin.as_percent(),
            AssumptionField::StageSalesToCapital(s) => a.stage_sales_to_capital(s),
            AssumptionField::StageNwcRatio(s) => a.stage(s).nwc_ratio.as_percent(),
        }
    }

    /// Overwrite the field with a display-unit value.
    pub fn set(self, a: &mut ValuationAssumptions, value: f64) {
        match self {
            AssumptionField::StartingRevenue => a.starting_revenue = value,
            AssumptionField::Wacc => a.wacc = Percentage::from_percent(value),
            AssumptionField::TerminalGrowth => a.terminal_growth = Percentage::from_percent(value),
            AssumptionField::TaxRate => a.tax_rate = Percentage::from_percent(value),
            AssumptionField::SharesOutstanding => a.shares_outstanding = value,
            AssumptionField::NetDebt => a.net_debt = value,
            AssumptionField::ExitMultiple => {
                if let TerminalMethod::ExitMultiple { multiple } = &mut a.terminal_method {
                    *multiple = value;
                }
            }
            AssumptionField::RevenueGrowth => {
                for s in Stage::ALL {
                    a.stage_mut(s).growth = Percentage::from_percent(value);
                }
            }
            AssumptionField::EbitMargin => {
                for s in Stage::ALL {
                    a.stage_mut(s).ebit_margin = Percentage::from_percent(value);
                }
            }
            AssumptionField::SalesToCapital => {
                a.sales_to_capital = value;
                for s in Stage::ALL {
                    a.stage_mut(s).sales_to_capital = Some(value);
                }
            }
            AssumptionField::StageGrowth(s) => a.stage_mut(s).growth = Percentage::from_percent(value),
            AssumptionField::StageMargin(s) => {
                a.stage_mut(s).ebit_margin = Percentage::from_percent(value)
            }
            AssumptionField::StageSalesToCapital(s) => a.stage_mut(s).sales_to_capital = Some(value),
            AssumptionField::StageNwcRatio(s) => {
                a.stage_mut(s).nwc_ratio = Percentage::from_percent(value)
            }
        }
    }

    /// True when setting one field can overwrite what the other set: the same
    /// field, or an all-stages field and one of its per-stage counterparts.
    pub fn overlaps(self, other: AssumptionField) -> bool {
        use AssumptionField::*;
        match (self, other) {
            (a, b) if a == b => true,
            (RevenueGrowth, StageGrowth(_)) | (StageGrowth(_), RevenueGrowth) => true,
            (EbitMargin, StageMargin(_)) | (StageMargin(_), EbitMargin) => true,
            (SalesToCapital, StageSalesToCapital(_)) | (StageSalesToCapital(_), SalesToCapital) => true,
            _ => false,
        }
    }

    /// Copy of `a` with this field set to `value`.
    pub fn with_value(self, a: &ValuationAssumptions, value: f64) -> ValuationAssumptions {
        let mut out = a.clone();
        self.set(&mut out, value);
        out
    }

    /// Copy of `a` with `delta` (display units) added to this field. Fields
    /// spanning all stages shift every stage by the same amount.
    pub fn shifted(self, a: &ValuationAssumptions, delta: f64) -> ValuationAssumptions {
        let mut out = a.clone();
        match self {
            AssumptionField::RevenueGrowth => {
                for s in Stage::ALL {
                    let st = out.stage_mut(s);
                    st.growth = st.growth.offset_points(delta);
                }
            }
            AssumptionField::EbitMargin => {
                for s in Stage::ALL {
                    let st = out.stage_mut(s);
                    st.ebit_margin = st.ebit_margin.offset_points(delta);
                }
            }
            AssumptionField::SalesToCapital => {
                out.sales_to_capital += delta;
                for s in Stage::ALL {
                    let shifted = a.stage_sales_to_capital(s) + delta;
                    out.stage_mut(s).sales_to_capital = Some(shifted);
                }
            }
            field => field.set(&mut out, field.get(a) + delta),
        }
        out
    }
}
