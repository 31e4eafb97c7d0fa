use serde::{Deserialize, Serialize};

use super::assumptions::{Stage, TerminalMethod, ValuationAssumptions};

const MIN_YEARS: u32 = 3;
const MAX_YEARS: u32 = 15;
const WACC_RANGE: (f64, f64) = (0.02, 0.30);
const TERMINAL_GROWTH_RANGE: (f64, f64) = (-0.01, 0.08);
const TAX_RANGE: (f64, f64) = (0.0, 0.50);
const MIN_SALES_TO_CAPITAL: f64 = 0.1;

/// A caller-fixable problem with one assumption field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Pre-flight check of a set of assumptions. An empty list means the inputs
/// are acceptable; nothing here mutates or rejects at compute time.
pub fn validate(a: &ValuationAssumptions) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if !(a.starting_revenue.is_finite() && a.starting_revenue > 0.0) {
        issues.push(ValidationIssue::new(
            "starting_revenue",
            "Starting revenue must be a positive number",
        ));
    }

    if !(MIN_YEARS..=MAX_YEARS).contains(&a.years) {
        issues.push(ValidationIssue::new(
            "years",
            format!(
                "Projection years must be between {MIN_YEARS} and {MAX_YEARS} (got {})",
                a.years
            ),
        ));
    }

    let end1 = a.stage1.end_year;
    let end2 = a.stage2.end_year;
    if end1 == 0 || end1 >= end2 {
        issues.push(ValidationIssue::new(
            "stage1.end_year",
            format!("Stage 1 must end before stage 2 (stage 1 ends {end1}, stage 2 ends {end2})"),
        ));
    }
    if end2 > a.years {
        issues.push(ValidationIssue::new(
            "stage2.end_year",
            format!(
                "Stage 2 must end within the projection horizon ({end2} > {})",
                a.years
            ),
        ));
    }

    let wacc = a.wacc.as_fraction();
    check_range(&mut issues, "wacc", "WACC", wacc, WACC_RANGE);

    let g = a.terminal_growth.as_fraction();
    check_range(
        &mut issues,
        "terminal_growth",
        "Terminal growth",
        g,
        TERMINAL_GROWTH_RANGE,
    );
    if matches!(a.terminal_method, TerminalMethod::Perpetuity) && g >= wacc {
        issues.push(ValidationIssue::new(
            "terminal_growth",
            format!(
                "Terminal growth ({}) must be below WACC ({}) for the perpetuity method",
                a.terminal_growth, a.wacc
            ),
        ));
    }

    check_range(
        &mut issues,
        "tax_rate",
        "Tax rate",
        a.tax_rate.as_fraction(),
        TAX_RANGE,
    );

    if !(a.sales_to_capital >= MIN_SALES_TO_CAPITAL) {
        issues.push(ValidationIssue::new(
            "sales_to_capital",
            format!("Sales-to-capital must be at least {MIN_SALES_TO_CAPITAL}"),
        ));
    }
    for stage in Stage::ALL {
        if let Some(ratio) = a.stage(stage).sales_to_capital {
            if !(ratio >= MIN_SALES_TO_CAPITAL) {
                issues.push(ValidationIssue::new(
                    format!("{}.sales_to_capital", stage.label()),
                    format!("Sales-to-capital must be at least {MIN_SALES_TO_CAPITAL}"),
                ));
            }
        }
    }

    if let TerminalMethod::ExitMultiple { multiple } = a.terminal_method {
        if !(multiple.is_finite() && multiple > 0.0) {
            issues.push(ValidationIssue::new(
                "exit_multiple",
                "Exit multiple must be a positive number",
            ));
        }
    }

    issues
}

fn check_range(
    issues: &mut Vec<ValidationIssue>,
    field: &str,
    name: &str,
    value: f64,
    (lo, hi): (f64, f64),
) {
    if !(value >= lo && value <= hi) {
        issues.push(ValidationIssue::new(
            field,
            format!(
                "{name} must be between {:.1}% and {:.1}% (got {:.2}%)",
                lo * 100.0,
                hi * 100.0,
                value * 100.0
            ),
        ));
    }
}
