#![cfg(feature = "sensitivity")]

use pretty_assertions::assert_eq;
use valuation_core::sensitivity::{
    default_drivers, GridAxis, SensitivityToolkit, SolveRequest, TornadoDriver,
};
use valuation_core::valuation::{project, AssumptionField, Metric, ValuationAssumptions};
use valuation_core::EnginePolicy;

fn axes() -> (GridAxis, GridAxis) {
    (
        GridAxis::new(AssumptionField::Wacc, 7.0, 13.0),
        GridAxis::new(AssumptionField::EbitMargin, 18.0, 30.0),
    )
}

fn direct(base: &ValuationAssumptions, x: f64, y: f64) -> f64 {
    let mut a = AssumptionField::Wacc.with_value(base, x);
    AssumptionField::EbitMargin.set(&mut a, y);
    project(&a).value_per_share
}

#[test]
fn test_grid_matches_direct_projection_cold_and_warm() {
    let base = ValuationAssumptions::default();
    let (x, y) = axes();
    let mut toolkit = SensitivityToolkit::default();

    let cold = toolkit.grid_2d(&base, x, y, 6, None, None).unwrap();
    let warm = toolkit.grid_2d(&base, x, y, 6, None, None).unwrap();
    assert_eq!(cold.values, warm.values);

    for (r, yv) in cold.y_values.iter().enumerate() {
        for (c, xv) in cold.x_values.iter().enumerate() {
            assert_eq!(cold.values[r][c], direct(&base, *xv, *yv));
        }
    }
}

#[test]
fn test_cache_isolated_between_toolkits() {
    let base = ValuationAssumptions::default();
    let (x, y) = axes();
    let mut first = SensitivityToolkit::default();
    first.grid_2d(&base, x, y, 2, None, None).unwrap();

    let second = SensitivityToolkit::default();
    assert!(second.cache().is_empty());

    first.reset_cache();
    assert!(first.cache().is_empty());
}

#[test]
fn test_cache_distinguishes_non_axis_assumptions() {
    let base = ValuationAssumptions::default();
    let mut other = base.clone();
    other.net_debt = 500.0;
    let (x, y) = axes();
    let mut toolkit = SensitivityToolkit::default();
    let a = toolkit.grid_2d(&base, x, y, 2, None, None).unwrap();
    let b = toolkit.grid_2d(&other, x, y, 2, None, None).unwrap();
    assert_eq!(toolkit.cache().stats().hits, 0);
    assert!((a.values[0][0] - b.values[0][0] - 3.0).abs() < 1e-9);
}

#[test]
fn test_small_cache_evicts_but_stays_correct() {
    let base = ValuationAssumptions::default();
    let (x, y) = axes();
    let policy = EnginePolicy {
        grid_cache_capacity: 10,
        ..EnginePolicy::default()
    };
    let mut toolkit = SensitivityToolkit::new(policy);
    let first = toolkit.grid_2d(&base, x, y, 4, None, None).unwrap();
    let second = toolkit.grid_2d(&base, x, y, 4, None, None).unwrap();
    assert_eq!(toolkit.cache().len(), 10);
    assert!(toolkit.cache().stats().evictions > 0);
    assert_eq!(first.values, second.values);
}

#[test]
fn test_tornado_wacc_direction_on_base_case() {
    let base = ValuationAssumptions::default();
    let analysis = SensitivityToolkit::default().tornado(
        &base,
        &[TornadoDriver {
            field: AssumptionField::Wacc,
            delta: 1.0,
        }],
        Metric::PerShare,
    );
    let bar = &analysis.bars[0];
    assert_eq!(analysis.baseline, project(&base).value_per_share);
    assert!(bar.value_at_minus > analysis.baseline);
    assert!(analysis.baseline > bar.value_at_plus);
}

#[test]
fn test_tornado_default_drivers() {
    let analysis = SensitivityToolkit::default().tornado(
        &ValuationAssumptions::default(),
        &default_drivers(),
        Metric::EnterpriseValue,
    );
    let labels: Vec<&str> = analysis.bars.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels.len(), 4);
    assert!(labels.contains(&"wacc"));
    assert!(labels.contains(&"sales_to_capital"));
}

#[test]
fn test_solver_reproduces_wacc() {
    let base = ValuationAssumptions::default();
    let known = 9.25;
    let target = project(&AssumptionField::Wacc.with_value(&base, known)).value_per_share;
    let outcome = SensitivityToolkit::default().solve(
        &base,
        &SolveRequest::new(AssumptionField::Wacc, Metric::PerShare, target, 4.0, 25.0),
    );
    assert!(outcome.converged);
    assert!(outcome.diff.abs() < 1e-4);
    assert!((outcome.value - known).abs() < 1e-3);
    assert!(!outcome.iterations.is_empty());
}

#[test]
fn test_solver_terminal_growth_for_target_value() {
    let base = ValuationAssumptions::default();
    let outcome = SensitivityToolkit::default().solve(
        &base,
        &SolveRequest::new(AssumptionField::TerminalGrowth, Metric::PerShare, 30.0, -1.0, 6.0),
    );
    assert!(outcome.converged);
    assert!(outcome.value > 2.5);
}

#[test]
fn test_solve_request_from_json_defaults() {
    let request: SolveRequest = serde_json::from_str(
        r#"{ "field": "wacc", "target": 25.0, "low": 5.0, "high": 20.0 }"#,
    )
    .unwrap();
    assert_eq!(request.metric, Metric::PerShare);
    assert_eq!(request.max_iterations, 60);
    assert_eq!(request.tolerance, 1e-4);
}

#[test]
fn test_sweep_stage_field() {
    use valuation_core::valuation::Stage;
    let toolkit = SensitivityToolkit::default();
    let points = toolkit.sweep_1d(
        &ValuationAssumptions::default(),
        AssumptionField::StageGrowth(Stage::One),
        5.0,
        25.0,
        4,
    );
    assert_eq!(points.len(), 5);
    assert!(points.iter().all(|p| p.per_share.is_finite()));
}

#[test]
fn test_solver_skips_growth_at_or_above_wacc() {
    let base = ValuationAssumptions::default();
    let target = project(&AssumptionField::TerminalGrowth.with_value(&base, 9.7)).value_per_share;
    let outcome = SensitivityToolkit::default().solve(
        &base,
        &SolveRequest::new(AssumptionField::TerminalGrowth, Metric::PerShare, target, 0.0, 15.0),
    );
    assert!(outcome.converged);
    assert!((outcome.value - 9.7).abs() < 1e-3);
    assert!(outcome.achieved.is_finite());
}
