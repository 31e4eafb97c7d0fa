use serde::{Deserialize, Serialize};

use super::cache::GridKey;
use super::{linspace, SensitivityToolkit};
use crate::control::{report_interval, CancellationToken, Progress, ProgressObserver};
use crate::error::EngineError;
use crate::valuation::{AssumptionField, Metric, ValuationAssumptions};
use crate::EngineResult;
use std::time::Instant;

/// One axis of a 2D grid, in display units of `field`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    pub field: AssumptionField,
    pub min: f64,
    pub max: f64,
}

impl GridAxis {
    pub fn new(field: AssumptionField, min: f64, max: f64) -> Self {
        GridAxis { field, min, max }
    }

    pub fn values(&self, steps: usize) -> Vec<f64> {
        linspace(self.min, self.max, steps)
    }
}

/// Per-share values over two axes. `values[row][col]` is the outcome at
/// `y_values[row]`, `x_values[col]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityGrid {
    pub x_axis: GridAxis,
    pub y_axis: GridAxis,
    pub x_values: Vec<f64>,
    pub y_values: Vec<f64>,
    pub values: Vec<Vec<f64>>,
    /// False when the run was cancelled before every row was filled
    pub complete: bool,
}

/// One filled grid row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub index: usize,
    pub y_value: f64,
    pub values: Vec<f64>,
}

/// Row-at-a-time grid evaluation. Each `next` fills one row through the
/// toolkit cache; dropping the iterator early leaves the cache consistent.
pub struct GridRows<'a> {
    toolkit: &'a mut SensitivityToolkit,
    base: &'a ValuationAssumptions,
    x_axis: GridAxis,
    y_axis: GridAxis,
    x_values: Vec<f64>,
    y_values: Vec<f64>,
    next_row: usize,
}

impl GridRows<'_> {
    pub fn x_values(&self) -> &[f64] {
        &self.x_values
    }

    pub fn y_values(&self) -> &[f64] {
        &self.y_values
    }
}

impl Iterator for GridRows<'_> {
    type Item = GridRow;

    fn next(&mut self) -> Option<GridRow> {
        let index = self.next_row;
        let y_value = *self.y_values.get(index)?;
        self.next_row += 1;

        let values = self
            .x_values
            .iter()
            .map(|&x_value| {
                self.toolkit
                    .cell(self.base, (self.x_axis.field, x_value), (self.y_axis.field, y_value))
            })
            .collect();

        Some(GridRow {
            index,
            y_value,
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.y_values.len() - self.next_row;
        (left, Some(left))
    }
}

impl SensitivityToolkit {
    /// Per-share value with two fields overridden, served from the cache
    /// when an equivalent cell was computed before.
    pub fn cell(
        &mut self,
        base: &ValuationAssumptions,
        x: (AssumptionField, f64),
        y: (AssumptionField, f64),
    ) -> f64 {
        let mut applied = base.clone();
        x.0.set(&mut applied, x.1);
        y.0.set(&mut applied, y.1);
        let key = GridKey::new(&applied, self.policy.grid_key_scale());
        if let Some(v) = self.cache.get(&key) {
            return v;
        }
        let v = self.evaluate(&applied, Metric::PerShare);
        self.cache.insert(key, v);
        v
    }

    /// Start a row-by-row grid evaluation over `(steps + 1)^2` cells.
    pub fn grid_rows<'a>(
        &'a mut self,
        base: &'a ValuationAssumptions,
        x_axis: GridAxis,
        y_axis: GridAxis,
        steps: usize,
    ) -> EngineResult<GridRows<'a>> {
        check_axes(&x_axis, &y_axis)?;
        Ok(GridRows {
            toolkit: self,
            base,
            x_values: x_axis.values(steps),
            y_values: y_axis.values(steps),
            x_axis,
            y_axis,
            next_row: 0,
        })
    }

    /// Evaluate a full grid. Cancellation is checked between rows and yields
    /// a grid with only the completed rows and `complete == false`.
    pub fn grid_2d(
        &mut self,
        base: &ValuationAssumptions,
        x_axis: GridAxis,
        y_axis: GridAxis,
        steps: usize,
        cancel: Option<&CancellationToken>,
        mut observer: Option<&mut dyn ProgressObserver>,
    ) -> EngineResult<SensitivityGrid> {
        let started = Instant::now();
        let updates = self.policy.progress_updates;
        let mut rows = self.grid_rows(base, x_axis, y_axis, steps)?;
        let x_values = rows.x_values().to_vec();
        let y_values = rows.y_values().to_vec();
        let total = y_values.len();
        let every = report_interval(total, updates);

        let mut values = Vec::with_capacity(total);
        let mut complete = true;
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                complete = values.len() == total;
                break;
            }
            let Some(row) = rows.next() else { break };
            values.push(row.values);

            let completed = values.len();
            if completed % every == 0 || completed == total {
                if let Some(obs) = observer.as_deref_mut() {
                    obs.on_progress(&Progress {
                        completed,
                        total,
                        elapsed: started.elapsed(),
                    });
                }
            }
        }

        Ok(SensitivityGrid {
            x_axis,
            y_axis,
            x_values,
            y_values,
            values,
            complete,
        })
    }
}

fn check_axes(x: &GridAxis, y: &GridAxis) -> EngineResult<()> {
    if x.field.overlaps(y.field) {
        return Err(EngineError::InvalidInput {
            field: "y_axis".into(),
            reason: format!(
                "{} overlaps the x axis field {}",
                y.field.label(),
                x.field.label()
            ),
        });
    }
    for (name, axis) in [("x_axis", x), ("y_axis", y)] {
        if !(axis.min.is_finite() && axis.max.is_finite()) {
            return Err(EngineError::InvalidInput {
                field: name.into(),
                reason: "Axis bounds must be finite".into(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::project;

    fn axes() -> (GridAxis, GridAxis) {
        (
            GridAxis::new(AssumptionField::Wacc, 8.0, 12.0),
            GridAxis::new(AssumptionField::TerminalGrowth, 1.0, 3.0),
        )
    }

    #[test]
    fn test_grid_shape_and_monotonicity() {
        let base = ValuationAssumptions::default();
        let (x, y) = axes();
        let mut toolkit = SensitivityToolkit::default();
        let grid = toolkit.grid_2d(&base, x, y, 4, None, None).unwrap();

        assert!(grid.complete);
        assert_eq!(grid.values.len(), 5);
        assert!(grid.values.iter().all(|r| r.len() == 5));
        // Value falls as WACC rises along each row
        for row in &grid.values {
            assert!(row.windows(2).all(|w| w[0] > w[1]));
        }
        // Value rises with terminal growth down each column
        for col in 0..5 {
            assert!(grid.values[0][col] < grid.values[4][col]);
        }
    }

    #[test]
    fn test_cell_matches_direct_projection() {
        let base = ValuationAssumptions::default();
        let mut toolkit = SensitivityToolkit::default();
        let v = toolkit.cell(
            &base,
            (AssumptionField::Wacc, 9.0),
            (AssumptionField::TerminalGrowth, 2.0),
        );
        let mut direct = AssumptionField::Wacc.with_value(&base, 9.0);
        AssumptionField::TerminalGrowth.set(&mut direct, 2.0);
        assert_eq!(v, project(&direct).value_per_share);
    }

    #[test]
    fn test_repeat_grid_hits_cache() {
        let base = ValuationAssumptions::default();
        let (x, y) = axes();
        let mut toolkit = SensitivityToolkit::default();
        let first = toolkit.grid_2d(&base, x, y, 4, None, None).unwrap();
        assert_eq!(toolkit.cache().stats().misses, 25);
        let second = toolkit.grid_2d(&base, x, y, 4, None, None).unwrap();
        assert_eq!(toolkit.cache().stats().hits, 25);
        assert_eq!(first.values, second.values);
    }

    #[test]
    fn test_coarse_then_fine_reuses_shared_cells() {
        let base = ValuationAssumptions::default();
        let (x, y) = axes();
        let mut toolkit = SensitivityToolkit::default();
        toolkit.grid_2d(&base, x, y, 2, None, None).unwrap();
        toolkit.grid_2d(&base, x, y, 4, None, None).unwrap();
        // The 3x3 coarse lattice lies on the 5x5 fine lattice
        assert_eq!(toolkit.cache().stats().hits, 9);
        assert_eq!(toolkit.cache().len(), 25);
    }

    #[test]
    fn test_row_iterator_is_resumable() {
        let base = ValuationAssumptions::default();
        let (x, y) = axes();
        let mut toolkit = SensitivityToolkit::default();
        let mut rows = toolkit.grid_rows(&base, x, y, 3).unwrap();
        assert_eq!(rows.size_hint(), (4, Some(4)));
        let first = rows.next().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.y_value, 1.0);
        let rest: Vec<GridRow> = rows.collect();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[2].y_value, 3.0);
    }

    #[test]
    fn test_cancelled_grid_is_partial() {
        let base = ValuationAssumptions::default();
        let (x, y) = axes();
        let token = CancellationToken::new();
        let mut toolkit = SensitivityToolkit::default();
        let mut observer = |p: &Progress| {
            if p.completed == 2 {
                token.cancel();
            }
        };
        let grid = toolkit
            .grid_2d(&base, x, y, 4, Some(&token), Some(&mut observer))
            .unwrap();
        assert!(!grid.complete);
        assert_eq!(grid.values.len(), 2);
    }

    #[test]
    fn test_same_field_axes_rejected() {
        let base = ValuationAssumptions::default();
        let axis = GridAxis::new(AssumptionField::Wacc, 8.0, 12.0);
        let mut toolkit = SensitivityToolkit::default();
        assert!(toolkit.grid_2d(&base, axis, axis, 4, None, None).is_err());
    }

    #[test]
    fn test_overlapping_stage_axes_rejected() {
        use crate::valuation::Stage;
        let base = ValuationAssumptions::default();
        let mut toolkit = SensitivityToolkit::default();
        let all = GridAxis::new(AssumptionField::RevenueGrowth, 5.0, 15.0);
        let one = GridAxis::new(AssumptionField::StageGrowth(Stage::One), 5.0, 15.0);
        let err = toolkit.grid_2d(&base, all, one, 2, None, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
        assert!(toolkit.grid_rows(&base, one, all, 2).is_err());

        // Distinct stages do not overlap
        let two = GridAxis::new(AssumptionField::StageGrowth(Stage::Two), 5.0, 15.0);
        assert!(toolkit.grid_2d(&base, one, two, 2, None, None).is_ok());
    }

    #[test]
    fn test_zero_steps_clamped() {
        let base = ValuationAssumptions::default();
        let (x, y) = axes();
        let mut toolkit = SensitivityToolkit::default();
        let grid = toolkit.grid_2d(&base, x, y, 0, None, None).unwrap();
        assert_eq!(grid.x_values, vec![8.0, 12.0]);
        assert_eq!(grid.values.len(), 2);
    }
}
