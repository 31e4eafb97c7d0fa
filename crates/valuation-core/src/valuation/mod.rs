//! Multi-stage FCFF discounted-cash-flow projection.

pub mod assumptions;
pub mod dcf;
pub mod terminal;
pub mod validation;

pub use assumptions::{AssumptionField, Stage, StageAssumptions, TerminalMethod, ValuationAssumptions};
pub use dcf::{project, project_with_policy, try_project, Metric, ProjectionYear, ValuationResult};
pub use validation::{validate, ValidationIssue};
