use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amounts (revenue, cash flows, values).
pub type Money = f64;

/// Rates expressed as fractions (0.05 = 5%).
pub type Rate = f64;

/// Dimensionless ratios (sales-to-capital, multiples).
pub type Ratio = f64;

/// A rate held as a fraction (0.05 = 5%).
///
/// Every conversion between percentage points and fractions goes through this
/// type; serializes transparently as the fraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(f64);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0.0);

    pub const fn from_fraction(fraction: f64) -> Self {
        Percentage(fraction)
    }

    pub fn from_percent(points: f64) -> Self {
        Percentage(points / 100.0)
    }

    pub const fn as_fraction(self) -> Rate {
        self.0
    }

    pub fn as_percent(self) -> f64 {
        self.0 * 100.0
    }

    /// Shift by a number of percentage points.
    pub fn offset_points(self, points: f64) -> Self {
        Percentage(self.0 + points / 100.0)
    }

    pub fn non_negative(self) -> Self {
        Percentage(self.0.max(0.0))
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.as_percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_round_trip_points() {
        let p = Percentage::from_percent(8.5);
        assert_eq!(p.as_fraction(), 0.085);
        assert_eq!(p.as_percent(), 8.5);
    }

    #[test]
    fn test_offset_points() {
        let p = Percentage::from_fraction(0.10).offset_points(-1.0);
        assert!((p.as_fraction() - 0.09).abs() < 1e-12);
    }

    #[test]
    fn test_serializes_as_fraction() {
        let json = serde_json::to_string(&Percentage::from_percent(25.0)).unwrap();
        assert_eq!(json, "0.25");
        let back: Percentage = serde_json::from_str("0.1").unwrap();
        assert_eq!(back, Percentage::from_fraction(0.1));
    }

    #[test]
    fn test_display() {
        assert_eq!(Percentage::from_fraction(0.025).to_string(), "2.50%");
    }

    #[test]
    fn test_non_negative_clamps() {
        assert_eq!(Percentage::from_percent(-3.0).non_negative(), Percentage::ZERO);
    }
}
