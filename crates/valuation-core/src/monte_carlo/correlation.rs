use super::rng::Mulberry32;

const MAX_CORRELATION: f64 = 0.99;

/// Lower-triangular factor of a 2x2 correlation matrix
/// [[1, rho], [rho, 1]] = L * L^T.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cholesky2 {
    a21: f64,
    a22: f64,
}

impl Cholesky2 {
    /// `rho` is clamped to [-0.99, 0.99].
    pub fn new(rho: f64) -> Self {
        let rho = rho.clamp(-MAX_CORRELATION, MAX_CORRELATION);
        Cholesky2 {
            a21: rho,
            a22: (1.0 - rho * rho).sqrt(),
        }
    }

    pub fn rho(&self) -> f64 {
        self.a21
    }

    /// Map two independent standard normals to a pair with correlation rho.
    pub fn correlate(&self, z1: f64, z2: f64) -> (f64, f64) {
        (z1, self.a21 * z1 + self.a22 * z2)
    }
}

/// Standard-normal shocks for one trial, indexed by stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialShocks {
    pub growth: [f64; 3],
    pub margin: [f64; 3],
    pub sales_to_capital: [f64; 3],
}

impl TrialShocks {
    /// Draw order is fixed: the correlated stage-1 growth/margin pair, then
    /// stage 2/3 growth, stage 2/3 margin, and the three sales-to-capital shocks.
    pub fn draw(rng: &mut Mulberry32, factor: &Cholesky2) -> Self {
        let z1 = rng.standard_normal();
        let z2 = rng.standard_normal();
        let (g1, m1) = factor.correlate(z1, z2);
        let g2 = rng.standard_normal();
        let g3 = rng.standard_normal();
        let m2 = rng.standard_normal();
        let m3 = rng.standard_normal();
        let s1 = rng.standard_normal();
        let s2 = rng.standard_normal();
        let s3 = rng.standard_normal();
        TrialShocks {
            growth: [g1, g2, g3],
            margin: [m1, m2, m3],
            sales_to_capital: [s1, s2, s3],
        }
    }
}
