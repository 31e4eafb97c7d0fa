//! Deterministic 32-bit generator and the seed derivation used by simulations.

use rand::{Error, RngCore, SeedableRng};
use std::f64::consts::PI;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;
const TWO_POW_32: f64 = 4_294_967_296.0;

/// Uniform draws below this are raised to it before taking a logarithm.
const MIN_UNIFORM: f64 = 1e-12;

/// Fold a seed string into 32 bits (FNV-1a over UTF-16 code units).
pub fn seed_from_str(seed: &str) -> u32 {
    seed.encode_utf16()
        .fold(FNV_OFFSET_BASIS, |h, unit| (h ^ u32::from(unit)).wrapping_mul(FNV_PRIME))
}

/// Seed string when one is given (blank strings count as absent), otherwise entropy.
pub fn resolve_seed(seed: Option<&str>) -> u32 {
    match seed.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => seed_from_str(s),
        None => rand::random::<u32>(),
    }
}

/// mulberry32: a 32-bit state advanced by a fixed odd increment and mixed
/// through two xorshift-multiply rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    const INCREMENT: u32 = 0x6D2B_79F5;

    pub fn new(seed: u32) -> Self {
        Mulberry32 { state: seed }
    }

    fn advance(&mut self) -> u32 {
        self.state = self.state.wrapping_add(Self::INCREMENT);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Uniform draw in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.advance()) / TWO_POW_32
    }

    /// Standard normal via Box-Muller (cosine branch only).
    pub fn standard_normal(&mut self) -> f64 {
        let u1 = self.next_f64().max(MIN_UNIFORM);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

impl RngCore for Mulberry32 {
    fn next_u32(&mut self) -> u32 {
        self.advance()
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.advance());
        let lo = u64::from(self.advance());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.advance().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Mulberry32 {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Mulberry32::new(u32::from_le_bytes(seed))
    }
}
