//! Component A: Symbol Source.
//!
//! Draws complex baseband symbols from a configured constellation or
//! distribution. The produced block is the ground truth used later by
//! `PE_SYMBOLS_REQUEST` and by the photon-number estimator (§4.E); nothing
//! downstream is permitted to mutate it.

use num_complex::Complex64;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::config::ModulationKind;
use crate::errors::DspError;

/// A block of quantum symbols, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct BasebandBlock {
    symbols: Vec<Complex64>,
}

impl BasebandBlock {
    pub fn symbols(&self) -> &[Complex64] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols at the given indices, in the order the indices were given
    /// (spec §8 invariant 6: no reordering). Indices come from a peer-supplied
    /// `PE_SYMBOLS_REQUEST`; an out-of-range index is reported rather than
    /// indexed into directly.
    pub fn at_indices(&self, indices: &[usize]) -> Result<Vec<Complex64>, DspError> {
        indices
            .iter()
            .map(|&i| {
                self.symbols
                    .get(i)
                    .copied()
                    .ok_or(DspError::IndexOutOfRange { index: i, len: self.symbols.len() })
            })
            .collect()
    }
}

/// Generates [`BasebandBlock`]s from a seeded RNG so that a run is
/// reproducible given `rng_seed` (0 seeds from OS entropy).
pub struct SymbolSource {
    rng: ChaCha8Rng,
    kind: ModulationKind,
    variance: f64,
}

const QPSK_POINTS: [Complex64; 4] = [
    Complex64::new(std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2),
    Complex64::new(-std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2),
    Complex64::new(-std::f64::consts::FRAC_1_SQRT_2, -std::f64::consts::FRAC_1_SQRT_2),
    Complex64::new(std::f64::consts::FRAC_1_SQRT_2, -std::f64::consts::FRAC_1_SQRT_2),
];

const BPSK_POINTS: [Complex64; 2] = [Complex64::new(1.0, 0.0), Complex64::new(-1.0, 0.0)];

fn qam16_points() -> [Complex64; 16] {
    let levels = [-3.0, -1.0, 1.0, 3.0];
    // Normalize so the average symbol energy is 1 (standard 16-QAM scaling).
    let norm = 1.0 / (10.0f64).sqrt();
    let mut points = [Complex64::new(0.0, 0.0); 16];
    let mut idx = 0;
    for &i in &levels {
        for &q in &levels {
            points[idx] = Complex64::new(i * norm, q * norm);
            idx += 1;
        }
    }
    points
}

impl SymbolSource {
    pub fn new(kind: ModulationKind, variance: f64, seed: u64) -> Self {
        let rng = if seed == 0 {
            ChaCha8Rng::from_entropy()
        } else {
            ChaCha8Rng::seed_from_u64(seed)
        };
        Self { rng, kind, variance }
    }

    /// Draw `count` symbols, scaled so their constellation/distribution has
    /// variance `self.variance` (shot-noise units) in the Gaussian case, or
    /// unit average energy scaled by `sqrt(variance)` for discrete
    /// constellations.
    pub fn generate(&mut self, count: usize) -> Result<BasebandBlock, DspError> {
        if count == 0 {
            return Err(DspError::EmptySymbolBlock);
        }
        let symbols = match self.kind {
            ModulationKind::Gaussian => self.generate_gaussian(count),
            ModulationKind::Bpsk => self.generate_discrete(count, &BPSK_POINTS),
            ModulationKind::Qpsk => self.generate_discrete(count, &QPSK_POINTS),
            ModulationKind::Qam16 => self.generate_discrete(count, &qam16_points()),
        };
        Ok(BasebandBlock { symbols })
    }

    fn generate_gaussian(&mut self, count: usize) -> Vec<Complex64> {
        // Circularly symmetric complex Gaussian: each quadrature carries
        // variance Va/2 so that |I|^2 + |Q|^2 averages to Va.
        let sigma = (self.variance / 2.0).sqrt();
        (0..count)
            .map(|_| {
                let i: f64 = self.rng.sample(StandardNormal);
                let q: f64 = self.rng.sample(StandardNormal);
                Complex64::new(i * sigma, q * sigma)
            })
            .collect()
    }

    fn generate_discrete(&mut self, count: usize, points: &[Complex64]) -> Vec<Complex64> {
        let scale = self.variance.sqrt();
        (0..count)
            .map(|_| {
                let idx = self.rng.gen_range(0..points.len());
                points[idx] * scale
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_block_has_expected_length() {
        let mut source = SymbolSource::new(ModulationKind::Gaussian, 2.0, 42);
        let block = source.generate(4096).unwrap();
        assert_eq!(block.len(), 4096);
    }

    #[test]
    fn gaussian_variance_matches_configuration_within_tolerance() {
        let mut source = SymbolSource::new(ModulationKind::Gaussian, 2.0, 7);
        let block = source.generate(200_000).unwrap();
        let empirical: f64 =
            block.symbols().iter().map(|s| s.norm_sqr()).sum::<f64>() / block.len() as f64;
        assert!((empirical - 2.0).abs() < 0.05, "empirical variance {empirical}");
    }

    #[test]
    fn qpsk_symbols_lie_on_the_constellation() {
        let mut source = SymbolSource::new(ModulationKind::Qpsk, 2.0, 1);
        let block = source.generate(64).unwrap();
        let scale = 2.0f64.sqrt();
        for s in block.symbols() {
            let mag = s.norm();
            assert!((mag - scale).abs() < 1e-9, "magnitude {mag} scale {scale}");
        }
    }

    #[test]
    fn at_indices_preserves_requested_order() {
        let mut source = SymbolSource::new(ModulationKind::Qpsk, 2.0, 5);
        let block = source.generate(16).unwrap();
        let picked = block.at_indices(&[3, 0, 7]).unwrap();
        assert_eq!(picked, vec![block.symbols()[3], block.symbols()[0], block.symbols()[7]]);
    }

    #[test]
    fn at_indices_rejects_an_out_of_range_index() {
        let mut source = SymbolSource::new(ModulationKind::Qpsk, 2.0, 5);
        let block = source.generate(16).unwrap();
        let err = block.at_indices(&[0, 16]).unwrap_err();
        assert!(matches!(err, DspError::IndexOutOfRange { index: 16, len: 16 }));
    }

    #[test]
    fn empty_request_is_an_error() {
        let mut source = SymbolSource::new(ModulationKind::Qpsk, 2.0, 1);
        assert!(matches!(source.generate(0), Err(DspError::EmptySymbolBlock)));
    }

    #[test]
    fn seed_zero_still_produces_symbols() {
        let mut source = SymbolSource::new(ModulationKind::Gaussian, 2.0, 0);
        let block = source.generate(8).unwrap();
        assert_eq!(block.len(), 8);
    }
}
