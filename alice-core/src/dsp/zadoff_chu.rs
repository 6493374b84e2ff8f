//! Stage 5 of the Waveform Builder: Zadoff-Chu (CAZAC) synchronisation preamble.

use std::f64::consts::PI;

use num_complex::Complex64;

/// Generate `x_u(n) = exp(-i*pi*u*n*(n+1)/N)` for `0 <= n < length`.
///
/// The caller is responsible for having rejected non-coprime `(root,
/// length)` pairs at configuration load time; this is a pure generator and
/// never fails.
pub fn zadoff_chu_sequence(root: u64, length: u64) -> Vec<Complex64> {
    (0..length)
        .map(|n| {
            let phase = -PI * root as f64 * (n * (n + 1)) as f64 / length as f64;
            Complex64::from_polar(1.0, phase)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_has_unit_magnitude() {
        let seq = zadoff_chu_sequence(5, 257);
        for s in &seq {
            approx::assert_relative_eq!(s.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn autocorrelation_peaks_at_zero_lag() {
        let n = 61u64;
        let seq = zadoff_chu_sequence(5, n);
        let lag0: Complex64 = seq.iter().map(|s| s * s.conj()).sum();
        assert!((lag0.norm() - n as f64).abs() < 1e-6);

        for lag in 1..n as usize {
            let shifted: Complex64 = (0..seq.len())
                .map(|i| seq[i] * seq[(i + lag) % seq.len()].conj())
                .sum();
            assert!(shifted.norm() < 1e-6, "lag {lag} periodic autocorrelation {shifted}");
        }
    }

    #[test]
    fn correct_length_is_produced() {
        let seq = zadoff_chu_sequence(5, 257);
        assert_eq!(seq.len(), 257);
    }
}
