//! Stage 1 of the Waveform Builder: zero-stuffing upsample.

use num_complex::Complex64;

/// Insert `factor - 1` zeros between consecutive samples of `x`.
///
/// `factor` must already have been validated as an exact integer ratio
/// (`dac_rate_hz / symbol_rate_baud`, checked at configuration load); this
/// function takes the integer directly and never fails.
pub fn upsample(x: &[Complex64], factor: u64) -> Vec<Complex64> {
    debug_assert!(factor >= 1);
    let factor = factor as usize;
    let mut out = vec![Complex64::new(0.0, 0.0); x.len() * factor];
    for (i, &sample) in x.iter().enumerate() {
        out[i * factor] = sample;
    }
    out
}
