//! Stage 3 of the Waveform Builder: frequency shift onto the DAC carrier.

use std::f64::consts::TAU;

use num_complex::Complex64;

/// Multiply `x[n]` by `exp(2*pi*i*f_s*n/f_dac)`.
///
/// Nyquist placement (`f_s > B/2`) is validated at configuration load time
/// (see [`crate::config::AliceConfig::validate`]); this function trusts its
/// caller and never fails.
pub fn frequency_shift(x: &[Complex64], frequency_shift_hz: f64, dac_rate_hz: f64) -> Vec<Complex64> {
    let step = TAU * frequency_shift_hz / dac_rate_hz;
    x.iter()
        .enumerate()
        .map(|(n, &sample)| sample * Complex64::from_polar(1.0, step * n as f64))
        .collect()
}
