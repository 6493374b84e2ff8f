//! Stage 4 of the Waveform Builder: classical pilot multiplexing.

use std::f64::consts::TAU;

use num_complex::Complex64;

use crate::config::PilotConfig;

/// Add one complex exponential per configured pilot, each scaled from the
/// configured power ratio relative to the mean-square power of `x` after
/// the frequency shift (spec §4.B step 4).
///
/// Omitted entirely in quantum-only run mode — callers simply skip this
/// stage rather than calling it with an empty pilot list.
pub fn multiplex_pilots(x: &[Complex64], pilots: &[PilotConfig], dac_rate_hz: f64) -> Vec<Complex64> {
    if pilots.is_empty() {
        return x.to_vec();
    }

    let signal_power: f64 = x.iter().map(|s| s.norm_sqr()).sum::<f64>() / x.len().max(1) as f64;

    let mut out = x.to_vec();
    for pilot in pilots {
        let pilot_power = signal_power * pilot.power_ratio;
        let amplitude = pilot_power.sqrt();
        let step = TAU * pilot.frequency_hz / dac_rate_hz;
        for (n, sample) in out.iter_mut().enumerate() {
            *sample += Complex64::from_polar(amplitude, step * n as f64);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pilots_is_identity() {
        let x = vec![Complex64::new(1.0, 1.0); 8];
        let out = multiplex_pilots(&x, &[], 500_000_000.0);
        assert_eq!(out, x);
    }

    #[test]
    fn pilot_adds_energy_proportional_to_ratio() {
        let x = vec![Complex64::new(1.0, 0.0); 1000];
        let pilots = vec![PilotConfig {
            frequency_hz: 1_000_000.0,
            power_ratio: 0.25,
        }];
        let out = multiplex_pilots(&x, &pilots, 500_000_000.0);
        assert_ne!(out, x);
        assert_eq!(out.len(), x.len());
    }
}
