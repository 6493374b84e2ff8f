//! Component B: Waveform Builder.
//!
//! Chains the six DSP stages (upsample, RRC filter, frequency shift, pilot
//! multiplex, Zadoff-Chu preamble, zero pad) into the two run modes the
//! Sequence Assembler (component C) needs: *full* (the transmit waveform)
//! and *quantum-only* (the waveform a monitor would see if only the
//! quantum symbols were emitted, continuously).

use num_complex::Complex64;

use crate::config::AliceConfig;
use crate::errors::DspError;
use crate::symbol_source::BasebandBlock;

use super::{freq_shift, pilot, rrc, upsample, zadoff_chu, zero_pad};

/// A sequence of complex samples at the DAC rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<Complex64>,
}

impl Waveform {
    pub fn samples(&self) -> &[Complex64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    QuantumOnly,
}

pub struct WaveformBuilder {
    rrc_taps: Vec<f64>,
}

impl WaveformBuilder {
    pub fn new(config: &AliceConfig) -> Result<Self, DspError> {
        let rrc_taps = rrc::rrc_taps(
            config.alice.rrc_rolloff,
            config.upsample_factor(),
            config.alice.rrc_filter_span_symbols,
        )?;
        Ok(Self { rrc_taps })
    }

    /// Group delay (in DAC samples) introduced by the RRC filter. Exposed so
    /// callers can verify spec §8 invariant 2 against a known symbol index.
    pub fn rrc_group_delay(&self) -> usize {
        rrc::group_delay(&self.rrc_taps)
    }

    pub fn build(
        &self,
        block: &BasebandBlock,
        config: &AliceConfig,
        mode: RunMode,
    ) -> Result<Waveform, DspError> {
        let factor = config.upsample_factor();

        let upsampled = upsample::upsample(block.symbols(), factor);
        let shaped = rrc::convolve(&upsampled, &self.rrc_taps);
        let shifted = freq_shift::frequency_shift(
            &shaped,
            config.alice.frequency_shift_hz,
            config.alice.dac_rate_hz as f64,
        );

        let preambled = match mode {
            RunMode::Full => {
                let with_pilots =
                    pilot::multiplex_pilots(&shifted, &config.alice.pilots, config.alice.dac_rate_hz as f64);
                let preamble =
                    zadoff_chu::zadoff_chu_sequence(config.frame.zc_root, config.frame.zc_length);
                let mut out = Vec::with_capacity(preamble.len() + with_pilots.len());
                out.extend(preamble);
                out.extend(with_pilots);
                out
            }
            RunMode::QuantumOnly => {
                // Stage 4 omitted; stage 5 becomes N_ZC zeros so both
                // waveforms stay the same length and time-aligned.
                let zeros = vec![Complex64::new(0.0, 0.0); config.frame.zc_length as usize];
                let mut out = Vec::with_capacity(zeros.len() + shifted.len());
                out.extend(zeros);
                out.extend(shifted);
                out
            }
        };

        let padded = zero_pad::zero_pad(
            &preambled,
            config.alice.zero_pad_head,
            config.alice.zero_pad_tail,
        );

        Ok(Waveform { samples: padded })
    }
}

/// Test-only constructors for types whose fields are otherwise private to
/// this module. Used by sibling modules (e.g. the mock hardware backend)
/// that need a [`Waveform`] fixture without driving the full builder.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::Waveform;
    use num_complex::Complex64;

    pub fn from_samples(samples: Vec<Complex64>) -> Waveform {
        Waveform { samples }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AliceConfig, AliceSection, ChangeParameterPolicy, FrameSection, ModulationKind};
    use crate::symbol_source::SymbolSource;

    fn test_config() -> AliceConfig {
        AliceConfig {
            alice: AliceSection {
                bind_address: "127.0.0.1:8910".to_string(),
                symbol_count: 16,
                symbol_rate_baud: 100_000_000,
                dac_rate_hz: 500_000_000,
                modulation: ModulationKind::Qpsk,
                modulation_variance: 2.0,
                rrc_rolloff: 0.5,
                rrc_filter_span_symbols: 8,
                frequency_shift_hz: 150_000_000.0,
                zero_pad_head: 0,
                zero_pad_tail: 0,
                laser_wavelength_nm: 1550.0,
                conversion_factor: 1.0,
                change_parameter_policy: ChangeParameterPolicy::Refuse,
                hardware_failure_is_fatal: false,
                rng_seed: 7,
                pilots: Vec::new(),
            },
            frame: FrameSection {
                zc_length: 61,
                zc_root: 5,
            },
        }
    }

    #[test]
    fn full_and_quantum_only_waveforms_share_length() {
        let config = test_config();
        let builder = WaveformBuilder::new(&config).unwrap();
        let mut source = SymbolSource::new(config.alice.modulation, config.alice.modulation_variance, config.alice.rng_seed);
        let block = source.generate(config.alice.symbol_count).unwrap();

        let full = builder.build(&block, &config, RunMode::Full).unwrap();
        let quantum = builder.build(&block, &config, RunMode::QuantumOnly).unwrap();

        assert_eq!(full.len(), quantum.len());
        let l = config.upsample_factor() as usize;
        let expected =
            config.alice.zero_pad_head + config.frame.zc_length as usize + block.len() * l + config.alice.zero_pad_tail;
        assert_eq!(full.len(), expected);
    }

    #[test]
    fn build_is_deterministic_given_the_same_block() {
        let config = test_config();
        let builder = WaveformBuilder::new(&config).unwrap();
        let mut source = SymbolSource::new(config.alice.modulation, config.alice.modulation_variance, config.alice.rng_seed);
        let block = source.generate(config.alice.symbol_count).unwrap();

        let a = builder.build(&block, &config, RunMode::Full).unwrap();
        let b = builder.build(&block, &config, RunMode::Full).unwrap();
        assert_eq!(a, b);
    }

    /// Spec §8 invariant 2: the RRC filter's group delay is compensated by
    /// centering the convolution window (`rrc::convolve`) around each output
    /// index, so a single symbol's energy peaks exactly at the sample index
    /// where `upsample` placed it (`head + N_ZC`), not shifted by the
    /// filter's span. With only one non-zero input sample, `convolve`'s
    /// output at index `n` is exactly `taps[half - n] * symbol` (`half` the
    /// filter's center tap), so this reduces to "the RRC center tap is the
    /// filter's largest" — true for any rolloff in `[0, 1]`.
    #[test]
    fn single_symbol_energy_peaks_at_its_upsampled_index() {
        let mut config = test_config();
        config.alice.symbol_count = 1;
        // Isolate the alignment check from the frequency shift's per-sample
        // phase rotation, which is orthogonal to this invariant.
        config.alice.frequency_shift_hz = 0.0;
        let builder = WaveformBuilder::new(&config).unwrap();
        let mut source = SymbolSource::new(config.alice.modulation, config.alice.modulation_variance, config.alice.rng_seed);
        let block = source.generate(1).unwrap();

        let quantum = builder.build(&block, &config, RunMode::QuantumOnly).unwrap();
        let base = config.frame.zc_length as usize;
        let l = config.upsample_factor() as usize;

        let peak = quantum.samples()[base].norm();
        assert!(peak > 0.0);
        for offset in 1..l {
            let neighbour_idx = base + offset;
            if neighbour_idx < quantum.len() {
                assert!(
                    peak > quantum.samples()[neighbour_idx].norm(),
                    "single-symbol peak at {base} was not strictly greater than neighbour at {neighbour_idx}"
                );
            }
        }
    }
}
