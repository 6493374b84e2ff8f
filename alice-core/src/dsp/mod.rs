//! Components A-C: symbol generation and the deterministic DSP pipeline that
//! turns quantum symbols into DAC-rate waveforms.

pub mod builder;
pub mod freq_shift;
pub mod pilot;
pub mod rrc;
pub mod upsample;
pub mod zadoff_chu;
pub mod zero_pad;

pub use builder::{RunMode, Waveform, WaveformBuilder};
