//! Configuration types for the Alice transmitter station.
//!
//! Mirrors the `[alice]` / `[frame]` sections of the station configuration
//! file; a `[bob]` section may be present but is ignored (component I).

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulationKind {
    Gaussian,
    Bpsk,
    Qpsk,
    Qam16,
}

impl fmt::Display for ModulationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModulationKind::Gaussian => "gaussian",
            ModulationKind::Bpsk => "bpsk",
            ModulationKind::Qpsk => "qpsk",
            ModulationKind::Qam16 => "qam16",
        };
        write!(f, "{s}")
    }
}

/// What Alice does when the peer sends `CHANGE_PARAMETER_REQUEST`.
///
/// Left under-specified by the upstream control protocol (spec §9, open
/// question i); resolved here as a configured predicate with no state
/// change on refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeParameterPolicy {
    Accept,
    Refuse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PilotConfig {
    pub frequency_hz: f64,
    pub power_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliceSection {
    pub bind_address: String,
    pub symbol_count: usize,
    pub symbol_rate_baud: u64,
    pub dac_rate_hz: u64,
    pub modulation: ModulationKind,
    #[serde(default = "default_modulation_variance")]
    pub modulation_variance: f64,
    pub rrc_rolloff: f64,
    pub rrc_filter_span_symbols: usize,
    pub frequency_shift_hz: f64,
    #[serde(default)]
    pub zero_pad_head: usize,
    #[serde(default)]
    pub zero_pad_tail: usize,
    pub laser_wavelength_nm: f64,
    pub conversion_factor: f64,
    pub change_parameter_policy: ChangeParameterPolicy,
    #[serde(default)]
    pub hardware_failure_is_fatal: bool,
    #[serde(default)]
    pub rng_seed: u64,
    #[serde(default)]
    pub pilots: Vec<PilotConfig>,
}

fn default_modulation_variance() -> f64 {
    2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSection {
    pub zc_length: u64,
    pub zc_root: u64,
}

/// Raw, deserialized configuration file. The `[bob]` table, if present, is
/// captured by serde's default-skip-unknown behaviour and dropped; we never
/// declare a field for it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct RawConfig {
    alice: AliceSection,
    frame: FrameSection,
}

/// Validated, immutable configuration snapshot.
///
/// Produced only via [`AliceConfig::load`] or [`AliceConfig::from_str`], both
/// of which run the load-time invariants from spec §3 before returning.
#[derive(Debug, Clone, PartialEq)]
pub struct AliceConfig {
    pub alice: AliceSection,
    pub frame: FrameSection,
}

impl AliceConfig {
    /// Load and validate a configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text, &path.display().to_string())
    }

    /// Parse and validate configuration text (the file-path argument is used
    /// only to annotate parse errors).
    pub fn from_str(text: &str, path_for_errors: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path_for_errors.to_string(),
            source,
        })?;
        let config = AliceConfig {
            alice: raw.alice,
            frame: raw.frame,
        };
        config.validate()?;
        Ok(config)
    }

    /// Upsampling factor L = f_DAC / Rs (spec §4.B step 1).
    pub fn upsample_factor(&self) -> u64 {
        self.alice.dac_rate_hz / self.alice.symbol_rate_baud
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.alice.symbol_rate_baud == 0 {
            return Err(ConfigError::InvalidField {
                field: "alice.symbol_rate_baud",
                reason: "must be > 0".to_string(),
            });
        }
        if self.alice.dac_rate_hz % self.alice.symbol_rate_baud != 0 {
            return Err(ConfigError::NonIntegerUpsampleFactor {
                dac_rate_hz: self.alice.dac_rate_hz,
                symbol_rate_baud: self.alice.symbol_rate_baud,
            });
        }

        let bandwidth = self.alice.symbol_rate_baud as f64 * (1.0 + self.alice.rrc_rolloff);
        let min_required_hz = bandwidth / 2.0;
        if self.alice.frequency_shift_hz <= min_required_hz {
            return Err(ConfigError::NyquistViolation {
                frequency_shift_hz: self.alice.frequency_shift_hz,
                min_required_hz,
            });
        }

        let g = gcd(self.frame.zc_root, self.frame.zc_length);
        if g != 1 {
            return Err(ConfigError::ZadoffChuNotCoprime {
                zc_root: self.frame.zc_root,
                zc_length: self.frame.zc_length,
                gcd: g,
            });
        }

        if self.alice.symbol_count == 0 {
            return Err(ConfigError::InvalidField {
                field: "alice.symbol_count",
                reason: "must be > 0".to_string(),
            });
        }

        if self.alice.modulation == ModulationKind::Gaussian && self.alice.modulation_variance <= 0.0
        {
            return Err(ConfigError::InvalidField {
                field: "alice.modulation_variance",
                reason: "must be > 0 for gaussian modulation".to_string(),
            });
        }

        Ok(())
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
