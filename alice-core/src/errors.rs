//! Error types for the Alice transmitter core, grouped by the subsystem that raises them.

use thiserror::Error;

/// Top-level error type for all Alice operations.
#[derive(Debug, Error)]
pub enum AliceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("DSP error: {0}")]
    Dsp(#[from] DspError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("estimation error: {0}")]
    Estimation(#[from] EstimationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("dac_rate_hz {dac_rate_hz} is not an integer multiple of symbol_rate_baud {symbol_rate_baud}")]
    NonIntegerUpsampleFactor {
        dac_rate_hz: u64,
        symbol_rate_baud: u64,
    },

    #[error("frequency_shift_hz {frequency_shift_hz} violates Nyquist placement: must exceed {min_required_hz} Hz")]
    NyquistViolation {
        frequency_shift_hz: f64,
        min_required_hz: f64,
    },

    #[error("zc_root {zc_root} and zc_length {zc_length} are not coprime (gcd = {gcd})")]
    ZadoffChuNotCoprime {
        zc_root: u64,
        zc_length: u64,
        gcd: u64,
    },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// DSP pipeline errors.
#[derive(Debug, Error)]
pub enum DspError {
    #[error("upsample factor must be a positive integer, got dac_rate/symbol_rate = {factor}")]
    InvalidUpsampleFactor { factor: f64 },

    #[error("RRC filter design failed: {reason}")]
    FilterDesignFailed { reason: String },

    #[error("pilot frequency {frequency_hz} Hz is not representable at dac_rate {dac_rate_hz} Hz")]
    InvalidPilotFrequency { frequency_hz: f64, dac_rate_hz: f64 },

    #[error("empty symbol block: at least one symbol is required")]
    EmptySymbolBlock,

    #[error("requested symbol index {index} out of range for a block of {len} symbols")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Control-protocol errors (transport and protocol-phase level).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("socket disconnected")]
    SocketDisconnection,

    #[error("unknown code {0:#06x}")]
    UnknownCode(u16),

    #[error("authentication failure")]
    AuthenticationFailure,

    #[error("malformed frame: {reason}")]
    FrameError { reason: String },

    #[error("code {code:?} is not valid in state {state}")]
    UnexpectedCommand { code: String, state: String },
}

/// Hardware-facade errors.
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("waveform load failed: {reason}")]
    LoadFailed { reason: String },

    #[error("trigger failed: {reason}")]
    TriggerFailed { reason: String },

    #[error("stop failed: {reason}")]
    StopFailed { reason: String },

    #[error("VOA set failed: {reason}")]
    VoaSetFailed { reason: String },

    #[error("monitoring read failed: {reason}")]
    MonitoringReadFailed { reason: String },

    #[error("laser control failed: {reason}")]
    LaserControlFailed { reason: String },
}

/// Photon-number estimation errors.
#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("no quantum waveform available for this frame")]
    MissingQuantumWaveform,

    #[error("dark-measurement read failed: {0}")]
    DarkMeasurementFailed(#[from] HardwareError),
}

pub type Result<T> = std::result::Result<T, AliceError>;
