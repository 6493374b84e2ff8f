//! Component D: Hardware Facade, and component L: the mock backend that
//! stands in for it in tests and `--mock` runs.

use crate::dsp::Waveform;
use crate::errors::HardwareError;

/// Abstract capabilities a concrete optical front-end must provide. Real
/// drivers (laser, DAC, VOA, monitoring photodiode, powermeter) are out of
/// scope for this core; only the contract and a deterministic mock
/// implementation live here.
pub trait HardwareFacade: Send {
    fn load_waveform(&mut self, waveform: &Waveform) -> Result<(), HardwareError>;
    fn trigger(&mut self) -> Result<(), HardwareError>;
    fn stop(&mut self) -> Result<(), HardwareError>;
    fn voa_set(&mut self, attenuation_db: f64) -> Result<(), HardwareError>;
    fn monitoring_read(&mut self) -> Result<f64, HardwareError>;
    fn laser_on(&mut self) -> Result<(), HardwareError>;
    fn laser_off(&mut self) -> Result<(), HardwareError>;
}

/// What the mock monitor currently believes it is emitting, for the
/// purposes of synthesizing a `monitoring_read()` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmissionState {
    Dark,
    Loaded,
    Emitting,
}

/// A deterministic, in-memory hardware facade. Records the last loaded
/// waveform and answers `monitoring_read` with a value derived from the
/// mean power of whatever it last considered itself to be emitting, plus a
/// small seeded jitter — enough for the server state machine and the
/// photon-number estimator to be exercised end to end without real optics.
pub struct MockHardware {
    laser_enabled: bool,
    voa_attenuation_db: f64,
    loaded_waveform: Option<Waveform>,
    state: EmissionState,
    rng: rand_chacha::ChaCha8Rng,
}

impl MockHardware {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        let rng = if seed == 0 {
            rand_chacha::ChaCha8Rng::from_entropy()
        } else {
            rand_chacha::ChaCha8Rng::seed_from_u64(seed)
        };
        Self {
            laser_enabled: false,
            voa_attenuation_db: 0.0,
            loaded_waveform: None,
            state: EmissionState::Dark,
            rng,
        }
    }

    fn mean_power(&self) -> f64 {
        match (&self.state, &self.loaded_waveform) {
            (EmissionState::Dark, _) => 0.0,
            (_, None) => 0.0,
            (_, Some(waveform)) => {
                let energy: f64 = waveform.samples().iter().map(|s| s.norm_sqr()).sum();
                let mean = energy / waveform.len().max(1) as f64;
                let attenuation = 10f64.powf(-self.voa_attenuation_db / 10.0);
                mean * attenuation
            }
        }
    }
}

impl HardwareFacade for MockHardware {
    fn load_waveform(&mut self, waveform: &Waveform) -> Result<(), HardwareError> {
        self.loaded_waveform = Some(waveform.clone());
        self.state = EmissionState::Loaded;
        Ok(())
    }

    fn trigger(&mut self) -> Result<(), HardwareError> {
        if self.loaded_waveform.is_none() {
            return Err(HardwareError::TriggerFailed {
                reason: "no waveform loaded".to_string(),
            });
        }
        self.state = EmissionState::Emitting;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HardwareError> {
        self.state = EmissionState::Loaded;
        Ok(())
    }

    fn voa_set(&mut self, attenuation_db: f64) -> Result<(), HardwareError> {
        if attenuation_db < 0.0 {
            return Err(HardwareError::VoaSetFailed {
                reason: format!("attenuation {attenuation_db} dB must be >= 0"),
            });
        }
        self.voa_attenuation_db = attenuation_db;
        Ok(())
    }

    fn monitoring_read(&mut self) -> Result<f64, HardwareError> {
        use rand::Rng;
        let jitter: f64 = self.rng.gen_range(-1e-6..1e-6);
        Ok(self.mean_power() + jitter)
    }

    fn laser_on(&mut self) -> Result<(), HardwareError> {
        self.laser_enabled = true;
        Ok(())
    }

    fn laser_off(&mut self) -> Result<(), HardwareError> {
        self.laser_enabled = false;
        self.state = EmissionState::Dark;
        Ok(())
    }
}
