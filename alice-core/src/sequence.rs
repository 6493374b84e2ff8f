//! Component C: Sequence Assembler.
//!
//! Drives the Symbol Source once and feeds the resulting block through the
//! Waveform Builder in both run modes. This is the only place in the core
//! that offloads work to a worker pool (spec §5: DSP may be offloaded
//! strictly between `QIE_REQUEST` receipt and the `QIE_READY` reply); the
//! two waveform builds are independent pure functions of the same symbol
//! block, so they are computed concurrently via `rayon::join`.

use crate::config::AliceConfig;
use crate::dsp::{RunMode, Waveform, WaveformBuilder};
use crate::errors::DspError;
use crate::symbol_source::{BasebandBlock, SymbolSource};

pub struct AssembledSequence {
    pub transmit_waveform: Waveform,
    pub quantum_waveform: Waveform,
    pub symbols: BasebandBlock,
}

pub struct SequenceAssembler {
    source: SymbolSource,
    builder: WaveformBuilder,
}

impl SequenceAssembler {
    pub fn new(config: &AliceConfig) -> Result<Self, DspError> {
        let source = SymbolSource::new(
            config.alice.modulation,
            config.alice.modulation_variance,
            config.alice.rng_seed,
        );
        let builder = WaveformBuilder::new(config)?;
        Ok(Self { source, builder })
    }

    /// Produce a fresh (transmit_waveform, quantum_waveform, symbols) triple.
    ///
    /// Invariant: `transmit_waveform.len() == quantum_waveform.len()` and
    /// both are time-aligned sample-for-sample (spec §4.C).
    pub fn assemble(&mut self, config: &AliceConfig) -> Result<AssembledSequence, DspError> {
        let symbols = self.source.generate(config.alice.symbol_count)?;

        let builder = &self.builder;
        let (transmit, quantum) = rayon::join(
            || builder.build(&symbols, config, RunMode::Full),
            || builder.build(&symbols, config, RunMode::QuantumOnly),
        );

        Ok(AssembledSequence {
            transmit_waveform: transmit?,
            quantum_waveform: quantum?,
            symbols,
        })
    }
}
