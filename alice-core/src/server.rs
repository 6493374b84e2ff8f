//! Component F (dispatch half): the control-protocol server loop.
//!
//! Owns [`ServerState`] and the [`HardwareFacade`] exclusively (spec §5
//! "Shared resources"). [`Server::handle_frame`] implements the per-frame
//! reception pipeline of spec §4.F: transport errors, then general codes,
//! then the phase gate (`check_code`), then handler dispatch — one atomic
//! step per incoming frame, matching spec §5's "no suspension inside a state
//! transition".
//!
//! [`run`] drives the TCP accept/receive loop (spec §4.F "Lifecycle") and
//! polls the admin channel between frames (spec §5 "suspension points",
//! §9's message-passing design note).

use std::io::{self, BufRead, BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::admin::{AdminAction, AdminReceiver};
use crate::codec::{self, Code, Frame, FrameContent};
use crate::config::{AliceConfig, ChangeParameterPolicy};
use crate::errors::{AliceError, HardwareError};
use crate::estimator;
use crate::hardware::HardwareFacade;
use crate::sequence::SequenceAssembler;
use crate::state::{FrameContext, ServerState};

/// How often the accept loop and the per-frame read loop wake up to check
/// the admin channel and the shutdown flag, when no I/O is otherwise ready.
const POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Short-hand for a reply that should be written back to the peer as-is.
type Reply = Frame;

/// The part of the control-protocol server that is pure, synchronous
/// dispatch logic: no sockets, no threads. Everything here is driven by
/// [`run`] but is independently unit-testable (spec §8's scenarios).
pub struct Server<H: HardwareFacade> {
    config: AliceConfig,
    state: ServerState,
    assembler: SequenceAssembler,
    hardware: H,
    session_key: Option<[u8; 16]>,
    /// Set by [`Server::run_hardware`] when a hardware failure occurs and
    /// `hardware_failure_is_fatal` is configured; drained by [`run`] after
    /// each frame to decide whether to tear the process down (spec §7).
    fatal_hardware_error: Option<HardwareError>,
}

impl<H: HardwareFacade> Server<H> {
    pub fn new(config: AliceConfig, hardware: H) -> Result<Self, AliceError> {
        let assembler = SequenceAssembler::new(&config)?;
        Ok(Self {
            config,
            state: ServerState::Disconnected,
            assembler,
            hardware,
            session_key: None,
            fatal_hardware_error: None,
        })
    }

    /// Takes the pending fatal hardware error, if any, clearing it. Polled by
    /// [`serve_one_peer`]/[`run`] after each processed frame.
    pub fn take_fatal_hardware_error(&mut self) -> Option<HardwareError> {
        self.fatal_hardware_error.take()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn config(&self) -> &AliceConfig {
        &self.config
    }

    /// The session key negotiated during `IDENTIFICATION_REQUEST`, if any.
    /// Polled by [`serve_one_peer`] to decide whether incoming frames need
    /// their `auth_tag` verified.
    pub fn session_key(&self) -> Option<&[u8; 16]> {
        self.session_key.as_ref()
    }

    /// Called once a TCP peer is accepted. Spec §3: "at most one peer at a
    /// time"; the caller in [`run`] only ever holds one live connection.
    pub fn on_connect(&mut self) {
        self.state = ServerState::Connected;
        self.session_key = None;
    }

    /// Handles one already-decoded-and-authenticated frame and returns the
    /// reply to send back. This is the "one atomic step" spec §5 requires:
    /// no `.await`/blocking I/O happens inside it beyond the hardware
    /// facade, which is itself synchronous and exclusively owned here.
    pub fn handle_frame(&mut self, frame: Frame) -> Reply {
        use Code::*;

        match frame.code {
            // General codes (spec §4.F step 2): valid in any connected state.
            Abort => {
                info!("ABORT received, resetting frame state");
                self.state.reset();
                Frame::new(AbortAck, FrameContent::None)
            }
            InvalidResponse => {
                warn!("peer reported INVALID_RESPONSE");
                Frame::new(InvalidResponseAck, FrameContent::None)
            }
            Disconnection => {
                info!("peer requested graceful DISCONNECTION");
                self.state.disconnect();
                Frame::new(DisconnectionAck, FrameContent::None)
            }
            ChangeParameterRequest => self.handle_change_parameter(),

            // Left unimplemented by spec §9 open question (ii): always
            // refused, regardless of phase, with no state mutation.
            InitializationRequestConfig | EcRequest | PaRequest => {
                Frame::new(UnexpectedCommand, FrameContent::None)
            }

            other => {
                if !crate::state::check_code(other, &self.state) {
                    warn!(code = ?other, state = self.state.name(), "rejected: unexpected command for state");
                    return Frame::new(UnexpectedCommand, FrameContent::None);
                }
                self.dispatch(other, frame.content)
            }
        }
    }

    /// Handles a transport-level decode failure (spec §4.F step 1) that
    /// still owes the peer a reply: malformed frame, unknown code, or a
    /// failed auth tag. [`crate::errors::ProtocolError::SocketDisconnection`]
    /// is handled directly by [`serve_one_peer`] since it owes no reply.
    /// Pure and socket-free like `handle_frame`, so it is independently
    /// testable.
    pub fn handle_transport_error(&mut self, err: &crate::errors::ProtocolError) -> Reply {
        use crate::errors::ProtocolError::*;

        match err {
            UnknownCode(code) => {
                warn!(code = *code, "unknown code, replying UNKNOWN_COMMAND");
                Frame::new(Code::UnknownCode, FrameContent::None)
            }
            FrameError { reason } => {
                warn!(reason, "malformed frame, replying INVALID_CONTENT");
                Frame::new(Code::InvalidContent, FrameContent::None)
            }
            AuthenticationFailure => {
                warn!("authentication failure, replying AUTHENTICATION_INVALID");
                self.state.reset();
                Frame::new(Code::AuthenticationInvalid, FrameContent::None)
            }
            UnexpectedCommand { .. } => Frame::new(Code::UnexpectedCommand, FrameContent::None),
            SocketDisconnection => {
                unreachable!("serve_one_peer handles SocketDisconnection directly")
            }
        }
    }

    fn handle_change_parameter(&mut self) -> Reply {
        match self.config.alice.change_parameter_policy {
            ChangeParameterPolicy::Accept => {
                info!("CHANGE_PARAMETER_REQUEST accepted by configured policy");
                Frame::new(Code::ChangeParameterAccepted, FrameContent::None)
            }
            ChangeParameterPolicy::Refuse => {
                info!("CHANGE_PARAMETER_REQUEST refused by configured policy");
                Frame::new(Code::ChangeParameterRefused, FrameContent::None)
            }
        }
    }

    fn dispatch(&mut self, code: Code, content: FrameContent) -> Reply {
        use Code::*;
        match code {
            IdentificationRequest => self.handle_identification(content),
            InitializationRequest => self.handle_initialization(content),
            QieRequest => self.handle_qie_request(),
            QieTrigger => self.handle_qie_trigger(),
            QieAcquisitionEnded => self.handle_acquisition_ended(),
            PeSymbolsRequest => self.handle_pe_symbols_request(content),
            PeNphotonRequest => self.handle_pe_nphoton_request(),
            PeFinished => self.handle_pe_finished(content),
            FrameEnded => {
                self.state.end_frame();
                Frame::new(FrameEndedAck, FrameContent::None)
            }
            // Every other code either only ever appears as a reply, or was
            // already handled by `handle_frame` before reaching dispatch.
            _ => Frame::new(UnexpectedCommand, FrameContent::None),
        }
    }

    fn handle_identification(&mut self, content: FrameContent) -> Reply {
        let (serial, version) = match content {
            FrameContent::Identification { serial, version } => (serial, version),
            _ => (String::new(), String::new()),
        };
        if serial.is_empty() {
            warn!("IDENTIFICATION_REQUEST with empty serial");
            return Frame::new(Code::AuthenticationInvalid, FrameContent::None);
        }

        info!(serial, version, "peer identified");
        if matches!(self.state, ServerState::Connected) {
            self.state = ServerState::Authenticated;
        }
        self.session_key = Some(derive_session_key(&serial, &version));
        Frame::new(Code::IdentificationResponse, FrameContent::None)
    }

    fn handle_initialization(&mut self, content: FrameContent) -> Reply {
        let frame_uuid = match content {
            FrameContent::Initialization { frame_uuid } if !frame_uuid.is_empty() => frame_uuid,
            _ => {
                warn!("INITIALIZATION_REQUEST missing a frame_uuid");
                return Frame::new(Code::UnexpectedCommand, FrameContent::None);
            }
        };
        self.state = ServerState::Initialized { frame_uuid };
        Frame::new(Code::InitializationResponse, FrameContent::None)
    }

    fn handle_qie_request(&mut self) -> Reply {
        let frame_uuid = match &self.state {
            ServerState::Initialized { frame_uuid } => frame_uuid.clone(),
            _ => unreachable!("check_code already verified client_initialized"),
        };

        let assembled = match self.assembler.assemble(&self.config) {
            Ok(a) => a,
            Err(e) => {
                error!(error = %e, "DSP assembly failed");
                self.state.reset();
                return Frame::new(Code::FrameEnded, FrameContent::Text { message: e.to_string() });
            }
        };

        if let Err(reply) = self.run_hardware(|hw| hw.load_waveform(&assembled.transmit_waveform)) {
            return reply;
        }

        self.state = ServerState::FramePrepared(FrameContext {
            frame_uuid,
            symbols: assembled.symbols,
            quantum_waveform: assembled.quantum_waveform,
            photon_estimate: None,
        });
        Frame::new(Code::QieReady, FrameContent::None)
    }

    fn handle_qie_trigger(&mut self) -> Reply {
        if let Err(reply) = self.run_hardware(|hw| hw.trigger()) {
            return reply;
        }
        if let Some(ctx) = self.state.frame_context().cloned() {
            self.state = ServerState::FrameSent(ctx);
        }
        Frame::new(Code::QieEmissionStarted, FrameContent::None)
    }

    fn handle_acquisition_ended(&mut self) -> Reply {
        if let Err(reply) = self.run_hardware(|hw| hw.stop()) {
            return reply;
        }

        let quantum_waveform = match self.state.frame_context() {
            Some(ctx) => ctx.quantum_waveform.clone(),
            None => unreachable!("check_code already verified frame_sent"),
        };

        let estimate = match estimator::estimate(&mut self.hardware, &quantum_waveform, &self.config) {
            Ok(e) => e,
            Err(e) => {
                error!(error = %e, "photon-number estimation failed");
                self.state.reset();
                return Frame::new(Code::FrameEnded, FrameContent::Text { message: e.to_string() });
            }
        };

        if let Some(ctx) = self.state.frame_context_mut() {
            ctx.photon_estimate = Some(estimate);
        }
        if let Some(ctx) = self.state.frame_context().cloned() {
            self.state = ServerState::PeEndedPartial(ctx);
        }
        Frame::new(Code::QieEnded, FrameContent::None)
    }

    fn handle_pe_symbols_request(&self, content: FrameContent) -> Reply {
        let indices = match content {
            FrameContent::PeSymbolsRequest { indices } => indices,
            _ => Vec::new(),
        };
        let ctx = self
            .state
            .frame_context()
            .expect("check_code already verified frame_sent");
        match ctx.symbols.at_indices(&indices) {
            Ok(picked) => {
                let symbols = picked.into_iter().map(|s| (s.re, s.im)).collect();
                Frame::new(Code::PeSymbolsResponse, FrameContent::PeSymbolsResponse { symbols })
            }
            Err(e) => {
                warn!(error = %e, "PE_SYMBOLS_REQUEST named an out-of-range index");
                Frame::new(Code::InvalidContent, FrameContent::None)
            }
        }
    }

    fn handle_pe_nphoton_request(&self) -> Reply {
        let ctx = self
            .state
            .frame_context()
            .expect("check_code already verified pe_ended_partial");
        let estimate = ctx
            .photon_estimate
            .expect("pe_ended_partial implies photon_estimate is set");
        Frame::new(
            Code::PeNphotonResponse,
            FrameContent::PeNphotonResponse {
                mean_photon_number: estimate.mean_photon_number,
                suspect: estimate.suspect,
            },
        )
    }

    fn handle_pe_finished(&mut self, content: FrameContent) -> Reply {
        let key_rate = match content {
            FrameContent::PeFinished {
                transmittance,
                excess_noise,
                reconciliation_efficiency,
                key_rate,
            } => {
                info!(
                    transmittance,
                    excess_noise, reconciliation_efficiency, key_rate, "PE_FINISHED received"
                );
                key_rate
            }
            _ => 0.0,
        };

        let ctx = self
            .state
            .frame_context()
            .cloned()
            .expect("check_code already verified pe_ended_partial");
        self.state = ServerState::PeEnded(ctx);

        if key_rate > 0.0 {
            Frame::new(Code::PeApproved, FrameContent::None)
        } else {
            Frame::new(Code::PeDenied, FrameContent::None)
        }
    }

    /// Runs a hardware operation; on failure this is a §7 "hardware failure
    /// during a frame": log it, end the frame, reset unless configured as
    /// fatal (in which case the caller of [`run`] tears the process down).
    fn run_hardware<F>(&mut self, op: F) -> Result<(), Reply>
    where
        F: FnOnce(&mut H) -> Result<(), HardwareError>,
    {
        match op(&mut self.hardware) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, "hardware facade reported a failure");
                let message = e.to_string();
                if self.config.alice.hardware_failure_is_fatal {
                    self.fatal_hardware_error = Some(e);
                }
                self.state.reset();
                Err(Frame::new(Code::FrameEnded, FrameContent::Text { message }))
            }
        }
    }

    /// Applies an admin-menu action (spec §4.G). Only ever called between
    /// frame reads, never mid-handler (spec §5).
    pub fn apply_admin_action(&mut self, action: AdminAction, config_path: &Path) -> AdminOutcome {
        match action {
            AdminAction::PrintConfig => AdminOutcome::Printed(format!("{:#?}", self.config)),
            AdminAction::ReloadConfig => {
                if self.state.frame_context().is_some() {
                    let reason = "a frame is in progress (frame_prepared or later)".to_string();
                    warn!(reason, "configuration reload refused");
                    return AdminOutcome::ReloadRefused { reason };
                }
                match AliceConfig::load(config_path) {
                    Ok(new_config) => match SequenceAssembler::new(&new_config) {
                        Ok(assembler) => {
                            info!("configuration reloaded");
                            self.config = new_config;
                            self.assembler = assembler;
                            AdminOutcome::Reloaded
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            warn!(reason, "reload failed DSP validation, keeping previous snapshot");
                            AdminOutcome::ReloadRefused { reason }
                        }
                    },
                    Err(e) => {
                        let reason = e.to_string();
                        warn!(reason, "reload failed to parse, keeping previous snapshot");
                        AdminOutcome::ReloadRefused { reason }
                    }
                }
            }
            AdminAction::Reset => {
                let _ = self.hardware.stop();
                self.state.reset();
                info!("operator requested state reset");
                AdminOutcome::Reset
            }
            AdminAction::GracefulStop => {
                let _ = self.hardware.stop();
                let _ = self.hardware.laser_off();
                self.state.disconnect();
                info!("operator requested graceful stop");
                AdminOutcome::Stopping
            }
            AdminAction::Cancel => AdminOutcome::Cancelled,
        }
    }
}

/// Outcome of one admin action, for the CLI to report to the operator.
#[derive(Debug)]
pub enum AdminOutcome {
    Printed(String),
    Reloaded,
    ReloadRefused { reason: String },
    Reset,
    Stopping,
    Cancelled,
}

/// Derives the session key from the peer's `IDENTIFICATION_REQUEST`. A real
/// deployment would negotiate this cryptographically during the handshake;
/// the handshake itself is out of scope here (spec §1), so this is a
/// deterministic stand-in — but from here on every frame's `auth_tag` is
/// checked against it in [`crate::codec::decode`].
fn derive_session_key(serial: &str, version: &str) -> [u8; 16] {
    let mut key = [0u8; 16];
    let bytes: Vec<u8> = serial.bytes().chain(version.bytes()).collect();
    for (i, b) in bytes.iter().enumerate() {
        key[i % 16] ^= *b;
    }
    key
}

/// Runs the accept/receive loop until `shutdown` is set or the operator
/// requests a graceful stop (spec §4.F "Lifecycle", §5).
///
/// Binds once; on every peer disconnect it resets and goes back to
/// accepting (spec §4.F step 1 `SOCKET_DISCONNECTION` handling, spec §8
/// scenario S5).
pub fn run<H, F>(
    config_path: PathBuf,
    mut config: AliceConfig,
    make_hardware: F,
    admin_rx: AdminReceiver,
    shutdown: Arc<AtomicBool>,
) -> Result<(), AliceError>
where
    H: HardwareFacade,
    F: Fn() -> H,
{
    let listener = TcpListener::bind(&config.alice.bind_address)?;
    listener
        .set_nonblocking(true)
        .expect("setting non-blocking mode on a fresh listener cannot fail");

    let mut server = Server::new(config.clone(), make_hardware())?;

    'accept: while !shutdown.load(Ordering::Relaxed) {
        info!(address = %config.alice.bind_address, "waiting for a peer connection");

        let stream = loop {
            if shutdown.load(Ordering::Relaxed) {
                break 'accept;
            }
            drain_admin_actions(&mut server, &admin_rx, &config_path, &mut config);
            match listener.accept() {
                Ok((stream, addr)) => {
                    info!(peer = %addr, "peer connected");
                    break stream;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(POLL_INTERVAL);
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "accept() failed");
                    std::thread::sleep(POLL_INTERVAL);
                    continue;
                }
            }
        };

        stream
            .set_nodelay(true)
            .expect("TCP_NODELAY is supported on every platform this crate targets");
        server.on_connect();
        let outcome = serve_one_peer(&mut server, stream, &admin_rx, &config_path, &mut config, &shutdown);
        server.state = ServerState::Disconnected;

        if let Err(fatal) = outcome {
            error!(error = %fatal, "hardware failure classified fatal by configuration, tearing down");
            return Err(AliceError::Hardware(fatal));
        }
    }

    Ok(())
}

fn drain_admin_actions<H: HardwareFacade>(
    server: &mut Server<H>,
    admin_rx: &AdminReceiver,
    config_path: &Path,
    config: &mut AliceConfig,
) {
    while let Ok(action) = admin_rx.try_recv() {
        let outcome = server.apply_admin_action(action, config_path);
        match outcome {
            // `apply_admin_action` already logs the other outcomes itself;
            // `Printed` is the one the operator expects to actually see, so
            // it goes straight to the console rather than through `tracing`.
            AdminOutcome::Printed(text) => println!("{text}"),
            AdminOutcome::Reloaded => *config = server.config().clone(),
            AdminOutcome::ReloadRefused { .. }
            | AdminOutcome::Reset
            | AdminOutcome::Stopping
            | AdminOutcome::Cancelled => {}
        }
    }
}

/// Serves one connected peer until it disconnects, the operator requests a
/// graceful stop, or a hardware failure classified fatal by configuration
/// occurs (spec §7) — in which case `Err` carries the triggering error and
/// the caller tears the whole process down rather than accepting again.
fn serve_one_peer<H: HardwareFacade>(
    server: &mut Server<H>,
    stream: TcpStream,
    admin_rx: &AdminReceiver,
    config_path: &Path,
    config: &mut AliceConfig,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), HardwareError> {
    stream
        .set_read_timeout(Some(POLL_INTERVAL))
        .expect("setting a read timeout is supported on every platform this crate targets");
    let write_stream = stream.try_clone().expect("cloning a TcpStream handle cannot fail");
    let mut reader = BufReader::new(stream);
    let mut writer = BufWriter::new(write_stream);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            let _ = codec::write_frame(&mut writer, &Frame::new(Code::Disconnection, FrameContent::None));
            return Ok(());
        }
        drain_admin_actions(server, admin_rx, config_path, config);
        if matches!(server.state(), ServerState::Disconnected) {
            return Ok(()); // an admin action (GracefulStop) tore the connection down
        }

        // `set_read_timeout` above turns a no-data wait into a periodic
        // wakeup to re-check the admin channel and shutdown flag; distinguish
        // that from an actual malformed or disconnected stream by peeking
        // before handing the reader to `codec::decode`.
        match reader.fill_buf() {
            Ok(buf) if buf.is_empty() => {
                info!("peer disconnected");
                server.state.disconnect();
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                warn!(error = %e, "read error, disconnecting peer");
                server.state.disconnect();
                return Ok(());
            }
        }

        match codec::decode(&mut reader, server.session_key()) {
            Ok(frame) => {
                let reply = server.handle_frame(frame);
                if codec::write_frame(&mut writer, &reply).is_err() {
                    warn!("failed to write reply, treating as a socket disconnection");
                    server.state.disconnect();
                    return Ok(());
                }
                if let Some(fatal) = server.take_fatal_hardware_error() {
                    return Err(fatal);
                }
            }
            Err(crate::errors::ProtocolError::SocketDisconnection) => {
                info!("peer disconnected");
                server.state.disconnect();
                return Ok(());
            }
            Err(err) => {
                let reply = server.handle_transport_error(&err);
                let _ = codec::write_frame(&mut writer, &reply);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AliceSection, ChangeParameterPolicy, FrameSection, ModulationKind};
    use crate::dsp::Waveform;

    /// A hardware facade whose `load_waveform` always fails, used to exercise
    /// spec §7's "hardware failure during a frame" path without a real mock
    /// that always succeeds.
    struct AlwaysFailsToLoad;

    impl HardwareFacade for AlwaysFailsToLoad {
        fn load_waveform(&mut self, _waveform: &Waveform) -> Result<(), HardwareError> {
            Err(HardwareError::LoadFailed {
                reason: "simulated DAC fault".to_string(),
            })
        }
        fn trigger(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }
        fn voa_set(&mut self, _attenuation_db: f64) -> Result<(), HardwareError> {
            Ok(())
        }
        fn monitoring_read(&mut self) -> Result<f64, HardwareError> {
            Ok(0.0)
        }
        fn laser_on(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }
        fn laser_off(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }
    }

    fn config(hardware_failure_is_fatal: bool) -> AliceConfig {
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
                hardware_failure_is_fatal,
                rng_seed: 1,
                pilots: Vec::new(),
            },
            frame: FrameSection {
                zc_length: 61,
                zc_root: 5,
            },
        }
    }

    fn drive_to_qie_request(server: &mut Server<AlwaysFailsToLoad>) -> Frame {
        server.on_connect();
        server.handle_frame(Frame::new(
            Code::IdentificationRequest,
            FrameContent::Identification {
                serial: "alice-001".to_string(),
                version: "1.0".to_string(),
            },
        ));
        server.handle_frame(Frame::new(
            Code::InitializationRequest,
            FrameContent::Initialization {
                frame_uuid: "frame-x".to_string(),
            },
        ));
        server.handle_frame(Frame::new(Code::QieRequest, FrameContent::None))
    }

    #[test]
    fn hardware_failure_ends_the_frame_and_resets_when_not_fatal() {
        let mut server = Server::new(config(false), AlwaysFailsToLoad).unwrap();
        let reply = drive_to_qie_request(&mut server);
        assert_eq!(reply.code, Code::FrameEnded);
        assert!(matches!(reply.content, FrameContent::Text { .. }), "expected error detail, got {:?}", reply.content);
        assert!(server.take_fatal_hardware_error().is_none());
        assert!(matches!(server.state(), ServerState::Connected));
    }

    #[test]
    fn authentication_failure_clears_client_initialized() {
        let mut server = Server::new(config(false), AlwaysFailsToLoad).unwrap();
        server.on_connect();
        server.handle_frame(Frame::new(
            Code::IdentificationRequest,
            FrameContent::Identification {
                serial: "alice-001".to_string(),
                version: "1.0".to_string(),
            },
        ));
        server.handle_frame(Frame::new(
            Code::InitializationRequest,
            FrameContent::Initialization {
                frame_uuid: "frame-x".to_string(),
            },
        ));
        assert!(matches!(server.state(), ServerState::Initialized { .. }));

        let reply = server.handle_transport_error(&crate::errors::ProtocolError::AuthenticationFailure);

        assert_eq!(reply.code, Code::AuthenticationInvalid);
        assert!(matches!(server.state(), ServerState::Connected));
    }

    #[test]
    fn identification_negotiates_a_session_key() {
        let mut server = Server::new(config(false), AlwaysFailsToLoad).unwrap();
        server.on_connect();
        assert!(server.session_key().is_none());
        server.handle_frame(Frame::new(
            Code::IdentificationRequest,
            FrameContent::Identification {
                serial: "alice-001".to_string(),
                version: "1.0".to_string(),
            },
        ));
        assert!(server.session_key().is_some());
    }

    #[test]
    fn hardware_failure_is_recorded_as_fatal_when_so_configured() {
        let mut server = Server::new(config(true), AlwaysFailsToLoad).unwrap();
        let reply = drive_to_qie_request(&mut server);
        assert_eq!(reply.code, Code::FrameEnded);
        let fatal = server.take_fatal_hardware_error();
        assert!(matches!(fatal, Some(HardwareError::LoadFailed { .. })));
        // Draining the fatal error only happens once.
        assert!(server.take_fatal_hardware_error().is_none());
    }
}
