//! Component F (state half): `ServerState`, `FrameContext`, and `check_code`.
//!
//! Spec §3 describes server state as a tuple of monotonically-acquired
//! boolean flags (`client_connected -> client_initialized -> frame_prepared
//! -> frame_sent -> pe_ended -> ec_initialized -> ec_ended -> pa_ended`).
//! Per the redesign note in spec §9, that boolean soup becomes a single
//! tagged-variant enum here: each variant carries exactly the data that
//! phase has available, and `check_code` becomes a total function over
//! `(Code, &ServerState)` by construction rather than an ad hoc predicate
//! over eight independent flags.

use crate::codec::Code;
use crate::dsp::Waveform;
use crate::estimator::PhotonEstimate;
use crate::symbol_source::BasebandBlock;

/// Per-frame mutable record (spec §3 "FrameContext"). Only ever lives inside
/// a [`ServerState`] variant from `FramePrepared` onward.
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame_uuid: String,
    pub symbols: BasebandBlock,
    pub quantum_waveform: Waveform,
    pub photon_estimate: Option<PhotonEstimate>,
}

/// The server's protocol-phase state (spec §3 "ServerState"), encoded as a
/// tagged variant per spec §9's redesign note. Variants are listed in the
/// order their corresponding flag tuple is acquired; `flags()` recovers the
/// boolean view for anything that still wants to reason about it (tests,
/// logging).
#[derive(Debug, Clone)]
pub enum ServerState {
    /// No peer connected. The only state in which the accept loop runs.
    Disconnected,
    /// `client_connected`. Socket accepted, nothing negotiated yet.
    Connected,
    /// `client_connected` plus a successful `IDENTIFICATION_REQUEST`. Not
    /// itself named in spec §3's flag tuple, but required as the
    /// `INITIALIZATION_REQUEST` pre-state in spec §4.F's dispatch table —
    /// resolved here as an implementation-level sub-state of `connected`.
    Authenticated,
    /// `client_initialized`.
    Initialized { frame_uuid: String },
    /// `frame_prepared`.
    FramePrepared(FrameContext),
    /// `frame_sent`.
    FrameSent(FrameContext),
    /// `pe_ended` "partial": `QIE_ACQUISITION_ENDED` has run (hardware
    /// stopped, photon number estimated) but `PE_FINISHED` has not yet
    /// delivered Bob's accept/deny decision.
    PeEndedPartial(FrameContext),
    /// `pe_ended`: Bob's `PE_FINISHED` decision has been recorded.
    PeEnded(FrameContext),
}

/// Boolean view of [`ServerState`], matching spec §3's flag tuple plus the
/// `authenticated` sub-state described above. Exists for readability in
/// tests and log lines; `check_code` below matches on `ServerState`
/// directly rather than reconstructing flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateFlags {
    pub client_connected: bool,
    pub authenticated: bool,
    pub client_initialized: bool,
    pub frame_prepared: bool,
    pub frame_sent: bool,
    pub pe_ended_partial: bool,
    pub pe_ended: bool,
}

impl ServerState {
    pub fn flags(&self) -> StateFlags {
        match self {
            ServerState::Disconnected => StateFlags::default(),
            ServerState::Connected => StateFlags {
                client_connected: true,
                ..Default::default()
            },
            ServerState::Authenticated => StateFlags {
                client_connected: true,
                authenticated: true,
                ..Default::default()
            },
            ServerState::Initialized { .. } => StateFlags {
                client_connected: true,
                authenticated: true,
                client_initialized: true,
                ..Default::default()
            },
            ServerState::FramePrepared(_) => StateFlags {
                client_connected: true,
                authenticated: true,
                client_initialized: true,
                frame_prepared: true,
                ..Default::default()
            },
            ServerState::FrameSent(_) => StateFlags {
                client_connected: true,
                authenticated: true,
                client_initialized: true,
                frame_prepared: true,
                frame_sent: true,
                ..Default::default()
            },
            ServerState::PeEndedPartial(_) => StateFlags {
                client_connected: true,
                authenticated: true,
                client_initialized: true,
                frame_prepared: true,
                frame_sent: true,
                pe_ended_partial: true,
                ..Default::default()
            },
            ServerState::PeEnded(_) => StateFlags {
                client_connected: true,
                authenticated: true,
                client_initialized: true,
                frame_prepared: true,
                frame_sent: true,
                pe_ended_partial: true,
                pe_ended: true,
            },
        }
    }

    pub fn frame_context(&self) -> Option<&FrameContext> {
        match self {
            ServerState::FramePrepared(ctx)
            | ServerState::FrameSent(ctx)
            | ServerState::PeEndedPartial(ctx)
            | ServerState::PeEnded(ctx) => Some(ctx),
            _ => None,
        }
    }

    pub fn frame_context_mut(&mut self) -> Option<&mut FrameContext> {
        match self {
            ServerState::FramePrepared(ctx)
            | ServerState::FrameSent(ctx)
            | ServerState::PeEndedPartial(ctx)
            | ServerState::PeEnded(ctx) => Some(ctx),
            _ => None,
        }
    }

    /// Human-readable state name, used in `UNEXPECTED_COMMAND` logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerState::Disconnected => "disconnected",
            ServerState::Connected => "connected",
            ServerState::Authenticated => "authenticated",
            ServerState::Initialized { .. } => "client_initialized",
            ServerState::FramePrepared(_) => "frame_prepared",
            ServerState::FrameSent(_) => "frame_sent",
            ServerState::PeEndedPartial(_) => "pe_ended_partial",
            ServerState::PeEnded(_) => "pe_ended",
        }
    }

    /// `reset()` (spec §3): clears every flag downstream of
    /// `client_connected`, returning to a freshly-connected, unauthenticated
    /// session. Used for `ABORT` (peer stays connected, spec §4.F) and for
    /// `FRAME_ENDED`'s per-frame field clearing is handled separately by
    /// [`ServerState::end_frame`] since it must preserve `client_initialized`.
    pub fn reset(&mut self) {
        *self = ServerState::Connected;
    }

    /// Full teardown on `SOCKET_DISCONNECTION` / peer-initiated
    /// `DISCONNECTION`: no peer is considered connected at all (spec §8
    /// invariant 4).
    pub fn disconnect(&mut self) {
        *self = ServerState::Disconnected;
    }

    /// `FRAME_ENDED` (spec §4.F): clears per-frame fields but keeps
    /// `client_initialized` — the peer may immediately start a new frame
    /// with `QIE_REQUEST` without re-authenticating.
    pub fn end_frame(&mut self) {
        if let Some(ctx) = self.frame_context() {
            let frame_uuid = ctx.frame_uuid.clone();
            *self = ServerState::Initialized { frame_uuid };
        }
    }
}

/// Whether `code` is valid to dispatch from `state` (spec §4.F step 3,
/// "phase gate"). Per spec §8 invariant 5, when this returns `false` the
/// caller must reply `UNEXPECTED_COMMAND` and leave `state` untouched.
///
/// General codes (`ABORT`, `INVALID_RESPONSE`, `DISCONNECTION`,
/// `CHANGE_PARAMETER_REQUEST`) are valid in any state past
/// `client_connected` and are not routed through this gate by the server
/// loop (spec §4.F step 2 runs before step 3); they are included here too
/// so `check_code` remains a total, state-machine-complete function.
pub fn check_code(code: Code, state: &ServerState) -> bool {
    use Code::*;
    let flags = state.flags();

    match code {
        Abort | InvalidResponse | Disconnection | ChangeParameterRequest => flags.client_connected,

        IdentificationRequest => flags.client_connected,
        InitializationRequest | InitializationRequestConfig => flags.authenticated,
        QieRequest => flags.client_initialized,
        QieTrigger => flags.frame_prepared && !flags.frame_sent,
        QieAcquisitionEnded => flags.frame_sent && !flags.pe_ended_partial,
        PeSymbolsRequest => flags.frame_sent,
        PeNphotonRequest => flags.pe_ended_partial,
        PeFinished => flags.pe_ended_partial && !flags.pe_ended,
        EcRequest => flags.pe_ended,
        PaRequest => flags.pe_ended, // spec: EC is unimplemented, so `ec_ended` never becomes true
        FrameEnded => flags.client_initialized,

        // Transport-level codes and reply-only codes are never dispatched
        // through the phase gate; the server loop handles them earlier
        // (step 1) or only ever emits them (never receives them).
        SocketDisconnection | UnknownCode | AuthenticationFailure | FrameError => true,
        AbortAck | InvalidResponseAck | DisconnectionAck | ChangeParameterAccepted
        | ChangeParameterRefused | IdentificationResponse | InitializationResponse | QieReady
        | QieEmissionStarted | QieEnded | PeSymbolsResponse | PeNphotonResponse | PeApproved
        | PeDenied | FrameEndedAck | UnexpectedCommand | InvalidContent | AuthenticationInvalid => {
            true
        }
    }
}
