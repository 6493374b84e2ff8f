//! Component H: Frame Codec.
//!
//! Concretises the wire format the control protocol leaves as "a stable
//! format defined elsewhere" (spec §4.H). Frames are length-prefixed,
//! bincode-serialized payloads with a fixed-width authentication tag and a
//! trailing CRC32, matching the layout the retrieved corpus uses for its own
//! binary protocol frames (length-prefixed `byteorder` headers,
//! `crc32fast`-checked trailers, `serde`/`bincode` payloads).
//!
//! Once a peer has identified itself and negotiated a session key, every
//! later frame's `auth_tag` is checked with an HMAC-SHA256-style equality
//! check over that key (spec §4.H); a mismatch decodes to
//! [`ProtocolError::AuthenticationFailure`] instead of being trusted.
//!
//! ```text
//! +--------+--------+-------------------+-----------+----------+
//! | code   | length | payload (bincode) | auth_tag  | crc32    |
//! | u16 BE | u32 BE | `length` bytes    | 16 bytes  | u32 BE   |
//! +--------+--------+-------------------+-----------+----------+
//! ```

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::errors::ProtocolError;

type HmacSha256 = Hmac<Sha256>;

/// Refuses to allocate a read buffer larger than this for a single frame
/// payload; exceeding it is treated as a malformed length prefix rather than
/// an attempt to allocate gigabytes on a hostile peer's say-so.
const MAX_FRAME_PAYLOAD_BYTES: u32 = 16 * 1024 * 1024;

const AUTH_TAG_LEN: usize = 16;

/// Every message code the control protocol recognises (spec §3 "CodeTable",
/// §4.F). Unlisted wire values decode to [`ProtocolError::UnknownCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Code {
    // Transport-level errors (§4.F step 1)
    SocketDisconnection,
    UnknownCode,
    AuthenticationFailure,
    FrameError,

    // General codes, valid past client_connected (§4.F step 2)
    Abort,
    AbortAck,
    InvalidResponse,
    InvalidResponseAck,
    Disconnection,
    DisconnectionAck,
    ChangeParameterRequest,
    ChangeParameterAccepted,
    ChangeParameterRefused,

    // Phase-gated handler dispatch (§4.F step 4)
    IdentificationRequest,
    IdentificationResponse,
    InitializationRequest,
    InitializationResponse,
    InitializationRequestConfig,
    QieRequest,
    QieReady,
    QieTrigger,
    QieEmissionStarted,
    QieAcquisitionEnded,
    QieEnded,
    PeSymbolsRequest,
    PeSymbolsResponse,
    PeNphotonRequest,
    PeNphotonResponse,
    PeFinished,
    PeApproved,
    PeDenied,
    EcRequest,
    PaRequest,
    FrameEnded,
    FrameEndedAck,

    // Shared refusal for the two phase-gate / unknown-sub-code outcomes.
    UnexpectedCommand,

    // Replies to the remaining transport-level errors (§4.F step 1).
    InvalidContent,
    AuthenticationInvalid,
}

/// Structured payload carried by a [`Frame`]. Most codes carry no data
/// (`None`); the handful that do get their own variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum FrameContent {
    #[default]
    None,
    Identification {
        serial: String,
        version: String,
    },
    Initialization {
        frame_uuid: String,
    },
    PeSymbolsRequest {
        indices: Vec<usize>,
    },
    PeSymbolsResponse {
        symbols: Vec<(f64, f64)>,
    },
    PeNphotonResponse {
        mean_photon_number: f64,
        suspect: bool,
    },
    PeFinished {
        transmittance: f64,
        excess_noise: f64,
        reconciliation_efficiency: f64,
        key_rate: f64,
    },
    ChangeParameterRequest {
        field: String,
        value: String,
    },
    Text {
        message: String,
    },
}

/// A decoded `(code, content)` pair plus the authentication tag it arrived
/// with (spec §3 CodeTable / §4.H).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub code: Code,
    pub content: FrameContent,
    pub auth_tag: [u8; AUTH_TAG_LEN],
}

impl Frame {
    pub fn new(code: Code, content: FrameContent) -> Self {
        Self {
            code,
            content,
            auth_tag: [0u8; AUTH_TAG_LEN],
        }
    }

    pub fn with_auth_tag(code: Code, content: FrameContent, auth_tag: [u8; AUTH_TAG_LEN]) -> Self {
        Self { code, content, auth_tag }
    }
}

/// Serializes `frame` to the wire format described at module level.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    let payload = bincode::serialize(&frame.content)
        .map_err(|source| ProtocolError::FrameError { reason: source.to_string() })?;
    if payload.len() as u64 > MAX_FRAME_PAYLOAD_BYTES as u64 {
        return Err(ProtocolError::FrameError {
            reason: format!("payload of {} bytes exceeds the maximum frame size", payload.len()),
        });
    }

    let mut body = Vec::with_capacity(2 + 4 + payload.len() + AUTH_TAG_LEN);
    body.write_u16::<BigEndian>(code_to_wire(frame.code))
        .expect("writes to a Vec never fail");
    body.write_u32::<BigEndian>(payload.len() as u32)
        .expect("writes to a Vec never fail");
    body.extend_from_slice(&payload);
    body.extend_from_slice(&frame.auth_tag);

    let crc = crc32fast::hash(&body);
    let mut out = body;
    out.write_u32::<BigEndian>(crc).expect("writes to a Vec never fail");
    Ok(out)
}

/// Reads and decodes exactly one frame from `reader`.
///
/// An EOF on the first read (no bytes at all) is reported as
/// [`ProtocolError::SocketDisconnection`] — the peer closed the connection
/// between frames, which is the expected idle-disconnect path. An EOF
/// partway through a frame is a malformed/truncated frame
/// ([`ProtocolError::FrameError`]).
///
/// `session_key` is `None` until `IDENTIFICATION_REQUEST` has negotiated one;
/// once `Some`, every frame except `IDENTIFICATION_REQUEST` itself must carry
/// an `auth_tag` matching that key or this returns
/// [`ProtocolError::AuthenticationFailure`].
pub fn decode(reader: &mut impl Read, session_key: Option<&[u8; AUTH_TAG_LEN]>) -> Result<Frame, ProtocolError> {
    let code_wire = match reader.read_u16::<BigEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::SocketDisconnection)
        }
        Err(e) => return Err(io_to_frame_error(e)),
    };

    let length = reader.read_u32::<BigEndian>().map_err(io_to_frame_error)?;
    if length > MAX_FRAME_PAYLOAD_BYTES {
        return Err(ProtocolError::FrameError {
            reason: format!("declared length {length} exceeds the maximum frame size"),
        });
    }

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).map_err(io_to_frame_error)?;

    let mut auth_tag = [0u8; AUTH_TAG_LEN];
    reader.read_exact(&mut auth_tag).map_err(io_to_frame_error)?;

    let received_crc = reader.read_u32::<BigEndian>().map_err(io_to_frame_error)?;

    let mut body = Vec::with_capacity(2 + 4 + payload.len() + AUTH_TAG_LEN);
    body.write_u16::<BigEndian>(code_wire).expect("writes to a Vec never fail");
    body.write_u32::<BigEndian>(length).expect("writes to a Vec never fail");
    body.extend_from_slice(&payload);
    body.extend_from_slice(&auth_tag);
    let computed_crc = crc32fast::hash(&body);
    if computed_crc != received_crc {
        return Err(ProtocolError::FrameError {
            reason: "CRC32 mismatch".to_string(),
        });
    }

    let code = wire_to_code(code_wire)?;
    let content: FrameContent = bincode::deserialize(&payload)
        .map_err(|source| ProtocolError::FrameError { reason: source.to_string() })?;

    let frame = Frame::with_auth_tag(code, content, auth_tag);

    if let Some(key) = session_key {
        if frame.code != Code::IdentificationRequest {
            verify_auth_tag(&frame, key)?;
        }
    }

    Ok(frame)
}

/// Recomputes `frame`'s expected `auth_tag` from `key` and the frame's code
/// and content, and compares it against the one actually carried.
fn verify_auth_tag(frame: &Frame, key: &[u8; AUTH_TAG_LEN]) -> Result<(), ProtocolError> {
    let expected = compute_auth_tag(key, frame.code, &frame.content)?;
    if expected != frame.auth_tag {
        return Err(ProtocolError::AuthenticationFailure);
    }
    Ok(())
}

/// HMAC-SHA256 over the wire code and bincode payload, truncated to
/// [`AUTH_TAG_LEN`] bytes.
fn compute_auth_tag(
    key: &[u8; AUTH_TAG_LEN],
    code: Code,
    content: &FrameContent,
) -> Result<[u8; AUTH_TAG_LEN], ProtocolError> {
    let payload = bincode::serialize(content)
        .map_err(|source| ProtocolError::FrameError { reason: source.to_string() })?;
    let mut mac = HmacSha256::new_from_slice(key).expect("a 16-byte key is valid for HMAC-SHA256");
    mac.update(&code_to_wire(code).to_be_bytes());
    mac.update(&payload);
    let full = mac.finalize().into_bytes();
    let mut tag = [0u8; AUTH_TAG_LEN];
    tag.copy_from_slice(&full[..AUTH_TAG_LEN]);
    Ok(tag)
}

pub fn write_frame(writer: &mut impl Write, frame: &Frame) -> io::Result<()> {
    let bytes = encode(frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    writer.write_all(&bytes)
}

fn io_to_frame_error(source: io::Error) -> ProtocolError {
    if source.kind() == io::ErrorKind::UnexpectedEof {
        ProtocolError::FrameError {
            reason: "truncated frame".to_string(),
        }
    } else {
        ProtocolError::FrameError { reason: source.to_string() }
    }
}

/// Stable wire values for [`Code`]. New codes must be appended at the end
/// so previously-deployed peers keep decoding correctly.
fn code_to_wire(code: Code) -> u16 {
    use Code::*;
    match code {
        SocketDisconnection => 0,
        UnknownCode => 1,
        AuthenticationFailure => 2,
        FrameError => 3,
        Abort => 4,
        AbortAck => 5,
        InvalidResponse => 6,
        InvalidResponseAck => 7,
        Disconnection => 8,
        DisconnectionAck => 9,
        ChangeParameterRequest => 10,
        ChangeParameterAccepted => 11,
        ChangeParameterRefused => 12,
        IdentificationRequest => 13,
        IdentificationResponse => 14,
        InitializationRequest => 15,
        InitializationResponse => 16,
        InitializationRequestConfig => 17,
        QieRequest => 18,
        QieReady => 19,
        QieTrigger => 20,
        QieEmissionStarted => 21,
        QieAcquisitionEnded => 22,
        QieEnded => 23,
        PeSymbolsRequest => 24,
        PeSymbolsResponse => 25,
        PeNphotonRequest => 26,
        PeNphotonResponse => 27,
        PeFinished => 28,
        PeApproved => 29,
        PeDenied => 30,
        EcRequest => 31,
        PaRequest => 32,
        FrameEnded => 33,
        FrameEndedAck => 34,
        UnexpectedCommand => 35,
        InvalidContent => 36,
        AuthenticationInvalid => 37,
    }
}

fn wire_to_code(wire: u16) -> Result<Code, ProtocolError> {
    use Code::*;
    Ok(match wire {
        0 => SocketDisconnection,
        1 => UnknownCode,
        2 => AuthenticationFailure,
        3 => FrameError,
        4 => Abort,
        5 => AbortAck,
        6 => InvalidResponse,
        7 => InvalidResponseAck,
        8 => Disconnection,
        9 => DisconnectionAck,
        10 => ChangeParameterRequest,
        11 => ChangeParameterAccepted,
        12 => ChangeParameterRefused,
        13 => IdentificationRequest,
        14 => IdentificationResponse,
        15 => InitializationRequest,
        16 => InitializationResponse,
        17 => InitializationRequestConfig,
        18 => QieRequest,
        19 => QieReady,
        20 => QieTrigger,
        21 => QieEmissionStarted,
        22 => QieAcquisitionEnded,
        23 => QieEnded,
        24 => PeSymbolsRequest,
        25 => PeSymbolsResponse,
        26 => PeNphotonRequest,
        27 => PeNphotonResponse,
        28 => PeFinished,
        29 => PeApproved,
        30 => PeDenied,
        31 => EcRequest,
        32 => PaRequest,
        33 => FrameEnded,
        34 => FrameEndedAck,
        35 => UnexpectedCommand,
        36 => InvalidContent,
        37 => AuthenticationInvalid,
        other => return Err(ProtocolError::UnknownCode(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_frame_with_no_payload() {
        let frame = Frame::new(Code::IdentificationRequest, FrameContent::None);
        let bytes = encode(&frame).unwrap();
        let decoded = decode(&mut &bytes[..], None).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn round_trips_a_frame_with_a_payload() {
        let frame = Frame::new(
            Code::PeSymbolsRequest,
            FrameContent::PeSymbolsRequest { indices: vec![0, 7, 1023] },
        );
        let bytes = encode(&frame).unwrap();
        let decoded = decode(&mut &bytes[..], None).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn corrupted_crc_is_a_frame_error() {
        let frame = Frame::new(Code::Abort, FrameContent::None);
        let mut bytes = encode(&frame).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = decode(&mut &bytes[..], None).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameError { .. }));
    }

    #[test]
    fn unknown_code_is_reported() {
        let mut bytes = vec![];
        bytes.write_u16::<BigEndian>(9999).unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap();
        bytes.extend_from_slice(&[0u8; AUTH_TAG_LEN]);
        let crc = crc32fast::hash(&bytes);
        bytes.write_u32::<BigEndian>(crc).unwrap();

        let err = decode(&mut &bytes[..], None).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCode(9999)));
    }

    #[test]
    fn empty_stream_is_a_socket_disconnection() {
        let bytes: [u8; 0] = [];
        let err = decode(&mut &bytes[..], None).unwrap_err();
        assert!(matches!(err, ProtocolError::SocketDisconnection));
    }

    #[test]
    fn truncated_frame_is_a_frame_error() {
        let frame = Frame::new(Code::Abort, FrameContent::None);
        let mut bytes = encode(&frame).unwrap();
        bytes.truncate(bytes.len() - 3);
        let err = decode(&mut &bytes[..], None).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameError { .. }));
    }

    #[test]
    fn a_frame_without_a_session_key_is_accepted_regardless_of_auth_tag() {
        let frame = Frame::new(Code::Abort, FrameContent::None);
        let bytes = encode(&frame).unwrap();
        assert!(decode(&mut &bytes[..], None).is_ok());
    }

    #[test]
    fn a_correctly_tagged_frame_passes_verification_once_a_session_key_is_set() {
        let key = [7u8; AUTH_TAG_LEN];
        let code = Code::Abort;
        let content = FrameContent::None;
        let tag = compute_auth_tag(&key, code, &content).unwrap();
        let frame = Frame::with_auth_tag(code, content, tag);
        let bytes = encode(&frame).unwrap();
        assert!(decode(&mut &bytes[..], Some(&key)).is_ok());
    }

    #[test]
    fn a_mismatched_auth_tag_is_an_authentication_failure() {
        let key = [7u8; AUTH_TAG_LEN];
        let frame = Frame::with_auth_tag(Code::Abort, FrameContent::None, [0u8; AUTH_TAG_LEN]);
        let bytes = encode(&frame).unwrap();
        let err = decode(&mut &bytes[..], Some(&key)).unwrap_err();
        assert!(matches!(err, ProtocolError::AuthenticationFailure));
    }

    #[test]
    fn identification_request_is_exempt_from_auth_tag_verification() {
        let key = [7u8; AUTH_TAG_LEN];
        let frame = Frame::new(Code::IdentificationRequest, FrameContent::None);
        let bytes = encode(&frame).unwrap();
        assert!(decode(&mut &bytes[..], Some(&key)).is_ok());
    }
}
