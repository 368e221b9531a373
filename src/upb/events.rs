use serde::Serialize;

use super::handshake::HandshakeInfo;
use super::packet::DecodedPacket;
use super::types::{PimCommand, PimMessage, UpbTransmission};

/// Which connection a chunk of bytes (and every event decoded from it) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Pim,
    Client,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Pim => write!(f, "PIM"),
            Side::Client => write!(f, "Upstart"),
        }
    }
}

/// Everything the decode engine reports. Failures are events too; the engine never
/// stops on bad input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeEvent {
    HandshakeInfo(HandshakeInfo),
    ClientHello {
        username: String,
        wrapped: bool,
    },
    AuthResult {
        success: bool,
        reason: String,
    },
    UnparsableFrame {
        raw: Vec<u8>,
    },
    ProtocolMessage {
        kind: PimMessage,
        data: String,
    },
    PimReport {
        transmission: UpbTransmission,
        #[serde(skip_serializing_if = "Option::is_none")]
        register_start: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        register_payload: Option<Vec<u8>>,
    },
    ClientCommand {
        command: PimCommand,
        payload: Vec<u8>,
    },
    Packet(DecodedPacket),
    BadSequence {
        expected: u8,
        got: u8,
    },
    LengthMismatch {
        declared: usize,
        actual: usize,
    },
    ChecksumMismatch {
        expected: u8,
        got: u8,
    },
    /// Invariant violation or field the protocol forbids; decoding continued.
    ProtocolError {
        reason: String,
    },
    /// Error text from the PIM that the proxy has no handling for.
    UnhandledError {
        message: String,
    },
}

/// An event tagged with its origin, as passed from the relay to the display layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideEvent {
    pub side: Side,
    pub event: DecodeEvent,
}
