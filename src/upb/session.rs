//! # Per-connection decoders
//!
//! [`PimSession`] and [`ClientSession`] each own a [`FrameDetector`] and turn the byte
//! chunks of one connection into [`DecodeEvent`]s. Every chunk is appended and then
//! drained synchronously until no complete frame remains.
//!
//! The two sessions are independent except for the [`SharedHandshake`] cell: the PIM
//! side stores the challenge, the authentication requirement and the PIM's verdict; the
//! client side reads them to verify credentials and to pick its framing discipline.
//!
//! ## Usage
//!
//! ```rust
//! use upbproxy::upb::session::{ClientSession, PimSession, SharedHandshake, StreamDecoder};
//!
//! let shared = SharedHandshake::new(None);
//! let mut pim = PimSession::new(shared.clone());
//! let mut client = ClientSession::new(shared);
//!
//! let events = pim.feed(b"PIM/5.2/PU/NO AUTH\0PA\r");
//! assert_eq!(events.len(), 2);
//! let _ = client.feed(b"");
//! ```

use log::{debug, trace};
use std::sync::{Arc, Mutex, MutexGuard};

use super::auth::{AuthState, Authenticator, Credentials};
use super::checksum::checksum;
use super::error::{AuthError, DecodeError};
use super::events::{DecodeEvent, Side};
use super::framing::{Frame, FrameDetector, FramingMode, GatewayLayout};
use super::handshake::{
    parse_auth_reply, parse_client_hello, parse_pim_hello, HandshakeInfo, PimHello,
};
use super::hex;
use super::packet;
use super::pulse::{PulseError, PulseReassembler};
use super::types::{GatewayCommand, PimCommand, PimMessage, UpbTransmission};
use crate::logutil::hex_snippet;

/// Handshake state visible to both connections of a proxied session.
#[derive(Debug)]
pub struct HandshakeCell {
    pub auth: Authenticator,
    /// `None` until the PIM hello has been seen.
    pub auth_required: Option<bool>,
    /// Client asked for binary gateway framing.
    pub wrapped: bool,
    /// PIM answered `AUTH_SUCCEEDED`.
    pub authenticated: bool,
    /// PIM's answer to the latest login; cleared by each new hello.
    pub verdict: Option<bool>,
    pub credentials_sent: bool,
}

#[derive(Debug, Clone)]
pub struct SharedHandshake(Arc<Mutex<HandshakeCell>>);

impl SharedHandshake {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self(Arc::new(Mutex::new(HandshakeCell {
            auth: Authenticator::new(credentials),
            auth_required: None,
            wrapped: false,
            authenticated: false,
            verdict: None,
            credentials_sent: false,
        })))
    }

    fn lock(&self) -> MutexGuard<'_, HandshakeCell> {
        // A panic elsewhere cannot leave the cell half-written; keep using it.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn authenticated(&self) -> bool {
        self.lock().authenticated
    }

    pub fn wrapped(&self) -> bool {
        self.lock().wrapped
    }

    pub fn auth_required(&self) -> Option<bool> {
        self.lock().auth_required
    }

    pub fn auth_state(&self) -> AuthState {
        self.lock().auth.state()
    }

    pub fn has_challenge(&self) -> bool {
        self.lock().auth.challenge().is_some()
    }

    pub fn verdict(&self) -> Option<bool> {
        self.lock().verdict
    }
}

/// Byte-stream decoder for one side of the proxy.
pub trait StreamDecoder: Send {
    fn side(&self) -> Side;
    fn mode(&self) -> FramingMode;
    /// Treat the stream as already past the handshake, for captures taken mid-session.
    fn skip_handshake(&mut self);
    /// Append `chunk` and decode every frame it completes.
    fn feed(&mut self, chunk: &[u8]) -> Vec<DecodeEvent>;
}

/// Parse a complete UPB packet and report it.
fn emit_packet(bytes: &[u8], out: &mut Vec<DecodeEvent>) {
    match packet::parse(bytes) {
        Ok(p) => {
            if p.control.reserved {
                out.push(DecodeEvent::ProtocolError {
                    reason: "reserved control bit set".to_string(),
                });
            }
            out.push(DecodeEvent::Packet(p));
        }
        Err(DecodeError::LengthMismatch { declared, actual }) => {
            out.push(DecodeEvent::LengthMismatch { declared, actual });
        }
        Err(e) => out.push(DecodeEvent::ProtocolError {
            reason: format!("packet {}: {}", hex_snippet(bytes, 32), e),
        }),
    }
}

fn protocol_message(kind: PimMessage, data: &[u8]) -> DecodeEvent {
    DecodeEvent::ProtocolMessage {
        kind,
        data: String::from_utf8_lossy(data).into_owned(),
    }
}

fn unparsable(raw: &[u8]) -> DecodeEvent {
    DecodeEvent::UnparsableFrame { raw: raw.to_vec() }
}

/// Decoder for bytes arriving from the PIM.
#[derive(Debug)]
pub struct PimSession {
    detector: FrameDetector,
    pulse: PulseReassembler,
    info: Option<HandshakeInfo>,
    authenticated: bool,
    shared: SharedHandshake,
}

impl PimSession {
    pub fn new(shared: SharedHandshake) -> Self {
        Self {
            detector: FrameDetector::new(GatewayLayout::FromPim),
            pulse: PulseReassembler::new(),
            info: None,
            authenticated: false,
            shared,
        }
    }

    /// Hello fields of the current handshake, once received.
    pub fn info(&self) -> Option<&HandshakeInfo> {
        self.info.as_ref()
    }

    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn reassembler(&self) -> &PulseReassembler {
        &self.pulse
    }

    /// Back to the freshly-connected state.
    pub fn reset(&mut self) {
        self.detector.clear();
        self.pulse.reset();
        self.info = None;
        self.authenticated = false;
    }

    fn handle_handshake(&mut self, frame: &[u8], out: &mut Vec<DecodeEvent>) {
        if self.info.is_none() {
            self.handle_hello(frame, out);
        } else {
            self.handle_auth_reply(frame, out);
        }
    }

    fn handle_hello(&mut self, frame: &[u8], out: &mut Vec<DecodeEvent>) {
        match parse_pim_hello(frame) {
            Ok(PimHello::Error(message)) => out.push(DecodeEvent::UnhandledError { message }),
            Ok(PimHello::Hello { info, challenge }) => {
                {
                    let mut cell = self.shared.lock();
                    cell.auth_required = Some(info.auth_required);
                    cell.verdict = None;
                    match challenge {
                        Some(c) => cell.auth.set_challenge(c),
                        None if info.auth_required => out.push(DecodeEvent::ProtocolError {
                            reason: "authentication required but no challenge sent".to_string(),
                        }),
                        None => {}
                    }
                }
                if !info.auth_required {
                    self.detector.set_mode(FramingMode::LineOriented);
                }
                debug!(
                    "PIM hello: {} v{} protocol {} ({})",
                    info.prefix, info.version, info.protocol, info.auth
                );
                out.push(DecodeEvent::HandshakeInfo(info.clone()));
                self.info = Some(info);
            }
            Err(e) => {
                debug!("Unparsable PIM hello: {}", e);
                out.push(unparsable(frame));
            }
        }
    }

    fn handle_auth_reply(&mut self, frame: &[u8], out: &mut Vec<DecodeEvent>) {
        let reply = match parse_auth_reply(frame) {
            Ok(r) => r,
            Err(e) => {
                debug!("Unparsable PIM auth reply: {}", e);
                out.push(unparsable(frame));
                return;
            }
        };
        let wrapped = {
            let mut cell = self.shared.lock();
            cell.authenticated = reply.success;
            cell.verdict = Some(reply.success);
            cell.wrapped
        };
        if reply.success {
            self.authenticated = true;
            self.detector.set_mode(if wrapped {
                FramingMode::BinaryGateway
            } else {
                FramingMode::LineOriented
            });
        } else {
            // The next attempt starts from a new hello and challenge.
            self.info = None;
        }
        out.push(DecodeEvent::AuthResult {
            success: reply.success,
            reason: format!("PIM verdict ({})", reply.client_info),
        });
    }

    fn handle_line(&mut self, line: &[u8], out: &mut Vec<DecodeEvent>) {
        let Some((&code, data)) = line.split_first() else {
            return;
        };
        let kind = PimMessage::from_code(code);
        if let PimMessage::Unrecognized(_) = kind {
            out.push(unparsable(line));
            return;
        }
        if kind == PimMessage::PimReport {
            self.handle_report(line, data, out);
            return;
        }

        if let PimMessage::Data(_) | PimMessage::Transmitted = kind {
            let crumb = match kind {
                PimMessage::Data(c) => Some(c),
                _ => None,
            };
            let Some((crumb, sequence)) = pulse_fields(crumb, data) else {
                out.push(unparsable(line));
                return;
            };
            out.push(protocol_message(kind, data));
            self.handle_pulse(crumb, sequence, kind == PimMessage::Transmitted, out);
            return;
        }

        out.push(protocol_message(kind, data));
        match kind {
            PimMessage::Ack | PimMessage::Nak => {
                if let Some(bytes) = self.pulse.finish() {
                    trace!("Pulse packet complete: {}", hex_snippet(&bytes, 64));
                    emit_packet(&bytes, out);
                }
            }
            PimMessage::Idle => {
                if self.pulse.in_flight() {
                    out.push(DecodeEvent::ProtocolError {
                        reason: format!(
                            "idle with partial packet in flight (byte {}, crumb {})",
                            self.pulse.byte_index(),
                            self.pulse.crumb_index()
                        ),
                    });
                }
                self.pulse.reset();
            }
            _ => self.pulse.reset(),
        }
    }

    fn handle_pulse(
        &mut self,
        crumb: u8,
        sequence: u8,
        transmitted: bool,
        out: &mut Vec<DecodeEvent>,
    ) {
        match self.pulse.deposit(crumb, sequence) {
            Ok(()) => {
                if transmitted {
                    self.pulse.mark_transmitted();
                }
            }
            Err(PulseError::BadSequence { expected, got }) => {
                out.push(DecodeEvent::BadSequence { expected, got });
            }
            Err(e @ PulseError::Overflow) => {
                out.push(DecodeEvent::ProtocolError {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn handle_report(&mut self, line: &[u8], data: &[u8], out: &mut Vec<DecodeEvent>) {
        let Some((&code, body)) = data.split_first() else {
            out.push(unparsable(line));
            return;
        };
        let transmission = UpbTransmission::from_code(code);
        match transmission {
            UpbTransmission::Unrecognized(_) => out.push(unparsable(line)),
            UpbTransmission::Message => match hex::decode(body) {
                Ok(bytes) => {
                    out.push(DecodeEvent::PimReport {
                        transmission,
                        register_start: None,
                        register_payload: None,
                    });
                    emit_packet(&bytes, out);
                }
                Err(_) => out.push(unparsable(line)),
            },
            UpbTransmission::PimRegisters => match hex::decode(body) {
                Ok(bytes) => {
                    let (start, payload) = match bytes.split_first() {
                        Some((&s, rest)) => (Some(s), Some(rest.to_vec())),
                        None => (None, None),
                    };
                    out.push(DecodeEvent::PimReport {
                        transmission,
                        register_start: start,
                        register_payload: payload,
                    });
                }
                Err(_) => out.push(unparsable(line)),
            },
            _ => out.push(DecodeEvent::PimReport {
                transmission,
                register_start: None,
                register_payload: None,
            }),
        }
    }
}

impl StreamDecoder for PimSession {
    fn side(&self) -> Side {
        Side::Pim
    }

    fn mode(&self) -> FramingMode {
        self.detector.mode()
    }

    fn skip_handshake(&mut self) {
        self.detector.set_mode(FramingMode::LineOriented);
    }

    fn feed(&mut self, chunk: &[u8]) -> Vec<DecodeEvent> {
        self.detector.push(chunk);
        let mut out = Vec::new();
        while let Some(frame) = self.detector.next_frame() {
            match frame {
                Frame::Handshake(f) => self.handle_handshake(&f, &mut out),
                Frame::Line(l) => self.handle_line(&l, &mut out),
                Frame::Gateway {
                    command: GatewayCommand::SendToSerial,
                    payload,
                } => {
                    let line = strip_cr(&payload);
                    if line.len() > 1 {
                        self.handle_line(line, &mut out);
                    }
                }
                Frame::Gateway { command, .. } => trace!("PIM gateway {:?}", command),
                Frame::Unparsable(raw) => out.push(unparsable(&raw)),
            }
        }
        out
    }
}

/// Crumb and sequence number of a pulse line. `crumb` is `None` for transmitted
/// echoes, whose crumb is the first digit and must be at most 3.
fn pulse_fields(crumb: Option<u8>, data: &[u8]) -> Option<(u8, u8)> {
    let (first, sequence) = match data {
        [a, b, ..] => (hex::digit(*a).ok()?, hex::digit(*b).ok()?),
        _ => return None,
    };
    match crumb {
        Some(v) => Some((v, sequence)),
        None if first <= 3 => Some((first, sequence)),
        None => None,
    }
}

fn strip_cr(payload: &[u8]) -> &[u8] {
    payload.strip_suffix(b"\r").unwrap_or(payload)
}

/// Decoder for bytes arriving from the client.
#[derive(Debug)]
pub struct ClientSession {
    detector: FrameDetector,
    shared: SharedHandshake,
    /// A `WRAPPED` login was sent and the PIM has not answered yet.
    awaiting_verdict: bool,
}

impl ClientSession {
    pub fn new(shared: SharedHandshake) -> Self {
        Self {
            detector: FrameDetector::new(GatewayLayout::FromClient),
            shared,
            awaiting_verdict: false,
        }
    }

    pub fn reset(&mut self) {
        self.detector.clear();
        self.awaiting_verdict = false;
    }

    /// Gateway frames can follow a `WRAPPED` login before the PIM's verdict has been
    /// decoded. Their headers contain NUL bytes, so they stay buffered until the
    /// verdict picks the framing.
    fn holding(&mut self) -> bool {
        if self.awaiting_verdict && self.shared.verdict().is_some() {
            self.awaiting_verdict = false;
        }
        self.awaiting_verdict
    }

    /// Leave the handshake once the PIM side says it is over.
    fn sync_mode(&mut self) {
        if self.detector.mode() != FramingMode::Handshake {
            return;
        }
        let next = {
            let cell = self.shared.lock();
            if cell.auth_required == Some(false) {
                Some(FramingMode::LineOriented)
            } else if cell.authenticated {
                Some(if cell.wrapped {
                    FramingMode::BinaryGateway
                } else {
                    FramingMode::LineOriented
                })
            } else {
                None
            }
        };
        if let Some(mode) = next {
            debug!("Client framing now {:?}", mode);
            self.detector.set_mode(mode);
        }
    }

    fn handle_handshake(&mut self, frame: &[u8], out: &mut Vec<DecodeEvent>) {
        let hello = match parse_client_hello(frame) {
            Ok(h) => h,
            Err(_) => {
                out.push(unparsable(frame));
                return;
            }
        };
        out.push(DecodeEvent::ClientHello {
            username: hello.username.clone(),
            wrapped: hello.wrapped,
        });

        let outcome = {
            let mut cell = self.shared.lock();
            cell.wrapped = hello.wrapped;
            cell.credentials_sent = true;
            cell.verdict = None;
            cell.auth.verify(&hello.username, &hello.response)
        };
        self.awaiting_verdict = hello.wrapped;
        match outcome {
            Ok(()) => out.push(DecodeEvent::AuthResult {
                success: true,
                reason: "response verified".to_string(),
            }),
            Err(AuthError::NotConfigured) => {
                debug!("No credentials configured; client response not verified")
            }
            Err(e) => out.push(DecodeEvent::AuthResult {
                success: false,
                reason: e.to_string(),
            }),
        }
    }

    fn handle_line(&mut self, line: &[u8], out: &mut Vec<DecodeEvent>) {
        let Some((&code, body)) = line.split_first() else {
            return;
        };
        let command = PimCommand::from_code(code);
        if matches!(command, PimCommand::Unrecognized(_)) || body.len() < 2 {
            out.push(unparsable(line));
            return;
        }
        let (hex_payload, hex_cks) = body.split_at(body.len() - 2);
        let (payload, cks) = match (hex::decode(hex_payload), hex::decode(hex_cks)) {
            (Ok(p), Ok(c)) => (p, c[0]),
            _ => {
                out.push(unparsable(line));
                return;
            }
        };

        if command == PimCommand::NetworkTransmit {
            out.push(DecodeEvent::ClientCommand {
                command,
                payload: payload.clone(),
            });
            let mut pkt = payload;
            pkt.push(cks);
            emit_packet(&pkt, out);
            return;
        }

        let expected = checksum(&payload);
        if expected != cks {
            out.push(DecodeEvent::ChecksumMismatch { expected, got: cks });
        } else {
            out.push(DecodeEvent::ClientCommand { command, payload });
        }
    }
}

impl StreamDecoder for ClientSession {
    fn side(&self) -> Side {
        Side::Client
    }

    fn mode(&self) -> FramingMode {
        self.detector.mode()
    }

    fn skip_handshake(&mut self) {
        self.detector.set_mode(FramingMode::LineOriented);
    }

    fn feed(&mut self, chunk: &[u8]) -> Vec<DecodeEvent> {
        self.detector.push(chunk);
        let mut out = Vec::new();
        loop {
            if self.holding() {
                trace!("Holding {} client bytes for the PIM verdict", self.detector.buffered());
                break;
            }
            self.sync_mode();
            let Some(frame) = self.detector.next_frame() else {
                break;
            };
            match frame {
                Frame::Handshake(f) => self.handle_handshake(&f, &mut out),
                Frame::Line(l) => self.handle_line(&l, &mut out),
                Frame::Gateway {
                    command: GatewayCommand::SendToSerial,
                    payload,
                } => {
                    let line = strip_cr(&payload);
                    if line.len() > 1 {
                        self.handle_line(line, &mut out);
                    }
                }
                Frame::Gateway { command, .. } => trace!("Client gateway {:?}", command),
                Frame::Unparsable(raw) => out.push(unparsable(&raw)),
            }
        }
        out
    }
}
