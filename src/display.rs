//! Rendering of decode events for the operator.
//!
//! Text mode writes one log line per event through the `log` facade, at a level that
//! matches how interesting the event is. JSON mode prints one object per line on stdout
//! so captures can be piped into other tools.

use chrono::Utc;
use log::{debug, info, warn, Level};
use serde::Serialize;

use crate::config::{DisplayConfig, DisplayFormat};
use crate::logutil::{escape_bytes, escape_log, hex_snippet};
use crate::upb::events::{DecodeEvent, SideEvent};
use crate::upb::packet::DecodedPacket;
use crate::upb::types::{PimMessage, UpbTransmission};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub level: Level,
    pub text: String,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a SideEvent,
}

#[derive(Debug, Clone)]
pub struct EventPrinter {
    format: DisplayFormat,
    show_pulses: bool,
}

impl EventPrinter {
    pub fn new(config: &DisplayConfig) -> Self {
        Self {
            format: config.format,
            show_pulses: config.show_pulses,
        }
    }

    pub fn emit(&self, event: &SideEvent) {
        match self.format {
            DisplayFormat::Json => match self.json(event) {
                Ok(Some(line)) => println!("{}", line),
                Ok(None) => {}
                Err(e) => warn!("Failed to serialize event: {}", e),
            },
            DisplayFormat::Text => {
                if let Some(r) = self.render(event) {
                    log::log!(r.level, "{}: {}", event.side, r.text);
                }
            }
        }
    }

    /// JSON line for `event`, or `None` when it is filtered out.
    pub fn json(&self, event: &SideEvent) -> serde_json::Result<Option<String>> {
        if !self.wants(&event.event) {
            return Ok(None);
        }
        serde_json::to_string(&JsonLine {
            ts: Utc::now().to_rfc3339(),
            event,
        })
        .map(Some)
    }

    fn wants(&self, event: &DecodeEvent) -> bool {
        self.show_pulses || !matches!(event, DecodeEvent::ProtocolMessage { .. })
    }

    /// Text form of `event`, or `None` when it is filtered out.
    pub fn render(&self, event: &SideEvent) -> Option<Rendered> {
        if !self.wants(&event.event) {
            return None;
        }
        let (level, text) = match &event.event {
            DecodeEvent::HandshakeInfo(info) => (
                Level::Info,
                format!(
                    "hello {} v{} protocol {}, {} (challenge {} bytes)",
                    info.prefix, info.version, info.protocol, info.auth, info.challenge_len
                ),
            ),
            DecodeEvent::ClientHello { username, wrapped } => (
                Level::Info,
                format!(
                    "login as '{}'{}",
                    escape_log(username),
                    if *wrapped { " (gateway framing)" } else { "" }
                ),
            ),
            DecodeEvent::AuthResult { success, reason } => (
                if *success { Level::Info } else { Level::Warn },
                format!(
                    "authentication {}: {}",
                    if *success { "succeeded" } else { "failed" },
                    reason
                ),
            ),
            DecodeEvent::UnparsableFrame { raw } => (
                Level::Warn,
                format!("unparsable frame \"{}\"", escape_bytes(raw)),
            ),
            DecodeEvent::ProtocolMessage { kind, data } => {
                (Level::Debug, format!("{} {}", pim_message_name(*kind), data))
            }
            DecodeEvent::PimReport {
                transmission,
                register_start,
                register_payload,
            } => {
                let mut text = format!("PIM report: {}", transmission_name(*transmission));
                if let (Some(start), Some(values)) = (register_start, register_payload) {
                    text.push_str(&format!(
                        " registers @0x{:02x} [{}]",
                        start,
                        hex_snippet(values, 32)
                    ));
                    if let Some(id) = identity_note(*start, values) {
                        text.push_str(&format!(" {}", id));
                    }
                }
                (Level::Info, text)
            }
            DecodeEvent::ClientCommand { command, payload } => (
                Level::Info,
                format!("command {:?} [{}]", command, hex_snippet(payload, 32)),
            ),
            DecodeEvent::Packet(p) => (Level::Info, describe_packet(p)),
            DecodeEvent::BadSequence { expected, got } => (
                Level::Warn,
                format!("pulse sequence expected {}, got {}", expected, got),
            ),
            DecodeEvent::LengthMismatch { declared, actual } => (
                Level::Warn,
                format!(
                    "packet length mismatch: declared {}, received {}",
                    declared, actual
                ),
            ),
            DecodeEvent::ChecksumMismatch { expected, got } => (
                Level::Warn,
                format!("checksum mismatch: expected {:02x}, got {:02x}", expected, got),
            ),
            DecodeEvent::ProtocolError { reason } => {
                (Level::Warn, format!("protocol error: {}", reason))
            }
            DecodeEvent::UnhandledError { message } => (
                Level::Error,
                format!("unhandled error \"{}\"", escape_log(message)),
            ),
        };
        Some(Rendered { level, text })
    }
}

/// One-line summary of a packet.
pub fn describe_packet(p: &DecodedPacket) -> String {
    let mut text = format!(
        "{} net {} src {} -> {} {} {:?}",
        if p.control.link { "link" } else { "direct" },
        p.network_id,
        p.source_id,
        if p.control.link { "link" } else { "dev" },
        p.destination_id,
        p.classification
    );
    if !p.payload.is_empty() {
        text.push_str(&format!(" [{}]", hex_snippet(&p.payload, 32)));
    }
    if let Some(q) = &p.register_query {
        text.push_str(&format!(" read {} @0x{:02x}", q.count, q.start));
    }
    if let Some(v) = &p.register_values {
        if let Some(id) = identity_note(v.start, &v.values) {
            text.push_str(&format!(" {}", id));
        }
    }
    if p.is_broadcast() {
        text.push_str(" broadcast");
    } else if p.destination_kind.is_special() {
        text.push_str(&format!(" to {:?} id", p.destination_kind));
    }
    if p.source_kind.is_special() {
        text.push_str(&format!(" from {:?} id", p.source_kind));
    }
    let ack = p.control.ack_request;
    if !ack.is_default() {
        let mut flags = Vec::new();
        if ack.wants_ack_message() {
            flags.push("ack-msg");
        }
        if ack.no_ack() {
            flags.push("no-ack");
        }
        if ack.no_requeue_on_nak() {
            flags.push("no-requeue");
        }
        text.push_str(&format!(" ({})", flags.join(",")));
    }
    if p.control.transmit_count > 0 {
        text.push_str(&format!(
            " tx {}/{}",
            p.control.transmit_sequence + 1,
            p.control.transmit_count + 1
        ));
    }
    if !p.checksum_valid {
        text.push_str(&format!(" BAD CHECKSUM {:02x}", p.checksum));
    }
    text
}

#[cfg(feature = "catalog")]
fn identity_note(start: u8, values: &[u8]) -> Option<String> {
    crate::upb::catalog::DeviceIdentity::from_registers(start, values).map(|id| id.to_string())
}

#[cfg(not(feature = "catalog"))]
fn identity_note(_start: u8, _values: &[u8]) -> Option<String> {
    None
}

fn pim_message_name(kind: PimMessage) -> String {
    match kind {
        PimMessage::PimReport => "report".to_string(),
        PimMessage::Start => "start".to_string(),
        PimMessage::Sync => "sync".to_string(),
        PimMessage::Data(v) => format!("pulse {}", v),
        PimMessage::Ack => "ack".to_string(),
        PimMessage::Nak => "nak".to_string(),
        PimMessage::Drop => "drop".to_string(),
        PimMessage::Idle => "idle".to_string(),
        PimMessage::Transmitted => "transmitted".to_string(),
        PimMessage::Unrecognized(b) => format!("0x{:02x}", b),
    }
}

fn transmission_name(t: UpbTransmission) -> String {
    match t {
        UpbTransmission::Message => "UPB message".to_string(),
        UpbTransmission::PimAccept => "accept".to_string(),
        UpbTransmission::PimBusy => "busy".to_string(),
        UpbTransmission::PimError => "error".to_string(),
        UpbTransmission::PimRegisters => "registers".to_string(),
        UpbTransmission::TransmissionAck => "ack".to_string(),
        UpbTransmission::TransmissionNak => "nak".to_string(),
        UpbTransmission::Unrecognized(b) => format!("0x{:02x}", b),
    }
}

/// Log a finished session's totals.
pub fn log_session_summary(peer: &str) {
    let snap = crate::metrics::snapshot();
    info!("Session {} closed; totals: {}", peer, snap);
    debug!(
        "Metrics JSON: {}",
        serde_json::to_string(&snap).unwrap_or_default()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upb::events::Side;

    fn printer(show_pulses: bool) -> EventPrinter {
        EventPrinter::new(&DisplayConfig {
            format: DisplayFormat::Text,
            show_pulses,
        })
    }

    fn side_event(event: DecodeEvent) -> SideEvent {
        SideEvent {
            side: Side::Pim,
            event,
        }
    }

    #[test]
    fn pulses_hidden_unless_enabled() {
        let ev = side_event(DecodeEvent::ProtocolMessage {
            kind: PimMessage::Data(2),
            data: "03".to_string(),
        });
        assert!(printer(false).render(&ev).is_none());
        let shown = printer(true).render(&ev).unwrap();
        assert_eq!(shown.level, Level::Debug);
        assert_eq!(shown.text, "pulse 2 03");
    }

    #[test]
    fn failures_render_as_warnings() {
        let ev = side_event(DecodeEvent::ChecksumMismatch {
            expected: 0xF4,
            got: 0xEF,
        });
        let r = printer(false).render(&ev).unwrap();
        assert_eq!(r.level, Level::Warn);
        assert_eq!(r.text, "checksum mismatch: expected f4, got ef");
    }

    #[test]
    fn json_lines_are_tagged() {
        let ev = side_event(DecodeEvent::BadSequence {
            expected: 4,
            got: 6,
        });
        let line = printer(false).json(&ev).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["side"], "pim");
        assert_eq!(value["event"]["bad_sequence"]["got"], 6);
        assert!(value["ts"].is_string());
    }

    #[test]
    fn packet_line_notes_broadcast_and_ack_flags() {
        // Direct, ACKRQ = ack-msg | no-requeue, to device 0 from the default id.
        let mut body = vec![0x07, 0x50, 0x01, 0x00, 0xFF, 0x20];
        body.push(crate::upb::checksum::checksum(&body));
        let p = crate::upb::packet::parse(&body).unwrap();
        let text = describe_packet(&p);
        assert!(text.contains(" broadcast"), "{}", text);
        assert!(text.contains(" from Default id"), "{}", text);
        assert!(text.contains(" (ack-msg,no-requeue)"), "{}", text);

        let mut body = vec![0x07, 0x00, 0x01, 0x12, 0x34, 0x20];
        body.push(crate::upb::checksum::checksum(&body));
        let p = crate::upb::packet::parse(&body).unwrap();
        let text = describe_packet(&p);
        assert!(!text.contains("ack-msg") && !text.contains("no-ack"), "{}", text);
        assert!(!text.contains("broadcast"), "{}", text);
    }

    #[cfg(feature = "catalog")]
    #[test]
    fn register_report_names_device() {
        let ev = side_event(DecodeEvent::PimReport {
            transmission: UpbTransmission::PimRegisters,
            register_start: Some(0x06),
            register_payload: Some(vec![0x00, 0x05, 0x00, 0x60]),
        });
        let r = printer(false).render(&ev).unwrap();
        assert!(r.text.contains("Home Automation Inc."));
        assert!(r.text.contains("8-Button House Controller"));
    }
}
