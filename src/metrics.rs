//! Process-wide decode counters.
//! Updated by the relay as events are consumed; a snapshot is logged when a session ends.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::upb::events::{DecodeEvent, Side};

static SESSIONS: AtomicU64 = AtomicU64::new(0);
static EVENTS: AtomicU64 = AtomicU64::new(0);
static PACKETS: AtomicU64 = AtomicU64::new(0);
static CHECKSUM_FAILURES: AtomicU64 = AtomicU64::new(0);
static BAD_SEQUENCES: AtomicU64 = AtomicU64::new(0);
static LENGTH_MISMATCHES: AtomicU64 = AtomicU64::new(0);
static UNPARSABLE_FRAMES: AtomicU64 = AtomicU64::new(0);
static PROTOCOL_ERRORS: AtomicU64 = AtomicU64::new(0);
static AUTH_SUCCESSES: AtomicU64 = AtomicU64::new(0);
static AUTH_FAILURES: AtomicU64 = AtomicU64::new(0);
static BYTES_FROM_PIM: AtomicU64 = AtomicU64::new(0);
static BYTES_FROM_CLIENT: AtomicU64 = AtomicU64::new(0);

pub fn inc_sessions() {
    SESSIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn add_bytes(side: Side, n: usize) {
    let counter = match side {
        Side::Pim => &BYTES_FROM_PIM,
        Side::Client => &BYTES_FROM_CLIENT,
    };
    counter.fetch_add(n as u64, Ordering::Relaxed);
}

/// Count one decode event.
pub fn observe(event: &DecodeEvent) {
    EVENTS.fetch_add(1, Ordering::Relaxed);
    let counter = match event {
        DecodeEvent::Packet(p) => {
            PACKETS.fetch_add(1, Ordering::Relaxed);
            if !p.checksum_valid {
                CHECKSUM_FAILURES.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
        DecodeEvent::ChecksumMismatch { .. } => &CHECKSUM_FAILURES,
        DecodeEvent::BadSequence { .. } => &BAD_SEQUENCES,
        DecodeEvent::LengthMismatch { .. } => &LENGTH_MISMATCHES,
        DecodeEvent::UnparsableFrame { .. } => &UNPARSABLE_FRAMES,
        DecodeEvent::ProtocolError { .. } | DecodeEvent::UnhandledError { .. } => {
            &PROTOCOL_ERRORS
        }
        DecodeEvent::AuthResult { success: true, .. } => &AUTH_SUCCESSES,
        DecodeEvent::AuthResult { success: false, .. } => &AUTH_FAILURES,
        _ => return,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub sessions: u64,
    pub events: u64,
    pub packets: u64,
    pub checksum_failures: u64,
    pub bad_sequences: u64,
    pub length_mismatches: u64,
    pub unparsable_frames: u64,
    pub protocol_errors: u64,
    pub auth_successes: u64,
    pub auth_failures: u64,
    pub bytes_from_pim: u64,
    pub bytes_from_client: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        sessions: SESSIONS.load(Ordering::Relaxed),
        events: EVENTS.load(Ordering::Relaxed),
        packets: PACKETS.load(Ordering::Relaxed),
        checksum_failures: CHECKSUM_FAILURES.load(Ordering::Relaxed),
        bad_sequences: BAD_SEQUENCES.load(Ordering::Relaxed),
        length_mismatches: LENGTH_MISMATCHES.load(Ordering::Relaxed),
        unparsable_frames: UNPARSABLE_FRAMES.load(Ordering::Relaxed),
        protocol_errors: PROTOCOL_ERRORS.load(Ordering::Relaxed),
        auth_successes: AUTH_SUCCESSES.load(Ordering::Relaxed),
        auth_failures: AUTH_FAILURES.load(Ordering::Relaxed),
        bytes_from_pim: BYTES_FROM_PIM.load(Ordering::Relaxed),
        bytes_from_client: BYTES_FROM_CLIENT.load(Ordering::Relaxed),
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sessions={} events={} packets={} checksum_failures={} bad_sequences={} \
             length_mismatches={} unparsable={} protocol_errors={} auth_ok={} auth_failed={} \
             bytes_pim={} bytes_client={}",
            self.sessions,
            self.events,
            self.packets,
            self.checksum_failures,
            self.bad_sequences,
            self.length_mismatches,
            self.unparsable_frames,
            self.protocol_errors,
            self.auth_successes,
            self.auth_failures,
            self.bytes_from_pim,
            self.bytes_from_client
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are global and tests run in parallel, so only check increases.
    #[test]
    fn observe_bumps_matching_counters() {
        let before = snapshot();
        observe(&DecodeEvent::BadSequence {
            expected: 1,
            got: 3,
        });
        observe(&DecodeEvent::AuthResult {
            success: false,
            reason: "bad response".to_string(),
        });
        observe(&DecodeEvent::ChecksumMismatch {
            expected: 0xF4,
            got: 0x00,
        });
        add_bytes(Side::Client, 10);
        let after = snapshot();
        assert!(after.events >= before.events + 3);
        assert!(after.bad_sequences > before.bad_sequences);
        assert!(after.auth_failures > before.auth_failures);
        assert!(after.checksum_failures > before.checksum_failures);
        assert!(after.bytes_from_client >= before.bytes_from_client + 10);
    }
}
