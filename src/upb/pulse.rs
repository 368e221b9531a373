//! Pulse-mode packet reassembly.
//!
//! In pulse mode the PIM reports every 2-bit symbol ("crumb") of a packet as its own
//! line event. Four consecutive crumbs, most significant first, make one byte. Each
//! event carries a 4-bit sequence number that must follow the previous one modulo 16;
//! a gap means a line was lost and the event is refused without touching the state.
//! A packet that saw a gap is not delivered at its ACK/NAK.

use thiserror::Error;

/// Largest packet the reassembler will hold.
pub const PACKET_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PulseError {
    #[error("bad sequence: expected {expected}, got {got}")]
    BadSequence { expected: u8, got: u8 },
    #[error("packet exceeds reassembly capacity")]
    Overflow,
}

#[derive(Debug, Clone)]
pub struct PulseReassembler {
    buffer: [u8; PACKET_CAPACITY],
    byte_index: usize,
    crumb_index: u8,
    expected_sequence: u8,
    transmitted: bool,
    /// A sequence gap was seen since the last reset.
    desynced: bool,
}

impl Default for PulseReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseReassembler {
    pub fn new() -> Self {
        Self {
            buffer: [0; PACKET_CAPACITY],
            byte_index: 0,
            crumb_index: 0,
            expected_sequence: 0,
            transmitted: false,
            desynced: false,
        }
    }

    pub fn byte_index(&self) -> usize {
        self.byte_index
    }

    pub fn crumb_index(&self) -> u8 {
        self.crumb_index
    }

    pub fn expected_sequence(&self) -> u8 {
        self.expected_sequence
    }

    pub fn transmitted(&self) -> bool {
        self.transmitted
    }

    pub fn desynced(&self) -> bool {
        self.desynced
    }

    /// Completed bytes so far.
    pub fn assembled(&self) -> &[u8] {
        &self.buffer[..self.byte_index]
    }

    /// True once any crumb of the current packet has been accepted.
    pub fn in_flight(&self) -> bool {
        self.byte_index != 0 || self.crumb_index != 0 || self.transmitted
    }

    /// Flag the in-flight packet as an echo of a transmission from the client. The
    /// first and last byte of such a packet are wrapper bytes and are not delivered.
    pub fn mark_transmitted(&mut self) {
        self.transmitted = true;
    }

    /// Accept one crumb carried by an event with sequence number `sequence`.
    pub fn deposit(&mut self, crumb: u8, sequence: u8) -> Result<(), PulseError> {
        let sequence = sequence & 0x0F;
        if sequence != self.expected_sequence {
            self.desynced = true;
            return Err(PulseError::BadSequence {
                expected: self.expected_sequence,
                got: sequence,
            });
        }
        if self.byte_index >= PACKET_CAPACITY {
            self.reset();
            return Err(PulseError::Overflow);
        }

        let shift = 6 - 2 * self.crumb_index;
        let slot = &mut self.buffer[self.byte_index];
        *slot = (*slot & !(0x03 << shift)) | ((crumb & 0x03) << shift);

        self.crumb_index += 1;
        if self.crumb_index == 4 {
            self.crumb_index = 0;
            self.byte_index += 1;
        }
        self.expected_sequence = (self.expected_sequence + 1) & 0x0F;
        Ok(())
    }

    /// End of packet (ACK or NAK): hand back the assembled bytes, if any, and reset.
    /// Nothing is handed back after a sequence gap.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.desynced {
            self.reset();
            return None;
        }
        let end = self.byte_index;
        let range = if self.transmitted {
            if end >= 2 {
                Some(1..end - 1)
            } else {
                None
            }
        } else {
            Some(0..end)
        };
        let packet = range
            .filter(|r| !r.is_empty())
            .map(|r| self.buffer[r].to_vec());
        self.reset();
        packet
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
