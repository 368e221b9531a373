//! Incremental frame detector.
//!
//! Bytes from one connection are appended as they arrive and whole frames are pulled out
//! one at a time, because handling a frame can switch the discipline used for the bytes
//! behind it:
//!
//! - `Handshake`: NUL terminated text.
//! - `LineOriented`: CR terminated ASCII; frames of one byte or less are idle filler.
//! - `BinaryGateway`: length prefixed. The header differs by direction:
//!
//! ```text
//! PIM -> proxy:    | cmd+1 | 0x00 | x | x | x | x | len_hi | len_lo | payload ...
//! client -> proxy: | cmd   | len_hi | len_lo | x | payload ...
//! ```
//!
//! A frame is only cut once every byte of it is buffered; nothing partial is ever
//! returned and an incomplete buffer leaves the detector untouched.

use bytes::{Buf, BytesMut};
use serde::Serialize;

use super::types::GatewayCommand;

pub const NUL: u8 = 0x00;
pub const CR: u8 = b'\r';

pub const PIM_GATEWAY_HEADER_LEN: usize = 8;
pub const CLIENT_GATEWAY_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FramingMode {
    Handshake,
    LineOriented,
    BinaryGateway,
}

/// Which side's gateway header layout to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayLayout {
    FromPim,
    FromClient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Handshake(Vec<u8>),
    Line(Vec<u8>),
    Gateway {
        command: GatewayCommand,
        payload: Vec<u8>,
    },
    /// Bytes that could not be framed under the active discipline; already dropped.
    Unparsable(Vec<u8>),
}

#[derive(Debug)]
pub struct FrameDetector {
    buf: BytesMut,
    mode: FramingMode,
    layout: GatewayLayout,
}

impl FrameDetector {
    pub fn new(layout: GatewayLayout) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            mode: FramingMode::Handshake,
            layout,
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Switch discipline. `BinaryGateway` is never left once entered.
    pub fn set_mode(&mut self, mode: FramingMode) {
        if self.mode != FramingMode::BinaryGateway {
            self.mode = mode;
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.mode = FramingMode::Handshake;
    }

    /// Cut the next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Option<Frame> {
        match self.mode {
            FramingMode::Handshake => self.split_at_terminator(NUL).map(Frame::Handshake),
            FramingMode::LineOriented => loop {
                let line = self.split_at_terminator(CR)?;
                if line.len() > 1 {
                    return Some(Frame::Line(line));
                }
            },
            FramingMode::BinaryGateway => match self.layout {
                GatewayLayout::FromPim => self.next_pim_gateway_frame(),
                GatewayLayout::FromClient => self.next_client_gateway_frame(),
            },
        }
    }

    fn split_at_terminator(&mut self, terminator: u8) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|&b| b == terminator)?;
        let frame = self.buf.split_to(pos).to_vec();
        self.buf.advance(1);
        Some(frame)
    }

    fn next_pim_gateway_frame(&mut self) -> Option<Frame> {
        if self.buf.len() < PIM_GATEWAY_HEADER_LEN {
            return None;
        }
        if self.buf[1] != 0 {
            // Reserved byte must be zero; the length cannot be trusted, drop one byte.
            let dropped = self.buf.split_to(1).to_vec();
            return Some(Frame::Unparsable(dropped));
        }
        let declared = u16::from_be_bytes([self.buf[6], self.buf[7]]) as usize;
        if self.buf.len() < PIM_GATEWAY_HEADER_LEN + declared {
            return None;
        }
        let header = self.buf.split_to(PIM_GATEWAY_HEADER_LEN);
        let payload = self.buf.split_to(declared).to_vec();
        Some(gateway_frame(
            header[0].wrapping_sub(1),
            header.to_vec(),
            payload,
        ))
    }

    fn next_client_gateway_frame(&mut self) -> Option<Frame> {
        if self.buf.len() < CLIENT_GATEWAY_HEADER_LEN {
            return None;
        }
        let declared = u16::from_be_bytes([self.buf[1], self.buf[2]]) as usize;
        if self.buf.len() < CLIENT_GATEWAY_HEADER_LEN + declared {
            return None;
        }
        let header = self.buf.split_to(CLIENT_GATEWAY_HEADER_LEN);
        let payload = self.buf.split_to(declared).to_vec();
        Some(gateway_frame(header[0], header.to_vec(), payload))
    }
}

fn gateway_frame(code: u8, mut header: Vec<u8>, payload: Vec<u8>) -> Frame {
    match GatewayCommand::from_code(code) {
        GatewayCommand::Unrecognized(_) => {
            header.extend_from_slice(&payload);
            Frame::Unparsable(header)
        }
        command => Frame::Gateway { command, payload },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(d: &mut FrameDetector) -> Vec<Frame> {
        std::iter::from_fn(|| d.next_frame()).collect()
    }

    #[test]
    fn handshake_frames_split_on_nul() {
        let mut d = FrameDetector::new(GatewayLayout::FromPim);
        d.push(b"PIM/5.2/PU/NO AUTH\0AUTH");
        assert_eq!(
            drain(&mut d),
            vec![Frame::Handshake(b"PIM/5.2/PU/NO AUTH".to_vec())]
        );
        assert_eq!(d.buffered(), 4);
    }

    #[test]
    fn lines_skip_idle_filler() {
        let mut d = FrameDetector::new(GatewayLayout::FromPim);
        d.set_mode(FramingMode::LineOriented);
        d.push(b"\r-\rPA\rX0");
        assert_eq!(drain(&mut d), vec![Frame::Line(b"PA".to_vec())]);
        d.push(b"0\r");
        assert_eq!(drain(&mut d), vec![Frame::Line(b"X00".to_vec())]);
    }

    #[test]
    fn gateway_mode_is_terminal() {
        let mut d = FrameDetector::new(GatewayLayout::FromClient);
        d.set_mode(FramingMode::BinaryGateway);
        d.set_mode(FramingMode::LineOriented);
        assert_eq!(d.mode(), FramingMode::BinaryGateway);
        d.clear();
        assert_eq!(d.mode(), FramingMode::Handshake);
    }

    #[test]
    fn pim_gateway_frame_waits_for_full_length() {
        let mut frame = vec![0x01, 0x00, 0, 0, 0, 0, 0x00, 0x03];
        frame.extend_from_slice(b"PA\x00");
        frame.push(0x7E); // first byte of the next frame

        let mut d = FrameDetector::new(GatewayLayout::FromPim);
        d.set_mode(FramingMode::BinaryGateway);
        for &b in &frame[..10] {
            d.push(&[b]);
            assert_eq!(d.next_frame(), None);
        }
        d.push(&frame[10..]);
        assert_eq!(
            d.next_frame(),
            Some(Frame::Gateway {
                command: GatewayCommand::SendToSerial,
                payload: b"PA\x00".to_vec()
            })
        );
        assert_eq!(d.buffered(), 1);
    }

    #[test]
    fn pim_gateway_reserved_byte_resyncs() {
        let mut d = FrameDetector::new(GatewayLayout::FromPim);
        d.set_mode(FramingMode::BinaryGateway);
        d.push(&[0x09, 0x05, 0x02, 0x00, 0, 0, 0, 0, 0x00, 0x00]);
        assert_eq!(d.next_frame(), Some(Frame::Unparsable(vec![0x09])));
        assert_eq!(d.next_frame(), Some(Frame::Unparsable(vec![0x05])));
        assert_eq!(
            d.next_frame(),
            Some(Frame::Gateway {
                command: GatewayCommand::KeepAlive,
                payload: vec![]
            })
        );
        assert_eq!(d.buffered(), 0);
    }

    #[test]
    fn client_gateway_unknown_command_dropped_whole() {
        let mut d = FrameDetector::new(GatewayLayout::FromClient);
        d.set_mode(FramingMode::BinaryGateway);
        d.push(&[0x42, 0x00, 0x02, 0x00, 0xAA, 0xBB, 0x00, 0x00, 0x01, 0x00, 0x7F]);
        assert_eq!(
            d.next_frame(),
            Some(Frame::Unparsable(vec![0x42, 0x00, 0x02, 0x00, 0xAA, 0xBB]))
        );
        assert_eq!(
            d.next_frame(),
            Some(Frame::Gateway {
                command: GatewayCommand::SendToSerial,
                payload: vec![0x7F]
            })
        );
        assert_eq!(d.next_frame(), None);
    }
}
