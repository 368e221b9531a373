//! Test utilities: builders for the byte streams each side of a session produces.

use upbproxy::upb::checksum::checksum;
use upbproxy::upb::hex;

/// Append the UPB checksum to `body`.
#[allow(dead_code)]
pub fn with_checksum(body: &[u8]) -> Vec<u8> {
    let mut packet = body.to_vec();
    packet.push(checksum(body));
    packet
}

/// A packet whose control word declares the right length and whose checksum is valid.
#[allow(dead_code)]
pub fn packet(network: u8, dest: u8, source: u8, mdid: u8, payload: &[u8]) -> Vec<u8> {
    let len = (7 + payload.len()) as u8;
    let mut body = vec![len & 0x1F, 0x00, network, dest, source, mdid];
    body.extend_from_slice(payload);
    with_checksum(&body)
}

/// NUL-terminated PIM hello announcing required authentication.
#[allow(dead_code)]
pub fn pim_hello(challenge: &[u8]) -> Vec<u8> {
    let mut frame = b"PIM/5.2/PU/AUTH REQUIRED/".to_vec();
    frame.extend_from_slice(hex::encode(challenge).as_bytes());
    frame.push(0);
    frame
}

/// Pulse-mode lines carrying `bytes`, sequence numbers starting at `first_seq`.
#[allow(dead_code)]
pub fn pulse_lines(bytes: &[u8], first_seq: u8, transmitted: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut seq = first_seq % 16;
    for &b in bytes {
        for i in 0..4 {
            let crumb = (b >> (6 - 2 * i)) & 0x03;
            let line = if transmitted {
                format!("T{}{:X}\r", crumb, seq)
            } else {
                format!("{}0{:X}\r", crumb, seq)
            };
            out.extend_from_slice(line.as_bytes());
            seq = (seq + 1) % 16;
        }
    }
    out
}

/// Client command line: code byte, hex payload, hex checksum, CR.
#[allow(dead_code)]
pub fn client_line(code: u8, payload: &[u8]) -> Vec<u8> {
    let mut line = vec![code];
    line.extend_from_slice(hex::encode(payload).to_uppercase().as_bytes());
    line.extend_from_slice(format!("{:02X}", checksum(payload)).as_bytes());
    line.push(b'\r');
    line
}

/// Client binary gateway frame around `payload`.
#[allow(dead_code)]
pub fn client_gateway(command: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u16;
    let mut frame = vec![command];
    frame.extend_from_slice(&len.to_be_bytes());
    frame.push(0);
    frame.extend_from_slice(payload);
    frame
}

/// PIM binary gateway frame around `payload`.
#[allow(dead_code)]
pub fn pim_gateway(command: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u16;
    let mut frame = vec![command + 1, 0, 0, 0, 0, 0];
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
