//! UPB packet checksum.
//!
//! The checksum byte is the two's complement of the 8-bit sum of every preceding
//! byte, so a well-formed packet (checksum included) sums to zero.

/// Compute the checksum over `data`. Empty input yields 0.
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0u8.wrapping_sub(sum)
}

/// True when the last byte of `packet` is the checksum of everything before it.
pub fn verify(packet: &[u8]) -> bool {
    match packet.split_last() {
        Some((&last, body)) => checksum(body) == last,
        None => false,
    }
}
