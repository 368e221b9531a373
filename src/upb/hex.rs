//! ASCII hex helpers for the line-oriented wire format.

use super::error::DecodeError;

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decode one ASCII hex digit.
pub fn digit(c: u8) -> Result<u8, DecodeError> {
    nibble(c).ok_or_else(|| DecodeError::InvalidHex(format!("{:?}", c as char)))
}

/// Decode an even-length ASCII hex string (either case).
pub fn decode(text: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if text.len() % 2 != 0 {
        return Err(DecodeError::InvalidHex(format!(
            "odd length {}",
            text.len()
        )));
    }
    text.chunks_exact(2)
        .map(|pair| Ok((digit(pair[0])? << 4) | digit(pair[1])?))
        .collect()
}

/// Encode bytes as lowercase hex.
pub fn encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_case() {
        assert_eq!(decode(b"0aFf10").unwrap(), vec![0x0A, 0xFF, 0x10]);
        assert_eq!(encode(&[0x0A, 0xFF]), "0aff");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(decode(b"abc"), Err(DecodeError::InvalidHex(_))));
        assert!(matches!(decode(b"zz"), Err(DecodeError::InvalidHex(_))));
    }
}
