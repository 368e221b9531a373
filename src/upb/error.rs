use thiserror::Error;

/// Errors raised while decoding a single frame or packet. None of these are fatal to a
/// session; the session turns them into diagnostic events and keeps parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the minimum for the structure being decoded.
    #[error("truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    /// Control word length field disagrees with the bytes actually present.
    #[error("length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// ASCII hex field with an odd length or a non-hex character.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Text field that does not follow the expected layout.
    #[error("malformed: {0}")]
    Malformed(String),

    /// Leading byte not in the active code table.
    #[error("unknown code 0x{0:02x}")]
    UnknownCode(u8),
}

/// Errors from the PIM challenge/response exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No challenge has been captured from the PIM yet.
    #[error("no challenge received")]
    NoChallenge,

    /// The challenge was already consumed by an earlier attempt.
    #[error("stale challenge: already used by an earlier attempt")]
    StaleChallenge,

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("response does not match challenge")]
    BadResponse,

    /// The proxy has no credentials to verify against.
    #[error("no credentials configured")]
    NotConfigured,
}
