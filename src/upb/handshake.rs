//! Parsers for the NUL-terminated text frames exchanged before the byte protocol
//! starts.
//!
//! PIM hello:   `PIM/5.2/PU/AUTH REQUIRED/<challenge hex>`
//! client:      `<username>/<response>[/WRAPPED]`
//! PIM verdict: `AUTH_SUCCEEDED/<client info>` or `AUTH_FAILED/<client info>`

use serde::Serialize;

use super::error::DecodeError;
use super::hex;

/// Text frames the PIM sends instead of a hello when it refuses the connection.
pub const KNOWN_PIM_ERRORS: &[&str] = &["MAX CONNECTIONS REACHED", "PIM NOT INITIALIZED"];

/// Anything shorter cannot be a hello.
pub const MIN_HELLO_LEN: usize = 12;

/// Option flag a client appends to ask for binary gateway framing.
pub const WRAP_FLAG: &str = "WRAPPED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: Option<u16>,
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.patch {
            Some(p) => write!(f, "{}.{}.{}", self.major, self.minor, p),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

impl ProtocolVersion {
    pub fn parse(text: &str) -> Option<Self> {
        let parts: Vec<&str> = text.split('.').collect();
        if !(2..=3).contains(&parts.len()) {
            return None;
        }
        let major = parts[0].trim().parse().ok()?;
        let minor = parts[1].trim().parse().ok()?;
        let patch = match parts.get(2) {
            Some(p) => Some(p.trim().parse().ok()?),
            None => None,
        };
        Some(Self { major, minor, patch })
    }
}

/// Decoded PIM hello. The challenge bytes themselves are handed to the authenticator
/// and only their length is kept here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandshakeInfo {
    pub prefix: String,
    pub version: ProtocolVersion,
    pub protocol: String,
    pub auth: String,
    pub auth_required: bool,
    pub challenge_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PimHello {
    Hello {
        info: HandshakeInfo,
        challenge: Option<Vec<u8>>,
    },
    /// Refusal or garbage; reported and otherwise ignored.
    Error(String),
}

pub fn parse_pim_hello(frame: &[u8]) -> Result<PimHello, DecodeError> {
    let text = String::from_utf8_lossy(frame);
    let text = text.trim();
    if frame.len() < MIN_HELLO_LEN || KNOWN_PIM_ERRORS.iter().any(|e| text.contains(e)) {
        return Ok(PimHello::Error(text.to_string()));
    }

    let fields: Vec<&str> = text.split('/').collect();
    if fields.len() < 4 {
        return Err(DecodeError::Truncated {
            needed: 4,
            actual: fields.len(),
        });
    }
    let version = ProtocolVersion::parse(fields[1])
        .ok_or_else(|| DecodeError::Malformed(format!("bad version {:?}", fields[1])))?;
    let auth = fields[3].trim().to_string();
    let auth_required = auth.to_ascii_uppercase().contains("REQUIRED");
    let challenge = match fields.get(4).map(|c| c.trim()) {
        Some(c) if !c.is_empty() => Some(hex::decode(c.as_bytes())?),
        _ => None,
    };

    Ok(PimHello::Hello {
        info: HandshakeInfo {
            prefix: fields[0].to_string(),
            version,
            protocol: fields[2].to_string(),
            auth,
            auth_required,
            challenge_len: challenge.as_ref().map_or(0, |c| c.len()),
        },
        challenge,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub username: String,
    pub response: String,
    pub wrapped: bool,
}

pub fn parse_client_hello(frame: &[u8]) -> Result<ClientHello, DecodeError> {
    let text = String::from_utf8_lossy(frame);
    let mut fields = text.trim().split('/');
    let username = fields.next().unwrap_or_default().to_string();
    let response = match fields.next() {
        Some(r) => r.to_string(),
        None => {
            return Err(DecodeError::Truncated {
                needed: 2,
                actual: 1,
            })
        }
    };
    let wrapped = fields.any(|f| f.eq_ignore_ascii_case(WRAP_FLAG));
    Ok(ClientHello {
        username,
        response,
        wrapped,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthReply {
    pub success: bool,
    pub client_info: String,
}

pub fn parse_auth_reply(frame: &[u8]) -> Result<AuthReply, DecodeError> {
    let text = String::from_utf8_lossy(frame);
    let (result, client_info) = match text.split_once('/') {
        Some((r, info)) => (r.trim(), info.trim()),
        None => (text.trim(), ""),
    };
    let success = match result.replace(' ', "_").to_ascii_uppercase().as_str() {
        "AUTH_SUCCEEDED" => true,
        "AUTH_FAILED" => false,
        _ => {
            return Err(DecodeError::Malformed(format!(
                "unknown auth result {:?}",
                result
            )))
        }
    };
    Ok(AuthReply {
        success,
        client_info: client_info.to_string(),
    })
}
