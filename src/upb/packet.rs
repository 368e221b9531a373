//! UPB packet parser.
//!
//! A packet on the wire is:
//!
//! ```text
//! | CTL0 | CTL1 | NID | DID | SID | MDID | payload ... | CKS |
//! ```
//!
//! The control word length field counts every byte, checksum included. The length is
//! validated before any other field is decoded; a checksum failure on the other hand
//! still yields a fully decoded packet flagged `checksum_valid = false`.

use serde::Serialize;

use super::checksum::checksum;
use super::error::DecodeError;
use super::types::{
    ControlWord, CoreCommand, CoreReport, DeviceIdKind, MdidClassification, MdidSet,
};

/// Control word, network, destination, source and MDID.
pub const HEADER_LEN: usize = 6;
/// Header plus checksum.
pub const MIN_PACKET_LEN: usize = HEADER_LEN + 1;

/// Arguments of a get-register-values command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterQuery {
    pub start: u8,
    pub count: u8,
}

/// Body of a register-values report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterValues {
    pub start: u8,
    pub values: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedPacket {
    pub control: ControlWord,
    pub network_id: u8,
    pub destination_id: u8,
    pub destination_kind: DeviceIdKind,
    pub source_id: u8,
    pub source_kind: DeviceIdKind,
    pub mdid: u8,
    pub mdid_set: MdidSet,
    pub classification: MdidClassification,
    pub payload: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_query: Option<RegisterQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_values: Option<RegisterValues>,
    pub checksum: u8,
    pub checksum_valid: bool,
}

impl DecodedPacket {
    /// Direct packet addressed to every device on the network.
    pub fn is_broadcast(&self) -> bool {
        !self.control.link && self.destination_kind == DeviceIdKind::Broadcast
    }

    /// Raw payload of a device signature report, for byte-indexed inspection.
    pub fn signature(&self) -> Option<&[u8]> {
        match self.classification {
            MdidClassification::Report(CoreReport::DeviceSignature) => Some(&self.payload),
            _ => None,
        }
    }
}

/// Decode a complete packet, checksum byte included.
pub fn parse(data: &[u8]) -> Result<DecodedPacket, DecodeError> {
    if data.len() < MIN_PACKET_LEN {
        return Err(DecodeError::Truncated {
            needed: MIN_PACKET_LEN,
            actual: data.len(),
        });
    }

    let control = ControlWord::decode(data[0], data[1]);
    let declared = control.declared_length as usize;
    if declared != data.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: data.len(),
        });
    }

    let (body, cks) = data.split_at(data.len() - 1);
    let received = cks[0];
    let mdid = data[5];
    let classification = MdidClassification::classify(mdid);
    let payload = body[HEADER_LEN..].to_vec();

    let register_query = match classification {
        MdidClassification::Core(CoreCommand::GetRegisterValues) if payload.len() >= 2 => {
            Some(RegisterQuery {
                start: payload[0],
                count: payload[1],
            })
        }
        _ => None,
    };
    let register_values = match classification {
        MdidClassification::Report(CoreReport::RegisterValues) if !payload.is_empty() => {
            Some(RegisterValues {
                start: payload[0],
                values: payload[1..].to_vec(),
            })
        }
        _ => None,
    };

    Ok(DecodedPacket {
        control,
        network_id: data[2],
        destination_id: data[3],
        destination_kind: DeviceIdKind::classify(data[3]),
        source_id: data[4],
        source_kind: DeviceIdKind::classify(data[4]),
        mdid,
        mdid_set: MdidSet::from_mdid(mdid),
        classification,
        payload,
        register_query,
        register_values,
        checksum: received,
        checksum_valid: checksum(body) == received,
    })
}
