//! # UPB Packet Field Model
//!
//! Closed enumerations for every code the proxy meets on the wire, plus the packet
//! control word and MDID classification. Every `from_*` constructor is total: codes
//! outside the known set land in an `Unrecognized(u8)` variant instead of failing, so
//! the framing layer decides how to report them.
//!
//! ## Control word layout
//!
//! ```text
//!  byte 0: | LNK | REPRQ(2) | LEN(5)            |
//!  byte 1: | RSV | ACKRQ(3) | CNT(2) | SEQ(2)   |
//! ```

use serde::Serialize;

/// Link bit in control word byte 0.
pub const PACKETHEADER_LINKBIT: u8 = 0x80;

/// Leading byte of a line frame received from the PIM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PimMessage {
    PimReport,
    Start,
    Sync,
    /// Pulse data carrying a 2-bit value.
    Data(u8),
    Ack,
    Nak,
    Drop,
    Idle,
    Transmitted,
    Unrecognized(u8),
}

impl PimMessage {
    pub fn from_code(code: u8) -> Self {
        match code {
            b'P' => PimMessage::PimReport,
            b'X' => PimMessage::Start,
            b'R' => PimMessage::Sync,
            b'0'..=b'3' => PimMessage::Data(code - b'0'),
            b'A' => PimMessage::Ack,
            b'N' => PimMessage::Nak,
            b'D' => PimMessage::Drop,
            b'-' => PimMessage::Idle,
            b'T' => PimMessage::Transmitted,
            other => PimMessage::Unrecognized(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            PimMessage::PimReport => b'P',
            PimMessage::Start => b'X',
            PimMessage::Sync => b'R',
            PimMessage::Data(v) => b'0' + (v & 0x03),
            PimMessage::Ack => b'A',
            PimMessage::Nak => b'N',
            PimMessage::Drop => b'D',
            PimMessage::Idle => b'-',
            PimMessage::Transmitted => b'T',
            PimMessage::Unrecognized(b) => b,
        }
    }
}

/// Second byte of a `P` (PIM report) line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpbTransmission {
    Message,
    PimAccept,
    PimBusy,
    PimError,
    PimRegisters,
    TransmissionAck,
    TransmissionNak,
    Unrecognized(u8),
}

impl UpbTransmission {
    pub fn from_code(code: u8) -> Self {
        match code {
            b'U' => UpbTransmission::Message,
            b'A' => UpbTransmission::PimAccept,
            b'B' => UpbTransmission::PimBusy,
            b'E' => UpbTransmission::PimError,
            b'R' => UpbTransmission::PimRegisters,
            b'K' => UpbTransmission::TransmissionAck,
            b'N' => UpbTransmission::TransmissionNak,
            other => UpbTransmission::Unrecognized(other),
        }
    }
}

/// Leading byte of a command line sent by the client to the PIM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PimCommand {
    NetworkTransmit,
    PimRead,
    PimWrite,
    Unrecognized(u8),
}

impl PimCommand {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x14 => PimCommand::NetworkTransmit,
            0x12 => PimCommand::PimRead,
            0x17 => PimCommand::PimWrite,
            other => PimCommand::Unrecognized(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            PimCommand::NetworkTransmit => 0x14,
            PimCommand::PimRead => 0x12,
            PimCommand::PimWrite => 0x17,
            PimCommand::Unrecognized(b) => b,
        }
    }
}

/// Command carried in a binary gateway frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GatewayCommand {
    SendToSerial,
    KeepAlive,
    Unrecognized(u8),
}

impl GatewayCommand {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => GatewayCommand::SendToSerial,
            0x01 => GatewayCommand::KeepAlive,
            other => GatewayCommand::Unrecognized(other),
        }
    }
}

/// Repeater request (control word byte 0, bits 6-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepeaterRequest {
    NonRepeater,
    LowRepeat,
    MediumRepeat,
    HighRepeat,
}

impl RepeaterRequest {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => RepeaterRequest::NonRepeater,
            1 => RepeaterRequest::LowRepeat,
            2 => RepeaterRequest::MediumRepeat,
            _ => RepeaterRequest::HighRepeat,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            RepeaterRequest::NonRepeater => 0,
            RepeaterRequest::LowRepeat => 1,
            RepeaterRequest::MediumRepeat => 2,
            RepeaterRequest::HighRepeat => 3,
        }
    }
}

/// Acknowledgement request flags (control word byte 1, bits 6-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AckRequest(pub u8);

impl AckRequest {
    pub const ACK_MESSAGE: u8 = 0x01;
    pub const NO_ACK: u8 = 0x02;
    pub const NO_REQUEUE_ON_NAK: u8 = 0x04;

    pub fn is_default(self) -> bool {
        self.0 == 0
    }
    pub fn wants_ack_message(self) -> bool {
        self.0 & Self::ACK_MESSAGE != 0
    }
    pub fn no_ack(self) -> bool {
        self.0 & Self::NO_ACK != 0
    }
    pub fn no_requeue_on_nak(self) -> bool {
        self.0 & Self::NO_REQUEUE_ON_NAK != 0
    }
}

/// Decoded two-byte packet control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlWord {
    pub link: bool,
    pub repeater_request: RepeaterRequest,
    /// Total packet length in bytes, control word and checksum included.
    pub declared_length: u8,
    /// Must be clear; a set bit is reported but does not stop decoding.
    pub reserved: bool,
    pub ack_request: AckRequest,
    pub transmit_count: u8,
    pub transmit_sequence: u8,
}

impl ControlWord {
    pub fn decode(b0: u8, b1: u8) -> Self {
        ControlWord {
            link: b0 & PACKETHEADER_LINKBIT != 0,
            repeater_request: RepeaterRequest::from_bits((b0 >> 5) & 0x03),
            declared_length: b0 & 0x1F,
            reserved: (b1 >> 7) & 0x01 != 0,
            ack_request: AckRequest((b1 >> 4) & 0x07),
            transmit_count: (b1 >> 2) & 0x03,
            transmit_sequence: b1 & 0x03,
        }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        let b0 = if self.link { PACKETHEADER_LINKBIT } else { 0 }
            | (self.repeater_request.bits() << 5)
            | (self.declared_length & 0x1F);
        let b1 = if self.reserved { 0x80 } else { 0 }
            | ((self.ack_request.0 & 0x07) << 4)
            | ((self.transmit_count & 0x03) << 2)
            | (self.transmit_sequence & 0x03);
        [b0, b1]
    }
}

/// Classification of a source or destination id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceIdKind {
    Broadcast,
    Reserved,
    WriteEnabled,
    SetupMode,
    Default,
    Unit,
}

impl DeviceIdKind {
    pub fn classify(id: u8) -> Self {
        match id {
            0x00 => DeviceIdKind::Broadcast,
            0xFB | 0xFC => DeviceIdKind::Reserved,
            0xFD => DeviceIdKind::WriteEnabled,
            0xFE => DeviceIdKind::SetupMode,
            0xFF => DeviceIdKind::Default,
            _ => DeviceIdKind::Unit,
        }
    }

    /// True for ids outside the ordinary unit range.
    pub fn is_special(self) -> bool {
        !matches!(self, DeviceIdKind::Unit)
    }
}

/// Well-known UPB device registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpbRegister {
    NetworkId,
    ModuleId,
    Password,
    UpbOptions,
    UpbVersion,
    ManufacturerId,
    ProductId,
    FirmwareVersion,
    SerialNumber,
    NetworkName,
    RoomName,
    DeviceName,
    Reserved1,
    PimOptions,
    Reserved2,
    SignalStrength,
    NoiseFloor,
    NoiseCounts,
}

impl UpbRegister {
    pub fn from_address(addr: u8) -> Option<Self> {
        Some(match addr {
            0x00 => UpbRegister::NetworkId,
            0x01 => UpbRegister::ModuleId,
            0x02 => UpbRegister::Password,
            0x04 => UpbRegister::UpbOptions,
            0x05 => UpbRegister::UpbVersion,
            0x06 => UpbRegister::ManufacturerId,
            0x08 => UpbRegister::ProductId,
            0x0A => UpbRegister::FirmwareVersion,
            0x0C => UpbRegister::SerialNumber,
            0x10 => UpbRegister::NetworkName,
            0x20 => UpbRegister::RoomName,
            0x30 => UpbRegister::DeviceName,
            0x40 => UpbRegister::Reserved1,
            0x70 => UpbRegister::PimOptions,
            0x71 => UpbRegister::Reserved2,
            0xF9 => UpbRegister::SignalStrength,
            0xFA => UpbRegister::NoiseFloor,
            0xFB => UpbRegister::NoiseCounts,
            _ => return None,
        })
    }

    pub fn address(self) -> u8 {
        match self {
            UpbRegister::NetworkId => 0x00,
            UpbRegister::ModuleId => 0x01,
            UpbRegister::Password => 0x02,
            UpbRegister::UpbOptions => 0x04,
            UpbRegister::UpbVersion => 0x05,
            UpbRegister::ManufacturerId => 0x06,
            UpbRegister::ProductId => 0x08,
            UpbRegister::FirmwareVersion => 0x0A,
            UpbRegister::SerialNumber => 0x0C,
            UpbRegister::NetworkName => 0x10,
            UpbRegister::RoomName => 0x20,
            UpbRegister::DeviceName => 0x30,
            UpbRegister::Reserved1 => 0x40,
            UpbRegister::PimOptions => 0x70,
            UpbRegister::Reserved2 => 0x71,
            UpbRegister::SignalStrength => 0xF9,
            UpbRegister::NoiseFloor => 0xFA,
            UpbRegister::NoiseCounts => 0xFB,
        }
    }
}

/// UPB core command set (MDID 0x00-0x1F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoreCommand {
    Null,
    WriteEnable,
    WriteProtect,
    StartSetupMode,
    StopSetupMode,
    GetSetupTime,
    AutoAddress,
    GetDeviceStatus,
    SetDeviceControl,
    GetSignature,
    GetRegisterValues,
    SetRegisterValues,
}

impl CoreCommand {
    fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0x00 => CoreCommand::Null,
            0x01 => CoreCommand::WriteEnable,
            0x02 => CoreCommand::WriteProtect,
            0x03 => CoreCommand::StartSetupMode,
            0x04 => CoreCommand::StopSetupMode,
            0x05 => CoreCommand::GetSetupTime,
            0x06 => CoreCommand::AutoAddress,
            0x07 => CoreCommand::GetDeviceStatus,
            0x08 => CoreCommand::SetDeviceControl,
            0x10 => CoreCommand::GetSignature,
            0x11 => CoreCommand::GetRegisterValues,
            0x12 => CoreCommand::SetRegisterValues,
            _ => return None,
        })
    }
}

/// UPB device control command set (MDID 0x20-0x3F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceControlCommand {
    ActivateLink,
    DeactivateLink,
    Goto,
    FadeStart,
    FadeStop,
    Blink,
    Indicate,
    Toggle,
    ReportState,
    StoreState,
}

impl DeviceControlCommand {
    fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0x00 => DeviceControlCommand::ActivateLink,
            0x01 => DeviceControlCommand::DeactivateLink,
            0x02 => DeviceControlCommand::Goto,
            0x03 => DeviceControlCommand::FadeStart,
            0x04 => DeviceControlCommand::FadeStop,
            0x05 => DeviceControlCommand::Blink,
            0x06 => DeviceControlCommand::Indicate,
            0x07 => DeviceControlCommand::Toggle,
            0x10 => DeviceControlCommand::ReportState,
            0x11 => DeviceControlCommand::StoreState,
            _ => return None,
        })
    }
}

/// UPB core report set (MDID 0x80-0x9F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoreReport {
    AckResponse,
    SetupTime,
    DeviceState,
    DeviceStatus,
    DeviceSignature,
    RegisterValues,
    RamValues,
    RawData,
    Heartbeat,
}

impl CoreReport {
    fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0x00 => CoreReport::AckResponse,
            0x05 => CoreReport::SetupTime,
            0x06 => CoreReport::DeviceState,
            0x07 => CoreReport::DeviceStatus,
            0x0F => CoreReport::DeviceSignature,
            0x10 => CoreReport::RegisterValues,
            0x11 => CoreReport::RamValues,
            0x12 => CoreReport::RawData,
            0x13 => CoreReport::Heartbeat,
            _ => return None,
        })
    }
}

/// Command set selected by the top three bits of the MDID byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MdidSet {
    CoreCommands,
    DeviceControl,
    CoreReports,
    Reserved(u8),
}

impl MdidSet {
    pub fn from_mdid(mdid: u8) -> Self {
        match mdid >> 5 {
            0 => MdidSet::CoreCommands,
            1 => MdidSet::DeviceControl,
            4 => MdidSet::CoreReports,
            other => MdidSet::Reserved(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MdidClassification {
    Core(CoreCommand),
    DeviceControl(DeviceControlCommand),
    Report(CoreReport),
    Unrecognized(u8),
}

impl MdidClassification {
    pub fn classify(mdid: u8) -> Self {
        let index = mdid & 0x1F;
        let known = match MdidSet::from_mdid(mdid) {
            MdidSet::CoreCommands => CoreCommand::from_index(index).map(MdidClassification::Core),
            MdidSet::DeviceControl => {
                DeviceControlCommand::from_index(index).map(MdidClassification::DeviceControl)
            }
            MdidSet::CoreReports => CoreReport::from_index(index).map(MdidClassification::Report),
            MdidSet::Reserved(_) => None,
        };
        known.unwrap_or(MdidClassification::Unrecognized(mdid))
    }
}
