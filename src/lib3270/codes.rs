/// TN3270 Protocol Constants and Codes
///
/// Command codes, order codes, AIDs and field attribute bits of the 3270 data
/// stream (IBM GA23-0059). Hosts send commands either as channel (CCW) codes
/// or in their SNA form; both are recognized.
use crate::keyboard::AttentionKey;

/// 3270 Command Codes, channel (CCW) encoding
pub const CMD_WRITE: u8 = 0x01;
pub const CMD_ERASE_WRITE: u8 = 0x05;
pub const CMD_ERASE_WRITE_ALTERNATE: u8 = 0x0D;
pub const CMD_READ_BUFFER: u8 = 0x02;
pub const CMD_READ_MODIFIED: u8 = 0x06;
pub const CMD_READ_MODIFIED_ALL: u8 = 0x0E;
pub const CMD_ERASE_ALL_UNPROTECTED: u8 = 0x0F;
pub const CMD_WRITE_STRUCTURED_FIELD: u8 = 0x11;

/// 3270 Command Codes, SNA encoding
pub const SNA_CMD_WRITE: u8 = 0xF1;
pub const SNA_CMD_ERASE_WRITE: u8 = 0xF5;
pub const SNA_CMD_ERASE_WRITE_ALTERNATE: u8 = 0x7E;
pub const SNA_CMD_READ_BUFFER: u8 = 0xF2;
pub const SNA_CMD_READ_MODIFIED: u8 = 0xF6;
pub const SNA_CMD_READ_MODIFIED_ALL: u8 = 0x6E;
pub const SNA_CMD_ERASE_ALL_UNPROTECTED: u8 = 0x6F;
pub const SNA_CMD_WRITE_STRUCTURED_FIELD: u8 = 0xF3;

/// 3270 Order Codes
pub const ORDER_SF: u8 = 0x1D; // Start Field
pub const ORDER_SFE: u8 = 0x29; // Start Field Extended
pub const ORDER_SBA: u8 = 0x11; // Set Buffer Address
pub const ORDER_SA: u8 = 0x28; // Set Attribute
pub const ORDER_MF: u8 = 0x2C; // Modify Field
pub const ORDER_IC: u8 = 0x13; // Insert Cursor
pub const ORDER_PT: u8 = 0x05; // Program Tab
pub const ORDER_RA: u8 = 0x3C; // Repeat to Address
pub const ORDER_EUA: u8 = 0x12; // Erase Unprotected to Address
pub const ORDER_GE: u8 = 0x08; // Graphic Escape

/// Write Control Character (WCC) bits
pub const WCC_RESET: u8 = 0x40;
pub const WCC_ALARM: u8 = 0x04;
pub const WCC_RESTORE: u8 = 0x02;
pub const WCC_RESET_MDT: u8 = 0x01;

/// Field attribute bits
pub const ATTR_PROTECTED: u8 = 0x20;
pub const ATTR_NUMERIC: u8 = 0x10;
pub const ATTR_DISPLAY: u8 = 0x0C;
pub const ATTR_MDT: u8 = 0x01;
pub const DISPLAY_HIDDEN: u8 = 0x0C;

/// Extended attribute type carrying the basic field attribute in SFE / MF
pub const XA_3270: u8 = 0xC0;

/// AIDs
pub const AID_NO_AID: u8 = 0x60;
pub const AID_STRUCTURED_FIELD: u8 = 0x88;
pub const AID_ENTER: u8 = 0x7D;
pub const AID_CLEAR: u8 = 0x6D;
pub const AID_SYSREQ: u8 = 0xF0;
pub const AID_PA1: u8 = 0x6C;
pub const AID_PA2: u8 = 0x6E;
pub const AID_PA3: u8 = 0x6B;

/// PF1..PF24 in key order
pub const AID_PF: [u8; 24] = [
    0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0x7A, 0x7B, 0x7C, //
    0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0x4A, 0x4B, 0x4C,
];

/// Structured field identifiers
pub const SF_READ_PARTITION: u8 = 0x01;
pub const SF_READ_PARTITION_QUERY: u8 = 0x02;
pub const SF_READ_PARTITION_QUERY_LIST: u8 = 0x03;
pub const SF_ERASE_RESET: u8 = 0x03;
pub const QUERY_REPLY: u8 = 0x81;
pub const QR_SUMMARY: u8 = 0x80;
pub const QR_USABLE_AREA: u8 = 0x81;
pub const QR_IMPLICIT_PARTITION: u8 = 0xA6;

/// Host commands, whichever encoding they arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    Write,
    EraseWrite,
    EraseWriteAlternate,
    ReadBuffer,
    ReadModified,
    ReadModifiedAll,
    EraseAllUnprotected,
    WriteStructuredField,
}

impl CommandCode {
    /// Convert a byte value to a CommandCode enum
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            CMD_WRITE | SNA_CMD_WRITE => Some(Self::Write),
            CMD_ERASE_WRITE | SNA_CMD_ERASE_WRITE => Some(Self::EraseWrite),
            CMD_ERASE_WRITE_ALTERNATE | SNA_CMD_ERASE_WRITE_ALTERNATE => Some(Self::EraseWriteAlternate),
            CMD_READ_BUFFER | SNA_CMD_READ_BUFFER => Some(Self::ReadBuffer),
            CMD_READ_MODIFIED | SNA_CMD_READ_MODIFIED => Some(Self::ReadModified),
            CMD_READ_MODIFIED_ALL | SNA_CMD_READ_MODIFIED_ALL => Some(Self::ReadModifiedAll),
            CMD_ERASE_ALL_UNPROTECTED | SNA_CMD_ERASE_ALL_UNPROTECTED => Some(Self::EraseAllUnprotected),
            CMD_WRITE_STRUCTURED_FIELD | SNA_CMD_WRITE_STRUCTURED_FIELD => Some(Self::WriteStructuredField),
            _ => None,
        }
    }

    /// Commands followed by a WCC and orders
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::EraseWrite | Self::EraseWriteAlternate)
    }
}

/// AID for `key`, `None` when 3270 has no such key
pub fn aid_for_key(key: AttentionKey) -> Option<u8> {
    if let Some(number) = key.function_number() {
        return AID_PF.get(number as usize - 1).copied();
    }
    match key {
        AttentionKey::Enter => Some(AID_ENTER),
        AttentionKey::Clear => Some(AID_CLEAR),
        AttentionKey::SysRq => Some(AID_SYSREQ),
        AttentionKey::PA1 => Some(AID_PA1),
        AttentionKey::PA2 => Some(AID_PA2),
        AttentionKey::PA3 => Some(AID_PA3),
        _ => None,
    }
}

/// Short reads carry only the AID
pub fn is_short_read(aid: u8) -> bool {
    matches!(aid, AID_CLEAR | AID_PA1 | AID_PA2 | AID_PA3)
}
