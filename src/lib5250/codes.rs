//! TN5250 protocol constants
//!
//! Command, order and AID codes of the 5250 data stream as carried over
//! telnet (RFC 1205 / RFC 2877), plus the GDS record header layout.

use crate::keyboard::AttentionKey;

/// Escape byte that introduces every 5250 command
pub const ESC: u8 = 0x04;

/// 5250 commands
pub const CMD_CLEAR_UNIT: u8 = 0x40;
pub const CMD_CLEAR_UNIT_ALTERNATE: u8 = 0x20;
pub const CMD_CLEAR_FORMAT_TABLE: u8 = 0x50;
pub const CMD_WRITE_TO_DISPLAY: u8 = 0x11;
pub const CMD_WRITE_ERROR_CODE: u8 = 0x21;
pub const CMD_WRITE_ERROR_CODE_WINDOW: u8 = 0x22;
pub const CMD_READ_INPUT_FIELDS: u8 = 0x42;
pub const CMD_READ_MDT_FIELDS: u8 = 0x52;
pub const CMD_READ_MDT_FIELDS_ALT: u8 = 0x82;
pub const CMD_READ_SCREEN_IMMEDIATE: u8 = 0x62;
pub const CMD_READ_IMMEDIATE: u8 = 0x72;
pub const CMD_SAVE_SCREEN: u8 = 0x02;
pub const CMD_RESTORE_SCREEN: u8 = 0x12;
pub const CMD_ROLL: u8 = 0x23;
pub const CMD_WRITE_STRUCTURED_FIELD: u8 = 0xF3;

/// Write To Display orders
pub const SOH: u8 = 0x01; // Start of header
pub const RA: u8 = 0x02; // Repeat to address
pub const EA: u8 = 0x03; // Erase to address
pub const TD: u8 = 0x10; // Transparent data
pub const SBA: u8 = 0x11; // Set buffer address
pub const WEA: u8 = 0x12; // Write extended attribute
pub const IC: u8 = 0x13; // Insert cursor
pub const MC: u8 = 0x14; // Move cursor
pub const WDSF: u8 = 0x15; // Write to display structured field
pub const SF: u8 = 0x1D; // Start of field

/// Control character byte 1: keyboard lock and MDT handling
pub const CC1_LOCK_MASK: u8 = 0xE0;
pub const CC1_RESET_MDT_NONBYPASS: u8 = 0x40;
pub const CC1_RESET_MDT_ALL: u8 = 0x60;
pub const CC1_NULL_MDT_NONBYPASS: u8 = 0x80;

/// Control character byte 2
pub const CC2_CURSOR_NO_MOVE: u8 = 0x40;
pub const CC2_BLINK_CURSOR: u8 = 0x20;
pub const CC2_STOP_BLINK: u8 = 0x10;
pub const CC2_UNLOCK_KEYBOARD: u8 = 0x08;
pub const CC2_ALARM: u8 = 0x04;
pub const CC2_MESSAGE_OFF: u8 = 0x02;
pub const CC2_MESSAGE_ON: u8 = 0x01;

/// Field format word, first byte
pub const FFW_ID_MASK: u8 = 0xC0;
pub const FFW_ID: u8 = 0x40;
pub const FFW_BYPASS: u8 = 0x20;
pub const FFW_DUP_ENABLE: u8 = 0x10;
pub const FFW_MDT: u8 = 0x08;
pub const FFW_SHIFT_MASK: u8 = 0x07;
pub const FFW_NUMERIC_ONLY: u8 = 0x03;
pub const FFW_DIGITS_ONLY: u8 = 0x05;
pub const FFW_SIGNED_NUMERIC: u8 = 0x07;

/// Display attribute bytes occupy 0x20-0x3F; 0x27 and 0x2F are non-display
pub const ATTR_MIN: u8 = 0x20;
pub const ATTR_MAX: u8 = 0x3F;
pub const ATTR_NONDISPLAY_MASK: u8 = 0x07;

/// Write Structured Field class and the 5250 query type
pub const WSF_CLASS_5250: u8 = 0xD9;
pub const WSF_TYPE_QUERY: u8 = 0x70;

/// GDS record header
pub const GDS_RECORD_TYPE: u16 = 0x12A0;
pub const GDS_HEADER_LEN: usize = 10;
pub const GDS_VAR_HEADER_LEN: u8 = 0x04;

/// Header flag byte
pub const FLAG_ERR: u8 = 0x80;
pub const FLAG_ATN: u8 = 0x40;
pub const FLAG_SRQ: u8 = 0x04;
pub const FLAG_TRQ: u8 = 0x02;
pub const FLAG_HLP: u8 = 0x01;

/// Header opcodes
pub const OPCODE_NO_OP: u8 = 0x00;
pub const OPCODE_INVITE: u8 = 0x01;
pub const OPCODE_OUTPUT_ONLY: u8 = 0x02;
pub const OPCODE_PUT_GET: u8 = 0x03;
pub const OPCODE_SAVE_SCREEN: u8 = 0x04;
pub const OPCODE_RESTORE_SCREEN: u8 = 0x05;
pub const OPCODE_READ_IMMEDIATE: u8 = 0x06;
pub const OPCODE_READ_SCREEN: u8 = 0x08;
pub const OPCODE_CANCEL_INVITE: u8 = 0x0A;

/// Attention identifiers
pub const AID_ENTER: u8 = 0xF1;
pub const AID_CLEAR: u8 = 0xBD;
pub const AID_HELP: u8 = 0xF3;
pub const AID_ROLL_DOWN: u8 = 0xF4;
pub const AID_ROLL_UP: u8 = 0xF5;
pub const AID_PRINT: u8 = 0xF6;
pub const AID_QUERY_REPLY: u8 = 0x88;
pub const AID_F1: u8 = 0x31;
pub const AID_F13: u8 = 0xB1;

/// What an attention key puts on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// AID byte followed by the modified fields
    Aid(u8),
    /// AID byte without field data
    ShortAid(u8),
    /// Record with only a header flag set (ATTN, SYSREQ)
    HeaderFlag(u8),
}

/// Encoding of `key` in the 5250 data stream, `None` when the dialect has no
/// such key
pub fn key_encoding(key: AttentionKey) -> Option<KeyEncoding> {
    if let Some(number) = key.function_number() {
        let aid = if number <= 12 {
            AID_F1 + (number - 1)
        } else {
            AID_F13 + (number - 13)
        };
        return Some(KeyEncoding::Aid(aid));
    }
    match key {
        AttentionKey::Enter => Some(KeyEncoding::Aid(AID_ENTER)),
        AttentionKey::RollUp => Some(KeyEncoding::Aid(AID_ROLL_UP)),
        AttentionKey::RollDn => Some(KeyEncoding::Aid(AID_ROLL_DOWN)),
        AttentionKey::Clear => Some(KeyEncoding::ShortAid(AID_CLEAR)),
        AttentionKey::Help => Some(KeyEncoding::ShortAid(AID_HELP)),
        AttentionKey::Print => Some(KeyEncoding::ShortAid(AID_PRINT)),
        AttentionKey::Attn => Some(KeyEncoding::HeaderFlag(FLAG_ATN)),
        AttentionKey::SysRq => Some(KeyEncoding::HeaderFlag(FLAG_SRQ)),
        _ => None,
    }
}

/// Build a GDS record around `data`
pub fn build_gds_record(flags: u8, opcode: u8, data: &[u8]) -> Vec<u8> {
    let length = (GDS_HEADER_LEN + data.len()) as u16;
    let mut record = Vec::with_capacity(length as usize);
    record.extend_from_slice(&length.to_be_bytes());
    record.extend_from_slice(&GDS_RECORD_TYPE.to_be_bytes());
    record.extend_from_slice(&[0x00, 0x00, GDS_VAR_HEADER_LEN, flags, 0x00, opcode]);
    record.extend_from_slice(data);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_key_aids() {
        assert_eq!(key_encoding(AttentionKey::F1), Some(KeyEncoding::Aid(0x31)));
        assert_eq!(key_encoding(AttentionKey::F12), Some(KeyEncoding::Aid(0x3C)));
        assert_eq!(key_encoding(AttentionKey::F13), Some(KeyEncoding::Aid(0xB1)));
        assert_eq!(key_encoding(AttentionKey::F24), Some(KeyEncoding::Aid(0xBC)));
    }

    #[test]
    fn test_unsupported_keys() {
        assert_eq!(key_encoding(AttentionKey::PA1), None);
        assert_eq!(key_encoding(AttentionKey::PA3), None);
        assert_eq!(key_encoding(AttentionKey::Reset), None);
    }

    #[test]
    fn test_gds_header() {
        let record = build_gds_record(0, OPCODE_PUT_GET, &[0x01, 0x02]);
        assert_eq!(record, vec![0x00, 0x0C, 0x12, 0xA0, 0x00, 0x00, 0x04, 0x00, 0x00, 0x03, 0x01, 0x02]);
    }
}
