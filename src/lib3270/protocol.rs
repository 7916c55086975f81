//! 3270 Protocol Implementation
//!
//! Decodes 3270 data stream records (one command per record, no TN3270E
//! header) into a [`Display3270`] and encodes inbound reads for attention
//! keys.

use log::debug;

use super::codes::*;
use super::display::{addressing, Display3270, FieldSpan};
use crate::error::{ProtocolError, ProtocolResult};
use crate::keyboard::AttentionKey;
use crate::position::Position;
use crate::protocol::TerminalType;
use crate::protocol_common::ebcdic::{char_to_ebcdic, display_char, ebcdic_to_display_string};
use crate::protocol_common::{EngineUpdate, RecordReader, TerminalEngine};
use crate::screen::{Field, Screen};

/// TN3270 terminal-display engine
#[derive(Debug)]
pub struct Tn3270Engine {
    terminal_type: TerminalType,
    display: Display3270,
    cursor: Option<usize>,
    keyboard_locked: bool,
}

impl Tn3270Engine {
    pub fn new(terminal_type: TerminalType) -> Self {
        Self {
            terminal_type,
            display: Display3270::new(terminal_type.rows, terminal_type.columns),
            cursor: None,
            keyboard_locked: true,
        }
    }

    fn read_address(&self, reader: &mut RecordReader<'_>) -> ProtocolResult<usize> {
        let byte1 = reader.get_byte()?;
        let byte2 = reader.get_byte()?;
        let address = addressing::decode_address(byte1, byte2);
        if address >= self.display.size() {
            return Err(ProtocolError::InvalidAddress {
                address,
                buffer_size: self.display.size(),
            });
        }
        Ok(address)
    }

    fn encode_address(&self, address: usize) -> [u8; 2] {
        addressing::encode_address(address, self.display.size())
    }

    fn set_keyboard(&mut self, locked: bool, update: &mut EngineUpdate) {
        self.keyboard_locked = locked;
        update.keyboard_locked = Some(locked);
    }

    fn write(&mut self, command: CommandCode, reader: &mut RecordReader<'_>, update: &mut EngineUpdate) -> ProtocolResult<()> {
        match command {
            CommandCode::EraseWrite => {
                self.display.clear(self.terminal_type.rows, self.terminal_type.columns);
                self.cursor = Some(0);
            }
            CommandCode::EraseWriteAlternate => {
                self.display
                    .clear(self.terminal_type.alternate_rows, self.terminal_type.alternate_columns);
                self.cursor = Some(0);
            }
            _ => {}
        }
        update.screen_changed = true;

        let wcc = if reader.is_empty() { 0 } else { reader.get_byte()? };
        if wcc & WCC_RESET_MDT != 0 {
            self.display.reset_mdt();
        }
        self.display.set_address(self.cursor.unwrap_or(0));
        self.process_orders(reader)?;

        if wcc & WCC_ALARM != 0 {
            update.alarm = true;
        }
        if wcc & WCC_RESTORE != 0 {
            self.set_keyboard(false, update);
        }
        Ok(())
    }

    fn process_orders(&mut self, reader: &mut RecordReader<'_>) -> ProtocolResult<()> {
        while !reader.is_empty() {
            let byte = reader.get_byte()?;
            match byte {
                ORDER_SF => {
                    let attribute = reader.get_byte()?;
                    self.display.start_field(attribute);
                }
                ORDER_SFE => {
                    let attribute = self.extended_attribute_pairs(reader)?.unwrap_or(0);
                    self.display.start_field(attribute);
                }
                ORDER_SBA => {
                    let address = self.read_address(reader)?;
                    self.display.set_address(address);
                }
                ORDER_SA => {
                    reader.take(2)?;
                }
                ORDER_MF => {
                    let address = self.display.address();
                    if let Some(attribute) = self.extended_attribute_pairs(reader)? {
                        if self.display.attribute_at(address).is_some() {
                            self.display.set_attribute_at(address, attribute);
                        }
                    }
                    self.display.set_address(address + 1);
                }
                ORDER_IC => self.cursor = Some(self.display.address()),
                ORDER_PT => {
                    let next = self.display.next_unprotected_field(self.display.address());
                    self.display.set_address(next.unwrap_or(0));
                }
                ORDER_RA => {
                    let end = self.read_address(reader)?;
                    let mut repeated = reader.get_byte()?;
                    if repeated == ORDER_GE {
                        repeated = reader.get_byte()?;
                    }
                    self.display.repeat_to(end, repeated);
                }
                ORDER_EUA => {
                    let end = self.read_address(reader)?;
                    self.display.erase_unprotected_to(end);
                }
                ORDER_GE => {
                    let graphic = reader.get_byte()?;
                    self.display.write_char(graphic);
                }
                data => self.display.write_char(data),
            }
        }
        Ok(())
    }

    /// Read the type/value pairs of SFE or MF, returning the basic field
    /// attribute when one is present
    fn extended_attribute_pairs(&self, reader: &mut RecordReader<'_>) -> ProtocolResult<Option<u8>> {
        let count = reader.get_byte()?;
        let mut attribute = None;
        for _ in 0..count {
            let kind = reader.get_byte()?;
            let value = reader.get_byte()?;
            if kind == XA_3270 {
                attribute = Some(value);
            }
        }
        Ok(attribute)
    }

    fn erase_all_unprotected(&mut self, update: &mut EngineUpdate) {
        self.display.erase_all_unprotected();
        let cursor = self.display.next_unprotected_field(self.display.size() - 1).unwrap_or(0);
        self.cursor = Some(cursor);
        update.screen_changed = true;
        self.set_keyboard(false, update);
    }

    fn write_structured_fields(&mut self, reader: &mut RecordReader<'_>, update: &mut EngineUpdate) -> ProtocolResult<()> {
        while !reader.is_empty() {
            let length = reader.get_u16()? as usize;
            let body = if length == 0 {
                reader.take(reader.remaining())?
            } else {
                reader.take(length.saturating_sub(2))?
            };
            let Some((&id, payload)) = body.split_first() else {
                continue;
            };

            match (id, payload) {
                (SF_READ_PARTITION, [_partition, kind, ..])
                    if *kind == SF_READ_PARTITION_QUERY || *kind == SF_READ_PARTITION_QUERY_LIST =>
                {
                    debug!("3270: answering read partition query for {}", self.terminal_type.id);
                    update.replies.push(self.query_reply());
                }
                (SF_ERASE_RESET, [flags, ..]) => {
                    let (rows, columns) = if flags & 0x80 != 0 {
                        (self.terminal_type.alternate_rows, self.terminal_type.alternate_columns)
                    } else {
                        (self.terminal_type.rows, self.terminal_type.columns)
                    };
                    self.display.clear(rows, columns);
                    self.cursor = Some(0);
                    update.screen_changed = true;
                }
                _ => debug!("3270: ignoring structured field 0x{:02X}", id),
            }
        }
        Ok(())
    }

    /// Summary, Usable Area and Implicit Partition query replies
    fn query_reply(&self) -> Vec<u8> {
        let tt = &self.terminal_type;
        let width = (tt.alternate_columns as u16).to_be_bytes();
        let height = (tt.alternate_rows as u16).to_be_bytes();
        let buffer_size = ((tt.alternate_rows * tt.alternate_columns) as u16).to_be_bytes();

        let mut reply = vec![AID_STRUCTURED_FIELD];
        reply.extend_from_slice(&[0x00, 0x07, QUERY_REPLY, QR_SUMMARY, QR_SUMMARY, QR_USABLE_AREA, QR_IMPLICIT_PARTITION]);

        reply.extend_from_slice(&[0x00, 0x17, QUERY_REPLY, QR_USABLE_AREA, 0x01, 0x00]);
        reply.extend_from_slice(&width);
        reply.extend_from_slice(&height);
        reply.extend_from_slice(&[0x00, 0x00, 0x0A, 0x02, 0xE5, 0x00, 0x02, 0x00, 0x6F, 0x09, 0x0C]);
        reply.extend_from_slice(&buffer_size);

        reply.extend_from_slice(&[0x00, 0x11, QUERY_REPLY, QR_IMPLICIT_PARTITION, 0x00, 0x00, 0x0B, 0x01, 0x00]);
        reply.extend_from_slice(&(tt.columns as u16).to_be_bytes());
        reply.extend_from_slice(&(tt.rows as u16).to_be_bytes());
        reply.extend_from_slice(&width);
        reply.extend_from_slice(&height);
        reply
    }

    /// AID, cursor address, then each modified field as SBA + data
    fn read_modified(&self, aid: u8) -> Vec<u8> {
        let mut data = vec![aid];
        data.extend_from_slice(&self.encode_address(self.cursor.unwrap_or(0)));
        if !self.display.is_formatted() {
            data.extend(self.display.buffer().iter().copied().filter(|&byte| byte != 0x00));
            return data;
        }
        for field in self.display.fields().iter().filter(|field| field.is_modified()) {
            data.push(ORDER_SBA);
            data.extend_from_slice(&self.encode_address(field.start));
            data.extend(self.display.field_data(field));
        }
        data
    }

    /// AID, cursor address and the whole buffer with SF orders for attributes
    fn read_buffer(&self) -> Vec<u8> {
        let mut data = vec![AID_NO_AID];
        data.extend_from_slice(&self.encode_address(self.cursor.unwrap_or(0)));
        for (address, &byte) in self.display.buffer().iter().enumerate() {
            match self.display.attribute_at(address) {
                Some(attribute) => data.extend_from_slice(&[ORDER_SF, attribute]),
                None => data.push(byte),
            }
        }
        data
    }

    fn to_screen_field(&self, field: &FieldSpan) -> Field {
        Field {
            start: Position::from_offset(field.start, self.display.columns()),
            length: field.length,
            protected: field.is_protected(),
            hidden: field.is_hidden(),
            numeric: field.is_numeric(),
            modified: field.is_modified(),
            content: ebcdic_to_display_string(&self.display.field_data(field))
                .trim_end()
                .to_string(),
        }
    }
}

impl TerminalEngine for Tn3270Engine {
    fn protocol_name(&self) -> &'static str {
        "TN3270"
    }

    fn terminal_type(&self) -> TerminalType {
        self.terminal_type
    }

    fn process_record(&mut self, record: &[u8]) -> ProtocolResult<EngineUpdate> {
        let mut update = EngineUpdate::default();
        let Some((&code, _)) = record.split_first() else {
            return Ok(update);
        };
        let command = CommandCode::from_u8(code).ok_or(ProtocolError::InvalidCommandCode { code })?;
        debug!("3270: {:?}, {} bytes", command, record.len());

        let cursor_before = self.cursor;
        let mut reader = RecordReader::new(&record[1..]);
        match command {
            CommandCode::Write | CommandCode::EraseWrite | CommandCode::EraseWriteAlternate => {
                self.write(command, &mut reader, &mut update)?;
            }
            CommandCode::EraseAllUnprotected => self.erase_all_unprotected(&mut update),
            CommandCode::ReadBuffer => update.replies.push(self.read_buffer()),
            CommandCode::ReadModified | CommandCode::ReadModifiedAll => {
                update.replies.push(self.read_modified(AID_NO_AID));
            }
            CommandCode::WriteStructuredField => self.write_structured_fields(&mut reader, &mut update)?,
        }

        update.cursor_moved = self.cursor != cursor_before;
        Ok(update)
    }

    fn screen(&self) -> Screen {
        let display = &self.display;
        let mut cells: Vec<char> = display
            .buffer()
            .iter()
            .enumerate()
            .map(|(address, &byte)| match display.attribute_at(address) {
                Some(_) => ' ',
                None => display_char(byte),
            })
            .collect();

        let spans = display.fields();
        for span in spans.iter().filter(|span| span.is_hidden()) {
            for address in span.addresses(display.size()) {
                cells[address] = ' ';
            }
        }
        let fields = spans
            .iter()
            .filter(|span| span.length > 0)
            .map(|span| self.to_screen_field(span))
            .collect();
        Screen::from_parts(display.rows(), display.columns(), cells, fields)
    }

    fn cursor(&self) -> Option<Position> {
        self.cursor
            .map(|address| Position::from_offset(address, self.display.columns()))
    }

    fn keyboard_locked(&self) -> bool {
        self.keyboard_locked
    }

    fn supports_key(&self, key: AttentionKey) -> bool {
        aid_for_key(key).is_some()
    }

    fn fill_field(&mut self, start: Position, value: &str) -> ProtocolResult<()> {
        let offset = start
            .to_offset(self.display.rows(), self.display.columns())
            .ok_or(ProtocolError::FieldNotFound { position: start })?;
        let field = self
            .display
            .fields()
            .into_iter()
            .find(|field| field.start == offset && !field.is_protected() && field.length > 0)
            .ok_or(ProtocolError::FieldNotFound { position: start })?;

        let data: Vec<u8> = value.chars().take(field.length).map(char_to_ebcdic).collect();
        self.display.write_field(&field, &data);
        Ok(())
    }

    fn attention(&mut self, key: AttentionKey) -> ProtocolResult<Vec<u8>> {
        let aid = aid_for_key(key).ok_or(ProtocolError::UnsupportedKey { key: key.name() })?;
        let record = if is_short_read(aid) {
            vec![aid]
        } else {
            self.read_modified(aid)
        };
        if aid == AID_CLEAR {
            self.display.clear(self.terminal_type.rows, self.terminal_type.columns);
            self.cursor = Some(0);
        }
        self.keyboard_locked = true;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;
    use crate::protocol_common::ebcdic::string_to_ebcdic;

    fn engine() -> Tn3270Engine {
        Tn3270Engine::new(Protocol::Tn3270.terminal_type_by_id("IBM-3278-4").unwrap())
    }

    fn sba(row: usize, column: usize) -> Vec<u8> {
        let mut bytes = vec![ORDER_SBA];
        bytes.extend_from_slice(&addressing::encode_12bit_address((row - 1) * 80 + column - 1));
        bytes
    }

    /// Logon panel: "USERID ===>" input at (5, 20), hidden "PASSWORD ===>" input at (6, 22)
    fn logon_panel(command: u8) -> Vec<u8> {
        let mut record = vec![command, WCC_RESTORE | WCC_RESET_MDT];
        record.extend(sba(1, 30));
        record.extend_from_slice(&[ORDER_SF, ATTR_PROTECTED]);
        record.extend(string_to_ebcdic("LOGON"));
        record.extend(sba(5, 7));
        record.extend_from_slice(&[ORDER_SF, ATTR_PROTECTED]);
        record.extend(string_to_ebcdic("USERID ===>"));
        record.extend_from_slice(&[ORDER_SF, 0x00]);
        record.extend(sba(5, 29));
        record.extend_from_slice(&[ORDER_SF, ATTR_PROTECTED]);
        record.extend(sba(6, 7));
        record.extend_from_slice(&[ORDER_SF, ATTR_PROTECTED]);
        record.extend(string_to_ebcdic("PASSWORD ===>"));
        record.extend_from_slice(&[ORDER_SFE, 0x01, XA_3270, DISPLAY_HIDDEN]);
        record.extend_from_slice(&[ORDER_IC]);
        record.extend(sba(6, 29));
        record.extend_from_slice(&[ORDER_SF, ATTR_PROTECTED]);
        record
    }

    #[test]
    fn test_erase_write_logon_panel() {
        let mut engine = engine();
        let update = engine.process_record(&logon_panel(CMD_ERASE_WRITE)).unwrap();
        assert!(update.screen_changed);
        assert_eq!(update.keyboard_locked, Some(false));
        assert_eq!(engine.cursor(), Some(Position::new(6, 22)));

        let screen = engine.screen();
        assert_eq!((screen.rows(), screen.columns()), (24, 80));
        assert!(screen.row_text(1).unwrap().contains("LOGON"));
        let userid = screen.field_for_label("USERID ===>").unwrap();
        assert_eq!(userid.start, Position::new(5, 20));
        assert!(screen.fields().iter().any(|field| field.hidden && !field.protected));
    }

    #[test]
    fn test_sna_command_codes() {
        let mut engine = engine();
        engine.process_record(&logon_panel(SNA_CMD_ERASE_WRITE)).unwrap();
        assert!(engine.screen().text().contains("USERID"));
    }

    #[test]
    fn test_erase_write_alternate_size() {
        let mut engine = engine();
        engine
            .process_record(&[CMD_ERASE_WRITE_ALTERNATE, WCC_RESTORE])
            .unwrap();
        let screen = engine.screen();
        assert_eq!((screen.rows(), screen.columns()), (43, 80));
    }

    #[test]
    fn test_enter_sends_modified_fields() {
        let mut engine = engine();
        engine.process_record(&logon_panel(CMD_ERASE_WRITE)).unwrap();
        engine.fill_field(Position::new(5, 20), "IBMUSER").unwrap();

        let inbound = engine.attention(AttentionKey::Enter).unwrap();
        assert!(engine.keyboard_locked());
        assert_eq!(inbound[0], AID_ENTER);
        assert_eq!(&inbound[1..3], &addressing::encode_12bit_address(5 * 80 + 21));
        let mut expected = sba(5, 20);
        expected.extend(string_to_ebcdic("IBMUSER"));
        assert_eq!(&inbound[3..], expected.as_slice());
    }

    #[test]
    fn test_short_read_keys() {
        let mut engine = engine();
        engine.process_record(&logon_panel(CMD_ERASE_WRITE)).unwrap();
        engine.fill_field(Position::new(5, 20), "IBMUSER").unwrap();
        assert_eq!(engine.attention(AttentionKey::PA1).unwrap(), vec![AID_PA1]);
        assert_eq!(engine.attention(AttentionKey::Clear).unwrap(), vec![AID_CLEAR]);
        assert!(engine.screen().fields().is_empty());
    }

    #[test]
    fn test_unsupported_keys() {
        let mut engine = engine();
        assert!(!engine.supports_key(AttentionKey::RollUp));
        assert!(matches!(
            engine.attention(AttentionKey::Help),
            Err(ProtocolError::UnsupportedKey { .. })
        ));
    }

    #[test]
    fn test_alarm_and_restore_from_wcc() {
        let mut engine = engine();
        let update = engine.process_record(&[CMD_WRITE, WCC_ALARM]).unwrap();
        assert!(update.alarm);
        assert_eq!(update.keyboard_locked, None);
        assert!(engine.keyboard_locked());
    }

    #[test]
    fn test_hidden_field_is_masked() {
        let mut engine = engine();
        engine.process_record(&logon_panel(CMD_ERASE_WRITE)).unwrap();
        engine.fill_field(Position::new(6, 22), "SECRET").unwrap();
        let screen = engine.screen();
        assert!(!screen.text().contains("SECRET"));
    }

    #[test]
    fn test_repeat_to_address_with_graphic_escape() {
        let mut engine = engine();
        let mut record = vec![CMD_ERASE_WRITE, 0x00];
        record.extend(sba(2, 1));
        record.push(ORDER_RA);
        record.extend_from_slice(&addressing::encode_12bit_address(80 + 5));
        record.extend_from_slice(&[ORDER_GE, 0x60]);
        engine.process_record(&record).unwrap();
        assert_eq!(engine.screen().row_text(2).unwrap().trim_end(), "-----");
    }

    #[test]
    fn test_erase_all_unprotected() {
        let mut engine = engine();
        engine.process_record(&logon_panel(CMD_ERASE_WRITE)).unwrap();
        engine.fill_field(Position::new(5, 20), "IBMUSER").unwrap();
        engine.attention(AttentionKey::Enter).unwrap();

        let update = engine.process_record(&[CMD_ERASE_ALL_UNPROTECTED]).unwrap();
        assert_eq!(update.keyboard_locked, Some(false));
        assert_eq!(engine.cursor(), Some(Position::new(5, 20)));
        assert!(!engine.screen().text().contains("IBMUSER"));
    }

    #[test]
    fn test_read_modified_reply() {
        let mut engine = engine();
        engine.process_record(&logon_panel(CMD_ERASE_WRITE)).unwrap();
        engine.fill_field(Position::new(5, 20), "U").unwrap();
        let update = engine.process_record(&[CMD_READ_MODIFIED]).unwrap();
        assert_eq!(update.replies.len(), 1);
        assert_eq!(update.replies[0][0], AID_NO_AID);
        assert!(update.replies[0].ends_with(&string_to_ebcdic("U")));
    }

    #[test]
    fn test_read_partition_query() {
        let mut engine = engine();
        let update = engine
            .process_record(&[CMD_WRITE_STRUCTURED_FIELD, 0x00, 0x05, SF_READ_PARTITION, 0xFF, SF_READ_PARTITION_QUERY])
            .unwrap();
        let reply = &update.replies[0];
        assert_eq!(reply[0], AID_STRUCTURED_FIELD);
        assert_eq!(reply.len(), 1 + 7 + 23 + 17);
        // usable area reports the 43x80 alternate size
        assert_eq!(&reply[14..18], &[0x00, 80, 0x00, 43]);
    }

    #[test]
    fn test_invalid_records() {
        let mut engine = engine();
        assert!(engine.process_record(&[]).unwrap().is_empty());
        assert!(matches!(
            engine.process_record(&[0x99]),
            Err(ProtocolError::InvalidCommandCode { code: 0x99 })
        ));
        assert!(matches!(
            engine.process_record(&[CMD_WRITE, 0x00, ORDER_SBA, 0x7F, 0x7F]),
            Err(ProtocolError::InvalidAddress { .. })
        ));
    }
}
