/// TN5250 session engine
///
/// Decodes 5250 data stream records into a presentation space and builds the
/// inbound records for attention keys. Every record is wrapped in a GDS header
/// (RFC 1205); the header opcode is informational here since the commands in
/// the record body carry everything the terminal has to do.
///
/// The engine keeps the raw EBCDIC buffer so Save/Restore and transparent data
/// round-trip exactly; text is decoded only when a snapshot is taken.
use std::collections::HashMap;

use log::{debug, warn};

use super::codes::*;
use super::field::FormatField;
use crate::error::{ProtocolError, ProtocolResult};
use crate::keyboard::AttentionKey;
use crate::position::Position;
use crate::protocol::TerminalType;
use crate::protocol_common::ebcdic::{char_to_ebcdic, display_char, string_to_ebcdic};
use crate::protocol_common::{EngineUpdate, RecordReader, TerminalEngine};
use crate::screen::Screen;

/// Length byte carried in the query reply, and the size of the whole reply
const QUERY_REPLY_LENGTH: u8 = 0x3A;
const QUERY_REPLY_SIZE: usize = 61;

/// Copy of the presentation space kept for Restore Screen
#[derive(Debug, Clone)]
struct SavedScreen {
    rows: usize,
    columns: usize,
    buffer: Vec<u8>,
    format_table: Vec<FormatField>,
    cursor: Option<usize>,
}

/// TN5250 terminal-display engine
#[derive(Debug)]
pub struct Tn5250Engine {
    terminal_type: TerminalType,
    rows: usize,
    columns: usize,
    /// EBCDIC presentation space, attribute bytes included
    buffer: Vec<u8>,
    format_table: Vec<FormatField>,
    /// Write position for data and orders
    address: usize,
    cursor: Option<usize>,
    keyboard_locked: bool,
    /// Read command the host is waiting on
    read_command: Option<u8>,
    saved_screens: HashMap<u8, SavedScreen>,
    next_save_id: u8,
}

impl Tn5250Engine {
    pub fn new(terminal_type: TerminalType) -> Self {
        let rows = terminal_type.rows;
        let columns = terminal_type.columns;
        Self {
            terminal_type,
            rows,
            columns,
            buffer: vec![0x00; rows * columns],
            format_table: Vec::new(),
            address: 0,
            cursor: None,
            keyboard_locked: true,
            read_command: None,
            saved_screens: HashMap::new(),
            next_save_id: 0,
        }
    }

    fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer offset of a 1-based row/column pair from the data stream
    fn address_of(&self, row: u8, column: u8) -> ProtocolResult<usize> {
        let position = Position::new(row as usize, column as usize);
        position
            .to_offset(self.rows, self.columns)
            .ok_or(ProtocolError::InvalidAddress {
                address: row as usize * self.columns + column as usize,
                buffer_size: self.size(),
            })
    }

    fn set_keyboard(&mut self, locked: bool, update: &mut EngineUpdate) {
        self.keyboard_locked = locked;
        update.keyboard_locked = Some(locked);
    }

    fn write_byte(&mut self, byte: u8) {
        let size = self.size();
        if size == 0 {
            return;
        }
        self.buffer[self.address] = byte;
        self.address = (self.address + 1) % size;
    }

    /// Fill from the current address through `end` inclusive
    fn fill_to(&mut self, end: usize, byte: u8) {
        let size = self.size();
        let count = (end + size - self.address) % size + 1;
        for _ in 0..count {
            self.write_byte(byte);
        }
    }

    fn clear_unit(&mut self, rows: usize, columns: usize, update: &mut EngineUpdate) {
        debug!("5250: clear unit {}x{}", rows, columns);
        self.rows = rows;
        self.columns = columns;
        self.buffer = vec![0x00; rows * columns];
        self.format_table.clear();
        self.address = 0;
        self.cursor = Some(0);
        self.read_command = None;
        self.set_keyboard(true, update);
        update.screen_changed = true;
    }

    fn process_command(
        &mut self,
        command: u8,
        reader: &mut RecordReader<'_>,
        update: &mut EngineUpdate,
    ) -> ProtocolResult<()> {
        match command {
            CMD_CLEAR_UNIT => {
                self.clear_unit(self.terminal_type.rows, self.terminal_type.columns, update);
            }
            CMD_CLEAR_UNIT_ALTERNATE => {
                let _parameter = reader.get_byte()?;
                self.clear_unit(
                    self.terminal_type.alternate_rows,
                    self.terminal_type.alternate_columns,
                    update,
                );
            }
            CMD_CLEAR_FORMAT_TABLE => {
                self.format_table.clear();
                self.read_command = None;
                self.set_keyboard(true, update);
                update.screen_changed = true;
            }
            CMD_WRITE_TO_DISPLAY => self.write_to_display(reader, update)?,
            CMD_WRITE_ERROR_CODE | CMD_WRITE_ERROR_CODE_WINDOW => {
                self.write_error_code(reader, update);
            }
            CMD_READ_INPUT_FIELDS | CMD_READ_MDT_FIELDS | CMD_READ_MDT_FIELDS_ALT => {
                let cc1 = reader.get_byte()?;
                let cc2 = reader.get_byte()?;
                self.read_command = Some(command);
                self.handle_cc1(cc1, update);
                self.handle_cc2(cc2, None, update);
            }
            CMD_READ_SCREEN_IMMEDIATE => {
                update.replies.push(build_gds_record(0, OPCODE_NO_OP, &self.buffer));
            }
            CMD_READ_IMMEDIATE => {
                let data = self.field_response(0x00, false);
                update.replies.push(build_gds_record(0, OPCODE_NO_OP, &data));
            }
            CMD_SAVE_SCREEN => {
                let id = self.save_screen();
                update
                    .replies
                    .push(build_gds_record(0, OPCODE_NO_OP, &[ESC, CMD_RESTORE_SCREEN, id]));
            }
            CMD_RESTORE_SCREEN => {
                let id = reader.get_byte()?;
                self.restore_screen(id, update);
            }
            CMD_ROLL => self.roll(reader, update)?,
            CMD_WRITE_STRUCTURED_FIELD => self.write_structured_field(reader, update)?,
            _ => return Err(ProtocolError::InvalidCommandCode { code: command }),
        }
        Ok(())
    }

    /// Keyboard lock and MDT handling requested by control character 1
    fn handle_cc1(&mut self, cc1: u8, update: &mut EngineUpdate) {
        let action = cc1 & CC1_LOCK_MASK;
        if action == 0 {
            return;
        }
        self.set_keyboard(true, update);

        let (null_modified, null_all, reset_nonbypass, reset_all) = match action {
            CC1_RESET_MDT_NONBYPASS => (false, false, true, false),
            CC1_RESET_MDT_ALL => (false, false, false, true),
            CC1_NULL_MDT_NONBYPASS => (true, false, false, false),
            0xA0 => (true, false, true, false),
            0xC0 => (false, true, true, false),
            0xE0 => (false, true, false, false),
            _ => (false, false, false, false),
        };

        for index in 0..self.format_table.len() {
            let field = &self.format_table[index];
            let input = field.is_input();
            if input && (null_all || (null_modified && field.modified)) {
                let end = (field.start + field.length).min(self.buffer.len());
                let start = field.start.min(end);
                self.buffer[start..end].fill(0x00);
            }
            let field = &mut self.format_table[index];
            if reset_all || (reset_nonbypass && input) {
                field.modified = false;
            }
        }
    }

    fn handle_cc2(&mut self, cc2: u8, insert_cursor: Option<usize>, update: &mut EngineUpdate) {
        if cc2 & CC2_CURSOR_NO_MOVE == 0 {
            if let Some(offset) = insert_cursor {
                self.cursor = Some(offset);
            }
        }
        if self.cursor.is_none() {
            self.cursor = Some(self.first_input_field().unwrap_or(0));
        }
        if cc2 & CC2_ALARM != 0 {
            update.alarm = true;
        }
        if cc2 & CC2_UNLOCK_KEYBOARD != 0 {
            self.set_keyboard(false, update);
        }
    }

    fn first_input_field(&self) -> Option<usize> {
        self.format_table
            .iter()
            .find(|field| field.is_input())
            .map(|field| field.start)
    }

    fn write_to_display(&mut self, reader: &mut RecordReader<'_>, update: &mut EngineUpdate) -> ProtocolResult<()> {
        let cc1 = reader.get_byte()?;
        let cc2 = reader.get_byte()?;
        self.handle_cc1(cc1, update);

        let mut insert_cursor = None;
        while let Some(next) = reader.peek() {
            if next == ESC {
                break;
            }
            let order = reader.get_byte()?;
            match order {
                SOH => {
                    let length = reader.get_byte()? as usize;
                    reader.take(length)?;
                }
                RA => {
                    let row = reader.get_byte()?;
                    let column = reader.get_byte()?;
                    let repeated = reader.get_byte()?;
                    let end = self.address_of(row, column)?;
                    self.fill_to(end, repeated);
                }
                EA => {
                    let row = reader.get_byte()?;
                    let column = reader.get_byte()?;
                    let length = reader.get_byte()? as usize;
                    reader.take(length.saturating_sub(1))?;
                    let end = self.address_of(row, column)?;
                    self.fill_to(end, 0x00);
                }
                TD => {
                    let length = reader.get_u16()? as usize;
                    for &byte in reader.take(length)? {
                        self.write_byte(byte);
                    }
                }
                SBA => {
                    let row = reader.get_byte()?;
                    let column = reader.get_byte()?;
                    self.address = self.address_of(row, column)?;
                }
                WEA => {
                    reader.take(2)?;
                }
                IC => {
                    let row = reader.get_byte()?;
                    let column = reader.get_byte()?;
                    insert_cursor = Some(self.address_of(row, column)?);
                }
                MC => {
                    let row = reader.get_byte()?;
                    let column = reader.get_byte()?;
                    self.cursor = Some(self.address_of(row, column)?);
                }
                WDSF => {
                    let length = reader.get_u16()? as usize;
                    reader.take(length.saturating_sub(2))?;
                }
                SF => self.start_of_field(reader)?,
                data => self.write_byte(data),
            }
        }

        self.handle_cc2(cc2, insert_cursor, update);
        update.screen_changed = true;
        Ok(())
    }

    fn start_of_field(&mut self, reader: &mut RecordReader<'_>) -> ProtocolResult<()> {
        let first = reader.get_byte()?;
        let (ffw, attribute) = if first & 0xE0 != ATTR_MIN {
            let second = reader.get_byte()?;
            let mut next = reader.get_byte()?;
            // Field control words come in pairs until the attribute byte
            while next & 0xE0 != ATTR_MIN {
                let _fcw2 = reader.get_byte()?;
                next = reader.get_byte()?;
            }
            (Some(u16::from_be_bytes([first, second])), next)
        } else {
            (None, first)
        };
        let length = reader.get_u16()? as usize;

        let size = self.size();
        let attribute_cell = self.address;
        self.buffer[attribute_cell] = attribute;
        let start = (attribute_cell + 1) % size;
        let length = length.min(size - start);

        self.format_table.retain(|field| field.start != start);
        self.format_table.push(FormatField::new(start, length, ffw, attribute));
        self.format_table.sort_by_key(|field| field.start);
        self.address = start;
        Ok(())
    }

    fn write_error_code(&mut self, reader: &mut RecordReader<'_>, update: &mut EngineUpdate) {
        let message = reader.take_until(ESC);
        let saved_address = self.address;
        self.address = (self.rows - 1) * self.columns;
        for &byte in message {
            self.write_byte(byte);
        }
        self.address = saved_address;
        update.screen_changed = true;
    }

    fn save_screen(&mut self) -> u8 {
        let id = self.next_save_id;
        self.next_save_id = self.next_save_id.wrapping_add(1);
        self.saved_screens.insert(
            id,
            SavedScreen {
                rows: self.rows,
                columns: self.columns,
                buffer: self.buffer.clone(),
                format_table: self.format_table.clone(),
                cursor: self.cursor,
            },
        );
        id
    }

    fn restore_screen(&mut self, id: u8, update: &mut EngineUpdate) {
        match self.saved_screens.remove(&id) {
            Some(saved) => {
                self.rows = saved.rows;
                self.columns = saved.columns;
                self.buffer = saved.buffer;
                self.format_table = saved.format_table;
                self.cursor = saved.cursor;
                self.address = 0;
                update.screen_changed = true;
            }
            None => warn!("5250: restore of unknown saved screen {}", id),
        }
    }

    fn roll(&mut self, reader: &mut RecordReader<'_>, update: &mut EngineUpdate) -> ProtocolResult<()> {
        let control = reader.get_byte()?;
        let top = reader.get_byte()? as usize;
        let bottom = reader.get_byte()? as usize;
        let lines = (control & 0x1F) as usize;
        let down = control & 0x80 != 0;
        if top == 0 || bottom > self.rows || top > bottom || lines == 0 {
            return Ok(());
        }

        let columns = self.columns;
        let region: Vec<Vec<u8>> = (top..=bottom)
            .map(|row| self.buffer[(row - 1) * columns..row * columns].to_vec())
            .collect();
        let height = region.len();
        for (index, row) in (top..=bottom).enumerate() {
            let source = if down {
                index.checked_sub(lines)
            } else {
                Some(index + lines).filter(|&s| s < height)
            };
            let target = &mut self.buffer[(row - 1) * columns..row * columns];
            match source {
                Some(source) => target.copy_from_slice(&region[source]),
                None => target.fill(0x00),
            }
        }
        update.screen_changed = true;
        Ok(())
    }

    fn write_structured_field(&mut self, reader: &mut RecordReader<'_>, update: &mut EngineUpdate) -> ProtocolResult<()> {
        let length = reader.get_u16()? as usize;
        let class = reader.get_byte()?;
        let sf_type = reader.get_byte()?;
        reader.take(length.saturating_sub(4).min(reader.remaining()))?;

        if class == WSF_CLASS_5250 && sf_type == WSF_TYPE_QUERY {
            debug!("5250: answering query for {}", self.terminal_type.id);
            update.replies.push(build_gds_record(0, OPCODE_NO_OP, &self.query_reply()));
        } else {
            debug!("5250: ignoring structured field class 0x{:02X} type 0x{:02X}", class, sf_type);
        }
        Ok(())
    }

    /// Query reply describing the emulated display station
    fn query_reply(&self) -> Vec<u8> {
        let (device, model) = device_model(self.terminal_type.id);
        let mut reply = vec![0x00, 0x00, AID_QUERY_REPLY, 0x00, QUERY_REPLY_LENGTH];
        reply.extend_from_slice(&[WSF_CLASS_5250, WSF_TYPE_QUERY, 0x80]);
        // Controller hardware class and code level
        reply.extend_from_slice(&[0x06, 0x00, 0x01, 0x01, 0x00]);
        reply.extend(std::iter::repeat(0x00).take(16));
        // Display emulation, device type and model
        reply.push(0x01);
        reply.extend(string_to_ebcdic(&device));
        reply.extend(string_to_ebcdic(&model));
        // Keyboard id, serial number, max input fields
        reply.extend_from_slice(&[0x02, 0x00, 0x00]);
        reply.extend_from_slice(&[0x00, 0x61, 0x50, 0x00]);
        reply.extend_from_slice(&[0xFF, 0xFF]);
        reply.extend_from_slice(&[0x00, 0x00, 0x00]);
        // Controller/display capability
        reply.extend_from_slice(&[0x23, 0x31, 0x00, 0x00]);
        reply.resize(QUERY_REPLY_SIZE, 0x00);
        reply
    }

    /// Cursor, AID and the fields the pending read asks for
    fn field_response(&self, aid: u8, include_fields: bool) -> Vec<u8> {
        let cursor = Position::from_offset(self.cursor.unwrap_or(0), self.columns);
        let mut data = vec![cursor.row as u8, cursor.column as u8, aid];
        if !include_fields {
            return data;
        }

        let read_all = self.read_command == Some(CMD_READ_INPUT_FIELDS);
        for field in self.format_table.iter().filter(|field| field.is_input()) {
            if read_all {
                let end = (field.start + field.length).min(self.size());
                data.extend_from_slice(&self.buffer[field.start..end]);
            } else if field.modified {
                let start = Position::from_offset(field.start, self.columns);
                data.extend_from_slice(&[SBA, start.row as u8, start.column as u8]);
                data.extend_from_slice(field.data(&self.buffer));
            }
        }
        data
    }
}

/// Device type and 3-character model for the query reply, from an id such as
/// "IBM-3477-FC"
fn device_model(id: &str) -> (String, String) {
    let mut parts = id.trim_start_matches("IBM-").splitn(2, '-');
    let device = parts.next().unwrap_or("3179").to_string();
    let model = format!("{:0>3}", parts.next().unwrap_or("2"));
    (device, model)
}

impl TerminalEngine for Tn5250Engine {
    fn protocol_name(&self) -> &'static str {
        "TN5250"
    }

    fn terminal_type(&self) -> TerminalType {
        self.terminal_type
    }

    fn process_record(&mut self, record: &[u8]) -> ProtocolResult<EngineUpdate> {
        if record.len() < GDS_HEADER_LEN {
            return Err(ProtocolError::IncompleteData {
                expected: GDS_HEADER_LEN,
                received: record.len(),
            });
        }
        let record_type = u16::from_be_bytes([record[2], record[3]]);
        if record_type != GDS_RECORD_TYPE {
            return Err(ProtocolError::InvalidRecordType { record_type });
        }
        let data_offset = 6 + record[6] as usize;
        if data_offset > record.len() {
            return Err(ProtocolError::IncompleteData {
                expected: data_offset,
                received: record.len(),
            });
        }
        let opcode = record[9];
        debug!("5250: record opcode 0x{:02X}, {} data bytes", opcode, record.len() - data_offset);

        let cursor_before = self.cursor;
        let mut update = EngineUpdate::default();
        let mut reader = RecordReader::new(&record[data_offset..]);
        while !reader.is_empty() {
            let escape = reader.get_byte()?;
            if escape != ESC {
                return Err(ProtocolError::InvalidCommandCode { code: escape });
            }
            let command = reader.get_byte()?;
            self.process_command(command, &mut reader, &mut update)?;
        }

        update.cursor_moved = self.cursor != cursor_before;
        Ok(update)
    }

    fn screen(&self) -> Screen {
        let mut cells: Vec<char> = self.buffer.iter().map(|&byte| display_char(byte)).collect();
        for field in self.format_table.iter().filter(|field| field.is_hidden()) {
            let end = (field.start + field.length).min(cells.len());
            cells[field.start..end].fill(' ');
        }
        let fields = self
            .format_table
            .iter()
            .map(|field| field.to_screen_field(&self.buffer, self.columns))
            .collect();
        Screen::from_parts(self.rows, self.columns, cells, fields)
    }

    fn cursor(&self) -> Option<Position> {
        self.cursor.map(|offset| Position::from_offset(offset, self.columns))
    }

    fn keyboard_locked(&self) -> bool {
        self.keyboard_locked
    }

    fn supports_key(&self, key: AttentionKey) -> bool {
        key_encoding(key).is_some()
    }

    fn fill_field(&mut self, start: Position, value: &str) -> ProtocolResult<()> {
        let offset = start
            .to_offset(self.rows, self.columns)
            .ok_or(ProtocolError::FieldNotFound { position: start })?;
        let field = self
            .format_table
            .iter_mut()
            .find(|field| field.start == offset && field.is_input())
            .ok_or(ProtocolError::FieldNotFound { position: start })?;

        let length = field.length;
        field.modified = true;
        let mut bytes: Vec<u8> = value.chars().take(length).map(char_to_ebcdic).collect();
        bytes.resize(length, 0x00);
        let end = (offset + length).min(self.buffer.len());
        self.buffer[offset..end].copy_from_slice(&bytes[..end - offset]);
        Ok(())
    }

    fn attention(&mut self, key: AttentionKey) -> ProtocolResult<Vec<u8>> {
        let encoding = key_encoding(key).ok_or(ProtocolError::UnsupportedKey { key: key.name() })?;
        let record = match encoding {
            KeyEncoding::HeaderFlag(flag) => build_gds_record(flag, OPCODE_NO_OP, &[]),
            KeyEncoding::ShortAid(aid) => {
                build_gds_record(0, OPCODE_PUT_GET, &self.field_response(aid, false))
            }
            KeyEncoding::Aid(aid) => build_gds_record(0, OPCODE_PUT_GET, &self.field_response(aid, true)),
        };
        self.read_command = None;
        self.keyboard_locked = true;
        Ok(record)
    }
}
