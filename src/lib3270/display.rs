/// 3270 Display Buffer
///
/// The presentation space of a 3270 terminal. Fields are not stored
/// separately: each field starts right after an attribute cell and runs to the
/// next attribute cell, wrapping around the end of the buffer.
use super::codes::*;

/// One field as laid out by the attribute cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpan {
    /// Address of the attribute cell
    pub attribute_address: usize,
    /// Address of the first data cell
    pub start: usize,
    pub length: usize,
    pub attribute: u8,
}

impl FieldSpan {
    pub fn is_protected(&self) -> bool {
        self.attribute & ATTR_PROTECTED != 0
    }

    pub fn is_numeric(&self) -> bool {
        self.attribute & ATTR_NUMERIC != 0
    }

    pub fn is_hidden(&self) -> bool {
        self.attribute & ATTR_DISPLAY == DISPLAY_HIDDEN
    }

    pub fn is_modified(&self) -> bool {
        self.attribute & ATTR_MDT != 0
    }

    /// Buffer addresses covered by the field, in order
    pub fn addresses(&self, size: usize) -> impl Iterator<Item = usize> {
        let start = self.start;
        (0..self.length).map(move |offset| (start + offset) % size)
    }
}

/// 3270 presentation space
#[derive(Debug, Clone)]
pub struct Display3270 {
    rows: usize,
    columns: usize,
    /// EBCDIC data, 0x00 for nulls and attribute cells
    buffer: Vec<u8>,
    /// Field attribute for cells holding one
    attributes: Vec<Option<u8>>,
    /// Current buffer address for orders and data
    address: usize,
}

impl Display3270 {
    pub fn new(rows: usize, columns: usize) -> Self {
        let size = rows * columns;
        Self {
            rows,
            columns,
            buffer: vec![0x00; size],
            attributes: vec![None; size],
            address: 0,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Erase everything, possibly switching size
    pub fn clear(&mut self, rows: usize, columns: usize) {
        *self = Self::new(rows, columns);
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn set_address(&mut self, address: usize) {
        self.address = address % self.size().max(1);
    }

    fn advance(&mut self) {
        self.address = (self.address + 1) % self.size().max(1);
    }

    /// Write a data byte at the current address and advance
    pub fn write_char(&mut self, byte: u8) {
        if self.buffer.is_empty() {
            return;
        }
        self.buffer[self.address] = byte;
        self.attributes[self.address] = None;
        self.advance();
    }

    /// Place an attribute cell at the current address and advance
    pub fn start_field(&mut self, attribute: u8) {
        if self.buffer.is_empty() {
            return;
        }
        self.buffer[self.address] = 0x00;
        self.attributes[self.address] = Some(attribute);
        self.advance();
    }

    pub fn attribute_at(&self, address: usize) -> Option<u8> {
        self.attributes.get(address).copied().flatten()
    }

    pub fn set_attribute_at(&mut self, address: usize, attribute: u8) {
        if let Some(cell) = self.attributes.get_mut(address) {
            *cell = Some(attribute);
        }
    }

    pub fn is_formatted(&self) -> bool {
        self.attributes.iter().any(Option::is_some)
    }

    /// Address of the attribute cell governing `address`
    pub fn field_attribute_address(&self, address: usize) -> Option<usize> {
        let size = self.size();
        (0..size)
            .map(|back| (address + size - back) % size)
            .find(|&candidate| self.attributes[candidate].is_some())
    }

    /// True when `address` holds data of an unprotected field
    pub fn is_unprotected_data(&self, address: usize) -> bool {
        if self.attributes.get(address).copied().flatten().is_some() {
            return false;
        }
        match self.field_attribute_address(address) {
            Some(attribute_address) => self.attributes[attribute_address]
                .map(|attribute| attribute & ATTR_PROTECTED == 0)
                .unwrap_or(false),
            None => true,
        }
    }

    /// All fields ordered by attribute address
    pub fn fields(&self) -> Vec<FieldSpan> {
        let size = self.size();
        let attribute_addresses: Vec<usize> = (0..size).filter(|&a| self.attributes[a].is_some()).collect();
        let mut fields = Vec::with_capacity(attribute_addresses.len());
        for (index, &attribute_address) in attribute_addresses.iter().enumerate() {
            let next = attribute_addresses[(index + 1) % attribute_addresses.len()];
            let length = if next > attribute_address {
                next - attribute_address - 1
            } else {
                next + size - attribute_address - 1
            };
            fields.push(FieldSpan {
                attribute_address,
                start: (attribute_address + 1) % size,
                length,
                attribute: self.attributes[attribute_address].unwrap_or(0),
            });
        }
        fields
    }

    /// Start of the first unprotected field after `address`, wrapping
    pub fn next_unprotected_field(&self, address: usize) -> Option<usize> {
        let size = self.size();
        (1..=size)
            .map(|step| (address + step) % size)
            .find(|&candidate| {
                self.attributes[candidate]
                    .map(|attribute| attribute & ATTR_PROTECTED == 0)
                    .unwrap_or(false)
            })
            .map(|attribute_address| (attribute_address + 1) % size)
    }

    /// Fill from the current address up to, not including, `end`
    pub fn repeat_to(&mut self, end: usize, byte: u8) {
        let size = self.size();
        if size == 0 {
            return;
        }
        loop {
            self.write_char(byte);
            if self.address == end % size {
                break;
            }
        }
    }

    /// Null unprotected data from the current address up to `end`
    pub fn erase_unprotected_to(&mut self, end: usize) {
        let size = self.size();
        if size == 0 {
            return;
        }
        loop {
            if self.is_unprotected_data(self.address) {
                self.buffer[self.address] = 0x00;
            }
            self.advance();
            if self.address == end % size {
                break;
            }
        }
    }

    /// Erase All Unprotected: null every unprotected field and reset its MDT
    pub fn erase_all_unprotected(&mut self) {
        let size = self.size();
        for field in self.fields().into_iter().filter(|field| !field.is_protected()) {
            for address in field.addresses(size) {
                self.buffer[address] = 0x00;
            }
            self.attributes[field.attribute_address] = Some(field.attribute & !ATTR_MDT);
        }
        if !self.is_formatted() {
            self.buffer.fill(0x00);
        }
    }

    pub fn reset_mdt(&mut self) {
        for attribute in self.attributes.iter_mut().flatten() {
            *attribute &= !ATTR_MDT;
        }
    }

    /// Field data with nulls removed
    pub fn field_data(&self, field: &FieldSpan) -> Vec<u8> {
        field
            .addresses(self.size())
            .map(|address| self.buffer[address])
            .filter(|&byte| byte != 0x00)
            .collect()
    }

    /// Replace a field's data, padding with nulls, and set its MDT
    pub fn write_field(&mut self, field: &FieldSpan, data: &[u8]) {
        let size = self.size();
        for (index, address) in field.addresses(size).enumerate() {
            self.buffer[address] = data.get(index).copied().unwrap_or(0x00);
        }
        self.attributes[field.attribute_address] = Some(field.attribute | ATTR_MDT);
    }
}

/// 3270 buffer address encoding
pub mod addressing {
    /// Graphic codes for the 64 six-bit values of a 12-bit address
    const CODE_TABLE: [u8; 64] = [
        0x40, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, //
        0x50, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0x5A, 0x5B, 0x5C, 0x5D, 0x5E, 0x5F, //
        0x60, 0x61, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F, //
        0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0x7A, 0x7B, 0x7C, 0x7D, 0x7E, 0x7F,
    ];

    /// Decode a two-byte buffer address; the top bits of the first byte tell
    /// 14-bit binary addresses (00) from 12-bit coded ones
    pub fn decode_address(byte1: u8, byte2: u8) -> usize {
        if byte1 & 0xC0 == 0 {
            ((byte1 as usize & 0x3F) << 8) | byte2 as usize
        } else {
            ((byte1 as usize & 0x3F) << 6) | (byte2 as usize & 0x3F)
        }
    }

    pub fn encode_12bit_address(address: usize) -> [u8; 2] {
        [CODE_TABLE[(address >> 6) & 0x3F], CODE_TABLE[address & 0x3F]]
    }

    pub fn encode_14bit_address(address: usize) -> [u8; 2] {
        [((address >> 8) & 0x3F) as u8, (address & 0xFF) as u8]
    }

    /// Encoding for a buffer of `size` cells
    pub fn encode_address(address: usize, size: usize) -> [u8; 2] {
        if size > 4096 {
            encode_14bit_address(address)
        } else {
            encode_12bit_address(address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::addressing::*;
    use super::*;
    use proptest::prelude::*;

    fn sign_on() -> Display3270 {
        let mut display = Display3270::new(24, 80);
        display.set_address(80);
        display.start_field(ATTR_PROTECTED);
        for byte in [0xE4, 0xA2, 0x85, 0x99] {
            display.write_char(byte);
        }
        display.start_field(0x00);
        display.set_address(120);
        display.start_field(ATTR_PROTECTED);
        display
    }

    #[test]
    fn test_fields_from_attributes() {
        let display = sign_on();
        let fields = display.fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].start, 81);
        assert_eq!(fields[0].length, 4);
        assert_eq!(fields[1].start, 86);
        assert_eq!(fields[1].length, 34);
        assert!(!fields[1].is_protected());
        // the last field wraps to the first attribute
        assert_eq!(fields[2].length, 24 * 80 - 121 + 80);
    }

    #[test]
    fn test_next_unprotected_field() {
        let display = sign_on();
        assert_eq!(display.next_unprotected_field(0), Some(86));
        assert_eq!(display.next_unprotected_field(100), Some(86));
    }

    #[test]
    fn test_write_field_sets_mdt() {
        let mut display = sign_on();
        let field = display.fields()[1];
        display.write_field(&field, &[0xC1, 0xC2]);
        let field = display.fields()[1];
        assert!(field.is_modified());
        assert_eq!(display.field_data(&field), vec![0xC1, 0xC2]);

        display.reset_mdt();
        assert!(!display.fields()[1].is_modified());
    }

    #[test]
    fn test_erase_all_unprotected() {
        let mut display = sign_on();
        let field = display.fields()[1];
        display.write_field(&field, &[0xC1]);
        display.erase_all_unprotected();
        let field = display.fields()[1];
        assert!(display.field_data(&field).is_empty());
        assert!(!field.is_modified());
        assert_eq!(display.field_data(&display.fields()[0]).len(), 4);
    }

    #[test]
    fn test_repeat_to() {
        let mut display = Display3270::new(24, 80);
        display.set_address(10);
        display.repeat_to(20, 0x60);
        assert_eq!(display.buffer()[10..20], [0x60; 10]);
        assert_eq!(display.buffer()[20], 0x00);
        assert_eq!(display.address(), 20);
    }

    #[test]
    fn test_addressing_12bit() {
        assert_eq!(encode_12bit_address(0), [0x40, 0x40]);
        assert_eq!(encode_12bit_address(80), [0xC1, 0x50]);
        assert_eq!(decode_address(0xC1, 0x50), 80);
        assert_eq!(decode_address(0x5D, 0x7F), 1919);
    }

    #[test]
    fn test_addressing_14bit() {
        assert_eq!(encode_14bit_address(5000), [0x13, 0x88]);
        assert_eq!(decode_address(0x13, 0x88), 5000);
        assert_eq!(encode_address(5000, 27 * 132 * 2), [0x13, 0x88]);
    }

    proptest! {
        #[test]
        fn prop_12bit_address_roundtrip(address in 0usize..4096) {
            let [b1, b2] = encode_12bit_address(address);
            prop_assert_eq!(decode_address(b1, b2), address);
        }
    }
}
