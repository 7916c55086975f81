/// Field format table entries for 5250

use crate::lib5250::codes::*;
use crate::position::Position;
use crate::protocol_common::ebcdic::ebcdic_to_display_string;
use crate::screen::Field;

/// One entry of the format table, as defined by a Start of Field order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatField {
    /// Buffer offset of the first data cell
    pub start: usize,
    pub length: usize,
    /// Field format word; `None` for output-only fields
    pub ffw: Option<u16>,
    /// Display attribute written in the cell before the field
    pub attribute: u8,
    pub modified: bool,
}

impl FormatField {
    pub fn new(start: usize, length: usize, ffw: Option<u16>, attribute: u8) -> Self {
        let modified = ffw.map(|word| (word >> 8) as u8 & FFW_MDT != 0).unwrap_or(false);
        Self { start, length, ffw, attribute, modified }
    }

    fn ffw_high(&self) -> u8 {
        self.ffw.map(|word| (word >> 8) as u8).unwrap_or(0)
    }

    /// Input fields carry an FFW without the bypass bit
    pub fn is_input(&self) -> bool {
        self.ffw.is_some() && self.ffw_high() & FFW_BYPASS == 0
    }

    pub fn is_bypass(&self) -> bool {
        !self.is_input()
    }

    pub fn is_hidden(&self) -> bool {
        self.attribute & ATTR_NONDISPLAY_MASK == ATTR_NONDISPLAY_MASK
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.ffw_high() & FFW_SHIFT_MASK,
            FFW_NUMERIC_ONLY | FFW_DIGITS_ONLY | FFW_SIGNED_NUMERIC
        )
    }

    pub fn covers(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.start + self.length
    }

    /// Field data with trailing nulls removed
    pub fn data<'a>(&self, buffer: &'a [u8]) -> &'a [u8] {
        let end = (self.start + self.length).min(buffer.len());
        let start = self.start.min(end);
        let data = &buffer[start..end];
        let used = data.iter().rposition(|&b| b != 0x00).map(|i| i + 1).unwrap_or(0);
        &data[..used]
    }

    /// Public view of this field for screen snapshots
    pub fn to_screen_field(&self, buffer: &[u8], columns: usize) -> Field {
        Field {
            start: Position::from_offset(self.start, columns),
            length: self.length,
            protected: self.is_bypass(),
            hidden: self.is_hidden(),
            numeric: self.is_numeric(),
            modified: self.modified,
            content: ebcdic_to_display_string(self.data(buffer)).trim_end().to_string(),
        }
    }
}
