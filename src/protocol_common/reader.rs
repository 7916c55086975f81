//! Sequential reader over one host record

use crate::error::{ProtocolError, ProtocolResult};

/// Byte cursor used by both data-stream decoders
#[derive(Debug)]
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn get_byte(&mut self) -> ProtocolResult<u8> {
        let byte = self.peek().ok_or(ProtocolError::IncompleteData {
            expected: self.pos + 1,
            received: self.data.len(),
        })?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn get_u16(&mut self) -> ProtocolResult<u16> {
        let high = self.get_byte()?;
        let low = self.get_byte()?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Next `count` bytes
    pub fn take(&mut self, count: usize) -> ProtocolResult<&'a [u8]> {
        if count > self.remaining() {
            return Err(ProtocolError::IncompleteData {
                expected: self.pos + count,
                received: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Bytes up to (not including) the first `stop` byte, or to the end
    pub fn take_until(&mut self, stop: u8) -> &'a [u8] {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let length = rest.iter().position(|&b| b == stop).unwrap_or(rest.len());
        self.pos += length;
        &rest[..length]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let mut reader = RecordReader::new(&[0x01, 0x00, 0x0A, 0xFF]);
        assert_eq!(reader.get_byte().unwrap(), 0x01);
        assert_eq!(reader.get_u16().unwrap(), 0x000A);
        assert_eq!(reader.remaining(), 1);
        assert_eq!(reader.take(1).unwrap(), &[0xFF]);
        assert!(reader.is_empty());
        assert!(matches!(reader.get_byte(), Err(ProtocolError::IncompleteData { .. })));
    }

    #[test]
    fn test_take_until() {
        let mut reader = RecordReader::new(&[0xC1, 0xC2, 0x04, 0x11]);
        assert_eq!(reader.take_until(0x04), &[0xC1, 0xC2]);
        assert_eq!(reader.peek(), Some(0x04));
        assert!(reader.take(5).is_err());
    }
}
