//! Cursor over an encoded trace buffer.

use uguid::Guid;
use widestring::U16String;

use crate::{
    format::io::{read_le_at, TraceIO},
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked reader over trace bytes.
///
/// ```rust,no_run
/// use capscope::format::Parser;
///
/// let data = [0x01, 0x00, 0x00, 0x00, 0xff];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_le::<u32>()?, 1);
/// assert_eq!(parser.remaining(), 1);
/// # Ok::<(), capscope::Error>(())
/// ```
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Length of the underlying buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Ensures that at least `needed` bytes remain.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer bytes remain.
    pub fn ensure_remaining(&self, needed: usize) -> Result<()> {
        if needed > self.remaining() {
            return Err(OutOfBounds);
        }
        Ok(())
    }

    /// Skips `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if that would pass the end.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        self.ensure_remaining(step)?;
        self.position += step;
        Ok(())
    }

    /// Reads a little-endian `T`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would pass the end.
    pub fn read_le<T: TraceIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Reads `len` raw bytes without copying.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would pass the end.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure_remaining(len)?;
        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Reads a 16-byte interface identifier.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would pass the end.
    pub fn read_guid(&mut self) -> Result<Guid> {
        let bytes: [u8; 16] = self.read_bytes(16)?.try_into().map_err(|_| OutOfBounds)?;
        Ok(Guid::from_bytes(bytes))
    }

    /// Reads a `u32` length followed by that many bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the data is truncated.
    pub fn read_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_le::<u32>()? as usize;
        self.read_bytes(len)
    }

    /// Reads a `u32` length followed by UTF-8 bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the data is truncated, or
    /// [`crate::Error::Malformed`] if the bytes are not valid UTF-8.
    pub fn read_prefixed_string_utf8(&mut self) -> Result<String> {
        let bytes = self.read_prefixed_bytes()?;
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(_) => Err(malformed_error!(
                "Invalid UTF-8 string at offset {}",
                self.position - bytes.len()
            )),
        }
    }

    /// Reads a `u32` unit count followed by UTF-16 units.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the data is truncated.
    pub fn read_prefixed_string_utf16(&mut self) -> Result<U16String> {
        let units = self.read_le::<u32>()? as usize;
        let byte_len = units.checked_mul(2).ok_or(OutOfBounds)?;
        let bytes = self.read_bytes(byte_len)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(U16String::from_vec(units))
    }

    /// Splits off a parser over the next `len` bytes and skips them here.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn sub_parser(&mut self, len: usize) -> Result<Parser<'a>> {
        Ok(Parser::new(self.read_bytes(len)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::io::write_le;

    #[test]
    fn test_read_sequence() {
        let mut data = Vec::new();
        write_le(&mut data, 7_u32);
        write_le(&mut data, 3_u32);
        data.extend_from_slice(b"abc");

        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_le::<u32>().unwrap(), 7);
        assert_eq!(parser.read_prefixed_string_utf8().unwrap(), "abc");
        assert!(!parser.has_more_data());
    }

    #[test]
    fn test_truncated_string() {
        let mut data = Vec::new();
        write_le(&mut data, 10_u32);
        data.extend_from_slice(b"abc");

        let mut parser = Parser::new(&data);
        assert!(matches!(
            parser.read_prefixed_string_utf8(),
            Err(crate::Error::OutOfBounds)
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut data = Vec::new();
        write_le(&mut data, 2_u32);
        data.extend_from_slice(&[0xff, 0xfe]);

        let mut parser = Parser::new(&data);
        assert!(matches!(
            parser.read_prefixed_string_utf8(),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_wide_string() {
        let mut data = Vec::new();
        write_le(&mut data, 2_u32);
        write_le(&mut data, u16::from(b'h'));
        write_le(&mut data, u16::from(b'i'));

        let mut parser = Parser::new(&data);
        assert_eq!(
            parser.read_prefixed_string_utf16().unwrap().to_string_lossy(),
            "hi"
        );
    }

    #[test]
    fn test_sub_parser_bounds() {
        let data = [1, 2, 3, 4, 5];
        let mut parser = Parser::new(&data);
        let mut sub = parser.sub_parser(2).unwrap();
        assert_eq!(sub.read_le::<u16>().unwrap(), 0x0201);
        assert!(sub.read_le::<u8>().is_err());
        assert_eq!(parser.pos(), 2);
        assert!(parser.sub_parser(4).is_err());
    }
}
