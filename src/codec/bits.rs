//! Bit-level cursor over a fixed-size record.
//!
//! ## Layout
//!
//! Fields are packed most-significant-bit first with no alignment:
//!
//! ```text
//! byte 0          byte 1
//! 7 6 5 4 3 2 1 0 7 6 5 4 3 2 1 0
//! [ field a (5) ][ field b (7)  ][...
//! ```
//!
//! A record codec writes (or reads) its full field list in order; the
//! cursor must land exactly on the end of the buffer, which
//! [`BitBuffer::finish`] and [`BitBuffer::expect_consumed`] check.
//!
//! ## Example
//!
//! ```
//! use cdmx_card::codec::BitBuffer;
//!
//! let mut buf = BitBuffer::new(2);
//! buf.write("unit", 0b10, 2).unwrap();
//! buf.write("count", 12, 6).unwrap();
//! buf.write("tail", 0xAB, 8).unwrap();
//! let bytes = buf.finish().unwrap();
//! assert_eq!(bytes, vec![0b1000_1100, 0xAB]);
//!
//! let mut buf = BitBuffer::from_bytes(&bytes, 2).unwrap();
//! assert_eq!(buf.read(2).unwrap(), 0b10);
//! assert_eq!(buf.read(6).unwrap(), 12);
//! ```

use crate::error::ParseError;

/// Fixed-size bit buffer with a single read/write cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBuffer {
    bytes: Vec<u8>,
    position: usize,
}

impl BitBuffer {
    /// Allocate a zeroed buffer of `len_bytes * 8` bits.
    pub fn new(len_bytes: usize) -> Self {
        Self {
            bytes: vec![0; len_bytes],
            position: 0,
        }
    }

    /// Wrap bytes read from the card for decoding.
    ///
    /// # Errors
    ///
    /// [`ParseError::Length`] if `bytes` is not exactly `expected_len` long.
    pub fn from_bytes(bytes: &[u8], expected_len: usize) -> Result<Self, ParseError> {
        if bytes.len() != expected_len {
            return Err(ParseError::Length {
                expected: expected_len,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: bytes.to_vec(),
            position: 0,
        })
    }

    /// Total length in bits.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Current cursor position in bits.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.position
    }

    fn reserve(&self, width: u32) -> Result<(), ParseError> {
        if width == 0 || width > 64 {
            return Err(ParseError::Width(width));
        }
        if self.position + width as usize > self.capacity() {
            return Err(ParseError::Overrun {
                position: self.position,
                requested: width,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    /// Write `value` into the next `width` bits.
    ///
    /// # Errors
    ///
    /// - [`ParseError::FieldOverflow`] if `value` needs more than `width` bits
    /// - [`ParseError::Overrun`] if the field runs past the buffer end
    pub fn write(&mut self, field: &'static str, value: u64, width: u32) -> Result<(), ParseError> {
        self.reserve(width)?;
        if width < 64 && value >> width != 0 {
            return Err(ParseError::FieldOverflow { field, value, width });
        }

        for shift in (0..width).rev() {
            let byte = self.position / 8;
            let mask = 0x80u8 >> (self.position % 8);
            if (value >> shift) & 1 == 1 {
                self.bytes[byte] |= mask;
            } else {
                self.bytes[byte] &= !mask;
            }
            self.position += 1;
        }
        Ok(())
    }

    /// Write a signed value as `width`-bit two's complement.
    pub fn write_signed(
        &mut self,
        field: &'static str,
        value: i64,
        width: u32,
    ) -> Result<(), ParseError> {
        self.reserve(width)?;
        if width < 64 {
            let min = -(1i64 << (width - 1));
            let max = (1i64 << (width - 1)) - 1;
            if value < min || value > max {
                return Err(ParseError::FieldOverflow {
                    field,
                    value: value as u64,
                    width,
                });
            }
        }
        let raw = if width == 64 {
            value as u64
        } else {
            (value as u64) & ((1u64 << width) - 1)
        };
        self.write(field, raw, width)
    }

    /// Read the next `width` bits as an unsigned value.
    pub fn read(&mut self, width: u32) -> Result<u64, ParseError> {
        self.reserve(width)?;

        let mut value = 0u64;
        for _ in 0..width {
            let byte = self.bytes[self.position / 8];
            let bit = (byte >> (7 - self.position % 8)) & 1;
            value = (value << 1) | u64::from(bit);
            self.position += 1;
        }
        Ok(value)
    }

    /// Read the next `width` bits as two's complement.
    pub fn read_signed(&mut self, width: u32) -> Result<i64, ParseError> {
        let raw = self.read(width)?;
        if width == 64 {
            return Ok(raw as i64);
        }
        let sign = 1u64 << (width - 1);
        if raw & sign != 0 {
            Ok(raw as i64 - (1i64 << width))
        } else {
            Ok(raw as i64)
        }
    }

    /// Check that a decoder consumed the whole buffer.
    pub fn expect_consumed(&self) -> Result<(), ParseError> {
        if self.position != self.capacity() {
            return Err(ParseError::Underrun {
                consumed: self.position,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    /// Check the encoder filled the whole buffer and return its bytes.
    pub fn finish(self) -> Result<Vec<u8>, ParseError> {
        self.expect_consumed()?;
        Ok(self.bytes)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_unaligned() {
        let mut buf = BitBuffer::new(4);
        buf.write("a", 0b101, 3).unwrap();
        buf.write("b", 0x3FFF, 14).unwrap();
        buf.write("c", 0, 1).unwrap();
        buf.write("d", 0x5A5A, 14).unwrap_err();
        buf.write("d", 0x1A5A, 14).unwrap();
        assert_eq!(buf.position(), 32);

        let bytes = buf.finish().unwrap();
        let mut buf = BitBuffer::from_bytes(&bytes, 4).unwrap();
        assert_eq!(buf.read(3).unwrap(), 0b101);
        assert_eq!(buf.read(14).unwrap(), 0x3FFF);
        assert_eq!(buf.read(1).unwrap(), 0);
        assert_eq!(buf.read(14).unwrap(), 0x1A5A);
        buf.expect_consumed().unwrap();
    }

    #[test]
    fn test_msb_first() {
        let mut buf = BitBuffer::new(1);
        buf.write("flag", 1, 1).unwrap();
        buf.write("rest", 0, 7).unwrap();
        assert_eq!(buf.finish().unwrap(), vec![0x80]);
    }

    #[test]
    fn test_wide_field() {
        let mut buf = BitBuffer::new(5);
        buf.write("location", 0xFF_0000_00AA, 40).unwrap();
        let bytes = buf.finish().unwrap();
        assert_eq!(bytes, vec![0xFF, 0x00, 0x00, 0x00, 0xAA]);

        let mut buf = BitBuffer::from_bytes(&bytes, 5).unwrap();
        assert_eq!(buf.read(40).unwrap(), 0xFF_0000_00AA);
    }

    #[test]
    fn test_overflow_is_rejected() {
        let mut buf = BitBuffer::new(1);
        let err = buf.write("status", 0x100, 8).unwrap_err();
        assert_eq!(
            err,
            ParseError::FieldOverflow {
                field: "status",
                value: 0x100,
                width: 8
            }
        );
        // Cursor untouched after the rejected write
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn test_overrun() {
        let mut buf = BitBuffer::new(1);
        buf.write("a", 0, 6).unwrap();
        assert!(matches!(
            buf.write("b", 0, 3),
            Err(ParseError::Overrun { position: 6, requested: 3, capacity: 8 })
        ));
        assert!(matches!(buf.read(9), Err(ParseError::Overrun { .. })));
    }

    #[test]
    fn test_underrun() {
        let mut buf = BitBuffer::new(2);
        buf.write("a", 1, 8).unwrap();
        assert_eq!(
            buf.finish(),
            Err(ParseError::Underrun {
                consumed: 8,
                capacity: 16
            })
        );
    }

    #[test]
    fn test_length_mismatch() {
        assert_eq!(
            BitBuffer::from_bytes(&[0; 28], 29),
            Err(ParseError::Length {
                expected: 29,
                actual: 28
            })
        );
    }

    #[test]
    fn test_invalid_width() {
        let mut buf = BitBuffer::new(16);
        assert_eq!(buf.read(0), Err(ParseError::Width(0)));
        assert_eq!(buf.write("x", 0, 65), Err(ParseError::Width(65)));
    }

    #[test]
    fn test_signed_roundtrip() {
        let mut buf = BitBuffer::new(6);
        buf.write_signed("amount", -1, 24).unwrap();
        buf.write_signed("balance", -8_388_608, 24).unwrap();
        let bytes = buf.finish().unwrap();
        assert_eq!(&bytes[..3], &[0xFF, 0xFF, 0xFF]);

        let mut buf = BitBuffer::from_bytes(&bytes, 6).unwrap();
        assert_eq!(buf.read_signed(24).unwrap(), -1);
        assert_eq!(buf.read_signed(24).unwrap(), -8_388_608);
    }

    #[test]
    fn test_signed_out_of_range() {
        let mut buf = BitBuffer::new(2);
        assert!(buf.write_signed("amount", 32_768, 16).is_err());
        assert!(buf.write_signed("amount", -32_769, 16).is_err());
        buf.write_signed("amount", 32_767, 16).unwrap();
    }
}
