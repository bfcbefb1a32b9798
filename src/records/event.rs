//! Event record: one entry of the rolling validation log.
//!
//! ## Layout (232 bits)
//!
//! | Field | Bits | Encoding |
//! |-------|------|----------|
//! | version | 8 | |
//! | transaction number | 24 | |
//! | transaction type | 8 | [`TransactionType`] |
//! | network | 8 | |
//! | provider | 8 | |
//! | location | 16 | |
//! | timestamp | 32 | [`DateTimeReal`] |
//! | amount | 24 | signed |
//! | first leg provider | 8 | |
//! | first leg location | 16 | |
//! | first leg timestamp | 32 | [`DateTimeReal`] |
//! | first leg passenger | 8 | |
//! | first leg contracts used | 8 | bitmap |
//! | free data | 32 | SAM MAC for signed types |

use crate::codec::{BitBuffer, DateTimeReal, Enumerated};
use crate::error::ParseError;
use crate::records::{FileId, Record, TransactionType, RECORD_SIZE};

/// Largest transaction number the 24-bit field holds.
pub const MAX_TRANSACTION_NUMBER: u32 = 0xFF_FFFF;

/// Boarding data for the first leg of an interchange journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirstLeg {
    pub provider: u8,
    pub location: u16,
    pub timestamp: DateTimeReal,
    pub passenger: u8,
    /// Bit `n - 1` set when contract slot `n` was charged
    pub contracts_used: u8,
}

impl FirstLeg {
    pub fn is_empty(&self) -> bool {
        *self == FirstLeg::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    /// Position in the event file (1 = newest)
    pub slot: u8,
    pub version: u8,
    pub transaction_number: u32,
    pub transaction_type: Enumerated<TransactionType>,
    pub network: u8,
    pub provider: u8,
    pub location: u16,
    pub timestamp: DateTimeReal,
    /// Signed amount in centavos
    pub amount: i32,
    pub first_leg: FirstLeg,
    pub free_data: u32,
}

impl Event {
    pub fn new(slot: u8) -> Self {
        Self {
            slot,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> TransactionType {
        self.transaction_type.decode()
    }
}

impl Record for Event {
    const FILE: FileId = FileId::Event;

    fn slot(&self) -> u8 {
        self.slot
    }

    fn pack(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = BitBuffer::new(RECORD_SIZE);
        buf.write("version", u64::from(self.version), 8)?;
        buf.write("transaction_number", u64::from(self.transaction_number), 24)?;
        buf.write("transaction_type", u64::from(self.transaction_type.raw()), 8)?;
        buf.write("network", u64::from(self.network), 8)?;
        buf.write("provider", u64::from(self.provider), 8)?;
        buf.write("location", u64::from(self.location), 16)?;
        buf.write("timestamp", u64::from(self.timestamp.wire()), 32)?;
        buf.write_signed("amount", i64::from(self.amount), 24)?;

        let leg = &self.first_leg;
        buf.write("first_leg.provider", u64::from(leg.provider), 8)?;
        buf.write("first_leg.location", u64::from(leg.location), 16)?;
        buf.write("first_leg.timestamp", u64::from(leg.timestamp.wire()), 32)?;
        buf.write("first_leg.passenger", u64::from(leg.passenger), 8)?;
        buf.write("first_leg.contracts_used", u64::from(leg.contracts_used), 8)?;

        buf.write("free_data", u64::from(self.free_data), 32)?;
        buf.finish()
    }

    fn unpack(slot: u8, bytes: &[u8]) -> Result<Self, ParseError> {
        let mut buf = BitBuffer::from_bytes(bytes, RECORD_SIZE)?;
        let event = Event {
            slot,
            version: buf.read(8)? as u8,
            transaction_number: buf.read(24)? as u32,
            transaction_type: Enumerated::from_raw(buf.read(8)? as u32),
            network: buf.read(8)? as u8,
            provider: buf.read(8)? as u8,
            location: buf.read(16)? as u16,
            timestamp: DateTimeReal::from_wire(buf.read(32)? as u32),
            amount: buf.read_signed(24)? as i32,
            first_leg: FirstLeg {
                provider: buf.read(8)? as u8,
                location: buf.read(16)? as u16,
                timestamp: DateTimeReal::from_wire(buf.read(32)? as u32),
                passenger: buf.read(8)? as u8,
                contracts_used: buf.read(8)? as u8,
            },
            free_data: buf.read(32)? as u32,
        };
        buf.expect_consumed()?;
        Ok(event)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Event {
        let mut e = Event::new(1);
        e.version = 1;
        e.transaction_number = 0x01_0203;
        e.transaction_type.set(TransactionType::Debit);
        e.network = 1;
        e.provider = 4;
        e.location = 0x0BAD;
        e.timestamp = DateTimeReal::from_wire(900_000_000);
        e.amount = -500;
        e.first_leg = FirstLeg {
            provider: 4,
            location: 0x0100,
            timestamp: DateTimeReal::from_wire(899_999_000),
            passenger: 1,
            contracts_used: 0b0000_0001,
        };
        e.free_data = 0xCAFE_F00D;
        e
    }

    #[test]
    fn test_event_roundtrip() {
        let e = sample();
        let bytes = e.pack().unwrap();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(Event::unpack(1, &bytes).unwrap(), e);
        assert_eq!(&bytes[1..4], &[0x01, 0x02, 0x03]);
        assert_eq!(&bytes[25..], &[0xCA, 0xFE, 0xF0, 0x0D]);
    }

    #[test]
    fn test_event_bytes_roundtrip() {
        let bytes: Vec<u8> = (0..RECORD_SIZE as u8).map(|b| b.wrapping_mul(53).wrapping_add(11)).collect();
        let e = Event::unpack(3, &bytes).unwrap();
        assert_eq!(e.pack().unwrap(), bytes);
    }

    #[test]
    fn test_negative_amount_encoding() {
        let mut e = sample();
        e.amount = -1;
        let bytes = e.pack().unwrap();
        // amount starts at bit 104 (byte 13)
        assert_eq!(&bytes[13..16], &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_amount_range() {
        let mut e = sample();
        e.amount = 8_388_608;
        assert!(e.pack().is_err());
        e.amount = 8_388_607;
        assert!(e.pack().is_ok());
    }

    #[test]
    fn test_transaction_number_overflow() {
        let mut e = sample();
        e.transaction_number = MAX_TRANSACTION_NUMBER + 1;
        assert!(matches!(
            e.pack(),
            Err(ParseError::FieldOverflow { field: "transaction_number", .. })
        ));
    }

    #[test]
    fn test_first_leg_empty() {
        assert!(FirstLeg::default().is_empty());
        assert!(!sample().first_leg.is_empty());
    }
}
