//! Stored-value logs: snapshots of the last debit and the last reload.
//!
//! Each log is a single record overwritten by the card on every SV
//! operation of its kind. They are not a history.
//!
//! ## DebitLog layout (232 bits)
//!
//! | Field | Bits |
//! |-------|------|
//! | amount (signed) | 16 |
//! | date | 16 |
//! | time | 16 |
//! | KVC | 8 |
//! | SAM id | 32 |
//! | SAM transaction number | 24 |
//! | balance (signed) | 24 |
//! | SV transaction number | 16 |
//! | padding | 80 |
//!
//! ## LoadLog layout (232 bits)
//!
//! | Field | Bits |
//! |-------|------|
//! | amount (signed) | 24 |
//! | date | 16 |
//! | time | 16 |
//! | free data | 16 |
//! | KVC | 8 |
//! | SAM id | 32 |
//! | SAM transaction number | 24 |
//! | balance (signed) | 24 |
//! | SV transaction number | 16 |
//! | padding | 56 |

use crate::codec::{BitBuffer, CompactDate, CompactTime};
use crate::error::ParseError;
use crate::records::{FileId, Record, RECORD_SIZE};

const DEBIT_PADDING: usize = 10;
const LOAD_PADDING: usize = 7;

fn write_padding(buf: &mut BitBuffer, padding: &[u8]) -> Result<(), ParseError> {
    for byte in padding {
        buf.write("padding", u64::from(*byte), 8)?;
    }
    Ok(())
}

fn read_padding<const N: usize>(buf: &mut BitBuffer) -> Result<[u8; N], ParseError> {
    let mut padding = [0u8; N];
    for byte in padding.iter_mut() {
        *byte = buf.read(8)? as u8;
    }
    Ok(padding)
}

// ============================================================================
// DebitLog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebitLog {
    pub amount: i16,
    pub date: CompactDate,
    pub time: CompactTime,
    pub kvc: u8,
    pub sam_id: u32,
    pub sam_transaction_number: u32,
    pub balance: i32,
    pub sv_transaction_number: u16,
    pub padding: [u8; DEBIT_PADDING],
}

impl Record for DebitLog {
    const FILE: FileId = FileId::DebitLog;

    fn slot(&self) -> u8 {
        1
    }

    fn pack(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = BitBuffer::new(RECORD_SIZE);
        buf.write_signed("amount", i64::from(self.amount), 16)?;
        buf.write("date", u64::from(self.date.wire()), 16)?;
        buf.write("time", u64::from(self.time.wire()), 16)?;
        buf.write("kvc", u64::from(self.kvc), 8)?;
        buf.write("sam_id", u64::from(self.sam_id), 32)?;
        buf.write("sam_transaction_number", u64::from(self.sam_transaction_number), 24)?;
        buf.write_signed("balance", i64::from(self.balance), 24)?;
        buf.write("sv_transaction_number", u64::from(self.sv_transaction_number), 16)?;
        write_padding(&mut buf, &self.padding)?;
        buf.finish()
    }

    fn unpack(_slot: u8, bytes: &[u8]) -> Result<Self, ParseError> {
        let mut buf = BitBuffer::from_bytes(bytes, RECORD_SIZE)?;
        let log = DebitLog {
            amount: buf.read_signed(16)? as i16,
            date: CompactDate::from_wire(buf.read(16)? as u16),
            time: CompactTime::from_wire(buf.read(16)? as u16),
            kvc: buf.read(8)? as u8,
            sam_id: buf.read(32)? as u32,
            sam_transaction_number: buf.read(24)? as u32,
            balance: buf.read_signed(24)? as i32,
            sv_transaction_number: buf.read(16)? as u16,
            padding: read_padding(&mut buf)?,
        };
        buf.expect_consumed()?;
        Ok(log)
    }
}

// ============================================================================
// LoadLog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadLog {
    pub amount: i32,
    pub date: CompactDate,
    pub time: CompactTime,
    pub free_data: u16,
    pub kvc: u8,
    pub sam_id: u32,
    pub sam_transaction_number: u32,
    pub balance: i32,
    pub sv_transaction_number: u16,
    pub padding: [u8; LOAD_PADDING],
}

impl Record for LoadLog {
    const FILE: FileId = FileId::LoadLog;

    fn slot(&self) -> u8 {
        1
    }

    fn pack(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = BitBuffer::new(RECORD_SIZE);
        buf.write_signed("amount", i64::from(self.amount), 24)?;
        buf.write("date", u64::from(self.date.wire()), 16)?;
        buf.write("time", u64::from(self.time.wire()), 16)?;
        buf.write("free_data", u64::from(self.free_data), 16)?;
        buf.write("kvc", u64::from(self.kvc), 8)?;
        buf.write("sam_id", u64::from(self.sam_id), 32)?;
        buf.write("sam_transaction_number", u64::from(self.sam_transaction_number), 24)?;
        buf.write_signed("balance", i64::from(self.balance), 24)?;
        buf.write("sv_transaction_number", u64::from(self.sv_transaction_number), 16)?;
        write_padding(&mut buf, &self.padding)?;
        buf.finish()
    }

    fn unpack(_slot: u8, bytes: &[u8]) -> Result<Self, ParseError> {
        let mut buf = BitBuffer::from_bytes(bytes, RECORD_SIZE)?;
        let log = LoadLog {
            amount: buf.read_signed(24)? as i32,
            date: CompactDate::from_wire(buf.read(16)? as u16),
            time: CompactTime::from_wire(buf.read(16)? as u16),
            free_data: buf.read(16)? as u16,
            kvc: buf.read(8)? as u8,
            sam_id: buf.read(32)? as u32,
            sam_transaction_number: buf.read(24)? as u32,
            balance: buf.read_signed(24)? as i32,
            sv_transaction_number: buf.read(16)? as u16,
            padding: read_padding(&mut buf)?,
        };
        buf.expect_consumed()?;
        Ok(log)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
