//! Contract record: a ride product held in one of eight slots.
//!
//! ## Layout (232 bits)
//!
//! | Field | Bits | Encoding |
//! |-------|------|----------|
//! | version | 8 | |
//! | status | 8 | [`ContractStatus`] |
//! | start date | 14 | [`ReverseDate`] |
//! | duration | 8 | [`Period`]: unit (2) + count (6) |
//! | network | 8 | |
//! | provider | 8 | |
//! | modality | 2 | [`Modality`] |
//! | counter code | 6 | |
//! | tariff | 16 | |
//! | journey interchange | 1 | flag |
//! | vehicle class | 7 | bitmask |
//! | restrict time | 5 | |
//! | restrict code | 5 | |
//! | period journeys | 8 | |
//! | location | 40 | bitmap |
//! | sale date | 16 | [`CompactDate`] |
//! | sale SAM | 32 | |
//! | sale counter | 16 | |
//! | KVC | 8 | |
//! | authenticator | 16 | written by the SAM |
//!
//! ## Expiration
//!
//! ```text
//! expiration = start + period(unit, count) - days_offset
//! expired    = today > expiration
//! ```

use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::codec::{BitBuffer, CompactDate, Enumerated, ReverseDate, WireEnum};
use crate::error::ParseError;
use crate::records::{ContractStatus, FileId, Modality, PeriodUnit, Record, RECORD_SIZE};

/// Bytes covered by the authenticator (everything before it).
pub const SIGNED_REGION: usize = RECORD_SIZE - 2;

// ============================================================================
// Period
// ============================================================================

/// Validity period packed into the contract `duration` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub unit: PeriodUnit,
    pub count: u8,
}

impl Period {
    /// Largest count the 6-bit field holds.
    pub const MAX_COUNT: u8 = 0x3F;

    pub fn new(unit: PeriodUnit, count: u8) -> Self {
        Self { unit, count }
    }

    pub fn months(count: u8) -> Self {
        Self::new(PeriodUnit::Month, count)
    }

    pub fn weeks(count: u8) -> Self {
        Self::new(PeriodUnit::Week, count)
    }

    pub fn days(count: u8) -> Self {
        Self::new(PeriodUnit::Day, count)
    }

    pub fn decode(raw: u8) -> Self {
        Self {
            unit: Enumerated::<PeriodUnit>::from_raw(u32::from(raw >> 6)).decode(),
            count: raw & Self::MAX_COUNT,
        }
    }

    pub fn encode(self) -> Result<u8, ParseError> {
        if self.count > Self::MAX_COUNT {
            return Err(ParseError::FieldOverflow {
                field: "duration.count",
                value: u64::from(self.count),
                width: 6,
            });
        }
        Ok(((self.unit.wire() as u8) << 6) | self.count)
    }

    /// Last day covered by a period starting on `start`.
    ///
    /// An RFU unit has no length: the period ends on its start date.
    pub fn add_to(self, start: NaiveDate) -> NaiveDate {
        let count = u32::from(self.count);
        match self.unit {
            PeriodUnit::Month => start
                .checked_add_months(Months::new(count))
                .unwrap_or(NaiveDate::MAX),
            PeriodUnit::Week => start + Duration::weeks(i64::from(count)),
            PeriodUnit::Day => start + Duration::days(i64::from(count)),
            PeriodUnit::Rfu => start,
        }
    }
}

// ============================================================================
// Contract
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contract {
    /// Slot in the contract file (1..=8)
    pub slot: u8,
    pub version: u8,
    pub status: Enumerated<ContractStatus>,
    pub start_date: ReverseDate,
    /// Raw [`Period`] byte
    pub duration: u8,
    pub network: u8,
    pub provider: u8,
    pub modality: Enumerated<Modality>,
    pub counter_code: u8,
    pub tariff: u16,
    pub journey_interchange: bool,
    pub vehicle_class: u8,
    pub restrict_time: u8,
    pub restrict_code: u8,
    pub period_journeys: u8,
    /// 40-bit location bitmap
    pub location: u64,
    pub sale_date: CompactDate,
    pub sale_sam: u32,
    pub sale_counter: u16,
    pub kvc: u8,
    pub authenticator: u16,
}

impl Contract {
    /// Empty contract for `slot`.
    pub fn new(slot: u8) -> Self {
        Self {
            slot,
            ..Default::default()
        }
    }

    pub fn status(&self) -> ContractStatus {
        self.status.decode()
    }

    /// Status decodes to one of the accepted states.
    pub fn is_accepted(&self) -> bool {
        self.status().is_accepted()
    }

    pub fn period(&self) -> Period {
        Period::decode(self.duration)
    }

    pub fn set_period(&mut self, period: Period) -> Result<(), ParseError> {
        self.duration = period.encode()?;
        Ok(())
    }

    /// Expiration date shifted back by `days_offset`.
    pub fn expiration_date(&self, days_offset: i64) -> NaiveDate {
        self.period().add_to(self.start_date.to_date()) - Duration::days(days_offset)
    }

    pub fn is_expired(&self, days_offset: i64, today: NaiveDate) -> bool {
        today > self.expiration_date(days_offset)
    }

    /// Bit for this slot in an event `contracts_used` bitmap.
    pub fn slot_bit(&self) -> u8 {
        match self.slot {
            1..=8 => 1 << (self.slot - 1),
            _ => 0,
        }
    }

    /// Packed bytes the authenticator is computed over.
    pub fn signed_region(&self) -> Result<Vec<u8>, ParseError> {
        let mut bytes = self.pack()?;
        bytes.truncate(SIGNED_REGION);
        Ok(bytes)
    }
}

impl Record for Contract {
    const FILE: FileId = FileId::Contract;

    fn slot(&self) -> u8 {
        self.slot
    }

    fn pack(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = BitBuffer::new(RECORD_SIZE);
        buf.write("version", u64::from(self.version), 8)?;
        buf.write("status", u64::from(self.status.raw()), 8)?;
        buf.write("start_date", u64::from(self.start_date.wire()), 14)?;
        buf.write("duration", u64::from(self.duration), 8)?;
        buf.write("network", u64::from(self.network), 8)?;
        buf.write("provider", u64::from(self.provider), 8)?;
        buf.write("modality", u64::from(self.modality.raw()), 2)?;
        buf.write("counter_code", u64::from(self.counter_code), 6)?;
        buf.write("tariff", u64::from(self.tariff), 16)?;
        buf.write("journey_interchange", u64::from(self.journey_interchange), 1)?;
        buf.write("vehicle_class", u64::from(self.vehicle_class), 7)?;
        buf.write("restrict_time", u64::from(self.restrict_time), 5)?;
        buf.write("restrict_code", u64::from(self.restrict_code), 5)?;
        buf.write("period_journeys", u64::from(self.period_journeys), 8)?;
        buf.write("location", self.location, 40)?;
        buf.write("sale_date", u64::from(self.sale_date.wire()), 16)?;
        buf.write("sale_sam", u64::from(self.sale_sam), 32)?;
        buf.write("sale_counter", u64::from(self.sale_counter), 16)?;
        buf.write("kvc", u64::from(self.kvc), 8)?;
        buf.write("authenticator", u64::from(self.authenticator), 16)?;
        buf.finish()
    }

    fn unpack(slot: u8, bytes: &[u8]) -> Result<Self, ParseError> {
        let mut buf = BitBuffer::from_bytes(bytes, RECORD_SIZE)?;
        let contract = Contract {
            slot,
            version: buf.read(8)? as u8,
            status: Enumerated::from_raw(buf.read(8)? as u32),
            start_date: ReverseDate::from_wire(buf.read(14)? as u16),
            duration: buf.read(8)? as u8,
            network: buf.read(8)? as u8,
            provider: buf.read(8)? as u8,
            modality: Enumerated::from_raw(buf.read(2)? as u32),
            counter_code: buf.read(6)? as u8,
            tariff: buf.read(16)? as u16,
            journey_interchange: buf.read(1)? == 1,
            vehicle_class: buf.read(7)? as u8,
            restrict_time: buf.read(5)? as u8,
            restrict_code: buf.read(5)? as u8,
            period_journeys: buf.read(8)? as u8,
            location: buf.read(40)?,
            sale_date: CompactDate::from_wire(buf.read(16)? as u16),
            sale_sam: buf.read(32)? as u32,
            sale_counter: buf.read(16)? as u16,
            kvc: buf.read(8)? as u8,
            authenticator: buf.read(16)? as u16,
        };
        buf.expect_consumed()?;
        Ok(contract)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
