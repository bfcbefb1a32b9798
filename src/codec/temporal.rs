//! Compact on-card date and time representations.
//!
//! Every value counts from the card epoch, 1997-01-01 00:00 local time.
//!
//! | Type | Unit | Wire width |
//! |------|------|------------|
//! | [`CompactDate`] | days since epoch | 14–16 bits (per field) |
//! | [`ReverseDate`] | days since epoch, complemented | 14 bits |
//! | [`DateTimeReal`] | seconds since epoch | 32 bits |
//! | [`CompactTime`] | minutes since midnight | 16 bits |
//!
//! ## Reverse dates
//!
//! A [`ReverseDate`] stores `days ^ 0x3FFF`. Setting any bit from 0 to 1
//! lowers the represented day count, so a field that can be OR-ed without
//! authentication can only move the date backward, never extend it.
//!
//! ```
//! use cdmx_card::codec::ReverseDate;
//!
//! let d = ReverseDate::from_days(10_000);
//! assert_eq!(d.un_reverse_days(), 10_000);
//! assert_eq!(d.wire(), 10_000 ^ 0x3FFF);
//! ```

use std::fmt;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Largest day count a 14-bit reverse date can carry.
pub const REVERSE_DATE_MASK: u16 = 0x3FFF;

/// The card epoch, 1997-01-01.
pub fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1997, 1, 1).expect("card epoch is a valid date")
}

fn epoch_midnight() -> NaiveDateTime {
    epoch()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
}

fn days_since_epoch(date: NaiveDate) -> i64 {
    date.signed_duration_since(epoch()).num_days()
}

// ============================================================================
// CompactDate
// ============================================================================

/// Forward day count since the epoch.
///
/// Dates before the epoch clamp to 0 and dates past `u16::MAX` days clamp
/// to the maximum; the field width of the record decides whether the value
/// fits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CompactDate(u16);

impl CompactDate {
    #[inline]
    pub const fn from_wire(code: u16) -> Self {
        Self(code)
    }

    #[inline]
    pub const fn wire(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn days(self) -> u16 {
        self.0
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(days_since_epoch(date).clamp(0, i64::from(u16::MAX)) as u16)
    }

    pub fn to_date(self) -> NaiveDate {
        epoch() + Duration::days(i64::from(self.0))
    }

    pub fn now() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    /// Big-endian wire bytes.
    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for CompactDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_date().format("%Y-%m-%d"))
    }
}

// ============================================================================
// ReverseDate
// ============================================================================

/// Complemented 14-bit day count, used for contract start dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReverseDate(u16);

impl Default for ReverseDate {
    /// The epoch itself (raw `0x3FFF`).
    fn default() -> Self {
        Self::from_days(0)
    }
}

impl ReverseDate {
    #[inline]
    pub const fn from_wire(code: u16) -> Self {
        Self(code & REVERSE_DATE_MASK)
    }

    #[inline]
    pub const fn wire(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn from_days(days: u16) -> Self {
        Self((days & REVERSE_DATE_MASK) ^ REVERSE_DATE_MASK)
    }

    /// Plain day count since the epoch.
    #[inline]
    pub const fn un_reverse_days(self) -> u16 {
        self.0 ^ REVERSE_DATE_MASK
    }

    pub fn from_date(date: NaiveDate) -> Self {
        let days = days_since_epoch(date).clamp(0, i64::from(REVERSE_DATE_MASK));
        Self::from_days(days as u16)
    }

    pub fn to_date(self) -> NaiveDate {
        epoch() + Duration::days(i64::from(self.un_reverse_days()))
    }

    pub fn now() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ReverseDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_date().format("%Y-%m-%d"))
    }
}

// ============================================================================
// DateTimeReal
// ============================================================================

/// Seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DateTimeReal(u32);

impl DateTimeReal {
    #[inline]
    pub const fn from_wire(code: u32) -> Self {
        Self(code)
    }

    #[inline]
    pub const fn wire(self) -> u32 {
        self.0
    }

    pub fn from_datetime(at: NaiveDateTime) -> Self {
        let secs = at.signed_duration_since(epoch_midnight()).num_seconds();
        Self(secs.clamp(0, i64::from(u32::MAX)) as u32)
    }

    pub fn to_datetime(self) -> NaiveDateTime {
        epoch_midnight() + Duration::seconds(i64::from(self.0))
    }

    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    pub fn date(self) -> CompactDate {
        CompactDate::from_date(self.to_datetime().date())
    }

    pub fn time(self) -> CompactTime {
        CompactTime::from_time(self.to_datetime().time())
    }

    /// Seconds elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn seconds_since(self, earlier: DateTimeReal) -> u32 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for DateTimeReal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S"))
    }
}

// ============================================================================
// CompactTime
// ============================================================================

/// Minutes since local midnight (0..1440).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CompactTime(u16);

impl CompactTime {
    #[inline]
    pub const fn from_wire(code: u16) -> Self {
        Self(code)
    }

    #[inline]
    pub const fn wire(self) -> u16 {
        self.0
    }

    pub fn from_time(time: NaiveTime) -> Self {
        Self((time.hour() * 60 + time.minute()) as u16)
    }

    /// `None` for wire values past 23:59.
    pub fn to_time(self) -> Option<NaiveTime> {
        let minutes = u32::from(self.0);
        NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
    }

    pub fn now() -> Self {
        Self::from_time(Local::now().time())
    }

    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for CompactTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
