//! Building blocks shared by every record codec.
//!
//! ## Components
//!
//! - [`BitBuffer`]: MSB-first bit cursor over a fixed record
//! - [`CompactDate`], [`ReverseDate`], [`DateTimeReal`], [`CompactTime`]:
//!   epoch-relative temporal fields
//! - [`Enumerated`]: raw wire code with RFU fallback
//! - [`amount`]: centavo formatting

pub mod amount;
mod bits;
mod enumerated;
mod temporal;

pub use bits::BitBuffer;
pub use enumerated::{Enumerated, WireEnum};
pub use temporal::{epoch, CompactDate, CompactTime, DateTimeReal, ReverseDate, REVERSE_DATE_MASK};
