//! On-card record codecs.
//!
//! ## Record capability
//!
//! Every record type is a plain struct implementing [`Record`]: it knows
//! its file, its slot, and how to pack itself into exactly
//! [`RECORD_SIZE`] bytes. Records never read or write the card themselves;
//! the transaction engine decides when bytes move.
//!
//! ## File layout
//!
//! | File | Records | SFI |
//! |------|---------|-----|
//! | Environment | 1 | 0x07 |
//! | Event | 3 (rolling) | 0x08 |
//! | Contract | 8 | 0x09 |
//!
//! The two stored-value logs come back with the SV status rather than from
//! a record file.
//!
//! ## Example
//!
//! ```
//! use cdmx_card::records::{Contract, ContractStatus, Record, RECORD_SIZE};
//!
//! let mut contract = Contract::new(1);
//! contract.status.set(ContractStatus::PartlyUsed);
//! contract.tariff = 500;
//!
//! let bytes = contract.pack().unwrap();
//! assert_eq!(bytes.len(), RECORD_SIZE);
//! assert_eq!(Contract::unpack(1, &bytes).unwrap(), contract);
//! ```

mod codes;
mod contract;
mod environment;
mod event;
mod sv_log;

pub use codes::{ContractStatus, Modality, PeriodUnit, ProfileType, TransactionType};
pub use contract::{Contract, Period};
pub use environment::Environment;
pub use event::{Event, FirstLeg, MAX_TRANSACTION_NUMBER};
pub use sv_log::{DebitLog, LoadLog};

use crate::error::ParseError;

/// Fixed record length for the CDMX profile.
pub const RECORD_SIZE: usize = 29;

/// Bits in one record.
pub const RECORD_BITS: usize = RECORD_SIZE * 8;

/// Card files addressed by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileId {
    Environment,
    Event,
    Contract,
    DebitLog,
    LoadLog,
}

impl FileId {
    /// Short file identifier, `None` for the SV logs.
    pub fn sfi(self) -> Option<u8> {
        match self {
            FileId::Environment => Some(0x07),
            FileId::Event => Some(0x08),
            FileId::Contract => Some(0x09),
            FileId::DebitLog | FileId::LoadLog => None,
        }
    }

    /// Number of records the file holds.
    pub fn slot_count(self) -> u8 {
        match self {
            FileId::Environment | FileId::DebitLog | FileId::LoadLog => 1,
            FileId::Event => 3,
            FileId::Contract => 8,
        }
    }
}

/// A fixed-width packed record.
pub trait Record: Sized {
    /// File the record lives in.
    const FILE: FileId;

    /// 1-based slot within the file.
    fn slot(&self) -> u8;

    /// Serialize to exactly [`RECORD_SIZE`] bytes.
    fn pack(&self) -> Result<Vec<u8>, ParseError>;

    /// Decode a record read from `slot`.
    fn unpack(slot: u8, bytes: &[u8]) -> Result<Self, ParseError>;

    /// Upper-case hex of the packed bytes, for audit logs.
    fn content(&self) -> Result<String, ParseError> {
        Ok(hex::encode_upper(self.pack()?))
    }
}

/// `true` for a never-written record (all bytes zero).
pub fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| *b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_layout() {
        assert_eq!(FileId::Environment.slot_count(), 1);
        assert_eq!(FileId::Event.slot_count(), 3);
        assert_eq!(FileId::Contract.slot_count(), 8);
        assert_eq!(FileId::Contract.sfi(), Some(0x09));
        assert_eq!(FileId::LoadLog.sfi(), None);
    }

    #[test]
    fn test_content_is_hex() {
        let c = Contract::new(1);
        let hex = c.content().unwrap();
        assert_eq!(hex.len(), RECORD_SIZE * 2);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&[0; RECORD_SIZE]));
        assert!(!is_blank(&[0, 0, 1]));
    }
}
