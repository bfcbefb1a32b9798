//! Closed code sets carried by on-card records.
//!
//! Each set implements [`WireEnum`] with an explicit `Rfu` fallback for
//! codes not (yet) assigned.

use serde::{Deserialize, Serialize};

use crate::codec::WireEnum;

// ============================================================================
// ContractStatus
// ============================================================================

/// Lifecycle status of a contract.
///
/// Only `NeverUsed`, `PartlyUsed` and `ToBeRenewed` are accepted by
/// validators; the other states block use of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractStatus {
    NeverUsed,
    PartlyUsed,
    ToBeRenewed,
    Suspended,
    InvalidAndRefunded,
    Erasable,
    Rfu,
}

impl ContractStatus {
    /// Whether a contract in this status can be used at all.
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            ContractStatus::NeverUsed | ContractStatus::PartlyUsed | ContractStatus::ToBeRenewed
        )
    }
}

impl WireEnum for ContractStatus {
    const RFU: Self = ContractStatus::Rfu;

    fn from_wire(code: u32) -> Option<Self> {
        match code {
            0x00 => Some(ContractStatus::NeverUsed),
            0x01 => Some(ContractStatus::PartlyUsed),
            0x03 => Some(ContractStatus::ToBeRenewed),
            0x3F => Some(ContractStatus::Suspended),
            0x58 => Some(ContractStatus::InvalidAndRefunded),
            0xFF => Some(ContractStatus::Erasable),
            _ => None,
        }
    }

    fn wire(self) -> u32 {
        match self {
            ContractStatus::NeverUsed => 0x00,
            ContractStatus::PartlyUsed => 0x01,
            ContractStatus::ToBeRenewed => 0x03,
            ContractStatus::Suspended => 0x3F,
            ContractStatus::InvalidAndRefunded => 0x58,
            ContractStatus::Erasable => 0xFF,
            ContractStatus::Rfu => 0x7F,
        }
    }
}

// ============================================================================
// PeriodUnit
// ============================================================================

/// Unit of a contract validity period (top 2 bits of `duration`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    #[default]
    Month,
    Week,
    Day,
    Rfu,
}

impl WireEnum for PeriodUnit {
    const RFU: Self = PeriodUnit::Rfu;

    fn from_wire(code: u32) -> Option<Self> {
        match code {
            0 => Some(PeriodUnit::Month),
            1 => Some(PeriodUnit::Week),
            2 => Some(PeriodUnit::Day),
            _ => None,
        }
    }

    fn wire(self) -> u32 {
        match self {
            PeriodUnit::Month => 0,
            PeriodUnit::Week => 1,
            PeriodUnit::Day => 2,
            PeriodUnit::Rfu => 3,
        }
    }
}

// ============================================================================
// Modality
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    Monomodal,
    Multimodal,
    Rfu,
}

impl WireEnum for Modality {
    const RFU: Self = Modality::Rfu;

    fn from_wire(code: u32) -> Option<Self> {
        match code {
            0 => Some(Modality::Monomodal),
            1 => Some(Modality::Multimodal),
            _ => None,
        }
    }

    fn wire(self) -> u32 {
        match self {
            Modality::Monomodal => 0,
            Modality::Multimodal => 1,
            Modality::Rfu => 3,
        }
    }
}

// ============================================================================
// TransactionType
// ============================================================================

/// Kind of operation recorded in an event.
///
/// Three independent flags describe each kind:
///
/// | Type | written | reported | signed |
/// |------|---------|----------|--------|
/// | Debit | yes | yes | yes |
/// | Reload | yes | yes | yes |
/// | Purchase | yes | yes | yes |
/// | Renewal | yes | yes | no |
/// | Blacklist | yes | yes | yes |
/// | Rehabilitation | no | yes | no |
/// | BalanceCancellation | yes | yes | yes |
/// | Consultation | no | no | no |
/// | InterchangeDebit | yes | yes | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Debit,
    Reload,
    Purchase,
    Renewal,
    Blacklist,
    Rehabilitation,
    BalanceCancellation,
    Consultation,
    InterchangeDebit,
    Rfu,
}

impl TransactionType {
    /// Appended to the card event file.
    pub fn is_written(self) -> bool {
        !matches!(
            self,
            TransactionType::Rehabilitation | TransactionType::Consultation | TransactionType::Rfu
        )
    }

    /// Forwarded to the back office.
    pub fn is_reported(self) -> bool {
        !matches!(self, TransactionType::Consultation | TransactionType::Rfu)
    }

    /// Carries a SAM MAC in the event free data.
    pub fn is_signed(self) -> bool {
        self.is_written() && self != TransactionType::Renewal
    }
}

impl WireEnum for TransactionType {
    const RFU: Self = TransactionType::Rfu;

    fn from_wire(code: u32) -> Option<Self> {
        match code {
            0x01 => Some(TransactionType::Debit),
            0x02 => Some(TransactionType::Reload),
            0x03 => Some(TransactionType::Purchase),
            0x04 => Some(TransactionType::Renewal),
            0x05 => Some(TransactionType::Blacklist),
            0x06 => Some(TransactionType::Rehabilitation),
            0x07 => Some(TransactionType::BalanceCancellation),
            0x08 => Some(TransactionType::Consultation),
            0x09 => Some(TransactionType::InterchangeDebit),
            _ => None,
        }
    }

    fn wire(self) -> u32 {
        match self {
            TransactionType::Debit => 0x01,
            TransactionType::Reload => 0x02,
            TransactionType::Purchase => 0x03,
            TransactionType::Renewal => 0x04,
            TransactionType::Blacklist => 0x05,
            TransactionType::Rehabilitation => 0x06,
            TransactionType::BalanceCancellation => 0x07,
            TransactionType::Consultation => 0x08,
            TransactionType::InterchangeDebit => 0x09,
            TransactionType::Rfu => 0xFF,
        }
    }
}

// ============================================================================
// ProfileType
// ============================================================================

/// Holder profile, one per nibble of the environment profile code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileType {
    General,
    Student,
    Senior,
    Disabled,
    Child,
    Employee,
    Rfu,
}

impl WireEnum for ProfileType {
    const RFU: Self = ProfileType::Rfu;

    fn from_wire(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ProfileType::General),
            0x1 => Some(ProfileType::Student),
            0x2 => Some(ProfileType::Senior),
            0x3 => Some(ProfileType::Disabled),
            0x4 => Some(ProfileType::Child),
            0x5 => Some(ProfileType::Employee),
            _ => None,
        }
    }

    fn wire(self) -> u32 {
        match self {
            ProfileType::General => 0x0,
            ProfileType::Student => 0x1,
            ProfileType::Senior => 0x2,
            ProfileType::Disabled => 0x3,
            ProfileType::Child => 0x4,
            ProfileType::Employee => 0x5,
            ProfileType::Rfu => 0xF,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Enumerated;

    #[test]
    fn test_contract_status_accepted() {
        assert!(ContractStatus::NeverUsed.is_accepted());
        assert!(ContractStatus::PartlyUsed.is_accepted());
        assert!(ContractStatus::ToBeRenewed.is_accepted());
        assert!(!ContractStatus::Suspended.is_accepted());
        assert!(!ContractStatus::InvalidAndRefunded.is_accepted());
        assert!(!ContractStatus::Erasable.is_accepted());
        assert!(!ContractStatus::Rfu.is_accepted());
    }

    #[test]
    fn test_contract_status_codes_roundtrip() {
        for code in [0x00u32, 0x01, 0x03, 0x3F, 0x58, 0xFF] {
            let status = ContractStatus::from_wire(code).unwrap();
            assert_eq!(status.wire(), code);
        }
        assert_eq!(ContractStatus::from_wire(0x02), None);
        // The RFU placeholder code itself is not a known status
        assert_eq!(ContractStatus::from_wire(ContractStatus::Rfu.wire()), None);
    }

    #[test]
    fn test_unknown_codes_decode_to_rfu() {
        assert_eq!(Enumerated::<TransactionType>::from_raw(0x42).decode(), TransactionType::Rfu);
        assert_eq!(Enumerated::<PeriodUnit>::from_raw(3).decode(), PeriodUnit::Rfu);
        assert_eq!(Enumerated::<Modality>::from_raw(2).decode(), Modality::Rfu);
        assert_eq!(Enumerated::<ProfileType>::from_raw(0xA).decode(), ProfileType::Rfu);
    }

    #[test]
    fn test_transaction_type_flags() {
        assert!(TransactionType::Debit.is_written());
        assert!(TransactionType::Debit.is_signed());
        assert!(TransactionType::Renewal.is_written());
        assert!(!TransactionType::Renewal.is_signed());
        assert!(!TransactionType::Rehabilitation.is_written());
        assert!(TransactionType::Rehabilitation.is_reported());
        assert!(!TransactionType::Consultation.is_reported());
        assert!(!TransactionType::Rfu.is_signed());
    }

    #[test]
    fn test_transaction_type_codes_roundtrip() {
        for code in 0x01u32..=0x09 {
            let t = TransactionType::from_wire(code).unwrap();
            assert_eq!(t.wire(), code);
        }
    }
}
