//! Error taxonomy for the card core.
//!
//! Three families, each with a fixed classification in a
//! [`TransactionResult`](crate::engine::TransactionResult):
//!
//! | Error | Origin | Status |
//! |-------|--------|--------|
//! | [`ValidationError`] | business rule violated | `Aborted` |
//! | [`ProtocolError`] | session or SAM collaborator failed | `Error` |
//! | [`ParseError`] | malformed binary record | `Error` |

use thiserror::Error;

use crate::engine::Status;
use crate::records::{ContractStatus, FileId};

/// Binary record codec failures. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("record length {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },

    #[error("bit cursor overrun: {requested} bits requested at {position} of {capacity}")]
    Overrun {
        position: usize,
        requested: u32,
        capacity: usize,
    },

    #[error("record layout consumed {consumed} of {capacity} bits")]
    Underrun { consumed: usize, capacity: usize },

    #[error("field {field} value {value:#x} does not fit in {width} bits")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        width: u32,
    },

    #[error("field width {0} outside 1..=64")]
    Width(u32),
}

/// Failures raised by the secure-session or SAM collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("card session: {0}")]
    Session(String),

    #[error("secure session not open")]
    SessionNotOpen,

    #[error("card removed during transaction")]
    CardRemoved,

    #[error("record {file:?}/{slot} unavailable")]
    RecordUnavailable { file: FileId, slot: u8 },

    #[error("SAM: {0}")]
    Sam(String),

    #[error("SAM locked")]
    SamLocked,
}

/// Business-rule violations. Always reported as `Aborted`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("card serial {actual} does not match expected {expected}")]
    CardMismatch { expected: String, actual: String },

    #[error("card is invalidated")]
    CardDisabled,

    #[error("card is already enabled")]
    CardAlreadyEnabled,

    #[error("no contract in slot {0}")]
    ContractNotFound(u8),

    #[error("card holds no valid contract")]
    NoValidContract,

    #[error("contract status {0:?} does not allow this operation")]
    ContractStatus(ContractStatus),

    #[error("contract expired on {0}")]
    ContractExpired(String),

    #[error("insufficient balance: {balance} available, {requested} requested")]
    InsufficientBalance { balance: i32, requested: i64 },

    #[error("balance {balance} plus {amount} exceeds maximum {max}")]
    MaxBalanceExceeded { balance: i32, amount: i64, max: i32 },

    #[error("amount {amount} outside {min}..={max}")]
    AmountOutOfRange { amount: i64, min: i64, max: i64 },

    #[error("passback: card used at location {location} {elapsed_secs}s ago")]
    Passback { location: u16, elapsed_secs: u32 },

    #[error("contract in slot {0} failed SAM authentication")]
    ContractAuthenticator(u8),

    /// The 24-bit event counter cannot advance; the card takes no more
    /// events.
    #[error("event transaction counter exhausted at {last}")]
    TransactionCounterExhausted { last: u32 },
}

/// Any failure an engine operation can hit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A chunked operation failed after committing part of the amount.
    #[error("interrupted after committing {completed} of {requested}: {source}")]
    Interrupted {
        completed: i64,
        requested: i64,
        #[source]
        source: Box<TransactionError>,
    },
}

impl TransactionError {
    /// Result status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            TransactionError::Validation(_) => Status::Aborted,
            TransactionError::Protocol(_)
            | TransactionError::Parse(_)
            | TransactionError::Interrupted { .. } => Status::Error,
        }
    }
}

pub type Result<T, E = TransactionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let e: TransactionError = ValidationError::NoValidContract.into();
        assert_eq!(e.status(), Status::Aborted);

        let e: TransactionError = ProtocolError::SamLocked.into();
        assert_eq!(e.status(), Status::Error);

        let e: TransactionError = ParseError::Width(0).into();
        assert_eq!(e.status(), Status::Error);
    }

    #[test]
    fn test_interrupted_is_error() {
        let e = TransactionError::Interrupted {
            completed: 32_767,
            requested: 40_000,
            source: Box::new(ProtocolError::CardRemoved.into()),
        };
        assert_eq!(e.status(), Status::Error);
        assert_eq!(
            e.to_string(),
            "interrupted after committing 32767 of 40000: card removed during transaction"
        );
    }

    #[test]
    fn test_messages_are_readable() {
        let e = ValidationError::InsufficientBalance {
            balance: 100,
            requested: 250,
        };
        assert_eq!(
            e.to_string(),
            "insufficient balance: 100 available, 250 requested"
        );

        let e = ParseError::FieldOverflow {
            field: "status",
            value: 0x1FF,
            width: 8,
        };
        assert_eq!(e.to_string(), "field status value 0x1ff does not fit in 8 bits");
    }
}
