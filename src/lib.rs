//! # CDMX Card
//!
//! Record codec and transaction engine for Calypso fare cards on the
//! CDMX profile.
//!
//! ## Architecture
//!
//! - **Codec**: bit cursor, epoch-relative dates, enumerated wire codes
//! - **Records**: Environment, Contract, Event and the two SV logs, each
//!   packed into a fixed 29-byte record
//! - **Card**: rolling event log, contract set and the per-operation
//!   card snapshot
//! - **Engine**: debit, reload, renewal, invalidation, rehabilitation,
//!   balance cancellation and contract sale
//!
//! The card reader and the SAM are collaborators behind the traits in
//! [`session`]; the engine owns them and never touches APDUs or keys.
//!
//! ## Design Principles
//!
//! 1. **Byte exact**: `pack(unpack(bytes)) == bytes` for every record
//! 2. **No floating point**: amounts are integer centavos
//! 3. **Fresh reads**: every operation re-reads the card before deciding
//! 4. **Atomic writes**: each mutation is one secure session that either
//!    commits entirely or not at all

// ============================================================================
// Module declarations
// ============================================================================

/// Bit cursor, temporal fields, enumerated codes, amounts
pub mod codec;

/// On-card record layouts
pub mod records;

/// Event log, contract set and card snapshot
pub mod card;

/// Card and SAM collaborator traits
pub mod session;

/// Business-rule engine
pub mod engine;

pub mod clock;
pub mod config;
pub mod error;
pub mod monitor;
pub mod sim;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use card::{CardState, ContractSet, EventLog};
pub use config::{EngineConfig, ProductProfile};
pub use engine::{Status, TransactionEngine, TransactionResult};
pub use error::{ParseError, ProtocolError, TransactionError, ValidationError};
pub use records::{Contract, Environment, Event, Record};
pub use session::{CardSerial, SamSession, SecureCardSession};
