//! Transaction engine for CDMX cards.
//!
//! ## Operation model
//!
//! Each operation follows the same four steps:
//!
//! 1. Read a fresh [`CardState`](crate::card::CardState) (never cached)
//! 2. Check preconditions in order; the first failure aborts
//! 3. Run one secure session (open, commands, close)
//! 4. Return a [`TransactionResult`]
//!
//! ## Operations
//!
//! | Operation | Session key | Events written |
//! |-----------|-------------|----------------|
//! | `read_card` | none | none |
//! | `debit` | Debit | Debit or InterchangeDebit per chunk |
//! | `reload` | Load | Reload (plus Renewal when expired) |
//! | `renew` | Load | Renewal |
//! | `invalidate` | Debit | Blacklist |
//! | `rehabilitate` | Personalization | none |
//! | `cancel_balance` | Load | BalanceCancellation (plus Renewal) |
//! | `purchase` | Personalization | Purchase |
//!
//! ## Result classification
//!
//! Business-rule failures are `Aborted` and leave the card untouched.
//! Session, SAM and codec failures are `Error`.
//!
//! ## Example
//!
//! ```
//! use cdmx_card::clock::FixedClock;
//! use cdmx_card::config::EngineConfig;
//! use cdmx_card::engine::{SaleRequest, Status, TransactionEngine};
//! use cdmx_card::session::CardSerial;
//! use cdmx_card::sim::{MemoryCard, MemorySam};
//! use chrono::NaiveDate;
//!
//! let serial = CardSerial::from_u64(0x1234);
//! let now = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
//! let mut engine = TransactionEngine::new(
//!     MemoryCard::new(serial),
//!     MemorySam::unlocked(0xA1B2_C3D4),
//!     FixedClock::new(now),
//!     EngineConfig::default(),
//! );
//!
//! let request = SaleRequest::from_profile(&engine.config().profile, 10_000, 1);
//! let sale = engine.purchase(&serial, request);
//! assert_eq!(sale.status, Status::Ok);
//!
//! let debit = engine.debit(&serial, 1, 500, 7, None);
//! assert_eq!(debit.payload.unwrap().balance, 9_500);
//! ```

mod result;
mod transaction;

pub use result::{Progress, Status, TransactionResult};
pub use transaction::{DebitOutcome, ReloadOutcome, SaleOutcome, SaleRequest, TransactionEngine};
