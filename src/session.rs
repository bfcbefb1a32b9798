//! Collaborator interfaces consumed by the transaction engine.
//!
//! The engine never builds APDUs or computes cryptograms. It talks to two
//! opaque services:
//!
//! - [`SecureCardSession`]: the card, reached through a reader, with
//!   SAM-authenticated secure sessions. Commands issued between
//!   [`open`](SecureCardSession::open) and
//!   [`close`](SecureCardSession::close) are one atomic exchange: either
//!   all of them take effect on close, or none do.
//! - [`SamSession`]: the Secure Access Module computing MACs and contract
//!   authenticators.
//!
//! Both are owned by the engine and passed in at construction; there are
//! no process-wide instances.

use std::fmt;

use crate::codec::{CompactDate, CompactTime, DateTimeReal};
use crate::error::ProtocolError;
use crate::records::FileId;

// ============================================================================
// Card identity
// ============================================================================

/// Application serial number of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CardSerial(pub [u8; 8]);

impl CardSerial {
    pub fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for CardSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ============================================================================
// Session parameters
// ============================================================================

/// Key set used to open a secure session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    /// Issuer key: contract sale, rehabilitation
    Personalization,
    /// Load key: reload, renewal
    Load,
    /// Debit key: debit, invalidation
    Debit,
}

/// What happens to the channel after a session closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseMode {
    /// Keep the card channel open for a follow-up session
    KeepOpen,
    /// Release the card after closing
    CloseAfter,
}

/// Stored-value status returned by an SV Get.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SvSnapshot {
    pub balance: i32,
    pub transaction_number: u16,
    /// Raw debit log record
    pub debit_log: Vec<u8>,
    /// Raw load log record
    pub load_log: Vec<u8>,
}

// ============================================================================
// SecureCardSession
// ============================================================================

/// Card reached through a secure-session capable reader.
pub trait SecureCardSession {
    /// Serial of the card currently in the field.
    fn card_serial(&mut self) -> Result<CardSerial, ProtocolError>;

    /// Product type byte from the card startup information.
    fn card_type(&mut self) -> Result<u8, ProtocolError>;

    /// `false` once the application has been invalidated.
    fn is_enabled(&mut self) -> Result<bool, ProtocolError>;

    /// Read the SV balance and both SV logs.
    fn sv_get(&mut self) -> Result<SvSnapshot, ProtocolError>;

    fn open(&mut self, level: AccessLevel) -> Result<(), ProtocolError>;

    fn read_record(&mut self, file: FileId, slot: u8) -> Result<Vec<u8>, ProtocolError>;

    /// Read `len` bytes at `offset` of records `from..=to`.
    fn read_records_partial(
        &mut self,
        file: FileId,
        from: u8,
        to: u8,
        offset: usize,
        len: usize,
    ) -> Result<Vec<Vec<u8>>, ProtocolError>;

    fn update_record(&mut self, file: FileId, slot: u8, bytes: &[u8]) -> Result<(), ProtocolError>;

    /// Append to a cyclic file; the new record becomes slot 1.
    fn append_record(&mut self, file: FileId, bytes: &[u8]) -> Result<(), ProtocolError>;

    fn sv_debit(
        &mut self,
        amount: i32,
        date: CompactDate,
        time: CompactTime,
    ) -> Result<(), ProtocolError>;

    fn sv_reload(
        &mut self,
        amount: i32,
        date: CompactDate,
        time: CompactTime,
        free_data: [u8; 2],
    ) -> Result<(), ProtocolError>;

    fn invalidate(&mut self) -> Result<(), ProtocolError>;

    fn rehabilitate(&mut self) -> Result<(), ProtocolError>;

    /// Commit every command issued since `open`.
    fn close(&mut self, mode: CloseMode) -> Result<(), ProtocolError>;

    /// Drop an open session without committing.
    fn abort(&mut self);
}

// ============================================================================
// SamSession
// ============================================================================

/// Fields a SAM MAC covers for a signed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedFields {
    pub event_type: u8,
    pub timestamp: DateTimeReal,
    pub amount: i32,
    pub location: u16,
    pub card_type: u8,
    pub card_serial: CardSerial,
    pub prior_balance: i32,
    pub provider: u8,
}

impl SignedFields {
    /// Canonical big-endian encoding handed to the SAM.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(26);
        out.push(self.event_type);
        out.extend_from_slice(&self.timestamp.to_bytes());
        out.extend_from_slice(&self.amount.to_be_bytes());
        out.extend_from_slice(&self.location.to_be_bytes());
        out.push(self.card_type);
        out.extend_from_slice(&self.card_serial.0);
        out.extend_from_slice(&self.prior_balance.to_be_bytes());
        out.push(self.provider);
        out
    }
}

/// Secure Access Module.
pub trait SamSession {
    /// Unlock the SAM with the terminal's shared secret.
    fn unlock(&mut self, secret: &[u8]) -> Result<(), ProtocolError>;

    /// SAM serial, stamped on sold contracts.
    fn sam_id(&self) -> u32;

    /// Increment and return the SAM sale counter.
    fn next_sale_counter(&mut self) -> Result<u16, ProtocolError>;

    /// 4-byte MAC over a signed event.
    fn compute_mac(&mut self, fields: &SignedFields) -> Result<[u8; 4], ProtocolError>;

    /// Contract authenticator over the signed region of a contract.
    fn sign_contract(&mut self, data: &[u8]) -> Result<u16, ProtocolError>;

    fn verify_contract(&mut self, data: &[u8], authenticator: u16) -> Result<bool, ProtocolError>;
}
