//! Card-level views assembled from individual records.
//!
//! - [`EventLog`]: the rolling 3-entry event file
//! - [`ContractSet`]: the eight contract slots
//! - [`CardState`]: a fresh snapshot of everything the engine decides on
//!
//! A [`CardState`] is read at the start of every engine operation and
//! discarded at its end. Nothing here is cached across operations.

mod contract_set;
mod event_log;

pub use contract_set::ContractSet;
pub use event_log::{EventLog, EVENT_LOG_CAPACITY};

use tracing::debug;

use crate::error::Result;
use crate::records::{DebitLog, Environment, FileId, LoadLog, Record, RECORD_SIZE};
use crate::session::{CardSerial, SecureCardSession};

/// Snapshot of a card taken outside any secure session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardState {
    pub serial: CardSerial,
    pub card_type: u8,
    pub enabled: bool,
    pub environment: Environment,
    pub contracts: ContractSet,
    pub events: EventLog,
    /// SV balance in centavos
    pub balance: i32,
    pub sv_transaction_number: u16,
    pub debit_log: DebitLog,
    pub load_log: LoadLog,
}

impl CardState {
    /// Read every file the engine needs.
    pub fn read<C: SecureCardSession>(card: &mut C) -> Result<Self> {
        let serial = card.card_serial()?;
        let card_type = card.card_type()?;
        let enabled = card.is_enabled()?;

        let environment = Environment::unpack(1, &card.read_record(FileId::Environment, 1)?)?;

        let contract_slots = FileId::Contract.slot_count();
        let raw_contracts =
            card.read_records_partial(FileId::Contract, 1, contract_slots, 0, RECORD_SIZE)?;
        let contracts = ContractSet::from_records(&raw_contracts)?;

        let mut raw_events = Vec::with_capacity(EVENT_LOG_CAPACITY);
        for slot in 1..=FileId::Event.slot_count() {
            raw_events.push(card.read_record(FileId::Event, slot)?);
        }
        let events = EventLog::from_records(&raw_events)?;

        let sv = card.sv_get()?;
        let debit_log = DebitLog::unpack(1, &sv.debit_log)?;
        let load_log = LoadLog::unpack(1, &sv.load_log)?;

        debug!(
            serial = %serial,
            enabled,
            contracts = contracts.len(),
            events = events.len(),
            balance = sv.balance,
            "card state read"
        );

        Ok(Self {
            serial,
            card_type,
            enabled,
            environment,
            contracts,
            events,
            balance: sv.balance,
            sv_transaction_number: sv.transaction_number,
            debit_log,
            load_log,
        })
    }
}
