//! In-memory card with transactional secure sessions.

use tracing::trace;

use crate::codec::{CompactDate, CompactTime};
use crate::card::{ContractSet, EventLog};
use crate::error::{ParseError, ProtocolError};
use crate::records::{
    Contract, DebitLog, Environment, Event, FileId, LoadLog, Record, RECORD_SIZE,
};
use crate::session::{AccessLevel, CardSerial, CloseMode, SecureCardSession, SvSnapshot};

/// Largest amount one SV debit command accepts.
pub const SV_DEBIT_LIMIT: i32 = i16::MAX as i32;

/// Command queued inside an open session.
#[derive(Debug, Clone)]
enum Staged {
    Update { file: FileId, slot: u8, bytes: Vec<u8> },
    Append { bytes: Vec<u8> },
    Debit { amount: i32, date: CompactDate, time: CompactTime },
    Reload { amount: i32, date: CompactDate, time: CompactTime, free_data: [u8; 2] },
    Invalidate,
    Rehabilitate,
}

#[derive(Debug)]
struct OpenSession {
    level: AccessLevel,
    staged: Vec<Staged>,
    /// Purse balance including staged SV commands
    balance: i32,
}

/// A card whose files live in memory.
///
/// Commands issued inside a session are staged and applied together on
/// [`close`](SecureCardSession::close); [`abort`](SecureCardSession::abort)
/// or a failed close discards them.
#[derive(Debug)]
pub struct MemoryCard {
    serial: CardSerial,
    card_type: u8,
    enabled: bool,
    present: bool,
    environment: Vec<u8>,
    contracts: Vec<Vec<u8>>,
    /// Slot 1 first
    events: Vec<Vec<u8>>,
    balance: i32,
    sv_transaction_number: u16,
    debit_log: DebitLog,
    load_log: LoadLog,
    session: Option<OpenSession>,
    closes: usize,
    fail_after_closes: Option<usize>,
}

impl MemoryCard {
    /// Blank, enabled card with an empty purse.
    pub fn new(serial: CardSerial) -> Self {
        let blank = || vec![0u8; RECORD_SIZE];
        Self {
            serial,
            card_type: 0x20,
            enabled: true,
            present: true,
            environment: blank(),
            contracts: (0..FileId::Contract.slot_count()).map(|_| blank()).collect(),
            events: (0..FileId::Event.slot_count()).map(|_| blank()).collect(),
            balance: 0,
            sv_transaction_number: 0,
            debit_log: DebitLog::default(),
            load_log: LoadLog::default(),
            session: None,
            closes: 0,
            fail_after_closes: None,
        }
    }

    pub fn with_balance(mut self, balance: i32) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Make every close after the first `n` successful ones fail.
    pub fn fail_after_closes(mut self, n: usize) -> Self {
        self.fail_after_closes = Some(n);
        self
    }

    pub fn put_environment(&mut self, environment: &Environment) -> Result<(), ParseError> {
        self.environment = environment.pack()?;
        Ok(())
    }

    pub fn put_contract(&mut self, contract: &Contract) -> Result<(), ParseError> {
        let bytes = contract.pack()?;
        if let Some(record) = self.contracts.get_mut(usize::from(contract.slot).wrapping_sub(1)) {
            *record = bytes;
        }
        Ok(())
    }

    /// Write an event as the newest record of the cyclic file.
    pub fn put_event(&mut self, event: &Event) -> Result<(), ParseError> {
        let bytes = event.pack()?;
        self.push_event(bytes);
        Ok(())
    }

    /// Take the card out of the field; every command then fails.
    pub fn remove(&mut self) {
        self.present = false;
        self.session = None;
    }

    pub fn insert(&mut self) {
        self.present = true;
    }

    pub fn balance(&self) -> i32 {
        self.balance
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn sv_transaction_number(&self) -> u16 {
        self.sv_transaction_number
    }

    pub fn has_open_session(&self) -> bool {
        self.session.is_some()
    }

    /// Committed sessions so far.
    pub fn closes(&self) -> usize {
        self.closes
    }

    pub fn contracts(&self) -> Result<ContractSet, ParseError> {
        ContractSet::from_records(&self.contracts)
    }

    pub fn events(&self) -> Result<EventLog, ParseError> {
        EventLog::from_records(&self.events)
    }

    pub fn debit_log(&self) -> &DebitLog {
        &self.debit_log
    }

    pub fn load_log(&self) -> &LoadLog {
        &self.load_log
    }

    // ------------------------------------------------------------------------

    fn ensure_present(&self) -> Result<(), ProtocolError> {
        if self.present {
            Ok(())
        } else {
            Err(ProtocolError::CardRemoved)
        }
    }

    /// Open session, rejecting commands other than rehabilitation on an
    /// invalidated card.
    fn session_for(&mut self, staged: &Staged) -> Result<&mut OpenSession, ProtocolError> {
        self.ensure_present()?;
        let enabled = self.enabled;
        let session = self.session.as_mut().ok_or(ProtocolError::SessionNotOpen)?;
        if !enabled && !matches!(staged, Staged::Rehabilitate) {
            return Err(ProtocolError::Session("application invalidated".into()));
        }
        Ok(session)
    }

    fn stage(&mut self, staged: Staged) -> Result<(), ProtocolError> {
        let session = self.session_for(&staged)?;
        trace!(level = ?session.level, command = ?staged, "staged");
        session.staged.push(staged);
        Ok(())
    }

    fn records_mut(&mut self, file: FileId) -> Option<&mut Vec<Vec<u8>>> {
        match file {
            FileId::Contract => Some(&mut self.contracts),
            FileId::Event => Some(&mut self.events),
            _ => None,
        }
    }

    fn push_event(&mut self, bytes: Vec<u8>) {
        self.events.insert(0, bytes);
        self.events.truncate(usize::from(FileId::Event.slot_count()));
    }

    fn apply(&mut self, staged: Staged) {
        match staged {
            Staged::Update { file, slot, bytes } => {
                if file == FileId::Environment {
                    self.environment = bytes;
                } else if let Some(records) = self.records_mut(file) {
                    records[usize::from(slot) - 1] = bytes;
                }
            }
            Staged::Append { bytes } => self.push_event(bytes),
            Staged::Debit { amount, date, time } => {
                self.balance -= amount;
                self.sv_transaction_number = self.sv_transaction_number.wrapping_add(1);
                self.debit_log = DebitLog {
                    amount: amount as i16,
                    date,
                    time,
                    balance: self.balance,
                    sv_transaction_number: self.sv_transaction_number,
                    ..DebitLog::default()
                };
            }
            Staged::Reload {
                amount,
                date,
                time,
                free_data,
            } => {
                self.balance += amount;
                self.sv_transaction_number = self.sv_transaction_number.wrapping_add(1);
                self.load_log = LoadLog {
                    amount,
                    date,
                    time,
                    free_data: u16::from_be_bytes(free_data),
                    balance: self.balance,
                    sv_transaction_number: self.sv_transaction_number,
                    ..LoadLog::default()
                };
            }
            Staged::Invalidate => self.enabled = false,
            Staged::Rehabilitate => self.enabled = true,
        }
    }
}

fn check_record(file: FileId, slot: u8, bytes: &[u8]) -> Result<(), ProtocolError> {
    if file.sfi().is_none() || slot == 0 || slot > file.slot_count() {
        return Err(ProtocolError::RecordUnavailable { file, slot });
    }
    if bytes.len() != RECORD_SIZE {
        return Err(ProtocolError::Session(format!(
            "record is {} bytes, expected {}",
            bytes.len(),
            RECORD_SIZE
        )));
    }
    Ok(())
}

impl SecureCardSession for MemoryCard {
    fn card_serial(&mut self) -> Result<CardSerial, ProtocolError> {
        self.ensure_present()?;
        Ok(self.serial)
    }

    fn card_type(&mut self) -> Result<u8, ProtocolError> {
        self.ensure_present()?;
        Ok(self.card_type)
    }

    fn is_enabled(&mut self) -> Result<bool, ProtocolError> {
        self.ensure_present()?;
        Ok(self.enabled)
    }

    fn sv_get(&mut self) -> Result<SvSnapshot, ProtocolError> {
        self.ensure_present()?;
        let debit_log = self.debit_log.pack().map_err(|e| ProtocolError::Session(e.to_string()))?;
        let load_log = self.load_log.pack().map_err(|e| ProtocolError::Session(e.to_string()))?;
        Ok(SvSnapshot {
            balance: self.balance,
            transaction_number: self.sv_transaction_number,
            debit_log,
            load_log,
        })
    }

    fn open(&mut self, level: AccessLevel) -> Result<(), ProtocolError> {
        self.ensure_present()?;
        if self.session.is_some() {
            return Err(ProtocolError::Session("session already open".into()));
        }
        self.session = Some(OpenSession {
            level,
            staged: Vec::new(),
            balance: self.balance,
        });
        Ok(())
    }

    fn read_record(&mut self, file: FileId, slot: u8) -> Result<Vec<u8>, ProtocolError> {
        self.ensure_present()?;
        let unavailable = ProtocolError::RecordUnavailable { file, slot };
        if slot == 0 {
            return Err(unavailable);
        }
        let index = usize::from(slot) - 1;
        match file {
            FileId::Environment if slot == 1 => Ok(self.environment.clone()),
            FileId::Contract => self.contracts.get(index).cloned().ok_or(unavailable),
            FileId::Event => self.events.get(index).cloned().ok_or(unavailable),
            _ => Err(unavailable),
        }
    }

    fn read_records_partial(
        &mut self,
        file: FileId,
        from: u8,
        to: u8,
        offset: usize,
        len: usize,
    ) -> Result<Vec<Vec<u8>>, ProtocolError> {
        if offset + len > RECORD_SIZE {
            return Err(ProtocolError::Session(format!(
                "partial read {offset}+{len} past record end"
            )));
        }
        (from..=to)
            .map(|slot| {
                let record = self.read_record(file, slot)?;
                Ok(record[offset..offset + len].to_vec())
            })
            .collect()
    }

    fn update_record(&mut self, file: FileId, slot: u8, bytes: &[u8]) -> Result<(), ProtocolError> {
        check_record(file, slot, bytes)?;
        self.stage(Staged::Update {
            file,
            slot,
            bytes: bytes.to_vec(),
        })
    }

    fn append_record(&mut self, file: FileId, bytes: &[u8]) -> Result<(), ProtocolError> {
        if file != FileId::Event {
            return Err(ProtocolError::RecordUnavailable { file, slot: 1 });
        }
        check_record(file, 1, bytes)?;
        self.stage(Staged::Append {
            bytes: bytes.to_vec(),
        })
    }

    fn sv_debit(
        &mut self,
        amount: i32,
        date: CompactDate,
        time: CompactTime,
    ) -> Result<(), ProtocolError> {
        if !(0..=SV_DEBIT_LIMIT).contains(&amount) {
            return Err(ProtocolError::Session(format!(
                "SV debit of {amount} outside 0..={SV_DEBIT_LIMIT}"
            )));
        }
        let staged = Staged::Debit { amount, date, time };
        let session = self.session_for(&staged)?;
        if session.balance - amount < 0 {
            return Err(ProtocolError::Session("purse balance too low".into()));
        }
        session.balance -= amount;
        session.staged.push(staged);
        Ok(())
    }

    fn sv_reload(
        &mut self,
        amount: i32,
        date: CompactDate,
        time: CompactTime,
        free_data: [u8; 2],
    ) -> Result<(), ProtocolError> {
        let staged = Staged::Reload {
            amount,
            date,
            time,
            free_data,
        };
        let session = self.session_for(&staged)?;
        if session.balance + amount < 0 {
            return Err(ProtocolError::Session("purse balance would go negative".into()));
        }
        session.balance += amount;
        session.staged.push(staged);
        Ok(())
    }

    fn invalidate(&mut self) -> Result<(), ProtocolError> {
        self.stage(Staged::Invalidate)
    }

    fn rehabilitate(&mut self) -> Result<(), ProtocolError> {
        self.stage(Staged::Rehabilitate)
    }

    fn close(&mut self, _mode: CloseMode) -> Result<(), ProtocolError> {
        self.ensure_present()?;
        let session = self.session.take().ok_or(ProtocolError::SessionNotOpen)?;
        if self.fail_after_closes.is_some_and(|n| self.closes >= n) {
            return Err(ProtocolError::Session("close rejected by card".into()));
        }
        for staged in session.staged {
            self.apply(staged);
        }
        self.closes += 1;
        Ok(())
    }

    fn abort(&mut self) {
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> MemoryCard {
        MemoryCard::new(CardSerial::from_u64(9)).with_balance(1_000)
    }

    fn event(tnum: u32) -> Vec<u8> {
        let mut e = Event::new(1);
        e.transaction_number = tnum;
        e.pack().unwrap()
    }

    #[test]
    fn test_commands_need_a_session() {
        let mut c = card();
        assert_eq!(
            c.sv_debit(1, CompactDate::default(), CompactTime::default()),
            Err(ProtocolError::SessionNotOpen)
        );
    }

    #[test]
    fn test_close_commits() {
        let mut c = card();
        c.open(AccessLevel::Debit).unwrap();
        c.sv_debit(300, CompactDate::default(), CompactTime::default()).unwrap();
        c.append_record(FileId::Event, &event(1)).unwrap();
        assert_eq!(c.balance(), 1_000);

        c.close(CloseMode::KeepOpen).unwrap();
        assert_eq!(c.balance(), 700);
        assert_eq!(c.debit_log().amount, 300);
        assert_eq!(c.events().unwrap().len(), 1);
    }

    #[test]
    fn test_abort_discards() {
        let mut c = card();
        c.open(AccessLevel::Debit).unwrap();
        c.sv_debit(300, CompactDate::default(), CompactTime::default()).unwrap();
        c.abort();
        assert_eq!(c.balance(), 1_000);
        assert!(!c.has_open_session());
    }

    #[test]
    fn test_debit_limits() {
        let mut c = card().with_balance(100_000);
        c.open(AccessLevel::Debit).unwrap();
        assert!(c
            .sv_debit(SV_DEBIT_LIMIT + 1, CompactDate::default(), CompactTime::default())
            .is_err());
        c.sv_debit(SV_DEBIT_LIMIT, CompactDate::default(), CompactTime::default())
            .unwrap();
        c.sv_debit(SV_DEBIT_LIMIT, CompactDate::default(), CompactTime::default())
            .unwrap();
        c.sv_debit(SV_DEBIT_LIMIT, CompactDate::default(), CompactTime::default())
            .unwrap();
        // 100000 - 3 * 32767 = 1699
        assert!(c
            .sv_debit(1_700, CompactDate::default(), CompactTime::default())
            .is_err());
    }

    #[test]
    fn test_cyclic_append() {
        let mut c = card();
        for tnum in 1..=4 {
            c.open(AccessLevel::Debit).unwrap();
            c.append_record(FileId::Event, &event(tnum)).unwrap();
            c.close(CloseMode::KeepOpen).unwrap();
        }
        let newest = Event::unpack(1, &c.read_record(FileId::Event, 1).unwrap()).unwrap();
        assert_eq!(newest.transaction_number, 4);
        let numbers: Vec<u32> = c.events().unwrap().iter().map(|e| e.transaction_number).collect();
        assert_eq!(numbers, vec![4, 3, 2]);
    }

    #[test]
    fn test_invalidated_card_only_rehabilitates() {
        let mut c = card().with_enabled(false);
        c.open(AccessLevel::Debit).unwrap();
        assert!(c.append_record(FileId::Event, &event(1)).is_err());
        c.rehabilitate().unwrap();
        c.close(CloseMode::CloseAfter).unwrap();
        assert!(c.enabled());
    }

    #[test]
    fn test_failing_close() {
        let mut c = card().fail_after_closes(1);
        for expected in [Ok(()), Err(())] {
            c.open(AccessLevel::Debit).unwrap();
            c.sv_debit(100, CompactDate::default(), CompactTime::default()).unwrap();
            assert_eq!(c.close(CloseMode::KeepOpen).map_err(|_| ()), expected);
        }
        assert_eq!(c.balance(), 900);
        assert_eq!(c.closes(), 1);
    }

    #[test]
    fn test_removed_card() {
        let mut c = card();
        c.remove();
        assert_eq!(c.card_serial(), Err(ProtocolError::CardRemoved));
        c.insert();
        assert!(c.card_serial().is_ok());
    }

    #[test]
    fn test_bad_record_target() {
        let mut c = card();
        c.open(AccessLevel::Personalization).unwrap();
        assert!(c.update_record(FileId::Contract, 9, &[0; RECORD_SIZE]).is_err());
        assert!(c.update_record(FileId::DebitLog, 1, &[0; RECORD_SIZE]).is_err());
        assert!(c.update_record(FileId::Contract, 1, &[0; 10]).is_err());
    }
}
