//! Business rules for every mutating card operation.

use std::slice;
use std::time::Instant;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, info_span, warn};

use crate::card::CardState;
use crate::clock::Clock;
use crate::codec::amount::{format_pesos, SV_LIMIT};
use crate::codec::{DateTimeReal, ReverseDate, WireEnum};
use crate::config::{EngineConfig, ProductProfile};
use crate::engine::{Progress, Status, TransactionResult};
use crate::error::{ProtocolError, Result, TransactionError, ValidationError};
use crate::records::{
    Contract, ContractStatus, Event, FileId, FirstLeg, Modality, Period, Record, TransactionType,
};
use crate::session::{AccessLevel, CardSerial, CloseMode, SamSession, SecureCardSession, SignedFields};

// ============================================================================
// Requests and outcomes
// ============================================================================

/// Contract sale parameters.
///
/// Provider, modality, tariff and restrict time are stamped on the sold
/// contract. Every other contract field comes from the configured
/// [`ProductProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleRequest {
    /// Initial SV load in centavos (0 = none)
    pub amount: i64,
    pub location: u16,
    pub provider: u8,
    pub modality: Modality,
    pub tariff: u16,
    pub restrict_time: u8,
}

impl SaleRequest {
    /// Sale of the product described by `profile`.
    pub fn from_profile(profile: &ProductProfile, amount: i64, location: u16) -> Self {
        Self {
            amount,
            location,
            provider: profile.provider,
            modality: profile.modality,
            tariff: profile.tariff,
            restrict_time: profile.restrict_time,
        }
    }
}

impl Default for SaleRequest {
    /// Sale of the default product profile with no initial load.
    fn default() -> Self {
        Self::from_profile(&ProductProfile::default(), 0, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebitOutcome {
    /// Balance read back from the card
    pub balance: i32,
    pub debited: i64,
    pub chunks: usize,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub balance: i32,
    /// Contract rewritten by a renewal in the same session
    pub renewed: Option<Contract>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleOutcome {
    pub contract: Contract,
    pub balance: i32,
    pub event: Event,
}

/// Forwards progress to an optional caller sink.
struct Reporter<'a> {
    sink: Option<&'a mut dyn FnMut(Progress)>,
}

impl<'a> Reporter<'a> {
    fn new(sink: Option<&'a mut dyn FnMut(Progress)>) -> Self {
        Self { sink }
    }

    fn report(&mut self, percent: u8, message: impl Into<String>) {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink(Progress {
                percent: percent.min(100),
                message: message.into(),
            });
        }
    }
}

/// Split `amount` into session-sized pieces. A zero amount is one empty
/// chunk so the validation is still recorded.
pub(crate) fn split_chunks(amount: i64, max_chunk: i64) -> Vec<i32> {
    if amount <= 0 {
        return vec![0];
    }
    let max_chunk = max_chunk.max(1);
    let mut chunks = Vec::with_capacity((amount / max_chunk + 1) as usize);
    let mut left = amount;
    while left > 0 {
        let chunk = left.min(max_chunk);
        chunks.push(chunk as i32);
        left -= chunk;
    }
    chunks
}

// ============================================================================
// TransactionEngine
// ============================================================================

/// Applies business rules to one card through its collaborators.
///
/// Every operation reads a fresh [`CardState`], checks its preconditions
/// in a fixed order (first failure wins) and only then opens a secure
/// session. Errors never escape: each operation returns a
/// [`TransactionResult`].
pub struct TransactionEngine<C, S, K> {
    card: C,
    sam: S,
    clock: K,
    config: EngineConfig,
}

impl<C, S, K> TransactionEngine<C, S, K>
where
    C: SecureCardSession,
    S: SamSession,
    K: Clock,
{
    pub fn new(card: C, sam: S, clock: K, config: EngineConfig) -> Self {
        Self {
            card,
            sam,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn card(&self) -> &C {
        &self.card
    }

    pub fn card_mut(&mut self) -> &mut C {
        &mut self.card
    }

    pub fn sam(&self) -> &S {
        &self.sam
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn into_parts(self) -> (C, S, K) {
        (self.card, self.sam, self.clock)
    }

    /// Unlock the SAM with the configured secret.
    pub fn unlock_sam(&mut self) -> Result<()> {
        let secret = self
            .config
            .sam_secret()
            .map_err(|e| ProtocolError::Sam(e.to_string()))?;
        self.sam.unlock(&secret)?;
        info!(sam_id = self.sam.sam_id(), "SAM unlocked");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Fresh snapshot of the card, reported as a consultation.
    pub fn read_card(&mut self, expected: &CardSerial) -> TransactionResult<CardState> {
        self.run("read_card", |engine| {
            let state = engine.load_state(expected)?;
            let message = format!(
                "card {} balance {}",
                state.serial,
                format_pesos(i64::from(state.balance))
            );
            Ok((state, message))
        })
    }

    /// Debit `amount` centavos against the contract in `contract_slot`.
    ///
    /// Amounts above the per-session limit are split into chunks, each its
    /// own secure session and event. If a later chunk fails the result is
    /// `Error`, its message names the committed amount and the payload
    /// carries the balance read back from the card.
    pub fn debit(
        &mut self,
        expected: &CardSerial,
        contract_slot: u8,
        amount: i64,
        location: u16,
        progress: Option<&mut dyn FnMut(Progress)>,
    ) -> TransactionResult<DebitOutcome> {
        let mut partial = None;
        let result = self.run("debit", |engine| {
            engine.debit_inner(expected, contract_slot, amount, location, progress, &mut partial)
        });
        match partial {
            Some(outcome) if !result.is_ok() => result.with_payload(outcome),
            _ => result,
        }
    }

    /// Load `amount` centavos, renewing the contract first when it is
    /// inside its renewal window.
    pub fn reload(
        &mut self,
        expected: &CardSerial,
        contract_slot: u8,
        amount: i64,
        location: u16,
    ) -> TransactionResult<ReloadOutcome> {
        self.run("reload", |engine| {
            check_amount(amount, -SV_LIMIT, SV_LIMIT)?;
            let state = engine.load_state(expected)?;
            let offset = engine.config.expiration_offset_days;
            engine.load_value(&state, contract_slot, amount, location, offset, TransactionType::Reload)
        })
    }

    /// Reset the contract period when it is expired under `days_offset`.
    /// A contract still valid is left untouched.
    pub fn renew(
        &mut self,
        expected: &CardSerial,
        contract_slot: u8,
        days_offset: i64,
        duration: Period,
    ) -> TransactionResult<Contract> {
        self.run("renew", |engine| {
            let state = engine.load_state(expected)?;
            require_enabled(&state)?;
            let contract = state.contracts.require(contract_slot)?.clone();
            if !contract.is_accepted() {
                return Err(ValidationError::ContractStatus(contract.status()).into());
            }
            engine.verify_authenticator(&contract)?;

            let today = engine.clock.today();
            if !contract.is_expired(days_offset, today) {
                let message = format!(
                    "no renewal needed, valid until {}",
                    contract.expiration_date(days_offset)
                );
                return Ok((contract, message));
            }

            let number = reserve_numbers(&state, 1)?;
            let renewed = engine.renewed(&contract, duration)?;
            let now = engine.clock.now();
            let mut event = engine.build_event(
                TransactionType::Renewal,
                number,
                0,
                now,
                0,
            );
            event.first_leg.contracts_used = renewed.slot_bit();
            let contract_bytes = renewed.pack()?;
            let event_bytes = event.pack()?;

            engine.exchange(AccessLevel::Load, |card| {
                card.update_record(FileId::Contract, renewed.slot, &contract_bytes)?;
                card.append_record(FileId::Event, &event_bytes)
            })?;
            engine.audit(slice::from_ref(&event), slice::from_ref(&event_bytes));

            let message = format!(
                "contract {} renewed until {}",
                renewed.slot,
                renewed.expiration_date(0)
            );
            Ok((renewed, message))
        })
    }

    /// Blacklist the card application.
    pub fn invalidate(&mut self, expected: &CardSerial, location: u16) -> TransactionResult<Event> {
        self.run("invalidate", |engine| {
            let state = engine.load_state(expected)?;
            require_enabled(&state)?;
            let number = reserve_numbers(&state, 1)?;

            let mut event = engine.build_event(
                TransactionType::Blacklist,
                number,
                location,
                engine.clock.now(),
                0,
            );
            engine.sign_event(&state, &mut event, state.balance)?;
            let event_bytes = event.pack()?;

            engine.exchange(AccessLevel::Debit, |card| {
                card.append_record(FileId::Event, &event_bytes)?;
                card.invalidate()
            })?;
            engine.audit(slice::from_ref(&event), slice::from_ref(&event_bytes));
            Ok((event, format!("card {} invalidated", state.serial)))
        })
    }

    /// Re-enable an invalidated card.
    pub fn rehabilitate(&mut self, expected: &CardSerial) -> TransactionResult<()> {
        self.run("rehabilitate", |engine| {
            let state = engine.load_state(expected)?;
            if state.enabled {
                return Err(ValidationError::CardAlreadyEnabled.into());
            }
            engine.exchange(AccessLevel::Personalization, |card| card.rehabilitate())?;
            Ok(((), format!("card {} rehabilitated", state.serial)))
        })
    }

    /// Zero the purse. The large renewal offset forces the contract to be
    /// renewed in the same session.
    pub fn cancel_balance(
        &mut self,
        expected: &CardSerial,
        contract_slot: u8,
        location: u16,
    ) -> TransactionResult<ReloadOutcome> {
        self.run("cancel_balance", |engine| {
            let state = engine.load_state(expected)?;
            let amount = -i64::from(state.balance);
            let offset = engine.config.cancellation_renewal_offset_days;
            engine.load_value(
                &state,
                contract_slot,
                amount,
                location,
                offset,
                TransactionType::BalanceCancellation,
            )
        })
    }

    /// Sell a contract: reuse the first accepted one or create slot 1 from
    /// the configured product profile, then stamp the sale's provider,
    /// modality, tariff and restrict time on it.
    pub fn purchase(&mut self, expected: &CardSerial, sale: SaleRequest) -> TransactionResult<SaleOutcome> {
        self.run("purchase", |engine| {
            check_amount(sale.amount, 0, SV_LIMIT)?;
            let state = engine.load_state(expected)?;
            require_enabled(&state)?;
            check_max_balance(state.balance, sale.amount, engine.config.max_balance)?;
            let number = reserve_numbers(&state, 1)?;

            let today = engine.clock.today();
            let now = engine.clock.now();
            let base = match state.contracts.first_valid() {
                Ok(contract) => contract.clone(),
                Err(_) => engine.contract_from_profile(),
            };

            let mut contract = base;
            contract.provider = sale.provider;
            contract.modality.set(sale.modality);
            contract.tariff = sale.tariff;
            contract.restrict_time = sale.restrict_time;
            contract.set_period(engine.config.profile.validity)?;
            contract.start_date = ReverseDate::from_date(today);
            contract.status.set(ContractStatus::PartlyUsed);
            contract.sale_date = DateTimeReal::from_datetime(now).date();
            contract.sale_sam = engine.sam.sam_id();
            contract.sale_counter = engine.sam.next_sale_counter()?;
            contract.authenticator = engine.sam.sign_contract(&contract.signed_region()?)?;

            let mut event = engine.build_event(
                TransactionType::Purchase,
                number,
                sale.location,
                now,
                sale.amount as i32,
            );
            event.first_leg.contracts_used = contract.slot_bit();
            engine.sign_event(&state, &mut event, state.balance)?;

            let contract_bytes = contract.pack()?;
            let event_bytes = event.pack()?;
            let stamp = event.timestamp;
            let amount = sale.amount as i32;

            let content = contract.content()?;
            debug!(slot = contract.slot, %content, "writing sold contract");
            engine.exchange(AccessLevel::Personalization, |card| {
                card.update_record(FileId::Contract, contract.slot, &contract_bytes)?;
                if amount > 0 {
                    card.sv_reload(amount, stamp.date(), stamp.time(), sale.location.to_be_bytes())?;
                }
                card.append_record(FileId::Event, &event_bytes)
            })?;

            let balance = engine.reconcile(state.balance + amount);
            engine.audit(slice::from_ref(&event), slice::from_ref(&event_bytes));
            let message = format!(
                "contract {} sold, valid until {}, balance {}",
                contract.slot,
                contract.expiration_date(0),
                format_pesos(i64::from(balance))
            );
            Ok((
                SaleOutcome {
                    contract,
                    balance,
                    event,
                },
                message,
            ))
        })
    }

    // ------------------------------------------------------------------------
    // Operation bodies
    // ------------------------------------------------------------------------

    fn debit_inner(
        &mut self,
        expected: &CardSerial,
        contract_slot: u8,
        amount: i64,
        location: u16,
        progress: Option<&mut dyn FnMut(Progress)>,
        partial: &mut Option<DebitOutcome>,
    ) -> Result<(DebitOutcome, String)> {
        let mut reporter = Reporter::new(progress);

        check_amount(amount, 0, SV_LIMIT)?;
        let state = self.load_state(expected)?;
        require_enabled(&state)?;
        let contract = state.contracts.require(contract_slot)?.clone();
        match contract.status() {
            ContractStatus::PartlyUsed | ContractStatus::ToBeRenewed => {}
            other => return Err(ValidationError::ContractStatus(other).into()),
        }
        self.verify_authenticator(&contract)?;
        if i64::from(state.balance) - amount < 0 {
            return Err(ValidationError::InsufficientBalance {
                balance: state.balance,
                requested: amount,
            }
            .into());
        }
        let offset = self.config.expiration_offset_days;
        if contract.is_expired(offset, self.clock.today()) {
            return Err(ValidationError::ContractExpired(contract.expiration_date(offset).to_string()).into());
        }
        let now = self.clock.now();
        self.check_passback(&state, location, now)?;

        let chunks = split_chunks(amount, i64::from(self.config.max_debit_chunk));
        let total = chunks.len();
        let mut transaction_number = reserve_numbers(&state, total)?;
        let (kind, first_leg) = self.journey_leg(&state, &contract, location, now);
        reporter.report(
            0,
            format!("debiting {} in {} chunk(s)", format_pesos(amount), total),
        );

        let mut outcome = DebitOutcome {
            balance: state.balance,
            debited: 0,
            chunks: 0,
            events: Vec::with_capacity(total),
        };

        for (index, chunk) in chunks.into_iter().enumerate() {
            let step = self.debit_chunk(
                &state,
                kind,
                first_leg,
                chunk,
                location,
                transaction_number,
                outcome.balance,
            );
            match step {
                Ok((event, balance)) => {
                    outcome.balance = balance;
                    outcome.debited += i64::from(chunk);
                    outcome.chunks += 1;
                    outcome.events.push(event);
                    transaction_number += 1;
                    reporter.report(
                        ((index + 1) * 100 / total) as u8,
                        format!("chunk {}/{}: {}", index + 1, total, format_pesos(i64::from(chunk))),
                    );
                }
                Err(source) => {
                    // The failed session was aborted; trust the card for the balance.
                    if let Ok(sv) = self.card.sv_get() {
                        outcome.balance = sv.balance;
                    }
                    let completed = outcome.debited;
                    *partial = Some(outcome);
                    if completed == 0 {
                        return Err(source);
                    }
                    return Err(TransactionError::Interrupted {
                        completed,
                        requested: amount,
                        source: Box::new(source),
                    });
                }
            }
        }

        reporter.report(100, "debit complete");
        let message = format!(
            "debited {} from contract {}, balance {}",
            format_pesos(outcome.debited),
            contract_slot,
            format_pesos(i64::from(outcome.balance))
        );
        Ok((outcome, message))
    }

    /// One secure session: SV debit plus its event.
    #[allow(clippy::too_many_arguments)]
    fn debit_chunk(
        &mut self,
        state: &CardState,
        kind: TransactionType,
        first_leg: FirstLeg,
        amount: i32,
        location: u16,
        transaction_number: u32,
        prior_balance: i32,
    ) -> Result<(Event, i32)> {
        let now = self.clock.now();
        let mut event = self.build_event(kind, transaction_number, location, now, amount);
        event.first_leg = first_leg;
        self.sign_event(state, &mut event, prior_balance)?;
        let event_bytes = event.pack()?;
        let stamp = event.timestamp;

        self.exchange(AccessLevel::Debit, |card| {
            card.sv_debit(amount, stamp.date(), stamp.time())?;
            card.append_record(FileId::Event, &event_bytes)
        })?;

        let balance = self.reconcile(prior_balance - amount);
        self.audit(slice::from_ref(&event), slice::from_ref(&event_bytes));
        debug!(transaction_number, amount, balance, "debit chunk committed");
        Ok((event, balance))
    }

    /// Shared body of reload and balance cancellation.
    fn load_value(
        &mut self,
        state: &CardState,
        contract_slot: u8,
        amount: i64,
        location: u16,
        renewal_offset: i64,
        kind: TransactionType,
    ) -> Result<(ReloadOutcome, String)> {
        require_enabled(state)?;
        let contract = state.contracts.require(contract_slot)?.clone();
        if contract.status() != ContractStatus::PartlyUsed {
            return Err(ValidationError::ContractStatus(contract.status()).into());
        }
        self.verify_authenticator(&contract)?;
        check_max_balance(state.balance, amount, self.config.max_balance)?;

        let now = self.clock.now();
        let needs_renewal = contract.is_expired(renewal_offset, now.date());
        let mut transaction_number = reserve_numbers(state, 1 + usize::from(needs_renewal))?;
        let mut events = Vec::with_capacity(2);

        let renewed = if needs_renewal {
            let renewed = self.renewed(&contract, contract.period())?;
            let mut event = self.build_event(TransactionType::Renewal, transaction_number, location, now, 0);
            event.first_leg.contracts_used = renewed.slot_bit();
            transaction_number += 1;
            events.push(event);
            Some(renewed)
        } else {
            None
        };

        let value = amount as i32;
        let mut event = self.build_event(kind, transaction_number, location, now, value);
        event.first_leg.contracts_used = contract.slot_bit();
        self.sign_event(state, &mut event, state.balance)?;
        events.push(event);

        let contract_bytes = match &renewed {
            Some(c) => Some(c.pack()?),
            None => None,
        };
        let event_bytes = events.iter().map(|e| e.pack()).collect::<std::result::Result<Vec<_>, _>>()?;
        let stamp = DateTimeReal::from_datetime(now);

        self.exchange(AccessLevel::Load, |card| {
            if let Some(bytes) = &contract_bytes {
                card.update_record(FileId::Contract, contract_slot, bytes)?;
            }
            card.sv_reload(value, stamp.date(), stamp.time(), location.to_be_bytes())?;
            for bytes in &event_bytes {
                card.append_record(FileId::Event, bytes)?;
            }
            Ok(())
        })?;

        let balance = self.reconcile(state.balance + value);
        self.audit(&events, &event_bytes);
        let message = match &renewed {
            Some(c) => format!(
                "loaded {}, contract {} renewed until {}, balance {}",
                format_pesos(amount),
                c.slot,
                c.expiration_date(0),
                format_pesos(i64::from(balance))
            ),
            None => format!(
                "loaded {}, balance {}",
                format_pesos(amount),
                format_pesos(i64::from(balance))
            ),
        };
        Ok((
            ReloadOutcome {
                balance,
                renewed,
                events,
            },
            message,
        ))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Time `body`, log its outcome and fold any error into the result.
    fn run<T, F>(&mut self, operation: &'static str, body: F) -> TransactionResult<T>
    where
        F: FnOnce(&mut Self) -> Result<(T, String)>,
    {
        let span = info_span!("transaction", operation);
        let _guard = span.enter();
        let started = Instant::now();

        match body(self) {
            Ok((payload, message)) => {
                let elapsed = started.elapsed();
                info!(elapsed_ms = elapsed.as_millis() as u64, %message, "completed");
                TransactionResult::ok(payload, message, elapsed)
            }
            Err(err) => {
                let elapsed = started.elapsed();
                match err.status() {
                    Status::Aborted => warn!(reason = %err, "aborted"),
                    _ => error!(error = %err, "failed"),
                }
                TransactionResult::from_error(&err, elapsed)
            }
        }
    }

    /// Fresh card state, rejected when the serial is not the expected one.
    fn load_state(&mut self, expected: &CardSerial) -> Result<CardState> {
        let state = CardState::read(&mut self.card)?;
        if state.serial != *expected {
            return Err(ValidationError::CardMismatch {
                expected: expected.to_hex(),
                actual: state.serial.to_hex(),
            }
            .into());
        }
        Ok(state)
    }

    /// Run `commands` inside one secure session. Any failure aborts the
    /// session so nothing is committed.
    fn exchange<F>(&mut self, level: AccessLevel, commands: F) -> Result<()>
    where
        F: FnOnce(&mut C) -> std::result::Result<(), ProtocolError>,
    {
        self.card.open(level)?;
        let outcome = commands(&mut self.card).and_then(|()| self.card.close(CloseMode::KeepOpen));
        if let Err(err) = outcome {
            self.card.abort();
            return Err(err.into());
        }
        Ok(())
    }

    /// Balance after a committed session. The card value wins; when it
    /// cannot be read back the computed value stands in.
    fn reconcile(&mut self, expected: i32) -> i32 {
        match self.card.sv_get() {
            Ok(sv) => {
                if sv.balance != expected {
                    warn!(expected, actual = sv.balance, "card balance differs from computed balance");
                }
                sv.balance
            }
            Err(err) => {
                warn!(expected, error = %err, "balance read-back failed after commit");
                expected
            }
        }
    }

    /// Log committed events, at info level for kinds the back office
    /// receives.
    fn audit(&self, events: &[Event], bytes: &[Vec<u8>]) {
        for (event, raw) in events.iter().zip(bytes) {
            let kind = event.kind();
            let content = hex::encode_upper(raw);
            if kind.is_reported() {
                info!(
                    transaction_number = event.transaction_number,
                    kind = ?kind,
                    amount = event.amount,
                    %content,
                    "event reported"
                );
            } else {
                debug!(transaction_number = event.transaction_number, kind = ?kind, %content, "event written");
            }
        }
    }

    fn build_event(
        &self,
        kind: TransactionType,
        transaction_number: u32,
        location: u16,
        at: NaiveDateTime,
        amount: i32,
    ) -> Event {
        let mut event = Event::new(1);
        event.version = self.config.event_version;
        event.transaction_number = transaction_number;
        event.transaction_type.set(kind);
        event.network = self.config.terminal.network;
        event.provider = self.config.terminal.provider;
        event.location = location;
        event.timestamp = DateTimeReal::from_datetime(at);
        event.amount = amount;
        event
    }

    /// Put the SAM MAC in the event free data for signed kinds.
    fn sign_event(&mut self, state: &CardState, event: &mut Event, prior_balance: i32) -> Result<()> {
        let kind = event.kind();
        if !kind.is_signed() {
            return Ok(());
        }
        let mac = self.sam.compute_mac(&SignedFields {
            event_type: kind.wire() as u8,
            timestamp: event.timestamp,
            amount: event.amount,
            location: event.location,
            card_type: state.card_type,
            card_serial: state.serial,
            prior_balance,
            provider: event.provider,
        })?;
        event.free_data = u32::from_be_bytes(mac);
        Ok(())
    }

    fn verify_authenticator(&mut self, contract: &Contract) -> Result<()> {
        if !self.config.verify_contract_authenticator {
            return Ok(());
        }
        let region = contract.signed_region()?;
        if self.sam.verify_contract(&region, contract.authenticator)? {
            Ok(())
        } else {
            Err(ValidationError::ContractAuthenticator(contract.slot).into())
        }
    }

    /// Copy of `contract` restarted today for `period`, re-signed.
    fn renewed(&mut self, contract: &Contract, period: Period) -> Result<Contract> {
        let mut renewed = contract.clone();
        renewed.set_period(period)?;
        renewed.start_date = ReverseDate::from_date(self.clock.today());
        renewed.status.set(ContractStatus::PartlyUsed);
        renewed.authenticator = self.sam.sign_contract(&renewed.signed_region()?)?;
        Ok(renewed)
    }

    fn contract_from_profile(&self) -> Contract {
        let profile = &self.config.profile;
        let mut contract = Contract::new(1);
        contract.version = profile.version;
        contract.network = profile.network;
        contract.provider = profile.provider;
        contract.modality.set(profile.modality);
        contract.counter_code = profile.counter_code;
        contract.tariff = profile.tariff;
        contract.vehicle_class = profile.vehicle_class;
        contract.restrict_time = profile.restrict_time;
        contract.restrict_code = profile.restrict_code;
        contract.period_journeys = profile.period_journeys;
        contract.location = profile.location;
        contract.kvc = profile.kvc;
        contract
    }

    fn check_passback(&self, state: &CardState, location: u16, now: NaiveDateTime) -> Result<()> {
        let window = self.config.passback_seconds;
        if window == 0 {
            return Ok(());
        }
        if let Some(last) = state.events.last() {
            let is_debit = matches!(
                last.kind(),
                TransactionType::Debit | TransactionType::InterchangeDebit
            );
            let elapsed = DateTimeReal::from_datetime(now).seconds_since(last.timestamp);
            if is_debit && last.location == location && elapsed < window {
                return Err(ValidationError::Passback {
                    location,
                    elapsed_secs: elapsed,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Event kind and first-leg data for a debit at `location`.
    ///
    /// A debit within the interchange window of a debit elsewhere continues
    /// that journey; any other debit starts a new one.
    fn journey_leg(
        &self,
        state: &CardState,
        contract: &Contract,
        location: u16,
        now: NaiveDateTime,
    ) -> (TransactionType, FirstLeg) {
        let stamp = DateTimeReal::from_datetime(now);
        let fresh = FirstLeg {
            provider: self.config.terminal.provider,
            location,
            timestamp: stamp,
            passenger: 1,
            contracts_used: contract.slot_bit(),
        };

        let window = u32::from(self.config.interchange_window_minutes) * 60;
        if window == 0 || !contract.journey_interchange {
            return (TransactionType::Debit, fresh);
        }
        let Some(last) = state.events.last() else {
            return (TransactionType::Debit, fresh);
        };
        let within = stamp.seconds_since(last.timestamp) <= window;
        match last.kind() {
            TransactionType::Debit | TransactionType::InterchangeDebit
                if within && last.location != location =>
            {
                let mut leg = if last.first_leg.is_empty() {
                    FirstLeg {
                        provider: last.provider,
                        location: last.location,
                        timestamp: last.timestamp,
                        passenger: 1,
                        contracts_used: 0,
                    }
                } else {
                    last.first_leg
                };
                leg.contracts_used |= contract.slot_bit();
                (TransactionType::InterchangeDebit, leg)
            }
            _ => (TransactionType::Debit, fresh),
        }
    }
}

// ============================================================================
// Precondition checks
// ============================================================================

fn require_enabled(state: &CardState) -> Result<()> {
    if state.enabled {
        Ok(())
    } else {
        Err(ValidationError::CardDisabled.into())
    }
}

/// First transaction number of `count` new events, refused when the
/// counter would pass its 24-bit limit.
fn reserve_numbers(state: &CardState, count: usize) -> Result<u32> {
    if (state.events.numbers_left() as usize) < count {
        let last = state.events.last().map_or(0, |e| e.transaction_number);
        return Err(ValidationError::TransactionCounterExhausted { last }.into());
    }
    Ok(state.events.next_transaction_number())
}

fn check_amount(amount: i64, min: i64, max: i64) -> Result<()> {
    if (min..=max).contains(&amount) {
        Ok(())
    } else {
        Err(ValidationError::AmountOutOfRange { amount, min, max }.into())
    }
}

fn check_max_balance(balance: i32, amount: i64, max: i32) -> Result<()> {
    let after = i64::from(balance) + amount;
    if after > i64::from(max) {
        return Err(ValidationError::MaxBalanceExceeded {
            balance,
            amount,
            max,
        }
        .into());
    }
    if after < 0 {
        return Err(ValidationError::InsufficientBalance {
            balance,
            requested: -amount,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chunks() {
        assert_eq!(split_chunks(40_000, 32_767), vec![32_767, 7_233]);
        assert_eq!(split_chunks(32_767, 32_767), vec![32_767]);
        assert_eq!(split_chunks(65_535, 32_767), vec![32_767, 32_767, 1]);
        assert_eq!(split_chunks(0, 32_767), vec![0]);
        assert_eq!(split_chunks(5, 0), vec![1; 5]);
    }

    #[test]
    fn test_sale_request_from_profile() {
        let profile = ProductProfile {
            provider: 4,
            modality: Modality::Multimodal,
            tariff: 0x0301,
            restrict_time: 2,
            ..ProductProfile::default()
        };
        let sale = SaleRequest::from_profile(&profile, 1_000, 12);
        assert_eq!(sale.amount, 1_000);
        assert_eq!(sale.location, 12);
        assert_eq!(sale.provider, 4);
        assert_eq!(sale.modality, Modality::Multimodal);
        assert_eq!(sale.tariff, 0x0301);
        assert_eq!(sale.restrict_time, 2);
        assert_eq!(SaleRequest::default().tariff, ProductProfile::default().tariff);
    }

    #[test]
    fn test_check_amount() {
        assert!(check_amount(0, 0, 10).is_ok());
        assert!(check_amount(10, 0, 10).is_ok());
        assert!(matches!(
            check_amount(-1, 0, 10),
            Err(TransactionError::Validation(ValidationError::AmountOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_check_max_balance() {
        assert!(check_max_balance(100, 400, 500).is_ok());
        assert!(matches!(
            check_max_balance(100, 401, 500),
            Err(TransactionError::Validation(ValidationError::MaxBalanceExceeded { .. }))
        ));
        assert!(check_max_balance(100, -100, 500).is_ok());
        assert!(matches!(
            check_max_balance(100, -101, 500),
            Err(TransactionError::Validation(ValidationError::InsufficientBalance { .. }))
        ));
    }
}
