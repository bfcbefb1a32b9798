//! CDMX card - demo binary
//!
//! Runs a sale, a reload and a chunked debit against the in-memory card
//! and SAM, logging each step. Set `RUST_LOG=debug` to see record content.
//!
//! An optional first argument names a JSON engine config.

use std::env;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cdmx_card::clock::SystemClock;
use cdmx_card::codec::amount::format_pesos;
use cdmx_card::engine::{Progress, SaleRequest, TransactionEngine, TransactionResult};
use cdmx_card::sim::{MemoryCard, MemorySam};
use cdmx_card::{CardSerial, EngineConfig};

const SAM_SECRET: &str = "c0ffee00";

fn report<T>(step: &str, result: &TransactionResult<T>) -> bool {
    if result.is_ok() {
        info!(step, elapsed_ms = result.elapsed_millis() as u64, "{}", result.message);
    } else {
        error!(step, status = %result.status, "{}", result.message);
    }
    result.is_ok()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match env::args().nth(1) {
        Some(path) => match EngineConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                error!(%path, error = %err, "cannot load config");
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig {
            sam_unlock_key: SAM_SECRET.into(),
            ..EngineConfig::default()
        },
    };

    let secret = match config.sam_secret() {
        Ok(secret) => secret,
        Err(err) => {
            error!(error = %err, "bad SAM secret");
            return ExitCode::FAILURE;
        }
    };

    let serial = CardSerial::from_u64(0x0000_0001_2345_6789);
    let card = MemoryCard::new(serial);
    let sam = MemorySam::new(0x5A5A_0001, secret);
    let mut engine = TransactionEngine::new(card, sam, SystemClock, config);

    if let Err(err) = engine.unlock_sam() {
        error!(error = %err, "SAM unlock failed");
        return ExitCode::FAILURE;
    }

    let request = SaleRequest::from_profile(&engine.config().profile, 5_000, 100);
    let sale = engine.purchase(&serial, request);
    if !report("purchase", &sale) {
        return ExitCode::FAILURE;
    }
    let slot = sale.payload.map_or(1, |s| s.contract.slot);

    let reload = engine.reload(&serial, slot, 45_000, 100);
    if !report("reload", &reload) {
        return ExitCode::FAILURE;
    }

    let mut on_progress = |p: Progress| info!(percent = p.percent, "{}", p.message);
    let debit = engine.debit(&serial, slot, 40_000, 205, Some(&mut on_progress));
    if !report("debit", &debit) {
        return ExitCode::FAILURE;
    }

    let read = engine.read_card(&serial);
    if let Some(state) = read.payload {
        info!(
            serial = %state.serial,
            balance = %format_pesos(i64::from(state.balance)),
            events = state.events.len(),
            "final card state"
        );
        for event in &state.events {
            info!(
                slot = event.slot,
                number = event.transaction_number,
                kind = ?event.kind(),
                amount = %format_pesos(i64::from(event.amount)),
                "event"
            );
        }
    }
    ExitCode::SUCCESS
}
