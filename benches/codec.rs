//! Benchmarks for the record codec and the debit path.
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run one group
//! cargo bench -- record_codec
//! ```
//!
//! Results are saved to `target/criterion/` with HTML reports.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use std::time::Duration;

use chrono::NaiveDate;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use cdmx_card::clock::FixedClock;
use cdmx_card::config::EngineConfig;
use cdmx_card::engine::{SaleRequest, TransactionEngine};
use cdmx_card::records::{Contract, Environment, Event, Record, RECORD_SIZE};
use cdmx_card::session::CardSerial;
use cdmx_card::sim::{MemoryCard, MemorySam};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Deterministic random records (same seed = same bytes)
fn random_records(count: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut bytes = vec![0u8; RECORD_SIZE];
            rng.fill_bytes(&mut bytes);
            bytes
        })
        .collect()
}

/// Engine over a card that already holds a sold contract and a full purse
fn sold_card_engine() -> (TransactionEngine<MemoryCard, MemorySam, FixedClock>, CardSerial) {
    let serial = CardSerial::from_u64(0xBE7C);
    let now = NaiveDate::from_ymd_opt(2025, 6, 1)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .unwrap();
    let mut engine = TransactionEngine::new(
        MemoryCard::new(serial),
        MemorySam::unlocked(1),
        FixedClock::new(now),
        EngineConfig::default(),
    );
    let request = SaleRequest::from_profile(&engine.config().profile, 500_000, 1);
    let sale = engine.purchase(&serial, request);
    assert!(sale.is_ok(), "{}", sale.message);
    (engine, serial)
}

// ============================================================================
// BENCHMARK: Record codec
// ============================================================================

fn bench_record_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_codec");
    group.measurement_time(Duration::from_secs(5));

    let records = random_records(1_000, 7);
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("contract_unpack", |b| {
        b.iter(|| {
            for bytes in &records {
                black_box(Contract::unpack(1, black_box(bytes)).unwrap());
            }
        })
    });

    let contracts: Vec<Contract> = records
        .iter()
        .map(|bytes| Contract::unpack(1, bytes).unwrap())
        .collect();
    group.bench_function("contract_pack", |b| {
        b.iter(|| {
            for contract in &contracts {
                black_box(contract.pack().unwrap());
            }
        })
    });

    group.bench_function("event_unpack", |b| {
        b.iter(|| {
            for bytes in &records {
                black_box(Event::unpack(1, black_box(bytes)).unwrap());
            }
        })
    });

    group.bench_function("environment_roundtrip", |b| {
        b.iter(|| {
            for bytes in &records {
                let env = Environment::unpack(1, bytes).unwrap();
                black_box(env.pack().unwrap());
            }
        })
    });

    group.finish();
}

// ============================================================================
// BENCHMARK: Debit path
// ============================================================================
// Fresh card read, precondition checks, MAC, one or more sessions

fn bench_debit(c: &mut Criterion) {
    let mut group = c.benchmark_group("debit");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(200);

    for amount in [500i64, 40_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("amount", amount), &amount, |b, &amount| {
            b.iter_batched(
                sold_card_engine,
                |(mut engine, serial)| black_box(engine.debit(&serial, 1, amount, 9, None)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// CRITERION ENTRY POINT
// ============================================================================

criterion_group!(benches, bench_record_codec, bench_debit);

criterion_main!(benches);
