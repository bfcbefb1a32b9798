//! In-memory collaborators.
//!
//! [`MemoryCard`] and [`MemorySam`] implement the session traits without
//! hardware. The demo binary, integration tests and benchmarks run the
//! engine against them.

mod card;
mod sam;

pub use card::{MemoryCard, SV_DEBIT_LIMIT};
pub use sam::MemorySam;
