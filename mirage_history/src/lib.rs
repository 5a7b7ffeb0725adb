#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Persistent per-identity conversation transcripts with sliding expiry.

mod store;
mod sweep;

pub use mirage_core::HistoryStore;
pub use store::{DEFAULT_TTL, SqliteHistoryStore};
pub use sweep::spawn_expiry_sweep;
