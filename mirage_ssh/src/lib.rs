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

//! SSH front door: password gate, channel plumbing and the accept loop.

mod auth;
mod error;
mod handler;
mod host_key;
mod server;

pub use auth::AuthPolicy;
pub use error::{Error, Result};
pub use handler::ConnectionHandler;
pub use host_key::load_or_generate_host_key;
pub use server::HoneypotServer;
