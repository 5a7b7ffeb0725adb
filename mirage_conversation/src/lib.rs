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

//! The model-facing side of a honeypot shell.
//!
//! A `ConversationEngine` owns one identity's transcript: it seeds the
//! behavioral contract on first contact, re-asserts it before every command,
//! cleans whatever the provider returns and persists each exchange so the
//! illusion of a stateful machine survives reconnects.

mod cleanup;
mod engine;
mod factory;
mod prompt;
mod session;

pub use cleanup::clean_response;
pub use engine::{ConversationEngine, ConversationError, EngineSettings};
pub use factory::ConversationFactory;
pub use prompt::{DEFAULT_TEMPLATE, default_prompt, exemplar, render_system_prompt};
pub use session::ConversationSession;
