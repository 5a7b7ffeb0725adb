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

//! Raw-mode terminal emulation over a byte stream.
//!
//! [`LineEditor`] turns keystrokes into command lines and echo bytes;
//! [`ShellSession`] drives it over a channel, hands each line to a
//! [`mirage_core::CommandInterpreter`] and writes the answer back.

mod editor;
mod error;
mod exec;
mod session;

pub use editor::{ERASE, EditorState, KeyOutcome, LineEditor};
pub use error::{Result, ShellError};
pub use exec::run_exec;
pub use session::{DISCONNECT_NOTICE, ERROR_LINE, LOGOUT_NOTICE, ShellExit, ShellSession};
