//! Static strategy pattern for CLI commands.
//!
//! Each subcommand is its own zero-sized strategy type with a typed input,
//! dispatched statically from `main`.

mod init;
mod serve;
mod version;

pub use init::InitStrategy;
pub use serve::{ServeInput, ServeStrategy};
pub use version::VersionStrategy;

/// Contract shared by every command strategy.
pub trait CommandStrategy: Send + Sync + 'static {
    /// What the command needs from the command line.
    type Input;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()>;
}
