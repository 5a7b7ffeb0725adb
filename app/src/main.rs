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

mod command;

use clap::{Parser, Subcommand};
use command::{CommandStrategy, InitStrategy, ServeInput, ServeStrategy, VersionStrategy};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "mirage")]
#[command(about = "LLM-backed SSH honeypot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the SSH honeypot
    Serve {
        /// Address to bind
        #[arg(short = 'a', long, default_value = "0.0.0.0")]
        address: String,

        /// Port to listen on
        #[arg(short = 'p', long, default_value_t = 2222)]
        port: u16,

        /// Config file (defaults to ~/mirage/config.json)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },
    /// Initialize configuration
    Init {
        /// Where to write the config file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            address,
            port,
            config,
        } => {
            ServeStrategy
                .execute(ServeInput {
                    address,
                    port,
                    config,
                })
                .await
        }
        Commands::Init { config } => InitStrategy.execute(config).await,
        Commands::Version => VersionStrategy.execute(()).await,
    }
}
