//! attest - offline verifiers for forensic evidence
//!
//! Every subcommand prints exactly one machine-readable line to stderr and
//! exits 0 on success, 1 on any failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// attest - offline verifiers for forensic evidence
#[derive(Parser, Debug)]
#[command(name = "attest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Re-check a sealed incident bundle archive
    VerifyBundle {
        /// Path to the bundle archive (tar.gz)
        path: PathBuf,

        /// MAC key as 64 hex characters
        #[arg(long)]
        key: String,
    },

    /// Verify a chain file against a key
    VerifyLog {
        /// Path to the wire-format chain file
        path: PathBuf,

        /// MAC key as 64 hex characters
        #[arg(long)]
        key: String,
    },

    /// Run the rate limiter's property self-test
    RateVerify,

    /// Run the diff engine's invertibility stress test
    VersionVerify,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::VerifyBundle { path, key } => commands::bundle::verify(&path, &key),
        Commands::VerifyLog { path, key } => commands::chain::verify(&path, &key),
        Commands::RateVerify => commands::selftest::rate(),
        Commands::VersionVerify => commands::selftest::versions(),
    }
}
