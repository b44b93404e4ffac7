//! Subcommand implementations.
//!
//! Each command emits a single structured line on stderr and maps its
//! outcome to the process exit code; there is no secondary output.

pub mod bundle;
pub mod chain;
pub mod selftest;

use std::process::ExitCode;

use serde_json::Value;

/// Prints the one machine-readable result line and picks the exit code.
pub(crate) fn report(line: &Value, ok: bool) -> ExitCode {
    eprintln!("{line}");
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
