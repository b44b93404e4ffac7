//! # attest-core
//!
//! Core library for attest - machine-checkable forensic evidence from
//! runtime telemetry.
//!
//! This crate turns log events, admission decisions, and configuration
//! transitions into evidence an auditor can re-check offline, with three
//! cryptographic guarantees: logs cannot be silently tampered with,
//! rate-limit decisions provably enforce their declared budget, and
//! configuration rollbacks are exactly invertible.
//!
//! ## Components
//!
//! - **Log chain** ([`chain`]): append-only, MAC-chained entries with a
//!   constant-memory verifier
//! - **Rate limiter** ([`limiter`]): sharded sliding windows with zero
//!   false-negatives
//! - **Diff engine** ([`diff`]): invertible state transitions carrying
//!   their displaced content
//! - **Bundle assembler** ([`bundle`]): sealed, schema-versioned incident
//!   archives
//! - **Offline verifier** ([`verify`]): pure re-checking of any archive
//!   under a key
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use attest_core::chain::{ChainWriter, LogLevel, MemoryChainStore, verify_chain};
//! use attest_core::clock::SystemClock;
//! use attest_core::config::CoreConfig;
//! use attest_core::crypto::{HmacSha256Crypto, MacKey};
//!
//! let config = CoreConfig::with_key(MacKey::from_hex(&"00".repeat(32))?);
//! let crypto = Arc::new(HmacSha256Crypto::new());
//! let writer = ChainWriter::new(
//!     Box::new(MemoryChainStore::new()),
//!     crypto.clone(),
//!     Arc::new(SystemClock::new()),
//!     &config,
//! );
//!
//! writer.append(LogLevel::Info, "service started")?;
//! verify_chain(&writer.snapshot(), &config.mac_key, crypto.as_ref())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bundle;
pub mod chain;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod diff;
pub mod limiter;
pub mod verify;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bundle::{BundleAssembler, IncidentBundle};
    pub use crate::chain::{ChainWriter, LogEntry, LogLevel, verify_chain};
    pub use crate::clock::{Clock, SystemClock, Window};
    pub use crate::config::CoreConfig;
    pub use crate::crypto::{CryptoProvider, HmacSha256Crypto, MacKey};
    pub use crate::diff::{Diff, KeyedState, VersionLog};
    pub use crate::limiter::{Decision, SlidingWindowLimiter};
}

pub use bundle::{BundleAssembler, IncidentBundle};
pub use chain::{ChainWriter, LogEntry, LogLevel};
pub use config::CoreConfig;
pub use crypto::MacKey;
pub use limiter::SlidingWindowLimiter;
