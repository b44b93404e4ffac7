//! Offline verification of bundle archives.
//!
//! The verifier is a pure function over archive bytes and a key: it shares
//! no state with the writer-side components, re-reads everything from the
//! archive, and either returns the reconstructed bundle or the first
//! structured failure. Auditors run it on a machine that has never seen
//! the producing process.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::bundle::{ArchiveError, BundleAssembler, BundleError, IncidentBundle, read_archive};
use crate::clock::SystemClock;
use crate::config::CoreConfig;
use crate::crypto::{CryptoProvider, MacKey};


/// Why an archive failed offline verification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    /// The archive itself could not be read or decoded.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The reconstructed bundle failed validation.
    #[error(transparent)]
    Bundle(#[from] BundleError),
}

/// Reads the archive at `path` and re-checks it under `key`.
///
/// Runs the full fail-closed validation: schema, window, chain slice,
/// diff replay against the anchoring snapshot, seal, and size. Returns
/// the reconstructed bundle on success so callers can inspect it.
///
/// # Errors
///
/// Returns the first [`VerifyError`] encountered; nothing about the
/// archive is trusted before that point.
pub fn verify_archive(
    path: impl AsRef<Path>,
    key: MacKey,
    crypto: Arc<dyn CryptoProvider>,
) -> Result<IncidentBundle, VerifyError> {
    let config = CoreConfig::with_key(key);
    let bundle = read_archive(path, config.max_log_message_bytes)?;

    let assembler = BundleAssembler::new(crypto, Arc::new(SystemClock::new()), config);
    assembler.validate(&bundle)?;
    Ok(bundle)
}
