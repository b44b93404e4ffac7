//! Bundle assembly and fail-closed validation.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::chain::{ChainVerifyError, LogEntry, LogLevel, verify_slice, verify_sparse_slice};
use crate::clock::{Clock, Window};
use crate::config::CoreConfig;
use crate::crypto::{CryptoProvider, Digest, digest_eq};
use crate::diff::{VersionLog, apply};

use super::canonical::compute_seal;
use super::model::{GENESIS_SNAPSHOT_ID, IncidentBundle, SCHEMA_VERSION, StateSnapshot};

/// One day of nanoseconds; the size budget scales linearly past it.
const DAY_NS: u64 = 24 * 60 * 60 * 1_000_000_000;

/// Assembly and validation failures.
///
/// The first failing check is surfaced; no variant is converted into
/// another.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BundleError {
    /// The log slice did not verify; assembly aborted.
    #[error("log slice invalid: {0}")]
    ChainInvalid(#[from] ChainVerifyError),

    /// The content size exceeds the window's budget even after trimming.
    #[error("bundle size {actual} exceeds budget of {max} bytes")]
    Size {
        /// Content size in bytes.
        actual: u64,
        /// The budget for this window.
        max: u64,
    },

    /// The seal does not recompute over the canonical serialization.
    #[error("seal does not match canonical serialization")]
    InvalidSeal,

    /// The window is inconsistent with the bundle's contents.
    #[error("invalid window: {reason}")]
    InvalidWindow {
        /// What fell outside the window.
        reason: String,
    },

    /// The schema version is not the one this implementation writes.
    #[error("unsupported schema version {found:?}, expected {SCHEMA_VERSION:?}")]
    InvalidSchema {
        /// The version the bundle declares, if any.
        found: String,
    },

    /// The diff records do not replay onto the final snapshot.
    #[error("diff replay diverged at version {version_id}: {reason}")]
    ReplayDiverged {
        /// The record that failed to replay.
        version_id: String,
        /// What went wrong.
        reason: String,
    },
}

/// Assembles and validates sealed incident bundles.
///
/// The assembler is a session object: crypto, clock, and configuration are
/// injected at construction and shared by every bundle it produces.
/// Assembly is single-threaded per bundle; distinct assemblers (or calls)
/// may run concurrently.
pub struct BundleAssembler {
    crypto: Arc<dyn CryptoProvider>,
    clock: Arc<dyn Clock>,
    config: CoreConfig,
}

impl BundleAssembler {
    /// Creates an assembler.
    #[must_use]
    pub fn new(crypto: Arc<dyn CryptoProvider>, clock: Arc<dyn Clock>, config: CoreConfig) -> Self {
        Self {
            crypto,
            clock,
            config,
        }
    }

    /// The content-size budget for `window`: `bundle_max_bytes` up to 24
    /// hours, scaling linearly for longer windows.
    #[must_use]
    pub fn size_budget(&self, window: Window) -> u64 {
        let days = window.duration_ns().div_ceil(DAY_NS).max(1);
        self.config.bundle_max_bytes.saturating_mul(days)
    }

    /// Builds a sealed bundle over `window`.
    ///
    /// Slices `log_chain` to the window and verifies the slice, collects
    /// the anchoring snapshot and in-window diff records from
    /// `version_log`, builds the metadata map, and seals the canonical
    /// serialization. When the content size exceeds the budget, DEBUG and
    /// TRACE entries are dropped from the slice first; if still over, the
    /// build fails with [`BundleError::Size`].
    ///
    /// `admission_digest` optionally embeds the rate limiter's rolling
    /// decision digest into the metadata.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::ChainInvalid`] when the slice does not
    /// verify, or [`BundleError::Size`] when the trimmed bundle still
    /// exceeds the budget.
    pub fn build(
        &self,
        window: Window,
        log_chain: &[LogEntry],
        version_log: &VersionLog,
        admission_digest: Option<Digest>,
    ) -> Result<IncidentBundle, BundleError> {
        let logs: Vec<LogEntry> = log_chain
            .iter()
            .filter(|e| window.contains(e.timestamp_ns))
            .cloned()
            .collect();
        verify_slice(&logs, &self.config.mac_key, self.crypto.as_ref())?;

        let (anchor_id, anchor_state) = version_log.state_before(window.start_ns);
        let diffs = version_log.records_in(window);

        let mut snapshots = vec![StateSnapshot {
            version_id: anchor_id.unwrap_or_else(|| GENESIS_SNAPSHOT_ID.to_owned()),
            state: anchor_state.clone(),
        }];
        if let Some(last) = diffs.last() {
            let mut replayed = anchor_state;
            for record in &diffs {
                replayed = apply(&replayed, &record.diff)
                    .expect("in-window records replay over the anchoring snapshot");
            }
            snapshots.push(StateSnapshot {
                version_id: last.version_id.clone(),
                state: replayed,
            });
        }

        let mut bundle = IncidentBundle {
            id: Uuid::new_v4().to_string(),
            created_at_ns: self.clock.now_wall_ns(),
            window,
            logs,
            snapshots,
            diffs,
            metadata: BTreeMap::new(),
            size_bytes: 0,
            seal: [0u8; 32],
        };

        // Trim DEBUG/TRACE before giving up on the budget.
        let budget = self.size_budget(window);
        bundle.size_bytes = self.finish_metadata(&mut bundle, admission_digest);
        if bundle.size_bytes > budget {
            let before = bundle.logs.len();
            bundle.logs.retain(|e| e.level > LogLevel::Debug);
            tracing::warn!(
                dropped = before - bundle.logs.len(),
                budget,
                "bundle over budget, dropped DEBUG/TRACE entries"
            );
            bundle.size_bytes = self.finish_metadata(&mut bundle, admission_digest);
            if bundle.size_bytes > budget {
                return Err(BundleError::Size {
                    actual: bundle.size_bytes,
                    max: budget,
                });
            }
        }

        bundle.seal = compute_seal(&bundle, self.crypto.as_ref());
        tracing::info!(
            id = %bundle.id,
            entries = bundle.logs.len(),
            diffs = bundle.diffs.len(),
            size_bytes = bundle.size_bytes,
            "bundle sealed"
        );
        Ok(bundle)
    }

    /// Re-checks a bundle: schema, window, chain slice, seal, size.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`BundleError`]; a valid bundle returns
    /// `Ok(())`.
    pub fn validate(&self, bundle: &IncidentBundle) -> Result<(), BundleError> {
        validate_with(
            bundle,
            self.crypto.as_ref(),
            &self.config,
            self.size_budget(bundle.window),
        )
    }

    /// Rebuilds the metadata map and returns the resulting content size.
    fn finish_metadata(&self, bundle: &mut IncidentBundle, admission_digest: Option<Digest>) -> u64 {
        let mut metadata = BTreeMap::new();
        metadata.insert("schema_version".to_owned(), SCHEMA_VERSION.to_owned());
        metadata.insert("entry_count".to_owned(), bundle.logs.len().to_string());
        metadata.insert("diff_count".to_owned(), bundle.diffs.len().to_string());
        metadata.insert(
            "snapshot_count".to_owned(),
            bundle.snapshots.len().to_string(),
        );
        metadata.insert(
            "first_counter".to_owned(),
            bundle.logs.first().map_or(0, |e| e.counter).to_string(),
        );
        metadata.insert(
            "last_counter".to_owned(),
            bundle.logs.last().map_or(0, |e| e.counter).to_string(),
        );
        if let Some(digest) = admission_digest {
            metadata.insert("admission_digest".to_owned(), hex::encode(digest));
        }
        bundle.metadata = metadata;
        bundle.content_size_bytes()
    }
}

/// Validation shared by the assembler and the offline verifier.
pub(super) fn validate_with(
    bundle: &IncidentBundle,
    crypto: &dyn CryptoProvider,
    config: &CoreConfig,
    budget: u64,
) -> Result<(), BundleError> {
    // Schema first: nothing else is meaningful on a foreign format.
    match bundle.metadata.get("schema_version") {
        Some(v) if v == SCHEMA_VERSION => {}
        other => {
            return Err(BundleError::InvalidSchema {
                found: other.cloned().unwrap_or_default(),
            });
        }
    }

    // Deserialized windows bypass the constructor, so well-formedness is
    // re-checked here.
    if bundle.window.end_ns < bundle.window.start_ns {
        return Err(BundleError::InvalidWindow {
            reason: "window end precedes start".to_owned(),
        });
    }

    for entry in &bundle.logs {
        if !bundle.window.contains(entry.timestamp_ns) {
            return Err(BundleError::InvalidWindow {
                reason: format!("log entry {} outside window", entry.counter),
            });
        }
    }
    for record in &bundle.diffs {
        if !bundle.window.contains(record.committed_at_ns) {
            return Err(BundleError::InvalidWindow {
                reason: format!("diff {} outside window", record.version_id),
            });
        }
    }

    // The slice may have been trimmed by the size budget, so sparse
    // verification applies: every entry authenticates under the key and
    // ordering still holds.
    verify_sparse_slice(&bundle.logs, &config.mac_key, crypto)?;

    // Replay the in-window diffs over the anchoring snapshot and check
    // each recorded post-state hash; the final snapshot must match.
    if let Some(anchor) = bundle.snapshots.first() {
        let mut state = anchor.state.clone();
        for record in &bundle.diffs {
            state = apply(&state, &record.diff).map_err(|err| BundleError::ReplayDiverged {
                version_id: record.version_id.clone(),
                reason: err.to_string(),
            })?;
            let hash = hex::encode(state.content_hash(crypto));
            if hash != record.state_hash {
                return Err(BundleError::ReplayDiverged {
                    version_id: record.version_id.clone(),
                    reason: "post-state hash mismatch".to_owned(),
                });
            }
        }
        if let Some(last) = bundle.snapshots.last() {
            if bundle.snapshots.len() > 1 && last.state != state {
                return Err(BundleError::ReplayDiverged {
                    version_id: last.version_id.clone(),
                    reason: "final snapshot does not match replay".to_owned(),
                });
            }
        }
    }

    let seal = compute_seal(bundle, crypto);
    if !digest_eq(&seal, &bundle.seal) {
        return Err(BundleError::InvalidSeal);
    }

    let actual = bundle.content_size_bytes();
    if actual != bundle.size_bytes || actual > budget {
        return Err(BundleError::Size {
            actual,
            max: budget,
        });
    }

    Ok(())
}
