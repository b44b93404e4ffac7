//! The administrator's versioned transition log.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::{Clock, Window};
use crate::crypto::CryptoProvider;

use super::op::{Diff, DiffError, apply, revert};
use super::state::KeyedState;

/// One committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Unique version identifier.
    pub version_id: String,

    /// The version this transition was applied on top of, `None` for the
    /// first commit.
    pub parent: Option<String>,

    /// Wall-clock nanoseconds at commit.
    pub committed_at_ns: u64,

    /// The transition itself, carrying its displaced content.
    pub diff: Diff,

    /// Lowercase hex SHA-256 of the post-state's canonical bytes.
    pub state_hash: String,
}

/// The single-writer log of configuration transitions.
///
/// All mutation is serialized through one mutex (the administrator actor);
/// readers receive cloned snapshots and never observe intermediate state.
pub struct VersionLog {
    inner: Mutex<Inner>,
    crypto: Arc<dyn CryptoProvider>,
    clock: Arc<dyn Clock>,
}

struct Inner {
    state: KeyedState,
    records: Vec<VersionRecord>,
    last_committed_ns: u64,
}

impl VersionLog {
    /// Creates a log over an empty initial state.
    #[must_use]
    pub fn new(crypto: Arc<dyn CryptoProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: KeyedState::new(),
                records: Vec::new(),
                last_committed_ns: 0,
            }),
            crypto,
            clock,
        }
    }

    /// Applies `diff` to the current state and records the transition.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError`] when the diff's precondition does not hold;
    /// the log and state are unchanged in that case.
    pub fn commit(&self, diff: Diff) -> Result<VersionRecord, DiffError> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let next = apply(&inner.state, &diff)?;

        // Clamp so commit times are non-decreasing even if the wall clock
        // steps backwards between commits.
        let committed_at_ns = self.clock.now_wall_ns().max(inner.last_committed_ns);
        let record = VersionRecord {
            version_id: Uuid::new_v4().to_string(),
            parent: inner.records.last().map(|r| r.version_id.clone()),
            committed_at_ns,
            diff,
            state_hash: hex::encode(next.content_hash(self.crypto.as_ref())),
        };

        inner.state = next;
        inner.last_committed_ns = committed_at_ns;
        inner.records.push(record.clone());
        tracing::debug!(version_id = %record.version_id, "transition committed");
        Ok(record)
    }

    /// Reverts the newest transition, removing its record.
    ///
    /// The resulting state is byte-identical to the state before that
    /// commit.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError`] when the log is empty or the revert
    /// precondition does not hold (which indicates the log and state have
    /// diverged).
    pub fn rollback_last(&self) -> Result<VersionRecord, RollbackError> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let record = inner.records.last().cloned().ok_or(RollbackError::Empty)?;
        let prev = revert(&inner.state, &record.diff)?;

        inner.state = prev;
        inner.records.pop();
        tracing::info!(version_id = %record.version_id, "transition rolled back");
        Ok(record)
    }

    /// Clones the current state.
    #[must_use]
    pub fn current_state(&self) -> KeyedState {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .state
            .clone()
    }

    /// Clones all committed records in commit order.
    #[must_use]
    pub fn records(&self) -> Vec<VersionRecord> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .records
            .clone()
    }

    /// Records whose commit time falls inside `window`.
    #[must_use]
    pub fn records_in(&self, window: Window) -> Vec<VersionRecord> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .records
            .iter()
            .filter(|r| window.contains(r.committed_at_ns))
            .cloned()
            .collect()
    }

    /// Reconstructs the state as of just before `timestamp_ns`, together
    /// with the id of the last version included (if any).
    ///
    /// Built by replaying records from the empty initial state; the replay
    /// cannot fail for records this log produced.
    #[must_use]
    pub fn state_before(&self, timestamp_ns: u64) -> (Option<String>, KeyedState) {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut state = KeyedState::new();
        let mut version_id = None;
        for record in &inner.records {
            if record.committed_at_ns >= timestamp_ns {
                break;
            }
            state = apply(&state, &record.diff)
                .expect("log records replay over their own history");
            version_id = Some(record.version_id.clone());
        }
        (version_id, state)
    }
}

/// Errors from [`VersionLog::rollback_last`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RollbackError {
    /// There is no transition to roll back.
    #[error("version log is empty")]
    Empty,

    /// The revert precondition failed; log and state have diverged.
    #[error(transparent)]
    Diff(#[from] DiffError),
}

/// Encodes version records as length-prefixed JSON, parent-ordered.
///
/// This is the `/state/diffs.bin` archive stream.
#[must_use]
pub fn encode_version_records(records: &[VersionRecord]) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        let json = serde_json::to_vec(record).expect("version records serialize");
        let len = u32::try_from(json.len()).expect("record length fits u32");
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&json);
    }
    out
}

/// Decodes a length-prefixed version record stream.
///
/// # Errors
///
/// Returns [`RecordDecodeError`] on truncation or malformed JSON.
pub fn decode_version_records(bytes: &[u8]) -> Result<Vec<VersionRecord>, RecordDecodeError> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let offset = pos;
        if bytes.len() - pos < 4 {
            return Err(RecordDecodeError::Truncated { offset });
        }
        let len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().expect("4 bytes")) as usize;
        pos += 4;
        if bytes.len() - pos < len {
            return Err(RecordDecodeError::Truncated { offset });
        }
        let record: VersionRecord = serde_json::from_slice(&bytes[pos..pos + len])
            .map_err(|source| RecordDecodeError::Json { offset, source })?;
        pos += len;
        records.push(record);
    }

    Ok(records)
}

/// Errors from [`decode_version_records`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordDecodeError {
    /// The input ended inside a record.
    #[error("truncated version record at byte offset {offset}")]
    Truncated {
        /// Offset where the record started.
        offset: usize,
    },

    /// A record is not valid JSON for a version record.
    #[error("malformed version record at byte offset {offset}: {source}")]
    Json {
        /// Offset where the record started.
        offset: usize,
        /// The underlying parse error.
        source: serde_json::Error,
    },
}
