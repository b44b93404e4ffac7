//! The sealed bundle model.

use std::collections::BTreeMap;

use crate::chain::{LogEntry, encode_entries};
use crate::clock::Window;
use crate::crypto::Digest;
use crate::diff::{KeyedState, VersionRecord, encode_version_records};

/// Bundle schema version; validation refuses anything else.
pub const SCHEMA_VERSION: &str = "1.0";

/// Snapshot id used when the window starts before the first committed
/// version (the anchoring state is empty).
pub const GENESIS_SNAPSHOT_ID: &str = "genesis";

/// A `(version_id, state)` pair carried by a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    /// The version this state corresponds to, or
    /// [`GENESIS_SNAPSHOT_ID`] for the empty pre-history state.
    pub version_id: String,

    /// The state itself.
    pub state: KeyedState,
}

/// A sealed incident bundle, immutable after assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentBundle {
    /// Unique bundle identifier.
    pub id: String,

    /// Wall-clock nanoseconds at assembly.
    pub created_at_ns: u64,

    /// The closed wall-clock window this bundle covers.
    pub window: Window,

    /// Log-chain slice, possibly trimmed of DEBUG/TRACE by the size
    /// budget.
    pub logs: Vec<LogEntry>,

    /// Anchoring snapshot, plus the final in-window state when the window
    /// saw commits.
    pub snapshots: Vec<StateSnapshot>,

    /// Diff records committed inside the window, parent-ordered.
    pub diffs: Vec<VersionRecord>,

    /// Key/value metadata, including `schema_version` and the chain's
    /// first and last counters.
    pub metadata: BTreeMap<String, String>,

    /// Byte length of the bundle's content streams (chain wire bytes,
    /// snapshot bytes, diff records, metadata JSON). The size budget and
    /// the seal both cover this number; the compressed archive is smaller.
    pub size_bytes: u64,

    /// SHA-256 over the canonical serialization of all preceding fields.
    pub seal: Digest,
}

impl IncidentBundle {
    /// Recomputes the content size from the live fields.
    #[must_use]
    pub fn content_size_bytes(&self) -> u64 {
        let chain = encode_entries(&self.logs).len();
        let snapshots: usize = self
            .snapshots
            .iter()
            .map(|s| s.state.canonical_bytes().len())
            .sum();
        let diffs = encode_version_records(&self.diffs).len();
        let metadata = serde_json::to_vec(&self.metadata)
            .expect("string map serializes")
            .len();
        (chain + snapshots + diffs + metadata) as u64
    }
}
