//! Invertible state transitions.
//!
//! Configuration state is a keyed collection of byte blobs plus metadata
//! pairs ([`KeyedState`]). Transitions are first-class [`Diff`] values that
//! carry the displaced content, so reverting needs no journal lookup:
//! `revert(apply(s, d), d) = s` and `apply(revert(s', d), d) = s'`
//! wherever the operations are defined.
//!
//! Every apply and revert is atomic per diff: a failed precondition leaves
//! the input state untouched, including inside [`Diff::Compose`].
//!
//! The [`VersionLog`] is the single administrator actor recording committed
//! transitions with parent pointers and post-state hashes; bundles read its
//! records and snapshots, never its live state.

mod op;
mod state;
mod version_log;

#[cfg(test)]
mod tests;

pub use op::{CHUNK_THRESHOLD_BYTES, Diff, DiffError, apply, revert};
pub use state::{KeyedState, StateDecodeError};
pub use version_log::{
    RecordDecodeError, RollbackError, VersionLog, VersionRecord, decode_version_records,
    encode_version_records,
};
