//! Diff variants and the apply/revert operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::KeyedState;

/// Blobs above this size are copied in fixed chunks during apply, keeping
/// peak allocation growth bounded. Chunking never splits a diff's
/// atomicity: the chunked copy happens on the candidate state, which is
/// discarded wholesale on failure.
pub const CHUNK_THRESHOLD_BYTES: usize = 1024 * 1024;

const CHUNK_SIZE_BYTES: usize = 256 * 1024;

/// A precondition of apply or revert did not hold.
///
/// The state the operation was called with is unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("precondition failed for {variant}: {reason}")]
pub struct DiffError {
    /// The diff variant that refused.
    pub variant: &'static str,
    /// What was expected and what was found.
    pub reason: String,
}

impl DiffError {
    fn new(variant: &'static str, reason: impl Into<String>) -> Self {
        Self {
            variant,
            reason: reason.into(),
        }
    }
}

mod hex_bytes {
    //! Byte blobs serialize as lowercase hex, matching the canonical JSON
    //! convention used for seals.

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A first-class, invertible state transition.
///
/// `Delete` and `Modify` carry the displaced bytes, so reverting is a pure
/// function of the diff and the state it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Diff {
    /// Inserts `id -> bytes`; refuses when `id` exists.
    Add {
        /// Target blob id.
        id: String,
        /// Blob content.
        #[serde(with = "hex_bytes")]
        bytes: Vec<u8>,
    },

    /// Removes `id`; refuses when absent or the current bytes differ from
    /// the displaced `old`.
    Delete {
        /// Target blob id.
        id: String,
        /// The displaced content, re-inserted on revert.
        #[serde(with = "hex_bytes")]
        old: Vec<u8>,
    },

    /// Replaces `id`'s content `old -> new`; refuses when the current
    /// bytes differ from `old`.
    Modify {
        /// Target blob id.
        id: String,
        /// The displaced content.
        #[serde(with = "hex_bytes")]
        old: Vec<u8>,
        /// The replacement content.
        #[serde(with = "hex_bytes")]
        new: Vec<u8>,
    },

    /// Adds a metadata pair; refuses when the exact pair already exists.
    MetaAdd {
        /// Target blob id.
        id: String,
        /// Metadata key.
        key: String,
        /// Metadata value.
        value: String,
    },

    /// Removes an exact metadata pair; refuses when absent.
    MetaDel {
        /// Target blob id.
        id: String,
        /// Metadata key.
        key: String,
        /// Metadata value.
        value: String,
    },

    /// Applies `first` then `second`; reverts `second` then `first`.
    Compose {
        /// Applied first, reverted last.
        first: Box<Diff>,
        /// Applied second, reverted first.
        second: Box<Diff>,
    },
}

impl Diff {
    /// The variant name used in error reporting.
    #[must_use]
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "Add",
            Self::Delete { .. } => "Delete",
            Self::Modify { .. } => "Modify",
            Self::MetaAdd { .. } => "MetaAdd",
            Self::MetaDel { .. } => "MetaDel",
            Self::Compose { .. } => "Compose",
        }
    }
}

/// Applies `diff` to `state`, returning the successor state.
///
/// Atomic per diff: on error the input is returned untouched (the
/// operation is pure and the caller's state is never mutated).
///
/// # Errors
///
/// Returns [`DiffError`] when a precondition does not hold; for
/// [`Diff::Compose`] the error of the failing child propagates intact.
pub fn apply(state: &KeyedState, diff: &Diff) -> Result<KeyedState, DiffError> {
    match diff {
        Diff::Add { id, bytes } => {
            if state.contains(id) {
                return Err(DiffError::new("Add", format!("id {id:?} already exists")));
            }
            let mut next = state.clone();
            next.insert(id.clone(), copy_blob(bytes));
            Ok(next)
        }
        Diff::Delete { id, old } => {
            let current = state
                .get(id)
                .ok_or_else(|| DiffError::new("Delete", format!("id {id:?} is absent")))?;
            if current != old.as_slice() {
                return Err(DiffError::new(
                    "Delete",
                    format!("current content of {id:?} differs from displaced content"),
                ));
            }
            let mut next = state.clone();
            next.remove(id);
            Ok(next)
        }
        Diff::Modify { id, old, new } => {
            let current = state
                .get(id)
                .ok_or_else(|| DiffError::new("Modify", format!("id {id:?} is absent")))?;
            if current != old.as_slice() {
                return Err(DiffError::new(
                    "Modify",
                    format!("current content of {id:?} differs from expected old content"),
                ));
            }
            let mut next = state.clone();
            next.insert(id.clone(), copy_blob(new));
            Ok(next)
        }
        Diff::MetaAdd { id, key, value } => {
            if state.meta_pairs(id).contains(&(key.clone(), value.clone())) {
                return Err(DiffError::new(
                    "MetaAdd",
                    format!("pair ({key:?}, {value:?}) already present on {id:?}"),
                ));
            }
            let mut next = state.clone();
            next.meta_insert(id, key.clone(), value.clone());
            Ok(next)
        }
        Diff::MetaDel { id, key, value } => {
            let mut next = state.clone();
            if !next.meta_remove(id, key, value) {
                return Err(DiffError::new(
                    "MetaDel",
                    format!("pair ({key:?}, {value:?}) not present on {id:?}"),
                ));
            }
            Ok(next)
        }
        Diff::Compose { first, second } => {
            let intermediate = apply(state, first)?;
            apply(&intermediate, second)
        }
    }
}

/// Reverts `diff` against the state it produced, returning the
/// predecessor state.
///
/// # Errors
///
/// Returns [`DiffError`] when the state does not look like the output of
/// `apply` for this diff.
pub fn revert(state: &KeyedState, diff: &Diff) -> Result<KeyedState, DiffError> {
    match diff {
        Diff::Add { id, bytes } => {
            let current = state
                .get(id)
                .ok_or_else(|| DiffError::new("Add", format!("id {id:?} is absent")))?;
            if current != bytes.as_slice() {
                return Err(DiffError::new(
                    "Add",
                    format!("current content of {id:?} differs from added content"),
                ));
            }
            let mut prev = state.clone();
            prev.remove(id);
            Ok(prev)
        }
        Diff::Delete { id, old } => {
            if state.contains(id) {
                return Err(DiffError::new("Delete", format!("id {id:?} still exists")));
            }
            let mut prev = state.clone();
            prev.insert(id.clone(), copy_blob(old));
            Ok(prev)
        }
        Diff::Modify { id, old, new } => {
            let current = state
                .get(id)
                .ok_or_else(|| DiffError::new("Modify", format!("id {id:?} is absent")))?;
            if current != new.as_slice() {
                return Err(DiffError::new(
                    "Modify",
                    format!("current content of {id:?} differs from expected new content"),
                ));
            }
            let mut prev = state.clone();
            prev.insert(id.clone(), copy_blob(old));
            Ok(prev)
        }
        Diff::MetaAdd { id, key, value } => {
            let mut prev = state.clone();
            if !prev.meta_remove(id, key, value) {
                return Err(DiffError::new(
                    "MetaAdd",
                    format!("pair ({key:?}, {value:?}) not present on {id:?}"),
                ));
            }
            Ok(prev)
        }
        Diff::MetaDel { id, key, value } => {
            if state.meta_pairs(id).contains(&(key.clone(), value.clone())) {
                return Err(DiffError::new(
                    "MetaDel",
                    format!("pair ({key:?}, {value:?}) already present on {id:?}"),
                ));
            }
            let mut prev = state.clone();
            prev.meta_insert(id, key.clone(), value.clone());
            Ok(prev)
        }
        Diff::Compose { first, second } => {
            let intermediate = revert(state, second)?;
            revert(&intermediate, first)
        }
    }
}

/// Copies a blob, in fixed chunks above the threshold.
fn copy_blob(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() <= CHUNK_THRESHOLD_BYTES {
        return bytes.to_vec();
    }
    let mut out = Vec::with_capacity(bytes.len());
    for chunk in bytes.chunks(CHUNK_SIZE_BYTES) {
        out.extend_from_slice(chunk);
    }
    out
}
