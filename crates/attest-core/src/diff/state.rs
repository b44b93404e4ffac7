//! The keyed state model and its canonical byte encoding.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::crypto::{CryptoProvider, Digest};

/// A keyed collection of byte blobs plus per-id metadata pairs.
///
/// Both maps are ordered, so the canonical encoding and the content hash
/// are independent of insertion order. A state is valid iff
/// its hash matches its canonical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyedState {
    entries: BTreeMap<String, Vec<u8>>,
    meta: BTreeMap<String, BTreeSet<(String, String)>>,
}

impl KeyedState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the blob stored under `id`, if any.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&[u8]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    /// Whether a blob exists under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the state holds no blobs and no metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.meta.is_empty()
    }

    /// Returns the metadata pairs recorded for `id`.
    #[must_use]
    pub fn meta_pairs(&self, id: &str) -> &BTreeSet<(String, String)> {
        static EMPTY: BTreeSet<(String, String)> = BTreeSet::new();
        self.meta.get(id).unwrap_or(&EMPTY)
    }

    pub(super) fn insert(&mut self, id: String, bytes: Vec<u8>) {
        self.entries.insert(id, bytes);
    }

    pub(super) fn remove(&mut self, id: &str) -> Option<Vec<u8>> {
        self.entries.remove(id)
    }

    pub(super) fn meta_insert(&mut self, id: &str, key: String, value: String) {
        self.meta.entry(id.to_owned()).or_default().insert((key, value));
    }

    pub(super) fn meta_remove(&mut self, id: &str, key: &str, value: &str) -> bool {
        let Some(pairs) = self.meta.get_mut(id) else {
            return false;
        };
        let removed = pairs.remove(&(key.to_owned(), value.to_owned()));
        if pairs.is_empty() {
            self.meta.remove(id);
        }
        removed
    }

    /// Canonical byte encoding: big-endian length-prefixed fields in map
    /// order. Two states with equal content encode identically.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();

        push_u32(&mut out, self.entries.len());
        for (id, bytes) in &self.entries {
            push_str(&mut out, id);
            push_u32(&mut out, bytes.len());
            out.extend_from_slice(bytes);
        }

        push_u32(&mut out, self.meta.len());
        for (id, pairs) in &self.meta {
            push_str(&mut out, id);
            push_u32(&mut out, pairs.len());
            for (key, value) in pairs {
                push_str(&mut out, key);
                push_str(&mut out, value);
            }
        }

        out
    }

    /// `SHA256(canonical_bytes)`.
    #[must_use]
    pub fn content_hash(&self, crypto: &dyn CryptoProvider) -> Digest {
        crypto.hash(&self.canonical_bytes())
    }

    /// Decodes a state from its canonical encoding.
    ///
    /// # Errors
    ///
    /// Returns [`StateDecodeError`] on truncated or malformed input.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, StateDecodeError> {
        let mut reader = Reader { bytes, pos: 0 };
        let mut state = Self::new();

        let entry_count = reader.read_u32()?;
        for _ in 0..entry_count {
            let id = reader.read_string()?;
            let len = reader.read_u32()? as usize;
            let blob = reader.read_bytes(len)?.to_vec();
            state.entries.insert(id, blob);
        }

        let meta_count = reader.read_u32()?;
        for _ in 0..meta_count {
            let id = reader.read_string()?;
            let pair_count = reader.read_u32()?;
            let pairs = state.meta.entry(id).or_default();
            for _ in 0..pair_count {
                let key = reader.read_string()?;
                let value = reader.read_string()?;
                pairs.insert((key, value));
            }
        }

        if reader.pos != bytes.len() {
            return Err(StateDecodeError::TrailingBytes {
                offset: reader.pos,
            });
        }
        Ok(state)
    }
}

/// Errors decoding a canonical state encoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateDecodeError {
    /// The input ended inside a field.
    #[error("truncated state encoding at byte offset {offset}")]
    Truncated {
        /// Offset where the read failed.
        offset: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("non-UTF-8 string at byte offset {offset}")]
    InvalidUtf8 {
        /// Offset where the string started.
        offset: usize,
    },

    /// Bytes remain after the last declared field.
    #[error("trailing bytes after state encoding at offset {offset}")]
    TrailingBytes {
        /// Offset where the trailing bytes start.
        offset: usize,
    },
}

fn push_u32(out: &mut Vec<u8>, value: usize) {
    // Field counts and blob lengths stay far below 4 GiB in practice;
    // the cast is checked in debug builds by the try_from.
    let value = u32::try_from(value).expect("field length fits u32");
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_str(out: &mut Vec<u8>, s: &str) {
    push_u32(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn read_u32(&mut self) -> Result<u32, StateDecodeError> {
        let slice = self.read_bytes(4)?;
        Ok(u32::from_be_bytes(slice.try_into().expect("4 bytes")))
    }

    fn read_bytes(&mut self, len: usize) -> Result<&[u8], StateDecodeError> {
        if self.bytes.len() - self.pos < len {
            return Err(StateDecodeError::Truncated { offset: self.pos });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_string(&mut self) -> Result<String, StateDecodeError> {
        let offset = self.pos;
        let len = self.read_u32()? as usize;
        let slice = self.read_bytes(len)?;
        std::str::from_utf8(slice)
            .map(str::to_owned)
            .map_err(|_| StateDecodeError::InvalidUtf8 { offset })
    }
}
