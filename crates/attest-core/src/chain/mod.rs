//! Tamper-evident log chain.
//!
//! An append-only sequence of log entries where each entry carries an
//! HMAC-SHA256 over its own fields *and* the MAC of its predecessor,
//! forming a MAC chain. Any modification, insertion, interior deletion,
//! or reordering of entries after they were appended is detected by the
//! verifier. Cutting the tail is closed by sealing: a sealed chain ends
//! with a distinguished marker entry whose absence betrays the cut.
//!
//! # Chain construction
//!
//! ```text
//! mac_i = MAC(key, encode(timestamp_i, level_i, message_i, counter_i, mac_{i-1}))
//! ```
//!
//! with 32 zero bytes standing in for `mac_{-1}` on the first entry.
//! Counters increase strictly by one; a gap is tampering. Timestamps are
//! non-decreasing within a chain.
//!
//! # Ownership
//!
//! A chain has exactly one writer ([`ChainWriter`]); readers obtain
//! immutable snapshots. Verification ([`verify_chain`], [`verify_prefix`],
//! [`verify_slice`]) is a pure function over an entry slice and a key,
//! holding only the running predecessor MAC.
//!
//! # Failure semantics
//!
//! Storage failures are reported as [`StorageError`] and never advance the
//! in-memory tail; verification failures carry the counter at which the
//! chain broke. MAC-computation failures are a broken crypto provider and
//! are fatal. No retries happen at this layer.

mod entry;
mod verifier;
mod writer;


pub use entry::{
    LogEntry, LogLevel, WireError, decode_entries, encode_entries, encode_entry,
};
pub use verifier::{
    ChainVerifyError, verify_chain, verify_prefix, verify_slice, verify_sparse_slice,
};
pub use writer::{
    AppendError, ChainStats, ChainStore, ChainWriter, FileChainStore, MemoryChainStore,
    ReadChainError, SEAL_MESSAGE, StorageError, TRUNCATE_MESSAGE_PREFIX, read_chain_file,
};
