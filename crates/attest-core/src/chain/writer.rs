//! The single-writer chain tail and its backing stores.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::crypto::{CryptoProvider, DIGEST_SIZE, Digest, MacKey};

use super::entry::{LogEntry, LogLevel, WireError, decode_entries, encode_entry};

/// Message of the distinguished end-marker entry written by
/// [`ChainWriter::seal`].
pub const SEAL_MESSAGE: &str = "chain sealed";

/// Message prefix of the retention record written by
/// [`ChainWriter::truncate_before`].
pub const TRUNCATE_MESSAGE_PREFIX: &str = "retention truncated through counter ";

/// A durable write failed.
///
/// The chain tail does not advance past a failed durable write; recovery is
/// the caller's responsibility and no retries happen at this layer.
#[derive(Debug, Error)]
#[error("storage error during {stage}: {cause}")]
pub struct StorageError {
    /// The operation that failed (`append`, `sync`, `truncate`).
    pub stage: &'static str,
    /// The underlying I/O failure.
    #[source]
    pub cause: std::io::Error,
}

/// Errors surfaced by the chain writer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppendError {
    /// The backing store rejected the write; the tail did not advance.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The message exceeds the configured length cap.
    #[error("message of {len} bytes exceeds cap of {max} bytes")]
    MessageTooLong {
        /// Actual message length.
        len: usize,
        /// Configured cap.
        max: usize,
    },

    /// The chain was sealed; no further appends are accepted.
    #[error("chain is sealed")]
    Sealed,

    /// Truncation point lies beyond the live tail.
    #[error("truncation counter {counter} exceeds tail counter {tail}")]
    TruncateBeyondTail {
        /// Requested truncation point.
        counter: u64,
        /// Current tail counter.
        tail: u64,
    },
}

/// Durable backing store for a chain.
///
/// Implementations persist entries in wire format in append order. The
/// store is only ever driven from under the writer lock, so implementations
/// need not be thread-safe themselves.
pub trait ChainStore: Send {
    /// Durably appends one entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the write or its flush fails; in that
    /// case the entry must not be considered stored.
    fn append(&mut self, entry: &LogEntry) -> Result<(), StorageError>;

    /// Drops all stored entries with `counter < counter`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when rewriting the retained suffix fails.
    fn truncate_before(&mut self, counter: u64) -> Result<(), StorageError>;
}

/// In-memory store for tests and ephemeral chains.
#[derive(Debug, Default)]
pub struct MemoryChainStore {
    entries: Vec<LogEntry>,
}

impl MemoryChainStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored entries.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}

impl ChainStore for MemoryChainStore {
    fn append(&mut self, entry: &LogEntry) -> Result<(), StorageError> {
        self.entries.push(entry.clone());
        Ok(())
    }

    fn truncate_before(&mut self, counter: u64) -> Result<(), StorageError> {
        self.entries.retain(|e| e.counter >= counter);
        Ok(())
    }
}

/// Append-only file store writing wire-format records.
///
/// Every append is flushed and synced before it is acknowledged, so an
/// acknowledged entry survives a crash. Truncation rewrites the retained
/// suffix through a temporary file and an atomic rename.
#[derive(Debug)]
pub struct FileChainStore {
    file: File,
    path: PathBuf,
    max_message_bytes: usize,
}

impl FileChainStore {
    /// Opens (or creates) a chain file for appending.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, max_message_bytes: usize) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|cause| StorageError {
                stage: "open",
                cause,
            })?;
        Ok(Self {
            file,
            path,
            max_message_bytes,
        })
    }
}

impl ChainStore for FileChainStore {
    fn append(&mut self, entry: &LogEntry) -> Result<(), StorageError> {
        let mut record = Vec::with_capacity(entry.wire_len());
        encode_entry(entry, &mut record);
        self.file
            .write_all(&record)
            .map_err(|cause| StorageError {
                stage: "append",
                cause,
            })?;
        self.file.sync_data().map_err(|cause| StorageError {
            stage: "sync",
            cause,
        })
    }

    fn truncate_before(&mut self, counter: u64) -> Result<(), StorageError> {
        let io = |stage: &'static str| move |cause| StorageError { stage, cause };

        let bytes = std::fs::read(&self.path).map_err(io("truncate"))?;
        let retained: Vec<LogEntry> = decode_entries(&bytes, self.max_message_bytes)
            .map_err(|err| StorageError {
                stage: "truncate",
                cause: std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()),
            })?
            .into_iter()
            .filter(|e| e.counter >= counter)
            .collect();

        let tmp_path = self.path.with_extension("tmp");
        let mut tmp = File::create(&tmp_path).map_err(io("truncate"))?;
        let mut buf = Vec::new();
        for entry in &retained {
            encode_entry(entry, &mut buf);
        }
        tmp.write_all(&buf).map_err(io("truncate"))?;
        tmp.sync_data().map_err(io("truncate"))?;
        std::fs::rename(&tmp_path, &self.path).map_err(io("truncate"))?;

        self.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(io("truncate"))?;
        Ok(())
    }
}

/// Reads and decodes an entire chain file.
///
/// # Errors
///
/// Returns [`ReadChainError`] when the file cannot be read or its contents
/// are not valid wire records; decode failures carry byte offsets.
pub fn read_chain_file(
    path: impl AsRef<Path>,
    max_message_bytes: usize,
) -> Result<Vec<LogEntry>, ReadChainError> {
    let bytes = std::fs::read(path)?;
    Ok(decode_entries(&bytes, max_message_bytes)?)
}

/// Errors from [`read_chain_file`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadChainError {
    /// The file could not be read.
    #[error("failed to read chain file: {0}")]
    Io(#[from] std::io::Error),

    /// The file contents are not valid wire records.
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Summary counters over a chain tail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainStats {
    /// Number of live entries.
    pub entries: u64,
    /// Counter of the first live entry (0 when empty).
    pub first_counter: u64,
    /// Counter of the last live entry (0 when empty).
    pub last_counter: u64,
    /// Timestamp of the last live entry (0 when empty).
    pub last_timestamp_ns: u64,
    /// Whether the chain has been sealed.
    pub sealed: bool,
}

struct WriterInner {
    store: Box<dyn ChainStore>,
    entries: Vec<LogEntry>,
    last_counter: u64,
    prev_mac: Digest,
    last_timestamp_ns: u64,
    sealed: bool,
}

/// The single writer of a log chain.
///
/// All appends run under one mutex covering the tail state and the backing
/// store: append order equals persisted order equals counter order. Once
/// the MAC for an entry is computed and the durable write has succeeded,
/// the append is not cancellable.
pub struct ChainWriter {
    inner: Mutex<WriterInner>,
    crypto: Arc<dyn CryptoProvider>,
    clock: Arc<dyn Clock>,
    key: MacKey,
    max_message_bytes: usize,
}

impl ChainWriter {
    /// Creates a writer over an empty chain.
    #[must_use]
    pub fn new(
        store: Box<dyn ChainStore>,
        crypto: Arc<dyn CryptoProvider>,
        clock: Arc<dyn Clock>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(WriterInner {
                store,
                entries: Vec::new(),
                last_counter: 0,
                prev_mac: [0u8; DIGEST_SIZE],
                last_timestamp_ns: 0,
                sealed: false,
            }),
            crypto,
            clock,
            key: config.mac_key.clone(),
            max_message_bytes: config.max_log_message_bytes,
        }
    }

    /// Appends one entry to the chain.
    ///
    /// Reads the live `(counter, prev_mac)` under the writer lock, computes
    /// the MAC, appends to the backing store, then publishes the new tail.
    /// On a storage failure the in-memory state does not advance.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError`] when the message is over-long, the chain is
    /// sealed, or the durable write fails.
    pub fn append(
        &self,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Result<LogEntry, AppendError> {
        let message = message.into();
        if message.len() > self.max_message_bytes {
            return Err(AppendError::MessageTooLong {
                len: message.len(),
                max: self.max_message_bytes,
            });
        }

        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.sealed {
            return Err(AppendError::Sealed);
        }
        self.append_locked(&mut inner, level, message)
    }

    /// Seals the chain by writing the distinguished end-marker entry.
    ///
    /// After sealing, further appends fail with [`AppendError::Sealed`].
    ///
    /// # Errors
    ///
    /// Returns [`AppendError`] when the chain is already sealed or the
    /// durable write of the end marker fails.
    pub fn seal(&self) -> Result<LogEntry, AppendError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.sealed {
            return Err(AppendError::Sealed);
        }
        let marker = self.append_locked(&mut inner, LogLevel::Info, SEAL_MESSAGE.to_owned())?;
        inner.sealed = true;
        tracing::info!(counter = marker.counter, "chain sealed");
        Ok(marker)
    }

    /// Drops all entries with a counter below `counter`, recording the
    /// truncation as a chained entry first.
    ///
    /// Returns the number of entries dropped. The truncation record itself
    /// is appended before anything is dropped, so the retention action is
    /// part of the evidence.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError`] when the chain is sealed, the truncation
    /// point lies beyond the tail, or a durable operation fails.
    pub fn truncate_before(&self, counter: u64) -> Result<usize, AppendError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.sealed {
            return Err(AppendError::Sealed);
        }
        if counter > inner.last_counter + 1 {
            return Err(AppendError::TruncateBeyondTail {
                counter,
                tail: inner.last_counter,
            });
        }

        let message = format!("{TRUNCATE_MESSAGE_PREFIX}{counter}");
        self.append_locked(&mut inner, LogLevel::Warn, message)?;
        inner.store.truncate_before(counter)?;

        let before = inner.entries.len();
        inner.entries.retain(|e| e.counter >= counter);
        let dropped = before - inner.entries.len();
        tracing::info!(counter, dropped, "chain truncated by retention");
        Ok(dropped)
    }

    /// Returns an immutable snapshot of the live entries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .clone()
    }

    /// Returns summary counters over the live tail.
    #[must_use]
    pub fn stats(&self) -> ChainStats {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        ChainStats {
            entries: inner.entries.len() as u64,
            first_counter: inner.entries.first().map_or(0, |e| e.counter),
            last_counter: inner.last_counter,
            last_timestamp_ns: inner.last_timestamp_ns,
            sealed: inner.sealed,
        }
    }

    fn append_locked(
        &self,
        inner: &mut WriterInner,
        level: LogLevel,
        message: String,
    ) -> Result<LogEntry, AppendError> {
        // Clamp to the last published timestamp so a wall-clock step
        // backwards cannot violate the non-decreasing invariant.
        let timestamp_ns = self.clock.now_wall_ns().max(inner.last_timestamp_ns);
        let counter = inner.last_counter + 1;

        let mut preimage = Vec::new();
        LogEntry::encode_preimage_into(
            &mut preimage,
            timestamp_ns,
            level,
            &message,
            counter,
            &inner.prev_mac,
        );
        let mac = self.crypto.mac(&self.key, &preimage);

        let entry = LogEntry {
            timestamp_ns,
            level,
            message,
            counter,
            prev_mac: inner.prev_mac,
            mac,
        };

        // Durable write first; the tail is published only on success.
        inner.store.append(&entry)?;

        inner.entries.push(entry.clone());
        inner.last_counter = counter;
        inner.prev_mac = mac;
        inner.last_timestamp_ns = timestamp_ns;
        Ok(entry)
    }
}
