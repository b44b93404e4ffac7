//! Log entries and their wire encoding.
//!
//! The wire format is fixed-order big-endian:
//!
//! ```text
//! u64 timestamp | u8 level | u64 counter | u32 msg_len | msg bytes | 32B prev_mac | 32B mac
//! ```
//!
//! The MAC preimage of an entry is exactly its wire record minus the
//! trailing `mac` field, so an archive record and the signed bytes can
//! never drift apart.

use std::fmt;

use thiserror::Error;

use crate::crypto::{DIGEST_SIZE, Digest};

/// Severity levels, with their fixed wire encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Finest-grained diagnostics (wire value 0).
    Trace = 0,
    /// Debug diagnostics (wire value 1).
    Debug = 1,
    /// Routine operational events (wire value 2).
    Info = 2,
    /// Unexpected but recoverable conditions (wire value 3).
    Warn = 3,
    /// Failures of an operation (wire value 4).
    Error = 4,
    /// Failures of the process (wire value 5).
    Fatal = 5,
}

impl LogLevel {
    /// The wire encoding of this level.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a wire value into a level.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Trace),
            1 => Some(Self::Debug),
            2 => Some(Self::Info),
            3 => Some(Self::Warn),
            4 => Some(Self::Error),
            5 => Some(Self::Fatal),
            _ => None,
        }
    }

    /// Uppercase name as used in the timeline projection.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chained log entry.
///
/// Entries are created on append and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Wall-clock nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,

    /// Severity level.
    pub level: LogLevel,

    /// UTF-8 message, length-capped by configuration.
    pub message: String,

    /// Strictly increasing position within the chain, starting at 1.
    pub counter: u64,

    /// MAC of the previous entry, or 32 zero bytes for the first.
    pub prev_mac: Digest,

    /// `MAC(key, encode(timestamp, level, message, counter, prev_mac))`.
    pub mac: Digest,
}

impl LogEntry {
    /// Encoded size of this entry in bytes.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        8 + 1 + 8 + 4 + self.message.len() + DIGEST_SIZE + DIGEST_SIZE
    }

    /// Writes the MAC preimage (the wire record minus the trailing `mac`)
    /// into `out`.
    pub fn encode_preimage_into(
        out: &mut Vec<u8>,
        timestamp_ns: u64,
        level: LogLevel,
        message: &str,
        counter: u64,
        prev_mac: &Digest,
    ) {
        out.clear();
        out.reserve(8 + 1 + 8 + 4 + message.len() + DIGEST_SIZE);
        out.extend_from_slice(&timestamp_ns.to_be_bytes());
        out.push(level.as_u8());
        out.extend_from_slice(&counter.to_be_bytes());
        // Message length always fits u32: it is capped far below 4 GiB.
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(message.len() as u32).to_be_bytes());
        out.extend_from_slice(message.as_bytes());
        out.extend_from_slice(prev_mac);
    }
}

/// Errors that can occur while decoding wire records.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WireError {
    /// The input ended inside a record.
    #[error("truncated record at byte offset {offset}")]
    Truncated {
        /// Byte offset where the record started.
        offset: usize,
    },

    /// A record declares a message longer than the configured cap.
    #[error("message of {len} bytes at offset {offset} exceeds cap of {max} bytes")]
    MessageTooLong {
        /// Declared message length.
        len: usize,
        /// Configured cap.
        max: usize,
        /// Byte offset where the record started.
        offset: usize,
    },

    /// An unknown level byte was encountered.
    #[error("invalid level byte {value} at offset {offset}")]
    InvalidLevel {
        /// The unrecognised wire value.
        value: u8,
        /// Byte offset where the record started.
        offset: usize,
    },

    /// The message bytes are not valid UTF-8.
    #[error("message at offset {offset} is not valid UTF-8")]
    InvalidUtf8 {
        /// Byte offset where the record started.
        offset: usize,
    },
}

/// Appends the wire record of `entry` to `out`.
pub fn encode_entry(entry: &LogEntry, out: &mut Vec<u8>) {
    out.reserve(entry.wire_len());
    out.extend_from_slice(&entry.timestamp_ns.to_be_bytes());
    out.push(entry.level.as_u8());
    out.extend_from_slice(&entry.counter.to_be_bytes());
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(entry.message.len() as u32).to_be_bytes());
    out.extend_from_slice(entry.message.as_bytes());
    out.extend_from_slice(&entry.prev_mac);
    out.extend_from_slice(&entry.mac);
}

/// Encodes a sequence of entries as concatenated wire records.
#[must_use]
pub fn encode_entries(entries: &[LogEntry]) -> Vec<u8> {
    let total: usize = entries.iter().map(LogEntry::wire_len).sum();
    let mut out = Vec::with_capacity(total);
    for entry in entries {
        encode_entry(entry, &mut out);
    }
    out
}

/// Decodes concatenated wire records.
///
/// Reads are bounded: a record declaring a message longer than
/// `max_message_bytes` is rejected before any allocation of that size.
///
/// # Errors
///
/// Returns [`WireError`] on truncation, over-long messages, unknown level
/// bytes, or non-UTF-8 message bytes.
pub fn decode_entries(bytes: &[u8], max_message_bytes: usize) -> Result<Vec<LogEntry>, WireError> {
    const FIXED_HEAD: usize = 8 + 1 + 8 + 4;

    let mut entries = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let offset = pos;
        if bytes.len() - pos < FIXED_HEAD {
            return Err(WireError::Truncated { offset });
        }

        let timestamp_ns = u64::from_be_bytes(bytes[pos..pos + 8].try_into().expect("8 bytes"));
        pos += 8;

        let level_byte = bytes[pos];
        let level = LogLevel::from_u8(level_byte).ok_or(WireError::InvalidLevel {
            value: level_byte,
            offset,
        })?;
        pos += 1;

        let counter = u64::from_be_bytes(bytes[pos..pos + 8].try_into().expect("8 bytes"));
        pos += 8;

        let msg_len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().expect("4 bytes")) as usize;
        pos += 4;

        if msg_len > max_message_bytes {
            return Err(WireError::MessageTooLong {
                len: msg_len,
                max: max_message_bytes,
                offset,
            });
        }
        if bytes.len() - pos < msg_len + DIGEST_SIZE + DIGEST_SIZE {
            return Err(WireError::Truncated { offset });
        }

        let message = std::str::from_utf8(&bytes[pos..pos + msg_len])
            .map_err(|_| WireError::InvalidUtf8 { offset })?
            .to_owned();
        pos += msg_len;

        let mut prev_mac = [0u8; DIGEST_SIZE];
        prev_mac.copy_from_slice(&bytes[pos..pos + DIGEST_SIZE]);
        pos += DIGEST_SIZE;

        let mut mac = [0u8; DIGEST_SIZE];
        mac.copy_from_slice(&bytes[pos..pos + DIGEST_SIZE]);
        pos += DIGEST_SIZE;

        entries.push(LogEntry {
            timestamp_ns,
            level,
            message,
            counter,
            prev_mac,
            mac,
        });
    }

    Ok(entries)
}
