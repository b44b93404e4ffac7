//! Pure verification over entry slices.

use thiserror::Error;

use crate::crypto::{CryptoProvider, DIGEST_SIZE, Digest, MacKey, digest_eq};

use super::entry::LogEntry;

/// Verification failures, carrying the counter at which the chain broke.
///
/// Checks run in a fixed order per entry (counter continuity, then
/// timestamps, then MAC binding), so a deleted entry reports the gap rather
/// than the MAC mismatch that follows from it.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChainVerifyError {
    /// An entry's MAC does not verify against the running chain state.
    ///
    /// Covers field tampering, a forged `prev_mac` link, and reordering.
    #[error("MAC verification failed at entry {index}")]
    BadMac {
        /// Counter of the failing entry.
        index: u64,
    },

    /// Counter continuity broke after this entry.
    ///
    /// Covers deletion, and insertion that does not renumber.
    #[error("counter gap after entry {index}")]
    CounterGap {
        /// Counter of the last continuous entry before the gap.
        index: u64,
    },

    /// An entry's timestamp is earlier than its predecessor's.
    #[error("timestamp regression at entry {index}")]
    TimestampRegression {
        /// Counter of the regressing entry.
        index: u64,
    },
}

/// Verifies a genesis-anchored chain.
///
/// The first entry must carry counter 1 and be bound to 32 zero bytes.
/// The verifier processes entries in order holding only the running
/// predecessor MAC, so memory use is constant and verification is
/// restartable at any prefix.
///
/// # Errors
///
/// Returns the first [`ChainVerifyError`] encountered, with the counter at
/// which the chain broke.
pub fn verify_chain(
    entries: &[LogEntry],
    key: &MacKey,
    crypto: &dyn CryptoProvider,
) -> Result<(), ChainVerifyError> {
    verify_prefix(entries, key, crypto, entries.len())
}

/// Verifies the first `upto` entries of a genesis-anchored chain.
///
/// Enables streaming verification of large chains: callers verify in
/// segments and resume from where they stopped.
///
/// # Errors
///
/// Same as [`verify_chain`], bounded to the prefix.
pub fn verify_prefix(
    entries: &[LogEntry],
    key: &MacKey,
    crypto: &dyn CryptoProvider,
    upto: usize,
) -> Result<(), ChainVerifyError> {
    let prefix = &entries[..upto.min(entries.len())];
    run(prefix, key, crypto, Anchor::Genesis)
}

/// Verifies a slice that may start mid-chain.
///
/// The first entry's `prev_mac` is accepted as the claimed link to the
/// predecessor outside the slice; its own MAC still verifies over that
/// claim, and every later entry is checked exactly as in [`verify_chain`].
/// Bundle slices and retention-truncated chains are verified this way.
///
/// # Errors
///
/// Same as [`verify_chain`].
pub fn verify_slice(
    entries: &[LogEntry],
    key: &MacKey,
    crypto: &dyn CryptoProvider,
) -> Result<(), ChainVerifyError> {
    run(entries, key, crypto, Anchor::Claimed)
}

/// Verifies a slice that may carry trims (dropped entries).
///
/// Size-budget trimming removes DEBUG/TRACE entries from a bundle's log
/// slice, so counter continuity cannot be demanded there. Instead, every
/// entry's MAC is verified over its *stored* `prev_mac` (each entry
/// self-authenticates under the key), counters must strictly increase,
/// timestamps must be non-decreasing, and wherever two retained entries
/// are adjacent in the original chain their MAC link is checked exactly.
///
/// # Errors
///
/// Same variants as [`verify_chain`]; `CounterGap` here means counters
/// failed to strictly increase.
pub fn verify_sparse_slice(
    entries: &[LogEntry],
    key: &MacKey,
    crypto: &dyn CryptoProvider,
) -> Result<(), ChainVerifyError> {
    let mut preimage = Vec::new();
    let mut prev: Option<&LogEntry> = None;

    for entry in entries {
        if let Some(prev) = prev {
            if entry.counter <= prev.counter {
                return Err(ChainVerifyError::CounterGap {
                    index: prev.counter,
                });
            }
            if entry.timestamp_ns < prev.timestamp_ns {
                return Err(ChainVerifyError::TimestampRegression {
                    index: entry.counter,
                });
            }
            // Adjacent counters must still be MAC-linked.
            if entry.counter == prev.counter + 1 && entry.prev_mac != prev.mac {
                return Err(ChainVerifyError::BadMac {
                    index: entry.counter,
                });
            }
        }

        LogEntry::encode_preimage_into(
            &mut preimage,
            entry.timestamp_ns,
            entry.level,
            &entry.message,
            entry.counter,
            &entry.prev_mac,
        );
        let expected_mac = crypto.mac(key, &preimage);
        if !digest_eq(&expected_mac, &entry.mac) {
            return Err(ChainVerifyError::BadMac {
                index: entry.counter,
            });
        }

        prev = Some(entry);
    }

    Ok(())
}

enum Anchor {
    /// First entry must be counter 1 bound to 32 zero bytes.
    Genesis,
    /// First entry's `prev_mac` is accepted as claimed.
    Claimed,
}

fn run(
    entries: &[LogEntry],
    key: &MacKey,
    crypto: &dyn CryptoProvider,
    anchor: Anchor,
) -> Result<(), ChainVerifyError> {
    let Some(first) = entries.first() else {
        return Ok(());
    };

    let mut running_prev: Digest = match anchor {
        Anchor::Genesis => {
            if first.counter != 1 {
                return Err(ChainVerifyError::CounterGap { index: 0 });
            }
            [0u8; DIGEST_SIZE]
        }
        Anchor::Claimed => first.prev_mac,
    };

    let mut expected_counter = first.counter;
    let mut last_timestamp_ns = first.timestamp_ns;
    let mut preimage = Vec::new();

    for entry in entries {
        if entry.counter != expected_counter {
            return Err(ChainVerifyError::CounterGap {
                index: expected_counter - 1,
            });
        }
        if entry.timestamp_ns < last_timestamp_ns {
            return Err(ChainVerifyError::TimestampRegression {
                index: entry.counter,
            });
        }

        // The stored link must equal the running predecessor MAC, and the
        // entry's own MAC must verify over that stored link. Checking both
        // means a rewritten `prev_mac` field fails here even though the
        // MAC it was signed with is untouched.
        if entry.prev_mac != running_prev {
            return Err(ChainVerifyError::BadMac {
                index: entry.counter,
            });
        }

        LogEntry::encode_preimage_into(
            &mut preimage,
            entry.timestamp_ns,
            entry.level,
            &entry.message,
            entry.counter,
            &entry.prev_mac,
        );
        let expected_mac = crypto.mac(key, &preimage);
        if !digest_eq(&expected_mac, &entry.mac) {
            return Err(ChainVerifyError::BadMac {
                index: entry.counter,
            });
        }

        running_prev = entry.mac;
        expected_counter = entry.counter + 1;
        last_timestamp_ns = entry.timestamp_ns;
    }

    Ok(())
}

impl ChainVerifyError {
    /// The counter carried by this failure.
    #[must_use]
    pub const fn index(&self) -> u64 {
        match self {
            Self::BadMac { index }
            | Self::CounterGap { index }
            | Self::TimestampRegression { index } => *index,
        }
    }
}
