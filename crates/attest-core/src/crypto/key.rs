//! MAC key material.

use std::fmt;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::provider::DIGEST_SIZE;

/// Errors that can occur when parsing key material.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyParseError {
    /// The hex string does not decode to exactly 32 bytes.
    #[error("key must be {expected} bytes, got {actual}")]
    WrongLength {
        /// The expected number of bytes.
        expected: usize,
        /// The number of bytes the input decoded to.
        actual: usize,
    },

    /// The input is not valid hexadecimal.
    #[error("invalid hex in key material: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A 32-byte MAC key.
///
/// Key bytes are zeroed on drop. The key is supplied by the operator
/// (distribution and rotation are out of scope) and is read-only after
/// construction.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MacKey([u8; DIGEST_SIZE]);

impl MacKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses a key from a 64-character hex string.
    ///
    /// # Errors
    ///
    /// Returns [`KeyParseError`] if the input is not valid hex or does not
    /// decode to exactly 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self, KeyParseError> {
        let decoded = hex::decode(s.trim())?;
        let actual = decoded.len();
        let bytes: [u8; DIGEST_SIZE] =
            decoded
                .try_into()
                .map_err(|_| KeyParseError::WrongLength {
                    expected: DIGEST_SIZE,
                    actual,
                })?;
        Ok(Self(bytes))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material must never reach logs.
        f.write_str("MacKey(..)")
    }
}
