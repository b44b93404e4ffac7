//! The crypto provider trait and its default software implementation.

use hmac::{Hmac, Mac};
use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq;

use super::key::MacKey;

/// Size of all digests produced by this module, in bytes.
pub const DIGEST_SIZE: usize = 32;

/// A 32-byte MAC or hash output.
pub type Digest = [u8; DIGEST_SIZE];

type HmacSha256 = Hmac<Sha256>;

/// Primitive operations the core consumes.
///
/// Implementations may bind these symbols to a software library, a hardware
/// module, or a test double. Callers compare returned digests only through
/// [`digest_eq`].
pub trait CryptoProvider: Send + Sync {
    /// Computes `HMAC-SHA256(key, message)`.
    fn mac(&self, key: &MacKey, message: &[u8]) -> Digest;

    /// Computes `SHA-256(message)`.
    fn hash(&self, message: &[u8]) -> Digest;
}

/// Default software provider backed by the `hmac` and `sha2` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256Crypto;

impl HmacSha256Crypto {
    /// Creates the default provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CryptoProvider for HmacSha256Crypto {
    fn mac(&self, key: &MacKey, message: &[u8]) -> Digest {
        // A 32-byte key is always a valid HMAC key; failure here means the
        // provider itself is broken, which is fatal by contract.
        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .expect("HMAC-SHA256 accepts 32-byte keys");
        mac.update(message);
        mac.finalize().into_bytes().into()
    }

    fn hash(&self, message: &[u8]) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(message);
        hasher.finalize().into()
    }
}

/// Constant-time digest comparison.
///
/// MAC verification must not leak the position of the first differing byte
/// through timing.
#[must_use]
pub fn digest_eq(a: &Digest, b: &Digest) -> bool {
    a.ct_eq(b).into()
}
