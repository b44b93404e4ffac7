//! Cryptographic primitives for the evidence core.
//!
//! This module provides the narrow primitive surface the rest of the crate
//! consumes:
//!
//! - **HMAC-SHA256**: keyed MACs for log-chain linking
//! - **SHA-256**: content hashing for states, diffs, and bundle seals
//! - **Constant-time comparison**: digest equality that does not leak
//!   position information through timing
//!
//! # Provider seam
//!
//! All operations go through the [`CryptoProvider`] trait. Production code
//! uses [`HmacSha256Crypto`]; tests substitute doubles freely. The provider
//! is always constructor-injected; nothing in this crate reaches for a
//! process-global crypto context.
//!
//! The core never inspects returned digest bytes except for equality.
//!
//! # Example
//!
//! ```rust
//! use attest_core::crypto::{CryptoProvider, HmacSha256Crypto, MacKey, digest_eq};
//!
//! let key = MacKey::from_bytes([0u8; 32]);
//! let crypto = HmacSha256Crypto::new();
//!
//! let mac = crypto.mac(&key, b"message");
//! assert!(digest_eq(&mac, &crypto.mac(&key, b"message")));
//! assert!(!digest_eq(&mac, &crypto.mac(&key, b"other")));
//! ```

mod key;
mod provider;


pub use key::{KeyParseError, MacKey};
pub use provider::{CryptoProvider, DIGEST_SIZE, Digest, HmacSha256Crypto, digest_eq};
