//! `attest verify-log`

use std::path::Path;
use std::process::ExitCode;

use attest_core::chain::{read_chain_file, verify_chain};
use attest_core::config::DEFAULT_MAX_LOG_MESSAGE_BYTES;
use attest_core::crypto::{HmacSha256Crypto, MacKey};
use serde_json::json;

use super::report;

/// Verifies the chain file at `path` under `key_hex`, printing the first
/// failing index on failure.
pub fn verify(path: &Path, key_hex: &str) -> ExitCode {
    let key = match MacKey::from_hex(key_hex) {
        Ok(key) => key,
        Err(err) => {
            return report(
                &json!({"result": "invalid", "reason": err.to_string()}),
                false,
            );
        }
    };

    let entries = match read_chain_file(path, DEFAULT_MAX_LOG_MESSAGE_BYTES) {
        Ok(entries) => entries,
        Err(err) => {
            return report(
                &json!({"result": "invalid", "reason": err.to_string()}),
                false,
            );
        }
    };

    match verify_chain(&entries, &key, &HmacSha256Crypto::new()) {
        Ok(()) => report(
            &json!({"result": "valid", "entries": entries.len()}),
            true,
        ),
        Err(err) => report(
            &json!({
                "result": "invalid",
                "reason": err.to_string(),
                "index": err.index(),
            }),
            false,
        ),
    }
}
