//! `attest verify-bundle`

use std::path::Path;
use std::process::ExitCode;

use std::sync::Arc;

use attest_core::crypto::{HmacSha256Crypto, MacKey};
use attest_core::verify::verify_archive;
use serde_json::json;

use super::report;

/// Re-checks the archive at `path` under `key_hex`.
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

    match verify_archive(path, key, Arc::new(HmacSha256Crypto::new())) {
        Ok(bundle) => report(&json!({"result": "valid", "id": bundle.id}), true),
        Err(err) => report(
            &json!({"result": "invalid", "reason": err.to_string()}),
            false,
        ),
    }
}
