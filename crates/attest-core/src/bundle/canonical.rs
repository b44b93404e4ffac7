//! Canonical serialization and seal computation.
//!
//! Canonical form is JSON with sorted keys, no whitespace, numbers as
//! decimal integers, and byte fields as lowercase hex. `serde_json`'s
//! default map is ordered, so building the tree out of `Value` objects
//! yields sorted keys without a post-pass; message strings have control
//! characters escaped by the serializer, so the output carries no literal
//! line feeds.

use serde_json::{Value, json};

use crate::crypto::{CryptoProvider, Digest};

use super::model::IncidentBundle;

/// Builds the canonical JSON string of `bundle`, excluding the seal.
///
/// This is the exact byte sequence the seal is computed over.
#[must_use]
pub fn bundle_canonical_json(bundle: &IncidentBundle) -> String {
    let logs: Vec<Value> = bundle
        .logs
        .iter()
        .map(|e| {
            json!({
                "counter": e.counter,
                "level": e.level.as_u8(),
                "mac": hex::encode(e.mac),
                "message": e.message,
                "prev_mac": hex::encode(e.prev_mac),
                "timestamp_ns": e.timestamp_ns,
            })
        })
        .collect();

    let snapshots: Vec<Value> = bundle
        .snapshots
        .iter()
        .map(|s| {
            json!({
                "state": hex::encode(s.state.canonical_bytes()),
                "version_id": s.version_id,
            })
        })
        .collect();

    let diffs: Vec<Value> = bundle
        .diffs
        .iter()
        .map(|r| serde_json::to_value(r).expect("version records serialize"))
        .collect();

    let value = json!({
        "contents": {
            "diffs": diffs,
            "logs": logs,
            "metadata": bundle.metadata,
            "state_snapshots": snapshots,
        },
        "created_at_ns": bundle.created_at_ns,
        "id": bundle.id,
        "size_bytes": bundle.size_bytes,
        "window": {
            "end_ns": bundle.window.end_ns,
            "start_ns": bundle.window.start_ns,
        },
    });

    serde_json::to_string(&value).expect("canonical value serializes")
}

/// `SHA256` over the canonical serialization.
#[must_use]
pub fn compute_seal(bundle: &IncidentBundle, crypto: &dyn CryptoProvider) -> Digest {
    crypto.hash(bundle_canonical_json(bundle).as_bytes())
}
