//! Incident bundle assembly, sealing, and validation.
//!
//! A bundle fixes a wall-clock window and packages the evidence covering
//! it: the log-chain slice, the state snapshot anchoring the window, the
//! diff records committed inside it, and a metadata map. The whole is
//! sealed under a SHA-256 of its canonical serialization, so auditors can
//! re-check the bundle offline, byte for byte.
//!
//! # Canonical serialization
//!
//! JSON with sorted keys, no whitespace, numbers as decimal integers, and
//! byte fields as lowercase hex. The seal is computed over this form and
//! recomputes exactly after any serialize/deserialize round trip,
//! including through the archive.
//!
//! # Validation
//!
//! [`BundleAssembler::validate`] is fail-closed and surfaces the first
//! failing check: schema, window, chain slice, seal, then size. Bundles
//! are immutable after sealing; validation never repairs.
//!
//! # Archive layout
//!
//! ```text
//! /manifest.json        -- id, created_at, window, seal (hex), schema_version
//! /logs/chain.bin       -- concatenated wire-format log entries
//! /state/snapshots/<id> -- canonical state bytes per snapshot
//! /state/diffs.bin      -- length-prefixed diff records, parent-ordered
//! /timeline.html        -- deterministic projection
//! /metadata.json        -- key/value pairs, sorted keys
//! ```

mod archive;
mod assembler;
mod canonical;
mod model;
mod timeline;

#[cfg(test)]
mod tests;

pub use archive::{ArchiveError, read_archive, write_archive};
pub use assembler::{BundleAssembler, BundleError};
pub use canonical::{bundle_canonical_json, compute_seal};
pub use model::{GENESIS_SNAPSHOT_ID, IncidentBundle, SCHEMA_VERSION, StateSnapshot};
pub use timeline::html_timeline;
