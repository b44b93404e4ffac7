//! Bundle archive writer and reader (tar.gz, fixed layout).

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, SecondsFormat};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Deserialize;
use serde_json::json;
use tar::{Builder, Header};
use thiserror::Error;

use crate::chain::{WireError, decode_entries, encode_entries};
use crate::clock::Window;
use crate::diff::{
    KeyedState, RecordDecodeError, StateDecodeError, decode_version_records,
    encode_version_records,
};

use super::model::{IncidentBundle, StateSnapshot};
use super::timeline::html_timeline;

const MANIFEST_PATH: &str = "manifest.json";
const CHAIN_PATH: &str = "logs/chain.bin";
const SNAPSHOT_DIR: &str = "state/snapshots/";
const DIFFS_PATH: &str = "state/diffs.bin";
const TIMELINE_PATH: &str = "timeline.html";
const METADATA_PATH: &str = "metadata.json";

/// Errors reading or writing bundle archives.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArchiveError {
    /// Filesystem or stream failure.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required file is missing from the archive.
    #[error("archive is missing {name}")]
    MissingFile {
        /// The expected path inside the archive.
        name: &'static str,
    },

    /// A JSON file inside the archive failed to parse.
    #[error("malformed {file} in archive: {source}")]
    Json {
        /// The file that failed.
        file: &'static str,
        /// The parse error.
        source: serde_json::Error,
    },

    /// The manifest carries an unusable field.
    #[error("invalid manifest: {reason}")]
    InvalidManifest {
        /// What was wrong.
        reason: String,
    },

    /// The chain stream failed to decode.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// A snapshot failed to decode.
    #[error(transparent)]
    State(#[from] StateDecodeError),

    /// The diff record stream failed to decode.
    #[error(transparent)]
    Records(#[from] RecordDecodeError),
}

#[derive(Debug, Deserialize)]
struct Manifest {
    id: String,
    created_at_ns: u64,
    schema_version: String,
    seal: String,
    size_bytes: u64,
    window: Window,
}

/// Writes `bundle` as a gzip-compressed tar archive at `path`.
///
/// Archive bytes are deterministic for a given bundle: fixed entry order,
/// zeroed timestamps, fixed permissions.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] on any write failure.
pub fn write_archive(bundle: &IncidentBundle, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
    let file = std::fs::File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let created_at = DateTime::from_timestamp_nanos(
        i64::try_from(bundle.created_at_ns).unwrap_or(i64::MAX),
    )
    .to_rfc3339_opts(SecondsFormat::Nanos, true);
    let manifest = json!({
        "created_at": created_at,
        "created_at_ns": bundle.created_at_ns,
        "id": bundle.id,
        "schema_version": bundle
            .metadata
            .get("schema_version")
            .cloned()
            .unwrap_or_default(),
        "seal": hex::encode(bundle.seal),
        "size_bytes": bundle.size_bytes,
        "window": { "end_ns": bundle.window.end_ns, "start_ns": bundle.window.start_ns },
    });
    let manifest_bytes =
        serde_json::to_vec(&manifest).expect("manifest serializes");
    append_file(&mut builder, MANIFEST_PATH, &manifest_bytes)?;

    append_file(&mut builder, CHAIN_PATH, &encode_entries(&bundle.logs))?;

    for snapshot in &bundle.snapshots {
        let name = format!("{SNAPSHOT_DIR}{}", snapshot.version_id);
        append_file(&mut builder, &name, &snapshot.state.canonical_bytes())?;
    }

    append_file(&mut builder, DIFFS_PATH, &encode_version_records(&bundle.diffs))?;
    append_file(&mut builder, TIMELINE_PATH, html_timeline(bundle).as_bytes())?;

    let metadata_bytes =
        serde_json::to_vec(&bundle.metadata).expect("string map serializes");
    append_file(&mut builder, METADATA_PATH, &metadata_bytes)?;

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Reads a bundle back from an archive written by [`write_archive`].
///
/// The returned bundle is the reader's reconstruction; callers validate it
/// (seal, chain, schema) before trusting any field.
///
/// # Errors
///
/// Returns [`ArchiveError`] on missing files, malformed streams, or I/O
/// failure.
pub fn read_archive(
    path: impl AsRef<Path>,
    max_message_bytes: usize,
) -> Result<IncidentBundle, ArchiveError> {
    let file = std::fs::File::open(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    let mut manifest_bytes: Option<Vec<u8>> = None;
    let mut chain_bytes: Option<Vec<u8>> = None;
    let mut diff_bytes: Option<Vec<u8>> = None;
    let mut metadata_bytes: Option<Vec<u8>> = None;
    let mut snapshots: Vec<(String, Vec<u8>)> = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut bytes)?;

        match path.as_str() {
            MANIFEST_PATH => manifest_bytes = Some(bytes),
            CHAIN_PATH => chain_bytes = Some(bytes),
            DIFFS_PATH => diff_bytes = Some(bytes),
            METADATA_PATH => metadata_bytes = Some(bytes),
            TIMELINE_PATH => {}
            other => {
                if let Some(version_id) = other.strip_prefix(SNAPSHOT_DIR) {
                    snapshots.push((version_id.to_owned(), bytes));
                }
            }
        }
    }

    let manifest_bytes = manifest_bytes.ok_or(ArchiveError::MissingFile {
        name: MANIFEST_PATH,
    })?;
    let manifest: Manifest =
        serde_json::from_slice(&manifest_bytes).map_err(|source| ArchiveError::Json {
            file: MANIFEST_PATH,
            source,
        })?;

    let seal_bytes = hex::decode(&manifest.seal).map_err(|_| ArchiveError::InvalidManifest {
        reason: "seal is not valid hex".to_owned(),
    })?;
    let seal: [u8; 32] = seal_bytes
        .try_into()
        .map_err(|_| ArchiveError::InvalidManifest {
            reason: "seal is not 32 bytes".to_owned(),
        })?;

    let chain_bytes = chain_bytes.ok_or(ArchiveError::MissingFile { name: CHAIN_PATH })?;
    let logs = decode_entries(&chain_bytes, max_message_bytes)?;

    let diff_bytes = diff_bytes.ok_or(ArchiveError::MissingFile { name: DIFFS_PATH })?;
    let diffs = decode_version_records(&diff_bytes)?;

    let metadata_bytes = metadata_bytes.ok_or(ArchiveError::MissingFile {
        name: METADATA_PATH,
    })?;
    let metadata: BTreeMap<String, String> =
        serde_json::from_slice(&metadata_bytes).map_err(|source| ArchiveError::Json {
            file: METADATA_PATH,
            source,
        })?;

    // The manifest and metadata must agree on the schema before any
    // deeper validation reads either.
    if metadata.get("schema_version") != Some(&manifest.schema_version) {
        return Err(ArchiveError::InvalidManifest {
            reason: "schema_version differs between manifest and metadata".to_owned(),
        });
    }

    let snapshots = snapshots
        .into_iter()
        .map(|(version_id, bytes)| {
            Ok(StateSnapshot {
                version_id,
                state: KeyedState::from_canonical_bytes(&bytes)?,
            })
        })
        .collect::<Result<Vec<_>, ArchiveError>>()?;

    Ok(IncidentBundle {
        id: manifest.id,
        created_at_ns: manifest.created_at_ns,
        window: manifest.window,
        logs,
        snapshots,
        diffs,
        metadata,
        size_bytes: manifest.size_bytes,
        seal,
    })
}

fn append_file<W: std::io::Write>(
    builder: &mut Builder<W>,
    path: &str,
    bytes: &[u8],
) -> Result<(), ArchiveError> {
    let mut header = Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, bytes)?;
    Ok(())
}
