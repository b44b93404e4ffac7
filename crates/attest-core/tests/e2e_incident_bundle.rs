//! End-to-end flow: telemetry in, sealed archive out, offline re-check.
//!
//! Drives all four subsystems the way a deployment would: a service logs
//! through the chain writer while the limiter admits requests, an
//! administrator commits configuration changes, an incident window is
//! declared, and the resulting archive is verified on the "auditor side"
//! with nothing but the file and the key.

use std::sync::Arc;

use attest_core::bundle::{BundleAssembler, write_archive};
use attest_core::chain::{ChainWriter, FileChainStore, LogLevel, read_chain_file, verify_chain};
use attest_core::clock::{Clock, ManualClock, Window};
use attest_core::config::CoreConfig;
use attest_core::crypto::{CryptoProvider, HmacSha256Crypto, MacKey};
use attest_core::diff::{Diff, VersionLog};
use attest_core::limiter::SlidingWindowLimiter;
use attest_core::verify::{VerifyError, verify_archive};

const T0: u64 = 1_700_000_000_000_000_000;
const SECOND: u64 = 1_000_000_000;

fn key() -> MacKey {
    MacKey::from_bytes([0x42; 32])
}

#[test]
fn incident_bundle_survives_offline_verification() {
    let dir = tempfile::tempdir().unwrap();
    let chain_path = dir.path().join("chain.bin");
    let archive_path = dir.path().join("incident.tar.gz");

    let clock = Arc::new(ManualClock::starting_at(T0));
    let crypto = Arc::new(HmacSha256Crypto::new());
    let config = CoreConfig::with_key(key());

    // Producer side: durable chain, limiter, administrator log.
    let writer = ChainWriter::new(
        Box::new(FileChainStore::open(&chain_path, config.max_log_message_bytes).unwrap()),
        Arc::clone(&crypto) as Arc<dyn CryptoProvider>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        &config,
    );
    let limiter = SlidingWindowLimiter::new(&config);
    let versions = VersionLog::new(
        Arc::clone(&crypto) as Arc<dyn CryptoProvider>,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );

    writer.append(LogLevel::Info, "service started").unwrap();
    versions
        .commit(Diff::Add {
            id: "rate-policy".to_owned(),
            bytes: b"capacity=100 duration=60".to_vec(),
        })
        .unwrap();

    // Simulated traffic: some admitted, some denied.
    for i in 0..150u64 {
        clock.advance(SECOND / 10);
        let decision = limiter.admit_now("tenant-a", clock.as_ref(), 1);
        if !decision.is_allow() {
            writer
                .append(LogLevel::Warn, format!("request {i} denied"))
                .unwrap();
        }
    }

    versions
        .commit(Diff::Modify {
            id: "rate-policy".to_owned(),
            old: b"capacity=100 duration=60".to_vec(),
            new: b"capacity=50 duration=60".to_vec(),
        })
        .unwrap();
    clock.advance(SECOND);
    writer
        .append(LogLevel::Error, "tenant-a exceeded budget repeatedly")
        .unwrap();

    // The persisted chain alone already verifies from genesis.
    let persisted = read_chain_file(&chain_path, config.max_log_message_bytes).unwrap();
    assert_eq!(persisted.len(), writer.snapshot().len());
    verify_chain(&persisted, &config.mac_key, crypto.as_ref()).unwrap();

    // Declare the incident window and seal the bundle.
    let window = Window::new(T0, clock.now_wall_ns()).unwrap();
    let assembler = BundleAssembler::new(
        Arc::clone(&crypto) as Arc<dyn CryptoProvider>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        config,
    );
    let bundle = assembler
        .build(
            window,
            &writer.snapshot(),
            &versions,
            Some(limiter.decision_digest()),
        )
        .unwrap();

    assert!(bundle.metadata.contains_key("admission_digest"));
    assert_eq!(bundle.diffs.len(), 2);
    write_archive(&bundle, &archive_path).unwrap();

    // Auditor side: nothing but the archive and the key.
    let verified = verify_archive(
        &archive_path,
        key(),
        Arc::new(HmacSha256Crypto::new()),
    )
    .unwrap();
    assert_eq!(verified.seal, bundle.seal);
    assert_eq!(verified.logs.len(), bundle.logs.len());

    // The wrong key refuses.
    let rejected = verify_archive(
        &archive_path,
        MacKey::from_bytes([0u8; 32]),
        Arc::new(HmacSha256Crypto::new()),
    );
    assert!(matches!(rejected, Err(VerifyError::Bundle(_))));
}

#[test]
fn truncated_chain_still_bundles_and_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("incident.tar.gz");

    let clock = Arc::new(ManualClock::starting_at(T0));
    let crypto = Arc::new(HmacSha256Crypto::new());
    let config = CoreConfig::with_key(key());

    let writer = ChainWriter::new(
        Box::new(attest_core::chain::MemoryChainStore::new()),
        Arc::clone(&crypto) as Arc<dyn CryptoProvider>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        &config,
    );
    let versions = VersionLog::new(
        Arc::clone(&crypto) as Arc<dyn CryptoProvider>,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );

    for i in 0..10 {
        writer.append(LogLevel::Info, format!("event {i}")).unwrap();
        clock.advance(SECOND);
    }
    // Retention drops the oldest half; the truncation is itself recorded.
    writer.truncate_before(6).unwrap();

    let window = Window::new(T0, clock.now_wall_ns()).unwrap();
    let assembler = BundleAssembler::new(
        Arc::clone(&crypto) as Arc<dyn CryptoProvider>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        config,
    );
    let bundle = assembler
        .build(window, &writer.snapshot(), &versions, None)
        .unwrap();
    write_archive(&bundle, &archive_path).unwrap();

    let verified = verify_archive(
        &archive_path,
        key(),
        Arc::new(HmacSha256Crypto::new()),
    )
    .unwrap();
    assert_eq!(verified.logs.first().map(|e| e.counter), Some(6));
    assert!(verified
        .logs
        .last()
        .is_some_and(|e| e.message.starts_with("retention truncated")));
}
