use std::sync::Arc;

use crate::clock::ManualClock;
use crate::crypto::HmacSha256Crypto;

use super::*;

fn state_with(entries: &[(&str, &[u8])]) -> KeyedState {
    let mut state = KeyedState::new();
    for (id, bytes) in entries {
        state = apply(
            &state,
            &Diff::Add {
                id: (*id).to_owned(),
                bytes: bytes.to_vec(),
            },
        )
        .unwrap();
    }
    state
}

/// Modify {x: "A"} to {x: "B"}, then revert; byte-compare equal.
#[test]
fn test_modify_then_revert_restores_bytes() {
    let state = state_with(&[("x", b"A")]);
    let diff = Diff::Modify {
        id: "x".to_owned(),
        old: b"A".to_vec(),
        new: b"B".to_vec(),
    };

    let modified = apply(&state, &diff).unwrap();
    assert_eq!(modified.get("x"), Some(b"B".as_slice()));

    let reverted = revert(&modified, &diff).unwrap();
    assert_eq!(reverted.get("x"), Some(b"A".as_slice()));
    assert_eq!(reverted.canonical_bytes(), state.canonical_bytes());
}

#[test]
fn test_add_errors_on_existing_id() {
    let state = state_with(&[("x", b"A")]);
    let err = apply(
        &state,
        &Diff::Add {
            id: "x".to_owned(),
            bytes: b"B".to_vec(),
        },
    )
    .unwrap_err();
    assert_eq!(err.variant, "Add");
}

#[test]
fn test_delete_errors_on_mismatched_old() {
    let state = state_with(&[("x", b"A")]);
    let err = apply(
        &state,
        &Diff::Delete {
            id: "x".to_owned(),
            old: b"stale".to_vec(),
        },
    )
    .unwrap_err();
    assert_eq!(err.variant, "Delete");
    // The refused apply left the state untouched.
    assert_eq!(state.get("x"), Some(b"A".as_slice()));
}

#[test]
fn test_modify_errors_on_absent_id() {
    let state = KeyedState::new();
    let err = apply(
        &state,
        &Diff::Modify {
            id: "missing".to_owned(),
            old: b"A".to_vec(),
            new: b"B".to_vec(),
        },
    )
    .unwrap_err();
    assert_eq!(err.variant, "Modify");
}

#[test]
fn test_delete_carries_displaced_bytes() {
    let state = state_with(&[("x", b"payload")]);
    let diff = Diff::Delete {
        id: "x".to_owned(),
        old: b"payload".to_vec(),
    };

    let deleted = apply(&state, &diff).unwrap();
    assert!(!deleted.contains("x"));

    // Revert needs no journal: the diff itself restores the content.
    let restored = revert(&deleted, &diff).unwrap();
    assert_eq!(restored, state);
}

#[test]
fn test_meta_pairs_are_exact() {
    let state = state_with(&[("x", b"A")]);
    let add = Diff::MetaAdd {
        id: "x".to_owned(),
        key: "owner".to_owned(),
        value: "ops".to_owned(),
    };

    let with_meta = apply(&state, &add).unwrap();
    assert!(with_meta
        .meta_pairs("x")
        .contains(&("owner".to_owned(), "ops".to_owned())));

    // Duplicate pair refuses.
    assert!(apply(&with_meta, &add).is_err());

    // Removing a pair that is not there refuses.
    let del_wrong = Diff::MetaDel {
        id: "x".to_owned(),
        key: "owner".to_owned(),
        value: "elsewhere".to_owned(),
    };
    assert!(apply(&with_meta, &del_wrong).is_err());

    let back = revert(&with_meta, &add).unwrap();
    assert_eq!(back, state);
}

#[test]
fn test_compose_applies_in_order_and_reverts_in_reverse() {
    let state = KeyedState::new();
    let diff = Diff::Compose {
        first: Box::new(Diff::Add {
            id: "x".to_owned(),
            bytes: b"A".to_vec(),
        }),
        second: Box::new(Diff::Modify {
            id: "x".to_owned(),
            old: b"A".to_vec(),
            new: b"B".to_vec(),
        }),
    };

    let applied = apply(&state, &diff).unwrap();
    assert_eq!(applied.get("x"), Some(b"B".as_slice()));

    let reverted = revert(&applied, &diff).unwrap();
    assert_eq!(reverted, state);
}

#[test]
fn test_compose_failure_leaves_state_unchanged() {
    let state = state_with(&[("x", b"A")]);
    // First child succeeds, second fails: the composed apply must be a
    // no-op overall.
    let diff = Diff::Compose {
        first: Box::new(Diff::Modify {
            id: "x".to_owned(),
            old: b"A".to_vec(),
            new: b"B".to_vec(),
        }),
        second: Box::new(Diff::Add {
            id: "x".to_owned(),
            bytes: b"C".to_vec(),
        }),
    };

    let err = apply(&state, &diff).unwrap_err();
    // The failing child's error propagates intact.
    assert_eq!(err.variant, "Add");
    assert_eq!(state.get("x"), Some(b"A".as_slice()));
}

#[test]
fn test_chunked_blob_roundtrip() {
    let big = vec![0xabu8; CHUNK_THRESHOLD_BYTES + 10];
    let state = KeyedState::new();
    let diff = Diff::Add {
        id: "blob".to_owned(),
        bytes: big.clone(),
    };

    let applied = apply(&state, &diff).unwrap();
    assert_eq!(applied.get("blob"), Some(big.as_slice()));
    assert_eq!(revert(&applied, &diff).unwrap(), state);
}

/// 10,000 apply/revert pairs leave the state byte-identical.
#[test]
fn test_cycle_stress_is_byte_identical() {
    let state = state_with(&[("a", b"alpha"), ("b", b"beta")]);
    let baseline = state.canonical_bytes();

    let diffs = [
        Diff::Modify {
            id: "a".to_owned(),
            old: b"alpha".to_vec(),
            new: b"ALPHA".to_vec(),
        },
        Diff::Delete {
            id: "b".to_owned(),
            old: b"beta".to_vec(),
        },
        Diff::Compose {
            first: Box::new(Diff::Add {
                id: "c".to_owned(),
                bytes: b"gamma".to_vec(),
            }),
            second: Box::new(Diff::MetaAdd {
                id: "c".to_owned(),
                key: "origin".to_owned(),
                value: "stress".to_owned(),
            }),
        },
    ];

    let mut current = state;
    for i in 0..10_000 {
        let diff = &diffs[i % diffs.len()];
        let applied = apply(&current, diff).unwrap();
        current = revert(&applied, diff).unwrap();
    }
    assert_eq!(current.canonical_bytes(), baseline);
}

#[test]
fn test_state_canonical_roundtrip() {
    let mut state = state_with(&[("x", b"A"), ("y", b"longer content")]);
    state = apply(
        &state,
        &Diff::MetaAdd {
            id: "x".to_owned(),
            key: "k".to_owned(),
            value: "v".to_owned(),
        },
    )
    .unwrap();

    let bytes = state.canonical_bytes();
    let decoded = KeyedState::from_canonical_bytes(&bytes).unwrap();
    assert_eq!(decoded, state);
    assert_eq!(decoded.canonical_bytes(), bytes);
}

#[test]
fn test_state_decode_rejects_truncation() {
    let state = state_with(&[("x", b"A")]);
    let bytes = state.canonical_bytes();
    let result = KeyedState::from_canonical_bytes(&bytes[..bytes.len() - 1]);
    assert!(matches!(result, Err(StateDecodeError::Truncated { .. })));
}

#[test]
fn test_state_decode_rejects_trailing_bytes() {
    let state = state_with(&[("x", b"A")]);
    let mut bytes = state.canonical_bytes();
    bytes.push(0);
    let result = KeyedState::from_canonical_bytes(&bytes);
    assert!(matches!(result, Err(StateDecodeError::TrailingBytes { .. })));
}

#[test]
fn test_content_hash_tracks_content() {
    let crypto = HmacSha256Crypto::new();
    let a = state_with(&[("x", b"A")]);
    let b = state_with(&[("x", b"B")]);
    assert_ne!(a.content_hash(&crypto), b.content_hash(&crypto));
    assert_eq!(a.content_hash(&crypto), state_with(&[("x", b"A")]).content_hash(&crypto));
}

#[test]
fn test_diff_json_roundtrip() {
    let diff = Diff::Compose {
        first: Box::new(Diff::Add {
            id: "x".to_owned(),
            bytes: vec![0x00, 0xff, 0x7f],
        }),
        second: Box::new(Diff::MetaAdd {
            id: "x".to_owned(),
            key: "k".to_owned(),
            value: "v".to_owned(),
        }),
    };

    let json = serde_json::to_string(&diff).unwrap();
    // Blob bytes travel as lowercase hex.
    assert!(json.contains("00ff7f"));
    let back: Diff = serde_json::from_str(&json).unwrap();
    assert_eq!(back, diff);
}

fn version_log() -> (Arc<ManualClock>, VersionLog) {
    let clock = Arc::new(ManualClock::starting_at(1_000));
    let log = VersionLog::new(
        Arc::new(HmacSha256Crypto::new()),
        Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
    );
    (clock, log)
}

#[test]
fn test_version_log_links_parents() {
    let (clock, log) = version_log();

    let first = log
        .commit(Diff::Add {
            id: "x".to_owned(),
            bytes: b"A".to_vec(),
        })
        .unwrap();
    clock.advance(10);
    let second = log
        .commit(Diff::Modify {
            id: "x".to_owned(),
            old: b"A".to_vec(),
            new: b"B".to_vec(),
        })
        .unwrap();

    assert_eq!(first.parent, None);
    assert_eq!(second.parent.as_deref(), Some(first.version_id.as_str()));
    assert!(second.committed_at_ns > first.committed_at_ns);
    assert_eq!(log.current_state().get("x"), Some(b"B".as_slice()));
}

#[test]
fn test_version_log_rejects_bad_precondition() {
    let (_clock, log) = version_log();
    let err = log
        .commit(Diff::Modify {
            id: "missing".to_owned(),
            old: b"A".to_vec(),
            new: b"B".to_vec(),
        })
        .unwrap_err();
    assert_eq!(err.variant, "Modify");
    assert!(log.records().is_empty());
}

#[test]
fn test_version_log_rollback_restores_state() {
    let (_clock, log) = version_log();
    log.commit(Diff::Add {
        id: "x".to_owned(),
        bytes: b"A".to_vec(),
    })
    .unwrap();
    let before = log.current_state();

    log.commit(Diff::Modify {
        id: "x".to_owned(),
        old: b"A".to_vec(),
        new: b"B".to_vec(),
    })
    .unwrap();

    log.rollback_last().unwrap();
    assert_eq!(log.current_state().canonical_bytes(), before.canonical_bytes());
    assert_eq!(log.records().len(), 1);

    log.rollback_last().unwrap();
    assert!(matches!(log.rollback_last(), Err(RollbackError::Empty)));
}

#[test]
fn test_state_before_replays_history() {
    let (clock, log) = version_log();
    log.commit(Diff::Add {
        id: "x".to_owned(),
        bytes: b"A".to_vec(),
    })
    .unwrap();
    clock.advance(100);
    let second = log
        .commit(Diff::Modify {
            id: "x".to_owned(),
            old: b"A".to_vec(),
            new: b"B".to_vec(),
        })
        .unwrap();

    // Just before the second commit, the state still held "A".
    let (anchor, state) = log.state_before(second.committed_at_ns);
    assert!(anchor.is_some());
    assert_eq!(state.get("x"), Some(b"A".as_slice()));

    // Before everything, the state is empty with no anchor.
    let (anchor, state) = log.state_before(0);
    assert_eq!(anchor, None);
    assert!(state.is_empty());
}

#[test]
fn test_version_record_stream_roundtrip() {
    let (clock, log) = version_log();
    log.commit(Diff::Add {
        id: "x".to_owned(),
        bytes: b"A".to_vec(),
    })
    .unwrap();
    clock.advance(1);
    log.commit(Diff::MetaAdd {
        id: "x".to_owned(),
        key: "k".to_owned(),
        value: "v".to_owned(),
    })
    .unwrap();

    let records = log.records();
    let bytes = encode_version_records(&records);
    let decoded = decode_version_records(&bytes).unwrap();
    assert_eq!(decoded, records);
}

#[test]
fn test_version_record_stream_rejects_truncation() {
    let (_clock, log) = version_log();
    log.commit(Diff::Add {
        id: "x".to_owned(),
        bytes: b"A".to_vec(),
    })
    .unwrap();

    let bytes = encode_version_records(&log.records());
    let result = decode_version_records(&bytes[..bytes.len() - 1]);
    assert!(matches!(result, Err(RecordDecodeError::Truncated { .. })));
}

mod fuzz {
    use proptest::prelude::*;

    use super::*;

    fn id_strategy() -> impl Strategy<Value = String> {
        "[a-d]{1,2}".prop_map(String::from)
    }

    fn blob_strategy() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 0..32)
    }

    /// A diff whose preconditions hold against `state`, when one exists.
    fn applicable_diff(state: &KeyedState, id: String, blob: Vec<u8>) -> Diff {
        match state.get(&id) {
            Some(current) => Diff::Modify {
                id,
                old: current.to_vec(),
                new: blob,
            },
            None => Diff::Add { id, bytes: blob },
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Property: `revert(apply(s, d), d) = s` for applicable diffs.
        #[test]
        fn prop_revert_after_apply_is_identity(
            seed in proptest::collection::vec((id_strategy(), blob_strategy()), 0..6),
            id in id_strategy(),
            blob in blob_strategy(),
        ) {
            let mut state = KeyedState::new();
            for (id, blob) in seed {
                let diff = applicable_diff(&state, id, blob);
                state = apply(&state, &diff).unwrap();
            }

            let diff = applicable_diff(&state, id, blob);
            let applied = apply(&state, &diff).unwrap();
            let reverted = revert(&applied, &diff).unwrap();
            prop_assert_eq!(reverted.canonical_bytes(), state.canonical_bytes());

            // And the other direction: apply(revert(s', d), d) = s'.
            let reapplied = apply(&reverted, &diff).unwrap();
            prop_assert_eq!(reapplied.canonical_bytes(), applied.canonical_bytes());
        }

        /// Property: a failed apply leaves no observable change.
        #[test]
        fn prop_failed_apply_is_noop(
            id in id_strategy(),
            blob in blob_strategy(),
        ) {
            let state = {
                let mut s = KeyedState::new();
                s = apply(&s, &Diff::Add { id: id.clone(), bytes: blob.clone() }).unwrap();
                s
            };
            let before = state.canonical_bytes();

            // Adding the same id again always violates the precondition.
            let result = apply(&state, &Diff::Add { id, bytes: blob });
            prop_assert!(result.is_err());
            prop_assert_eq!(state.canonical_bytes(), before);
        }
    }
}
