//! `attest rate-verify` and `attest version-verify`
//!
//! Property-style self-tests runnable in the field, where the full test
//! suite is not available. Inputs are generated with a fixed-seed xorshift
//! generator so every run checks the same sequences.

use std::process::ExitCode;

use attest_core::diff::{Diff, KeyedState, apply, revert};
use attest_core::limiter::SlidingWindowLimiter;
use serde_json::json;

use super::report;

const SECOND: u64 = 1_000_000_000;

/// Deterministic xorshift64 generator.
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

/// Drives the limiter through a generated admission sequence and checks
/// the windowed budget against a brute-force oracle.
pub fn rate() -> ExitCode {
    let capacity = 10u64;
    let duration_s = 60u64;
    let limiter = SlidingWindowLimiter::with_parameters(capacity, duration_s * SECOND, 64);
    let keys = ["alpha", "beta", "tenant-1:resource"];

    let mut rng = Xorshift(0x243f_6a88_85a3_08d3);
    let mut now_ns = 0u64;
    let mut admitted: Vec<(u64, usize, u64)> = Vec::new();

    for step in 0..10_000u64 {
        now_ns += rng.next() % (4 * SECOND);
        let key_index = (rng.next() % keys.len() as u64) as usize;
        let cost = 1 + rng.next() % 3;

        if limiter.admit(keys[key_index], now_ns, cost).is_allow() {
            admitted.push((now_ns, key_index, cost));
        }

        // Oracle: the admitted total per key inside (now - duration, now]
        // must never exceed the capacity.
        let cutoff = now_ns.checked_sub(duration_s * SECOND);
        for key_index in 0..keys.len() {
            let in_window: u64 = admitted
                .iter()
                .filter(|(ts, k, _)| {
                    *k == key_index && cutoff.map_or(true, |c| *ts > c) && *ts <= now_ns
                })
                .map(|(_, _, c)| *c)
                .sum();
            if in_window > capacity {
                return report(
                    &json!({
                        "result": "invalid",
                        "reason": "windowed budget exceeded",
                        "step": step,
                        "key": keys[key_index],
                        "admitted": in_window,
                        "capacity": capacity,
                    }),
                    false,
                );
            }
        }
    }

    let stats = limiter.stats();
    report(
        &json!({
            "result": "valid",
            "allowed": stats.allowed,
            "denied": stats.denied,
        }),
        true,
    )
}

/// Runs 10,000 apply/revert cycles over generated diffs and checks the
/// state comes back byte-identical every time.
pub fn versions() -> ExitCode {
    let mut rng = Xorshift(0x1319_8a2e_0370_7344);
    let mut state = KeyedState::new();

    // Seed a handful of blobs to modify and delete against.
    for i in 0..4 {
        state = apply(
            &state,
            &Diff::Add {
                id: format!("seed-{i}"),
                bytes: vec![i as u8; 16],
            },
        )
        .expect("seed blobs are fresh");
    }

    for cycle in 0..10_000u64 {
        let diff = generate_diff(&mut rng, &state, cycle);
        let before = state.canonical_bytes();

        let applied = match apply(&state, &diff) {
            Ok(applied) => applied,
            Err(err) => {
                return report(
                    &json!({
                        "result": "invalid",
                        "reason": format!("apply refused a generated diff: {err}"),
                        "cycle": cycle,
                    }),
                    false,
                );
            }
        };
        let reverted = match revert(&applied, &diff) {
            Ok(reverted) => reverted,
            Err(err) => {
                return report(
                    &json!({
                        "result": "invalid",
                        "reason": format!("revert refused: {err}"),
                        "cycle": cycle,
                    }),
                    false,
                );
            }
        };

        if reverted.canonical_bytes() != before {
            return report(
                &json!({
                    "result": "invalid",
                    "reason": "revert did not restore the state byte-identically",
                    "cycle": cycle,
                }),
                false,
            );
        }
    }

    report(&json!({"result": "valid", "cycles": 10_000}), true)
}

/// A diff whose preconditions hold against `state`.
fn generate_diff(rng: &mut Xorshift, state: &KeyedState, cycle: u64) -> Diff {
    let target = format!("seed-{}", rng.next() % 4);
    let current = state
        .get(&target)
        .expect("seed blobs stay present")
        .to_vec();

    match rng.next() % 4 {
        0 => Diff::Modify {
            id: target,
            old: current,
            new: cycle.to_be_bytes().to_vec(),
        },
        1 => Diff::Compose {
            first: Box::new(Diff::Delete {
                id: target.clone(),
                old: current.clone(),
            }),
            second: Box::new(Diff::Add {
                id: target,
                bytes: current,
            }),
        },
        2 => Diff::MetaAdd {
            id: target,
            key: format!("cycle-{cycle}"),
            value: "checked".to_owned(),
        },
        _ => Diff::Add {
            id: format!("fresh-{cycle}"),
            bytes: cycle.to_be_bytes().to_vec(),
        },
    }
}
