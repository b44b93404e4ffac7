#![no_main]
use libfuzzer_sys::fuzz_target;

use attest_core::diff::{KeyedState, decode_version_records};

fuzz_target!(|data: &[u8]| {
    // State decoding round-trips through the canonical encoding.
    if let Ok(state) = KeyedState::from_canonical_bytes(data) {
        let canonical = state.canonical_bytes();
        let again = KeyedState::from_canonical_bytes(&canonical).unwrap();
        assert_eq!(again, state);
    }

    // Version record streams must reject garbage without panicking.
    let _ = decode_version_records(data);
});
