#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic or over-allocate; on
    // success the records must re-encode to the same bytes.
    if let Ok(entries) = attest_core::chain::decode_entries(data, 65_536) {
        let reencoded = attest_core::chain::encode_entries(&entries);
        assert_eq!(reencoded, data);
    }
});
