//! Fuzz target for 12-byte binary edge records.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pa_core::input::{BinaryEdgeReader, EdgeSource, BINARY_RECORD_SIZE};

fuzz_target!(|data: &[u8]| {
    let mut reader = BinaryEdgeReader::new(data);
    let mut records = 0usize;
    loop {
        match reader.next_edge() {
            Ok(Some(_)) => records += 1,
            Ok(None) => {
                assert_eq!(data.len() % BINARY_RECORD_SIZE, 0);
                break;
            }
            Err(_) => {
                assert_ne!(data.len() % BINARY_RECORD_SIZE, 0);
                break;
            }
        }
    }
    assert_eq!(records, data.len() / BINARY_RECORD_SIZE);
});
