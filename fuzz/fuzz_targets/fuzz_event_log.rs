//! Fuzz target for event log replay.
//!
//! Logs that do not describe a reachable degree sequence must be rejected
//! with an error; the rank tree stays consistent either way.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pa_core::input::{EventLogReader, TableReader};
use pa_core::replay::RankReplay;
use pa_core::sink::CollectingSink;
use pa_tree::{build_index, Allocator, TreeVariant};

fuzz_target!(|data: &[u8]| {
    let mut log = EventLogReader::new(TableReader::new(data));
    let mut replay = RankReplay::new(build_index::<u32>(TreeVariant::Multiset, Allocator::Boxed, &[0.0, 2.0]));
    let mut sink = CollectingSink::new();
    while let Ok(Some(event)) = log.next_event() {
        if replay.apply(&event, log.record(), &mut sink).is_err() {
            break;
        }
    }
    if let Err(msg) = replay.index().check() {
        panic!("tree invariant broken: {}", msg);
    }
});
