//! Fuzz target for text edge streams.
//!
//! Arbitrary text through the reader and the processor must end in events
//! or an error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pa_core::input::{EdgeSource, NodeIndex, TableReader, TextEdgeReader};
use pa_core::sink::CollectingSink;
use pa_core::stream::{EdgeStreamProcessor, ProcessorOptions};
use pa_heap::EdgeStore;
use pa_tree::{build_index, Allocator, TreeVariant};

fuzz_target!(|data: &[u8]| {
    let mut reader = TextEdgeReader::new(TableReader::new(data), true);
    let options = ProcessorOptions {
        window: 64,
        strict_order: false,
        ..ProcessorOptions::default()
    };
    let ranks = build_index::<u32>(TreeVariant::Map, Allocator::Compact, &[0.5]);
    let Ok(mut processor) = EdgeStreamProcessor::new(options, NodeIndex::dynamic(), EdgeStore::new(), Some(ranks)) else {
        return;
    };
    let mut sink = CollectingSink::with_bookkeeping();
    while let Ok(Some(edge)) = reader.next_edge() {
        if processor.process(&edge, &mut sink).is_err() {
            break;
        }
        sink.events.clear();
    }
});
