//! Fuzz target for the edge stream state machine.
//!
//! Runs structured edge sequences over a small node set and checks the
//! heap and rank tree after every edge.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pa_core::input::{EdgeInput, NodeIndex};
use pa_core::sink::CollectingSink;
use pa_core::stream::{EdgeStreamProcessor, ProcessorOptions};
use pa_heap::EdgeStore;
use pa_tree::{build_index, Allocator, TreeVariant};

#[derive(Debug, Arbitrary)]
struct Step {
    source: u8,
    target: u8,
    advance: u8,
}

#[derive(Debug, Arbitrary)]
struct Input {
    window: u8,
    map: bool,
    steps: Vec<Step>,
}

fuzz_target!(|input: Input| {
    let variant = if input.map { TreeVariant::Map } else { TreeVariant::Multiset };
    let options = ProcessorOptions {
        window: u32::from(input.window),
        heap_chunk: 2,
        ..ProcessorOptions::default()
    };
    let ranks = build_index::<u32>(variant, Allocator::Compact, &[1.0]);
    let Ok(mut processor) = EdgeStreamProcessor::new(options, NodeIndex::dynamic(), EdgeStore::new(), Some(ranks)) else {
        return;
    };
    let mut sink = CollectingSink::new();
    let mut ts = 0u32;
    for (i, step) in input.steps.iter().enumerate() {
        ts += u32::from(step.advance);
        let edge = EdgeInput {
            source: u32::from(step.source % 16),
            target: u32::from(step.target % 16),
            timestamp: ts,
            record: i as u64 + 1,
        };
        if let Err(err) = processor.process(&edge, &mut sink) {
            panic!("sorted stream rejected: {}", err);
        }
        if let Err(msg) = processor.check() {
            panic!("invariant broken after record {}: {}", i + 1, msg);
        }
        for (_, rank) in sink.events.drain(..) {
            let Some(rank) = rank else { continue };
            assert!(rank.weighted.iter().all(|r| (0.0..=1.0).contains(r)));
            assert!(rank.count <= rank.norm_count);
        }
    }
});
