//! Fuzz testing for frame name normalization and vendor filtering.
//!
//! Symbol names and file paths come straight from debug info, so these
//! functions must hold up on anything:
//!
//! - Never panic on any input
//! - Always produce a non-empty operation label
//! - Never return more frames than were offered, or more than the depth cap
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the frame fuzz target
//! cargo +nightly fuzz run fuzz_frames
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_frames -- -max_total_time=60
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rk_cursor::frame::{
    MAX_STACK_DEPTH, StackFrame, VendorFilter, capture_filtered_stack, normalize_function_name,
    resolve_operation, resolve_parent,
};

#[derive(Debug, Arbitrary)]
struct Input {
    frames: Vec<(String, String, u32)>,
    markers: Vec<String>,
    skip: u8,
}

fuzz_target!(|input: Input| {
    let filter = VendorFilter::new(input.markers);
    let frames: Vec<StackFrame> = input
        .frames
        .into_iter()
        .map(|(function, file, line)| StackFrame::new(function, file, line))
        .collect();
    let skip = usize::from(input.skip);

    for frame in &frames {
        assert!(!normalize_function_name(&frame.function).is_empty());
        let _ = filter.is_vendor(&frame.file);
    }

    assert!(!resolve_operation(&frames, skip).is_empty());
    assert!(!resolve_parent(&frames, skip, &filter).is_empty());

    let stack = capture_filtered_stack(&frames, skip, &filter);
    assert!(stack.len() <= frames.len().saturating_sub(skip));
    assert!(stack.len() <= MAX_STACK_DEPTH);
    assert!(stack.iter().all(|frame| !filter.is_vendor(&frame.file)));
});
