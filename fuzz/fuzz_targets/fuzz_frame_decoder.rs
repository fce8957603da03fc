//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder and
//! asserts that it never panics and never yields an empty or oversized
//! payload, whether the input arrives in one piece or split in two.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use bleconfd::rpc::codec::FrameDecoder;
use libfuzzer_sys::fuzz_target;

const MAX_FRAME: usize = 4096;

fuzz_target!(|data: &[u8]| {
    let mut whole = FrameDecoder::new(MAX_FRAME);
    let frames = whole.feed(data);
    for payload in &frames {
        assert!(payload.len() <= MAX_FRAME, "payload exceeds max frame size");
        assert!(!payload.is_empty(), "decoder must not yield empty payload");
    }

    // Split at an input-derived point: same frames either way.
    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let mut halves = FrameDecoder::new(MAX_FRAME);
    let mut again = halves.feed(&data[..split]);
    again.extend(halves.feed(&data[split..]));
    assert_eq!(frames, again, "framing depends on chunking");

    // After a reset the decoder must accept bytes cleanly again.
    whole.reset();
    let _ = whole.feed(data);
});
