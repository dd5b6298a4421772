//! Fuzz target: `telemetry::frame::decode`
//!
//! Feeds arbitrary bytes to the frame decoder and asserts that it never
//! panics, and that anything it accepts re-encodes to the exact same bytes.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use critical_section as _;
use libfuzzer_sys::fuzz_target;
use vitalstream::telemetry::frame::{decode, encode, MAX_FRAME_LEN};

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = decode(data) {
        assert!(data.len() <= MAX_FRAME_LEN, "accepted an oversized frame");
        assert!(
            frame.motion.is_some() || frame.bpm.is_some(),
            "accepted a frame with no payload"
        );
        let again = encode(&frame);
        assert_eq!(&again[..], data, "decode/encode is not canonical");
    }
});
