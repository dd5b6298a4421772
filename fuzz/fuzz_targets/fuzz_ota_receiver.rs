//! Fuzz target: `ota::OtaReceiver::handle`
//!
//! Splits the input into inbound writes (first byte of each record is its
//! length, with a small bias toward the two command strings) and checks
//! that the receiver never panics and that its byte count always matches
//! what the in-memory storage actually holds.
//!
//! cargo fuzz run fuzz_ota_receiver

#![no_main]

use critical_section as _;
use libfuzzer_sys::fuzz_target;
use vitalstream::adapters::ota_storage::FlashUpdateStorage;
use vitalstream::ota::{OtaReceiver, OtaState, CMD_BEGIN, CMD_END};

fuzz_target!(|data: &[u8]| {
    let mut rx = OtaReceiver::new(FlashUpdateStorage::new());
    let mut rest = data;

    while let Some((&tag, tail)) = rest.split_first() {
        let chunk: &[u8] = match tag {
            0xF0 => CMD_BEGIN,
            0xF1 => CMD_END,
            n => {
                let len = usize::from(n).min(tail.len());
                let (chunk, after) = tail.split_at(len);
                rest = after;
                let _ = rx.handle(chunk);
                check(&rx);
                continue;
            }
        };
        rest = tail;
        let _ = rx.handle(chunk);
        check(&rx);
    }

    rx.abort();
    assert_eq!(rx.state(), OtaState::Idle);
});

fn check(rx: &OtaReceiver<FlashUpdateStorage>) {
    match rx.state() {
        OtaState::InProgress => {
            let pending = rx.storage().pending_len().unwrap_or(0) as u64;
            assert_eq!(pending, rx.total_written());
        }
        OtaState::Idle => {}
    }
}
