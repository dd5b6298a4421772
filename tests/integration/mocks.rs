//! Mock adapters shared by the integration tests.
//!
//! Everything here is shareable through `Arc` so a test can keep a handle
//! after the adapter has been boxed into the BLE link.

use std::sync::{Arc, Mutex};

use vitalstream::adapters::ota_storage::FlashUpdateStorage;
use vitalstream::app::ports::{RestartPort, UpdateStorage};
use vitalstream::error::StorageError;

// ── Update storage ────────────────────────────────────────────

/// In-memory flash image behind a shared lock.
#[derive(Clone, Default)]
pub struct SharedStorage(pub Arc<Mutex<FlashUpdateStorage>>);

#[allow(dead_code)]
impl SharedStorage {
    pub fn activated(&self) -> Option<Vec<u8>> {
        self.0.lock().unwrap().activated_image().map(<[u8]>::to_vec)
    }

    pub fn pending_len(&self) -> Option<usize> {
        self.0.lock().unwrap().pending_len()
    }
}

impl UpdateStorage for SharedStorage {
    fn begin_update(&mut self) -> Result<(), StorageError> {
        self.0.lock().unwrap().begin_update()
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.0.lock().unwrap().write(chunk)
    }

    fn commit_and_activate(&mut self) -> Result<(), StorageError> {
        self.0.lock().unwrap().commit_and_activate()
    }

    fn abort_update(&mut self) {
        self.0.lock().unwrap().abort_update();
    }
}

// ── Restart ───────────────────────────────────────────────────

/// Records requested restart delays instead of rebooting.
#[derive(Clone, Default)]
pub struct SharedRestart(pub Arc<Mutex<Vec<u32>>>);

impl SharedRestart {
    pub fn requests(&self) -> Vec<u32> {
        self.0.lock().unwrap().clone()
    }
}

impl RestartPort for SharedRestart {
    fn schedule_restart(&mut self, delay_ms: u32) {
        self.0.lock().unwrap().push(delay_ms);
    }
}

/// Deterministic firmware image: byte `i` is `i * 7 mod 251`.
pub fn fake_image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}
