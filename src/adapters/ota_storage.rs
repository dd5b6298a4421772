//! Firmware image storage backed by the `esp-ota` crate.
//!
//! Implements [`UpdateStorage`] on the inactive OTA partition.  On host
//! targets the image is kept in memory so the receiver can be exercised
//! end to end.  Also hosts the boot-time rollback check and the deferred
//! restart used after a committed update.

use log::{info, warn};

use crate::app::ports::{RestartPort, UpdateStorage};
use crate::error::StorageError;

// ── Flash storage ─────────────────────────────────────────────

#[cfg(target_os = "espidf")]
enum Slot {
    Empty,
    Writing(esp_ota::OtaUpdate),
    /// Image verified but not yet bootable (activation failed once).
    Finalized(esp_ota::CompletedOtaUpdate),
}

pub struct FlashUpdateStorage {
    #[cfg(target_os = "espidf")]
    slot: Slot,
    #[cfg(not(target_os = "espidf"))]
    sim: SimImage,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimImage {
    writing: Option<Vec<u8>>,
    activated: Option<Vec<u8>>,
}

impl Default for FlashUpdateStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashUpdateStorage {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            slot: Slot::Empty,
            #[cfg(not(target_os = "espidf"))]
            sim: SimImage::default(),
        }
    }

    /// Image activated by the last successful commit (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn activated_image(&self) -> Option<&[u8]> {
        self.sim.activated.as_deref()
    }

    /// Bytes of the session being written (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn pending_len(&self) -> Option<usize> {
        self.sim.writing.as_ref().map(Vec::len)
    }
}

#[cfg(target_os = "espidf")]
impl UpdateStorage for FlashUpdateStorage {
    fn begin_update(&mut self) -> Result<(), StorageError> {
        // Any previous partial session is dropped, which aborts it.
        self.slot = Slot::Empty;
        let update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("OTA: esp-ota begin failed: {:?}", e);
            StorageError::BeginFailed
        })?;
        self.slot = Slot::Writing(update);
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        let Slot::Writing(update) = &mut self.slot else {
            return Err(StorageError::NotOpen);
        };
        update.write(chunk).map_err(|e| {
            warn!("OTA: esp-ota write failed: {:?}", e);
            StorageError::WriteFailed
        })
    }

    fn commit_and_activate(&mut self) -> Result<(), StorageError> {
        let mut completed = match core::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Writing(update) => update.finalize().map_err(|e| {
                warn!("OTA: esp-ota finalize failed: {:?}", e);
                StorageError::VerifyFailed
            })?,
            Slot::Finalized(completed) => completed,
            Slot::Empty => return Err(StorageError::NotOpen),
        };
        if let Err(e) = completed.set_as_boot_partition() {
            warn!("OTA: set_as_boot_partition failed: {:?}", e);
            // Keep the verified image so a retry only redoes activation.
            self.slot = Slot::Finalized(completed);
            return Err(StorageError::ActivateFailed);
        }
        Ok(())
    }

    fn abort_update(&mut self) {
        // esp-ota aborts automatically when OtaUpdate is dropped.
        self.slot = Slot::Empty;
    }
}

#[cfg(not(target_os = "espidf"))]
impl UpdateStorage for FlashUpdateStorage {
    fn begin_update(&mut self) -> Result<(), StorageError> {
        self.sim.writing = Some(Vec::new());
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        let image = self.sim.writing.as_mut().ok_or(StorageError::NotOpen)?;
        image.extend_from_slice(chunk);
        Ok(())
    }

    fn commit_and_activate(&mut self) -> Result<(), StorageError> {
        match self.sim.writing.as_ref() {
            None => return Err(StorageError::NotOpen),
            // An empty image stays open, like a finalize failure on flash.
            Some(image) if image.is_empty() => return Err(StorageError::VerifyFailed),
            Some(_) => {}
        }
        let image = self.sim.writing.take().unwrap_or_default();
        info!("OTA(sim): activated {}-byte image", image.len());
        self.sim.activated = Some(image);
        Ok(())
    }

    fn abort_update(&mut self) {
        self.sim.writing = None;
    }
}

// ── Restart ───────────────────────────────────────────────────

/// Restarts the chip from a short-lived thread after a delay, so the BLE
/// callback that committed the image returns first.
#[derive(Debug, Default)]
pub struct DeviceRestart;

impl RestartPort for DeviceRestart {
    fn schedule_restart(&mut self, delay_ms: u32) {
        let spawned = std::thread::Builder::new()
            .name("restart".into())
            .stack_size(4096)
            .spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(u64::from(delay_ms)));
                restart();
            });
        if let Err(e) = spawned {
            warn!("OTA: restart thread spawn failed ({}), restarting now", e);
            restart();
        }
    }
}

#[cfg(target_os = "espidf")]
pub fn restart() -> ! {
    info!("OTA: rebooting into new firmware");
    esp_ota::restart();
}

#[cfg(not(target_os = "espidf"))]
pub fn restart() -> ! {
    panic!("OTA restart (simulation, no real hardware reset)");
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running image valid so the bootloader cancels rollback.
#[cfg(target_os = "espidf")]
pub fn mark_running_image_valid() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn mark_running_image_valid() {
    info!("OTA rollback check (simulation): skipped");
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn write_requires_open_session() {
        let mut s = FlashUpdateStorage::new();
        assert_eq!(s.write(b"x"), Err(StorageError::NotOpen));
        assert_eq!(s.commit_and_activate(), Err(StorageError::NotOpen));
    }

    #[test]
    fn commit_activates_written_bytes() {
        let mut s = FlashUpdateStorage::new();
        s.begin_update().unwrap();
        s.write(b"abc").unwrap();
        s.write(b"def").unwrap();
        assert_eq!(s.pending_len(), Some(6));
        s.commit_and_activate().unwrap();
        assert_eq!(s.activated_image(), Some(&b"abcdef"[..]));
        assert_eq!(s.pending_len(), None);
    }

    #[test]
    fn empty_image_fails_verification() {
        let mut s = FlashUpdateStorage::new();
        s.begin_update().unwrap();
        assert_eq!(s.commit_and_activate(), Err(StorageError::VerifyFailed));
        assert_eq!(s.activated_image(), None);
        // Session survives, so the peer can still deliver and commit.
        assert_eq!(s.pending_len(), Some(0));
        s.write(b"img").unwrap();
        s.commit_and_activate().unwrap();
        assert_eq!(s.activated_image(), Some(&b"img"[..]));
    }

    #[test]
    fn abort_discards_partial_image() {
        let mut s = FlashUpdateStorage::new();
        s.begin_update().unwrap();
        s.write(b"partial").unwrap();
        s.abort_update();
        assert_eq!(s.pending_len(), None);
        assert_eq!(s.write(b"more"), Err(StorageError::NotOpen));
    }
}
