//! OTA over the simulated BLE link: peer writes → OtaLinkHandler →
//! OtaReceiver → in-memory flash image.

use std::sync::Arc;

use vitalstream::adapters::ble::{BleLink, LOCAL_ATT_MTU};
use vitalstream::adapters::ota_storage::FlashUpdateStorage;
use vitalstream::config::TelemetryConfig;
use vitalstream::error::StorageError;
use vitalstream::ota::{
    OtaError, OtaEvent, OtaLinkHandler, OtaReceiver, OtaState, CMD_BEGIN, CMD_END,
};

use crate::mocks::{fake_image, SharedRestart, SharedStorage};

const RESTART_DELAY_MS: u32 = 1000;

fn connected_link() -> (Arc<BleLink>, SharedStorage, SharedRestart) {
    let cfg = TelemetryConfig::default();
    let link = Arc::new(BleLink::new(cfg.device_name.clone()));
    let storage = SharedStorage::default();
    let restart = SharedRestart::default();
    link.set_inbound_handler(Box::new(OtaLinkHandler::new(
        OtaReceiver::new(storage.clone()),
        restart.clone(),
        RESTART_DELAY_MS,
    )));
    link.start().unwrap();
    link.on_connected(1);
    link.on_mtu_changed(LOCAL_ATT_MTU);
    (link, storage, restart)
}

fn push_image(link: &BleLink, image: &[u8]) {
    let chunk = usize::from(LOCAL_ATT_MTU - 3);
    for part in image.chunks(chunk) {
        link.on_write(part);
    }
}

#[test]
fn full_image_is_activated_and_restart_scheduled() {
    let (link, storage, restart) = connected_link();
    let image = fake_image(64 * 1024 + 17);

    link.on_write(CMD_BEGIN);
    push_image(&link, &image);
    assert_eq!(storage.pending_len(), Some(image.len()));
    assert!(restart.requests().is_empty());

    link.on_write(CMD_END);
    assert_eq!(storage.activated(), Some(image));
    assert_eq!(restart.requests(), vec![RESTART_DELAY_MS]);
}

#[test]
fn disconnect_mid_transfer_discards_partial_image() {
    let (link, storage, restart) = connected_link();

    link.on_write(CMD_BEGIN);
    push_image(&link, &fake_image(4000));
    link.on_disconnected();
    assert_eq!(storage.pending_len(), None);

    // Reconnect and start over: only the second image lands.
    link.on_connected(2);
    link.on_write(b"stray bytes while idle");
    link.on_write(CMD_END);
    assert_eq!(storage.activated(), None);

    let image = fake_image(1500);
    link.on_write(CMD_BEGIN);
    push_image(&link, &image);
    link.on_write(CMD_END);
    assert_eq!(storage.activated(), Some(image));
    assert_eq!(restart.requests().len(), 1);
}

#[test]
fn writes_after_commit_change_nothing() {
    let (link, storage, restart) = connected_link();
    let image = fake_image(300);

    link.on_write(CMD_BEGIN);
    push_image(&link, &image);
    link.on_write(CMD_END);

    link.on_write(CMD_BEGIN);
    link.on_write(&[0xFF; 64]);
    link.on_write(CMD_END);

    assert_eq!(storage.activated(), Some(image));
    assert_eq!(storage.pending_len(), None);
    assert_eq!(restart.requests(), vec![RESTART_DELAY_MS]);
}

#[test]
fn nested_begin_keeps_the_open_session() {
    let (link, storage, _restart) = connected_link();

    link.on_write(CMD_BEGIN);
    link.on_write(b"part one ");
    link.on_write(CMD_BEGIN);
    link.on_write(b"part two");
    link.on_write(CMD_END);

    assert_eq!(storage.activated(), Some(b"part one part two".to_vec()));
}

#[test]
fn failed_commit_can_be_retried() {
    let mut rx = OtaReceiver::new(FlashUpdateStorage::new());

    assert_eq!(rx.handle(CMD_BEGIN), Ok(OtaEvent::Started));
    // Nothing written yet: the image does not verify.
    assert_eq!(
        rx.handle(CMD_END),
        Err(OtaError::CommitFailed(StorageError::VerifyFailed))
    );
    assert_eq!(rx.state(), OtaState::InProgress);

    assert_eq!(rx.handle(b"late data"), Ok(OtaEvent::ChunkWritten { len: 9, total: 9 }));
    assert_eq!(rx.handle(CMD_END), Ok(OtaEvent::Committed { total: 9 }));
    assert_eq!(rx.storage().activated_image(), Some(&b"late data"[..]));
}

#[test]
fn command_words_split_across_writes_are_data() {
    let mut rx = OtaReceiver::new(FlashUpdateStorage::new());
    rx.handle(CMD_BEGIN).unwrap();
    rx.handle(b"OTA_").unwrap();
    rx.handle(b"END").unwrap();
    assert_eq!(rx.state(), OtaState::InProgress);
    assert_eq!(rx.total_written(), 7);
}
