//! BLE telemetry link.
//!
//! Implements [`Transport`] over a single GATT service: frames go out as
//! notifications on the TX characteristic, and peer writes on the RX
//! characteristic are forwarded to an installed [`InboundHandler`] (the
//! OTA receiver).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server through the raw
//!   `esp_idf_svc::sys` bindings.
//! - **all other targets**: simulation backend that records notifications
//!   so host tests can inspect them.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID (last byte) | Props          |
//! |----------------|------------------|----------------|
//! | Service        | `…cdef`          |                |
//! | RX             | `…cde1`          | Write          |
//! | TX             | `…cde2`          | Notify (+CCCD) |

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::app::ports::{InboundHandler, Transport};
use crate::config::DEVICE_NAME_MAX;

#[cfg(target_os = "espidf")]
use log::error;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0xefcd_ab90_7856_3412_efcd_ab90_7856_3412;
pub const CHAR_RX_UUID: u128 = 0xe1cd_ab90_7856_3412_efcd_ab90_7856_3412;
pub const CHAR_TX_UUID: u128 = 0xe2cd_ab90_7856_3412_efcd_ab90_7856_3412;

/// ATT MTU before any exchange.
pub const DEFAULT_ATT_MTU: u16 = 23;
/// MTU we offer during the exchange.
pub const LOCAL_ATT_MTU: u16 = 185;
/// ATT notification header (opcode + handle).
const ATT_NOTIFY_OVERHEAD: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleError {
    StackInitFailed(&'static str),
    AlreadyStarted,
}

impl core::fmt::Display for BleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::StackInitFailed(step) => write!(f, "BLE stack init failed at {step}"),
            Self::AlreadyStarted => write!(f, "BLE link already started"),
        }
    }
}

impl std::error::Error for BleError {}

// ───────────────────────────────────────────────────────────────
// Link
// ───────────────────────────────────────────────────────────────

pub struct BleLink {
    device_name: heapless::String<DEVICE_NAME_MAX>,
    connected: AtomicBool,
    conn_id: AtomicU16,
    mtu: AtomicU16,
    frames_sent: AtomicU32,
    frames_dropped: AtomicU32,
    handler: Mutex<Option<Box<dyn InboundHandler>>>,
    #[cfg(not(target_os = "espidf"))]
    sim_notifications: Mutex<Vec<Vec<u8>>>,
}

impl BleLink {
    pub fn new(device_name: heapless::String<DEVICE_NAME_MAX>) -> Self {
        Self {
            device_name,
            connected: AtomicBool::new(false),
            conn_id: AtomicU16::new(0),
            mtu: AtomicU16::new(DEFAULT_ATT_MTU),
            frames_sent: AtomicU32::new(0),
            frames_dropped: AtomicU32::new(0),
            handler: Mutex::new(None),
            #[cfg(not(target_os = "espidf"))]
            sim_notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Route peer writes to `handler`, replacing any previous one.
    pub fn set_inbound_handler(&self, handler: Box<dyn InboundHandler>) {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = Some(handler);
        }
    }

    /// Notifications handed to the radio.
    pub fn frames_sent(&self) -> u32 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Frames dropped for lack of a peer or because they exceed the MTU.
    pub fn frames_dropped(&self) -> u32 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn mtu(&self) -> u16 {
        self.mtu.load(Ordering::Relaxed)
    }

    // ── Stack events (called from the Bluedroid task) ─────────

    pub fn on_connected(&self, conn_id: u16) {
        self.conn_id.store(conn_id, Ordering::Relaxed);
        self.mtu.store(DEFAULT_ATT_MTU, Ordering::Relaxed);
        self.connected.store(true, Ordering::Release);
        info!("BLE: peer connected (conn_id={})", conn_id);
    }

    pub fn on_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.mtu.store(DEFAULT_ATT_MTU, Ordering::Relaxed);
        info!("BLE: peer disconnected");
        if let Ok(mut slot) = self.handler.lock() {
            if let Some(handler) = slot.as_mut() {
                handler.on_peer_disconnected();
            }
        }
    }

    pub fn on_mtu_changed(&self, mtu: u16) {
        self.mtu.store(mtu.max(DEFAULT_ATT_MTU), Ordering::Relaxed);
        info!("BLE: MTU {}", mtu);
    }

    pub fn on_write(&self, data: &[u8]) {
        debug!("BLE: RX {} bytes", data.len());
        match self.handler.lock() {
            Ok(mut slot) => match slot.as_mut() {
                Some(handler) => handler.on_receive(data),
                None => debug!("BLE: no inbound handler, {} bytes dropped", data.len()),
            },
            Err(_) => warn!("BLE: inbound handler lock poisoned"),
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    /// Bring up the controller and Bluedroid, register the GATT app, and
    /// start advertising.  Stack callbacks are routed to this link.
    #[cfg(target_os = "espidf")]
    pub fn start(
        self: &std::sync::Arc<Self>,
        modem: esp_idf_svc::hal::modem::Modem,
    ) -> Result<(), BleError> {
        use esp_idf_svc::bt::{Ble, BtDriver};
        use esp_idf_svc::sys::*;

        ACTIVE_LINK.set(self.clone()).map_err(|_| BleError::AlreadyStarted)?;

        // Controller + Bluedroid; NVS is already initialised by the config store.
        let driver = BtDriver::<Ble>::new(modem, None).map_err(|e| {
            error!("BLE: controller init failed ({})", e);
            BleError::StackInitFailed("bt_driver")
        })?;
        // The stack stays up for the device lifetime.
        core::mem::forget(driver);

        unsafe {
            check(esp_ble_gap_register_callback(Some(ble_gap_event_handler)), "gap_register")?;
            check(
                esp_ble_gatts_register_callback(Some(ble_gatts_event_handler)),
                "gatts_register",
            )?;
            check(esp_ble_gatts_app_register(0), "gatts_app_register")?;
            if esp_ble_gatt_set_local_mtu(LOCAL_ATT_MTU) != ESP_OK {
                warn!("BLE: local MTU {} rejected, staying at default", LOCAL_ATT_MTU);
            }

            let mut name = [0u8; DEVICE_NAME_MAX + 1];
            name[..self.device_name.len()].copy_from_slice(self.device_name.as_bytes());
            check(esp_ble_gap_set_device_name(name.as_ptr().cast()), "set_device_name")?;

            // Advertising starts once the payload is accepted
            // (ADV_DATA_SET_COMPLETE).
            let mut adv_data = esp_ble_adv_data_t {
                set_scan_rsp: false,
                include_name: true,
                include_txpower: false,
                min_interval: 0x0006,
                max_interval: 0x0010,
                flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
                ..core::mem::zeroed()
            };
            check(esp_ble_gap_config_adv_data(&mut adv_data), "config_adv_data")?;
        }

        info!("BLE: Bluedroid up, advertising as '{}'", self.device_name);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start(self: &std::sync::Arc<Self>) -> Result<(), BleError> {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_notify(&self, data: &[u8]) -> bool {
        use esp_idf_svc::sys::*;
        let handle = TX_CHAR_HANDLE.load(Ordering::Relaxed) as u16;
        if handle == 0 {
            return false;
        }
        let gatts_if = GATTS_IF.load(Ordering::Relaxed) as esp_gatt_if_t;
        let conn_id = self.conn_id.load(Ordering::Relaxed);
        // SAFETY: Bluedroid copies the payload before returning.
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                gatts_if,
                conn_id,
                handle,
                data.len() as u16,
                data.as_ptr().cast_mut(),
                false,
            )
        };
        ret == ESP_OK
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&self, data: &[u8]) -> bool {
        match self.sim_notifications.lock() {
            Ok(mut out) => {
                out.push(data.to_vec());
                true
            }
            Err(_) => false,
        }
    }

    /// Take every notification recorded by the simulation backend.
    #[cfg(not(target_os = "espidf"))]
    pub fn take_sim_notifications(&self) -> Vec<Vec<u8>> {
        self.sim_notifications
            .lock()
            .map(|mut out| core::mem::take(&mut *out))
            .unwrap_or_default()
    }
}

impl Transport for BleLink {
    fn send(&self, frame: &[u8]) -> bool {
        if !self.is_connected() {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let max_payload = usize::from(self.mtu().saturating_sub(ATT_NOTIFY_OVERHEAD));
        if frame.len() > max_payload {
            let dropped = self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            if dropped % 500 == 0 {
                warn!(
                    "BLE: {}-byte frame exceeds MTU payload {} (peer has not negotiated a larger MTU)",
                    frame.len(),
                    max_payload
                );
            }
            return false;
        }
        if self.platform_notify(frame) {
            self.frames_sent.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// Bluedroid callbacks (ESP-IDF only)
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// state.  The handles live in atomics; events are routed to the link
// registered by `BleLink::start`.

#[cfg(target_os = "espidf")]
static ACTIVE_LINK: std::sync::OnceLock<std::sync::Arc<BleLink>> = std::sync::OnceLock::new();
#[cfg(target_os = "espidf")]
static GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static RX_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static TX_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static CHAR_STEP: AtomicU32 = AtomicU32::new(0);

#[cfg(target_os = "espidf")]
fn check(ret: esp_idf_svc::sys::esp_err_t, step: &'static str) -> Result<(), BleError> {
    if ret == esp_idf_svc::sys::ESP_OK {
        Ok(())
    } else {
        error!("BLE: {} failed ({})", step, ret);
        Err(BleError::StackInitFailed(step))
    }
}

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    t.uuid.uuid128 = uuid.to_le_bytes();
    t
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(uuid);
    esp_ble_gatts_add_char(
        svc_handle,
        &mut char_uuid,
        perm as esp_gatt_perm_t,
        prop as esp_gatt_char_prop_t,
        core::ptr::null_mut(),
        core::ptr::null_mut(),
    );
}

#[cfg(target_os = "espidf")]
unsafe fn start_advertising() {
    use esp_idf_svc::sys::*;
    let mut adv_params = esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x40,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..core::mem::zeroed()
    };
    esp_ble_gap_start_advertising(&mut adv_params);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => start_advertising(),
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            info!("BLE GAP: advertising started");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    let Some(link) = ACTIVE_LINK.get() else {
        return;
    };

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            GATTS_IF.store(u32::from(gatts_if), Ordering::Relaxed);
            info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t { uuid: uuid128_to_esp(SERVICE_UUID), inst_id: 0 },
                is_primary: true,
            };
            // service + 2 × (decl + value) + CCCD
            esp_ble_gatts_create_service(gatts_if, &mut svc_id, 8);
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let svc_handle = (*param).create.service_handle;
            SVC_HANDLE.store(u32::from(svc_handle), Ordering::Relaxed);
            esp_ble_gatts_start_service(svc_handle);
            CHAR_STEP.store(1, Ordering::Relaxed);
            add_gatt_char(
                svc_handle,
                CHAR_RX_UUID,
                ESP_GATT_PERM_WRITE,
                ESP_GATT_CHAR_PROP_BIT_WRITE | ESP_GATT_CHAR_PROP_BIT_WRITE_NR,
            );
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let handle = (*param).add_char.attr_handle;
            let svc_handle = SVC_HANDLE.load(Ordering::Relaxed) as u16;
            match CHAR_STEP.load(Ordering::Relaxed) {
                1 => {
                    RX_CHAR_HANDLE.store(u32::from(handle), Ordering::Relaxed);
                    CHAR_STEP.store(2, Ordering::Relaxed);
                    add_gatt_char(
                        svc_handle,
                        CHAR_TX_UUID,
                        ESP_GATT_PERM_READ,
                        ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                    );
                }
                2 => {
                    TX_CHAR_HANDLE.store(u32::from(handle), Ordering::Relaxed);
                    CHAR_STEP.store(3, Ordering::Relaxed);
                    let mut cccd: esp_bt_uuid_t = core::mem::zeroed();
                    cccd.len = 2;
                    cccd.uuid.uuid16 = ESP_GATT_UUID_CHAR_CLIENT_CONFIG as u16;
                    esp_ble_gatts_add_char_descr(
                        svc_handle,
                        &mut cccd,
                        (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                        core::ptr::null_mut(),
                        core::ptr::null_mut(),
                    );
                }
                _ => {}
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
            info!(
                "BLE GATTS: service ready (rx={}, tx={})",
                RX_CHAR_HANDLE.load(Ordering::Relaxed),
                TX_CHAR_HANDLE.load(Ordering::Relaxed)
            );
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            link.on_connected((*param).connect.conn_id);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            link.on_disconnected();
            start_advertising();
        }
        esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
            link.on_mtu_changed((*param).mtu.mtu);
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = &(*param).write;
            if u32::from(p.handle) == RX_CHAR_HANDLE.load(Ordering::Relaxed) && !p.value.is_null() {
                let data = core::slice::from_raw_parts(p.value, usize::from(p.len));
                link.on_write(data);
            }
            if p.need_rsp {
                esp_ble_gatts_send_response(
                    gatts_if,
                    p.conn_id,
                    p.trans_id,
                    esp_gatt_status_t_ESP_GATT_OK,
                    core::ptr::null_mut(),
                );
            }
        }
        _ => {}
    }
}
