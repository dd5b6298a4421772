//! NVS (Non-Volatile Storage) config adapter.
//!
//! Implements [`ConfigPort`] by persisting [`TelemetryConfig`] as a single
//! postcard blob under `vitals/telecfg`.  Every save is validated first;
//! NVS commits are atomic, so a power cut never leaves a torn blob.

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::TelemetryConfig;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
const CONFIG_NAMESPACE: &[u8] = b"vitals\0";
#[cfg(target_os = "espidf")]
const CONFIG_KEY: &[u8] = b"telecfg\0";

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 512;

pub struct ConfigStore {
    #[cfg(not(target_os = "espidf"))]
    blob: Option<Vec<u8>>,
}

impl ConfigStore {
    /// Initialise NVS flash and return the store.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS use.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NVS: initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NVS: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            blob: None,
        })
    }

    /// Load the stored config.  When it is missing, undecodable or out of
    /// range the defaults are written back, so the next boot (and any
    /// bench tool reading the namespace) finds a valid blob.
    pub fn load_or_init(&mut self) -> TelemetryConfig {
        let cfg = match self.load() {
            Ok(cfg) => match cfg.validate() {
                Ok(()) => return cfg,
                Err(e) => {
                    warn!("NVS: stored config rejected ({}), using defaults", e);
                    TelemetryConfig::default()
                }
            },
            Err(ConfigError::NotFound) => {
                info!("NVS: no stored config, using defaults");
                TelemetryConfig::default()
            }
            Err(ConfigError::Corrupted) => {
                warn!("NVS: stored config corrupted, using defaults");
                TelemetryConfig::default()
            }
            Err(e) => {
                // Storage itself is failing; don't try to write over it.
                warn!("NVS: config load failed ({}), using defaults", e);
                return TelemetryConfig::default();
            }
        };
        if let Err(e) = self.save(&cfg) {
            warn!("NVS: could not store defaults ({})", e);
        }
        cfg
    }

    /// Open the config namespace, run `f` with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let ret = unsafe { nvs_open(CONFIG_NAMESPACE.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe { nvs_close(handle) };
        result
    }

    #[cfg(target_os = "espidf")]
    fn read_blob() -> Result<Vec<u8>, ConfigError> {
        let result = Self::with_handle(false, |handle| {
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_blob(handle, CONFIG_KEY.as_ptr().cast(), core::ptr::null_mut(), &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            if size == 0 || size > MAX_BLOB_SIZE {
                return Err(ESP_ERR_NVS_INVALID_LENGTH);
            }
            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(handle, CONFIG_KEY.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(buf)
        });
        match result {
            Ok(buf) => Ok(buf),
            // A missing namespace on first boot reports NOT_FOUND from nvs_open.
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(ConfigError::NotFound),
            Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(ConfigError::Corrupted),
            Err(e) => {
                warn!("NVS: read error {}", e);
                Err(ConfigError::IoError)
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_blob(&self) -> Result<Vec<u8>, ConfigError> {
        self.blob.clone().ok_or(ConfigError::NotFound)
    }

    /// Replace the stored blob with arbitrary bytes (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn inject_raw(&mut self, bytes: &[u8]) {
        self.blob = Some(bytes.to_vec());
    }
}

impl ConfigPort for ConfigStore {
    fn load(&self) -> Result<TelemetryConfig, ConfigError> {
        #[cfg(target_os = "espidf")]
        let bytes = Self::read_blob()?;
        #[cfg(not(target_os = "espidf"))]
        let bytes = self.read_blob()?;

        let cfg: TelemetryConfig =
            postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
        info!("NVS: loaded config ({} bytes)", bytes.len());
        Ok(cfg)
    }

    fn save(&mut self, config: &TelemetryConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            self.blob = Some(bytes);
            info!("NVS: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_handle(true, |handle| {
                let key = CONFIG_KEY.as_ptr().cast();
                let ret = unsafe { nvs_set_blob(handle, key, bytes.as_ptr().cast(), bytes.len()) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NVS: config saved ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NVS: write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}
