//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements                 | Connects to                 |
//! |----------------|----------------------------|-----------------------------|
//! | `ble`          | Transport                  | Bluedroid GATT server       |
//! | `nvs`          | ConfigPort                 | NVS / in-memory store       |
//! | `ota_storage`  | UpdateStorage, RestartPort | esp-ota / in-memory image   |
//! | `time`         | Clock                      | esp_timer / `Instant`       |

pub mod ble;
pub mod nvs;
pub mod ota_storage;
pub mod time;
