//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter | Implements         | Connects to                      |
//! |---------|--------------------|----------------------------------|
//! | `ble`   | (bring-up only)    | Bluedroid stack, advertising     |
//! | `gatt`  | Transport          | GATT endpoint table, CCCD, MTU   |
//! | `nvs`   | NetworkListStore   | NVS / in-memory blob             |
//! | `wifi`  | NetworkInterface   | ESP-IDF WiFi STA / simulated air |

pub mod ble;
pub mod gatt;
pub mod nvs;
pub mod wifi;
