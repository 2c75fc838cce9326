//! Application core: provisioning domain logic, zero radio I/O.
//!
//! This module holds the request and event vocabulary and the service
//! facade. All interaction with the WiFi driver, the BLE stack and flash
//! happens through **port traits** defined in [`ports`], keeping this
//! layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
