//! WiFi provisioning over BLE.
//!
//! A peer lists, saves, reorders and deletes WiFi networks through four
//! GATT endpoints; a background supervisor keeps the station joined to
//! the highest-priority saved network it can reach. All ESP-IDF-specific
//! code is guarded by `#[cfg(target_os = "espidf")]` within each module,
//! with a host simulation alongside for tests.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod rpc;
pub mod state;
pub mod supervisor;
pub mod task;

pub use app::events::{LifecycleEvent, ServiceStatus, SupervisorState};
pub use app::service::ProvisioningService;
pub use config::ProvisioningConfig;
pub use error::{ProvisionError, StatusCode};
pub use network::profile::{NetworkInfo, NetworkProfile, ScanResult, Security};
