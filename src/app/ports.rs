//! Port traits: the hexagonal boundary between the provisioning core and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ProvisioningService (domain)
//! ```
//!
//! Driven adapters (WiFi driver, GATT server, NVS) implement these traits.
//! The [`ProvisioningService`](super::service::ProvisioningService) consumes
//! them via generics, so the core never touches a radio directly.
//!
//! All ports take `&self`: the dispatcher (transport context) and the
//! connection supervisor (its own thread) call into them concurrently, so
//! implementations carry their own interior locking.
//!
//! ## Security notes
//!
//! - **NetworkListStore** implementations SHOULD keep the blob on an
//!   encrypted partition; it carries pre-shared keys.
//! - **Transport** implementations decide who may write; the core trusts
//!   every write it is handed.

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::network::profile::{NetworkProfile, ScanResult};
use crate::rpc::endpoint::Endpoint;

// ───────────────────────────────────────────────────────────────
// Network interface port (domain ↔ WiFi station driver)
// ───────────────────────────────────────────────────────────────

/// Station-mode WiFi driver as seen by the core.
pub trait NetworkInterface: Send + Sync {
    /// Discover visible networks. Must return within `timeout`, yielding
    /// whatever was found so far; at most `max_results` entries.
    fn scan(&self, max_results: usize, timeout: Duration) -> Result<Vec<ScanResult>, NetworkError>;

    /// Join `profile`. Blocks for at most the driver's own join timeout.
    fn join(&self, profile: &NetworkProfile) -> Result<(), NetworkError>;

    /// Drop the current association (no-op when not connected).
    fn disconnect(&self) -> Result<(), NetworkError>;

    /// The profile of the current association, if any.
    fn current_connection(&self) -> Option<NetworkProfile>;
}

impl<T: NetworkInterface + ?Sized> NetworkInterface for Arc<T> {
    fn scan(&self, max_results: usize, timeout: Duration) -> Result<Vec<ScanResult>, NetworkError> {
        (**self).scan(max_results, timeout)
    }

    fn join(&self, profile: &NetworkProfile) -> Result<(), NetworkError> {
        (**self).join(profile)
    }

    fn disconnect(&self) -> Result<(), NetworkError> {
        (**self).disconnect()
    }

    fn current_connection(&self) -> Option<NetworkProfile> {
        (**self).current_connection()
    }
}

// ───────────────────────────────────────────────────────────────
// Transport port (peer ↔ domain, short-range radio)
// ───────────────────────────────────────────────────────────────

/// Callbacks the transport invokes for a registered endpoint.
pub trait EndpointHandler: Send + Sync {
    /// A complete peer write arrived on `endpoint`.
    fn on_write(&self, endpoint: Endpoint, payload: &[u8]);

    /// The peer enabled or disabled notifications on `endpoint`.
    fn on_subscription_change(&self, endpoint: Endpoint, subscribed: bool);
}

/// Addressable-endpoint transport (a GATT service in practice).
pub trait Transport: Send + Sync {
    /// Route writes and subscription changes for `endpoint` to `handler`.
    fn register_endpoint(
        &self,
        endpoint: Endpoint,
        handler: Arc<dyn EndpointHandler>,
    ) -> Result<(), TransportError>;

    /// Stop routing `endpoint`. Unknown endpoints are ignored.
    fn unregister_endpoint(&self, endpoint: Endpoint);

    /// Push `payload` to the peer on `endpoint`.
    fn notify(&self, endpoint: Endpoint, payload: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn register_endpoint(
        &self,
        endpoint: Endpoint,
        handler: Arc<dyn EndpointHandler>,
    ) -> Result<(), TransportError> {
        (**self).register_endpoint(endpoint, handler)
    }

    fn unregister_endpoint(&self, endpoint: Endpoint) {
        (**self).unregister_endpoint(endpoint);
    }

    fn notify(&self, endpoint: Endpoint, payload: &[u8]) -> Result<(), TransportError> {
        (**self).notify(endpoint, payload)
    }
}

// ───────────────────────────────────────────────────────────────
// Persistent network list port (domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the saved network list across power cycles.
///
/// # Security
///
/// The blob contains pre-shared keys. On ESP32 it belongs on the encrypted
/// NVS partition.
pub trait NetworkListStore: Send + Sync {
    /// Load the list in priority order. A missing blob is an empty list.
    fn load(&self) -> Result<Vec<NetworkProfile>, StorageError>;

    /// Replace the persisted list atomically.
    fn save(&self, networks: &[NetworkProfile]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`NetworkInterface`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// The AP rejected the credentials.
    AuthFailed,
    /// No AP answered within the join timeout.
    Timeout,
    /// The network is not in range.
    NotFound,
    /// Scan could not be started or was aborted by the driver.
    ScanFailed,
    /// Generic driver failure.
    Driver,
}

/// Errors from [`Transport`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// A handler is already registered for the endpoint.
    AlreadyRegistered,
    /// No handler is registered for the endpoint.
    NotRegistered,
    /// No peer is connected.
    NotConnected,
    /// Notification fragment exceeds the negotiated MTU.
    MtuExceeded,
    /// Reassembled write exceeds the reassembly buffer.
    ReassemblyOverflow,
    /// Fragment arrived out of sequence.
    SequenceError,
    /// Generic radio stack I/O error.
    Io,
}

/// Errors from [`NetworkListStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Storage partition is full.
    Full,
    /// Stored blob failed deserialization.
    Corrupted,
    /// Generic I/O error.
    IoError,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthFailed => write!(f, "authentication failed"),
            Self::Timeout => write!(f, "join timed out"),
            Self::NotFound => write!(f, "network not found"),
            Self::ScanFailed => write!(f, "scan failed"),
            Self::Driver => write!(f, "driver error"),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered => write!(f, "endpoint already registered"),
            Self::NotRegistered => write!(f, "endpoint not registered"),
            Self::NotConnected => write!(f, "no peer connected"),
            Self::MtuExceeded => write!(f, "fragment exceeds MTU"),
            Self::ReassemblyOverflow => write!(f, "reassembly buffer overflow"),
            Self::SequenceError => write!(f, "fragment sequence error"),
            Self::Io => write!(f, "radio I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "storage full"),
            Self::Corrupted => write!(f, "stored list corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
