//! Service configuration parameters
//!
//! All tunable parameters for the provisioning service.
//! Values can be overridden by the integrator before `init()`.

use core::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::store::MAX_SAVED_NETWORKS;

/// Provisioning service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    // --- Store ---
    /// Saved-network capacity (1..=8)
    pub max_saved_networks: u8,

    // --- Supervisor timing ---
    /// Backoff after a failed join (milliseconds)
    pub connect_retry_interval_ms: u32,
    /// Pause after a full round of failed joins (milliseconds)
    pub exhausted_retry_interval_ms: u32,
    /// Connected-link poll period (milliseconds)
    pub link_check_interval_ms: u32,

    // --- List request clamps ---
    /// Upper bound on scan results per List request
    pub max_scan_results: u16,
    /// Upper bound on a List request's scan timeout (milliseconds)
    pub max_scan_timeout_ms: u32,

    // --- Peer write throttle ---
    /// Sustained peer writes per second
    pub request_rate_per_sec: u32,
    /// Burst allowance on top of the sustained rate
    pub request_burst: u32,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            max_saved_networks: MAX_SAVED_NETWORKS as u8,

            connect_retry_interval_ms: 1000,
            exhausted_retry_interval_ms: 10_000,
            link_check_interval_ms: 1000,

            max_scan_results: 10,
            max_scan_timeout_ms: 10_000,

            request_rate_per_sec: 10,
            request_burst: 10,
        }
    }
}

impl ProvisioningConfig {
    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_saved_networks == 0 || usize::from(self.max_saved_networks) > MAX_SAVED_NETWORKS
        {
            return Err(ConfigError::ValidationFailed(
                "max_saved_networks must be 1..=8",
            ));
        }
        if self.connect_retry_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "connect_retry_interval_ms must be non-zero",
            ));
        }
        if self.exhausted_retry_interval_ms < self.connect_retry_interval_ms {
            return Err(ConfigError::ValidationFailed(
                "exhausted_retry_interval_ms must not be shorter than the join backoff",
            ));
        }
        if self.link_check_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "link_check_interval_ms must be non-zero",
            ));
        }
        if self.max_scan_results == 0 {
            return Err(ConfigError::ValidationFailed("max_scan_results must be non-zero"));
        }
        if self.request_rate_per_sec == 0 || self.request_burst == 0 {
            return Err(ConfigError::ValidationFailed(
                "request throttle rate and burst must be non-zero",
            ));
        }
        Ok(())
    }

    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.connect_retry_interval_ms))
    }

    pub fn exhausted_retry_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.exhausted_retry_interval_ms))
    }

    pub fn link_check_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.link_check_interval_ms))
    }

    pub fn max_scan_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.max_scan_timeout_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "config validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
