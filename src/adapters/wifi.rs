//! WiFi station-mode adapter.
//!
//! Implements [`NetworkInterface`], the hexagonal boundary for joining,
//! scanning and leaving networks.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver calls via `esp_idf_svc::wifi`.
//! - **all other targets**: a simulated radio environment for host-side tests.
//!
//! ## Radio contention
//!
//! A join holds the driver for its whole duration. A scan or link query
//! that finds the driver busy does not wait: the scan reports nothing
//! found, the link query answers from the last recorded join.
//!
//! ## Scan deadline
//!
//! A scan never outlives its timeout. The per-channel dwell is derived
//! from the timeout, and whatever the radio has found when the deadline
//! passes is returned.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
#[cfg(target_os = "espidf")]
use std::time::Instant;

use log::{debug, info, warn};

use crate::app::ports::{NetworkError, NetworkInterface};
use crate::network::profile::{NetworkProfile, ScanResult};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::config::{ScanConfig, ScanType};
#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use crate::network::profile::Ssid;
#[cfg(target_os = "espidf")]
use crate::network::profile::Security;

/// Channels swept by an all-channel scan (2.4 GHz, world-safe set).
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const SCAN_CHANNELS: u32 = 13;
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MIN_DWELL: Duration = Duration::from_millis(10);
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MAX_DWELL: Duration = Duration::from_millis(120);
#[cfg(target_os = "espidf")]
const SCAN_POLL: Duration = Duration::from_millis(20);

/// Per-channel dwell that lets a full sweep fit inside `timeout`.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn channel_dwell(timeout: Duration) -> Duration {
    (timeout / SCAN_CHANNELS).clamp(MIN_DWELL, MAX_DWELL)
}

/// SSID reported by the driver, or `None` if it does not fit.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn scanned_ssid(raw: &str) -> Option<Ssid> {
    let mut ssid = Ssid::new();
    match ssid.push_str(raw) {
        Ok(()) => Some(ssid),
        Err(()) => {
            debug!("WiFi: skipping scan entry with {}-byte SSID", raw.len());
            None
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// Simulated radio
// ───────────────────────────────────────────────────────────────

/// Host-side stand-in for the air around the device.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
struct SimRadio {
    visible: Vec<ScanResult>,
    join_latency: Duration,
    /// Time to discover each visible network; zero finds all at once.
    scan_dwell: Duration,
    joins: u32,
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    #[cfg(target_os = "espidf")]
    driver: Mutex<BlockingWifi<EspWifi<'static>>>,
    #[cfg(not(target_os = "espidf"))]
    driver: Mutex<SimRadio>,
    /// Profile of the last successful join, cleared on disconnect.
    current: Mutex<Option<NetworkProfile>>,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    /// Wrap an already-constructed STA driver.
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>) -> Self {
        Self {
            driver: Mutex::new(wifi),
            current: Mutex::new(None),
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    /// Simulated radio with nothing in range.
    pub fn new() -> Self {
        Self {
            driver: Mutex::new(SimRadio {
                join_latency: Duration::from_millis(20),
                ..Default::default()
            }),
            current: Mutex::new(None),
        }
    }

    /// Put networks in range of the simulated radio.
    #[must_use]
    pub fn with_visible(self, networks: Vec<ScanResult>) -> Self {
        lock(&self.driver).visible = networks;
        self
    }

    /// Make each visible network take `dwell` to discover.
    #[must_use]
    pub fn with_scan_dwell(self, dwell: Duration) -> Self {
        lock(&self.driver).scan_dwell = dwell;
        self
    }

    /// Simulate the AP going away.
    pub fn sim_drop_link(&self) {
        warn!("WiFi(sim): link dropped");
        lock(&self.current).take();
    }

    /// Number of join calls the simulated radio has seen.
    pub fn sim_join_count(&self) -> u32 {
        lock(&self.driver).joins
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Platform-specific ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    fn platform_join(&self, profile: &NetworkProfile) -> Result<(), NetworkError> {
        let mut wifi = lock(&self.driver);
        let conf = Configuration::Client(ClientConfiguration {
            ssid: profile
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| NetworkError::Driver)?,
            bssid: profile.bssid,
            auth_method: auth_method(profile.security),
            password: profile
                .key
                .as_str()
                .try_into()
                .map_err(|_| NetworkError::Driver)?,
            ..Default::default()
        });
        wifi.set_configuration(&conf).map_err(|e| {
            warn!("WiFi: set_configuration failed: {e:?}");
            NetworkError::Driver
        })?;
        if !wifi.is_started().unwrap_or(false) {
            wifi.start().map_err(|_| NetworkError::Driver)?;
        }
        wifi.connect().map_err(|e| {
            warn!("WiFi: connect failed: {e:?}");
            NetworkError::AuthFailed
        })?;
        wifi.wait_netif_up().map_err(|_| NetworkError::Timeout)
    }

    fn platform_scan(&self, max_results: usize, timeout: Duration) -> Result<Vec<ScanResult>, NetworkError> {
        let deadline = Instant::now() + timeout;
        let Ok(mut wifi) = self.driver.try_lock() else {
            debug!("WiFi: radio busy, scan skipped");
            return Ok(Vec::new());
        };
        if !wifi.is_started().unwrap_or(false) {
            wifi.start().map_err(|_| NetworkError::ScanFailed)?;
        }

        let dwell = channel_dwell(timeout);
        let config = ScanConfig {
            scan_type: ScanType::Active {
                min: dwell / 2,
                max: dwell,
            },
            show_hidden: true,
            ..Default::default()
        };
        wifi.wifi_mut().start_scan(&config, false).map_err(|e| {
            warn!("WiFi: scan start failed: {e:?}");
            NetworkError::ScanFailed
        })?;

        while !wifi.wifi().is_scan_done().unwrap_or(false) {
            if Instant::now() >= deadline {
                debug!("WiFi: scan deadline reached, keeping partial results");
                if let Err(e) = wifi.wifi_mut().stop_scan() {
                    debug!("WiFi: stop_scan: {e:?}");
                }
                break;
            }
            std::thread::sleep(SCAN_POLL);
        }

        let aps = wifi.wifi_mut().get_scan_result().map_err(|e| {
            warn!("WiFi: reading scan results failed: {e:?}");
            NetworkError::ScanFailed
        })?;
        Ok(aps
            .into_iter()
            .filter_map(|ap| {
                let ssid = scanned_ssid(ap.ssid.as_str())?;
                Some(ScanResult {
                    hidden: ssid.is_empty(),
                    ssid,
                    bssid: ap.bssid,
                    security: ap.auth_method.map_or(Security::Open, security_of),
                    rssi: ap.signal_strength,
                    channel: ap.channel,
                })
            })
            .take(max_results)
            .collect())
    }

    fn platform_disconnect(&self) -> Result<(), NetworkError> {
        lock(&self.driver)
            .disconnect()
            .map_err(|_| NetworkError::Driver)
    }

    fn platform_link_up(&self) -> Option<bool> {
        self.driver
            .try_lock()
            .ok()
            .map(|wifi| wifi.is_connected().unwrap_or(false))
    }
}

#[cfg(target_os = "espidf")]
fn auth_method(security: Security) -> AuthMethod {
    match security {
        Security::Open | Security::NotSupported => AuthMethod::None,
        Security::Wep => AuthMethod::WEP,
        Security::Wpa => AuthMethod::WPA,
        Security::Wpa2 => AuthMethod::WPA2Personal,
        Security::Wpa3 => AuthMethod::WPA3Personal,
    }
}

#[cfg(target_os = "espidf")]
fn security_of(auth: AuthMethod) -> Security {
    match auth {
        AuthMethod::None => Security::Open,
        AuthMethod::WEP => Security::Wep,
        AuthMethod::WPA => Security::Wpa,
        AuthMethod::WPA2Personal | AuthMethod::WPAWPA2Personal => Security::Wpa2,
        AuthMethod::WPA3Personal | AuthMethod::WPA2WPA3Personal => Security::Wpa3,
        _ => Security::NotSupported,
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    fn platform_join(&self, profile: &NetworkProfile) -> Result<(), NetworkError> {
        let mut radio = lock(&self.driver);
        radio.joins = radio.joins.wrapping_add(1);
        std::thread::sleep(radio.join_latency);
        let Some(ap) = radio.visible.iter().find(|ap| profile.matches(ap)) else {
            debug!("WiFi(sim): '{}' not in range", profile.ssid);
            return Err(NetworkError::NotFound);
        };
        if ap.security != profile.security {
            return Err(NetworkError::AuthFailed);
        }
        Ok(())
    }

    fn platform_scan(&self, max_results: usize, timeout: Duration) -> Result<Vec<ScanResult>, NetworkError> {
        let Ok(radio) = self.driver.try_lock() else {
            debug!("WiFi(sim): radio busy, scan skipped");
            return Ok(Vec::new());
        };
        let found = if radio.scan_dwell.is_zero() {
            radio.visible.len()
        } else {
            let sweep = radio.scan_dwell * radio.visible.len() as u32;
            std::thread::sleep(sweep.min(timeout));
            let reachable = timeout.as_nanos() / radio.scan_dwell.as_nanos();
            radio.visible.len().min(reachable as usize)
        };
        if found < radio.visible.len() {
            debug!("WiFi(sim): scan timed out after {found} networks");
        }
        Ok(radio.visible[..found].iter().take(max_results).cloned().collect())
    }

    #[allow(clippy::unnecessary_wraps)]
    fn platform_disconnect(&self) -> Result<(), NetworkError> {
        Ok(())
    }

    fn platform_link_up(&self) -> Option<bool> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// NetworkInterface
// ───────────────────────────────────────────────────────────────

impl NetworkInterface for WifiAdapter {
    fn scan(&self, max_results: usize, timeout: Duration) -> Result<Vec<ScanResult>, NetworkError> {
        let found = self.platform_scan(max_results, timeout)?;
        debug!("WiFi: scan found {} networks", found.len());
        Ok(found)
    }

    fn join(&self, profile: &NetworkProfile) -> Result<(), NetworkError> {
        info!("WiFi: joining '{}'", profile.ssid);
        match self.platform_join(profile) {
            Ok(()) => {
                *lock(&self.current) = Some(profile.clone());
                info!("WiFi: joined '{}'", profile.ssid);
                Ok(())
            }
            Err(e) => {
                warn!("WiFi: join '{}' failed: {e}", profile.ssid);
                Err(e)
            }
        }
    }

    fn disconnect(&self) -> Result<(), NetworkError> {
        let previous = lock(&self.current).take();
        if previous.is_none() {
            return Ok(());
        }
        self.platform_disconnect()?;
        info!("WiFi: disconnected");
        Ok(())
    }

    fn current_connection(&self) -> Option<NetworkProfile> {
        if self.platform_link_up() == Some(false) {
            lock(&self.current).take();
        }
        lock(&self.current).clone()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
