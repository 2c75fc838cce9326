//! Network profile and the records built from it.
//!
//! A [`NetworkProfile`] is what gets saved and joined. A [`ScanResult`] is
//! what the radio sees. A [`NetworkInfo`] is what the peer is told about
//! either one.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, ProvisionError, StatusCode};

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_KEY_LEN: usize = 64;
const MIN_WPA_KEY_LEN: usize = 8;
const WEP_KEY_LENS: [usize; 4] = [5, 10, 13, 26];

/// RSSI reported for a saved network that is not currently visible.
pub const INVALID_RSSI: i8 = -100;

/// Saved-index reported for a scan-only network.
pub const INVALID_INDEX: i16 = -1;

pub type Ssid = heapless::String<MAX_SSID_LEN>;
pub type Key = heapless::String<MAX_KEY_LEN>;
pub type Bssid = [u8; 6];

// ───────────────────────────────────────────────────────────────
// Security kind
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Security {
    Open = 0,
    Wep = 1,
    Wpa = 2,
    Wpa2 = 3,
    Wpa3 = 4,
    NotSupported = 5,
}

impl From<Security> for u8 {
    fn from(s: Security) -> Self {
        s as u8
    }
}

impl TryFrom<u8> for Security {
    type Error = DecodeError;

    fn try_from(raw: u8) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(Self::Open),
            1 => Ok(Self::Wep),
            2 => Ok(Self::Wpa),
            3 => Ok(Self::Wpa2),
            4 => Ok(Self::Wpa3),
            5 => Ok(Self::NotSupported),
            _ => Err(DecodeError::UnknownSecurity),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Network profile
// ───────────────────────────────────────────────────────────────

/// Everything needed to join one network.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub ssid: Ssid,
    pub bssid: Option<Bssid>,
    pub security: Security,
    pub key: Key,
    pub hidden: bool,
}

impl NetworkProfile {
    /// Build a profile from borrowed parts; rejects values that do not fit.
    pub fn new(ssid: &str, security: Security, key: &str) -> Result<Self, ProvisionError> {
        let mut s = Ssid::new();
        s.push_str(ssid)
            .map_err(|()| ProvisionError::InvalidProfile("SSID longer than 32 bytes"))?;
        let mut k = Key::new();
        k.push_str(key)
            .map_err(|()| ProvisionError::InvalidProfile("key longer than 64 bytes"))?;
        let profile = Self {
            ssid: s,
            bssid: None,
            security,
            key: k,
            hidden: false,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Open network with no key.
    pub fn open(ssid: &str) -> Result<Self, ProvisionError> {
        Self::new(ssid, Security::Open, "")
    }

    #[must_use]
    pub fn with_bssid(mut self, bssid: Bssid) -> Self {
        self.bssid = Some(bssid);
        self
    }

    #[must_use]
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Range-check SSID and key material against the security kind.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.ssid.is_empty() {
            return Err(ProvisionError::InvalidProfile("SSID must not be empty"));
        }
        let key_len = self.key.len();
        match self.security {
            Security::Open if key_len != 0 => {
                Err(ProvisionError::InvalidProfile("open network must not carry a key"))
            }
            Security::Open => Ok(()),
            Security::Wep if !WEP_KEY_LENS.contains(&key_len) => {
                Err(ProvisionError::InvalidProfile("WEP key must be 5, 10, 13 or 26 bytes"))
            }
            Security::Wep => Ok(()),
            Security::Wpa | Security::Wpa2 | Security::Wpa3 => {
                if (MIN_WPA_KEY_LEN..=MAX_KEY_LEN).contains(&key_len) {
                    Ok(())
                } else {
                    Err(ProvisionError::InvalidProfile("WPA key must be 8-64 bytes"))
                }
            }
            Security::NotSupported => {
                Err(ProvisionError::InvalidProfile("security kind not supported"))
            }
        }
    }

    /// Whether a scan result is this saved network.
    ///
    /// SSIDs must match; a pinned BSSID must match as well.
    pub fn matches(&self, scan: &ScanResult) -> bool {
        self.ssid == scan.ssid && self.bssid.is_none_or(|b| b == scan.bssid)
    }
}

impl fmt::Debug for NetworkProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkProfile")
            .field("ssid", &self.ssid)
            .field("bssid", &self.bssid)
            .field("security", &self.security)
            .field("key", &"<redacted>")
            .field("hidden", &self.hidden)
            .finish()
    }
}

// ───────────────────────────────────────────────────────────────
// Scan result
// ───────────────────────────────────────────────────────────────

/// One network discovered by a live scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub ssid: Ssid,
    pub bssid: Bssid,
    pub security: Security,
    pub rssi: i8,
    pub channel: u8,
    pub hidden: bool,
}

impl ScanResult {
    /// Centre frequency of the primary channel; 0 for an unknown channel.
    pub fn freq_mhz(&self) -> u16 {
        channel_freq_mhz(self.channel)
    }
}

/// 2.4 GHz channels 1-14 and 5 GHz channels 32-177.
pub fn channel_freq_mhz(channel: u8) -> u16 {
    let ch = u16::from(channel);
    match channel {
        1..=13 => 2407 + 5 * ch,
        14 => 2484,
        32..=177 => 5000 + 5 * ch,
        _ => 0,
    }
}

// ───────────────────────────────────────────────────────────────
// Network info (response record)
// ───────────────────────────────────────────────────────────────

/// One network as reported to the peer in a List response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: StatusCode,
    pub ssid: Ssid,
    pub bssid: Option<Bssid>,
    pub security: Security,
    pub rssi: i8,
    /// 0 when the network was not seen in the scan.
    pub freq_mhz: u16,
    pub hidden: bool,
    pub connected: bool,
    /// Priority index, or [`INVALID_INDEX`] for a scan-only result.
    pub saved_index: i16,
}

impl NetworkInfo {
    /// Saved entry, enriched with live radio data when it was seen in the scan.
    pub fn from_saved(
        index: usize,
        profile: &NetworkProfile,
        connected: bool,
        seen: Option<&ScanResult>,
    ) -> Self {
        Self {
            status: StatusCode::Success,
            ssid: profile.ssid.clone(),
            bssid: seen.map(|s| s.bssid).or(profile.bssid),
            security: profile.security,
            rssi: seen.map_or(INVALID_RSSI, |s| s.rssi),
            freq_mhz: seen.map_or(0, ScanResult::freq_mhz),
            hidden: profile.hidden,
            connected,
            saved_index: index as i16,
        }
    }

    /// Scan-only network that matches no saved entry.
    pub fn from_scan(scan: &ScanResult) -> Self {
        Self {
            status: StatusCode::Success,
            ssid: scan.ssid.clone(),
            bssid: Some(scan.bssid),
            security: scan.security,
            rssi: scan.rssi,
            freq_mhz: scan.freq_mhz(),
            hidden: scan.hidden,
            connected: false,
            saved_index: INVALID_INDEX,
        }
    }
}
