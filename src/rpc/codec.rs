//! JSON message codec.
//!
//! Requests (peer to device), one object per write:
//! ```text
//! List    {"maxNetworks": 10, "timeout": 3000}
//! Save    {"ssid": "home", "security": 3, "psk": "…", "bssid"?: [6 × u8], "hidden"?: false}
//!         {"index": 2}                          // favour saved entry 2
//! Edit    {"index": 0, "newIndex": 3}
//! Delete  {"index": 1}
//! ```
//! Responses (device to peer), one object per notification:
//! ```text
//! Info    {"status": 0, "ssid": "home", "bssid": [..], "security": 3,
//!          "rssi": -52, "freqMhz": 2437, "hidden": false, "connected": true,
//!          "index": 0}
//! Status  {"status": 0}
//! ```
//! Which request a write carries is decided by the endpoint it arrived on.

use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::app::commands::{DeleteRequest, EditRequest, ListRequest, ProvisionRequest, SaveRequest};
use crate::error::{DecodeError, ProvisionError, StatusCode};
use crate::network::profile::{
    Bssid, INVALID_INDEX, MAX_KEY_LEN, MAX_SSID_LEN, NetworkInfo, NetworkProfile, Security,
};

use super::endpoint::Endpoint;

/// Emitted if serialization itself fails.
const FAILURE_RECORD: &[u8] = br#"{"status":1}"#;

// ───────────────────────────────────────────────────────────────
// Wire structs
// ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListWire {
    max_networks: i16,
    timeout: i16,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveWire {
    #[serde(default = "no_index")]
    index: i16,
    ssid: Option<String>,
    bssid: Option<Bssid>,
    security: Option<u8>,
    #[serde(default)]
    psk: String,
    #[serde(default)]
    hidden: bool,
}

fn no_index() -> i16 {
    INVALID_INDEX
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditWire {
    index: i16,
    new_index: i16,
}

#[derive(Deserialize)]
struct DeleteWire {
    index: i16,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoRecord<'a> {
    status: u8,
    ssid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bssid: Option<Bssid>,
    security: Security,
    rssi: i8,
    freq_mhz: u16,
    hidden: bool,
    connected: bool,
    index: i16,
}

#[derive(Serialize)]
struct StatusRecord {
    status: u8,
}

// ───────────────────────────────────────────────────────────────
// Decode
// ───────────────────────────────────────────────────────────────

/// Decode one peer write on `endpoint`.
pub fn decode_request(endpoint: Endpoint, payload: &[u8]) -> Result<ProvisionRequest, ProvisionError> {
    match endpoint {
        Endpoint::ListNetwork => {
            let w: ListWire = parse(payload)?;
            if w.max_networks < 0 || w.timeout < 0 {
                return Err(DecodeError::Malformed.into());
            }
            Ok(ProvisionRequest::List(ListRequest {
                max_results: w.max_networks as usize,
                timeout: Duration::from_millis(w.timeout as u64),
            }))
        }
        Endpoint::SaveNetwork => decode_save(parse(payload)?).map(ProvisionRequest::Save),
        Endpoint::EditNetwork => {
            let w: EditWire = parse(payload)?;
            Ok(ProvisionRequest::Edit(EditRequest {
                index: saved_index(w.index)?,
                new_index: saved_index(w.new_index)?,
            }))
        }
        Endpoint::DeleteNetwork => {
            let w: DeleteWire = parse(payload)?;
            Ok(ProvisionRequest::Delete(DeleteRequest {
                index: saved_index(w.index)?,
            }))
        }
    }
}

fn parse<'de, T: Deserialize<'de>>(payload: &'de [u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(payload).map_err(|_| DecodeError::Malformed)
}

fn saved_index(raw: i16) -> Result<usize, DecodeError> {
    usize::try_from(raw).map_err(|_| DecodeError::NegativeIndex)
}

fn decode_save(w: SaveWire) -> Result<SaveRequest, ProvisionError> {
    match w.index {
        INVALID_INDEX => {}
        idx => return Ok(SaveRequest::Existing(saved_index(idx)?)),
    }

    let ssid = w.ssid.ok_or(DecodeError::Malformed)?;
    let security = Security::try_from(w.security.ok_or(DecodeError::Malformed)?)?;
    if ssid.len() > MAX_SSID_LEN || w.psk.len() > MAX_KEY_LEN {
        return Err(DecodeError::FieldTooLong.into());
    }

    let mut profile = NetworkProfile::new(&ssid, security, &w.psk)?.with_hidden(w.hidden);
    if let Some(bssid) = w.bssid {
        profile = profile.with_bssid(bssid);
    }
    Ok(SaveRequest::New(profile))
}

// ───────────────────────────────────────────────────────────────
// Encode
// ───────────────────────────────────────────────────────────────

/// One List record.
pub fn encode_info(info: &NetworkInfo) -> Vec<u8> {
    to_bytes(&InfoRecord {
        status: info.status.code(),
        ssid: info.ssid.as_str(),
        bssid: info.bssid,
        security: info.security,
        rssi: info.rssi,
        freq_mhz: info.freq_mhz,
        hidden: info.hidden,
        connected: info.connected,
        index: info.saved_index,
    })
}

/// Status-only record; terminates a List and answers every other request.
pub fn encode_status(status: StatusCode) -> Vec<u8> {
    to_bytes(&StatusRecord {
        status: status.code(),
    })
}

fn to_bytes<T: Serialize>(record: &T) -> Vec<u8> {
    serde_json::to_vec(record).unwrap_or_else(|e| {
        warn!("Codec: encode failed: {e}");
        FAILURE_RECORD.to_vec()
    })
}
