//! Peer protocol through the transport callbacks: request decoding,
//! store operations, List merging, status codes and throttling.
//!
//! The supervisor is never started here, so no joins interfere.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use wifiprov::rpc::endpoint::Endpoint;
use wifiprov::{NetworkProfile, ProvisioningConfig, ProvisioningService, Security};

use super::mock_net::{FakeNetwork, MemoryListStore, RecordingTransport, save_json, visible};

type Service = ProvisioningService<FakeNetwork, RecordingTransport>;

const SUCCESS: u64 = 0;
const FAILURE: u64 = 1;
const CAPACITY_EXCEEDED: u64 = 4;
const INDEX_OUT_OF_RANGE: u64 = 5;
const DECODE_ERROR: u64 = 6;
const INVALID_PROFILE: u64 = 7;
const BUSY: u64 = 8;

fn setup(
    config: ProvisioningConfig,
    saved: &[&str],
) -> (Service, Arc<FakeNetwork>, Arc<RecordingTransport>) {
    let net = FakeNetwork::new();
    let transport = RecordingTransport::new();
    let list = saved
        .iter()
        .map(|s| NetworkProfile::open(s).unwrap())
        .collect();
    let mut svc = ProvisioningService::new(config, Arc::clone(&net), Arc::clone(&transport))
        .with_persistence(MemoryListStore::with_list(list));
    svc.init().unwrap();
    transport.subscribe_all();
    (svc, net, transport)
}

fn ssids(svc: &Service) -> Vec<String> {
    svc.saved_networks()
        .iter()
        .map(|p| p.ssid.as_str().to_owned())
        .collect()
}

// ── Save ──────────────────────────────────────────────────────

#[test]
fn save_appends_in_priority_order() {
    let (svc, _, transport) = setup(ProvisioningConfig::default(), &[]);
    transport.write(Endpoint::SaveNetwork, &save_json("home", 3, "password1"));
    transport.write(Endpoint::SaveNetwork, &save_json("cafe", 0, ""));

    assert_eq!(ssids(&svc), ["home", "cafe"]);
    let statuses: Vec<_> = transport
        .records(Endpoint::SaveNetwork)
        .iter()
        .map(|r| r["status"].as_u64().unwrap())
        .collect();
    assert_eq!(statuses, [SUCCESS, SUCCESS]);
    assert_eq!(svc.saved_networks()[0].security, Security::Wpa2);
}

#[test]
fn save_beyond_capacity_rejected_and_store_unchanged() {
    let config = ProvisioningConfig {
        max_saved_networks: 2,
        ..ProvisioningConfig::default()
    };
    let (svc, _, transport) = setup(config, &["a", "b"]);
    transport.write(Endpoint::SaveNetwork, &save_json("c", 0, ""));
    assert_eq!(transport.last_status(Endpoint::SaveNetwork), Some(CAPACITY_EXCEEDED));
    assert_eq!(ssids(&svc), ["a", "b"]);
}

#[test]
fn save_by_index_favours_existing_entry() {
    let (svc, _, transport) = setup(ProvisioningConfig::default(), &["a", "b"]);
    transport.write(Endpoint::SaveNetwork, r#"{"index":1}"#);
    assert_eq!(transport.last_status(Endpoint::SaveNetwork), Some(SUCCESS));
    assert_eq!(ssids(&svc), ["a", "b"]);

    transport.write(Endpoint::SaveNetwork, r#"{"index":7}"#);
    assert_eq!(transport.last_status(Endpoint::SaveNetwork), Some(INDEX_OUT_OF_RANGE));
}

#[test]
fn invalid_profiles_rejected() {
    let (svc, _, transport) = setup(ProvisioningConfig::default(), &[]);
    // WPA2 key too short.
    transport.write(Endpoint::SaveNetwork, &save_json("home", 3, "short"));
    assert_eq!(transport.last_status(Endpoint::SaveNetwork), Some(INVALID_PROFILE));
    // Empty SSID.
    transport.write(Endpoint::SaveNetwork, &save_json("", 0, ""));
    assert_eq!(transport.last_status(Endpoint::SaveNetwork), Some(INVALID_PROFILE));
    // Unknown security kind.
    transport.write(Endpoint::SaveNetwork, &save_json("home", 9, ""));
    assert_eq!(transport.last_status(Endpoint::SaveNetwork), Some(DECODE_ERROR));
    assert!(svc.saved_networks().is_empty());
}

// ── Edit / Delete ─────────────────────────────────────────────

#[test]
fn edit_moves_with_shift_semantics() {
    let (svc, _, transport) = setup(ProvisioningConfig::default(), &["n0", "n1", "n2", "n3"]);
    transport.write(Endpoint::EditNetwork, r#"{"index":0,"newIndex":3}"#);
    assert_eq!(transport.last_status(Endpoint::EditNetwork), Some(SUCCESS));
    assert_eq!(ssids(&svc), ["n1", "n2", "n3", "n0"]);

    transport.write(Endpoint::EditNetwork, r#"{"index":3,"newIndex":0}"#);
    assert_eq!(ssids(&svc), ["n0", "n1", "n2", "n3"]);

    transport.write(Endpoint::EditNetwork, r#"{"index":1,"newIndex":4}"#);
    assert_eq!(transport.last_status(Endpoint::EditNetwork), Some(INDEX_OUT_OF_RANGE));
    assert_eq!(ssids(&svc), ["n0", "n1", "n2", "n3"]);
}

#[test]
fn delete_shifts_later_entries_down() {
    let (svc, net, transport) = setup(ProvisioningConfig::default(), &["a", "b", "c"]);
    transport.write(Endpoint::DeleteNetwork, r#"{"index":1}"#);
    assert_eq!(transport.last_status(Endpoint::DeleteNetwork), Some(SUCCESS));
    assert_eq!(ssids(&svc), ["a", "c"]);
    // Nothing was connected, so nothing was torn down.
    assert_eq!(net.disconnects(), 0);

    transport.write(Endpoint::DeleteNetwork, r#"{"index":2}"#);
    assert_eq!(transport.last_status(Endpoint::DeleteNetwork), Some(INDEX_OUT_OF_RANGE));
}

#[test]
fn negative_and_malformed_indices_are_decode_errors() {
    let (svc, _, transport) = setup(ProvisioningConfig::default(), &["a"]);
    transport.write(Endpoint::DeleteNetwork, r#"{"index":-1}"#);
    assert_eq!(transport.last_status(Endpoint::DeleteNetwork), Some(DECODE_ERROR));
    transport.write(Endpoint::EditNetwork, r#"{"index":"zero","newIndex":0}"#);
    assert_eq!(transport.last_status(Endpoint::EditNetwork), Some(DECODE_ERROR));
    assert_eq!(ssids(&svc), ["a"]);
}

#[test]
fn malformed_write_answers_on_same_endpoint() {
    let (_svc, _, transport) = setup(ProvisioningConfig::default(), &[]);
    transport.write(Endpoint::ListNetwork, "{not json");
    assert_eq!(transport.last_status(Endpoint::ListNetwork), Some(DECODE_ERROR));
    assert!(transport.records(Endpoint::SaveNetwork).is_empty());
    assert_eq!(transport.sent_count(), 1);
}

// ── List ──────────────────────────────────────────────────────

#[test]
fn list_reports_saved_then_scan_only() {
    let (_svc, net, transport) = setup(ProvisioningConfig::default(), &["home", "office"]);
    net.set_visible(vec![
        visible("cafe", Security::Wpa2, -70),
        visible("home", Security::Open, -45),
    ]);
    transport.write(Endpoint::ListNetwork, r#"{"maxNetworks":10,"timeout":1000}"#);

    let records = transport.records(Endpoint::ListNetwork);
    assert_eq!(records.len(), 4);

    assert_eq!(records[0]["ssid"], "home");
    assert_eq!(records[0]["index"], 0);
    assert_eq!(records[0]["rssi"], -45);
    assert_eq!(records[0]["connected"], false);

    assert_eq!(records[1]["ssid"], "office");
    assert_eq!(records[1]["index"], 1);
    assert_eq!(records[1]["rssi"], -100);

    assert_eq!(records[2]["ssid"], "cafe");
    assert_eq!(records[2]["index"], -1);
    assert_eq!(records[2]["security"], 3);
    // Channel 6 in the scan fixture.
    assert_eq!(records[2]["freqMhz"], 2437);
    assert_eq!(records[1]["freqMhz"], 0);

    assert_eq!(records[3], serde_json::json!({ "status": SUCCESS }));
}

#[test]
fn list_clamps_to_configured_maximum() {
    let config = ProvisioningConfig {
        max_scan_results: 2,
        ..ProvisioningConfig::default()
    };
    let (_svc, net, transport) = setup(config, &[]);
    net.set_visible(
        (0..5)
            .map(|i| visible(&format!("ap{i}"), Security::Wpa2, -60))
            .collect(),
    );
    transport.write(Endpoint::ListNetwork, r#"{"maxNetworks":50,"timeout":1000}"#);
    // Two scan records plus the terminal status.
    assert_eq!(transport.records(Endpoint::ListNetwork).len(), 3);
}

#[test]
fn list_returns_within_clamped_timeout() {
    let config = ProvisioningConfig {
        max_scan_timeout_ms: 100,
        ..ProvisioningConfig::default()
    };
    let (_svc, net, transport) = setup(config, &["home"]);
    net.set_visible(vec![visible("cafe", Security::Wpa2, -70)]);
    net.set_scan_latency(Duration::from_secs(5));

    let t0 = Instant::now();
    transport.write(Endpoint::ListNetwork, r#"{"maxNetworks":5,"timeout":3000}"#);
    let elapsed = t0.elapsed();

    assert!(elapsed < Duration::from_secs(1), "list took {elapsed:?}");
    assert_eq!(net.scan_timeouts(), [Duration::from_millis(100)]);
    // A timed-out scan is not an error: saved entries, then Success.
    let records = transport.records(Endpoint::ListNetwork);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["ssid"], "home");
    assert_eq!(records[1]["status"], SUCCESS);
}

#[test]
fn list_with_failed_scan_still_reports_saved() {
    let (_svc, net, transport) = setup(ProvisioningConfig::default(), &["home"]);
    net.fail_scans(true);
    transport.write(Endpoint::ListNetwork, r#"{"maxNetworks":5,"timeout":500}"#);

    let records = transport.records(Endpoint::ListNetwork);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["ssid"], "home");
    assert_eq!(records[1]["status"], FAILURE);
}

// ── Subscription and throttling ───────────────────────────────

#[test]
fn unsubscribed_peer_still_gets_operation_executed() {
    let (svc, _, transport) = setup(ProvisioningConfig::default(), &[]);
    transport.subscribe(Endpoint::SaveNetwork, false);

    transport.write(Endpoint::SaveNetwork, &save_json("home", 0, ""));
    assert_eq!(ssids(&svc), ["home"]);
    assert!(transport.records(Endpoint::SaveNetwork).is_empty());

    transport.subscribe(Endpoint::SaveNetwork, true);
    transport.write(Endpoint::SaveNetwork, &save_json("cafe", 0, ""));
    assert_eq!(transport.last_status(Endpoint::SaveNetwork), Some(SUCCESS));
}

#[test]
fn write_burst_beyond_limit_is_busy_and_not_executed() {
    let config = ProvisioningConfig {
        request_rate_per_sec: 1,
        request_burst: 2,
        ..ProvisioningConfig::default()
    };
    let (svc, _, transport) = setup(config, &[]);
    for ssid in ["a", "b", "c", "d", "e"] {
        transport.write(Endpoint::SaveNetwork, &save_json(ssid, 0, ""));
    }

    let statuses: Vec<u64> = transport
        .records(Endpoint::SaveNetwork)
        .iter()
        .filter_map(|r| r.get("status").and_then(Value::as_u64))
        .collect();
    assert_eq!(statuses.len(), 5);
    assert_eq!(statuses[0], SUCCESS);
    assert!(statuses.contains(&BUSY));
    // Only admitted writes reached the store.
    let admitted = statuses.iter().filter(|&&s| s == SUCCESS).count();
    assert!(admitted <= 3);
    assert_eq!(svc.saved_networks().len(), admitted);
}
