//! Lifecycle surface of `ProvisioningService`: init / start / stop /
//! delete, persistence at init, and the end-to-end save → join path.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wifiprov::adapters::gatt::{FRAG_FIRST, GattServer};
use wifiprov::adapters::nvs::NvsAdapter;
use wifiprov::adapters::wifi::WifiAdapter;
use wifiprov::app::ports::NetworkListStore;
use wifiprov::rpc::endpoint::Endpoint;
use wifiprov::{
    LifecycleEvent, NetworkProfile, ProvisionError, ProvisioningConfig, ProvisioningService,
    Security, ServiceStatus,
};

use super::mock_net::{
    FakeNetwork, MemoryListStore, RecordingTransport, eventually, save_json, visible,
};

fn fast_config() -> ProvisioningConfig {
    ProvisioningConfig {
        connect_retry_interval_ms: 50,
        exhausted_retry_interval_ms: 50,
        link_check_interval_ms: 50,
        ..ProvisioningConfig::default()
    }
}

type Service = ProvisioningService<FakeNetwork, RecordingTransport>;

fn make_service(
    config: ProvisioningConfig,
) -> (Service, Arc<FakeNetwork>, Arc<RecordingTransport>) {
    let net = FakeNetwork::new();
    let transport = RecordingTransport::new();
    let service = ProvisioningService::new(config, Arc::clone(&net), Arc::clone(&transport));
    (service, net, transport)
}

// ── Init / start / stop / delete ─────────────────────────────

#[test]
fn init_registers_all_endpoints_once() {
    let (mut svc, _, transport) = make_service(fast_config());
    svc.init().unwrap();
    assert_eq!(transport.registered(), Endpoint::COUNT);
    assert_eq!(svc.init(), Err(ProvisionError::AlreadyInitialized));
    assert_eq!(svc.status(), ServiceStatus::NotStarted);
}

#[test]
fn lifecycle_calls_before_init_fail() {
    let (mut svc, _, _) = make_service(fast_config());
    assert_eq!(svc.start(), Err(ProvisionError::NotInitialized));
    assert_eq!(svc.stop(), Err(ProvisionError::NotInitialized));
    assert_eq!(svc.delete(), Err(ProvisionError::NotInitialized));
    assert!(svc.connected_network().is_none());
    assert!(!svc.is_connected(Duration::ZERO));
}

#[test]
fn failed_registration_rolls_back() {
    let (mut svc, _, transport) = make_service(fast_config());
    transport.reject_registration(Endpoint::EditNetwork);
    assert!(matches!(svc.init(), Err(ProvisionError::Transport(_))));
    assert_eq!(transport.registered(), 0);
    // Nothing half-built: a later start still reports uninitialized.
    assert_eq!(svc.start(), Err(ProvisionError::NotInitialized));
}

#[test]
fn invalid_config_refused_at_init() {
    let config = ProvisioningConfig {
        max_saved_networks: 0,
        ..fast_config()
    };
    let (mut svc, _, transport) = make_service(config);
    assert!(matches!(svc.init(), Err(ProvisionError::Config(_))));
    assert_eq!(transport.registered(), 0);
}

#[test]
fn stop_then_start_resumes() {
    let (mut svc, _, _) = make_service(fast_config());
    svc.init().unwrap();
    svc.start().unwrap();
    assert_eq!(svc.status(), ServiceStatus::Started);
    // Starting twice is harmless.
    svc.start().unwrap();

    svc.stop().unwrap();
    assert_eq!(svc.status(), ServiceStatus::Stopped);
    assert_eq!(svc.stop(), Err(ProvisionError::Unsupported));

    svc.start().unwrap();
    assert_eq!(svc.status(), ServiceStatus::Started);
    assert_eq!(svc.lifecycle().count(LifecycleEvent::Started), 2);
}

#[test]
fn delete_releases_and_allows_reinit() {
    let (mut svc, _, transport) = make_service(fast_config());
    svc.init().unwrap();
    svc.start().unwrap();
    svc.delete().unwrap();

    assert_eq!(svc.status(), ServiceStatus::Deleted);
    assert_eq!(transport.registered(), 0);
    assert!(!transport.write(Endpoint::SaveNetwork, &save_json("home", 0, "")));

    svc.init().unwrap();
    assert_eq!(svc.status(), ServiceStatus::NotStarted);
    assert_eq!(transport.registered(), Endpoint::COUNT);
}

#[test]
fn delete_waits_for_in_flight_join() {
    let (mut svc, net, transport) = make_service(fast_config());
    net.always("home", Ok(()));
    net.close_gate();
    svc.init().unwrap();
    svc.start().unwrap();
    transport.write(Endpoint::SaveNetwork, &save_json("home", 0, ""));
    assert!(net.wait_parked(Duration::from_secs(2)));

    let opener = {
        let net = Arc::clone(&net);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            net.open_gate();
        })
    };
    svc.delete().unwrap();
    opener.join().unwrap();

    // The join was allowed to finish before the supervisor exited.
    assert_eq!(net.join_count("home"), 1);
    assert_eq!(svc.status(), ServiceStatus::Deleted);
}

// ── End to end ────────────────────────────────────────────────

#[test]
fn save_into_empty_store_joins_and_connects() {
    let (mut svc, net, transport) = make_service(fast_config());
    net.always("home", Ok(()));
    svc.init().unwrap();
    svc.start().unwrap();
    transport.subscribe_all();

    // Empty store: the supervisor idles.
    std::thread::sleep(Duration::from_millis(100));
    assert!(net.joins().is_empty());

    assert!(transport.write(Endpoint::SaveNetwork, &save_json("home", 0, "")));
    assert_eq!(transport.last_status(Endpoint::SaveNetwork), Some(0));

    assert!(svc.is_connected(Duration::from_secs(1)));
    assert_eq!(svc.connected_network().unwrap().ssid.as_str(), "home");
    assert_eq!(svc.status(), ServiceStatus::Connected);
    assert!(svc.is_connected(Duration::ZERO));
}

#[test]
fn third_attempt_success_observed_within_budget_only() {
    let config = ProvisioningConfig {
        connect_retry_interval_ms: 200,
        exhausted_retry_interval_ms: 200,
        ..fast_config()
    };
    let (svc, net, _) = make_service(config);
    let store = MemoryListStore::with_list(vec![NetworkProfile::open("home").unwrap()]);
    let mut svc = svc.with_persistence(store);
    net.script(
        "home",
        &[Err(wifiprov::app::ports::NetworkError::Timeout); 2],
    );
    net.always("home", Ok(()));

    svc.init().unwrap();
    svc.start().unwrap();
    // Joins at ~0, ~200 and ~400 ms; only the last one succeeds.
    assert!(!svc.is_connected(Duration::ZERO));
    assert!(!svc.is_connected(Duration::from_millis(250)));
    assert!(svc.is_connected(Duration::from_secs(2)));
    assert_eq!(net.failed_joins(), 2);
    assert_eq!(net.successful_joins(), 1);
}

#[test]
fn waiters_on_other_threads_all_observe_connect() {
    let (mut svc, net, transport) = make_service(fast_config());
    net.always("home", Ok(()));
    net.set_join_latency(Duration::from_millis(100));
    svc.init().unwrap();
    svc.start().unwrap();

    let lifecycle = svc.lifecycle();
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let lc = Arc::clone(&lifecycle);
            std::thread::spawn(move || lc.is_connected(Duration::from_secs(2)))
        })
        .collect();
    transport.write(Endpoint::SaveNetwork, &save_json("home", 0, ""));

    for w in waiters {
        assert!(w.join().unwrap());
    }
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn init_loads_persisted_list() {
    let store = MemoryListStore::with_list(vec![
        NetworkProfile::new("home", Security::Wpa2, "password1").unwrap(),
        NetworkProfile::open("cafe").unwrap(),
    ]);
    let (svc, _, _) = make_service(fast_config());
    let mut svc = svc.with_persistence(store);
    svc.init().unwrap();
    let saved = svc.saved_networks();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].ssid.as_str(), "home");
}

#[test]
fn persisted_list_beyond_capacity_is_truncated() {
    let list = (0..5)
        .map(|i| NetworkProfile::open(&format!("net{i}")).unwrap())
        .collect();
    let config = ProvisioningConfig {
        max_saved_networks: 3,
        ..fast_config()
    };
    let (svc, _, _) = make_service(config);
    let mut svc = svc.with_persistence(MemoryListStore::with_list(list));
    svc.init().unwrap();
    assert_eq!(svc.saved_networks().len(), 3);
}

#[test]
fn corrupted_persisted_list_starts_empty() {
    let store = MemoryListStore::new();
    store.corrupt();
    let (svc, _, _) = make_service(fast_config());
    let mut svc = svc.with_persistence(store);
    svc.init().unwrap();
    assert!(svc.saved_networks().is_empty());
}

#[test]
fn mutations_write_through() {
    let store = MemoryListStore::new();
    let (svc, _, transport) = make_service(fast_config());
    let mut svc = svc.with_persistence(Arc::clone(&store) as Arc<dyn NetworkListStore>);
    svc.init().unwrap();

    transport.write(Endpoint::SaveNetwork, &save_json("a", 0, ""));
    transport.write(Endpoint::SaveNetwork, &save_json("b", 0, ""));
    transport.write(Endpoint::EditNetwork, r#"{"index":1,"newIndex":0}"#);
    let persisted = store.snapshot().unwrap();
    assert_eq!(persisted[0].ssid.as_str(), "b");
    assert_eq!(persisted[1].ssid.as_str(), "a");

    transport.write(Endpoint::DeleteNetwork, r#"{"index":0}"#);
    assert_eq!(store.snapshot().unwrap().len(), 1);
    assert_eq!(store.writes(), 4);
}

#[test]
fn failed_write_through_still_succeeds() {
    let store = MemoryListStore::new();
    store.fail_writes();
    let (svc, _, transport) = make_service(fast_config());
    let mut svc = svc.with_persistence(Arc::clone(&store) as Arc<dyn NetworkListStore>);
    svc.init().unwrap();
    transport.subscribe_all();

    transport.write(Endpoint::SaveNetwork, &save_json("a", 0, ""));
    assert_eq!(transport.last_status(Endpoint::SaveNetwork), Some(0));
    assert_eq!(svc.saved_networks().len(), 1);
    assert!(store.snapshot().is_none());
}

// ── Device adapters wired together ───────────────────────────

#[test]
fn gatt_wifi_and_nvs_adapters_end_to_end() {
    let wifi = Arc::new(
        WifiAdapter::new().with_visible(vec![visible("HomeWiFi", Security::Wpa2, -48)]),
    );
    let sent: Arc<Mutex<Vec<(Endpoint, Vec<u8>)>>> = Arc::default();
    let sink_log = Arc::clone(&sent);
    let gatt = Arc::new(GattServer::new(Box::new(move |ep, frag| {
        sink_log.lock().unwrap().push((ep, frag.to_vec()));
        Ok(())
    })));
    let nvs = Arc::new(NvsAdapter::new().unwrap());

    let mut svc = ProvisioningService::new(fast_config(), Arc::clone(&wifi), Arc::clone(&gatt))
        .with_persistence(Arc::clone(&nvs) as Arc<dyn NetworkListStore>);
    svc.init().unwrap();
    svc.start().unwrap();

    gatt.on_peer_connected(185);
    gatt.on_cccd_write(Endpoint::SaveNetwork, &[0x01, 0x00]).unwrap();

    let mut frame = vec![0, FRAG_FIRST];
    frame.extend_from_slice(save_json("HomeWiFi", 3, "mysecret8").as_bytes());
    gatt.on_write(Endpoint::SaveNetwork, &frame).unwrap();

    let sent = sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(&sent[0].1[2..], br#"{"status":0}"#);

    assert!(svc.is_connected(Duration::from_secs(1)));
    assert_eq!(wifi.sim_join_count(), 1);
    assert_eq!(nvs.load().unwrap().len(), 1);
    assert!(eventually(Duration::from_secs(1), || svc
        .connected_network()
        .is_some_and(|p| p.ssid.as_str() == "HomeWiFi")));
}
