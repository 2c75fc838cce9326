//! Connection supervisor behaviour against a scripted network: candidate
//! order, stale joins, deletion of the connected entry, link loss.

use std::sync::Arc;
use std::time::Duration;

use wifiprov::app::ports::NetworkError;
use wifiprov::rpc::endpoint::Endpoint;
use wifiprov::{
    LifecycleEvent, NetworkProfile, ProvisioningConfig, ProvisioningService, ServiceStatus,
    SupervisorState,
};

use super::mock_net::{FakeNetwork, MemoryListStore, RecordingTransport, eventually, save_json};

const WAIT: Duration = Duration::from_secs(2);

type Service = ProvisioningService<FakeNetwork, RecordingTransport>;

fn fast_config() -> ProvisioningConfig {
    ProvisioningConfig {
        connect_retry_interval_ms: 50,
        exhausted_retry_interval_ms: 100,
        link_check_interval_ms: 50,
        ..ProvisioningConfig::default()
    }
}

/// Service with `ssids` preloaded (open networks) in priority order.
fn service_with(ssids: &[&str]) -> (Service, Arc<FakeNetwork>, Arc<RecordingTransport>) {
    let net = FakeNetwork::new();
    let transport = RecordingTransport::new();
    let list = ssids
        .iter()
        .map(|s| NetworkProfile::open(s).unwrap())
        .collect();
    let mut svc = ProvisioningService::new(fast_config(), Arc::clone(&net), Arc::clone(&transport))
        .with_persistence(MemoryListStore::with_list(list));
    svc.init().unwrap();
    (svc, net, transport)
}

fn connected_ssid(svc: &Service) -> Option<String> {
    svc.connected_network().map(|p| p.ssid.as_str().to_owned())
}

#[test]
fn first_fails_second_connects() {
    let (mut svc, net, _) = service_with(&["bad", "good"]);
    net.always("bad", Err(NetworkError::AuthFailed));
    net.always("good", Ok(()));

    svc.start().unwrap();
    assert!(svc.is_connected(WAIT));
    assert_eq!(connected_ssid(&svc).as_deref(), Some("good"));
    assert_eq!(svc.supervisor_state(), SupervisorState::Connected);

    // Stays put: no more joins while the link holds.
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(net.failed_joins(), 1);
    assert_eq!(net.successful_joins(), 1);
    assert_eq!(net.joins()[0].0, "bad");
}

#[test]
fn highest_priority_reachable_wins() {
    let (mut svc, net, _) = service_with(&["first", "second"]);
    net.always("first", Ok(()));
    net.always("second", Ok(()));

    svc.start().unwrap();
    assert!(svc.is_connected(WAIT));
    assert_eq!(connected_ssid(&svc).as_deref(), Some("first"));
    assert_eq!(net.join_count("second"), 0);
}

#[test]
fn exhausted_round_publishes_failed_and_retries() {
    let (mut svc, net, _) = service_with(&["a", "b"]);
    net.always("a", Err(NetworkError::NotFound));
    net.script("b", &[Err(NetworkError::Timeout)]);
    net.always("b", Ok(()));

    svc.start().unwrap();
    let lifecycle = svc.lifecycle();
    assert!(eventually(WAIT, || lifecycle.count(LifecycleEvent::Failed) >= 1));
    assert!(svc.is_connected(WAIT));
    assert_eq!(connected_ssid(&svc).as_deref(), Some("b"));
    // Second round starts again from the top.
    assert_eq!(net.join_count("a"), 2);
}

#[test]
fn empty_store_idles_without_joins() {
    let (mut svc, net, _) = service_with(&[]);
    svc.start().unwrap();
    std::thread::sleep(Duration::from_millis(150));
    assert!(net.joins().is_empty());
    assert_eq!(svc.supervisor_state(), SupervisorState::Idle);
    assert_eq!(svc.status(), ServiceStatus::Started);
}

#[test]
fn stop_pauses_joining() {
    let (mut svc, net, _) = service_with(&["a"]);
    net.always("a", Err(NetworkError::NotFound));
    svc.start().unwrap();
    assert!(eventually(WAIT, || net.join_count("a") >= 1));

    svc.stop().unwrap();
    // Let any join already running finish, then nothing new starts.
    std::thread::sleep(Duration::from_millis(150));
    let after_stop = net.join_count("a");
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(net.join_count("a"), after_stop);

    net.always("a", Ok(()));
    svc.start().unwrap();
    assert!(svc.is_connected(WAIT));
}

#[test]
fn delete_mid_join_discards_stale_result() {
    let (mut svc, net, transport) = service_with(&["doomed", "backup"]);
    net.always("doomed", Ok(()));
    net.always("backup", Ok(()));
    net.close_gate();

    svc.start().unwrap();
    assert!(net.wait_parked(WAIT));

    // The join of index 0 is running with the guard released.
    transport.write(Endpoint::DeleteNetwork, r#"{"index":0}"#);
    net.open_gate();

    assert!(svc.is_connected(WAIT));
    assert!(eventually(WAIT, || connected_ssid(&svc).as_deref() == Some("backup")));
    // The stale link was torn down, exactly once.
    assert_eq!(net.disconnects(), 1);
    assert_eq!(net.join_count("doomed"), 1);
    assert_eq!(svc.saved_networks().len(), 1);
}

#[test]
fn delete_of_connected_entry_disconnects_once_then_reconnects() {
    let (mut svc, net, transport) = service_with(&["home", "fallback"]);
    net.always("home", Ok(()));
    net.always("fallback", Ok(()));
    svc.start().unwrap();
    assert!(svc.is_connected(WAIT));
    assert_eq!(connected_ssid(&svc).as_deref(), Some("home"));

    let lifecycle = svc.lifecycle();
    transport.subscribe_all();
    transport.write(Endpoint::DeleteNetwork, r#"{"index":0}"#);
    assert_eq!(transport.last_status(Endpoint::DeleteNetwork), Some(0));
    assert_eq!(net.disconnects(), 1);
    assert_eq!(lifecycle.count(LifecycleEvent::Disconnected), 1);

    // A fresh Connected event follows for the lower-priority entry.
    assert!(eventually(WAIT, || lifecycle.count(LifecycleEvent::Connected) == 2));
    assert!(svc.is_connected(Duration::ZERO));
    assert_eq!(connected_ssid(&svc).as_deref(), Some("fallback"));
    assert_eq!(net.disconnects(), 1);
}

#[test]
fn reordering_keeps_connected_entry() {
    let (mut svc, net, transport) = service_with(&["a", "b", "c"]);
    net.always("a", Ok(()));
    svc.start().unwrap();
    assert!(svc.is_connected(WAIT));

    transport.write(Endpoint::EditNetwork, r#"{"index":0,"newIndex":2}"#);
    let saved: Vec<_> = svc
        .saved_networks()
        .iter()
        .map(|p| p.ssid.as_str().to_owned())
        .collect();
    assert_eq!(saved, ["b", "c", "a"]);
    // Still joined to "a", now at index 2, with no reconnect.
    assert_eq!(connected_ssid(&svc).as_deref(), Some("a"));
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(net.join_count("a"), 1);
    assert_eq!(net.disconnects(), 0);
}

#[test]
fn lost_link_is_detected_and_rejoined() {
    let (mut svc, net, _) = service_with(&["home"]);
    net.always("home", Ok(()));
    svc.start().unwrap();
    assert!(svc.is_connected(WAIT));

    let lifecycle = svc.lifecycle();
    net.drop_link();
    assert!(eventually(WAIT, || lifecycle.count(LifecycleEvent::Disconnected) == 1));
    assert!(eventually(WAIT, || lifecycle.count(LifecycleEvent::Connected) == 2));
    assert_eq!(net.join_count("home"), 2);
}

#[test]
fn save_while_connected_switches_to_new_network() {
    let (mut svc, net, transport) = service_with(&["old"]);
    net.always("old", Ok(()));
    net.always("new", Ok(()));
    svc.start().unwrap();
    assert!(svc.is_connected(WAIT));

    transport.write(Endpoint::SaveNetwork, &save_json("new", 0, ""));
    assert!(eventually(WAIT, || connected_ssid(&svc).as_deref() == Some("new")));
    assert_eq!(net.disconnects(), 1);
}

#[test]
fn favoured_failure_falls_back_to_circular_order() {
    let (mut svc, net, transport) = service_with(&["home"]);
    net.always("home", Ok(()));
    net.always("typo", Err(NetworkError::AuthFailed));
    svc.start().unwrap();
    assert!(svc.is_connected(WAIT));

    transport.write(Endpoint::SaveNetwork, &save_json("typo", 0, ""));
    assert!(eventually(WAIT, || net.join_count("typo") >= 1));
    // The link to "home" was dropped for the attempt; it comes back.
    assert!(eventually(WAIT, || connected_ssid(&svc).as_deref() == Some("home")));
    assert_eq!(net.join_count("home"), 2);
}

#[test]
fn stop_and_restart_while_connected_still_report_connected() {
    let (mut svc, net, _) = service_with(&["home"]);
    net.always("home", Ok(()));
    svc.start().unwrap();
    assert!(svc.is_connected(WAIT));

    svc.stop().unwrap();
    assert_eq!(connected_ssid(&svc).as_deref(), Some("home"));
    assert!(svc.is_connected(Duration::ZERO));

    svc.start().unwrap();
    assert!(svc.is_connected(Duration::ZERO));
    let t0 = std::time::Instant::now();
    assert!(svc.is_connected(Duration::from_millis(500)));
    assert!(t0.elapsed() < Duration::from_millis(100));
    // The link held throughout: no rejoin.
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(net.join_count("home"), 1);
    assert_eq!(net.disconnects(), 0);
}
