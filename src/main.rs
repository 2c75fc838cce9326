//! WifiProv: device entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                  Adapters (outer ring)                     │
//! │                                                            │
//! │  BleAdapter ─▶ GattServer     WifiAdapter     NvsAdapter   │
//! │  (Bluedroid)   (Transport)    (NetworkIface)  (ListStore)  │
//! │                                                            │
//! │  ─────────────── Port Trait Boundary ───────────────────   │
//! │                                                            │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │           ProvisioningService (pure logic)           │  │
//! │  │  Dispatcher · NetworkStore · Supervisor · Lifecycle  │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::{info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

use wifiprov::adapters::ble::{self, BleAdapter};
use wifiprov::adapters::gatt::GattServer;
use wifiprov::adapters::nvs::NvsAdapter;
use wifiprov::adapters::wifi::WifiAdapter;
use wifiprov::app::ports::NetworkListStore;
use wifiprov::{ProvisioningConfig, ProvisioningService};

const DEVICE_NAME: &str = "wifiprov";

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  WifiProv v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Saved-network persistence ──────────────────────────
    let persistence: Option<Arc<dyn NetworkListStore>> = match NvsAdapter::new() {
        Ok(nvs) => Some(Arc::new(nvs)),
        Err(e) => {
            // Provisioning still works; changes are lost on reboot.
            warn!("NVS init failed ({}), running without persistence", e);
            None
        }
    };

    // ── 3. WiFi station driver ────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs_partition))?,
        sys_loop,
    )?;
    let wifi = Arc::new(WifiAdapter::new(wifi));

    // ── 4. GATT server + BLE stack ────────────────────────────
    let gatt = Arc::new(GattServer::new(ble::notify_sink()));
    let mut name = heapless::String::<24>::new();
    name.push_str(DEVICE_NAME)
        .map_err(|()| anyhow!("device name too long"))?;
    let mut ble = BleAdapter::new(name, Arc::clone(&gatt));
    ble.start().map_err(|e| anyhow!("BLE start failed: {e}"))?;

    // ── 5. Provisioning service ───────────────────────────────
    let mut service = ProvisioningService::new(ProvisioningConfig::default(), wifi, gatt);
    if let Some(store) = persistence {
        service = service.with_persistence(store);
    }
    service.init()?;
    service.start()?;
    info!(
        "Boot: provisioning ready ({} saved networks)",
        service.saved_networks().len()
    );

    // ── 6. Park ───────────────────────────────────────────────
    // Peer traffic arrives on the Bluedroid task; the supervisor owns its
    // own thread. The main task only keeps the service alive.
    loop {
        std::thread::park();
    }
}
