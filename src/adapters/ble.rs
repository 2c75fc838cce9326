//! BLE peripheral bring-up.
//!
//! Starts the Bluedroid stack, publishes the provisioning GATT service
//! (one characteristic per `Endpoint`, each with write + notify and a
//! CCCD), advertises, and routes GATT events into a [`GattServer`].
//!
//! ## GATT service layout
//!
//! | Characteristic | Short UUID | Perms        |
//! |----------------|------------|--------------|
//! | Service        | `0xFF00`   |              |
//! | List network   | `0xFF01`   | Write/Notify |
//! | Save network   | `0xFF02`   | Write/Notify |
//! | Edit network   | `0xFF03`   | Write/Notify |
//! | Delete network | `0xFF04`   | Write/Notify |
//!
//! Short UUIDs are spliced into [`BASE_UUID`](crate::rpc::endpoint::BASE_UUID).
//! On the host the stack is simulated: `sim_connect` / `sim_disconnect`
//! stand in for a central.

use std::sync::Arc;

use log::{debug, info};

use super::gatt::{GattServer, NotifySink};
use crate::app::ports::TransportError;

#[cfg(target_os = "espidf")]
use crate::rpc::endpoint::Endpoint;
#[cfg(target_os = "espidf")]
use log::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ── ESP-IDF BLE static state ──────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. These statics bridge the callback context to the server.

#[cfg(target_os = "espidf")]
mod bridge {
    use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize};
    use std::sync::{Arc, OnceLock};

    use super::GattServer;
    use crate::rpc::endpoint::Endpoint;

    pub static GATT: OnceLock<Arc<GattServer>> = OnceLock::new();
    pub static GATTS_IF: AtomicU16 = AtomicU16::new(0);
    pub static CONN_ID: AtomicU16 = AtomicU16::new(0);
    pub static PEER: AtomicBool = AtomicBool::new(false);
    pub static SVC_HANDLE: AtomicU16 = AtomicU16::new(0);
    /// Endpoint slot whose characteristic is being added.
    pub static CHAR_STEP: AtomicUsize = AtomicUsize::new(0);
    pub static CHAR_HANDLES: [AtomicU16; Endpoint::COUNT] =
        [const { AtomicU16::new(0) }; Endpoint::COUNT];
    pub static CCCD_HANDLES: [AtomicU16; Endpoint::COUNT] =
        [const { AtomicU16::new(0) }; Endpoint::COUNT];
}

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(target_os = "espidf")]
fn uuid16_to_esp(uuid: u16) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 2;
    t.uuid.uuid16 = uuid;
    t
}

#[cfg(target_os = "espidf")]
fn adv_params() -> esp_idf_svc::sys::esp_ble_adv_params_t {
    use esp_idf_svc::sys::*;
    esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x40,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    }
}

/// Add the value characteristic for endpoint `slot`.
#[cfg(target_os = "espidf")]
unsafe fn add_endpoint_char(svc_handle: u16, slot: usize) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(Endpoint::ALL[slot].uuid());
    let ret = unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
            (ESP_GATT_CHAR_PROP_BIT_WRITE | ESP_GATT_CHAR_PROP_BIT_NOTIFY) as esp_gatt_char_prop_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        )
    };
    if ret != ESP_OK {
        error!("BLE GATTS: add char {:?} failed ({})", Endpoint::ALL[slot], ret);
    }
}

#[cfg(target_os = "espidf")]
fn endpoint_for_handle(handle: u16) -> Option<(Endpoint, bool)> {
    use std::sync::atomic::Ordering;
    Endpoint::ALL.into_iter().find_map(|ep| {
        if bridge::CHAR_HANDLES[ep.slot()].load(Ordering::Relaxed) == handle {
            Some((ep, false))
        } else if bridge::CCCD_HANDLES[ep.slot()].load(Ordering::Relaxed) == handle {
            Some((ep, true))
        } else {
            None
        }
    })
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => {
            let mut params = adv_params();
            unsafe {
                esp_ble_gap_start_advertising(&mut params);
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            info!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    use std::sync::atomic::Ordering;

    let Some(gatt) = bridge::GATT.get() else {
        return;
    };

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            bridge::GATTS_IF.store(u16::from(gatts_if), Ordering::Relaxed);
            info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(crate::rpc::endpoint::SERVICE_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            // Service declaration + (declaration, value, CCCD) per endpoint.
            let num_handles = (1 + 3 * Endpoint::COUNT) as u16;
            unsafe {
                esp_ble_gatts_create_service(gatts_if, &mut svc_id, num_handles);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let svc_handle = unsafe { (*param).create.service_handle };
            bridge::SVC_HANDLE.store(svc_handle, Ordering::Relaxed);
            info!("BLE GATTS: service created (handle={})", svc_handle);
            bridge::CHAR_STEP.store(0, Ordering::Relaxed);
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
                add_endpoint_char(svc_handle, 0);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let handle = unsafe { (*param).add_char.attr_handle };
            let slot = bridge::CHAR_STEP.load(Ordering::Relaxed);
            if slot >= Endpoint::COUNT {
                return;
            }
            bridge::CHAR_HANDLES[slot].store(handle, Ordering::Relaxed);
            debug!("BLE GATTS: {:?} char (handle={})", Endpoint::ALL[slot], handle);
            let mut cccd_uuid = uuid16_to_esp(crate::rpc::endpoint::CCCD_UUID);
            unsafe {
                esp_ble_gatts_add_char_descr(
                    bridge::SVC_HANDLE.load(Ordering::Relaxed),
                    &mut cccd_uuid,
                    (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                    core::ptr::null_mut(),
                    core::ptr::null_mut(),
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
            let handle = unsafe { (*param).add_char_descr.attr_handle };
            let slot = bridge::CHAR_STEP.fetch_add(1, Ordering::Relaxed);
            if slot >= Endpoint::COUNT {
                return;
            }
            bridge::CCCD_HANDLES[slot].store(handle, Ordering::Relaxed);
            if slot + 1 < Endpoint::COUNT {
                unsafe {
                    add_endpoint_char(bridge::SVC_HANDLE.load(Ordering::Relaxed), slot + 1);
                }
            } else {
                info!("BLE GATTS: all {} endpoints registered", Endpoint::COUNT);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let conn_id = unsafe { (*param).connect.conn_id };
            bridge::CONN_ID.store(conn_id, Ordering::Relaxed);
            bridge::PEER.store(true, Ordering::Release);
            gatt.on_peer_connected(super::gatt::DEFAULT_MTU);
        }
        esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
            let mtu = unsafe { (*param).mtu.mtu };
            gatt.on_mtu_changed(usize::from(mtu));
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            bridge::PEER.store(false, Ordering::Release);
            gatt.on_peer_disconnected();
            let mut params = adv_params();
            unsafe {
                esp_ble_gap_start_advertising(&mut params);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            if p.need_rsp {
                unsafe {
                    esp_ble_gatts_send_response(
                        gatts_if,
                        p.conn_id,
                        p.trans_id,
                        esp_gatt_status_t_ESP_GATT_OK,
                        core::ptr::null_mut(),
                    );
                }
            }
            if p.is_prep {
                // Long writes are framed by the fragment header instead.
                warn!("BLE GATTS: prepared write ignored");
                return;
            }
            let data = unsafe { core::slice::from_raw_parts(p.value, usize::from(p.len)) };
            let routed = match endpoint_for_handle(p.handle) {
                Some((ep, false)) => gatt.on_write(ep, data),
                Some((ep, true)) => gatt.on_cccd_write(ep, data),
                None => Ok(()),
            };
            if let Err(e) = routed {
                debug!("BLE GATTS: write on handle {} not routed: {e}", p.handle);
            }
        }
        _ => {}
    }
}

/// Outbound path for [`GattServer`] notifications.
#[cfg(target_os = "espidf")]
pub fn notify_sink() -> NotifySink {
    use esp_idf_svc::sys::*;
    use std::sync::atomic::Ordering;

    Box::new(|endpoint, frag| {
        if !bridge::PEER.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }
        let handle = bridge::CHAR_HANDLES[endpoint.slot()].load(Ordering::Relaxed);
        if handle == 0 {
            return Err(TransportError::NotRegistered);
        }
        let len = u16::try_from(frag.len()).map_err(|_| TransportError::MtuExceeded)?;
        // SAFETY: Bluedroid copies the value before returning.
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                bridge::GATTS_IF.load(Ordering::Relaxed) as esp_gatt_if_t,
                bridge::CONN_ID.load(Ordering::Relaxed),
                handle,
                len,
                frag.as_ptr() as *mut u8,
                false,
            )
        };
        if ret == ESP_OK {
            Ok(())
        } else {
            Err(TransportError::Io)
        }
    })
}

/// Outbound path for [`GattServer`] notifications (simulation: logged).
#[cfg(not(target_os = "espidf"))]
pub fn notify_sink() -> NotifySink {
    Box::new(|endpoint, frag| {
        debug!("BLE(sim): notify {endpoint:?} ({} bytes)", frag.len());
        Ok(())
    })
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    device_name: heapless::String<24>,
    gatt: Arc<GattServer>,
}

impl BleAdapter {
    pub fn new(device_name: heapless::String<24>, gatt: Arc<GattServer>) -> Self {
        Self {
            state: BleState::Idle,
            device_name,
            gatt,
        }
    }

    pub fn state(&self) -> BleState {
        match self.state {
            BleState::Advertising if self.gatt.is_peer_connected() => BleState::Connected,
            s => s,
        }
    }

    /// Bring the stack up and start advertising the provisioning service.
    pub fn start(&mut self) -> Result<(), TransportError> {
        info!("BLE: starting advertising as '{}'", self.device_name);
        match self.platform_start() {
            Ok(()) => {
                self.state = BleState::Advertising;
                Ok(())
            }
            Err(e) => {
                self.state = BleState::Failed;
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) {
        self.platform_stop();
        self.gatt.on_peer_disconnected();
        self.state = BleState::Idle;
    }

    /// Simulate a central connecting with the given ATT MTU.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_connect(&self, mtu: usize) {
        info!("BLE(sim): central connected");
        self.gatt.on_peer_connected(mtu);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_disconnect(&self) {
        info!("BLE(sim): central disconnected");
        self.gatt.on_peer_disconnected();
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), TransportError> {
        use esp_idf_svc::sys::*;

        if bridge::GATT.set(Arc::clone(&self.gatt)).is_err() {
            warn!("BLE: stack already bridged to a GATT server");
        }

        let check = |what: &str, ret: esp_err_t| {
            if ret == ESP_OK {
                Ok(())
            } else {
                error!("BLE: {what} failed ({ret})");
                Err(TransportError::Io)
            }
        };

        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check("bt_controller_init", esp_bt_controller_init(&mut bt_cfg))?;
            check(
                "bt_controller_enable",
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
            )?;
            check("bluedroid_init", esp_bluedroid_init())?;
            check("bluedroid_enable", esp_bluedroid_enable())?;

            check(
                "gap_register_callback",
                esp_ble_gap_register_callback(Some(ble_gap_event_handler)),
            )?;
            check(
                "gatts_register_callback",
                esp_ble_gatts_register_callback(Some(ble_gatts_event_handler)),
            )?;
            check("gatts_app_register", esp_ble_gatts_app_register(0))?;
            check("gatt_set_local_mtu", esp_ble_gatt_set_local_mtu(185))?;

            let mut name = [0u8; 25];
            name[..self.device_name.len()].copy_from_slice(self.device_name.as_bytes());
            check(
                "gap_set_device_name",
                esp_ble_gap_set_device_name(name.as_ptr() as *const _),
            )?;

            // Advertising starts once the data is set (ADV_DATA_SET_COMPLETE).
            let mut service_uuid = crate::rpc::endpoint::SERVICE_UUID.to_le_bytes();
            let mut adv_data = esp_ble_adv_data_t {
                set_scan_rsp: false,
                include_name: true,
                include_txpower: false,
                min_interval: 0x0006,
                max_interval: 0x0010,
                appearance: 0,
                manufacturer_len: 0,
                p_manufacturer_data: core::ptr::null_mut(),
                service_data_len: 0,
                p_service_data: core::ptr::null_mut(),
                service_uuid_len: service_uuid.len() as u16,
                p_service_uuid: service_uuid.as_mut_ptr(),
                flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
            };
            check("gap_config_adv_data", esp_ble_gap_config_adv_data(&mut adv_data))?;
        }

        info!("BLE(espidf): Bluedroid up, advertising as '{}'", self.device_name);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    #[allow(clippy::unnecessary_wraps)]
    fn platform_start(&mut self) -> Result<(), TransportError> {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name,
            crate::rpc::endpoint::SERVICE_UUID
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        bridge::PEER.store(false, std::sync::atomic::Ordering::Release);
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("BLE(sim): stopped");
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
