//! Protocol dispatcher: turns one peer write into one store operation
//! and its response.
//!
//! Every write passes two gates before it touches the store:
//!
//! 1. **Rate limiting**: token bucket (via `burster`); an empty bucket
//!    answers `Busy` without decoding.
//! 2. **Decode**: the endpoint picks the request kind; a malformed
//!    payload answers with a decode-error status on the same endpoint.
//!
//! Responses go out only on endpoints the peer has subscribed to. An
//! unsubscribed peer still gets the operation executed; the result is
//! dropped.
//!
//! The dispatcher runs on the transport's callback context. It holds the
//! shared guard only to copy out or mutate; scans and disconnects run
//! with the guard released.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};

use burster::Limiter;
use log::{debug, info, warn};

use crate::app::commands::{DeleteRequest, EditRequest, ListRequest, ProvisionRequest, SaveRequest};
use crate::app::events::LifecycleEvent;
use crate::app::ports::{EndpointHandler, NetworkInterface, NetworkListStore, Transport};
use crate::config::ProvisioningConfig;
use crate::error::{ProvisionError, Result, StatusCode};
use crate::lifecycle::LifecycleCoordinator;
use crate::network::profile::{NetworkInfo, NetworkProfile, ScanResult};
use crate::state::{RunState, ServiceState, SharedState};

use super::codec::{decode_request, encode_info, encode_status};
use super::endpoint::Endpoint;

pub struct ProtocolDispatcher<N, T> {
    shared: Arc<SharedState>,
    lifecycle: Arc<LifecycleCoordinator>,
    network: Arc<N>,
    transport: Arc<T>,
    persistence: Option<Arc<dyn NetworkListStore>>,
    subscribed: [AtomicBool; Endpoint::COUNT],
    limiter: Mutex<burster::TokenBucket<fn() -> Duration>>,
    max_scan_results: usize,
    max_scan_timeout: Duration,
}

impl<N: NetworkInterface, T: Transport> ProtocolDispatcher<N, T> {
    pub fn new(
        config: &ProvisioningConfig,
        shared: Arc<SharedState>,
        lifecycle: Arc<LifecycleCoordinator>,
        network: Arc<N>,
        transport: Arc<T>,
        persistence: Option<Arc<dyn NetworkListStore>>,
    ) -> Self {
        Self {
            shared,
            lifecycle,
            network,
            transport,
            persistence,
            subscribed: core::array::from_fn(|_| AtomicBool::new(false)),
            limiter: Mutex::new(burster::TokenBucket::new_with_time_provider(
                config.request_rate_per_sec.into(),
                config.request_burst.into(),
                platform_now as fn() -> Duration,
            )),
            max_scan_results: usize::from(config.max_scan_results),
            max_scan_timeout: config.max_scan_timeout(),
        }
    }

    /// Whether the peer has notifications enabled on `endpoint`.
    pub fn is_subscribed(&self, endpoint: Endpoint) -> bool {
        self.subscribed[endpoint.slot()].load(Ordering::Acquire)
    }

    /// Execute one decoded request and deliver its response on `endpoint`.
    pub fn handle(&self, endpoint: Endpoint, request: ProvisionRequest) {
        match request {
            ProvisionRequest::List(req) => self.list(endpoint, req),
            ProvisionRequest::Save(req) => {
                let result = self.save(req);
                self.respond_status(endpoint, &result);
            }
            ProvisionRequest::Edit(req) => {
                let result = self.edit(req);
                self.respond_status(endpoint, &result);
            }
            ProvisionRequest::Delete(req) => {
                let result = self.delete(req);
                self.respond_status(endpoint, &result);
            }
        }
    }

    // ── Request handlers ──────────────────────────────────────

    fn list(&self, endpoint: Endpoint, req: ListRequest) {
        let max_results = req.max_results.min(self.max_scan_results);
        let timeout = req.timeout.min(self.max_scan_timeout);

        let scan = if max_results == 0 {
            Ok(Vec::new())
        } else {
            self.network.scan(max_results, timeout)
        };
        if let Err(e) = &scan {
            warn!("Dispatch: scan failed: {e}");
        }
        let visible = scan.as_deref().unwrap_or_default();

        let (saved, connected) = {
            let st = self.shared.lock();
            (st.store.as_slice().to_vec(), st.connected)
        };

        let mut sent = 0usize;
        for info in list_records(&saved, connected, visible) {
            self.send(endpoint, &encode_info(&info));
            sent += 1;
        }
        let status = if scan.is_ok() {
            StatusCode::Success
        } else {
            StatusCode::Failure
        };
        debug!("Dispatch: list sent {sent} records, status {status:?}");
        self.send(endpoint, &encode_status(status));
    }

    fn save(&self, req: SaveRequest) -> Result<()> {
        self.shared.update(|st| match req {
            SaveRequest::New(profile) => {
                let ssid = profile.ssid.clone();
                let index = st.save_network(profile)?;
                info!("Dispatch: saved '{ssid}' at index {index}");
                self.persist(st);
                Ok(())
            }
            SaveRequest::Existing(index) => {
                let profile = st.reconnect_network(index)?;
                info!("Dispatch: favouring saved '{}' (index {index})", profile.ssid);
                Ok(())
            }
        })
    }

    fn edit(&self, req: EditRequest) -> Result<()> {
        self.shared.update(|st| {
            st.move_network(req.index, req.new_index)?;
            info!("Dispatch: moved index {} to {}", req.index, req.new_index);
            self.persist(st);
            Ok(())
        })
    }

    fn delete(&self, req: DeleteRequest) -> Result<()> {
        let removal = self.shared.update(|st| {
            let removal = st.delete_network(req.index)?;
            info!("Dispatch: deleted index {}", req.index);
            self.persist(st);
            Ok::<_, ProvisionError>(removal)
        })?;

        if removal.was_connected {
            info!("Dispatch: deleted the connected network, dropping link");
            if let Err(e) = self.network.disconnect() {
                warn!("Dispatch: disconnect failed: {e}");
            }
            self.lifecycle.publish(LifecycleEvent::Disconnected);
            self.shared.update(|st| st.link_teardown = false);
        }
        Ok(())
    }

    // ── Plumbing ──────────────────────────────────────────────

    /// Consume one rate-limit token; `false` when exhausted.
    fn admit(&self) -> bool {
        self.limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_consume(1)
            .is_ok()
    }

    /// Write the list back while the guard is still held, so the
    /// persisted order matches the in-memory order.
    fn persist(&self, st: &ServiceState) {
        if let Some(store) = &self.persistence {
            if let Err(e) = store.save(st.store.as_slice()) {
                warn!("Dispatch: persisting network list failed: {e}");
            }
        }
    }

    fn respond_status(&self, endpoint: Endpoint, result: &Result<()>) {
        if let Err(e) = result {
            warn!("Dispatch: {endpoint:?} failed: {e}");
        }
        self.send(endpoint, &encode_status(StatusCode::from(result)));
    }

    fn send(&self, endpoint: Endpoint, payload: &[u8]) {
        if !self.is_subscribed(endpoint) {
            debug!("Dispatch: {endpoint:?} not subscribed, response dropped");
            return;
        }
        if let Err(e) = self.transport.notify(endpoint, payload) {
            warn!("Dispatch: notify on {endpoint:?} failed: {e}");
        }
    }
}

impl<N: NetworkInterface, T: Transport> EndpointHandler for ProtocolDispatcher<N, T> {
    fn on_write(&self, endpoint: Endpoint, payload: &[u8]) {
        if !self.admit() {
            warn!("Dispatch: rate limited write on {endpoint:?}");
            self.send(endpoint, &encode_status(ProvisionError::RateLimited.status()));
            return;
        }
        if self.shared.lock().run == RunState::ShuttingDown {
            self.send(endpoint, &encode_status(ProvisionError::NotInitialized.status()));
            return;
        }
        match decode_request(endpoint, payload) {
            Ok(request) => self.handle(endpoint, request),
            Err(e) => {
                warn!("Dispatch: bad request on {endpoint:?}: {e}");
                self.send(endpoint, &encode_status(e.status()));
            }
        }
    }

    fn on_subscription_change(&self, endpoint: Endpoint, subscribed: bool) {
        debug!("Dispatch: {endpoint:?} subscribed={subscribed}");
        self.subscribed[endpoint.slot()].store(subscribed, Ordering::Release);
    }
}

/// Saved entries in priority order, then scan-only results.
///
/// A scan result that matches a saved entry enriches that entry and is
/// not reported again. Lazy: records are produced as they are sent.
pub fn list_records<'a>(
    saved: &'a [NetworkProfile],
    connected: Option<usize>,
    scan: &'a [ScanResult],
) -> impl Iterator<Item = NetworkInfo> + 'a {
    let saved_records = saved.iter().enumerate().map(move |(index, profile)| {
        let seen = scan.iter().find(|s| profile.matches(s));
        NetworkInfo::from_saved(index, profile, connected == Some(index), seen)
    });
    let scan_only = scan
        .iter()
        .filter(move |s| !saved.iter().any(|p| p.matches(s)))
        .map(NetworkInfo::from_scan);
    saved_records.chain(scan_only)
}

// ── Platform time for rate limiter ───────────────────────────

#[cfg(target_os = "espidf")]
fn platform_now() -> Duration {
    let us = unsafe { esp_idf_sys::esp_timer_get_time() };
    Duration::from_micros(us as u64)
}

#[cfg(not(target_os = "espidf"))]
fn platform_now() -> Duration {
    use std::time::Instant;
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}
