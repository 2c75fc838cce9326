//! GATT endpoint server: the [`Transport`] adapter.
//!
//! Owns the endpoint → handler table, per-endpoint notification
//! subscriptions (CCCD state) and the MTU framing of writes and
//! notifications. The radio glue in [`super::ble`] feeds raw GATT events
//! in through the `on_*` methods and drains outbound fragments through
//! the [`NotifySink`] given at construction. Nothing here touches
//! Bluedroid, so the whole table is exercised on the host.
//!
//! ## MTU fragmentation
//!
//! A peer write or a notification larger than `(mtu - 3)` is split into
//! fragments with a two-byte header:
//!
//! ```text
//! ┌──────┬──────┬─────────────────────┐
//! │ Seq  │ Flags│  Fragment payload    │
//! │ (1B) │ (1B) │  (mtu - 5 bytes)    │
//! └──────┴──────┴─────────────────────┘
//! ```
//!
//! Flags: bit 0 = "more fragments", bit 1 = "first fragment".
//! Each endpoint reassembles independently.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::app::ports::{EndpointHandler, Transport, TransportError};
use crate::rpc::endpoint::Endpoint;

// ── Constants ────────────────────────────────────────────────

pub const DEFAULT_MTU: usize = 23;
/// ATT opcode + attribute handle.
const ATT_HEADER_SIZE: usize = 3;
const FRAG_HEADER_SIZE: usize = 2;
const MAX_REASSEMBLY_SIZE: usize = 1024;

/// Fragment flag: more fragments follow.
pub const FRAG_MORE: u8 = 0x01;
/// Fragment flag: this is the first fragment.
pub const FRAG_FIRST: u8 = 0x02;

/// CCCD bits: notifications (bit 0) or indications (bit 1) enabled.
const CCCD_NOTIFY: u16 = 0x0001;
const CCCD_INDICATE: u16 = 0x0002;

/// Pushes one framed fragment to the connected peer on an endpoint.
pub type NotifySink = Box<dyn Fn(Endpoint, &[u8]) -> Result<(), TransportError> + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Reassembly buffer ────────────────────────────────────────

/// Per-endpoint reassembly buffer for fragmented writes.
struct ReassemblyBuffer {
    data: Vec<u8>,
    expected_seq: u8,
    active: bool,
}

impl ReassemblyBuffer {
    const fn new() -> Self {
        Self {
            data: Vec::new(),
            expected_seq: 0,
            active: false,
        }
    }

    fn reset(&mut self) {
        self.data.clear();
        self.expected_seq = 0;
        self.active = false;
    }

    /// Append a fragment. Returns the whole frame once the last fragment
    /// arrives.
    fn append(
        &mut self,
        seq: u8,
        flags: u8,
        payload: &[u8],
    ) -> Result<Option<Vec<u8>>, TransportError> {
        if flags & FRAG_FIRST != 0 {
            self.reset();
            self.active = true;
        }
        if !self.active {
            return Err(TransportError::SequenceError);
        }
        if seq != self.expected_seq {
            self.reset();
            return Err(TransportError::SequenceError);
        }
        if self.data.len() + payload.len() > MAX_REASSEMBLY_SIZE {
            self.reset();
            return Err(TransportError::ReassemblyOverflow);
        }

        self.data.extend_from_slice(payload);
        self.expected_seq = seq.wrapping_add(1);

        if flags & FRAG_MORE != 0 {
            Ok(None)
        } else {
            self.active = false;
            Ok(Some(core::mem::take(&mut self.data)))
        }
    }
}

/// Split `data` into framed fragments that fit a notification at `mtu`.
fn fragment(data: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>, TransportError> {
    let max_payload = mtu.saturating_sub(ATT_HEADER_SIZE + FRAG_HEADER_SIZE);
    if max_payload == 0 {
        return Err(TransportError::MtuExceeded);
    }

    // An empty payload still goes out as one (empty) first-and-last fragment.
    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![data]
    } else {
        data.chunks(max_payload).collect()
    };
    let total = chunks.len();

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut flags = 0u8;
            if i == 0 {
                flags |= FRAG_FIRST;
            }
            if i + 1 < total {
                flags |= FRAG_MORE;
            }
            let mut frag = Vec::with_capacity(FRAG_HEADER_SIZE + chunk.len());
            frag.push(i as u8);
            frag.push(flags);
            frag.extend_from_slice(chunk);
            frag
        })
        .collect())
}

// ── Link state ───────────────────────────────────────────────

/// What is known about the (single) connected peer.
struct Link {
    connected: bool,
    mtu: usize,
    subscribed: [bool; Endpoint::COUNT],
    reassembly: [ReassemblyBuffer; Endpoint::COUNT],
}

impl Link {
    const fn new() -> Self {
        Self {
            connected: false,
            mtu: DEFAULT_MTU,
            subscribed: [false; Endpoint::COUNT],
            reassembly: [const { ReassemblyBuffer::new() }; Endpoint::COUNT],
        }
    }
}

// ── GATT server ──────────────────────────────────────────────

pub struct GattServer {
    handlers: Mutex<[Option<Arc<dyn EndpointHandler>>; Endpoint::COUNT]>,
    link: Mutex<Link>,
    sink: NotifySink,
}

impl GattServer {
    pub fn new(sink: NotifySink) -> Self {
        Self {
            handlers: Mutex::new([const { None }; Endpoint::COUNT]),
            link: Mutex::new(Link::new()),
            sink,
        }
    }

    pub fn is_peer_connected(&self) -> bool {
        lock(&self.link).connected
    }

    pub fn mtu(&self) -> usize {
        lock(&self.link).mtu
    }

    pub fn is_subscribed(&self, endpoint: Endpoint) -> bool {
        lock(&self.link).subscribed[endpoint.slot()]
    }

    fn handler(&self, endpoint: Endpoint) -> Option<Arc<dyn EndpointHandler>> {
        lock(&self.handlers)[endpoint.slot()].clone()
    }

    // ── Radio events ──────────────────────────────────────────

    /// A central connected. Subscriptions start disabled.
    pub fn on_peer_connected(&self, mtu: usize) {
        let mut link = lock(&self.link);
        *link = Link::new();
        link.connected = true;
        link.mtu = mtu.max(ATT_HEADER_SIZE + FRAG_HEADER_SIZE + 1);
        info!("GATT: peer connected (MTU={})", link.mtu);
    }

    /// The central went away: drop partial writes and report every
    /// enabled subscription as disabled.
    pub fn on_peer_disconnected(&self) {
        let was_subscribed = {
            let mut link = lock(&self.link);
            let subscribed = link.subscribed;
            *link = Link::new();
            subscribed
        };
        info!("GATT: peer disconnected");
        for endpoint in Endpoint::ALL {
            if was_subscribed[endpoint.slot()] {
                if let Some(handler) = self.handler(endpoint) {
                    handler.on_subscription_change(endpoint, false);
                }
            }
        }
    }

    pub fn on_mtu_changed(&self, mtu: usize) {
        let mut link = lock(&self.link);
        link.mtu = mtu.max(ATT_HEADER_SIZE + FRAG_HEADER_SIZE + 1);
        debug!("GATT: MTU now {}", link.mtu);
    }

    /// A framed write arrived on an endpoint's value characteristic.
    ///
    /// The handler runs on the calling (radio) thread once the frame is
    /// complete, with no lock held.
    pub fn on_write(&self, endpoint: Endpoint, data: &[u8]) -> Result<(), TransportError> {
        let handler = self.handler(endpoint).ok_or(TransportError::NotRegistered)?;
        if data.len() < FRAG_HEADER_SIZE {
            return Err(TransportError::Io);
        }
        let (seq, flags, payload) = (data[0], data[1], &data[FRAG_HEADER_SIZE..]);

        let frame = {
            let mut link = lock(&self.link);
            let appended = link.reassembly[endpoint.slot()].append(seq, flags, payload);
            match appended {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!("GATT: {endpoint:?} write dropped: {e}");
                    return Err(e);
                }
            }
        };

        debug!("GATT: {endpoint:?} frame complete ({} bytes)", frame.len());
        handler.on_write(endpoint, &frame);
        Ok(())
    }

    /// A write to an endpoint's Client Characteristic Configuration
    /// Descriptor.
    pub fn on_cccd_write(&self, endpoint: Endpoint, value: &[u8]) -> Result<(), TransportError> {
        let bits = match value {
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            _ => return Err(TransportError::Io),
        };
        let subscribed = bits & (CCCD_NOTIFY | CCCD_INDICATE) != 0;

        let changed = {
            let mut link = lock(&self.link);
            let slot = &mut link.subscribed[endpoint.slot()];
            let changed = *slot != subscribed;
            *slot = subscribed;
            changed
        };
        if changed {
            debug!("GATT: {endpoint:?} subscribed={subscribed}");
            if let Some(handler) = self.handler(endpoint) {
                handler.on_subscription_change(endpoint, subscribed);
            }
        }
        Ok(())
    }
}

impl Transport for GattServer {
    fn register_endpoint(
        &self,
        endpoint: Endpoint,
        handler: Arc<dyn EndpointHandler>,
    ) -> Result<(), TransportError> {
        let mut handlers = lock(&self.handlers);
        let slot = &mut handlers[endpoint.slot()];
        if slot.is_some() {
            return Err(TransportError::AlreadyRegistered);
        }
        *slot = Some(handler);
        debug!("GATT: {endpoint:?} registered ({:#06x})", endpoint.short_uuid());
        Ok(())
    }

    fn unregister_endpoint(&self, endpoint: Endpoint) {
        if lock(&self.handlers)[endpoint.slot()].take().is_some() {
            debug!("GATT: {endpoint:?} unregistered");
        }
    }

    fn notify(&self, endpoint: Endpoint, payload: &[u8]) -> Result<(), TransportError> {
        let frags = {
            let link = lock(&self.link);
            if !link.connected {
                return Err(TransportError::NotConnected);
            }
            if !link.subscribed[endpoint.slot()] {
                debug!("GATT: {endpoint:?} not subscribed, notification dropped");
                return Ok(());
            }
            fragment(payload, link.mtu)?
        };
        for frag in &frags {
            (self.sink)(endpoint, frag)?;
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────
