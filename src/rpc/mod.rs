//! Peer-facing request/response protocol.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Transport ──▶ Dispatcher ──▶ Codec::decode ──▶ State   │
//! │  (endpoint)    (throttle)     (JSON)           (guard)  │
//! │      ▲                                            │     │
//! │      └──────── notify ◀── Codec::encode ◀─────────┘     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod dispatcher;
pub mod endpoint;
