//! Fuzz target: `GattServer::on_write`
//!
//! Splits the input into fragments (first byte of each chunk is its
//! length) and writes them to one endpoint. Reassembly must never panic
//! and never deliver more than its buffer bound.
//!
//! cargo fuzz run fuzz_reassembly

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use wifiprov::adapters::gatt::GattServer;
use wifiprov::app::ports::{EndpointHandler, Transport};
use wifiprov::rpc::endpoint::Endpoint;

struct Bounded;

impl EndpointHandler for Bounded {
    fn on_write(&self, _endpoint: Endpoint, payload: &[u8]) {
        assert!(payload.len() <= 1024, "reassembled past the buffer bound");
    }

    fn on_subscription_change(&self, _endpoint: Endpoint, _subscribed: bool) {}
}

fuzz_target!(|data: &[u8]| {
    let server = GattServer::new(Box::new(|_, _| Ok(())));
    if server.register_endpoint(Endpoint::SaveNetwork, Arc::new(Bounded)).is_err() {
        return;
    }
    server.on_peer_connected(185);

    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let take = usize::from(len).min(tail.len());
        let (chunk, next) = tail.split_at(take);
        let _ = server.on_write(Endpoint::SaveNetwork, chunk);
        rest = next;
    }
});
