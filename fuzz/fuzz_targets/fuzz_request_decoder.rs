//! Fuzz target: `decode_request`
//!
//! Feeds arbitrary peer writes to every endpoint. Decoding must never
//! panic, and anything it accepts must be a profile the store would take.
//!
//! cargo fuzz run fuzz_request_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use wifiprov::app::commands::{ProvisionRequest, SaveRequest};
use wifiprov::rpc::codec::decode_request;
use wifiprov::rpc::endpoint::Endpoint;

fuzz_target!(|data: &[u8]| {
    for endpoint in Endpoint::ALL {
        if let Ok(ProvisionRequest::Save(SaveRequest::New(profile))) =
            decode_request(endpoint, data)
        {
            assert!(profile.validate().is_ok(), "decoder accepted invalid profile");
        }
    }
});
