//! Network domain types: profiles, scan results and the saved-network store.

pub mod profile;
pub mod store;

pub use profile::{NetworkInfo, NetworkProfile, ScanResult, Security};
pub use store::{IndexShift, MAX_SAVED_NETWORKS, NetworkStore};
