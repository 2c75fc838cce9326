//! Inbound peer requests.
//!
//! Each write on a request endpoint decodes into exactly one
//! [`ProvisionRequest`]; the dispatcher matches on it exhaustively.

use std::time::Duration;

use crate::network::profile::NetworkProfile;

/// Requests the peer can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionRequest {
    List(ListRequest),
    Save(SaveRequest),
    Edit(EditRequest),
    Delete(DeleteRequest),
}

/// Enumerate saved and visible networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRequest {
    pub max_results: usize,
    pub timeout: Duration,
}

/// Persist a new profile, or favour an already-saved one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveRequest {
    /// Append a fresh profile at lowest priority.
    New(NetworkProfile),
    /// Try the saved entry at this index next.
    Existing(usize),
}

/// Move a saved entry to another priority slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditRequest {
    pub index: usize,
    pub new_index: usize,
}

/// Remove a saved entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRequest {
    pub index: usize,
}
