//! Saved-network priority store.
//!
//! Index is both identity and priority: entry 0 is tried first. Indices are
//! kept dense (`0..len`), so every move or delete shifts its neighbours.
//! The shift is described once by [`IndexShift`] and applied both to the
//! list itself and to every bookmark that points into it (connected entry,
//! next candidate, in-flight join).
//!
//! The store holds no lock of its own; callers reach it through
//! [`SharedState`](crate::state::SharedState).

use core::cmp::Ordering;

use crate::error::{ProvisionError, Result};

use super::profile::NetworkProfile;

/// Hard cap on saved networks.
pub const MAX_SAVED_NETWORKS: usize = 8;

// ───────────────────────────────────────────────────────────────
// Index arithmetic
// ───────────────────────────────────────────────────────────────

/// How dense indices move after a single store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexShift {
    /// Entry at `from` was reinserted at `to`.
    Moved { from: usize, to: usize },
    /// Entry at the index was removed.
    Removed(usize),
}

impl IndexShift {
    /// Where the entry that lived at `idx` lives after the shift.
    /// `None` when that entry was removed.
    pub fn remap(self, idx: usize) -> Option<usize> {
        match self {
            Self::Removed(removed) => match idx.cmp(&removed) {
                Ordering::Less => Some(idx),
                Ordering::Equal => None,
                Ordering::Greater => Some(idx - 1),
            },
            Self::Moved { from, to } => {
                if idx == from {
                    Some(to)
                } else if from < to && (from + 1..=to).contains(&idx) {
                    Some(idx - 1)
                } else if to < from && (to..from).contains(&idx) {
                    Some(idx + 1)
                } else {
                    Some(idx)
                }
            }
        }
    }

    /// Remap an optional bookmark in place.
    pub fn apply(self, bookmark: &mut Option<usize>) {
        *bookmark = bookmark.and_then(|idx| self.remap(idx));
    }
}

// ───────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NetworkStore {
    entries: heapless::Vec<NetworkProfile, MAX_SAVED_NETWORKS>,
    limit: usize,
}

impl NetworkStore {
    pub fn new() -> Self {
        Self::with_limit(MAX_SAVED_NETWORKS)
    }

    /// Store that refuses saves past `limit` (clamped to `1..=MAX_SAVED_NETWORKS`).
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: heapless::Vec::new(),
            limit: limit.clamp(1, MAX_SAVED_NETWORKS),
        }
    }

    /// Pre-populate from persisted profiles in priority order.
    /// Entries past the limit are dropped; returns how many were dropped.
    pub fn load(&mut self, profiles: impl IntoIterator<Item = NetworkProfile>) -> usize {
        self.entries.clear();
        let mut dropped = 0;
        for profile in profiles {
            if self.save(profile).is_err() {
                dropped += 1;
            }
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.limit
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn get(&self, index: usize) -> Option<&NetworkProfile> {
        self.entries.get(index)
    }

    pub fn as_slice(&self) -> &[NetworkProfile] {
        &self.entries
    }

    /// Snapshot of `(index, profile)` pairs in priority order.
    pub fn list(&self) -> Vec<(usize, NetworkProfile)> {
        self.entries.iter().cloned().enumerate().collect()
    }

    /// Append at lowest priority. Duplicate SSIDs are separate entries.
    pub fn save(&mut self, profile: NetworkProfile) -> Result<usize> {
        if self.is_full() {
            return Err(ProvisionError::CapacityExceeded);
        }
        self.entries
            .push(profile)
            .map_err(|_| ProvisionError::CapacityExceeded)?;
        Ok(self.entries.len() - 1)
    }

    /// Look up an existing entry for the save-by-reference path.
    pub fn reconnect(&self, index: usize) -> Result<NetworkProfile> {
        self.entries
            .get(index)
            .cloned()
            .ok_or(ProvisionError::IndexOutOfRange)
    }

    /// Remove the entry at `from` and reinsert it at `to`.
    ///
    /// Moving 0 to 3 shifts entries 1, 2, 3 down to 0, 1, 2.
    pub fn move_entry(&mut self, from: usize, to: usize) -> Result<IndexShift> {
        let len = self.entries.len();
        if from >= len || to >= len {
            return Err(ProvisionError::IndexOutOfRange);
        }
        match from.cmp(&to) {
            Ordering::Less => self.entries[from..=to].rotate_left(1),
            Ordering::Greater => self.entries[to..=from].rotate_right(1),
            Ordering::Equal => {}
        }
        Ok(IndexShift::Moved { from, to })
    }

    /// Remove the entry at `index`; later entries shift down by one.
    pub fn delete(&mut self, index: usize) -> Result<IndexShift> {
        if index >= self.entries.len() {
            return Err(ProvisionError::IndexOutOfRange);
        }
        self.entries[index..].rotate_left(1);
        self.entries.pop();
        Ok(IndexShift::Removed(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for NetworkStore {
    fn default() -> Self {
        Self::new()
    }
}
