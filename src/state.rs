//! Shared service state and the single lock that guards it.
//!
//! The store and every bookmark into it live in one [`ServiceState`]
//! behind one `Mutex`, so a reader always sees the list and the
//! connected / next / in-flight indices from the same instant.
//! The paired `Condvar` wakes the supervisor whenever something it
//! waits on changes (new work, a stop request, a deleted link).
//!
//! Blocking network calls never run with the guard held.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::app::events::SupervisorState;
use crate::error::Result;
use crate::network::profile::NetworkProfile;
use crate::network::store::{IndexShift, NetworkStore};

/// Whether the supervisor loop should be making progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Paused,
    Running,
    ShuttingDown,
}

/// Everything the dispatcher and supervisor share.
#[derive(Debug, Default)]
pub struct ServiceState {
    pub store: NetworkStore,
    /// Next index in the circular scan.
    pub next_connect: usize,
    /// Saved entry the link is up on.
    pub connected: Option<usize>,
    /// Entry whose join is running with the guard released.
    /// Cleared when that entry is deleted, so the result is discarded.
    pub in_flight: Option<usize>,
    /// Entry to try ahead of the circular order.
    pub priority: Option<usize>,
    /// The connected entry was deleted and its link is being torn down;
    /// no new join may start until the disconnect returns.
    pub link_teardown: bool,
    /// Consecutive failed joins in the current round.
    pub failed_in_round: usize,
    pub run: RunState,
    pub supervisor: SupervisorState,
    /// Bumped on every change the supervisor may want to react to.
    pub generation: u64,
}

/// Result of removing a saved entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    /// The removed entry was the connected one.
    pub was_connected: bool,
    /// A join of the removed entry is running right now.
    pub was_in_flight: bool,
}

impl ServiceState {
    pub fn new(store: NetworkStore) -> Self {
        Self {
            store,
            ..Default::default()
        }
    }

    /// Append a new profile and favour it for the next attempt.
    pub fn save_network(&mut self, profile: NetworkProfile) -> Result<usize> {
        let index = self.store.save(profile)?;
        self.favour(index);
        Ok(index)
    }

    /// Favour an already-saved entry without touching the circular cursor.
    pub fn reconnect_network(&mut self, index: usize) -> Result<NetworkProfile> {
        let profile = self.store.reconnect(index)?;
        self.favour(index);
        Ok(profile)
    }

    /// Reorder; every bookmark keeps pointing at the same profile.
    pub fn move_network(&mut self, from: usize, to: usize) -> Result<()> {
        let shift = self.store.move_entry(from, to)?;
        shift.apply(&mut self.connected);
        shift.apply(&mut self.in_flight);
        shift.apply(&mut self.priority);
        self.next_connect = shift.remap(self.next_connect).unwrap_or(0);
        self.touch();
        Ok(())
    }

    /// Remove an entry and fix up every bookmark.
    ///
    /// Removing the connected entry clears the connected index and sends
    /// the circular scan back to the top.
    pub fn delete_network(&mut self, index: usize) -> Result<Removal> {
        let removal = Removal {
            was_connected: self.connected == Some(index),
            was_in_flight: self.in_flight == Some(index),
        };
        let shift = self.store.delete(index)?;
        shift.apply(&mut self.connected);
        shift.apply(&mut self.in_flight);
        shift.apply(&mut self.priority);

        if removal.was_connected {
            self.next_connect = 0;
            self.failed_in_round = 0;
            self.link_teardown = true;
        } else {
            self.next_connect = cursor_after_removal(shift, self.next_connect, self.store.len());
        }
        self.touch();
        Ok(removal)
    }

    /// Profile of the connected entry.
    pub fn connected_profile(&self) -> Option<NetworkProfile> {
        self.connected.and_then(|i| self.store.get(i).cloned())
    }

    fn favour(&mut self, index: usize) {
        self.priority = Some(index);
        self.failed_in_round = 0;
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// The removed slot is taken by its successor, so the cursor stays put
/// unless it ran off the end.
fn cursor_after_removal(shift: IndexShift, cursor: usize, len: usize) -> usize {
    let idx = shift.remap(cursor).unwrap_or(cursor);
    if idx >= len { 0 } else { idx }
}

// ───────────────────────────────────────────────────────────────
// Guard
// ───────────────────────────────────────────────────────────────

/// One lock around [`ServiceState`] plus the supervisor's wake-up signal.
#[derive(Debug, Default)]
pub struct SharedState {
    state: Mutex<ServiceState>,
    work: Condvar,
}

impl SharedState {
    pub fn new(state: ServiceState) -> Self {
        Self {
            state: Mutex::new(state),
            work: Condvar::new(),
        }
    }

    /// Acquire the guard. A panic in another holder does not leave the
    /// state half-updated, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake the supervisor.
    pub fn notify(&self) {
        self.work.notify_all();
    }

    /// Lock, mutate, wake.
    pub fn update<R>(&self, f: impl FnOnce(&mut ServiceState) -> R) -> R {
        let out = f(&mut self.lock());
        self.notify();
        out
    }

    /// Block until notified, releasing the guard meanwhile.
    pub fn wait<'a>(&self, guard: MutexGuard<'a, ServiceState>) -> MutexGuard<'a, ServiceState> {
        self.work.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until notified or `timeout` elapses.
    pub fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, ServiceState>,
        timeout: Duration,
    ) -> MutexGuard<'a, ServiceState> {
        match self.work.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }
}
