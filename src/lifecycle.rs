//! Lifecycle coordinator: broadcast of service transitions.
//!
//! Events are never consumed. Each publish updates the current
//! [`ServiceStatus`] and bumps a per-event counter, then wakes every
//! waiter. A waiter snapshots the counter first and returns once it has
//! moved, so any number of callers observe the same transition and a
//! caller can re-check at any time.
//!
//! Link state is tracked apart from the status: `Started` and `Stopped`
//! overwrite the status but leave an established link connected.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;

use crate::app::events::{LifecycleEvent, ServiceStatus};

#[derive(Debug, Default)]
struct Inner {
    status: ServiceStatus,
    /// Set by `Connected`, cleared by `Disconnected` and `Deleted`.
    connected: bool,
    counts: [u64; LifecycleEvent::COUNT],
}

#[derive(Debug, Default)]
pub struct LifecycleCoordinator {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl LifecycleCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a transition and wake all waiters.
    pub fn publish(&self, event: LifecycleEvent) {
        let mut inner = self.lock();
        inner.status = event.resulting_status();
        match event {
            LifecycleEvent::Connected => inner.connected = true,
            LifecycleEvent::Disconnected | LifecycleEvent::Deleted => inner.connected = false,
            _ => {}
        }
        inner.counts[event.slot()] += 1;
        drop(inner);
        debug!("Lifecycle: {event:?}");
        self.changed.notify_all();
    }

    /// Return to the pre-start status, e.g. for a fresh `init()`.
    /// Counters keep running so stale waiters are not confused.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.status = ServiceStatus::NotStarted;
        inner.connected = false;
        drop(inner);
        self.changed.notify_all();
    }

    pub fn status(&self) -> ServiceStatus {
        self.lock().status
    }

    /// How many times `event` has been published.
    pub fn count(&self, event: LifecycleEvent) -> u64 {
        self.lock().counts[event.slot()]
    }

    /// Block until `event` is published after this call, or `timeout`.
    pub fn wait_for(&self, event: LifecycleEvent, timeout: Duration) -> bool {
        let guard = self.lock();
        let seen = guard.counts[event.slot()];
        if timeout.is_zero() {
            return false;
        }
        let guard = self.wait_while(guard, timeout, |inner| {
            inner.counts[event.slot()] == seen
        });
        guard.counts[event.slot()] != seen
    }

    /// `true` if the service is connected now, or a `Connected` event
    /// arrives within `max_wait`. A zero wait never blocks.
    pub fn is_connected(&self, max_wait: Duration) -> bool {
        let slot = LifecycleEvent::Connected.slot();
        let guard = self.lock();
        if guard.connected {
            return true;
        }
        if max_wait.is_zero() {
            return false;
        }
        let seen = guard.counts[slot];
        let guard = self.wait_while(guard, max_wait, |inner| {
            !inner.connected && inner.counts[slot] == seen
        });
        guard.connected || guard.counts[slot] != seen
    }

    fn wait_while<'a>(
        &self,
        guard: MutexGuard<'a, Inner>,
        timeout: Duration,
        condition: impl FnMut(&mut Inner) -> bool,
    ) -> MutexGuard<'a, Inner> {
        match self.changed.wait_timeout_while(guard, timeout, condition) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }
}
