//! Connection supervisor: background task that keeps the station joined
//! to one of the saved networks.
//!
//! ```text
//!            save / edit           join ok
//!   Idle ───────────────▶ Connecting ───────▶ Connected
//!    ▲   round exhausted      │  ▲               │
//!    └────────────────────────┘  └───────────────┘
//!                                 link lost / entry deleted
//! ```
//!
//! Each step copies what it needs out of [`SharedState`], releases the
//! guard, talks to the radio, then re-acquires the guard to record the
//! outcome. A join whose entry was deleted meanwhile is discarded (and
//! torn down if it succeeded).
//!
//! Candidate order: a favoured index (from Save) first, then the circular
//! cursor. Favoured attempts do not move the cursor.

use std::sync::{Arc, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::app::events::{LifecycleEvent, SupervisorState};
use crate::app::ports::NetworkInterface;
use crate::config::ProvisioningConfig;
use crate::lifecycle::LifecycleCoordinator;
use crate::network::profile::NetworkProfile;
use crate::state::{RunState, ServiceState, SharedState};
use crate::task::{Core, TaskSpec};

const TASK: TaskSpec = TaskSpec {
    name: "wifi-sup\0",
    core: Core::Pro,
    priority: 5,
    stack_kb: 8,
};

/// What the loop does next, decided under the guard.
#[derive(Debug)]
enum Step {
    Join(Attempt),
    CheckLink(usize),
    Exit,
}

#[derive(Debug)]
struct Attempt {
    index: usize,
    profile: NetworkProfile,
    /// Taken from the favoured slot rather than the circular cursor.
    favoured: bool,
    /// A different network is up and must be dropped first.
    drop_link: bool,
}

pub struct ConnectionSupervisor<N> {
    shared: Arc<SharedState>,
    lifecycle: Arc<LifecycleCoordinator>,
    network: Arc<N>,
    retry_interval: Duration,
    exhausted_interval: Duration,
    link_check_interval: Duration,
}

/// Mark `index` in flight and copy its profile out.
fn begin(st: &mut ServiceState, index: usize, favoured: bool, drop_link: bool) -> Option<Step> {
    let profile = st.store.get(index).cloned()?;
    if drop_link {
        st.connected = None;
    }
    st.in_flight = Some(index);
    st.supervisor = SupervisorState::Connecting;
    Some(Step::Join(Attempt {
        index,
        profile,
        favoured,
        drop_link,
    }))
}

impl<N: NetworkInterface + 'static> ConnectionSupervisor<N> {
    pub fn new(
        config: &ProvisioningConfig,
        shared: Arc<SharedState>,
        lifecycle: Arc<LifecycleCoordinator>,
        network: Arc<N>,
    ) -> Self {
        Self {
            shared,
            lifecycle,
            network,
            retry_interval: config.connect_retry_interval(),
            exhausted_interval: config.exhausted_retry_interval(),
            link_check_interval: config.link_check_interval(),
        }
    }

    /// Run the loop on its own task until the state says `ShuttingDown`.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        TASK.spawn(move || self.run())
    }

    fn run(&self) {
        info!("Supervisor: started");
        loop {
            match self.next_step() {
                Step::Join(attempt) => self.attempt(attempt),
                Step::CheckLink(index) => self.check_link(index),
                Step::Exit => break,
            }
        }
        info!("Supervisor: exited");
    }

    // ── Decide ────────────────────────────────────────────────

    fn next_step(&self) -> Step {
        let mut st = self.shared.lock();
        loop {
            match st.run {
                RunState::ShuttingDown => return Step::Exit,
                RunState::Paused => {
                    st = self.shared.wait(st);
                    continue;
                }
                RunState::Running => {}
            }

            if st.link_teardown {
                st = self.shared.wait(st);
                continue;
            }

            if let Some(connected) = st.connected {
                if let Some(favoured) = st.priority.take().filter(|&p| p != connected) {
                    if let Some(step) = begin(&mut st, favoured, true, true) {
                        return step;
                    }
                }
                st.supervisor = SupervisorState::Connected;
                let generation = st.generation;
                st = self.sleep(st, self.link_check_interval);
                if st.generation == generation && st.run == RunState::Running {
                    return Step::CheckLink(connected);
                }
                continue;
            }

            if st.store.is_empty() {
                st.priority = None;
                st.supervisor = SupervisorState::Idle;
                debug!("Supervisor: no saved networks, idling");
                st = self.shared.wait(st);
                continue;
            }

            if st.priority.is_none() && st.failed_in_round >= st.store.len() {
                warn!(
                    "Supervisor: all {} saved networks failed, retrying in {:?}",
                    st.store.len(),
                    self.exhausted_interval
                );
                st.failed_in_round = 0;
                st.supervisor = SupervisorState::Idle;
                self.lifecycle.publish(LifecycleEvent::Failed);
                st = self.sleep(st, self.exhausted_interval);
                continue;
            }

            let len = st.store.len();
            let (index, favoured) = match st.priority.take() {
                Some(p) if p < len => (p, true),
                _ => (st.next_connect % len, false),
            };
            if let Some(step) = begin(&mut st, index, favoured, false) {
                return step;
            }
        }
    }

    /// Wait up to `timeout`, returning early when the state changes.
    fn sleep<'a>(
        &self,
        mut st: MutexGuard<'a, ServiceState>,
        timeout: Duration,
    ) -> MutexGuard<'a, ServiceState> {
        let deadline = Instant::now() + timeout;
        let generation = st.generation;
        let run = st.run;
        loop {
            let now = Instant::now();
            if now >= deadline || st.generation != generation || st.run != run || st.link_teardown
            {
                return st;
            }
            st = self.shared.wait_timeout(st, deadline - now);
        }
    }

    // ── Act ───────────────────────────────────────────────────

    fn attempt(&self, attempt: Attempt) {
        let Attempt {
            index,
            profile,
            favoured,
            drop_link,
        } = attempt;

        if drop_link {
            info!("Supervisor: switching to favoured '{}'", profile.ssid);
            if let Err(e) = self.network.disconnect() {
                warn!("Supervisor: disconnect failed: {e}");
            }
            self.lifecycle.publish(LifecycleEvent::Disconnected);
        }

        self.lifecycle.publish(LifecycleEvent::ConnectAttemptBegun);
        info!("Supervisor: joining '{}' (index {index})", profile.ssid);
        let outcome = self.network.join(&profile);

        let mut st = self.shared.lock();
        let Some(index) = st.in_flight.take() else {
            // The entry was deleted while the guard was released.
            drop(st);
            match outcome {
                Ok(()) => {
                    warn!("Supervisor: '{}' was deleted mid-join, dropping link", profile.ssid);
                    if let Err(e) = self.network.disconnect() {
                        warn!("Supervisor: disconnect failed: {e}");
                    }
                }
                Err(e) => debug!("Supervisor: stale join of '{}' failed: {e}", profile.ssid),
            }
            return;
        };

        match outcome {
            Ok(()) => {
                st.connected = Some(index);
                st.failed_in_round = 0;
                st.supervisor = SupervisorState::Connected;
                drop(st);
                info!("Supervisor: connected to '{}' (index {index})", profile.ssid);
                self.lifecycle.publish(LifecycleEvent::Connected);
            }
            Err(e) => {
                warn!("Supervisor: join '{}' failed: {e}", profile.ssid);
                if !favoured {
                    st.failed_in_round += 1;
                    st.next_connect = (index + 1) % st.store.len().max(1);
                    // A finished round pauses in next_step instead.
                    if st.failed_in_round >= st.store.len() {
                        return;
                    }
                }
                let _st = self.sleep(st, self.retry_interval);
            }
        }
    }

    fn check_link(&self, index: usize) {
        let link = self.network.current_connection();
        let mut st = self.shared.lock();
        if st.connected != Some(index) || link.is_some() {
            return;
        }
        warn!("Supervisor: link to index {index} lost");
        st.connected = None;
        st.next_connect = 0;
        st.failed_in_round = 0;
        st.supervisor = SupervisorState::Connecting;
        drop(st);
        self.lifecycle.publish(LifecycleEvent::Disconnected);
    }
}
