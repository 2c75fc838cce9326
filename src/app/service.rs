//! Provisioning service: the hexagonal core.
//!
//! [`ProvisioningService`] owns the shared state, the protocol dispatcher
//! and the connection supervisor task. It exposes the lifecycle surface
//! (init / start / stop / delete) and the connection queries. All peer
//! traffic reaches the core through the transport callbacks registered at
//! `init()`, never through direct calls.
//!
//! ```text
//!  Transport ──▶ ┌──────────────────────────────┐ ──▶ NetworkInterface
//!                │     ProvisioningService       │
//!  ListStore ◀──▶│ Dispatcher · State · Supervisor│
//!                └──────────────────────────────┘
//! ```

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use crate::config::ProvisioningConfig;
use crate::error::{ProvisionError, Result};
use crate::lifecycle::LifecycleCoordinator;
use crate::network::profile::NetworkProfile;
use crate::network::store::NetworkStore;
use crate::rpc::dispatcher::ProtocolDispatcher;
use crate::rpc::endpoint::Endpoint;
use crate::state::{RunState, ServiceState, SharedState};
use crate::supervisor::ConnectionSupervisor;

use super::events::{LifecycleEvent, ServiceStatus, SupervisorState};
use super::ports::{EndpointHandler, NetworkInterface, NetworkListStore, StorageError, Transport};

/// Everything that exists between `init()` and `delete()`.
struct Runtime {
    shared: Arc<SharedState>,
    handler: Arc<dyn EndpointHandler>,
    supervisor: Option<JoinHandle<()>>,
}

// ───────────────────────────────────────────────────────────────
// ProvisioningService
// ───────────────────────────────────────────────────────────────

pub struct ProvisioningService<N, T>
where
    N: NetworkInterface + 'static,
    T: Transport + 'static,
{
    config: ProvisioningConfig,
    network: Arc<N>,
    transport: Arc<T>,
    persistence: Option<Arc<dyn NetworkListStore>>,
    lifecycle: Arc<LifecycleCoordinator>,
    runtime: Option<Runtime>,
}

impl<N, T> ProvisioningService<N, T>
where
    N: NetworkInterface + 'static,
    T: Transport + 'static,
{
    /// Construct the service. Nothing runs until [`init`](Self::init).
    pub fn new(config: ProvisioningConfig, network: Arc<N>, transport: Arc<T>) -> Self {
        Self {
            config,
            network,
            transport,
            persistence: None,
            lifecycle: Arc::new(LifecycleCoordinator::new()),
            runtime: None,
        }
    }

    /// Load the saved list at `init()` and write it back on every change.
    #[must_use]
    pub fn with_persistence(mut self, store: Arc<dyn NetworkListStore>) -> Self {
        self.persistence = Some(store);
        self
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Build the state, load saved networks and register the endpoints.
    ///
    /// On failure nothing stays registered.
    pub fn init(&mut self) -> Result<()> {
        if self.runtime.is_some() {
            return Err(ProvisionError::AlreadyInitialized);
        }
        self.config.validate()?;

        let mut store = NetworkStore::with_limit(usize::from(self.config.max_saved_networks));
        let dropped = store.load(self.load_saved());
        if dropped > 0 {
            warn!("Service: {dropped} persisted networks exceed capacity, ignored");
        }
        info!("Service: init with {} saved networks", store.len());

        let shared = Arc::new(SharedState::new(ServiceState::new(store)));
        let handler: Arc<dyn EndpointHandler> = Arc::new(ProtocolDispatcher::new(
            &self.config,
            Arc::clone(&shared),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.network),
            Arc::clone(&self.transport),
            self.persistence.clone(),
        ));

        for (n, endpoint) in Endpoint::ALL.into_iter().enumerate() {
            if let Err(e) = self
                .transport
                .register_endpoint(endpoint, Arc::clone(&handler))
            {
                warn!("Service: registering {endpoint:?} failed: {e}");
                for registered in &Endpoint::ALL[..n] {
                    self.transport.unregister_endpoint(*registered);
                }
                return Err(e.into());
            }
        }

        self.lifecycle.reset();
        self.runtime = Some(Runtime {
            shared,
            handler,
            supervisor: None,
        });
        Ok(())
    }

    /// Start (or resume) the connection supervisor.
    pub fn start(&mut self) -> Result<()> {
        let runtime = self.runtime.as_mut().ok_or(ProvisionError::NotInitialized)?;
        if runtime.shared.lock().run == RunState::Running {
            return Ok(());
        }

        if runtime.supervisor.is_none() {
            let supervisor = ConnectionSupervisor::new(
                &self.config,
                Arc::clone(&runtime.shared),
                Arc::clone(&self.lifecycle),
                Arc::clone(&self.network),
            );
            let handle = supervisor.spawn().map_err(|e| {
                warn!("Service: supervisor spawn failed: {e}");
                ProvisionError::TaskSpawn
            })?;
            runtime.supervisor = Some(handle);
        }

        runtime.shared.update(|st| st.run = RunState::Running);
        self.lifecycle.publish(LifecycleEvent::Started);
        info!("Service: started");
        Ok(())
    }

    /// Pause the supervisor. A join already running is allowed to finish.
    pub fn stop(&mut self) -> Result<()> {
        let runtime = self.runtime.as_ref().ok_or(ProvisionError::NotInitialized)?;
        let was_running = runtime.shared.update(|st| {
            let running = st.run == RunState::Running;
            if running {
                st.run = RunState::Paused;
            }
            running
        });
        if !was_running {
            return Err(ProvisionError::Unsupported);
        }
        self.lifecycle.publish(LifecycleEvent::Stopped);
        info!("Service: stopped");
        Ok(())
    }

    /// Unregister the endpoints, end the supervisor task and release the
    /// state. `init()` may be called again afterwards.
    pub fn delete(&mut self) -> Result<()> {
        let mut runtime = self.runtime.take().ok_or(ProvisionError::NotInitialized)?;

        for endpoint in Endpoint::ALL {
            self.transport.unregister_endpoint(endpoint);
        }
        runtime.shared.update(|st| st.run = RunState::ShuttingDown);
        if let Some(handle) = runtime.supervisor.take() {
            if handle.join().is_err() {
                warn!("Service: supervisor task panicked");
            }
        }
        drop(runtime.handler);

        self.lifecycle.publish(LifecycleEvent::Deleted);
        info!("Service: deleted");
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// `true` if connected now or within `max_wait`. Zero never blocks.
    pub fn is_connected(&self, max_wait: Duration) -> bool {
        self.lifecycle.is_connected(max_wait)
    }

    /// Profile of the network the supervisor is joined to.
    pub fn connected_network(&self) -> Option<NetworkProfile> {
        self.runtime
            .as_ref()
            .and_then(|rt| rt.shared.lock().connected_profile())
    }

    pub fn status(&self) -> ServiceStatus {
        self.lifecycle.status()
    }

    /// Snapshot of the saved list in priority order.
    pub fn saved_networks(&self) -> Vec<NetworkProfile> {
        self.runtime
            .as_ref()
            .map(|rt| rt.shared.lock().store.as_slice().to_vec())
            .unwrap_or_default()
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        self.runtime
            .as_ref()
            .map(|rt| rt.shared.lock().supervisor)
            .unwrap_or_default()
    }

    /// Handle for callers on other threads that want to wait on events.
    pub fn lifecycle(&self) -> Arc<LifecycleCoordinator> {
        Arc::clone(&self.lifecycle)
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    // ── Internals ─────────────────────────────────────────────

    fn load_saved(&self) -> Vec<NetworkProfile> {
        let Some(store) = &self.persistence else {
            return Vec::new();
        };
        match store.load() {
            Ok(list) => list,
            Err(StorageError::Corrupted) => {
                warn!("Service: persisted network list corrupted, starting empty");
                Vec::new()
            }
            Err(e) => {
                warn!("Service: loading persisted network list failed: {e}");
                Vec::new()
            }
        }
    }
}

impl<N, T> Drop for ProvisioningService<N, T>
where
    N: NetworkInterface + 'static,
    T: Transport + 'static,
{
    fn drop(&mut self) {
        if self.runtime.is_some() {
            let _ = self.delete();
        }
    }
}
