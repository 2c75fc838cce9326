//! Lifecycle events and the states derived from them.
//!
//! The [`LifecycleCoordinator`](crate::lifecycle::LifecycleCoordinator)
//! broadcasts [`LifecycleEvent`]s. Waiters observe them through
//! [`ServiceStatus`], which is re-checkable rather than consumed.

/// One observed service transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// `start()` succeeded; the supervisor is running.
    Started,
    /// The supervisor picked a candidate and is about to join it.
    ConnectAttemptBegun,
    /// A join succeeded and was recorded.
    Connected,
    /// The connected link dropped or its saved entry was deleted.
    Disconnected,
    /// `stop()` paused the supervisor.
    Stopped,
    /// `delete()` released the service.
    Deleted,
    /// A full round over the saved list failed.
    Failed,
}

impl LifecycleEvent {
    pub const COUNT: usize = 7;

    /// Dense slot for per-event counters.
    pub const fn slot(self) -> usize {
        match self {
            Self::Started => 0,
            Self::ConnectAttemptBegun => 1,
            Self::Connected => 2,
            Self::Disconnected => 3,
            Self::Stopped => 4,
            Self::Deleted => 5,
            Self::Failed => 6,
        }
    }

    /// Status the service is in right after this event.
    pub const fn resulting_status(self) -> ServiceStatus {
        match self {
            Self::Started | Self::Disconnected => ServiceStatus::Started,
            Self::ConnectAttemptBegun => ServiceStatus::Connecting,
            Self::Connected => ServiceStatus::Connected,
            Self::Stopped => ServiceStatus::Stopped,
            Self::Deleted => ServiceStatus::Deleted,
            Self::Failed => ServiceStatus::Failed,
        }
    }
}

/// Service-level state as seen by external callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceStatus {
    #[default]
    NotStarted,
    Started,
    Connecting,
    Connected,
    Stopped,
    Deleted,
    Failed,
}

/// Connection supervisor state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisorState {
    #[default]
    Idle,
    Connecting,
    Connected,
}
