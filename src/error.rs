//! Unified error types for the provisioning service.
//!
//! Every fallible operation in the core funnels into [`ProvisionError`].
//! Port-level errors (network interface, transport, storage) live next to
//! their traits in [`crate::app::ports`] and convert into this type.
//! All variants are `Copy` so they can be carried into status records and
//! log lines without allocation.

use core::fmt;

use crate::app::ports::{NetworkError, StorageError, TransportError};
use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// Top-level service error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionError {
    /// Save attempted while the saved list is already full.
    CapacityExceeded,
    /// Edit / delete / reconnect named an index `>= count`.
    IndexOutOfRange,
    /// Peer message could not be decoded.
    Decode(DecodeError),
    /// Profile failed validation (SSID length, key length, security kind).
    InvalidProfile(&'static str),
    /// The network interface refused or failed a join.
    JoinFailure,
    /// A live scan failed outright.
    Scan,
    /// Lifecycle call made before `init()` (or after `delete()`).
    NotInitialized,
    /// `init()` called twice without an intervening `delete()`.
    AlreadyInitialized,
    /// Operation is not valid in the current lifecycle state.
    Unsupported,
    /// Peer write throttled by the inbound token bucket.
    RateLimited,
    /// The radio transport rejected an endpoint registration or notify.
    Transport(TransportError),
    /// Persistent network list could not be read or written.
    Storage(StorageError),
    /// Configuration rejected at `init()`.
    Config(ConfigError),
    /// The supervisor task could not be created.
    TaskSpawn,
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "saved network list is full"),
            Self::IndexOutOfRange => write!(f, "network index out of range"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::InvalidProfile(msg) => write!(f, "invalid profile: {msg}"),
            Self::JoinFailure => write!(f, "join failed"),
            Self::Scan => write!(f, "scan failed"),
            Self::NotInitialized => write!(f, "service not initialized"),
            Self::AlreadyInitialized => write!(f, "service already initialized"),
            Self::Unsupported => write!(f, "operation not supported in current state"),
            Self::RateLimited => write!(f, "request rate limited"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::TaskSpawn => write!(f, "failed to spawn supervisor task"),
        }
    }
}

impl std::error::Error for ProvisionError {}

impl ProvisionError {
    /// Status code reported to the peer for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::CapacityExceeded => StatusCode::CapacityExceeded,
            Self::IndexOutOfRange => StatusCode::IndexOutOfRange,
            Self::Decode(_) => StatusCode::DecodeError,
            Self::InvalidProfile(_) => StatusCode::InvalidProfile,
            Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::Unsupported
            | Self::Config(_) => StatusCode::NotSupported,
            Self::RateLimited => StatusCode::Busy,
            Self::JoinFailure
            | Self::Scan
            | Self::Transport(_)
            | Self::Storage(_)
            | Self::TaskSpawn => StatusCode::Failure,
        }
    }
}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is not valid JSON or misses a required key.
    Malformed,
    /// An index field was negative where a saved index is required.
    NegativeIndex,
    /// The security discriminant is unknown.
    UnknownSecurity,
    /// SSID / key does not fit its bounded buffer.
    FieldTooLong,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed message"),
            Self::NegativeIndex => write!(f, "negative index"),
            Self::UnknownSecurity => write!(f, "unknown security kind"),
            Self::FieldTooLong => write!(f, "field exceeds maximum length"),
        }
    }
}

impl From<DecodeError> for ProvisionError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<TransportError> for ProvisionError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<StorageError> for ProvisionError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for ProvisionError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<NetworkError> for ProvisionError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::ScanFailed => Self::Scan,
            _ => Self::JoinFailure,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire status codes
// ---------------------------------------------------------------------------

/// Status carried in every response record.
///
/// Codes 0-3 keep the classic WiFi driver return code values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    Failure = 1,
    Timeout = 2,
    NotSupported = 3,
    CapacityExceeded = 4,
    IndexOutOfRange = 5,
    DecodeError = 6,
    InvalidProfile = 7,
    Busy = 8,
}

impl StatusCode {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Failure),
            2 => Some(Self::Timeout),
            3 => Some(Self::NotSupported),
            4 => Some(Self::CapacityExceeded),
            5 => Some(Self::IndexOutOfRange),
            6 => Some(Self::DecodeError),
            7 => Some(Self::InvalidProfile),
            8 => Some(Self::Busy),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl<T> From<&Result<T>> for StatusCode {
    fn from(r: &Result<T>) -> Self {
        match r {
            Ok(_) => Self::Success,
            Err(e) => e.status(),
        }
    }
}

/// Service-wide `Result` alias.
pub type Result<T> = core::result::Result<T, ProvisionError>;
