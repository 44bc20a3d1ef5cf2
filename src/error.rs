//! Error types for Reliefline.
//!
//! Every failure in the capture and sync paths is recoverable: callers turn
//! these into user-facing notifications and keep running. Nothing here is
//! fatal to the agent.

use std::time::Duration;

use thiserror::Error;

/// Failures acquiring a position fix from the device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeolocationError {
    /// The runtime has no geolocation capability at all.
    #[error("geolocation is not supported on this device")]
    Unsupported,

    /// The user or platform refused access to the position.
    #[error("permission to read the device position was denied")]
    PermissionDenied,

    /// The provider could not determine a position.
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    /// No fix was produced within the acquisition bound.
    #[error("timed out after {0:?} waiting for a position fix")]
    Timeout(Duration),
}

impl GeolocationError {
    /// Whether capture may still proceed without coordinates under a
    /// best-effort location policy.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, GeolocationError::Unsupported)
    }
}

/// Failures reading or writing the local key-value store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures delivering requests to the remote intake service.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("intake service rejected the delivery with status {status}")]
    Rejected { status: u16 },

    #[error("intake service unavailable: {0}")]
    Unavailable(String),
}

/// Failures capturing an emergency request.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Geolocation(#[from] GeolocationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures of a synchronization attempt.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Manual sync requires connectivity and at least one pending request.
    #[error("sync not permitted (online: {online}, pending: {pending})")]
    NotPermitted { online: bool, pending: usize },

    #[error("delivery failed after {attempts} attempt(s): {source}")]
    Delivery {
        attempts: u32,
        #[source]
        source: DeliveryError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
