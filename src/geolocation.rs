//! Device geolocation.
//!
//! The position source is a port: the agent either knows a fixed position
//! for the device it runs on, or has no geolocation capability at all.
//! Callers that already hold a fix pass it in directly and skip this module.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::GeolocationError;
use crate::model::Location;

/// Default bound on waiting for a position fix.
pub const DEFAULT_GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for a single position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Prefer the most accurate fix the provider can produce.
    pub enable_high_accuracy: bool,

    /// How long to wait before giving up.
    pub timeout: Duration,

    /// Maximum age of a cached fix that may be returned. Zero forces a
    /// fresh fix.
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: DEFAULT_GEOLOCATION_TIMEOUT,
            maximum_age: Duration::ZERO,
        }
    }
}

/// A source of device position fixes.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    /// Produce the current position. Implementations need not enforce
    /// `options.timeout` themselves; [`acquire_position`] does.
    async fn current_position(&self, options: &PositionOptions)
    -> Result<Location, GeolocationError>;
}

/// Acquire a position, failing with [`GeolocationError::Timeout`] once the
/// configured bound elapses.
pub async fn acquire_position(
    provider: &dyn GeolocationProvider,
    options: &PositionOptions,
) -> Result<Location, GeolocationError> {
    match tokio::time::timeout(options.timeout, provider.current_position(options)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(timeout = ?options.timeout, "Position acquisition timed out");
            Err(GeolocationError::Timeout(options.timeout))
        }
    }
}

/// A device installed at a known position.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition {
    location: Location,
}

impl FixedPosition {
    pub fn new(location: Location) -> Self {
        Self { location }
    }
}

#[async_trait]
impl GeolocationProvider for FixedPosition {
    async fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<Location, GeolocationError> {
        Ok(self.location)
    }
}

/// A device without any geolocation capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

#[async_trait]
impl GeolocationProvider for Unsupported {
    async fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<Location, GeolocationError> {
        Err(GeolocationError::Unsupported)
    }
}
