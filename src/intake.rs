//! Client for the remote help-request intake service.
//!
//! The intake service receives emergency requests either one at a time
//! (immediate path, when the device is online at capture) or as a batch
//! (sync path, draining the offline queue). A batch either succeeds as a
//! whole or fails as a whole; partial acknowledgement is not modeled.
//!
//! # HTTP Endpoints
//!
//! - `POST {base}/requests` - a single request object
//! - `POST {base}/requests/batch` - a JSON array of requests
//! - `GET {base}/health` - reachability probe
//!
//! Any non-2xx status counts as a failed delivery.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::DeliveryError;
use crate::model::EmergencyRequest;

/// Default base URL for the intake service.
pub const DEFAULT_INTAKE_URL: &str = "http://localhost:8080/api";

/// Per-call timeout for intake requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Delivery of emergency requests to the intake service.
#[async_trait]
pub trait IntakeClient: Send + Sync {
    /// Deliver a single request.
    async fn submit(&self, request: &EmergencyRequest) -> Result<(), DeliveryError>;

    /// Deliver a batch of requests atomically.
    async fn submit_batch(&self, requests: &[EmergencyRequest]) -> Result<(), DeliveryError>;

    /// Whether the intake service is currently reachable.
    async fn is_reachable(&self) -> bool;
}

/// HTTP implementation of [`IntakeClient`].
#[derive(Clone)]
pub struct HttpIntakeClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for HttpIntakeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpIntakeClient {
    /// Create a client pointed at [`DEFAULT_INTAKE_URL`].
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_INTAKE_URL)
    }

    /// Create a client with a custom base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Create a client with a custom base URL and per-call timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build intake client; calls will have no timeout");
                reqwest::Client::new()
            });

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn check_status(response: &reqwest::Response) -> Result<(), DeliveryError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            Err(DeliveryError::Unavailable(status.to_string()))
        } else {
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl IntakeClient for HttpIntakeClient {
    async fn submit(&self, request: &EmergencyRequest) -> Result<(), DeliveryError> {
        let url = format!("{}/requests", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;
        Self::check_status(&response)
    }

    async fn submit_batch(&self, requests: &[EmergencyRequest]) -> Result<(), DeliveryError> {
        let url = format!("{}/requests/batch", self.base_url);

        let response = self.client.post(&url).json(requests).send().await?;
        Self::check_status(&response)
    }

    async fn is_reachable(&self) -> bool {
        let url = format!("{}/health", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
