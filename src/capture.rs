//! Emergency request capture.
//!
//! Turns a tap on one of the emergency buttons into an [`EmergencyRequest`]
//! and routes it: delivered straight to the intake service when online,
//! saved to the offline queue otherwise.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::connectivity::Connectivity;
use crate::device::DeviceIdentity;
use crate::error::{CaptureError, GeolocationError};
use crate::geolocation::{GeolocationProvider, PositionOptions, acquire_position};
use crate::intake::IntakeClient;
use crate::model::{EmergencyRequest, EmergencyType, Location};
use crate::notify::{Notification, NotificationCenter};
use crate::queue::OfflineQueue;

/// What to do when no position fix can be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPolicy {
    /// Abort the capture; nothing is delivered or queued.
    #[default]
    Require,
    /// Capture without coordinates unless the device has no geolocation
    /// capability at all.
    BestEffort,
}

/// What to do when immediate delivery fails while online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryFailurePolicy {
    /// Save the request to the offline queue so it is retried on the next
    /// sync.
    #[default]
    Enqueue,
    /// Report the failure and discard the request.
    Drop,
}

/// Tunables for request capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapturePolicy {
    pub location: LocationPolicy,
    pub delivery_failure: DeliveryFailurePolicy,
    pub position: PositionOptions,
}

/// How a captured request was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// Delivered to the intake service immediately.
    Delivered,
    /// Offline at capture time; saved for later.
    Queued { pending: usize },
    /// Online, but delivery failed; saved for later.
    QueuedAfterFailure { pending: usize },
    /// Online, delivery failed, and the request was discarded.
    DeliveryFailed,
}

/// Builds and routes emergency requests.
pub struct RequestCapture {
    queue: Arc<OfflineQueue>,
    identity: Arc<DeviceIdentity>,
    intake: Arc<dyn IntakeClient>,
    geolocation: Arc<dyn GeolocationProvider>,
    connectivity: Connectivity,
    notifications: NotificationCenter,
    policy: CapturePolicy,
}

impl RequestCapture {
    pub fn new(
        queue: Arc<OfflineQueue>,
        identity: Arc<DeviceIdentity>,
        intake: Arc<dyn IntakeClient>,
        geolocation: Arc<dyn GeolocationProvider>,
        connectivity: Connectivity,
        notifications: NotificationCenter,
        policy: CapturePolicy,
    ) -> Self {
        Self {
            queue,
            identity,
            intake,
            geolocation,
            connectivity,
            notifications,
            policy,
        }
    }

    /// Capture a request of the given type at the device's current
    /// position and route it.
    #[instrument(skip(self))]
    pub async fn submit_emergency_request(
        &self,
        kind: EmergencyType,
    ) -> Result<CaptureOutcome, CaptureError> {
        // Connectivity is sampled when the user taps, before the position
        // wait, matching what the user saw.
        let online = self.connectivity.is_online();

        let location = match acquire_position(self.geolocation.as_ref(), &self.policy.position)
            .await
        {
            Ok(location) => Some(location),
            Err(e) => self.handle_location_error(e)?,
        };

        self.route(kind, location, online).await
    }

    /// Capture a request using a position fix the caller already holds.
    #[instrument(skip(self, location))]
    pub async fn submit_reported(
        &self,
        kind: EmergencyType,
        location: Location,
    ) -> Result<CaptureOutcome, CaptureError> {
        let online = self.connectivity.is_online();
        self.route(kind, Some(location), online).await
    }

    /// Apply the location policy to a failed acquisition. Returns the
    /// location to capture with (always `None`) or the error that aborts
    /// the capture.
    fn handle_location_error(
        &self,
        error: GeolocationError,
    ) -> Result<Option<Location>, CaptureError> {
        if error == GeolocationError::Unsupported {
            self.notifications.publish(Notification::destructive(
                "Location services not available",
                "Your device doesn't support location services. \
                 Please use the detailed form instead.",
            ));
            return Err(error.into());
        }

        self.notifications.publish(Notification::destructive(
            "Location error",
            "Unable to get your location. Please try again or provide location manually.",
        ));

        match self.policy.location {
            LocationPolicy::Require => {
                warn!(error = %error, "Capture aborted without a position fix");
                Err(error.into())
            }
            LocationPolicy::BestEffort => {
                warn!(error = %error, "Capturing request without a position fix");
                Ok(None)
            }
        }
    }

    async fn route(
        &self,
        kind: EmergencyType,
        location: Option<Location>,
        online: bool,
    ) -> Result<CaptureOutcome, CaptureError> {
        let device_id = self.identity.resolve().await?;
        let request = EmergencyRequest::new(kind, location, device_id);

        if !online {
            let pending = self.queue.enqueue(request).await?;
            info!(kind = %kind, pending, "Request saved offline");
            self.notifications.publish(Notification::info(
                "Request saved offline",
                "We'll send your request as soon as you're back online.",
            ));
            return Ok(CaptureOutcome::Queued { pending });
        }

        match self.intake.submit(&request).await {
            Ok(()) => {
                info!(kind = %kind, "Request delivered");
                self.notifications.publish(Notification::info(
                    "Help request sent!",
                    format!("Your {kind} request has been received. Help is on the way."),
                ));
                Ok(CaptureOutcome::Delivered)
            }
            Err(e) => match self.policy.delivery_failure {
                DeliveryFailurePolicy::Enqueue => {
                    let pending = self.queue.enqueue(request).await?;
                    warn!(kind = %kind, error = %e, pending, "Delivery failed; request saved offline");
                    self.notifications.publish(Notification::info(
                        "Request saved offline",
                        "We couldn't reach the relief team right now. \
                         Your request will be sent automatically.",
                    ));
                    Ok(CaptureOutcome::QueuedAfterFailure { pending })
                }
                DeliveryFailurePolicy::Drop => {
                    warn!(kind = %kind, error = %e, "Delivery failed; request dropped");
                    self.notifications.publish(Notification::destructive(
                        "Request not sent",
                        "We couldn't reach the relief team. Please try again.",
                    ));
                    Ok(CaptureOutcome::DeliveryFailed)
                }
            },
        }
    }
}
