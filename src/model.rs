//! Data models for Reliefline.
//!
//! # Wire Format
//!
//! Requests are persisted and delivered as JSON objects shaped like this:
//!
//! ```json
//! {
//!     "type": "rescue",
//!     "location": { "latitude": 14.6, "longitude": 121.0, "accuracy": 12.0 },
//!     "timestamp": "2024-01-15T10:30:00Z",
//!     "deviceId": "device-k3j9x0qv2m1ab"
//! }
//! ```
//!
//! `location` is `null` when the request was captured without a position fix.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The category of aid a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyType {
    /// Someone needs to be rescued or evacuated.
    Rescue,
    /// Food or drinking water.
    Food,
    /// Medical emergency.
    Medical,
}

impl EmergencyType {
    /// Lowercase name as used on the wire and in notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyType::Rescue => "rescue",
            EmergencyType::Food => "food",
            EmergencyType::Medical => "medical",
        }
    }
}

impl fmt::Display for EmergencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Latitude in decimal degrees.
    pub latitude: f64,

    /// Longitude in decimal degrees.
    pub longitude: f64,

    /// Radius of uncertainty in metres.
    pub accuracy: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_accuracy: Option<f64>,

    /// Direction of travel in degrees clockwise from true north.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,

    /// Ground speed in metres per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl Location {
    /// A plain fix with no altitude or motion data.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
            speed: None,
        }
    }

    /// Whether the coordinates fall inside the valid WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.accuracy >= 0.0
    }
}

/// A stable per-device pseudo-identifier.
///
/// Stands in for user identity in the account-less flow. Generated once and
/// persisted by [`crate::device::DeviceIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single user-originated help request.
///
/// Requests are immutable once captured. The only thing that changes over
/// their lifetime is whether they sit in the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRequest {
    #[serde(rename = "type")]
    kind: EmergencyType,
    location: Option<Location>,
    timestamp: DateTime<Utc>,
    device_id: DeviceId,
}

impl EmergencyRequest {
    /// Capture a request stamped with the current time.
    pub fn new(kind: EmergencyType, location: Option<Location>, device_id: DeviceId) -> Self {
        Self::captured_at(kind, location, device_id, Utc::now())
    }

    /// Capture a request with an explicit creation time.
    pub fn captured_at(
        kind: EmergencyType,
        location: Option<Location>,
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            location,
            timestamp,
            device_id,
        }
    }

    pub fn kind(&self) -> EmergencyType {
        self.kind
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }
}

/// State of the pending-requests indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSummary {
    /// Number of requests waiting in the offline queue.
    pub count: usize,

    /// The indicator is hidden when nothing is pending.
    pub visible: bool,

    /// Current connectivity.
    pub online: bool,

    /// Manual sync is only offered while online with something to send.
    pub can_sync_now: bool,

    /// Human-readable status line.
    pub message: String,
}

impl PendingSummary {
    pub fn new(count: usize, online: bool) -> Self {
        let message = match (count, online) {
            (0, _) => "No emergency requests are waiting to be sent.".to_string(),
            (n, true) => format!(
                "You have {} emergency request{} saved offline.",
                n,
                if n > 1 { "s" } else { "" }
            ),
            (n, false) => format!(
                "You have {} emergency request{} saved offline. \
                 Requests will be sent automatically when you're back online.",
                n,
                if n > 1 { "s" } else { "" }
            ),
        };

        Self {
            count,
            visible: count > 0,
            online,
            can_sync_now: online && count > 0,
            message,
        }
    }
}

/// Request body for POST /requests.
///
/// `location` is optional; when the caller already holds a fix it is used
/// as-is and no position is acquired on the agent side.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequestBody {
    #[serde(rename = "type")]
    pub kind: EmergencyType,

    #[serde(default)]
    pub location: Option<Location>,
}

/// Response for GET /requests/pending.
#[derive(Debug, Clone, Serialize)]
pub struct PendingResponse {
    #[serde(flatten)]
    pub summary: PendingSummary,

    /// The queued requests in capture order.
    pub requests: Vec<EmergencyRequest>,
}

/// Request and response body for the connectivity endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConnectivityStatus {
    pub online: bool,
}

/// Query parameters for GET /notifications.
#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    /// Maximum number of notifications to return (default: 20).
    #[serde(default = "default_notification_limit")]
    pub limit: usize,
}

fn default_notification_limit() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let timestamp = DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let request = EmergencyRequest::captured_at(
            EmergencyType::Rescue,
            Some(Location::new(14.6, 121.0, 12.0)),
            DeviceId::new("device-abc"),
            timestamp,
        );

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["type"], "rescue");
        assert_eq!(value["deviceId"], "device-abc");
        assert_eq!(value["timestamp"], "2024-01-15T10:30:00Z");
        assert_eq!(value["location"]["latitude"], 14.6);
        assert!(value["location"].get("altitude").is_none());
    }

    #[test]
    fn test_request_without_location_serializes_null() {
        let request =
            EmergencyRequest::new(EmergencyType::Food, None, DeviceId::new("device-abc"));

        let value = serde_json::to_value(&request).unwrap();

        assert!(value["location"].is_null());
        assert_eq!(value["type"], "food");
    }

    #[test]
    fn test_location_validity() {
        assert!(Location::new(0.0, 0.0, 5.0).is_valid());
        assert!(Location::new(-90.0, 180.0, 0.0).is_valid());
        assert!(!Location::new(91.0, 0.0, 5.0).is_valid());
        assert!(!Location::new(0.0, -181.0, 5.0).is_valid());
        assert!(!Location::new(0.0, 0.0, -1.0).is_valid());
    }

    #[test]
    fn test_pending_summary_hidden_when_empty() {
        let summary = PendingSummary::new(0, true);
        assert!(!summary.visible);
        assert!(!summary.can_sync_now);
    }

    #[test]
    fn test_pending_summary_pluralization() {
        assert_eq!(
            PendingSummary::new(1, true).message,
            "You have 1 emergency request saved offline."
        );
        assert_eq!(
            PendingSummary::new(3, true).message,
            "You have 3 emergency requests saved offline."
        );
    }

    #[test]
    fn test_pending_summary_offline_cannot_sync() {
        let summary = PendingSummary::new(2, false);
        assert!(summary.visible);
        assert!(!summary.can_sync_now);
        assert!(summary.message.contains("back online"));
    }

    #[test]
    fn test_submit_body_location_optional() {
        let body: SubmitRequestBody = serde_json::from_str(r#"{"type":"medical"}"#).unwrap();
        assert_eq!(body.kind, EmergencyType::Medical);
        assert!(body.location.is_none());
    }
}
