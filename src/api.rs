//! Local HTTP API for the one-tap UI.
//!
//! - **POST /requests**: Capture an emergency request. Delivered immediately
//!   when online, saved offline otherwise.
//! - **GET /requests/pending**: Pending-requests indicator plus the queue.
//! - **POST /sync**: Manual "sync now".
//! - **GET/PUT /connectivity**: Read or report the online/offline status.
//! - **GET /notifications**: Recent user-facing notifications.
//! - **GET /health**: Health check.
//!
//! Handlers never log coordinates or device identifiers at `info`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::capture::CaptureOutcome;
use crate::error::{CaptureError, SyncError};
use crate::model::{
    ConnectivityStatus, NotificationsQuery, PendingResponse, PendingSummary, SubmitRequestBody,
};
use crate::service::OfflineSyncService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OfflineSyncService>,
}

/// Build the router with every endpoint and request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/requests", post(post_request))
        .route("/requests/pending", get(get_pending))
        .route("/sync", post(post_sync))
        .route("/connectivity", get(get_connectivity).put(put_connectivity))
        .route("/notifications", get(get_notifications))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// POST /requests - Capture an emergency request.
///
/// # Request Body
///
/// ```json
/// {
///     "type": "rescue",
///     "location": { "latitude": 14.6, "longitude": 121.0, "accuracy": 12.0 }
/// }
/// ```
///
/// `location` is optional. Without it the agent acquires a position itself.
///
/// # Response
///
/// - `202 Accepted` when delivered or saved offline, with the outcome
/// - `422 Unprocessable Entity` when no usable position is available
/// - `502 Bad Gateway` when delivery failed and the request was not kept
#[instrument(skip(state, body), fields(kind))]
pub async fn post_request(
    State(state): State<AppState>,
    Json(body): Json<SubmitRequestBody>,
) -> Response {
    tracing::Span::current().record("kind", body.kind.as_str());

    let result = match body.location {
        Some(location) if !location.is_valid() => {
            warn!("Rejected request with out-of-range coordinates");
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "location is outside the valid coordinate range",
            );
        }
        Some(location) => state.service.submit_reported(body.kind, location).await,
        None => state.service.submit_emergency_request(body.kind).await,
    };

    match result {
        Ok(outcome @ CaptureOutcome::DeliveryFailed) => {
            (StatusCode::BAD_GATEWAY, Json(outcome)).into_response()
        }
        Ok(outcome) => {
            info!(?outcome, "Emergency request captured");
            (StatusCode::ACCEPTED, Json(outcome)).into_response()
        }
        Err(CaptureError::Geolocation(e)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        Err(CaptureError::Storage(e)) => {
            warn!(error = %e, "Failed to store emergency request");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
        }
    }
}

/// GET /requests/pending - Pending-requests indicator and queued requests.
///
/// # Response
///
/// ```json
/// {
///     "count": 2,
///     "visible": true,
///     "online": false,
///     "can_sync_now": false,
///     "message": "You have 2 emergency requests saved offline. ...",
///     "requests": [ ... ]
/// }
/// ```
#[instrument(skip(state))]
pub async fn get_pending(
    State(state): State<AppState>,
) -> Result<Json<PendingResponse>, StatusCode> {
    let requests = state.service.pending_requests().await.map_err(|e| {
        warn!(error = %e, "Failed to read the offline queue");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let online = state.service.connectivity().is_online();
    let summary = PendingSummary::new(requests.len(), online);

    Ok(Json(PendingResponse { summary, requests }))
}

/// POST /sync - Deliver every queued request now.
///
/// # Response
///
/// - `200 OK` with the outcome
/// - `409 Conflict` when offline or nothing is pending
/// - `502 Bad Gateway` when delivery failed; the queue is kept
#[instrument(skip(state))]
pub async fn post_sync(State(state): State<AppState>) -> Response {
    match state.service.sync_now().await {
        Ok(outcome) => {
            info!(?outcome, "Manual sync finished");
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(e @ SyncError::NotPermitted { .. }) => {
            error_response(StatusCode::CONFLICT, e.to_string())
        }
        Err(e @ SyncError::Delivery { .. }) => {
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
        Err(SyncError::Storage(e)) => {
            warn!(error = %e, "Manual sync failed on storage");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
        }
    }
}

/// GET /connectivity - Current online/offline status.
pub async fn get_connectivity(State(state): State<AppState>) -> Json<ConnectivityStatus> {
    Json(ConnectivityStatus {
        online: state.service.connectivity().is_online(),
    })
}

/// PUT /connectivity - Report an online/offline event from the host.
#[instrument(skip(state))]
pub async fn put_connectivity(
    State(state): State<AppState>,
    Json(status): Json<ConnectivityStatus>,
) -> Json<ConnectivityStatus> {
    state.service.connectivity().report(status.online);
    Json(status)
}

/// GET /notifications - Most recent notifications, newest first.
pub async fn get_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> impl IntoResponse {
    Json(state.service.notifications().recent(query.limit))
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::connectivity::Connectivity;
    use crate::geolocation::Unsupported;
    use crate::intake::HttpIntakeClient;
    use crate::service::ServiceConfig;
    use crate::storage::MemoryStore;

    fn app() -> Router {
        let service = OfflineSyncService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(HttpIntakeClient::with_base_url("http://127.0.0.1:9")),
            Arc::new(Unsupported),
            Connectivity::new(false),
            ServiceConfig::default(),
        );
        router(AppState {
            service: Arc::new(service),
        })
    }

    #[tokio::test]
    async fn test_health_oneshot() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unsupported_geolocation_is_unprocessable() {
        let request = Request::post("/requests")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"type":"rescue"}"#))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
