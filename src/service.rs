//! The offline sync service.
//!
//! Owns the offline queue, the device identity, request capture and the
//! synchronizer, all wired to the same injected ports. This is the only
//! writer of the persisted queue and device id; everything else reads
//! derived summaries through it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::capture::{CaptureOutcome, CapturePolicy, RequestCapture};
use crate::connectivity::Connectivity;
use crate::device::DeviceIdentity;
use crate::error::{CaptureError, StorageError, SyncError};
use crate::geolocation::GeolocationProvider;
use crate::intake::IntakeClient;
use crate::model::{DeviceId, EmergencyRequest, EmergencyType, Location, PendingSummary};
use crate::notify::{DEFAULT_FEED_CAPACITY, NotificationCenter};
use crate::queue::OfflineQueue;
use crate::storage::KeyValueStore;
use crate::sync::{SyncConfig, SyncOutcome, Synchronizer};

/// Settings for [`OfflineSyncService`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub capture: CapturePolicy,
    pub sync: SyncConfig,
    pub notification_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            capture: CapturePolicy::default(),
            sync: SyncConfig::default(),
            notification_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

/// Request capture plus offline queue synchronization behind one handle.
pub struct OfflineSyncService {
    queue: Arc<OfflineQueue>,
    identity: Arc<DeviceIdentity>,
    capture: RequestCapture,
    synchronizer: Arc<Synchronizer>,
    connectivity: Connectivity,
    notifications: NotificationCenter,
}

impl OfflineSyncService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        intake: Arc<dyn IntakeClient>,
        geolocation: Arc<dyn GeolocationProvider>,
        connectivity: Connectivity,
        config: ServiceConfig,
    ) -> Self {
        let queue = Arc::new(OfflineQueue::new(Arc::clone(&store)));
        let identity = Arc::new(DeviceIdentity::new(store));
        let notifications = NotificationCenter::new(config.notification_capacity);

        let capture = RequestCapture::new(
            Arc::clone(&queue),
            Arc::clone(&identity),
            Arc::clone(&intake),
            geolocation,
            connectivity.clone(),
            notifications.clone(),
            config.capture,
        );

        let synchronizer = Arc::new(Synchronizer::new(
            Arc::clone(&queue),
            intake,
            connectivity.clone(),
            notifications.clone(),
            config.sync,
        ));

        Self {
            queue,
            identity,
            capture,
            synchronizer,
            connectivity,
            notifications,
        }
    }

    /// Start the synchronizer's trigger loop.
    pub fn spawn_synchronizer(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.synchronizer).run(shutdown))
    }

    pub async fn submit_emergency_request(
        &self,
        kind: EmergencyType,
    ) -> Result<CaptureOutcome, CaptureError> {
        self.capture.submit_emergency_request(kind).await
    }

    pub async fn submit_reported(
        &self,
        kind: EmergencyType,
        location: Location,
    ) -> Result<CaptureOutcome, CaptureError> {
        self.capture.submit_reported(kind, location).await
    }

    pub async fn sync_now(&self) -> Result<SyncOutcome, SyncError> {
        self.synchronizer.sync_now().await
    }

    /// Current state of the pending-requests indicator.
    pub async fn pending_summary(&self) -> Result<PendingSummary, StorageError> {
        let count = self.queue.count().await?;
        Ok(PendingSummary::new(count, self.connectivity.is_online()))
    }

    /// Queued requests in capture order.
    pub async fn pending_requests(&self) -> Result<Vec<EmergencyRequest>, StorageError> {
        self.queue.list().await
    }

    pub async fn device_id(&self) -> Result<DeviceId, StorageError> {
        self.identity.resolve().await
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::DeliveryError;
    use crate::geolocation::FixedPosition;
    use crate::storage::MemoryStore;

    /// Intake whose availability can be flipped mid-test.
    struct Switchable {
        up: AtomicBool,
    }

    #[async_trait]
    impl IntakeClient for Switchable {
        async fn submit(&self, _request: &EmergencyRequest) -> Result<(), DeliveryError> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DeliveryError::Unavailable("down".into()))
            }
        }

        async fn submit_batch(&self, _requests: &[EmergencyRequest]) -> Result<(), DeliveryError> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DeliveryError::Unavailable("down".into()))
            }
        }

        async fn is_reachable(&self) -> bool {
            self.up.load(Ordering::SeqCst)
        }
    }

    fn service(online: bool, intake_up: bool) -> OfflineSyncService {
        OfflineSyncService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Switchable {
                up: AtomicBool::new(intake_up),
            }),
            Arc::new(FixedPosition::new(Location::new(0.5, 0.5, 20.0))),
            Connectivity::new(online),
            ServiceConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_rescue_then_reconnect_drains_queue() {
        let service = service(false, true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = service.spawn_synchronizer(shutdown_rx);

        service
            .submit_emergency_request(EmergencyType::Rescue)
            .await
            .unwrap();

        let pending = service.pending_requests().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind(), EmergencyType::Rescue);

        service.connectivity().set_online(true);
        for _ in 0..100 {
            if service.pending_summary().await.unwrap().count == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(service.pending_summary().await.unwrap().count, 0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_food_twice_then_manual_sync_refused() {
        let service = service(false, true);

        service
            .submit_emergency_request(EmergencyType::Food)
            .await
            .unwrap();
        service
            .submit_emergency_request(EmergencyType::Food)
            .await
            .unwrap();

        let summary = service.pending_summary().await.unwrap();
        assert_eq!(summary.count, 2);
        assert!(summary.visible);
        assert!(!summary.can_sync_now);

        let pending = service.pending_requests().await.unwrap();
        assert!(pending[0].timestamp() <= pending[1].timestamp());

        assert!(matches!(
            service.sync_now().await,
            Err(SyncError::NotPermitted { .. })
        ));
        assert_eq!(service.pending_summary().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_online_medical_leaves_queue_empty() {
        let service = service(true, true);

        let outcome = service
            .submit_emergency_request(EmergencyType::Medical)
            .await
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Delivered);
        assert_eq!(service.pending_summary().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_device_id_is_stable() {
        let service = service(true, true);

        let first = service.device_id().await.unwrap();
        let second = service.device_id().await.unwrap();

        assert_eq!(first, second);
    }
}
