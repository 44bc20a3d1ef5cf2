//! The offline emergency-request queue.
//!
//! An append-only, durable holding area for requests that could not be
//! delivered when they were captured. The whole queue is stored as one JSON
//! array under [`QUEUE_KEY`]; insertion order is capture order.
//!
//! Every read-modify-write happens under a mutex so concurrent captures and
//! sync attempts on a multi-threaded runtime never lose an update.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::model::EmergencyRequest;
use crate::storage::KeyValueStore;

/// Storage key holding the serialized queue.
pub const QUEUE_KEY: &str = "offline-emergency-requests";

/// Durable, ordered queue of undelivered requests.
pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
    sync_registration: Arc<Notify>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
            sync_registration: Arc::new(Notify::new()),
        }
    }

    /// Signal raised on every enqueue, asking the synchronizer to deliver
    /// as soon as it can.
    pub fn sync_registration(&self) -> Arc<Notify> {
        Arc::clone(&self.sync_registration)
    }

    /// Append a request to the end of the queue.
    ///
    /// Returns the number of pending requests after the append.
    pub async fn enqueue(&self, request: EmergencyRequest) -> Result<usize, StorageError> {
        let count = {
            let _guard = self.write_lock.lock().await;

            let mut requests = self.load().await?;
            requests.push(request);
            self.save(&requests).await?;
            requests.len()
        };

        debug!(pending = count, "Request enqueued for later delivery");
        self.sync_registration.notify_one();

        Ok(count)
    }

    /// Return the full queue in capture order without modifying it.
    pub async fn list(&self) -> Result<Vec<EmergencyRequest>, StorageError> {
        let _guard = self.write_lock.lock().await;
        self.load().await
    }

    /// Number of pending requests.
    pub async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.list().await?.len())
    }

    /// Remove every pending request. Clearing an empty queue is a no-op.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(QUEUE_KEY).await
    }

    /// Remove the first `delivered` requests, keeping anything enqueued
    /// after the delivered batch was read.
    ///
    /// Returns the number of requests still pending.
    pub async fn drain_delivered(&self, delivered: usize) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut requests = self.load().await?;
        if delivered >= requests.len() {
            self.store.remove(QUEUE_KEY).await?;
            return Ok(0);
        }

        requests.drain(..delivered);
        self.save(&requests).await?;
        Ok(requests.len())
    }

    async fn load(&self) -> Result<Vec<EmergencyRequest>, StorageError> {
        let Some(raw) = self.store.read(QUEUE_KEY).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(requests) => Ok(requests),
            Err(e) => {
                // Unreadable contents are treated as an empty queue and get
                // replaced on the next write.
                warn!(error = %e, "Offline queue is unreadable; treating it as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, requests: &[EmergencyRequest]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(requests)?;
        self.store.write(QUEUE_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{DeviceId, EmergencyType, Location};
    use crate::storage::{MemoryStore, SqliteStore};

    fn request(kind: EmergencyType) -> EmergencyRequest {
        EmergencyRequest::new(
            kind,
            Some(Location::new(10.0, 20.0, 5.0)),
            DeviceId::new("device-test"),
        )
    }

    fn memory_queue() -> OfflineQueue {
        OfflineQueue::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_list_preserves_enqueue_order() {
        let queue = memory_queue();
        let kinds = [
            EmergencyType::Medical,
            EmergencyType::Rescue,
            EmergencyType::Food,
            EmergencyType::Rescue,
        ];

        for kind in kinds {
            queue.enqueue(request(kind)).await.unwrap();
        }

        let listed: Vec<_> = queue.list().await.unwrap().iter().map(|r| r.kind()).collect();
        assert_eq!(listed, kinds);
    }

    #[tokio::test]
    async fn test_enqueue_returns_new_count() {
        let queue = memory_queue();

        assert_eq!(queue.enqueue(request(EmergencyType::Food)).await.unwrap(), 1);
        assert_eq!(queue.enqueue(request(EmergencyType::Food)).await.unwrap(), 2);
        assert_eq!(queue.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let queue = memory_queue();

        assert_eq!(queue.count().await.unwrap(), 0);
        queue.clear().await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 0);

        queue.enqueue(request(EmergencyType::Rescue)).await.unwrap();
        queue.clear().await.unwrap();
        queue.clear().await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_does_not_mutate() {
        let queue = memory_queue();
        queue.enqueue(request(EmergencyType::Rescue)).await.unwrap();

        let first = queue.list().await.unwrap();
        let second = queue.list().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_drain_delivered_keeps_later_requests() {
        let queue = memory_queue();
        queue.enqueue(request(EmergencyType::Rescue)).await.unwrap();
        queue.enqueue(request(EmergencyType::Food)).await.unwrap();
        let late = request(EmergencyType::Medical);
        queue.enqueue(late.clone()).await.unwrap();

        let remaining = queue.drain_delivered(2).await.unwrap();

        assert_eq!(remaining, 1);
        assert_eq!(queue.list().await.unwrap(), vec![late]);
    }

    #[tokio::test]
    async fn test_drain_everything_empties_queue() {
        let queue = memory_queue();
        queue.enqueue(request(EmergencyType::Rescue)).await.unwrap();

        assert_eq!(queue.drain_delivered(1).await.unwrap(), 0);
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_queue_is_treated_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store.write(QUEUE_KEY, "{not json").await.unwrap();
        let queue = OfflineQueue::new(store);

        assert_eq!(queue.count().await.unwrap(), 0);

        queue.enqueue(request(EmergencyType::Food)).await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());

        let queue = OfflineQueue::new(Arc::clone(&store));
        queue.enqueue(request(EmergencyType::Rescue)).await.unwrap();
        drop(queue);

        let reopened = OfflineQueue::new(store);
        let requests = reopened.list().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind(), EmergencyType::Rescue);
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_are_not_lost() {
        let queue = Arc::new(memory_queue());

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    queue.enqueue(request(EmergencyType::Food)).await.unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.count().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_enqueue_registers_background_sync() {
        let queue = memory_queue();
        let registration = queue.sync_registration();

        queue.enqueue(request(EmergencyType::Rescue)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), registration.notified())
            .await
            .expect("enqueue should wake the synchronizer");
    }
}
