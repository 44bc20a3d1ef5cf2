//! Per-device pseudo-identifier.
//!
//! The identifier is generated lazily on first use, persisted under
//! [`DEVICE_ID_KEY`] and never changed afterwards. It lets the intake
//! service attribute and deduplicate requests without user accounts.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::DeviceId;
use crate::storage::KeyValueStore;

/// Storage key holding the device identifier.
pub const DEVICE_ID_KEY: &str = "emergency-device-id";

const DEVICE_ID_PREFIX: &str = "device-";
const DEVICE_ID_SUFFIX_LEN: usize = 13;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Resolves the persisted device identifier, creating it on first use.
pub struct DeviceIdentity {
    store: Arc<dyn KeyValueStore>,
    cached: Mutex<Option<DeviceId>>,
}

impl DeviceIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    /// Return the device identifier, generating and persisting one if the
    /// store has none yet.
    pub async fn resolve(&self) -> Result<DeviceId, StorageError> {
        let mut cached = self.cached.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match self.store.read(DEVICE_ID_KEY).await? {
            Some(existing) => DeviceId::new(existing),
            None => {
                let generated = generate_device_id();
                self.store.write(DEVICE_ID_KEY, generated.as_str()).await?;
                info!("Generated new device identifier");
                generated
            }
        };

        *cached = Some(id.clone());
        Ok(id)
    }
}

/// Build a fresh `device-` identifier with a random base-36 suffix.
fn generate_device_id() -> DeviceId {
    let mut entropy = Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(DEVICE_ID_SUFFIX_LEN);

    for _ in 0..DEVICE_ID_SUFFIX_LEN {
        suffix.push(BASE36[(entropy % 36) as usize] as char);
        entropy /= 36;
    }

    DeviceId::new(format!("{DEVICE_ID_PREFIX}{suffix}"))
}
