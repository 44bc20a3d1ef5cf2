//! Offline queue synchronization.
//!
//! The synchronizer delivers everything in the offline queue to the intake
//! service as one batch and removes it from the queue on success. On failure
//! the queue is left untouched for the next trigger.
//!
//! # Triggers
//!
//! - **Reconnect**: connectivity goes from offline to online.
//! - **Poll**: a fixed interval elapses. Polling only refreshes the pending
//!   count unless `auto_sync_on_poll` is enabled.
//! - **Manual**: the user asks to sync now. Only allowed while online with
//!   something pending.
//! - **Registration**: a request was just enqueued and asks to be sent as
//!   soon as possible.
//!
//! At most one attempt runs at a time; triggers arriving while an attempt is
//! in flight are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connectivity::Connectivity;
use crate::error::{DeliveryError, SyncError};
use crate::intake::IntakeClient;
use crate::model::EmergencyRequest;
use crate::notify::{Notification, NotificationCenter};
use crate::queue::OfflineQueue;

/// Default interval between pending-count refreshes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default delay before the first retry within one attempt.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Synchronizer tunables.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub poll_interval: Duration,

    /// Whether a poll tick may start a sync on its own.
    pub auto_sync_on_poll: bool,

    /// Delivery attempts per sync, including the first. `1` disables retry.
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            auto_sync_on_poll: false,
            max_attempts: 1,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// What started a sync decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Reconnect,
    Poll,
    Manual,
    Registration,
}

/// Result of the most recent delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LastAttempt {
    #[default]
    None,
    Succeeded,
    Failed,
}

/// What the synchronizer should do in response to a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Deliver the queue now.
    Sync,
    /// Only refresh the displayed pending count.
    RefreshCount,
    /// Nothing to do.
    Wait,
}

/// Decide how to react to `trigger`.
///
/// Registrations are not acted on right after a failed attempt: the intake
/// service was just unreachable, and the next reconnect, manual sync or
/// poll retries instead.
pub fn next_action(
    trigger: Trigger,
    online: bool,
    pending: usize,
    last_attempt: LastAttempt,
    auto_sync_on_poll: bool,
) -> NextAction {
    let can_sync = online && pending > 0;

    match trigger {
        Trigger::Poll if can_sync && auto_sync_on_poll => NextAction::Sync,
        Trigger::Poll => NextAction::RefreshCount,
        Trigger::Registration if last_attempt == LastAttempt::Failed => NextAction::Wait,
        Trigger::Reconnect | Trigger::Manual | Trigger::Registration if can_sync => {
            NextAction::Sync
        }
        Trigger::Reconnect | Trigger::Manual | Trigger::Registration => NextAction::Wait,
    }
}

/// Outcome of a sync attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Another attempt was already in flight.
    Skipped,
    /// Nothing was pending.
    Empty,
    /// The batch was delivered and removed from the queue.
    Delivered { delivered: usize, remaining: usize },
}

/// Drains the offline queue to the intake service.
pub struct Synchronizer {
    queue: Arc<OfflineQueue>,
    intake: Arc<dyn IntakeClient>,
    connectivity: Connectivity,
    notifications: NotificationCenter,
    config: SyncConfig,
    syncing: AtomicBool,
    pending: AtomicUsize,
    last_attempt: Mutex<LastAttempt>,
}

/// Clears the in-flight flag when an attempt ends, however it ends.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Synchronizer {
    pub fn new(
        queue: Arc<OfflineQueue>,
        intake: Arc<dyn IntakeClient>,
        connectivity: Connectivity,
        notifications: NotificationCenter,
        config: SyncConfig,
    ) -> Self {
        Self {
            queue,
            intake,
            connectivity,
            notifications,
            config,
            syncing: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            last_attempt: Mutex::new(LastAttempt::None),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn last_attempt(&self) -> LastAttempt {
        *self.last_attempt.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pending count as of the last refresh.
    pub fn cached_pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Re-read the queue length and cache it for the pending indicator.
    pub async fn refresh_pending(&self) -> Result<usize, SyncError> {
        let count = self.queue.count().await?;
        self.pending.store(count, Ordering::Relaxed);
        Ok(count)
    }

    /// User-initiated sync. Refused unless online with something pending.
    pub async fn sync_now(&self) -> Result<SyncOutcome, SyncError> {
        let online = self.connectivity.is_online();
        let pending = self.refresh_pending().await?;

        if next_action(Trigger::Manual, online, pending, self.last_attempt(), false)
            != NextAction::Sync
        {
            debug!(online, pending, "Manual sync refused");
            return Err(SyncError::NotPermitted { online, pending });
        }

        self.sync().await
    }

    /// Deliver the whole queue as one batch.
    ///
    /// Returns [`SyncOutcome::Skipped`] if another attempt is in flight. On
    /// failure the queue is left exactly as it was.
    pub async fn sync(&self) -> Result<SyncOutcome, SyncError> {
        self.sync_until(None).await
    }

    /// Like [`sync`](Self::sync), but retry backoff is cut short once
    /// `shutdown` flips to `true`. The attempt then counts as failed.
    async fn sync_until(
        &self,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<SyncOutcome, SyncError> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress; trigger coalesced");
            return Ok(SyncOutcome::Skipped);
        }
        let _guard = SyncingGuard(&self.syncing);

        let requests = self.queue.list().await?;
        if requests.is_empty() {
            self.pending.store(0, Ordering::Relaxed);
            return Ok(SyncOutcome::Empty);
        }

        let batch = requests.len();
        self.notifications.publish(Notification::info(
            "Syncing offline requests",
            format!("{batch} offline request(s) are being sent."),
        ));

        match self.deliver_with_retry(&requests, shutdown).await {
            Ok(attempts) => {
                let remaining = self.queue.drain_delivered(batch).await?;
                self.pending.store(remaining, Ordering::Relaxed);
                self.set_last_attempt(LastAttempt::Succeeded);

                info!(delivered = batch, remaining, attempts, "Offline requests synced");
                self.notifications.publish(Notification::info(
                    "Offline requests synced",
                    "All your emergency requests have been sent successfully.",
                ));

                Ok(SyncOutcome::Delivered {
                    delivered: batch,
                    remaining,
                })
            }
            Err((attempts, source)) => {
                // Requests may have been enqueued while the attempt was out.
                let pending = self.queue.count().await.unwrap_or(batch);
                self.pending.store(pending, Ordering::Relaxed);
                self.set_last_attempt(LastAttempt::Failed);

                warn!(pending, attempts, error = %source, "Offline sync failed");
                self.notifications.publish(Notification::info(
                    "Sync failed",
                    "Your requests are still saved and will be sent on the next attempt.",
                ));

                Err(SyncError::Delivery { attempts, source })
            }
        }
    }

    /// Run one batch delivery with bounded exponential backoff. Returns the
    /// number of attempts used.
    async fn deliver_with_retry(
        &self,
        requests: &[EmergencyRequest],
        mut shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<u32, (u32, DeliveryError)> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 1;

        loop {
            match self.intake.submit_batch(requests).await {
                Ok(()) => return Ok(attempt),
                Err(e) if attempt >= max_attempts => return Err((attempt, e)),
                Err(e) => {
                    debug!(attempt, error = %e, ?backoff, "Batch delivery failed; retrying");
                    let stopped = match shutdown.as_mut() {
                        Some(rx) => tokio::select! {
                            _ = tokio::time::sleep(backoff) => false,
                            _ = rx.wait_for(|stop| *stop) => true,
                        },
                        None => {
                            tokio::time::sleep(backoff).await;
                            false
                        }
                    };
                    if stopped {
                        info!(attempt, "Shutdown during retry backoff; queue kept");
                        return Err((attempt, e));
                    }
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }

    fn set_last_attempt(&self, outcome: LastAttempt) {
        *self.last_attempt.lock().unwrap_or_else(|e| e.into_inner()) = outcome;
    }

    /// React to one trigger according to [`next_action`].
    pub async fn handle(&self, trigger: Trigger) {
        self.handle_until(trigger, None).await
    }

    async fn handle_until(&self, trigger: Trigger, shutdown: Option<watch::Receiver<bool>>) {
        let pending = match self.refresh_pending().await {
            Ok(count) => count,
            Err(e) => {
                warn!(?trigger, error = %e, "Failed to read the offline queue");
                return;
            }
        };

        let action = next_action(
            trigger,
            self.connectivity.is_online(),
            pending,
            self.last_attempt(),
            self.config.auto_sync_on_poll,
        );
        debug!(?trigger, pending, ?action, "Sync trigger handled");

        if action == NextAction::Sync {
            // Failures are already logged and surfaced as notifications.
            let _ = self.sync_until(shutdown).await;
        }
    }

    /// Drive the synchronizer until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut connectivity = self.connectivity.subscribe();
        let registration = self.queue.sync_registration();
        let mut was_online = *connectivity.borrow_and_update();

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            poll_interval = ?self.config.poll_interval,
            auto_sync_on_poll = self.config.auto_sync_on_poll,
            max_attempts = self.config.max_attempts,
            "Synchronizer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.handle_until(Trigger::Poll, Some(shutdown.clone())).await
                }
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let online = *connectivity.borrow_and_update();
                    if online && !was_online {
                        self.handle_until(Trigger::Reconnect, Some(shutdown.clone())).await;
                    }
                    was_online = online;
                }
                _ = registration.notified() => {
                    self.handle_until(Trigger::Registration, Some(shutdown.clone())).await
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Synchronizer stopping");
                        return;
                    }
                }
            }
        }
    }
}
