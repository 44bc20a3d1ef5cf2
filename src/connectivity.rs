//! Connectivity status and change notifications.
//!
//! The online/offline signal is an external input. The host reports it
//! through [`Connectivity::report`] (the HTTP API exposes this), and the
//! agent additionally derives it by probing the intake service with
//! [`run_probe`]. A host report wins over the probe for
//! [`HOST_REPORT_HOLD`]; after that the probe takes over again. Consumers
//! either poll [`Connectivity::is_online`] or subscribe to transitions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::intake::IntakeClient;

/// How long a host report suppresses probe results.
pub const HOST_REPORT_HOLD: Duration = Duration::from_secs(120);

/// Shared online/offline state.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
    reported_at: Arc<Mutex<Option<Instant>>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self {
            tx: Arc::new(tx),
            reported_at: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the current status. Subscribers are only woken when the
    /// status actually changes.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(online, "Connectivity changed");
        }
    }

    /// Record a status reported by the host runtime. Probe results are
    /// ignored for [`HOST_REPORT_HOLD`] afterwards.
    pub fn report(&self, online: bool) {
        *self.reported_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.set_online(online);
    }

    /// Whether the host reported a status within the last `window`.
    pub fn reported_within(&self, window: Duration) -> bool {
        self.reported_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some_and(|at| at.elapsed() < window)
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Call `handler` with the new status on every transition.
    ///
    /// The returned task ends when the handle is aborted.
    pub fn on_change<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(bool) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                handler(online);
            }
        })
    }
}

/// Periodically probe the intake service and publish reachability as the
/// connectivity status, unless the host reported a status recently. Runs
/// until `shutdown` flips to `true`.
pub async fn run_probe(
    connectivity: Connectivity,
    intake: Arc<dyn IntakeClient>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reachable = intake.is_reachable().await;
                if connectivity.reported_within(HOST_REPORT_HOLD) {
                    debug!(reachable, "Intake service probed; host report still holds");
                } else {
                    debug!(reachable, "Intake service probed");
                    connectivity.set_online(reachable);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Connectivity probe stopping");
                    return;
                }
            }
        }
    }
}
