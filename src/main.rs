//! Reliefline agent.
//!
//! Runs next to the one-tap UI on a field device. Requests are delivered to
//! the intake service while it is reachable and queued locally while it is
//! not; the queue drains automatically on reconnect.
//!
//! # API Endpoints
//!
//! - `POST /requests` - Capture an emergency request
//! - `GET /requests/pending` - Pending-requests indicator
//! - `POST /sync` - Sync now
//! - `GET /connectivity`, `PUT /connectivity` - Online/offline status
//! - `GET /notifications` - Recent notifications
//! - `GET /health` - Health check

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use reliefline::api::{AppState, router};
use reliefline::config::AppConfig;
use reliefline::connectivity::{Connectivity, run_probe};
use reliefline::geolocation::{FixedPosition, GeolocationProvider, Unsupported};
use reliefline::intake::{HttpIntakeClient, IntakeClient};
use reliefline::service::OfflineSyncService;
use reliefline::storage::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default level is INFO; coordinates and device ids only appear at DEBUG
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("reliefline=info".parse()?))
        .init();

    let config = AppConfig::load()?;

    info!(
        port = config.port,
        db_url = %config.database_url,
        intake_url = %config.intake_url,
        "Starting Reliefline agent"
    );

    let store = SqliteStore::new(&config.database_url).await?;
    info!("Database initialized");

    let intake: Arc<dyn IntakeClient> = Arc::new(HttpIntakeClient::with_base_url(&config.intake_url));

    let geolocation: Arc<dyn GeolocationProvider> = match config.fixed_position {
        Some(location) => Arc::new(FixedPosition::new(location)),
        None => {
            info!("No fixed position configured; geolocation is unavailable");
            Arc::new(Unsupported)
        }
    };

    // Start from the real reachability so a reconnect is not reported for
    // an intake service that was up all along.
    let connectivity = Connectivity::new(intake.is_reachable().await);

    let service = Arc::new(OfflineSyncService::new(
        Arc::new(store),
        Arc::clone(&intake),
        geolocation,
        connectivity.clone(),
        config.service_config(),
    ));

    let pending = service.pending_summary().await?;
    info!(
        pending = pending.count,
        online = pending.online,
        "Offline queue loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let synchronizer = service.spawn_synchronizer(shutdown_rx.clone());
    let probe = tokio::spawn(run_probe(
        connectivity,
        intake,
        config.probe_interval,
        shutdown_rx,
    ));

    let app = router(AppState { service });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Reliefline is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    shutdown_tx.send(true)?;
    synchronizer.await?;
    probe.await?;

    Ok(())
}
