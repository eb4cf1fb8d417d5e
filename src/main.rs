//! # Geotrack
//!
//! Demo binary for the live position tracking core.
//!
//! Wires a replayed GPS route through the full pipeline: position
//! tracker with send suppression, realtime line channel with
//! autonomous reconnection, file-backed identity, and a notification
//! log for tracking-state transitions.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Set up logging with tracing subscriber
//!    - Load configuration (first CLI argument, default
//!      `config/default.toml`, built-in defaults when absent)
//!    - Open the file-backed key-value store and the user identity
//!    - Start the delivery channel worker and the replay source
//!
//! 2. **Main Loop**
//!    - Observe every `current_position` update, driving the marker
//!      reconciler the way a map view would
//!    - Log a status line every 30 seconds
//!    - Handle Ctrl+C for graceful shutdown
//!
//! 3. **Graceful Shutdown**
//!    - Stop continuous tracking
//!    - Disconnect the channel
//!    - Log total delivered position updates

use anyhow::Result;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use geotrack::channel::line::LineChannel;
use geotrack::channel::{DeliveryChannel, POSITION_UPDATE_EVENT};
use geotrack::config::Config;
use geotrack::geo::compass_direction;
use geotrack::identity::UserIdentity;
use geotrack::location::replay::ReplayLocationSource;
use geotrack::marker::MarkerReconciler;
use geotrack::notify::{NotificationLog, Severity};
use geotrack::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use geotrack::tracker::PositionTracker;

/// Seconds between status log lines
const STATUS_INTERVAL_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("geotrack v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config = Config::load_or_default(&config_path)?;

    let store: Arc<dyn KeyValueStore> = match JsonFileStore::open(&config.storage.path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("could not open store at {}, using in-memory store: {}", config.storage.path, e);
            Arc::new(MemoryStore::new())
        }
    };

    let identity = Arc::new(UserIdentity::new(store.clone()));
    info!("local user id: {}", identity.user_id());

    let notifications = NotificationLog::new(store);
    let channel = Arc::new(LineChannel::connect(&config.channel, identity.clone()));
    let source = Arc::new(ReplayLocationSource::new(&config.replay));

    let tracker = PositionTracker::new(
        source,
        channel.clone(),
        identity,
        config.tracking.clone(),
    );
    let resync_listener = tracker.spawn_resync_on_connect();
    tracker.start_continuous_tracking();

    let mut positions = tracker.current_position();
    let mut peer_events = channel.subscribe_inbound();
    let mut markers = MarkerReconciler::new();
    let mut had_fix = false;
    let mut previous_fix = None;
    let mut status_ticker = interval(Duration::from_secs(STATUS_INTERVAL_SECS));

    info!("replaying {} route points, press Ctrl+C to exit", config.replay.route.len());

    loop {
        tokio::select! {
            changed = positions.changed() => {
                if changed.is_err() {
                    break;
                }
                let update = *positions.borrow_and_update();
                markers.apply_gps_update(update.as_ref());

                match update {
                    Some(sample) => {
                        if !had_fix {
                            notifications.push("GPS fix acquired", Severity::Success);
                        }
                        had_fix = true;
                        let heading = previous_fix
                            .map(|last| compass_direction(last, sample.coordinate()))
                            .unwrap_or("-");
                        previous_fix = Some(sample.coordinate());
                        debug!(
                            "fix at {:.5}, {:.5} ({:.1} m accuracy, heading {})",
                            sample.lat, sample.lng, sample.accuracy_m, heading
                        );
                    }
                    None => {
                        if had_fix {
                            notifications.push("GPS fix lost", Severity::Warning);
                        }
                        had_fix = false;
                    }
                }
            }

            peer = peer_events.recv() => {
                if let Ok(envelope) = peer {
                    if envelope.event == POSITION_UPDATE_EVENT {
                        debug!(
                            "peer {} moved to {}, {}",
                            envelope.data["userId"], envelope.data["lat"], envelope.data["lng"]
                        );
                    }
                }
            }

            _ = status_ticker.tick() => {
                info!(
                    "delivered {} position updates, channel connected: {}, unread notifications: {}",
                    tracker.delivered_count(),
                    channel.is_connected(),
                    notifications.unread_count()
                );
            }

            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    tracker.stop_continuous_tracking();
    resync_listener.abort();
    channel.disconnect();
    info!("delivered {} position updates in total", tracker.delivered_count());

    Ok(())
}
