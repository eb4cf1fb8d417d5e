//! # Replay Location Source
//!
//! A [`LocationSource`] that replays a scripted route at a fixed
//! cadence. Used by the demo binary in place of positioning hardware
//! and by integration-style tests that need a deterministic stream.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::{LocationError, LocationSource, PositionSample, SampleOptions, WatchSubscription};
use crate::config::ReplayConfig;
use crate::geo::{bearing_degrees, distance_meters, Coordinate};

/// Accuracy radius reported for replayed fixes, in meters
const REPLAY_ACCURACY_M: f64 = 5.0;

/// Location source that walks a configured route in a loop.
///
/// One-shot requests return the point the continuous walk currently
/// stands at, so one-shot and continuous views of the "device" agree.
pub struct ReplayLocationSource {
    route: Vec<Coordinate>,
    interval: Duration,
    cursor: Arc<AtomicUsize>,
}

impl ReplayLocationSource {
    /// Build a source from the replay section of the configuration.
    pub fn new(config: &ReplayConfig) -> Self {
        let route = config
            .route
            .iter()
            .map(|&[lat, lng]| Coordinate::new(lat, lng))
            .collect();
        Self::from_route(route, Duration::from_millis(config.interval_ms))
    }

    /// Build a source from an explicit route and cadence.
    pub fn from_route(route: Vec<Coordinate>, interval: Duration) -> Self {
        Self {
            route,
            interval,
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The sample for a given step index, with speed and heading derived
    /// from the leg to the next route point.
    fn sample_at(&self, index: usize) -> PositionSample {
        let here = self.route[index % self.route.len()];
        let next = self.route[(index + 1) % self.route.len()];

        let leg_meters = distance_meters(here, next);
        let mut sample = PositionSample::new(here.lat, here.lng, REPLAY_ACCURACY_M);
        if leg_meters > 0.0 {
            sample.heading_deg = Some(bearing_degrees(here, next));
            let secs = self.interval.as_secs_f64();
            if secs > 0.0 {
                sample.speed_mps = Some(leg_meters / secs);
            }
        }
        sample
    }
}

#[async_trait]
impl LocationSource for ReplayLocationSource {
    async fn get_once(&self, _options: &SampleOptions) -> Result<PositionSample, LocationError> {
        if self.route.is_empty() {
            return Err(LocationError::position_unavailable("no replay route configured"));
        }
        Ok(self.sample_at(self.cursor.load(Ordering::SeqCst)))
    }

    fn watch(&self, _options: &SampleOptions) -> Result<WatchSubscription, LocationError> {
        if self.route.is_empty() {
            return Err(LocationError::position_unavailable("no replay route configured"));
        }

        let (tx, rx) = mpsc::channel(16);
        let route_len = self.route.len();
        let interval = self.interval;
        let cursor = Arc::clone(&self.cursor);
        let samples: Vec<PositionSample> = (0..route_len).map(|i| self.sample_at(i)).collect();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let index = cursor.load(Ordering::SeqCst);
                let mut sample = samples[index % route_len];
                sample.captured_at = chrono::Utc::now().timestamp_millis();

                if tx.send(Ok(sample)).await.is_err() {
                    debug!("replay watch subscription canceled after {} steps", index);
                    break;
                }
                cursor.fetch_add(1, Ordering::SeqCst);
            }
        });

        Ok(WatchSubscription::new(rx))
    }
}
