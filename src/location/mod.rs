//! # Location Source Abstraction
//!
//! Device-location sampling behind a trait, so the tracker can run
//! against real positioning hardware, a scripted replay, or a mock.
//!
//! This module handles:
//! - The immutable [`PositionSample`] produced on each successful fix
//! - The stable failure taxonomy ([`LocationErrorKind`])
//! - Per-attempt sampling options (accuracy, age, timeout)
//! - Continuous watching via an explicit cancelable subscription

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::geo::Coordinate;

pub mod replay;

/// One GPS observation.
///
/// Samples are immutable once created; the tracker holds the latest one
/// as "current position" until it is superseded or sampling fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    /// Latitude in degrees, always within `[-90, 90]`
    pub lat: f64,
    /// Longitude in degrees, always within `[-180, 180]`
    pub lng: f64,
    /// Estimated accuracy radius in meters
    pub accuracy_m: f64,
    /// Ground speed in meters per second, if the source knows it
    pub speed_mps: Option<f64>,
    /// Heading in degrees clockwise from north, if the source knows it
    pub heading_deg: Option<f64>,
    /// Capture time as epoch milliseconds
    pub captured_at: i64,
}

impl PositionSample {
    /// Create a sample at the given coordinates, captured now, with no
    /// speed or heading information.
    pub fn new(lat: f64, lng: f64, accuracy_m: f64) -> Self {
        Self {
            lat,
            lng,
            accuracy_m,
            speed_mps: None,
            heading_deg: None,
            captured_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// The sample's coordinate pair.
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }

    /// Ground speed, with unknown reported as 0 (the wire convention).
    pub fn speed_or_zero(&self) -> f64 {
        self.speed_mps.unwrap_or(0.0)
    }
}

/// Stable failure taxonomy for location sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationErrorKind {
    /// The user must grant location access; fatal to this session's
    /// tracking until permission changes
    PermissionDenied,
    /// Transient hardware/environment condition
    PositionUnavailable,
    /// The fix attempt exceeded its configured time bound
    Timeout,
}

impl fmt::Display for LocationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocationErrorKind::PermissionDenied => "permission-denied",
            LocationErrorKind::PositionUnavailable => "position-unavailable",
            LocationErrorKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// A sampling failure: a stable kind plus human-readable detail.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {message}")]
pub struct LocationError {
    kind: LocationErrorKind,
    message: String,
}

impl LocationError {
    /// The user denied (or must grant) location access.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self {
            kind: LocationErrorKind::PermissionDenied,
            message: message.into(),
        }
    }

    /// The position could not be determined right now.
    pub fn position_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: LocationErrorKind::PositionUnavailable,
            message: message.into(),
        }
    }

    /// The fix attempt timed out.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: LocationErrorKind::Timeout,
            message: message.into(),
        }
    }

    /// The stable failure kind.
    pub fn kind(&self) -> LocationErrorKind {
        self.kind
    }
}

/// Options for a single fix attempt.
///
/// Both one-shot and continuous sampling bound each attempt with
/// `timeout`; exceeding it yields a [`LocationErrorKind::Timeout`]
/// failure and is never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOptions {
    /// Request the most accurate fix the hardware can produce
    pub high_accuracy: bool,
    /// Maximum acceptable age of a cached fix
    pub maximum_age: Duration,
    /// Upper bound for one fix attempt
    pub timeout: Duration,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

/// One event on a continuous watch stream: a fix or a typed failure.
pub type WatchEvent = Result<PositionSample, LocationError>;

/// An active continuous-sampling subscription.
///
/// Events arrive in the order the source produced them. Cancellation is
/// explicit via [`WatchSubscription::cancel`]; dropping the subscription
/// cancels it as well.
#[derive(Debug)]
pub struct WatchSubscription {
    events: mpsc::Receiver<WatchEvent>,
}

impl WatchSubscription {
    /// Wrap a receiver of watch events produced by a location source.
    pub fn new(events: mpsc::Receiver<WatchEvent>) -> Self {
        Self { events }
    }

    /// Wait for the next event. Returns `None` once the subscription is
    /// canceled and all buffered events have been drained, or when the
    /// source stops producing.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Cancel the subscription. The source observes the closed channel
    /// and stops sampling; already-buffered events can still be drained.
    pub fn cancel(&mut self) {
        self.events.close();
    }
}

/// A device location capability.
///
/// `get_once` requests a single fresh sample. `watch` starts continuous
/// sampling and returns the subscription carrying every subsequent fix
/// and failure; it reports [`LocationErrorKind::PositionUnavailable`]
/// when the capability is absent.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Request one fresh position sample.
    async fn get_once(&self, options: &SampleOptions) -> Result<PositionSample, LocationError>;

    /// Begin continuous sampling.
    fn watch(&self, options: &SampleOptions) -> Result<WatchSubscription, LocationError>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scriptable location source for testing the tracker.
    ///
    /// Watch events are fed through the sender returned by `new`;
    /// one-shot results are queued with `push_one_shot`.
    pub struct MockLocationSource {
        watch_feed: Mutex<Option<mpsc::Receiver<WatchEvent>>>,
        watch_error: Mutex<Option<LocationError>>,
        one_shot_results: Mutex<VecDeque<Result<PositionSample, LocationError>>>,
        watch_calls: AtomicUsize,
    }

    impl MockLocationSource {
        pub fn new() -> (Self, mpsc::Sender<WatchEvent>) {
            let (tx, rx) = mpsc::channel(64);
            let source = Self {
                watch_feed: Mutex::new(Some(rx)),
                watch_error: Mutex::new(None),
                one_shot_results: Mutex::new(VecDeque::new()),
                watch_calls: AtomicUsize::new(0),
            };
            (source, tx)
        }

        /// A source whose watch capability is absent.
        pub fn unavailable() -> Self {
            let (source, _tx) = Self::new();
            *source.watch_error.lock().unwrap() =
                Some(LocationError::position_unavailable("no location capability"));
            source
        }

        pub fn push_one_shot(&self, result: Result<PositionSample, LocationError>) {
            self.one_shot_results.lock().unwrap().push_back(result);
        }

        pub fn watch_call_count(&self) -> usize {
            self.watch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LocationSource for MockLocationSource {
        async fn get_once(
            &self,
            _options: &SampleOptions,
        ) -> Result<PositionSample, LocationError> {
            self.one_shot_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(LocationError::position_unavailable("no scripted one-shot fix"))
                })
        }

        fn watch(&self, _options: &SampleOptions) -> Result<WatchSubscription, LocationError> {
            self.watch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.watch_error.lock().unwrap().clone() {
                return Err(err);
            }
            match self.watch_feed.lock().unwrap().take() {
                Some(rx) => Ok(WatchSubscription::new(rx)),
                None => Err(LocationError::position_unavailable("watch feed already taken")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_coordinate_and_speed() {
        let mut sample = PositionSample::new(10.0, -74.0, 8.0);
        assert_eq!(sample.coordinate(), Coordinate::new(10.0, -74.0));
        assert_eq!(sample.speed_or_zero(), 0.0);

        sample.speed_mps = Some(1.5);
        assert_eq!(sample.speed_or_zero(), 1.5);
    }

    #[test]
    fn test_error_kind_display_names() {
        assert_eq!(
            LocationError::permission_denied("x").to_string(),
            "permission-denied: x"
        );
        assert_eq!(LocationErrorKind::PositionUnavailable.to_string(), "position-unavailable");
        assert_eq!(LocationErrorKind::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_sample_options_defaults() {
        let options = SampleOptions::default();
        assert!(options.high_accuracy);
        assert_eq!(options.maximum_age, Duration::from_millis(500));
        assert_eq!(options.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_subscription_delivers_in_order_and_cancels() {
        tokio_test::block_on(async {
            let (tx, rx) = mpsc::channel(8);
            let mut subscription = WatchSubscription::new(rx);

            tx.send(Ok(PositionSample::new(1.0, 1.0, 5.0))).await.unwrap();
            tx.send(Err(LocationError::timeout("fix attempt timed out")))
                .await
                .unwrap();

            let first = subscription.next().await.unwrap().unwrap();
            assert_eq!(first.coordinate(), Coordinate::new(1.0, 1.0));

            let second = subscription.next().await.unwrap().unwrap_err();
            assert_eq!(second.kind(), LocationErrorKind::Timeout);

            subscription.cancel();
            assert!(tx.send(Ok(PositionSample::new(2.0, 2.0, 5.0))).await.is_err());
            assert!(subscription.next().await.is_none());
        });
    }
}
