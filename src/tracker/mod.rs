//! # Position Tracker
//!
//! Owns the continuous stream of device location samples, maintains the
//! single authoritative "current position" value for local observers,
//! and decides which samples are worth forwarding over the delivery
//! channel.
//!
//! This module handles:
//! - Continuous sampling through a cancelable watch subscription
//! - Distance-based send suppression (skip broadcasts for small moves)
//! - Resync triggers that bypass suppression on lifecycle events
//! - Throttled reporting of repeated sampling failures
//!
//! ## Send suppression
//!
//! Every continuous sample is published to observers, but it is only
//! broadcast over the channel when the device moved at least the
//! configured threshold (default 5 m) from the last broadcast point.
//! This bounds event volume without a fixed send interval, at the cost
//! of a position-staleness error bounded by the threshold.
//!
//! ## Resync triggers
//!
//! App resume, network change and channel (re)connect each force one
//! best-effort send of a fresh one-shot fix, regardless of distance.
//! A resync never updates the suppression state, so overlapping resync
//! and suppression-path sends within a short window can duplicate -
//! an accepted cost, not deduplicated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channel::{DeliveryChannel, PositionUpdate};
use crate::config::TrackingConfig;
use crate::geo::{distance_meters, Coordinate};
use crate::identity::UserIdentity;
use crate::location::{LocationError, LocationErrorKind, LocationSource, PositionSample};

/// Tracker-internal delivery bookkeeping. Reset when tracking stops.
#[derive(Debug, Default)]
struct DeliveryState {
    /// Coordinates of the last suppression-path broadcast
    last_sent: Option<Coordinate>,
    /// Kind of the last surfaced sampling failure
    last_error_kind: Option<LocationErrorKind>,
    /// When that failure was surfaced
    last_error_at: Option<Instant>,
}

struct TrackerInner {
    source: Arc<dyn LocationSource>,
    channel: Arc<dyn DeliveryChannel>,
    identity: Arc<UserIdentity>,
    config: TrackingConfig,
    position_tx: watch::Sender<Option<PositionSample>>,
    delivery: Mutex<DeliveryState>,
    delivered: AtomicU64,
}

/// Continuous device-position tracker with throttled delivery.
///
/// Observers subscribe through [`PositionTracker::current_position`]
/// and receive read-only snapshots; delivery policy is owned entirely
/// by the tracker and cannot be perturbed by observers.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use geotrack::config::Config;
/// use geotrack::channel::line::LineChannel;
/// use geotrack::identity::UserIdentity;
/// use geotrack::location::replay::ReplayLocationSource;
/// use geotrack::storage::MemoryStore;
/// use geotrack::tracker::PositionTracker;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = Config::default();
/// let identity = Arc::new(UserIdentity::new(Arc::new(MemoryStore::new())));
/// let channel = Arc::new(LineChannel::connect(&config.channel, identity.clone()));
/// let source = Arc::new(ReplayLocationSource::new(&config.replay));
///
/// let tracker = PositionTracker::new(source, channel, identity, config.tracking);
/// tracker.start_continuous_tracking();
///
/// let mut positions = tracker.current_position();
/// while positions.changed().await.is_ok() {
///     if let Some(sample) = *positions.borrow() {
///         println!("now at {:.5}, {:.5}", sample.lat, sample.lng);
///     }
/// }
/// # }
/// ```
pub struct PositionTracker {
    inner: Arc<TrackerInner>,
    active: Mutex<Option<JoinHandle<()>>>,
}

impl PositionTracker {
    /// Build a tracker over the given source, channel and identity.
    pub fn new(
        source: Arc<dyn LocationSource>,
        channel: Arc<dyn DeliveryChannel>,
        identity: Arc<UserIdentity>,
        config: TrackingConfig,
    ) -> Self {
        let (position_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(TrackerInner {
                source,
                channel,
                identity,
                config,
                position_tx,
                delivery: Mutex::new(DeliveryState::default()),
                delivered: AtomicU64::new(0),
            }),
            active: Mutex::new(None),
        }
    }

    /// Begin continuous sampling.
    ///
    /// At most one continuous subscription is active at a time; calling
    /// this while active logs a warning and does nothing. When the
    /// location capability is absent the failure is silent: observers
    /// see the position as absent and the tracker stays idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_continuous_tracking(&self) {
        let mut active = self.active.lock().unwrap();
        if active.is_some() {
            warn!("continuous location tracking is already active");
            return;
        }

        let mut subscription = match self.inner.source.watch(&self.inner.config.watch_options()) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("location source unavailable: {}", e);
                self.inner.position_tx.send_replace(None);
                return;
            }
        };

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                match event {
                    Ok(sample) => {
                        inner.clear_error_throttle();
                        inner.position_tx.send_replace(Some(sample));
                        inner.forward_if_moved(&sample).await;
                    }
                    Err(e) => {
                        inner.report_sampling_failure(&e);
                        inner.position_tx.send_replace(None);
                    }
                }
            }
            debug!("location watch stream ended");
        });

        *active = Some(task);
        info!("continuous location tracking started");
    }

    /// Stop continuous sampling and clear the current position.
    /// Idempotent; does nothing when tracking is not active.
    pub fn stop_continuous_tracking(&self) {
        let mut active = self.active.lock().unwrap();
        if let Some(task) = active.take() {
            task.abort();
            self.inner.position_tx.send_replace(None);
            *self.inner.delivery.lock().unwrap() = DeliveryState::default();
            info!("continuous location tracking stopped");
        }
    }

    /// Whether a continuous subscription is currently active.
    pub fn is_tracking(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    /// Request one fresh position sample.
    ///
    /// Continuous-tracking state is never touched, whether tracking is
    /// running or not.
    ///
    /// # Errors
    ///
    /// Fails with the source's typed [`LocationError`]: permission
    /// denied, position unavailable, or timeout.
    pub async fn get_one_shot_position(&self) -> Result<PositionSample, LocationError> {
        self.inner
            .source
            .get_once(&self.inner.config.one_shot_options())
            .await
    }

    /// Observe the current position.
    ///
    /// The value is the latest successfully-sampled position, or `None`
    /// before the first fix and after any sampling failure. Every new
    /// sample is published without equality checks.
    pub fn current_position(&self) -> watch::Receiver<Option<PositionSample>> {
        self.inner.position_tx.subscribe()
    }

    /// The latest position without subscribing.
    pub fn latest_position(&self) -> Option<PositionSample> {
        *self.inner.position_tx.borrow()
    }

    /// How many position broadcasts reached the channel.
    pub fn delivered_count(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Resync trigger: the app returned to the foreground.
    pub async fn on_resume(&self) {
        info!("app resumed, resyncing position");
        self.inner.resync("app-resume").await;
    }

    /// Resync trigger: the network environment changed.
    pub async fn on_network_change(&self) {
        info!("network changed, resyncing position");
        self.inner.resync("network-change").await;
    }

    /// Resync trigger: the delivery channel (re)connected.
    pub async fn on_channel_connect(&self) {
        info!("delivery channel connected, resyncing position");
        self.inner.resync("channel-connect").await;
    }

    /// Wire the channel's connect notifications to the channel-connect
    /// resync trigger, after the configured settle delay.
    ///
    /// Returns the listener task; abort it on shutdown.
    pub fn spawn_resync_on_connect(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let mut connected = inner.channel.subscribe_connected();
        let delay = inner.config.resync_delay();

        tokio::spawn(async move {
            loop {
                match connected.recv().await {
                    Ok(()) => {
                        tokio::time::sleep(delay).await;
                        inner.resync("channel-connect").await;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl TrackerInner {
    /// Apply the send-suppression rule to a continuous sample and
    /// broadcast it when it qualifies.
    async fn forward_if_moved(&self, sample: &PositionSample) {
        if !self.channel.is_connected() {
            debug!("channel disconnected, sample not delivered");
            return;
        }

        let coord = sample.coordinate();
        let should_send = {
            let mut delivery = self.delivery.lock().unwrap();
            let send = match delivery.last_sent {
                None => true,
                Some(last) => {
                    distance_meters(last, coord) >= self.config.min_distance_to_send_m
                }
            };
            // The suppression state follows the send decision, not the
            // outcome of the best-effort write below
            if send {
                delivery.last_sent = Some(coord);
            }
            send
        };

        if !should_send {
            return;
        }

        match self.channel.send(self.make_update(sample)).await {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!("position delivered at {:.5}, {:.5}", coord.lat, coord.lng);
            }
            Err(e) => debug!("best-effort position send failed: {}", e),
        }
    }

    /// Fetch a fresh one-shot fix and send it, bypassing suppression.
    /// All failures are logged and swallowed.
    async fn resync(&self, trigger: &str) {
        if !self.channel.is_connected() {
            debug!("resync ({}) skipped, channel disconnected", trigger);
            return;
        }

        match self.source.get_once(&self.config.one_shot_options()).await {
            Ok(sample) => match self.channel.send(self.make_update(&sample)).await {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!("resync ({}) position delivered", trigger);
                }
                Err(e) => debug!("resync ({}) send failed: {}", trigger, e),
            },
            Err(e) => warn!("resync ({}) skipped, no position: {}", trigger, e),
        }
    }

    fn make_update(&self, sample: &PositionSample) -> PositionUpdate {
        PositionUpdate {
            user_id: self.identity.user_id(),
            lat: sample.lat,
            lng: sample.lng,
            speed: sample.speed_or_zero(),
            accuracy: Some(sample.accuracy_m),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Surface a sampling failure unless an identical-kind failure was
    /// already surfaced inside the report window.
    fn report_sampling_failure(&self, err: &LocationError) {
        let now = Instant::now();
        let surface = {
            let mut delivery = self.delivery.lock().unwrap();
            let repeat = delivery.last_error_kind == Some(err.kind())
                && delivery
                    .last_error_at
                    .map_or(false, |at| now.duration_since(at) < self.config.error_report_window());
            if !repeat {
                delivery.last_error_kind = Some(err.kind());
                delivery.last_error_at = Some(now);
            }
            !repeat
        };

        if surface {
            match err.kind() {
                LocationErrorKind::PermissionDenied => {
                    error!("location sampling failed: {}", err)
                }
                _ => warn!("location sampling failed: {}", err),
            }
        }
    }

    /// A successful sample resets the failure throttle immediately.
    fn clear_error_throttle(&self) {
        let mut delivery = self.delivery.lock().unwrap();
        delivery.last_error_kind = None;
        delivery.last_error_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mocks::MockDeliveryChannel;
    use crate::location::mocks::MockLocationSource;
    use crate::location::WatchEvent;
    use crate::storage::MemoryStore;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_identity() -> Arc<UserIdentity> {
        Arc::new(UserIdentity::new(Arc::new(MemoryStore::new())))
    }

    fn test_config() -> TrackingConfig {
        TrackingConfig {
            resync_delay_ms: 0,
            ..TrackingConfig::default()
        }
    }

    fn sample(lat: f64, lng: f64) -> PositionSample {
        PositionSample::new(lat, lng, 8.0)
    }

    struct Harness {
        tracker: PositionTracker,
        source: Arc<MockLocationSource>,
        channel: Arc<MockDeliveryChannel>,
        feed: mpsc::Sender<WatchEvent>,
    }

    fn harness(connected: bool) -> Harness {
        let (source, feed) = MockLocationSource::new();
        let source = Arc::new(source);
        let channel = Arc::new(MockDeliveryChannel::new(connected));
        let tracker = PositionTracker::new(
            source.clone(),
            channel.clone(),
            test_identity(),
            test_config(),
        );
        Harness {
            tracker,
            source,
            channel,
            feed,
        }
    }

    /// Feed one watch event and wait until the tracker published the
    /// resulting observer update (which happens before any send).
    async fn feed_and_settle(h: &Harness, positions: &mut watch::Receiver<Option<PositionSample>>, event: WatchEvent) {
        h.feed.send(event).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), positions.changed())
            .await
            .expect("timed out waiting for position update")
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_sample_is_always_sent() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.0))).await;

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].lat, 10.0);
        assert_eq!(sent[0].lng, -74.0);
        assert_eq!(h.tracker.delivered_count(), 1);
    }

    #[tokio::test]
    async fn test_small_moves_are_suppressed_then_large_move_sends() {
        // ~3 m apart gets suppressed, ~111 m apart gets sent
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        feed_and_settle(&h, &mut positions, Ok(sample(10.0000, -74.0000))).await;
        feed_and_settle(&h, &mut positions, Ok(sample(10.0000, -74.00003))).await;
        feed_and_settle(&h, &mut positions, Ok(sample(10.0010, -74.0000))).await;

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 2, "expected first and third samples only");
        assert_eq!(sent[0].lng, -74.0000);
        assert_eq!(sent[1].lat, 10.0010);
    }

    #[tokio::test]
    async fn test_run_of_close_samples_sends_exactly_once() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        // Every sample within ~3.3 m of the FIRST (and only sent) point
        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.0))).await;
        for _ in 0..5 {
            feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.00003))).await;
            feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.0))).await;
        }

        assert_eq!(h.channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_suppression_threshold_updates_to_last_sent_point() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        feed_and_settle(&h, &mut positions, Ok(sample(10.0000, -74.0))).await;
        // ~111 m north: sent, and becomes the new reference point
        feed_and_settle(&h, &mut positions, Ok(sample(10.0010, -74.0))).await;
        // ~3 m from the NEW reference: suppressed
        feed_and_settle(&h, &mut positions, Ok(sample(10.0010, -74.00003))).await;

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].lat, 10.0010);
    }

    #[tokio::test]
    async fn test_every_sample_is_published_even_when_suppressed() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.0))).await;
        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.00003))).await;

        // The suppressed sample still reached observers
        let latest = h.tracker.latest_position().unwrap();
        assert_eq!(latest.lng, -74.00003);
        assert_eq!(h.channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnected_channel_drops_without_state_change() {
        let h = harness(false);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        // Channel down: nothing sent, suppression state untouched
        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.0))).await;
        assert_eq!(h.channel.sent().len(), 0);

        // Channel back up: the next sample counts as the first send
        // even though it is within the threshold of the dropped one
        h.channel.set_connected(true);
        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.00003))).await;

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].lng, -74.00003);
    }

    #[tokio::test]
    async fn test_sampling_failure_publishes_absent_position() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.0))).await;
        assert!(h.tracker.latest_position().is_some());

        feed_and_settle(
            &h,
            &mut positions,
            Err(LocationError::position_unavailable("gps cold")),
        )
        .await;
        assert!(h.tracker.latest_position().is_none());

        // Tracking keeps running and recovers on the next fix
        feed_and_settle(&h, &mut positions, Ok(sample(10.1, -74.1))).await;
        assert!(h.tracker.latest_position().is_some());
        assert!(h.tracker.is_tracking());
    }

    #[tokio::test]
    async fn test_double_start_keeps_single_subscription() {
        let h = harness(true);
        h.tracker.start_continuous_tracking();
        h.tracker.start_continuous_tracking();

        assert_eq!(h.source.watch_call_count(), 1);
        assert!(h.tracker.is_tracking());
    }

    #[tokio::test]
    async fn test_stop_clears_position_and_is_idempotent() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.0))).await;
        assert!(h.tracker.latest_position().is_some());

        h.tracker.stop_continuous_tracking();
        assert!(h.tracker.latest_position().is_none());
        assert!(!h.tracker.is_tracking());

        h.tracker.stop_continuous_tracking();
        assert!(!h.tracker.is_tracking());
    }

    #[tokio::test]
    async fn test_restart_after_stop_resets_suppression_state() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();
        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.0))).await;
        assert_eq!(h.channel.sent().len(), 1);

        h.tracker.stop_continuous_tracking();

        // A fresh subscription starts with no last-sent point, so the
        // first sample sends again even at the same coordinates
        let (source, feed) = MockLocationSource::new();
        let tracker = PositionTracker::new(
            Arc::new(source),
            h.channel.clone(),
            test_identity(),
            test_config(),
        );
        let mut positions = tracker.current_position();
        tracker.start_continuous_tracking();

        feed.send(Ok(sample(10.0, -74.0))).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), positions.changed())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(h.channel.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_capability_fails_silently() {
        let source = Arc::new(MockLocationSource::unavailable());
        let channel = Arc::new(MockDeliveryChannel::new(true));
        let tracker = PositionTracker::new(
            source.clone(),
            channel,
            test_identity(),
            test_config(),
        );

        tracker.start_continuous_tracking();

        assert!(!tracker.is_tracking());
        assert!(tracker.latest_position().is_none());
    }

    #[tokio::test]
    async fn test_one_shot_permission_error_leaves_tracking_untouched() {
        let h = harness(true);
        h.source
            .push_one_shot(Err(LocationError::permission_denied("user said no")));

        let err = h.tracker.get_one_shot_position().await.unwrap_err();
        assert_eq!(err.kind(), LocationErrorKind::PermissionDenied);

        // Tracking was never started and stays that way
        assert!(!h.tracker.is_tracking());
        assert!(h.tracker.latest_position().is_none());
        assert_eq!(h.source.watch_call_count(), 0);
    }

    #[tokio::test]
    async fn test_one_shot_success_does_not_publish_or_send() {
        let h = harness(true);
        h.source.push_one_shot(Ok(sample(1.0, 2.0)));

        let fix = h.tracker.get_one_shot_position().await.unwrap();
        assert_eq!(fix.lat, 1.0);

        assert!(h.tracker.latest_position().is_none());
        assert_eq!(h.channel.sent().len(), 0);
    }

    #[tokio::test]
    async fn test_resync_bypasses_suppression() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.0))).await;
        assert_eq!(h.channel.sent().len(), 1);

        // A one-shot fix at (essentially) the same spot still goes out
        h.source.push_one_shot(Ok(sample(10.0, -74.0)));
        h.tracker.on_resume().await;
        assert_eq!(h.channel.sent().len(), 2);

        h.source.push_one_shot(Ok(sample(10.0, -74.0)));
        h.tracker.on_network_change().await;
        assert_eq!(h.channel.sent().len(), 3);

        // And the suppression reference is unchanged: the next close
        // continuous sample is still measured against the first send
        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.00003))).await;
        assert_eq!(h.channel.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_resync_requires_connected_channel() {
        let h = harness(false);
        h.source.push_one_shot(Ok(sample(10.0, -74.0)));

        h.tracker.on_channel_connect().await;
        assert_eq!(h.channel.sent().len(), 0);
    }

    #[tokio::test]
    async fn test_resync_swallows_sampling_failure() {
        let h = harness(true);
        // No scripted one-shot fix: get_once fails, resync just logs
        h.tracker.on_resume().await;
        assert_eq!(h.channel.sent().len(), 0);
    }

    #[tokio::test]
    async fn test_connect_notification_triggers_resync() {
        let h = harness(false);
        let _listener = h.tracker.spawn_resync_on_connect();

        h.source.push_one_shot(Ok(sample(10.0, -74.0)));
        h.channel.set_connected(true);

        h.channel.wait_for_sends(1).await;
        assert_eq!(h.channel.sent()[0].lat, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_identical_errors_are_throttled() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        let timeout_err = || Err(LocationError::timeout("fix attempt timed out"));

        feed_and_settle(&h, &mut positions, timeout_err()).await;
        {
            let delivery = h.tracker.inner.delivery.lock().unwrap();
            assert_eq!(delivery.last_error_kind, Some(LocationErrorKind::Timeout));
        }
        let first_surfaced_at = h.tracker.inner.delivery.lock().unwrap().last_error_at;

        // Second identical failure inside the window: not re-surfaced,
        // so the surfacing timestamp does not move
        tokio::time::advance(Duration::from_secs(5)).await;
        feed_and_settle(&h, &mut positions, timeout_err()).await;
        assert_eq!(
            h.tracker.inner.delivery.lock().unwrap().last_error_at,
            first_surfaced_at
        );

        // Past the 30 s window the same kind surfaces again
        tokio::time::advance(Duration::from_secs(26)).await;
        feed_and_settle(&h, &mut positions, timeout_err()).await;
        assert_ne!(
            h.tracker.inner.delivery.lock().unwrap().last_error_at,
            first_surfaced_at
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_throttle_resets_on_success() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        feed_and_settle(
            &h,
            &mut positions,
            Err(LocationError::timeout("fix attempt timed out")),
        )
        .await;
        let first_surfaced_at = h.tracker.inner.delivery.lock().unwrap().last_error_at;

        // A fix in between clears the throttle
        feed_and_settle(&h, &mut positions, Ok(sample(10.0, -74.0))).await;
        assert!(h.tracker.inner.delivery.lock().unwrap().last_error_kind.is_none());

        // The same kind right afterwards surfaces immediately
        tokio::time::advance(Duration::from_secs(1)).await;
        feed_and_settle(
            &h,
            &mut positions,
            Err(LocationError::timeout("fix attempt timed out")),
        )
        .await;
        let delivery = h.tracker.inner.delivery.lock().unwrap();
        assert_eq!(delivery.last_error_kind, Some(LocationErrorKind::Timeout));
        assert_ne!(delivery.last_error_at, first_surfaced_at);
    }

    #[tokio::test]
    async fn test_different_error_kind_surfaces_immediately() {
        let h = harness(true);
        let mut positions = h.tracker.current_position();
        h.tracker.start_continuous_tracking();

        feed_and_settle(
            &h,
            &mut positions,
            Err(LocationError::timeout("fix attempt timed out")),
        )
        .await;
        feed_and_settle(
            &h,
            &mut positions,
            Err(LocationError::permission_denied("revoked mid-session")),
        )
        .await;

        let delivery = h.tracker.inner.delivery.lock().unwrap();
        assert_eq!(
            delivery.last_error_kind,
            Some(LocationErrorKind::PermissionDenied)
        );
    }
}
