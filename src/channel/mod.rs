//! # Delivery Channel
//!
//! Realtime transport for position broadcasts, behind a trait.
//!
//! The channel is bidirectional and reconnects autonomously; it may be
//! connected or disconnected at any moment. Sends are best-effort:
//! they succeed only while the channel reports itself connected and
//! are dropped otherwise - there is no outbound queue across
//! disconnects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

pub mod line;

/// Event name for outbound position broadcasts
pub const POSITION_UPDATE_EVENT: &str = "position-update";

/// Event name for the identity hello sent after connecting
pub const CLIENT_HELLO_EVENT: &str = "client-hello";

/// Outbound position broadcast payload.
///
/// `speed` is meters per second with unknown reported as 0;
/// `timestamp` is epoch milliseconds at send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
    pub speed: f64,
    pub accuracy: Option<f64>,
    pub timestamp: i64,
}

/// Named event wrapper used on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub event: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(event: &str, data: T) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }
}

/// Channel failures. All of these are swallowed at the tracker
/// boundary; they exist so call sites can log what happened.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel is currently disconnected; the event was dropped
    #[error("channel is not connected")]
    NotConnected,

    /// The event could not be encoded for the wire
    #[error("could not encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// The channel worker has shut down and will not reconnect
    #[error("channel is closed")]
    Closed,
}

/// A realtime event transport that may be connected or disconnected at
/// any time and reconnects autonomously.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Whether the transport currently reports itself connected.
    fn is_connected(&self) -> bool;

    /// Send a position broadcast. Succeeds only while connected.
    async fn send(&self, update: PositionUpdate) -> Result<(), ChannelError>;

    /// Subscribe to connect notifications, fired on every (re)connect.
    fn subscribe_connected(&self) -> broadcast::Receiver<()>;
}
