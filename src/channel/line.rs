//! # Line Channel
//!
//! Production [`DeliveryChannel`] over a plain TCP connection carrying
//! one JSON-encoded [`Envelope`] per line.
//!
//! This module handles:
//! - Connecting with a bounded timeout
//! - Autonomous reconnection with capped exponential backoff
//! - Announcing the local identity after every (re)connect
//! - Broadcasting inbound events to interested subscribers
//! - Detecting half-dead connections through the read side

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ChannelError, DeliveryChannel, Envelope, PositionUpdate};
use super::{CLIENT_HELLO_EVENT, POSITION_UPDATE_EVENT};
use crate::config::ChannelConfig;
use crate::identity::UserIdentity;

/// Outbound lines buffered between `send` and the socket writer
const SEND_QUEUE_CAPACITY: usize = 32;

/// Inbound events buffered per subscriber
const INBOUND_BUFFER: usize = 64;

struct Shared {
    connected: AtomicBool,
    connected_tx: broadcast::Sender<()>,
    inbound_tx: broadcast::Sender<Envelope<serde_json::Value>>,
}

/// TCP line-protocol channel client.
///
/// The connection is managed by a background worker that reconnects
/// with exponential backoff capped at the configured maximum; callers
/// only ever observe the `connected` flag flipping.
pub struct LineChannel {
    shared: Arc<Shared>,
    outgoing_tx: mpsc::Sender<String>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LineChannel {
    /// Start the channel worker. Returns immediately; the first
    /// connection attempt happens in the background.
    pub fn connect(config: &ChannelConfig, identity: Arc<UserIdentity>) -> Self {
        let (connected_tx, _) = broadcast::channel(8);
        let (inbound_tx, _) = broadcast::channel(INBOUND_BUFFER);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);

        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            connected_tx,
            inbound_tx,
        });

        let worker = tokio::spawn(run_worker(
            config.server_addr.clone(),
            config.connect_timeout(),
            config.reconnect_delay(),
            config.reconnect_delay_max(),
            Arc::clone(&shared),
            outgoing_rx,
            identity,
        ));

        Self {
            shared,
            outgoing_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Subscribe to inbound events (peer position updates, server
    /// acknowledgements). Slow subscribers may observe lag.
    pub fn subscribe_inbound(&self) -> broadcast::Receiver<Envelope<serde_json::Value>> {
        self.shared.inbound_tx.subscribe()
    }

    /// Stop the worker and drop the connection. The channel stays
    /// disconnected permanently afterwards.
    pub fn disconnect(&self) {
        if let Some(worker) = self.worker.lock().unwrap().take() {
            worker.abort();
            self.shared.connected.store(false, Ordering::SeqCst);
            info!("delivery channel disconnected");
        }
    }
}

#[async_trait]
impl DeliveryChannel for LineChannel {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, update: PositionUpdate) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        let line = serde_json::to_string(&Envelope::new(POSITION_UPDATE_EVENT, update))?;
        self.outgoing_tx
            .send(line)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    fn subscribe_connected(&self) -> broadcast::Receiver<()> {
        self.shared.connected_tx.subscribe()
    }
}

async fn run_worker(
    addr: String,
    connect_timeout: Duration,
    reconnect_delay: Duration,
    reconnect_delay_max: Duration,
    shared: Arc<Shared>,
    mut outgoing_rx: mpsc::Receiver<String>,
    identity: Arc<UserIdentity>,
) {
    let mut delay = reconnect_delay;

    loop {
        match tokio::time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                delay = reconnect_delay;
                info!("connected to {}", addr);
                shared.connected.store(true, Ordering::SeqCst);
                let _ = shared.connected_tx.send(());

                let shutdown = run_session(stream, &shared, &mut outgoing_rx, &identity).await;
                shared.connected.store(false, Ordering::SeqCst);
                if shutdown {
                    debug!("channel handle dropped, worker exiting");
                    return;
                }
                warn!("connection to {} lost, reconnecting", addr);
            }
            Ok(Err(e)) => debug!("could not connect to {}: {}", addr, e),
            Err(_) => debug!("connect attempt to {} timed out", addr),
        }

        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(reconnect_delay_max);
    }
}

/// Drive one live connection. Returns `true` when the owning handle was
/// dropped and the worker should exit instead of reconnecting.
async fn run_session(
    stream: TcpStream,
    shared: &Shared,
    outgoing_rx: &mut mpsc::Receiver<String>,
    identity: &UserIdentity,
) -> bool {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Identify ourselves before anything else
    match serde_json::to_string(&Envelope::new(CLIENT_HELLO_EVENT, identity.info())) {
        Ok(hello) => {
            if let Err(e) = write_line(&mut writer, &hello).await {
                debug!("could not send hello: {}", e);
                return false;
            }
        }
        Err(e) => warn!("could not encode hello: {}", e),
    }

    loop {
        tokio::select! {
            inbound = lines.next_line() => match inbound {
                Ok(Some(line)) => handle_inbound(shared, &line),
                Ok(None) => return false,
                Err(e) => {
                    debug!("read side failed: {}", e);
                    return false;
                }
            },
            outbound = outgoing_rx.recv() => match outbound {
                Some(line) => {
                    if let Err(e) = write_line(&mut writer, &line).await {
                        debug!("write side failed: {}", e);
                        return false;
                    }
                }
                None => return true,
            },
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

fn handle_inbound(shared: &Shared, raw: &str) {
    match serde_json::from_str::<Envelope<serde_json::Value>>(raw) {
        Ok(envelope) => {
            debug!("received {} event", envelope.event);
            let _ = shared.inbound_tx.send(envelope);
        }
        Err(e) => debug!("ignoring malformed inbound line: {}", e),
    }
}
