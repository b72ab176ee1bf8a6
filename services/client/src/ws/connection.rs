//! Owns the persistent WebSocket link to the tutor server.
//!
//! The manager runs the link on a background task that connects, pumps frames
//! in both directions, and reconnects on a fixed interval after an unexpected
//! closure. Its lifecycle is published as a [`ConnectionState`] twice: the
//! latest value on a `watch` channel, and every change in order on an mpsc
//! stream of transitions that the session consumes so a quick open/close
//! flap is never folded away.

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt, future, stream::BoxStream};
use std::{fmt, pin::Pin, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{Instrument, debug, error, info, warn};
use xiaoyue_core::protocol::{InboundFrame, OutboundCommand};

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 10;

/// Lifecycle of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed by the remote endpoint")]
    Closed,
    #[error("connection is {0}, command not sent")]
    NotOpen(ConnectionState),
    #[error("failed to encode outbound command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fixed-interval retry budget applied after an unexpected closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    /// Consecutive failed retries tolerated before giving up for good.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
        }
    }
}

/// Outgoing half of a transport: accepts serialized text frames.
pub type TextSink = Pin<Box<dyn Sink<String, Error = ConnectionError> + Send>>;
/// Incoming half of a transport: yields text frames until the link ends.
pub type TextStream = BoxStream<'static, Result<String, ConnectionError>>;

/// An established, bidirectional text link.
pub struct Transport {
    pub sink: TextSink,
    pub stream: TextStream,
}

/// Establishes transports. Abstracted so the lifecycle can run over any link.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Transport, ConnectionError>;
}

/// Connects with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Transport, ConnectionError> {
        let (ws_stream, _) = connect_async(endpoint).await?;
        let (ws_tx, ws_rx) = ws_stream.split();

        let sink = ws_tx
            .sink_map_err(ConnectionError::from)
            .with(|text: String| future::ready(Ok::<_, ConnectionError>(WsMessage::Text(text.into()))));
        let stream = ws_rx.filter_map(|msg_result| {
            future::ready(match msg_result {
                Ok(WsMessage::Text(text)) => Some(Ok(text.to_string())),
                Ok(WsMessage::Close(close_frame)) => {
                    debug!(?close_frame, "Server sent close frame");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(ConnectionError::from(e))),
            })
        });

        Ok(Transport {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })
    }
}

/// Single owner of the link and its reconnection bookkeeping.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    states: Arc<StatePublisher>,
    transitions_rx: Option<mpsc::UnboundedReceiver<ConnectionState>>,
    frames_tx: mpsc::UnboundedSender<InboundFrame>,
    frames_rx: Option<mpsc::UnboundedReceiver<InboundFrame>>,
    outbound_tx: Option<mpsc::UnboundedSender<String>>,
    endpoint: Option<String>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (current, _) = watch::channel(ConnectionState::Closed);
        let (transitions_tx, transitions_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            policy,
            states: Arc::new(StatePublisher {
                current,
                transitions: transitions_tx,
            }),
            transitions_rx: Some(transitions_rx),
            frames_tx,
            frames_rx: Some(frames_rx),
            outbound_tx: None,
            endpoint: None,
            task: None,
        }
    }

    /// Hands out the inbound frame stream. There is exactly one consumer, so
    /// only the first call returns `Some`.
    pub fn take_frames(&mut self) -> Option<mpsc::UnboundedReceiver<InboundFrame>> {
        self.frames_rx.take()
    }

    /// Hands out every state change in order. Unlike [`watch_state`], nothing
    /// is coalesced. Only the first call returns `Some`.
    ///
    /// [`watch_state`]: Self::watch_state
    pub fn take_transitions(&mut self) -> Option<mpsc::UnboundedReceiver<ConnectionState>> {
        self.transitions_rx.take()
    }

    pub fn state(&self) -> ConnectionState {
        *self.states.current.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.states.current.subscribe()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Whether the background task is still connecting, connected, or retrying.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts the link to `endpoint`, replacing any existing one.
    ///
    /// Calling this again after retries are exhausted is the manual retry.
    pub fn connect(&mut self, endpoint: impl Into<String>) {
        self.stop_task();
        let endpoint = endpoint.into();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound_tx = Some(outbound_tx);
        self.endpoint = Some(endpoint.clone());

        let link = Link {
            connector: self.connector.clone(),
            policy: self.policy,
            states: self.states.clone(),
            frames_tx: self.frames_tx.clone(),
            outbound_rx,
        };
        let span = tracing::info_span!("connection", %endpoint);
        self.task = Some(tokio::spawn(link.run(endpoint).instrument(span)));
    }

    /// Reconnects to the last endpoint. Returns `false` if `connect` was never called.
    pub fn reconnect(&mut self) -> bool {
        match self.endpoint.clone() {
            Some(endpoint) => {
                self.connect(endpoint);
                true
            }
            None => false,
        }
    }

    /// Deliberately closes the link. No automatic retry follows.
    pub fn disconnect(&mut self) {
        self.stop_task();
        self.states.publish(ConnectionState::Closed);
    }

    /// Sends a command, dropping it with a warning if the link is not open.
    pub fn send(&self, command: &OutboundCommand) {
        if let Err(e) = self.try_send(command) {
            warn!(action = command.action(), error = %e, "Dropping outbound command");
        }
    }

    pub fn try_send(&self, command: &OutboundCommand) -> Result<(), ConnectionError> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(ConnectionError::NotOpen(state));
        }
        let text = serde_json::to_string(command)?;
        let outbound_tx = self
            .outbound_tx
            .as_ref()
            .ok_or(ConnectionError::NotOpen(ConnectionState::Closed))?;
        outbound_tx
            .send(text)
            .map_err(|_| ConnectionError::NotOpen(ConnectionState::Closed))?;
        debug!(action = command.action(), "Queued outbound command");
        Ok(())
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.outbound_tx = None;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop_task();
    }
}

/// Both views of the lifecycle, written together.
struct StatePublisher {
    current: watch::Sender<ConnectionState>,
    transitions: mpsc::UnboundedSender<ConnectionState>,
}

impl StatePublisher {
    fn publish(&self, state: ConnectionState) {
        let previous = self.current.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "Connection state changed");
            // The receiver may not have been taken, or the session is gone.
            let _ = self.transitions.send(state);
        }
    }
}

/// How a connected transport stopped.
enum PumpExit {
    /// The link failed or the server closed it; eligible for retry.
    Dropped(ConnectionError),
    /// The manager went away; stop for good.
    Shutdown,
}

/// State moved into the background task.
struct Link {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    states: Arc<StatePublisher>,
    frames_tx: mpsc::UnboundedSender<InboundFrame>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
}

impl Link {
    async fn run(mut self, endpoint: String) {
        // Retries scheduled since the last successful open.
        let mut retries = 0u32;
        loop {
            self.discard_stale_outbound();
            self.states.publish(ConnectionState::Connecting);

            match self.connector.connect(&endpoint).await {
                Ok(transport) => {
                    retries = 0;
                    self.states.publish(ConnectionState::Open);
                    let exit = self.pump(transport).await;
                    self.states.publish(ConnectionState::Closed);
                    match exit {
                        PumpExit::Shutdown => return,
                        PumpExit::Dropped(e) => warn!(error = %e, "Connection lost"),
                    }
                }
                Err(e) => {
                    self.states.publish(ConnectionState::Closed);
                    warn!(error = %e, retry = retries, "Connection attempt failed");
                }
            }

            if retries >= self.policy.max_attempts {
                error!(
                    attempts = self.policy.max_attempts,
                    "Reconnect attempts exhausted; staying closed"
                );
                return;
            }
            retries += 1;
            info!(
                attempt = retries,
                max_attempts = self.policy.max_attempts,
                delay_ms = self.policy.interval.as_millis() as u64,
                "Scheduling reconnect"
            );
            tokio::time::sleep(self.policy.interval).await;
        }
    }

    async fn pump(&mut self, transport: Transport) -> PumpExit {
        let Transport {
            mut sink,
            mut stream,
        } = transport;
        loop {
            tokio::select! {
                outgoing = self.outbound_rx.recv() => match outgoing {
                    Some(text) => {
                        if let Err(e) = sink.send(text).await {
                            return PumpExit::Dropped(e);
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        return PumpExit::Shutdown;
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(text)) => self.forward(&text),
                    Some(Err(e)) => return PumpExit::Dropped(e),
                    None => return PumpExit::Dropped(ConnectionError::Closed),
                },
            }
        }
    }

    fn forward(&self, text: &str) {
        match serde_json::from_str::<InboundFrame>(text) {
            Ok(frame) => {
                let _ = self.frames_tx.send(frame);
            }
            Err(e) => debug!(error = %e, "Dropping unparseable inbound frame"),
        }
    }

    /// Commands queued against a link that has since dropped are not replayed.
    fn discard_stale_outbound(&mut self) {
        let mut discarded = 0usize;
        while self.outbound_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "Discarded commands queued before the link dropped");
        }
    }
}

/// An in-memory [`Connector`] for tests: each successful connect yields a
/// [`ServerEnd`] through which the test plays the remote side.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Remote side of one in-memory transport.
    pub struct ServerEnd {
        /// Text frames the client sent.
        pub from_client: fmpsc::UnboundedReceiver<String>,
        /// Push text frames to the client; drop to simulate a server-side close.
        pub to_client: fmpsc::UnboundedSender<Result<String, ConnectionError>>,
    }

    impl ServerEnd {
        pub fn push(&self, frame: serde_json::Value) {
            let _ = self.to_client.unbounded_send(Ok(frame.to_string()));
        }

        /// Next command the client sent, parsed as JSON.
        pub async fn next_command(&mut self) -> Option<serde_json::Value> {
            let text = self.from_client.next().await?;
            serde_json::from_str(&text).ok()
        }
    }

    pub struct MemoryConnector {
        attempts: AtomicUsize,
        /// Scripted outcome per attempt; `true` accepts. Attempts past the
        /// script use `default_accept`.
        script: Mutex<VecDeque<bool>>,
        default_accept: bool,
        servers: mpsc::UnboundedSender<ServerEnd>,
    }

    impl MemoryConnector {
        pub fn new(default_accept: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
            Self::scripted(Vec::new(), default_accept)
        }

        pub fn scripted(
            script: Vec<bool>,
            default_accept: bool,
        ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
            let (servers, servers_rx) = mpsc::unbounded_channel();
            let connector = Arc::new(Self {
                attempts: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                default_accept,
                servers,
            });
            (connector, servers_rx)
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self, _endpoint: &str) -> Result<Transport, ConnectionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let accept = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.default_accept);
            if !accept {
                return Err(ConnectionError::Closed);
            }

            let (client_tx, from_client) = fmpsc::unbounded::<String>();
            let (to_client, client_rx) = fmpsc::unbounded::<Result<String, ConnectionError>>();
            let _ = self.servers.send(ServerEnd {
                from_client,
                to_client,
            });
            Ok(Transport {
                sink: Box::pin(client_tx.sink_map_err(|_| ConnectionError::Closed)),
                stream: client_rx.boxed(),
            })
        }
    }

    /// Waits until the manager reaches `state`.
    pub async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
        tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| *s == state))
            .await
            .expect("timed out waiting for connection state")
            .expect("state channel closed");
    }
}
