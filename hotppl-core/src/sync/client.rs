//! WebSocket live sync client for the HOT PPL broadcast server.
//!
//! A [`SyncClient`] is a cheap, cloneable handle over one background task
//! that owns the socket, the heartbeat and the reconnect timer. The host
//! creates one client and passes clones to whatever needs it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval_at, sleep_until, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::cache::{LeaderboardEntry, LiveState};
use super::config::SyncConfig;
use super::dispatch::apply_frame;
use super::error::SyncError;
use super::events::EventBus;
use super::metrics::{Metrics, MetricsSnapshot};
use super::protocol::{InboundFrame, OutboundMessage};
use super::reconnect::Reconnector;

/// Commands queued between handles and the connection task.
const COMMAND_BUFFER: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of the client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and nothing scheduled
    Disconnected,
    Connecting,
    Open,
    /// Lost; a reconnect may be pending
    Closed,
    /// Failed with an error; a reconnect may be pending
    Errored,
}

impl ConnectionState {
    /// Whether a connection exists or is being set up.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Connecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Errored => write!(f, "errored"),
        }
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Send(String),
    Visibility(bool),
    Shutdown,
}

/// Cache and metrics, written only by the connection task.
#[derive(Debug, Default)]
struct Shared {
    live: LiveState,
    metrics: Metrics,
}

/// Handle to the live sync client.
#[derive(Clone)]
pub struct SyncClient {
    url: Arc<str>,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    shared: Arc<RwLock<Shared>>,
    events: Arc<EventBus>,
}

impl fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncClient")
            .field("url", &self.url)
            .field("state", &self.state())
            .field("events", &self.events)
            .finish()
    }
}

impl SyncClient {
    /// Creates a client and spawns its idle connection task.
    ///
    /// Nothing is opened until [`connect`](Self::connect) is called. Must be
    /// called from within a tokio runtime.
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let url: Arc<str> = config.ws_url()?.into();
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(RwLock::new(Shared::default()));
        let events = Arc::new(EventBus::new());

        let task = ConnectionTask {
            url: url.clone(),
            connect_timeout: config.connect_timeout(),
            heartbeat_every: config.heartbeat_interval(),
            commands: command_rx,
            state: state_tx,
            shared: shared.clone(),
            events: events.clone(),
            reconnector: Reconnector::new(config.reconnect_policy()),
            reconnect_at: None,
            visible: true,
        };
        runtime.spawn(task.run());

        Ok(Self {
            url,
            commands: command_tx,
            state: state_rx,
            shared,
            events,
        })
    }

    /// The resolved WebSocket URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Opens a connection now, bypassing backoff and restoring the retry
    /// budget. Does nothing if a connection is open or being opened.
    pub async fn connect(&self) -> Result<(), SyncError> {
        self.command(Command::Connect).await
    }

    /// Closes the connection and cancels any pending reconnect.
    pub async fn disconnect(&self) -> Result<(), SyncError> {
        self.command(Command::Disconnect).await
    }

    /// Reports host visibility. Becoming visible while not connected
    /// reconnects immediately.
    pub async fn set_visible(&self, visible: bool) -> Result<(), SyncError> {
        self.command(Command::Visibility(visible)).await
    }

    /// Stops the connection task. Other handles become inert.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        self.command(Command::Shutdown).await
    }

    /// Sends `message` if the connection is open; otherwise drops it.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) {
        if !self.is_open() {
            tracing::trace!("Not connected, dropping outbound message");
            return;
        }

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to encode outbound message: {}", e);
                return;
            }
        };

        if let Err(e) = self.commands.try_send(Command::Send(text)) {
            tracing::debug!("Dropping outbound message: {}", e);
        }
    }

    /// Casts a vote for a submission.
    pub fn vote(&self, submission_id: impl Into<String>, vote_type: impl Into<String>) {
        self.send(&OutboundMessage::vote(submission_id, vote_type, Utc::now()));
    }

    /// Registers a handler for an event name (see [`events`](super::events)).
    pub fn on(&self, event: impl Into<String>, handler: impl Fn(&Value) + Send + Sync + 'static) {
        self.events.on(event, handler);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Receiver that observes every connection state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Copy of the whole cache.
    pub async fn live_state(&self) -> LiveState {
        self.shared.read().await.live.clone()
    }

    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.shared.read().await.live.leaderboard_entries()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.shared.read().await.metrics.snapshot(Utc::now())
    }

    async fn command(&self, command: Command) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::ClientClosed)
    }
}

/// One open socket and the heartbeat tied to it.
struct Connection {
    id: Uuid,
    stream: WsStream,
    heartbeat: Interval,
}

/// What woke the connection task.
enum Wake {
    Command(Option<Command>),
    Heartbeat,
    Frame(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    ReconnectDue,
}

/// What the run loop should do with the current connection.
enum Step {
    Continue,
    Open,
    Lost(ConnectionState),
    Disconnect,
    Shutdown,
}

struct ConnectionTask {
    url: Arc<str>,
    connect_timeout: Duration,
    heartbeat_every: Duration,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<ConnectionState>,
    shared: Arc<RwLock<Shared>>,
    events: Arc<EventBus>,
    reconnector: Reconnector,
    /// Deadline of the pending reconnect, if any
    reconnect_at: Option<Instant>,
    visible: bool,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut conn: Option<Connection> = None;

        loop {
            let step = match conn.as_mut() {
                Some(active) => self.poll_open(active).await,
                None => self.poll_idle().await,
            };

            match step {
                Step::Continue => {}
                Step::Open => {
                    if conn.is_none() {
                        conn = self.open().await;
                    }
                }
                Step::Lost(state) => {
                    if let Some(lost) = conn.take() {
                        tracing::info!("Connection {} closed", lost.id);
                    }
                    self.connection_lost(state).await;
                }
                Step::Disconnect => {
                    self.close(conn.take()).await;
                }
                Step::Shutdown => {
                    self.close(conn.take()).await;
                    tracing::debug!("Sync client shut down");
                    return;
                }
            }
        }
    }

    async fn poll_open(&mut self, conn: &mut Connection) -> Step {
        let wake = tokio::select! {
            command = self.commands.recv() => Wake::Command(command),
            _ = conn.heartbeat.tick() => Wake::Heartbeat,
            frame = conn.stream.next() => Wake::Frame(frame),
        };

        match wake {
            Wake::Command(None) | Wake::Command(Some(Command::Shutdown)) => Step::Shutdown,
            Wake::Command(Some(Command::Disconnect)) => Step::Disconnect,
            Wake::Command(Some(Command::Connect)) => Step::Continue,
            Wake::Command(Some(Command::Visibility(visible))) => {
                self.visible = visible;
                Step::Continue
            }
            Wake::Command(Some(Command::Send(text))) => self.write(conn, text).await,
            Wake::Heartbeat => match OutboundMessage::heartbeat(Utc::now()).encode() {
                Ok(text) => self.write(conn, text).await,
                Err(e) => {
                    tracing::warn!("Failed to encode heartbeat: {}", e);
                    Step::Continue
                }
            },
            Wake::Frame(frame) => self.on_frame(conn, frame).await,
            Wake::ReconnectDue => Step::Continue,
        }
    }

    async fn poll_idle(&mut self) -> Step {
        let wake = match self.reconnect_at {
            Some(deadline) => tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                _ = sleep_until(deadline) => Wake::ReconnectDue,
            },
            None => Wake::Command(self.commands.recv().await),
        };

        match wake {
            Wake::Command(None) | Wake::Command(Some(Command::Shutdown)) => Step::Shutdown,
            Wake::Command(Some(Command::Disconnect)) => Step::Disconnect,
            Wake::Command(Some(Command::Connect)) => {
                self.reconnector.reset();
                Step::Open
            }
            Wake::Command(Some(Command::Visibility(visible))) => {
                let became_visible = visible && !self.visible;
                self.visible = visible;
                if became_visible && !self.state.borrow().is_active() {
                    tracing::info!("Host visible again, reconnecting now");
                    self.reconnector.reset();
                    Step::Open
                } else {
                    Step::Continue
                }
            }
            Wake::Command(Some(Command::Send(_))) => {
                tracing::trace!("Not connected, dropping outbound message");
                Step::Continue
            }
            Wake::ReconnectDue => {
                self.reconnect_at = None;
                let attempt = self.reconnector.begin_attempt();
                self.shared.write().await.metrics.reconnections = self.reconnector.total_attempts();
                tracing::info!(
                    "Reconnecting... ({}/{})",
                    attempt,
                    self.reconnector.max_attempts()
                );
                Step::Open
            }
            Wake::Heartbeat | Wake::Frame(_) => Step::Continue,
        }
    }

    /// Opens a new connection. On failure the loss is handled here and
    /// `None` is returned.
    async fn open(&mut self) -> Option<Connection> {
        self.reconnect_at = None;
        self.set_state(ConnectionState::Connecting);

        let id = Uuid::new_v4();
        tracing::debug!("Opening connection {} to {}", id, self.url);

        let stream = match timeout(self.connect_timeout, connect_async(&*self.url)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                return self
                    .open_failed(SyncError::ConnectionError(e.to_string()))
                    .await;
            }
            Err(_) => {
                let reason = format!("timed out after {:?}", self.connect_timeout);
                return self.open_failed(SyncError::ConnectionError(reason)).await;
            }
        };

        let start = Instant::now() + self.heartbeat_every;
        let mut heartbeat = interval_at(start, self.heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut conn = Connection {
            id,
            stream,
            heartbeat,
        };

        self.reconnector.on_open();
        self.shared.write().await.metrics.connected_since = Some(Utc::now());
        self.set_state(ConnectionState::Open);
        tracing::info!("Live connection {} established", id);

        let request = match OutboundMessage::request_all().encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to encode state request: {}", e);
                return Some(conn);
            }
        };

        match self.write(&mut conn, request).await {
            Step::Lost(state) => {
                self.connection_lost(state).await;
                None
            }
            _ => Some(conn),
        }
    }

    async fn open_failed(&mut self, error: SyncError) -> Option<Connection> {
        tracing::warn!("Could not open {}: {}", self.url, error);
        self.connection_lost(ConnectionState::Errored).await;
        None
    }

    /// Marks the connection lost and schedules a reconnect if the budget
    /// allows.
    async fn connection_lost(&mut self, state: ConnectionState) {
        self.shared.write().await.metrics.connected_since = None;
        self.set_state(state);

        match self.reconnector.next_delay() {
            Some(delay) => {
                tracing::debug!("Next reconnect in {:?}", delay);
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                tracing::warn!(
                    "Giving up after {} reconnect attempts",
                    self.reconnector.attempts()
                );
                self.reconnect_at = None;
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    /// Explicit close: no reconnect is left behind.
    async fn close(&mut self, conn: Option<Connection>) {
        self.reconnect_at = None;

        if let Some(mut conn) = conn {
            if let Err(e) = conn.stream.close(None).await {
                tracing::debug!("Error closing connection {}: {}", conn.id, e);
            }
            tracing::info!("Live connection {} closed by client", conn.id);
        }

        self.shared.write().await.metrics.connected_since = None;
        self.set_state(ConnectionState::Disconnected);
    }

    async fn write(&self, conn: &mut Connection, text: String) -> Step {
        match conn.stream.send(Message::Text(text.into())).await {
            Ok(()) => {
                self.shared.write().await.metrics.messages_sent += 1;
                Step::Continue
            }
            Err(e) => {
                let error = SyncError::WebSocketError(e.to_string());
                tracing::warn!("Send on connection {} failed: {}", conn.id, error);
                Step::Lost(ConnectionState::Errored)
            }
        }
    }

    async fn on_frame(
        &self,
        conn: &mut Connection,
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) -> Step {
        match frame {
            Some(Ok(Message::Text(text))) => {
                self.dispatch(text.as_str()).await;
                Step::Continue
            }
            Some(Ok(Message::Binary(data))) => {
                match std::str::from_utf8(&data) {
                    Ok(text) => self.dispatch(text).await,
                    Err(e) => tracing::warn!("Dropping non UTF-8 binary frame: {}", e),
                }
                Step::Continue
            }
            Some(Ok(Message::Ping(payload))) => {
                if let Err(e) = conn.stream.send(Message::Pong(payload)).await {
                    tracing::warn!("Pong on connection {} failed: {}", conn.id, e);
                    return Step::Lost(ConnectionState::Errored);
                }
                Step::Continue
            }
            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => Step::Continue,
            Some(Ok(Message::Close(frame))) => {
                match frame {
                    Some(f) => tracing::info!("Server closed connection: {} ({})", f.reason, f.code),
                    None => tracing::info!("Server closed connection"),
                }
                Step::Lost(ConnectionState::Closed)
            }
            Some(Err(e)) => {
                let error = SyncError::WebSocketError(e.to_string());
                tracing::warn!("Connection {} lost: {}", conn.id, error);
                Step::Lost(ConnectionState::Errored)
            }
            None => Step::Lost(ConnectionState::Closed),
        }
    }

    async fn dispatch(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Dropping malformed frame: {}", e);
                return;
            }
        };

        let emissions = {
            let mut shared = self.shared.write().await;
            let Shared { live, metrics } = &mut *shared;
            apply_frame(live, metrics, &frame, Utc::now())
        };

        for emission in &emissions {
            let report = self.events.emit(emission.event, &emission.data);
            if report.failed > 0 {
                tracing::debug!(
                    "'{}' reached {} of {} handlers",
                    emission.event,
                    report.delivered,
                    report.delivered + report.failed
                );
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("Connection state {} -> {}", previous, state);
        }
    }
}
