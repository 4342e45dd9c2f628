//! # Notification WSS Client
//!
//! Keeps one live WebSocket channel to the notification endpoint, re-opens it
//! after failures, and feeds every pushed frame into the `NotificationRouter`.
//!
//! ## Design
//!
//! The public `NotificationClient` is a thin handle. All connection work happens
//! in a single driver task that owns the socket and runs the connection state
//! machine:
//!
//! ```text
//!   Disconnected ──connect──▶ Connecting ──open──▶ Open
//!        ▲                        │                  │
//!        │ exhausted              │ failed           │ closed / error
//!        │                        ▼                  ▼
//!        └───────────────────── Closed ◀─────────────┘
//!                                 │ retry timer (n × base delay)
//!                                 └──────────▶ Connecting
//! ```
//!
//! The handle sends commands to the driver over an unbounded channel and waits
//! for a oneshot acknowledgement. The driver multiplexes four event sources with
//! `tokio::select!`: handle commands, the in-flight establishment, inbound
//! frames and the pending retry timer. Because only the driver touches the
//! socket and the retry state, there is exactly one live channel at a time, and
//! an explicit `disconnect` drops both the retry timer and any half-open
//! establishment immediately. A `connect` still waiting on that establishment
//! settles with `NotifyError::Cancelled`.
//!
//! Each open channel also gets a small writer task that owns the sink half of
//! the socket. `is_connected()` requires both the `Open` state and a live
//! writer, so a transport that has silently died reads as disconnected even
//! before the driver has processed the close.

use std::future::pending;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout, Duration, Sleep};
use tokio_tungstenite::tungstenite::{protocol::Message as WsMessage, Error as WsError};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::auth::session::{decode_session_identity, CredentialContext};
use crate::configs::config_client::ClientConfig;
use crate::engine::backoff::{RetryDecision, RetryPolicy};
use crate::engine::registry::{Listener, ListenerRegistry};
use crate::engine::router::NotificationRouter;
use crate::error::NotifyError;
use crate::models::handshake::Handshake;
use crate::models::notification::Notification;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsRead = SplitStream<WsStream>;
type WsWrite = SplitSink<WsStream, WsMessage>;

/// Result type for acknowledgements from the driver.
pub type AckResult = Result<(), NotifyError>;

/// Lifecycle state of the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No channel and no reconnection scheduled.
    #[default]
    Disconnected,
    /// A channel is being established.
    Connecting,
    /// The channel is open and the handshake has been sent.
    Open,
    /// The channel was lost; a reconnection may be pending.
    Closed,
}

/// Role and credentials replayed on every reconnection.
#[derive(Debug, Clone)]
struct ConnectContext {
    role: String,
    credentials: CredentialContext,
}

enum ClientCommand {
    Connect {
        context: ConnectContext,
        responder: oneshot::Sender<AckResult>,
    },
    Disconnect {
        responder: oneshot::Sender<()>,
    },
    Send {
        message: Value,
        responder: oneshot::Sender<AckResult>,
    },
}

/// What the handle can read without a round trip to the driver.
#[derive(Default)]
struct LinkStatus {
    state: ConnectionState,
    retry_count: u32,
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
}

type SharedStatus = Arc<Mutex<LinkStatus>>;

fn lock(status: &SharedStatus) -> MutexGuard<'_, LinkStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Notification Client
///
/// Caller-owned connection manager. Create it inside a Tokio runtime, register
/// listeners, then `connect`. Listener registrations are independent of the
/// connection and survive every disconnect and reconnect.
///
/// Dropping the client stops its driver task and closes the channel.
pub struct NotificationClient {
    registry: Arc<ListenerRegistry>,
    status: SharedStatus,
    commands: mpsc::UnboundedSender<ClientCommand>,
}

impl NotificationClient {
    /// Creates a client with an empty listener registry and spawns its driver.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_registry(config, Arc::new(ListenerRegistry::new()))
    }

    /// Creates a client that dispatches into an existing registry.
    pub fn with_registry(config: ClientConfig, registry: Arc<ListenerRegistry>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let status = SharedStatus::default();

        let driver = Driver {
            policy: config.retry_policy(),
            config,
            router: NotificationRouter::new(Arc::clone(&registry)),
            status: Arc::clone(&status),
            context: None,
            opening: None,
            channel: None,
            retry_timer: None,
            retry_count: 0,
        };
        tokio::spawn(driver.run(command_rx));

        Self {
            registry,
            status,
            commands,
        }
    }

    /// # Connect
    ///
    /// Opens the channel as `role`, authenticating with the bearer token in
    /// `credentials`. Any existing channel is closed first and any scheduled
    /// reconnection is cancelled.
    ///
    /// Resolves once the channel is open and the subscribe handshake has been
    /// queued. On failure the error is returned and the retry policy takes over
    /// in the background, replaying this same role and credentials. A
    /// `disconnect` (or another `connect`) issued before the channel opens
    /// settles this call with `NotifyError::Cancelled`.
    pub async fn connect(&self, role: &str, credentials: &CredentialContext) -> AckResult {
        let context = ConnectContext {
            role: role.to_string(),
            credentials: credentials.clone(),
        };
        let (responder, rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::Connect { context, responder })
            .map_err(|_| NotifyError::ClientClosed)?;
        rx.await.unwrap_or(Err(NotifyError::ClientClosed))
    }

    /// Closes the channel, abandons any establishment in progress, cancels any
    /// pending reconnection and returns to `Disconnected`. Listeners stay
    /// registered.
    pub async fn disconnect(&self) {
        let (responder, rx) = oneshot::channel();
        if self.commands.send(ClientCommand::Disconnect { responder }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Writes an arbitrary JSON frame on the open channel.
    pub async fn send(&self, message: &Value) -> AckResult {
        let (responder, rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::Send {
                message: message.clone(),
                responder,
            })
            .map_err(|_| NotifyError::ClientClosed)?;
        rx.await.unwrap_or(Err(NotifyError::ClientClosed))
    }

    /// True only when the state is `Open` and the transport's writer is alive.
    pub fn is_connected(&self) -> bool {
        let status = lock(&self.status);
        status.state == ConnectionState::Open
            && status.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.status).state
    }

    /// Consecutive reconnection attempts since the last successful open.
    pub fn retry_count(&self) -> u32 {
        lock(&self.status).retry_count
    }

    /// Registers `listener` under `key` (`*` for every notification).
    pub fn subscribe(&self, key: &str, listener: &Listener) -> bool {
        self.registry.subscribe(key, listener)
    }

    /// Removes `listener` from `key`; effective for the very next frame.
    pub fn unsubscribe(&self, key: &str, listener: &Listener) -> bool {
        self.registry.unsubscribe(key, listener)
    }

    /// The registry this client dispatches into.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }
}

/// Reader half of an open channel plus the queue feeding its writer task.
struct Channel {
    read: WsRead,
    outbound: mpsc::UnboundedSender<WsMessage>,
}

/// An establishment in flight. Dropping it abandons the TCP/WebSocket handshake.
struct PendingOpen {
    establish: BoxFuture<'static, Result<WsStream, NotifyError>>,
    handshake: String,
    role: String,
    /// Present when an explicit `connect` is waiting on this attempt.
    responder: Option<oneshot::Sender<AckResult>>,
}

/// The single task that owns the socket and the retry state.
struct Driver {
    config: ClientConfig,
    policy: RetryPolicy,
    router: NotificationRouter,
    status: SharedStatus,
    context: Option<ConnectContext>,
    opening: Option<PendingOpen>,
    channel: Option<Channel>,
    retry_timer: Option<Pin<Box<Sleep>>>,
    retry_count: u32,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ClientCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        log::debug!("Notification client dropped; stopping driver.");
                        self.retry_timer = None;
                        self.cancel_open();
                        self.close_channel();
                        break;
                    }
                },
                result = established(&mut self.opening) => self.finish_open(result),
                frame = next_frame(&mut self.channel) => self.handle_frame(frame),
                _ = retry_due(&mut self.retry_timer) => {
                    self.retry_timer = None;
                    self.reconnect();
                }
            }
        }
    }

    fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Connect { context, responder } => {
                if self.retry_timer.take().is_some() {
                    log::debug!("Explicit connect supersedes the pending reconnection.");
                }
                self.context = Some(context.clone());
                self.begin_open(&context, Some(responder));
            }
            ClientCommand::Disconnect { responder } => {
                self.disconnect();
                let _ = responder.send(());
            }
            ClientCommand::Send { message, responder } => {
                let _ = responder.send(self.send(&message));
            }
        }
    }

    /// Closes whatever is open and starts establishing a fresh channel.
    fn begin_open(&mut self, context: &ConnectContext, responder: Option<oneshot::Sender<AckResult>>) {
        self.cancel_open();
        self.close_channel();
        self.set_state(ConnectionState::Connecting);

        let token = context.credentials.token();
        if token.is_none() {
            log::warn!("No bearer token in credentials; connecting anonymously.");
        }
        let user_id = token.and_then(decode_session_identity);

        let prepared = serde_json::to_string(&Handshake::subscribe(user_id, &context.role))
            .map_err(NotifyError::from)
            .and_then(|handshake| Ok((handshake, self.config.endpoint_url(token)?)));
        let (handshake, url) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return self.open_failed(e, responder),
        };

        log::info!("Connecting to notification endpoint: {}", self.config.endpoint);
        self.opening = Some(PendingOpen {
            establish: establish(url, self.config.connect_timeout()).boxed(),
            handshake,
            role: context.role.clone(),
            responder,
        });
    }

    /// Installs an established socket as the live channel and queues the handshake.
    fn finish_open(&mut self, result: Result<WsStream, NotifyError>) {
        let Some(pending) = self.opening.take() else {
            return;
        };
        let ws = match result {
            Ok(ws) => ws,
            Err(e) => return self.open_failed(e, pending.responder),
        };

        let (write, read) = ws.split();
        let (outbound, queue) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(write, queue));

        if outbound.send(WsMessage::Text(pending.handshake.into())).is_err() {
            return self.open_failed(NotifyError::NotConnected, pending.responder);
        }
        log::debug!("Subscribe handshake sent for role '{}'", pending.role);

        self.retry_count = 0;
        {
            let mut status = lock(&self.status);
            status.state = ConnectionState::Open;
            status.retry_count = 0;
            status.outbound = Some(outbound.clone());
        }
        self.channel = Some(Channel { read, outbound });
        log::info!("Notification channel established.");

        if let Some(responder) = pending.responder {
            let _ = responder.send(Ok(()));
        }
    }

    /// A failed establishment is a close event: report it, then consult the policy.
    fn open_failed(&mut self, error: NotifyError, responder: Option<oneshot::Sender<AckResult>>) {
        match responder {
            Some(responder) => {
                log::error!("Failed to connect to notification endpoint: {}", error);
                let _ = responder.send(Err(error));
            }
            None => log::warn!("Reconnection attempt {} failed: {}", self.retry_count, error),
        }
        self.on_channel_lost();
    }

    /// Abandons the establishment in progress, if any.
    fn cancel_open(&mut self) {
        if let Some(pending) = self.opening.take() {
            log::info!("Abandoned in-flight connection attempt.");
            if let Some(responder) = pending.responder {
                let _ = responder.send(Err(NotifyError::Cancelled));
            }
        }
    }

    fn handle_frame(&mut self, frame: Option<Result<WsMessage, WsError>>) {
        match frame {
            Some(Ok(WsMessage::Text(text))) => self.dispatch(text.as_str()),
            Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => self.dispatch(text),
                Err(e) => log::error!("Dropping binary frame that is not UTF-8: {}", e),
            },
            Some(Ok(WsMessage::Close(close))) => {
                log::warn!("Notification channel closed by server: {:?}", close);
                self.on_channel_lost();
            }
            // Ping/pong is answered by the transport.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                log::error!("Notification channel read error: {}", e);
                self.on_channel_lost();
            }
            None => {
                log::warn!("Notification channel stream ended.");
                self.on_channel_lost();
            }
        }
    }

    fn dispatch(&self, text: &str) {
        log::trace!("Received notification frame: {}", text);
        match Notification::from_json(text) {
            Ok(mut notification) => {
                self.router.route(&mut notification);
            }
            Err(e) => log::error!("Dropping malformed notification frame: {}", e),
        }
    }

    /// The close path: every lost or failed channel ends up here.
    fn on_channel_lost(&mut self) {
        self.close_channel();
        self.set_state(ConnectionState::Closed);

        match self.policy.on_close(self.retry_count) {
            RetryDecision::Retry { attempt, delay } => {
                self.retry_count = attempt;
                lock(&self.status).retry_count = attempt;
                log::info!(
                    "Attempting to reconnect ({}/{}) in {:?}...",
                    attempt,
                    self.policy.max_retries,
                    delay
                );
                self.retry_timer = Some(Box::pin(sleep(delay)));
            }
            RetryDecision::Exhausted => {
                log::error!(
                    "Maximum reconnection attempts reached ({}); staying disconnected.",
                    self.policy.max_retries
                );
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    fn reconnect(&mut self) {
        if let Some(context) = self.context.clone() {
            self.begin_open(&context, None);
        }
    }

    fn disconnect(&mut self) {
        if self.retry_timer.take().is_some() {
            log::info!("Cancelled pending reconnection.");
        }
        self.cancel_open();
        self.close_channel();
        self.context = None;
        self.set_state(ConnectionState::Disconnected);
        log::info!("Notification channel disconnected.");
    }

    fn send(&self, message: &Value) -> AckResult {
        let Some(channel) = &self.channel else {
            return Err(NotifyError::NotConnected);
        };
        channel
            .outbound
            .send(WsMessage::Text(message.to_string().into()))
            .map_err(|_| NotifyError::NotConnected)
    }

    fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            // The writer forwards the close frame and exits.
            let _ = channel.outbound.send(WsMessage::Close(None));
        }
        lock(&self.status).outbound = None;
    }

    fn set_state(&self, state: ConnectionState) {
        let mut status = lock(&self.status);
        if status.state != state {
            log::debug!("Notification channel state: {:?} -> {:?}", status.state, state);
            status.state = state;
        }
    }
}

/// TCP connect plus WebSocket handshake, bounded by `limit`.
async fn establish(url: Url, limit: Duration) -> Result<WsStream, NotifyError> {
    let connected = timeout(limit, connect_async(url.as_str()))
        .await
        .map_err(|_| NotifyError::ConnectTimeout(limit))?;
    let (ws, _response) = connected?;
    Ok(ws)
}

async fn established(opening: &mut Option<PendingOpen>) -> Result<WsStream, NotifyError> {
    match opening {
        Some(attempt) => attempt.establish.as_mut().await,
        None => pending().await,
    }
}

async fn next_frame(channel: &mut Option<Channel>) -> Option<Result<WsMessage, WsError>> {
    match channel {
        Some(channel) => channel.read.next().await,
        None => pending().await,
    }
}

async fn retry_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

/// Owns the sink half of one channel until a close frame or a write error.
async fn write_loop(mut write: WsWrite, mut queue: mpsc::UnboundedReceiver<WsMessage>) {
    while let Some(message) = queue.recv().await {
        let closing = matches!(message, WsMessage::Close(_));
        if let Err(e) = write.send(message).await {
            if !closing {
                log::error!("Failed to write to notification channel: {}", e);
            }
            return;
        }
        if closing {
            break;
        }
    }
    let _ = write.close().await;
}
