//! # Notification Test Harness
//!
//! In-process stand-ins for the notification service, used by the integration
//! tests under `tests/`. `MockNotifyServer` speaks real WebSocket on a random
//! loopback port and hands every accepted session to the test; `RefusingServer`
//! accepts TCP and hangs up immediately, so every handshake fails;
//! `StallingServer` accepts TCP and never answers, so every handshake hangs.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

/// How long tests wait for something that should happen promptly.
pub const WAIT: Duration = Duration::from_secs(5);

/// Routes `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Builds an unsigned three-segment token whose payload is `claims`.
pub fn make_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.test-signature", header, payload)
}

/// Polls `condition` every 10ms until it holds or `limit` elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// The server side of one accepted WebSocket connection.
pub struct ServerSession {
    uri: String,
    ws: WebSocketStream<TcpStream>,
}

impl ServerSession {
    /// The request target the client connected with, e.g. `/notifications?token=…`.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The path part of the request target.
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or_default()
    }

    /// A raw (not percent-decoded) query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let (_, query) = self.uri.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    /// The next text frame from the client as JSON, or `None` once the client
    /// closes (or nothing arrives within `WAIT`).
    pub async fn next_json(&mut self) -> Option<Value> {
        loop {
            let frame = timeout(WAIT, self.ws.next()).await.ok()??;
            match frame {
                Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Pushes a raw text frame to the client.
    pub async fn push_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_owned().into()))
            .await
            .expect("push to client");
    }

    /// Pushes a JSON frame to the client.
    pub async fn push_json(&mut self, value: &Value) {
        self.push_text(&value.to_string()).await;
    }

    /// Closes the connection from the server side.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// A WebSocket notification endpoint on a random loopback port.
pub struct MockNotifyServer {
    addr: SocketAddr,
    sessions: mpsc::UnboundedReceiver<ServerSession>,
    accepted: Arc<AtomicUsize>,
}

impl MockNotifyServer {
    /// Binds and starts accepting in the background.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let accepted = Arc::new(AtomicUsize::new(0));
        let (tx, sessions) = mpsc::unbounded_channel();

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);

                let uri = Arc::new(Mutex::new(String::new()));
                let slot = Arc::clone(&uri);
                let capture = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    *slot.lock().unwrap() = request.uri().to_string();
                    Ok(response)
                };

                match tokio_tungstenite::accept_hdr_async(stream, capture).await {
                    Ok(ws) => {
                        let uri = uri.lock().unwrap().clone();
                        if tx.send(ServerSession { uri, ws }).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("Mock server handshake failed: {}", e),
                }
            }
        });

        Self { addr, sessions, accepted }
    }

    /// The endpoint URL clients should use.
    pub fn endpoint(&self) -> String {
        format!("ws://{}/notifications", self.addr)
    }

    /// The next accepted session, if one arrives within `limit`.
    pub async fn next_session(&mut self, limit: Duration) -> Option<ServerSession> {
        timeout(limit, self.sessions.recv()).await.ok().flatten()
    }

    /// TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Accepts TCP connections and drops them before the WebSocket handshake.
pub struct RefusingServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl RefusingServer {
    /// Binds and starts refusing in the background.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind refusing server");
        let addr = listener.local_addr().expect("refusing server address");
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });

        Self { addr, accepted }
    }

    /// The endpoint URL clients should use.
    pub fn endpoint(&self) -> String {
        format!("ws://{}/notifications", self.addr)
    }

    /// Connection attempts seen so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Accepts TCP connections, holds them open and never answers the handshake.
pub struct StallingServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl StallingServer {
    /// Binds and starts stalling in the background.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stalling server");
        let addr = listener.local_addr().expect("stalling server address");
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });

        Self { addr, accepted }
    }

    /// The endpoint URL clients should use.
    pub fn endpoint(&self) -> String {
        format!("ws://{}/notifications", self.addr)
    }

    /// Connection attempts seen so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}
