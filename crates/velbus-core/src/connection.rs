//! Gateway connection manager.
//!
//! Owns the single patch-stream WebSocket. The background loop connects,
//! replays a subscribe request for every top-level key that has observers,
//! and queues each inbound operation for a dispatch worker that applies
//! them one at a time, in arrival order. Any transport failure drops the connection, waits the fixed reconnect
//! delay and starts over; the loop only ends on [`ConnectionManager::shutdown`].
//!
//! # Example
//!
//! ```rust,ignore
//! use velbus_core::{ConnectionConfig, ConnectionManager, observer};
//!
//! let manager = ConnectionManager::new(ConnectionConfig::new(ws_url));
//! manager.start();
//!
//! let sent = manager.register(["0b", "1", "relay"], observer(|relay| {
//!     println!("relay is now {relay:?}");
//! }))?;
//! sent.await??;
//! ```

use std::sync::{Arc, PoisonError};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use velbus_api::websocket::{self, Message, WsSink, WsSource};

use crate::config::ConnectionConfig;
use crate::dispatch::Dispatcher;
use crate::error::CoreError;
use crate::subscription::Observer;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// ── ConnectionManager ────────────────────────────────────────────────

/// Handle to the gateway patch stream.
///
/// Cheaply cloneable via `Arc<ConnectionInner>`. Must be used from inside
/// a tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    config: ConnectionConfig,
    dispatcher: Arc<Dispatcher>,
    /// Write half of the live connection; `None` while disconnected.
    sink: Mutex<Option<WsSink>>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager. Does NOT connect -- call [`start()`](Self::start).
    pub fn new(config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(ConnectionInner {
                config,
                dispatcher: Arc::new(Dispatcher::new()),
                sink: Mutex::new(None),
                state,
                cancel: CancellationToken::new(),
                task: std::sync::Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// The dispatcher owning the mirrored tree and the subscription trie.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the connect/read/reconnect loop. Calling it again is a no-op.
    pub fn start(&self) {
        let mut task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(run(inner)));
    }

    /// Stop the background loop and close the connection.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "connection task ended abnormally");
            }
        }
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register `observer` for changes at or below `path`.
    ///
    /// The observer is installed immediately. The returned handle resolves
    /// once the subscribe request for the path's top-level key has been
    /// written to the socket; when disconnected (or for the root path) it
    /// resolves right away and the request goes out on the next connect.
    pub fn register<I, S>(
        &self,
        path: I,
        observer: Observer,
    ) -> Result<JoinHandle<Result<(), CoreError>>, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        if path.iter().any(String::is_empty) {
            return Err(CoreError::InvalidPath {
                path,
                reason: "path components must not be empty".into(),
            });
        }

        self.inner.dispatcher.register(&path, observer);
        debug!(path = ?path, "observer registered");

        let inner = Arc::clone(&self.inner);
        let top_level_key = path.into_iter().next();
        Ok(tokio::spawn(async move {
            match top_level_key {
                Some(key) => inner.send_subscribe(&key).await,
                None => Ok(()),
            }
        }))
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → replay → read → on failure, wait → reconnect.
async fn run(inner: Arc<ConnectionInner>) {
    let delay = inner.config.reconnect.delay;

    loop {
        inner.state.send_replace(ConnectionState::Connecting);

        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            result = inner.connect_and_read() => {
                match result {
                    Ok(()) => info!("WebSocket closed by gateway"),
                    Err(e) => error!(error = %e, "WebSocket failed"),
                }
            }
        }

        inner.drop_connection().await;

        debug!(delay_ms = delay.as_millis(), "Waiting before reconnect");
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    if let Some(mut sink) = inner.sink.lock().await.take() {
        let _ = sink.close().await;
    }
    inner.state.send_replace(ConnectionState::Disconnected);
    debug!("WebSocket loop exiting");
}

impl ConnectionInner {
    /// One connection lifecycle, from handshake until the stream ends.
    async fn connect_and_read(&self) -> Result<(), CoreError> {
        let url = &self.config.websocket_url;
        let (sink, source) = websocket::connect(url, &self.config.tls).await.map_err(|e| {
            CoreError::ConnectionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        if self.config.reset_state_on_connect {
            self.dispatcher.reset_state().await;
            debug!("mirrored state reset for new connection");
        }

        *self.sink.lock().await = Some(sink);
        self.state.send_replace(ConnectionState::Connected);

        let keys = self.dispatcher.top_level_keys();
        for key in &keys {
            self.send_subscribe(key).await?;
        }
        info!(subscriptions = keys.len(), "Subscriptions replayed");

        let (queue, worker) = DispatchQueue::spawn(Arc::clone(&self.dispatcher));
        let result = read_frames(source, &queue).await;

        // This connection's operations land before any reset on the next one.
        drop(queue);
        if let Err(e) = worker.await {
            warn!(error = %e, "dispatch worker ended abnormally");
        }
        result
    }

    /// Ask the gateway to stream `key`. A no-op while disconnected.
    async fn send_subscribe(&self, key: &str) -> Result<(), CoreError> {
        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            debug!(key, "not connected, subscribe deferred to next connect");
            return Ok(());
        };

        websocket::send_text(sink, websocket::subscribe_request(key)).await?;
        debug!(key, "subscribe request sent");
        Ok(())
    }

    async fn drop_connection(&self) {
        *self.sink.lock().await = None;
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

// ── Frame handling ───────────────────────────────────────────────────

async fn read_frames(mut source: WsSource, queue: &DispatchQueue) -> Result<(), CoreError> {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                queue.schedule_frame(&text);
            }
            Ok(Message::Close(frame)) => {
                if let Some(ref cf) = frame {
                    info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame received");
                } else {
                    info!("WebSocket close frame received (no payload)");
                }
                return Ok(());
            }
            Ok(Message::Binary(bytes)) => {
                warn!(len = bytes.len(), "Discarding binary frame");
            }
            Ok(_) => {
                // Ping/Pong -- tungstenite answers pings itself
                trace!("WebSocket control frame");
            }
            Err(e) => {
                return Err(velbus_api::Error::WebSocketReceive(e.to_string()).into());
            }
        }
    }

    info!("WebSocket stream ended");
    Ok(())
}

/// Single-writer queue in front of the [`Dispatcher`].
///
/// Each operation is still its own unit of work, but one worker task
/// runs them in the order they were queued, so later operations in a
/// frame (or in a later frame) always see the effect of earlier ones.
/// The worker exits once the queue is dropped and drained.
pub(crate) struct DispatchQueue {
    tx: mpsc::UnboundedSender<Value>,
}

impl DispatchQueue {
    pub(crate) fn spawn(dispatcher: Arc<Dispatcher>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let worker = tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                // Failures are logged by the dispatcher.
                let _ = dispatcher.dispatch_value(raw).await;
            }
        });
        (Self { tx }, worker)
    }

    /// Decode one inbound frame and queue its operations in order.
    ///
    /// Returns the number of operations queued. Undecodable frames are
    /// logged and dropped; the connection stays up.
    pub(crate) fn schedule_frame(&self, text: &str) -> usize {
        let ops = match websocket::decode_frame(text) {
            Ok(ops) => ops,
            Err(e) => {
                error!(error = %e, "Discarding inbound frame");
                return 0;
            }
        };

        let mut queued = 0;
        for raw in ops {
            if self.tx.send(raw).is_err() {
                warn!("dispatch worker gone, dropping operation");
                break;
            }
            queued += 1;
        }
        queued
    }
}

// ── Tests ────────────────────────────────────────────────────────────
