use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SendError;
use crate::protocol::{self, Request, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Delivered to the event loop, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    State(ConnectionState),
    Response(Response),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Pause between a failed or dropped connection and the next attempt.
    pub reconnect_delay_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            reconnect_delay_ms: 2000,
        }
    }
}

/// Persistent WebSocket link to the phrase/speech service.
///
/// The transport runs on its own tokio runtime. The owner never blocks:
/// [`send`](Self::send) only enqueues, and inbound traffic is drained from
/// [`events`](Self::events) with `try_recv`.
pub struct ProtocolChannel {
    runtime: Option<tokio::runtime::Runtime>,
    outgoing: mpsc::UnboundedSender<String>,
    events: Receiver<ChannelEvent>,
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
}

impl ProtocolChannel {
    pub fn connect(url: &str, config: &ChannelConfig) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("gazetalk-ws")
            .enable_all()
            .build()?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let transport = Transport {
            url: url.to_string(),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            outgoing: out_rx,
            events: event_tx,
            state: state_tx,
            shutdown: shutdown_rx,
        };
        runtime.spawn(transport.run());

        Ok(ProtocolChannel {
            runtime: Some(runtime),
            outgoing: out_tx,
            events: event_rx,
            state: state_rx,
            shutdown: shutdown_tx,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn events(&self) -> &Receiver<ChannelEvent> {
        &self.events
    }

    /// Serialize and enqueue `request`. Dropped with `NotConnected` while the link is down.
    pub fn send(&self, request: &Request) -> Result<(), SendError> {
        if self.state() != ConnectionState::Connected {
            return Err(SendError::NotConnected);
        }
        let text = request
            .encode()
            .map_err(|e| SendError::Encode(e.to_string()))?;
        log::debug!("-> {}", request.request_type());
        self.outgoing.send(text).map_err(|_| SendError::Closed)
    }

    /// Stop the transport. No events are produced afterwards.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_millis(500));
            log::info!("Protocol channel stopped");
        }
    }
}

impl Drop for ProtocolChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decode an inbound frame, logging and dropping anything that is not a
/// recognised response.
pub fn on_message(raw: &str) -> Option<Response> {
    match protocol::decode(raw) {
        Ok(response) => Some(response),
        Err(e) if e.is_benign() => {
            log::debug!("Ignoring frame: {e}");
            None
        }
        Err(e) => {
            log::warn!("Dropping frame: {e}");
            None
        }
    }
}

enum SessionEnd {
    Dropped,
    Shutdown,
}

struct Transport {
    url: String,
    reconnect_delay: Duration,
    outgoing: mpsc::UnboundedReceiver<String>,
    events: Sender<ChannelEvent>,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Receiver<bool>,
}

impl Transport {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = tokio::select! {
                _ = shutdown_requested(&mut self.shutdown) => break,
                attempt = connect_async(self.url.as_str()) => attempt,
            };

            match attempt {
                Ok((ws, _)) => {
                    log::info!("Connected to {}", self.url);
                    self.set_state(ConnectionState::Connected);
                    if let SessionEnd::Shutdown = self.session(ws).await {
                        break;
                    }
                }
                Err(e) => log::warn!("Failed to connect to {}: {e}", self.url),
            }

            self.set_state(ConnectionState::Disconnected);
            let mut dropped = 0;
            while self.outgoing.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                log::warn!("Dropped {dropped} queued request(s) while disconnected");
            }

            tokio::select! {
                _ = shutdown_requested(&mut self.shutdown) => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn session<S>(&mut self, ws: tokio_tungstenite::WebSocketStream<S>) -> SessionEnd
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws.split();
        loop {
            tokio::select! {
                _ = shutdown_requested(&mut self.shutdown) => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
                out = self.outgoing.recv() => {
                    let Some(text) = out else {
                        return SessionEnd::Shutdown;
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        log::warn!("Send failed, reconnecting: {e}");
                        return SessionEnd::Dropped;
                    }
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(response) = on_message(&text) {
                            log::debug!("<- {}", response.request_type());
                            if self.events.send(ChannelEvent::Response(response)).is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("Connection closed by {}", self.url);
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("Connection error: {e}");
                        return SessionEnd::Dropped;
                    }
                },
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if *self.state.borrow() != state {
            self.state.send_replace(state);
            let _ = self.events.send(ChannelEvent::State(state));
        }
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
