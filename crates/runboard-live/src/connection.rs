//! Lifecycle of one runs-live websocket.
//!
//! A [`ConnectionManager`] moves `Closed -> Connecting -> Open -> Closed` and
//! is never reused. The socket itself lives on a transport task that only
//! reports what it sees; every state transition happens on the owner's side
//! when it pulls those reports through [`ConnectionManager::next_signal`].

use crate::error::LiveError;
use futures_util::StreamExt;
use runboard_core::{decode_frame, DeltaBatch, MergeSummary, RunStateStore, DEFAULT_MAX_FRAME_BYTES};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

const TRANSPORT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when the transport fails or the server hangs up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLost {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSignal {
    Opened,
    Applied(MergeSummary),
    Lost(ConnectionLost),
}

/// Receiver of decoded delta batches.
pub trait DeltaSink {
    fn merge(&mut self, batch: DeltaBatch) -> MergeSummary;
}

impl DeltaSink for RunStateStore {
    fn merge(&mut self, batch: DeltaBatch) -> MergeSummary {
        RunStateStore::merge(self, batch)
    }
}

#[derive(Debug)]
enum TransportEvent {
    Handshake,
    Frame(Vec<u8>),
    Error(String),
    Closed(Option<String>),
}

pub struct ConnectionManager {
    state: ConnectionState,
    url: Option<Url>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    shutdown: Option<oneshot::Sender<()>>,
    max_frame_bytes: usize,
    frames_applied: u64,
    malformed_frames: u64,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("frames_applied", &self.frames_applied)
            .field("malformed_frames", &self.malformed_frames)
            .finish()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            state: ConnectionState::Closed,
            url: None,
            events: None,
            shutdown: None,
            max_frame_bytes,
            frames_applied: 0,
            malformed_frames: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn frames_applied(&self) -> u64 {
        self.frames_applied
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    /// Starts connecting to `url`. Must be called from within a tokio runtime.
    pub fn open(&mut self, url: &str) -> Result<(), LiveError> {
        if self.state != ConnectionState::Closed {
            return Err(LiveError::InvalidState {
                operation: "open",
                state: self.state,
            });
        }
        if self.url.is_some() {
            return Err(LiveError::InvalidState {
                operation: "reopen",
                state: self.state,
            });
        }
        let url = parse_stream_url(url)?;

        let (event_tx, event_rx) = mpsc::channel(TRANSPORT_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let transport_url = url.clone();
        tokio::spawn(async move {
            run_transport(transport_url, event_tx, shutdown_rx).await;
        });
        info!(event = "stream_connecting", url = %url);
        self.url = Some(url);
        self.events = Some(event_rx);
        self.shutdown = Some(shutdown_tx);
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Waits for the next transport report and applies it.
    ///
    /// Frames are merged into `sink` before this returns. Malformed frames are
    /// logged and skipped without returning. Yields `None` once the manager is
    /// closed. Cancel-safe.
    pub async fn next_signal<S: DeltaSink>(&mut self, sink: &mut S) -> Option<ConnectionSignal> {
        loop {
            let events = self.events.as_mut()?;
            let Some(event) = events.recv().await else {
                return self
                    .on_close(Some("transport ended"))
                    .map(ConnectionSignal::Lost);
            };
            match event {
                TransportEvent::Handshake => {
                    if let Some(signal) = self.on_handshake() {
                        return Some(signal);
                    }
                }
                TransportEvent::Frame(raw) => {
                    if let Some(summary) = self.on_message(&raw, sink) {
                        return Some(ConnectionSignal::Applied(summary));
                    }
                }
                TransportEvent::Error(error) => {
                    if let Some(lost) = self.on_error(&error) {
                        return Some(ConnectionSignal::Lost(lost));
                    }
                }
                TransportEvent::Closed(reason) => {
                    if let Some(lost) = self.on_close(reason.as_deref()) {
                        return Some(ConnectionSignal::Lost(lost));
                    }
                }
            }
        }
    }

    pub fn on_handshake(&mut self) -> Option<ConnectionSignal> {
        if self.state != ConnectionState::Connecting {
            return None;
        }
        self.state = ConnectionState::Open;
        info!(
            event = "stream_open",
            url = %self.url.as_ref().map(Url::as_str).unwrap_or_default()
        );
        Some(ConnectionSignal::Opened)
    }

    /// Decodes one inbound frame and merges it into `sink`.
    ///
    /// Returns `None` when the frame was dropped, either because it did not
    /// parse or because the connection is not open.
    pub fn on_message<S: DeltaSink>(&mut self, raw: &[u8], sink: &mut S) -> Option<MergeSummary> {
        if self.state != ConnectionState::Open {
            debug!(event = "frame_dropped", state = %self.state, bytes = raw.len());
            return None;
        }
        match decode_frame(raw, self.max_frame_bytes) {
            Ok(batch) => {
                let summary = sink.merge(batch);
                self.frames_applied += 1;
                debug!(
                    event = "frame_applied",
                    inserted = summary.inserted,
                    replaced = summary.replaced
                );
                Some(summary)
            }
            Err(err) => {
                self.malformed_frames += 1;
                warn!(event = "malformed_frame", error = %err, bytes = raw.len());
                None
            }
        }
    }

    pub fn on_error(&mut self, error: &str) -> Option<ConnectionLost> {
        self.lose(format!("transport error: {error}"))
    }

    pub fn on_close(&mut self, reason: Option<&str>) -> Option<ConnectionLost> {
        let reason = match reason {
            Some(reason) if !reason.trim().is_empty() => format!("closed: {reason}"),
            _ => "closed by server".to_string(),
        };
        self.lose(reason)
    }

    /// Tears the connection down. Closing a closed manager is a no-op.
    pub fn close(&mut self) {
        let was = self.state;
        self.state = ConnectionState::Closed;
        self.detach();
        if was != ConnectionState::Closed {
            info!(event = "stream_closed", from = %was);
        }
    }

    fn lose(&mut self, reason: String) -> Option<ConnectionLost> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        self.state = ConnectionState::Closed;
        self.detach();
        warn!(event = "stream_lost", reason = %reason);
        Some(ConnectionLost { reason })
    }

    fn detach(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.events = None;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Accepts only `ws://` and `wss://` addresses with a host.
pub fn parse_stream_url(raw: &str) -> Result<Url, LiveError> {
    let invalid = |reason: String| LiveError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

async fn run_transport(
    url: Url,
    tx: mpsc::Sender<TransportEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let connect = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = &mut shutdown => {
            debug!(event = "stream_connect_cancelled");
            return;
        }
    };
    let (mut ws, _) = match connect {
        Ok(value) => value,
        Err(err) => {
            let _ = tx.send(TransportEvent::Error(err.to_string())).await;
            return;
        }
    };
    if tx.send(TransportEvent::Handshake).await.is_err() {
        let _ = ws.close(None).await;
        return;
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = ws.close(None).await;
                break;
            }
            msg = ws.next() => {
                let (event, last) = match msg {
                    Some(Ok(Message::Text(text))) => (Some(TransportEvent::Frame(text.into_bytes())), false),
                    Some(Ok(Message::Binary(bytes))) => (Some(TransportEvent::Frame(bytes)), false),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map(|frame| {
                            format!("{} {}", u16::from(frame.code), frame.reason)
                        });
                        (Some(TransportEvent::Closed(reason)), true)
                    }
                    Some(Ok(_)) => (None, false),
                    Some(Err(err)) => (Some(TransportEvent::Error(err.to_string())), true),
                    None => (Some(TransportEvent::Closed(None)), true),
                };
                if let Some(event) = event {
                    if tx.send(event).await.is_err() {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
                if last {
                    break;
                }
            }
        }
    }
}
