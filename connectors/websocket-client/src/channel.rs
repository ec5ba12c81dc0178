use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError, RwLock, Weak,
    },
};

use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use storefront_core::PushHandler;
use strum::Display;
use thiserror::Error;
use tokio::{
    net::TcpStream,
    select,
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::{
    backoff::Backoff,
    config::ChannelConfig,
    endpoint::Endpoint,
    sender::{ChannelSender, OutboundSlot},
};

/// Connection state of a [`SyncChannel`]
#[derive(Debug, Clone, PartialEq, Display)]
pub enum ConnectionState {
    Disconnected,
    #[strum(serialize = "Connecting")]
    Connecting { url: String, attempt: u32 },
    #[strum(serialize = "Open")]
    Open { url: String },
    Closing,
    #[strum(serialize = "Error")]
    Error(ConnectionError),
}

/// Why a connection attempt or an open connection failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out")]
    Timeout,
    #[error("websocket error: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),
    #[error("a channel to {0} is already open")]
    AlreadyOpen(String),
    #[error("channel already has a subscriber")]
    AlreadySubscribed,
    #[error("channel is closed")]
    Closed,
    #[error("gave up reconnecting after {0} attempts")]
    RetriesExhausted(u32),
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Transitions retained for a lagging [`SyncChannel::transitions`] receiver
const TRANSITION_BUFFER: usize = 64;

/// Endpoints with a live channel in this process
static ACTIVE_ENDPOINTS: Mutex<BTreeSet<String>> = Mutex::new(BTreeSet::new());

/// Exclusive claim on an endpoint, released on drop
struct EndpointLease(String);

impl EndpointLease {
    fn acquire(url: &str) -> Result<Self, ChannelError> {
        let mut active = ACTIVE_ENDPOINTS.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(url.to_string()) {
            return Err(ChannelError::AlreadyOpen(url.to_string()));
        }
        Ok(Self(url.to_string()))
    }
}

impl Drop for EndpointLease {
    fn drop(&mut self) { ACTIVE_ENDPOINTS.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.0); }
}

struct Inner {
    url: String,
    config: ChannelConfig,
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    handler: RwLock<Option<(u64, Arc<dyn PushHandler>)>>,
    next_subscription: AtomicU64,
    outbound: OutboundSlot,
    shutdown: watch::Sender<bool>,
    opened: AtomicU64,
    exhausted: AtomicBool,
}

/// A single persistent connection to a push endpoint, reconnecting until closed.
///
/// Inbound text frames are handed to the one registered [`PushHandler`]. Frames arriving while
/// nobody is subscribed, or while the connection is down, are lost.
pub struct SyncChannel {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
    lease: Mutex<Option<EndpointLease>>,
}

impl SyncChannel {
    /// Open a channel and start connecting in the background. Must be called within a tokio runtime.
    pub fn open(endpoint: Endpoint, config: ChannelConfig) -> Result<Self, ChannelError> {
        let url = endpoint.as_str().to_string();
        let lease = EndpointLease::acquire(&url)?;
        info!("Opening sync channel to {}", url);

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            url,
            config,
            state,
            transitions,
            handler: RwLock::new(None),
            next_subscription: AtomicU64::new(0),
            outbound: Arc::new(Mutex::new(None)),
            shutdown,
            opened: AtomicU64::new(0),
            exhausted: AtomicBool::new(false),
        });

        let task = tokio::spawn(Self::run_connection_loop(inner.clone()));
        Ok(Self { inner, task: Mutex::new(Some(task)), lease: Mutex::new(Some(lease)) })
    }

    pub fn url(&self) -> &str { &self.inner.url }

    /// Connection state as a watch receiver
    pub fn state(&self) -> watch::Receiver<ConnectionState> { self.inner.state.subscribe() }

    /// Every state change from now on, in order. Unlike [`state`](Self::state), transitions that
    /// follow each other closely are not coalesced.
    pub fn transitions(&self) -> broadcast::Receiver<ConnectionState> { self.inner.transitions.subscribe() }

    pub fn is_open(&self) -> bool { matches!(*self.inner.state.borrow(), ConnectionState::Open { .. }) }

    /// Number of times a connection has been established. Anything above one means at least one
    /// reconnect happened, and with it a possible gap in delivery.
    pub fn opened_count(&self) -> u64 { self.inner.opened.load(Ordering::Acquire) }

    /// True once a bounded retry policy has given up
    pub fn retries_exhausted(&self) -> bool { self.inner.exhausted.load(Ordering::Acquire) }

    pub fn sender(&self) -> ChannelSender { ChannelSender::new(self.inner.outbound.clone(), self.inner.url.clone()) }

    /// Register the channel's single consumer
    pub fn subscribe(&self, handler: Arc<dyn PushHandler>) -> Result<ChannelSubscription, ChannelError> {
        let mut slot = self.inner.handler.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("Rejecting second subscriber on {}", self.inner.url);
            return Err(ChannelError::AlreadySubscribed);
        }
        let id = self.inner.next_subscription.fetch_add(1, Ordering::AcqRel);
        *slot = Some((id, handler));
        debug!("Subscriber {} registered on {}", id, self.inner.url);
        Ok(ChannelSubscription { inner: Arc::downgrade(&self.inner), id })
    }

    /// Wait until the channel is open. Fails if it is closed, or gives up reconnecting, first.
    pub async fn wait_open(&self) -> Result<(), ChannelError> {
        let mut state = self.inner.state.subscribe();
        let inner = self.inner.clone();
        let open = state
            .wait_for(move |state| match state {
                ConnectionState::Open { .. } => true,
                ConnectionState::Disconnected => inner.is_finished(),
                _ => false,
            })
            .await
            .map(|state| matches!(*state, ConnectionState::Open { .. }));

        match open {
            Ok(true) => Ok(()),
            _ if self.retries_exhausted() => Err(ChannelError::RetriesExhausted(self.inner.config.max_retries.unwrap_or_default())),
            _ => Err(ChannelError::Closed),
        }
    }

    /// Tear the channel down: disarms any pending reconnect, abandons an in-flight connection
    /// attempt and leaves the state at `Disconnected`. Safe to call more than once.
    pub async fn close(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(task) = task else {
            debug!("Sync channel to {} already closed", self.inner.url);
            return;
        };
        info!("Closing sync channel to {}", self.inner.url);
        self.inner.shutdown.send_replace(true);

        match task.await {
            Ok(()) => info!("Sync channel to {} closed", self.inner.url),
            Err(e) => warn!("Connection task join error during close: {}", e),
        }
        self.inner.outbound.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.inner.set_state(ConnectionState::Disconnected);
        self.lease.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Main connection loop with automatic reconnection
    async fn run_connection_loop(inner: Arc<Inner>) {
        let mut shutdown = inner.shutdown.subscribe();
        let mut backoff = Backoff::new(&inner.config);
        info!("Starting connection loop to {}", inner.url);
        // attempts since the last successful open
        let mut attempt = 0;

        loop {
            attempt += 1;
            let opens = inner.opened.load(Ordering::Acquire);
            let result = select! {
                _ = stopped(&mut shutdown) => break,
                result = Self::connect_once(&inner, &mut backoff, attempt) => result,
            };
            if inner.opened.load(Ordering::Acquire) != opens {
                attempt = 0;
            }
            inner.outbound.lock().unwrap_or_else(PoisonError::into_inner).take();

            match result {
                Ok(()) => info!("Connection to {} ended", inner.url),
                Err(e) => {
                    error!("Connection to {} failed: {}", inner.url, e);
                    inner.set_state(ConnectionState::Error(e));
                }
            }
            inner.set_state(ConnectionState::Disconnected);

            let Some(delay) = backoff.next_delay() else {
                warn!("Giving up on {} after {} failed attempts", inner.url, backoff.attempts());
                inner.exhausted.store(true, Ordering::Release);
                break;
            };
            info!("Reconnecting to {} in {:?}", inner.url, delay);
            select! {
                _ = stopped(&mut shutdown) => break,
                _ = sleep(delay) => {}
            }
        }

        inner.outbound.lock().unwrap_or_else(PoisonError::into_inner).take();
        inner.set_state(ConnectionState::Disconnected);
    }

    /// Attempt a single connection and serve it until it ends
    async fn connect_once(inner: &Arc<Inner>, backoff: &mut Backoff, attempt: u32) -> Result<(), ConnectionError> {
        info!("Attempting to connect to {} (attempt {})", inner.url, attempt);
        inner.set_state(ConnectionState::Connecting { url: inner.url.clone(), attempt });

        let (ws_stream, _) = timeout(inner.config.connect_timeout, connect_async(inner.url.as_str()))
            .await
            .map_err(|_| ConnectionError::Timeout)?
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;
        info!("WebSocket handshake completed with {}", inner.url);

        let (mut sink, mut stream) = ws_stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        *inner.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(outgoing_tx);

        backoff.reset();
        inner.opened.fetch_add(1, Ordering::AcqRel);
        inner.set_state(ConnectionState::Open { url: inner.url.clone() });

        loop {
            select! {
                Some(text) = outgoing_rx.recv() => {
                    sink.send(Message::text(text)).await.map_err(|e| ConnectionError::Protocol(e.to_string()))?;
                }
                frame = stream.next() => {
                    match Self::handle_incoming_frame(inner, frame, &mut sink).await? {
                        FrameResult::Continue => continue,
                        FrameResult::Break => break,
                    }
                }
            }
        }

        inner.set_state(ConnectionState::Closing);
        Ok(())
    }

    async fn handle_incoming_frame(
        inner: &Arc<Inner>,
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
        sink: &mut WsSink,
    ) -> Result<FrameResult, ConnectionError> {
        match frame {
            Some(Ok(Message::Text(text))) => {
                inner.deliver(text.as_str());
                Ok(FrameResult::Continue)
            }
            Some(Ok(Message::Binary(data))) => {
                match std::str::from_utf8(&data) {
                    Ok(text) => inner.deliver(text),
                    Err(_) => warn!("Dropping non UTF-8 binary frame of {} bytes from {}", data.len(), inner.url),
                }
                Ok(FrameResult::Continue)
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                sink.send(Message::Pong(data)).await.map_err(|e| ConnectionError::Protocol(e.to_string()))?;
                Ok(FrameResult::Continue)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(FrameResult::Continue)
            }
            Some(Ok(Message::Close(frame))) => {
                info!("Connection to {} closed by server: {:?}", inner.url, frame);
                Ok(FrameResult::Break)
            }
            Some(Ok(Message::Frame(_))) => Ok(FrameResult::Continue),
            Some(Err(e)) => Err(ConnectionError::Protocol(e.to_string())),
            None => {
                info!("WebSocket stream from {} ended", inner.url);
                Ok(FrameResult::Break)
            }
        }
    }
}

impl Inner {
    /// Publish a state. Watchers are always woken; repeats are left out of the transition log.
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state.clone());
        if previous != state {
            let _ = self.transitions.send(state);
        }
    }

    fn deliver(&self, payload: &str) {
        let handler = self.handler.read().unwrap_or_else(PoisonError::into_inner).as_ref().map(|(_, handler)| handler.clone());
        match handler {
            Some(handler) => handler.handle_push(payload),
            None => debug!("No subscriber on {}, dropping frame", self.url),
        }
    }

    /// The connection loop has stopped for good
    fn is_finished(&self) -> bool { *self.shutdown.borrow() || self.exhausted.load(Ordering::Acquire) }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) { let _ = shutdown.wait_for(|stop| *stop).await; }

#[derive(Debug)]
enum FrameResult {
    Continue,
    Break,
}

/// Registration of a channel's consumer. Dropping it unsubscribes.
pub struct ChannelSubscription {
    inner: Weak<Inner>,
    id: u64,
}

impl ChannelSubscription {
    pub fn unsubscribe(self) { drop(self); }
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else { return };
        let mut slot = inner.handler.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(id, _)| *id == self.id) {
            *slot = None;
            debug!("Subscriber {} released from {}", self.id, inner.url);
        }
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            debug!("Sync channel dropped, requesting shutdown");
            self.inner.shutdown.send_replace(true);
            task.abort();
        }
    }
}
