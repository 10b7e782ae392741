use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::{SinkExt, StreamExt};
use snafu::{ResultExt, Snafu};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use url::Url;

use super::ids::ConnectionId;

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChannelError {
    #[snafu(display("failed to open channel to {address} on `{stage}`: {source}"))]
    Connect {
        stage: &'static str,
        address: String,
        source: tungstenite::Error,
    },
    #[snafu(display("failed to write channel frame on `{stage}`: {source}"))]
    Send {
        stage: &'static str,
        source: tungstenite::Error,
    },
    #[snafu(display("channel read failed on `{stage}`: {source}"))]
    Receive {
        stage: &'static str,
        source: tungstenite::Error,
    },
}

/// Connection lifecycle, mirroring the usual WebSocket ready states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Ready state shared between the owning handle and the worker driving the socket.
#[derive(Debug, Clone)]
pub struct SharedReadyState(Arc<AtomicU8>);

impl SharedReadyState {
    pub fn new(state: ReadyState) -> Self {
        Self(Arc::new(AtomicU8::new(state.as_u8())))
    }

    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ReadyState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Moves from `from` to `to` only if the state is still `from`.
    pub fn transition(&self, from: ReadyState, to: ReadyState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Text(String),
    Error(String),
    Closed,
}

/// A channel event tagged with the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEventMapped {
    pub connection_id: ConnectionId,
    pub event: ChannelEvent,
}

/// Owner side of one connection.
///
/// Dropping the handle asks the worker to close the socket but does not wait for it;
/// use [`ChannelHandle::closed`] when the close handshake has to finish.
pub struct ChannelHandle {
    connection_id: ConnectionId,
    address: Url,
    ready_state: SharedReadyState,
    outbound_tx: mpsc::UnboundedSender<String>,
    close_tx: Option<oneshot::Sender<()>>,
    finished_rx: Option<oneshot::Receiver<()>>,
}

impl ChannelHandle {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state.get()
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Queues one text frame. Returns false when the connection is not open.
    pub fn send(&self, text: impl Into<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.outbound_tx.send(text.into()).is_ok()
    }

    /// Requests a close. Returns false when a close was already requested.
    pub fn close(&mut self) -> bool {
        let Some(close_tx) = self.close_tx.take() else {
            return false;
        };
        if self.ready_state() != ReadyState::Closed {
            self.ready_state.set(ReadyState::Closing);
        }
        close_tx.send(()).is_ok()
    }

    /// Resolves once the worker side of this connection is gone.
    pub async fn closed(&mut self) {
        if let Some(finished_rx) = self.finished_rx.take() {
            let _ = finished_rx.await;
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
    }
}

/// Worker side of one connection: where outbound frames arrive and events go out.
pub struct ChannelEndpoint {
    pub connection_id: ConnectionId,
    pub address: Url,
    pub ready_state: SharedReadyState,
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    pub close_rx: oneshot::Receiver<()>,
    pub events_tx: mpsc::UnboundedSender<ChannelEventMapped>,
    // Dropped with the endpoint, which wakes `ChannelHandle::closed`.
    _finished_tx: oneshot::Sender<()>,
}

impl ChannelEndpoint {
    /// Forwards one event to the owner. Returns false once the owner is gone.
    pub fn emit(&self, event: ChannelEvent) -> bool {
        self.events_tx
            .send(ChannelEventMapped {
                connection_id: self.connection_id,
                event,
            })
            .is_ok()
    }
}

/// Everything a connector needs to open one connection.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub connection_id: ConnectionId,
    pub address: Url,
    pub events_tx: mpsc::UnboundedSender<ChannelEventMapped>,
}

pub fn make_channel(request: ConnectRequest) -> (ChannelHandle, ChannelEndpoint) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = oneshot::channel();
    let (finished_tx, finished_rx) = oneshot::channel();
    let ready_state = SharedReadyState::new(ReadyState::Connecting);

    let handle = ChannelHandle {
        connection_id: request.connection_id,
        address: request.address.clone(),
        ready_state: ready_state.clone(),
        outbound_tx,
        close_tx: Some(close_tx),
        finished_rx: Some(finished_rx),
    };
    let endpoint = ChannelEndpoint {
        connection_id: request.connection_id,
        address: request.address,
        ready_state,
        outbound_rx,
        close_rx,
        events_tx: request.events_tx,
        _finished_tx: finished_tx,
    };
    (handle, endpoint)
}

/// Opens realtime channels. The returned handle starts out `Connecting`.
pub trait ChannelConnector: Send + Sync {
    fn connect(&self, request: ConnectRequest) -> ChannelHandle;
}

/// Connector backed by `tokio-tungstenite`. Must be called inside a Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl ChannelConnector for WebSocketConnector {
    fn connect(&self, request: ConnectRequest) -> ChannelHandle {
        let (handle, endpoint) = make_channel(request);
        tokio::spawn(run_channel_worker(endpoint));
        handle
    }
}

async fn run_channel_worker(mut endpoint: ChannelEndpoint) {
    let connection_id = endpoint.connection_id;
    tracing::info!(connection_id = %connection_id, address = %endpoint.address, "opening channel");

    if let Err(error) = drive_socket(&mut endpoint).await {
        tracing::warn!(connection_id = %connection_id, error = %error, "channel failed");
        endpoint.emit(ChannelEvent::Error(error.to_string()));
    }

    endpoint.ready_state.set(ReadyState::Closed);
    endpoint.emit(ChannelEvent::Closed);
    tracing::info!(connection_id = %connection_id, "channel closed");
}

async fn drive_socket(endpoint: &mut ChannelEndpoint) -> ChannelResult<()> {
    let (stream, _response) = connect_async(endpoint.address.as_str())
        .await
        .context(ConnectSnafu {
            stage: "connect-channel",
            address: endpoint.address.to_string(),
        })?;

    // A close requested during the handshake keeps the handle out of `Open`.
    if endpoint
        .ready_state
        .transition(ReadyState::Connecting, ReadyState::Open)
    {
        endpoint.emit(ChannelEvent::Opened);
    }

    let (mut sink, mut source) = stream.split();
    let mut close_requested = false;

    loop {
        tokio::select! {
            _ = &mut endpoint.close_rx, if !close_requested => {
                close_requested = true;
                endpoint.ready_state.set(ReadyState::Closing);
                tracing::debug!(connection_id = %endpoint.connection_id, "close requested");
                sink.send(WsMessage::Close(None)).await.context(SendSnafu {
                    stage: "send-close-frame",
                })?;
            }
            Some(frame) = endpoint.outbound_rx.recv() => {
                sink.send(WsMessage::Text(frame)).await.context(SendSnafu {
                    stage: "send-text-frame",
                })?;
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        endpoint.emit(ChannelEvent::Text(text));
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        // Flushes the close reply tungstenite queued for the peer.
                        let _ = sink.close().await;
                        return Ok(());
                    }
                    None => return Ok(()),
                    // Pings are answered by tungstenite; binary frames carry nothing for us.
                    Some(Ok(_)) => {}
                    Some(Err(tungstenite::Error::ConnectionClosed)) => return Ok(()),
                    Some(Err(error)) => {
                        return Err(error).context(ReceiveSnafu {
                            stage: "read-channel-frame",
                        });
                    }
                }
            }
        }
    }
}
