// src/services/push_listener.rs
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use tracing;

use crate::{
    errors::{InboxError, InboxResult},
    models::notification::Notification,
};

pub const NEW_NOTIFICATION_EVENT: &str = "new_notification";

/// A live transport delivering new notifications.
#[async_trait]
pub trait PushChannel: Send {
    /// Next notification from the channel, `Ok(None)` once it has closed.
    async fn next_notification(&mut self) -> InboxResult<Option<Notification>>;

    async fn close(&mut self) {}
}

/// In-process channel fed by a `broadcast::Sender`.
pub struct BroadcastPushChannel {
    receiver: broadcast::Receiver<Notification>,
}

impl BroadcastPushChannel {
    pub fn new(receiver: broadcast::Receiver<Notification>) -> Self {
        Self { receiver }
    }

    pub fn channel(capacity: usize) -> (broadcast::Sender<Notification>, Self) {
        let (sender, receiver) = broadcast::channel(capacity);
        (sender, Self::new(receiver))
    }
}

#[async_trait]
impl PushChannel for BroadcastPushChannel {
    async fn next_notification(&mut self) -> InboxResult<Option<Notification>> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Ok(Some(notification)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The next poll brings the counter back in line.
                    tracing::warn!("Push listener lagged, {} notifications skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketIoFrame {
    Open(Value),
    Close,
    Ping,
    Pong,
    Noop,
    Connected { namespace: String },
    Disconnected { namespace: String },
    Event { namespace: String, name: String, payload: Value },
    ConnectError { namespace: String, message: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unsupported packet: {0}")]
    Unsupported(String),

    #[error("malformed event payload: {0}")]
    MalformedEvent(String),
}

/// Decodes one Engine.IO v4 text frame, including the Socket.IO packet it carries.
pub fn decode_frame(text: &str) -> Result<SocketIoFrame, FrameError> {
    let Some(kind) = text.chars().next() else {
        return Err(FrameError::Empty);
    };
    let rest = &text[kind.len_utf8()..];

    match kind {
        '0' => Ok(SocketIoFrame::Open(serde_json::from_str(rest).unwrap_or(Value::Null))),
        '1' => Ok(SocketIoFrame::Close),
        '2' => Ok(SocketIoFrame::Ping),
        '3' => Ok(SocketIoFrame::Pong),
        '4' => decode_packet(rest),
        '6' => Ok(SocketIoFrame::Noop),
        _ => Err(FrameError::Unsupported(text.chars().take(16).collect())),
    }
}

fn decode_packet(body: &str) -> Result<SocketIoFrame, FrameError> {
    let Some(kind) = body.chars().next() else {
        return Err(FrameError::Empty);
    };
    let rest = &body[kind.len_utf8()..];

    let (namespace, data) = if rest.starts_with('/') {
        match rest.find(',') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        }
    } else {
        ("/", rest)
    };
    let namespace = namespace.to_string();

    match kind {
        '0' => Ok(SocketIoFrame::Connected { namespace }),
        '1' => Ok(SocketIoFrame::Disconnected { namespace }),
        '2' => {
            // optional ack id precedes the array
            let data = data.trim_start_matches(|c: char| c.is_ascii_digit());
            let value: Value =
                serde_json::from_str(data).map_err(|e| FrameError::MalformedEvent(e.to_string()))?;
            let mut items = match value {
                Value::Array(items) if !items.is_empty() => items.into_iter(),
                _ => return Err(FrameError::MalformedEvent("expected [name, payload]".to_string())),
            };
            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => return Err(FrameError::MalformedEvent("event name is not a string".to_string())),
            };
            Ok(SocketIoFrame::Event {
                namespace,
                name,
                payload: items.next().unwrap_or(Value::Null),
            })
        }
        '4' => Ok(SocketIoFrame::ConnectError {
            namespace,
            message: data.to_string(),
        }),
        other => Err(FrameError::Unsupported(format!("4{}", other))),
    }
}

pub fn connect_packet(namespace: &str) -> String {
    if namespace == "/" {
        "40".to_string()
    } else {
        format!("40{},", namespace)
    }
}

pub fn disconnect_packet(namespace: &str) -> String {
    if namespace == "/" {
        "41".to_string()
    } else {
        format!("41{},", namespace)
    }
}

/// Socket.IO client over a plain websocket, joined to one namespace.
pub struct SocketIoChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    namespace: String,
    event: String,
    closed: bool,
}

impl SocketIoChannel {
    pub async fn connect(url: &str, namespace: &str) -> InboxResult<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
        tracing::info!("Push channel connected to {} (namespace {})", url, namespace);

        Ok(Self {
            stream,
            namespace: namespace.to_string(),
            event: NEW_NOTIFICATION_EVENT.to_string(),
            closed: false,
        })
    }

    async fn send_text(&mut self, text: String) -> InboxResult<()> {
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }
}

#[async_trait]
impl PushChannel for SocketIoChannel {
    async fn next_notification(&mut self) -> InboxResult<Option<Notification>> {
        while !self.closed {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    let err = InboxError::from(e);
                    if matches!(err, InboxError::ChannelClosed) {
                        self.closed = true;
                        return Ok(None);
                    }
                    return Err(err);
                }
                None => {
                    self.closed = true;
                    return Ok(None);
                }
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    tracing::info!("Push channel closed by server: {:?}", frame);
                    self.closed = true;
                    return Ok(None);
                }
                _ => continue,
            };

            match decode_frame(text.as_str()) {
                Ok(SocketIoFrame::Open(handshake)) => {
                    tracing::debug!("Engine.IO handshake: {}", handshake);
                    let join = connect_packet(&self.namespace);
                    self.send_text(join).await?;
                }
                Ok(SocketIoFrame::Ping) => self.send_text("3".to_string()).await?,
                Ok(SocketIoFrame::Close) => {
                    self.closed = true;
                    return Ok(None);
                }
                Ok(SocketIoFrame::Connected { namespace }) if namespace == self.namespace => {
                    tracing::info!("Joined push namespace {}", namespace);
                }
                Ok(SocketIoFrame::Disconnected { namespace }) if namespace == self.namespace => {
                    tracing::info!("Server left push namespace {}", namespace);
                    self.closed = true;
                    return Ok(None);
                }
                Ok(SocketIoFrame::ConnectError { namespace, message }) if namespace == self.namespace => {
                    return Err(InboxError::WebSocketConnection(format!(
                        "namespace {} refused: {}",
                        namespace, message
                    )));
                }
                Ok(SocketIoFrame::Event { namespace, name, payload })
                    if namespace == self.namespace && name == self.event =>
                {
                    match serde_json::from_value::<Notification>(payload) {
                        Ok(notification) => return Ok(Some(notification)),
                        Err(e) => tracing::warn!("Skipping malformed {} payload: {}", name, e),
                    }
                }
                Ok(other) => tracing::trace!("Ignoring push frame {:?}", other),
                Err(e) => tracing::warn!("Ignoring undecodable push frame: {}", e),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let leave = disconnect_packet(&self.namespace);
        if let Err(e) = self.stream.send(Message::text(leave)).await {
            tracing::debug!("Could not leave push namespace: {}", e);
        }
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("Push channel close failed: {}", e);
        }
    }
}

/// Forwards every pushed notification to `on_notification` until the channel
/// ends or `shutdown` flips to true. The channel is closed exactly once on exit.
pub async fn run_listener<F>(
    mut channel: Box<dyn PushChannel>,
    mut shutdown: watch::Receiver<bool>,
    mut on_notification: F,
) where
    F: FnMut(Notification) + Send,
{
    if *shutdown.borrow() {
        channel.close().await;
        return;
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!("Push listener stopping");
                    break;
                }
            }
            next = channel.next_notification() => match next {
                Ok(Some(notification)) => {
                    tracing::debug!("Pushed notification {} ({})", notification.id, notification.kind);
                    on_notification(notification);
                }
                Ok(None) => {
                    tracing::info!("Push channel ended");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Push channel failed: {}", e);
                    break;
                }
            }
        }
    }

    channel.close().await;
}
