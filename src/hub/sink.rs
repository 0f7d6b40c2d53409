//! Delivery sinks.
//!
//! A sink accepts one serialized message and may fail. Transports (a
//! WebSocket handler, a log stream) adapt themselves to [`EventSink`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("subscriber connection closed")]
    Closed,

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Capability: accept one serialized message.
pub trait EventSink: Send + Sync {
    fn deliver(&self, message: Arc<str>) -> BoxFuture<'_, Result<(), DeliveryError>>;
}

/// Forwards messages into a bounded channel drained by a transport task.
///
/// Delivery fails once the receiver is dropped; a full channel makes
/// delivery wait, which the hub bounds with its send timeout.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, message: Arc<str>) -> BoxFuture<'_, Result<(), DeliveryError>> {
        Box::pin(async move { self.tx.send(message).await.map_err(|_| DeliveryError::Closed) })
    }
}

/// Writes every message to the log stream.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn deliver(&self, message: Arc<str>) -> BoxFuture<'_, Result<(), DeliveryError>> {
        tracing::info!(target: "healthwatch::events", message = %message, "Event");
        Box::pin(async { Ok(()) })
    }
}
