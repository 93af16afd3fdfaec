//! Outgoing event delivery.
//!
//! Sessions never write to the socket themselves. They hand events to an
//! [`EventSink`]; sending is non-blocking and failures are reported back to
//! the caller to log, never to propagate.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::protocol::ServerEvent;

/// Messages for the per-connection writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(String),
    Close,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("client connection closed")]
    Closed,

    #[error("client send queue full")]
    Full,

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &ServerEvent) -> Result<(), DeliveryError>;

    /// Ask for the client connection to be closed after queued events.
    fn close(&self);
}

/// Queues serialized events for the connection's writer task.
#[derive(Debug, Clone)]
pub struct ClientSink {
    tx: mpsc::Sender<Outbound>,
}

impl ClientSink {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }
}

impl EventSink for ClientSink {
    fn deliver(&self, event: &ServerEvent) -> Result<(), DeliveryError> {
        let json = serde_json::to_string(event)?;
        self.tx.try_send(Outbound::Event(json)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn close(&self) {
        if let Err(mpsc::error::TrySendError::Full(close)) = self.tx.try_send(Outbound::Close) {
            // queue is backed up; close once it drains
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(close).await;
            });
        }
    }
}

/// Debug delivery: the client plus any number of read-only observers.
pub struct ObservedSink {
    client: Arc<dyn EventSink>,
    observers: broadcast::Sender<String>,
}

impl ObservedSink {
    pub fn new(client: Arc<dyn EventSink>, observers: broadcast::Sender<String>) -> Self {
        Self { client, observers }
    }
}

impl EventSink for ObservedSink {
    fn deliver(&self, event: &ServerEvent) -> Result<(), DeliveryError> {
        if self.observers.receiver_count() > 0 {
            match serde_json::to_string(event) {
                Ok(json) => {
                    let _ = self.observers.send(json);
                }
                Err(e) => debug!("Skipping observer copy: {e}"),
            }
        }
        self.client.deliver(event)
    }

    fn close(&self) {
        self.client.close();
    }
}
