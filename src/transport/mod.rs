//! Transport layer for broker sessions
//!
//! This module provides the abstraction the bridge drives its two broker sessions
//! through, plus the MQTT implementation. A session is split in two halves:
//!
//! - [`Transport`] - a cloneable request handle. Every call is a non-blocking
//!   enqueue-and-return hand-off and may be made from any task or thread.
//! - [`EventSource`] - the event stream, owned by exactly one connection loop.
//!
//! Reconnection (and its backoff) belongs to the [`EventSource`]: after an error,
//! the next call to [`EventSource::next_event`] re-establishes the session.

use crate::config::{BridgeSection, BrokerSection};
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Which side of the bridge a connection serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    Source,
    Destination,
}

impl ConnectionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionRole::Source => "source",
            ConnectionRole::Destination => "destination",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message received on a subscribed address
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub address: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new<A: Into<String>, P: Into<Bytes>>(address: A, payload: P) -> Self {
        Self {
            address: address.into(),
            payload: payload.into(),
        }
    }
}

/// Session events delivered to the owning connection loop, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A session was established; initial connect and reconnect look the same
    Connected,
    /// The broker closed the session
    Disconnected { reason: String },
    /// Inbound publish
    Message(InboundMessage),
    /// The broker refused one or more filters of a subscribe request
    SubscriptionRejected { packet_id: u16 },
}

/// Transport errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Subscription failed: {0}")]
    SubscribeFailed(String),
    #[error("Publishing failed: {0}")]
    PublishFailed(String),
    #[error("Invalid session options: {0}")]
    InvalidOptions(String),
}

/// Per-session settings derived from configuration by the supervisor
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// QoS level for subscribe and publish (0..=2)
    pub qos: u8,
    /// Outbound request queue length
    pub queue_capacity: usize,
    /// Upper bound for flushing the disconnect on shutdown
    pub shutdown_grace: Duration,
}

impl SessionOptions {
    pub fn from_bridge(bridge: &BridgeSection) -> Self {
        Self {
            qos: bridge.qos,
            queue_capacity: bridge.queue_capacity,
            shutdown_grace: Duration::from_millis(bridge.shutdown_grace_ms),
        }
    }

    /// Make sure a full resubscribe burst fits in the request queue
    pub fn with_min_capacity(mut self, required: usize) -> Self {
        self.queue_capacity = self.queue_capacity.max(required);
        self
    }
}

/// Request half of a broker session
///
/// Implementations MUST be safe to call from any execution context: the
/// forwarding pipeline publishes on the destination handle from the source
/// connection's loop. Calls never block and never retry; a failure is returned
/// to the caller, who reports it.
pub trait Transport: Clone + Send + Sync + 'static {
    /// Request a subscription to `pattern`
    fn subscribe(&self, pattern: &str) -> Result<(), TransportError>;

    /// Queue a publish of `payload` to `address`
    fn publish(&self, address: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Queue a clean disconnect
    fn disconnect(&self) -> Result<(), TransportError>;
}

/// Event half of a broker session
#[async_trait::async_trait]
pub trait EventSource: Send + 'static {
    /// Wait for the next session event.
    ///
    /// An `Err` means the session was lost; calling again reconnects, applying
    /// whatever backoff the transport uses.
    async fn next_event(&mut self) -> Result<TransportEvent, TransportError>;

    /// Drive the session just long enough to flush a queued disconnect
    async fn close(&mut self);
}

/// Opens broker sessions
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;
    type Events: EventSource;

    /// Prepare a session for `endpoint`. Network activity starts with the
    /// first [`EventSource::next_event`] call.
    fn connect(
        &self,
        role: ConnectionRole,
        endpoint: &BrokerSection,
        options: &SessionOptions,
    ) -> Result<(Self::Transport, Self::Events), TransportError>;
}
