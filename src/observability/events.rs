//! Bridge events and the sinks that consume them
//!
//! Components never log runtime failures directly; they build a
//! [`BridgeEvent`] and hand it to the [`EventSink`] they were constructed
//! with. The binary wires a [`TracingSink`] and the metrics collector
//! together through a [`CompositeSink`]; tests inject a recording sink.

use crate::bridge::state::ConnectionState;
use crate::error::BridgeError;
use crate::transport::ConnectionRole;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Something observable happened in the bridge
#[derive(Debug)]
pub enum BridgeEvent {
    StateChanged {
        role: ConnectionRole,
        from: ConnectionState,
        to: ConnectionState,
    },
    Connected {
        role: ConnectionRole,
        session: u64,
    },
    Disconnected {
        role: ConnectionRole,
        reason: String,
    },
    Subscribed {
        pattern: String,
    },
    /// A rule whose source uses a single-level wildcard
    PatternSkipped {
        pattern: String,
    },
    Forwarded {
        from: String,
        to: String,
        bytes: usize,
        text: bool,
    },
    /// No rule matched; the message was dropped
    Unmatched {
        address: String,
    },
    Failure(BridgeError),
}

impl BridgeEvent {
    /// Short, stable name for the event
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeEvent::StateChanged { .. } => "state_changed",
            BridgeEvent::Connected { .. } => "connected",
            BridgeEvent::Disconnected { .. } => "disconnected",
            BridgeEvent::Subscribed { .. } => "subscribed",
            BridgeEvent::PatternSkipped { .. } => "pattern_skipped",
            BridgeEvent::Forwarded { .. } => "forwarded",
            BridgeEvent::Unmatched { .. } => "unmatched",
            BridgeEvent::Failure(_) => "failure",
        }
    }
}

/// Receiver of bridge events
///
/// Called inline from connection loops, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &BridgeEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn record(&self, event: &BridgeEvent) {
        (**self).record(event);
    }
}

/// Shared sink handle passed to every component
pub type SharedSink = Arc<dyn EventSink>;

/// Writes events to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &BridgeEvent) {
        match event {
            BridgeEvent::StateChanged { role, from, to } => {
                debug!(role = %role, from = %from, to = %to, "Connection state changed");
            }
            BridgeEvent::Connected { role, session } => {
                info!(role = %role, session, "Connected to broker");
            }
            BridgeEvent::Disconnected { role, reason } => {
                warn!(role = %role, reason = %reason, "Disconnected from broker");
            }
            BridgeEvent::Subscribed { pattern } => {
                info!(pattern = %pattern, "Subscribe requested");
            }
            BridgeEvent::PatternSkipped { pattern } => {
                warn!(
                    pattern = %pattern,
                    "Skipping mapping with unsupported '+' wildcard in source"
                );
            }
            BridgeEvent::Forwarded {
                from,
                to,
                bytes,
                text,
            } => {
                debug!(from = %from, to = %to, bytes, text, "Forwarded message");
            }
            BridgeEvent::Unmatched { address } => {
                trace!(address = %address, "No mapping matched, message dropped");
            }
            BridgeEvent::Failure(failure) => match failure {
                BridgeError::Decode { .. } => {
                    warn!(kind = failure.kind(), "{}, forwarding raw bytes", failure);
                }
                BridgeError::Connection { .. } => {
                    warn!(kind = failure.kind(), "{}", failure);
                }
                _ => {
                    error!(kind = failure.kind(), "{}", failure);
                }
            },
        }
    }
}

/// Fans every event out to several sinks, in insertion order
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<SharedSink>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add<S: EventSink + 'static>(&mut self, sink: S) {
        self.sinks.push(Arc::new(sink));
    }

    /// Add a sink and return self for chaining
    pub fn with<S: EventSink + 'static>(mut self, sink: S) -> Self {
        self.add(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for CompositeSink {
    fn record(&self, event: &BridgeEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}
