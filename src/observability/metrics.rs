//! Thread-safe bridge counters
//!
//! [`BridgeMetrics`] is an [`EventSink`]: it derives every counter from the
//! events the components already emit, so nothing calls it directly.

use super::events::{BridgeEvent, EventSink};
use crate::error::BridgeError;
use crate::transport::ConnectionRole;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for one side of the bridge
#[derive(Debug, Default)]
struct RoleCounters {
    sessions: AtomicU64,
    disconnects: AtomicU64,
    connection_failures: AtomicU64,
}

impl RoleCounters {
    fn snapshot(&self) -> RoleSnapshot {
        RoleSnapshot {
            sessions: self.sessions.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
        }
    }
}

/// Atomic counters fed from bridge events
#[derive(Debug)]
pub struct BridgeMetrics {
    started: Instant,
    messages_forwarded: AtomicU64,
    bytes_forwarded: AtomicU64,
    messages_unmatched: AtomicU64,
    decode_fallbacks: AtomicU64,
    publish_failures: AtomicU64,
    subscribe_failures: AtomicU64,
    subscribe_requests: AtomicU64,
    patterns_skipped: AtomicU64,
    source: RoleCounters,
    destination: RoleCounters,
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            messages_forwarded: AtomicU64::new(0),
            bytes_forwarded: AtomicU64::new(0),
            messages_unmatched: AtomicU64::new(0),
            decode_fallbacks: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            subscribe_failures: AtomicU64::new(0),
            subscribe_requests: AtomicU64::new(0),
            patterns_skipped: AtomicU64::new(0),
            source: RoleCounters::default(),
            destination: RoleCounters::default(),
        }
    }

    fn role(&self, role: ConnectionRole) -> &RoleCounters {
        match role {
            ConnectionRole::Source => &self.source,
            ConnectionRole::Destination => &self.destination,
        }
    }

    fn count_failure(&self, failure: &BridgeError) {
        let counter = match failure {
            BridgeError::Decode { .. } => &self.decode_fallbacks,
            BridgeError::Publish { .. } => &self.publish_failures,
            BridgeError::Subscribe { .. } => &self.subscribe_failures,
            BridgeError::Connection { role, .. } => &self.role(*role).connection_failures,
            BridgeError::Config(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            messages_forwarded: self.messages_forwarded.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            messages_unmatched: self.messages_unmatched.load(Ordering::Relaxed),
            decode_fallbacks: self.decode_fallbacks.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            subscribe_failures: self.subscribe_failures.load(Ordering::Relaxed),
            subscribe_requests: self.subscribe_requests.load(Ordering::Relaxed),
            patterns_skipped: self.patterns_skipped.load(Ordering::Relaxed),
            source: self.source.snapshot(),
            destination: self.destination.snapshot(),
        }
    }
}

impl EventSink for BridgeMetrics {
    fn record(&self, event: &BridgeEvent) {
        match event {
            BridgeEvent::Forwarded { bytes, .. } => {
                self.messages_forwarded.fetch_add(1, Ordering::Relaxed);
                self.bytes_forwarded
                    .fetch_add(*bytes as u64, Ordering::Relaxed);
            }
            BridgeEvent::Unmatched { .. } => {
                self.messages_unmatched.fetch_add(1, Ordering::Relaxed);
            }
            BridgeEvent::Subscribed { .. } => {
                self.subscribe_requests.fetch_add(1, Ordering::Relaxed);
            }
            BridgeEvent::PatternSkipped { .. } => {
                self.patterns_skipped.fetch_add(1, Ordering::Relaxed);
            }
            BridgeEvent::Connected { role, .. } => {
                self.role(*role).sessions.fetch_add(1, Ordering::Relaxed);
            }
            BridgeEvent::Disconnected { role, .. } => {
                self.role(*role).disconnects.fetch_add(1, Ordering::Relaxed);
            }
            BridgeEvent::Failure(failure) => self.count_failure(failure),
            BridgeEvent::StateChanged { .. } => {}
        }
    }
}

/// Per-role part of a [`MetricsSnapshot`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleSnapshot {
    pub sessions: u64,
    pub disconnects: u64,
    pub connection_failures: u64,
}

/// Serializable copy of [`BridgeMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub messages_forwarded: u64,
    pub bytes_forwarded: u64,
    pub messages_unmatched: u64,
    pub decode_fallbacks: u64,
    pub publish_failures: u64,
    pub subscribe_failures: u64,
    pub subscribe_requests: u64,
    pub patterns_skipped: u64,
    pub source: RoleSnapshot,
    pub destination: RoleSnapshot,
}
