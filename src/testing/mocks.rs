//! Mock implementations for testing
//!
//! Provides an in-memory transport, a channel-driven event source and a
//! recording event sink so the bridge can be exercised without a broker.

use crate::config::BrokerSection;
use crate::observability::{BridgeEvent, EventSink};
use crate::transport::{
    ConnectionRole, Connector, EventSource, InboundMessage, SessionOptions, Transport,
    TransportError, TransportEvent,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

pub type PublishedMessage = (String, Bytes);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct TransportRecord {
    subscriptions: Vec<String>,
    published: Vec<PublishedMessage>,
    disconnects: usize,
    fail_subscribe: bool,
    fail_publish: bool,
}

/// In-memory transport handle; clones share one record
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    record: Arc<Mutex<TransportRecord>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose publish requests are all rejected
    pub fn with_publish_failure() -> Self {
        let transport = Self::new();
        transport.fail_publishes(true);
        transport
    }

    pub fn fail_publishes(&self, fail: bool) {
        lock(&self.record).fail_publish = fail;
    }

    pub fn fail_subscribes(&self, fail: bool) {
        lock(&self.record).fail_subscribe = fail;
    }

    /// Every subscribe request so far, in call order
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.record).subscriptions.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.record).published.clone()
    }

    pub fn disconnect_calls(&self) -> usize {
        lock(&self.record).disconnects
    }
}

impl Transport for MockTransport {
    fn subscribe(&self, pattern: &str) -> Result<(), TransportError> {
        let mut record = lock(&self.record);
        if record.fail_subscribe {
            return Err(TransportError::SubscribeFailed(format!(
                "{pattern}: mock subscribe failure"
            )));
        }
        record.subscriptions.push(pattern.to_string());
        Ok(())
    }

    fn publish(&self, address: &str, payload: Bytes) -> Result<(), TransportError> {
        let mut record = lock(&self.record);
        if record.fail_publish {
            return Err(TransportError::PublishFailed(format!(
                "{address}: mock publish failure"
            )));
        }
        record.published.push((address.to_string(), payload));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        lock(&self.record).disconnects += 1;
        Ok(())
    }
}

type ScriptedItem = Result<TransportEvent, TransportError>;

/// Event source fed from an [`EventScript`]
///
/// Once the script is dropped and drained, `next_event` stays pending, like a
/// session waiting for traffic.
#[derive(Debug)]
pub struct ScriptedEvents {
    receiver: mpsc::UnboundedReceiver<ScriptedItem>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedEvents {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, EventScript) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));
        (
            Self {
                receiver,
                closes: Arc::clone(&closes),
            },
            EventScript { sender, closes },
        )
    }
}

#[async_trait]
impl EventSource for ScriptedEvents {
    async fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
        match self.receiver.recv().await {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sending half of [`ScriptedEvents`]
#[derive(Debug, Clone)]
pub struct EventScript {
    sender: mpsc::UnboundedSender<ScriptedItem>,
    closes: Arc<AtomicUsize>,
}

impl EventScript {
    fn push(&self, item: ScriptedItem) {
        // The source may already be gone at the end of a test
        let _ = self.sender.send(item);
    }

    pub fn connect(&self) {
        self.push(Ok(TransportEvent::Connected));
    }

    pub fn disconnect(&self, reason: &str) {
        self.push(Ok(TransportEvent::Disconnected {
            reason: reason.to_string(),
        }));
    }

    pub fn message(&self, address: &str, payload: impl Into<Bytes>) {
        self.push(Ok(TransportEvent::Message(InboundMessage::new(
            address, payload,
        ))));
    }

    pub fn reject_subscription(&self, packet_id: u16) {
        self.push(Ok(TransportEvent::SubscriptionRejected { packet_id }));
    }

    pub fn fail(&self, error: TransportError) {
        self.push(Err(error));
    }

    /// Times the event source was closed
    pub fn close_calls(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Connector handing out pre-built mock sessions per role
#[derive(Debug, Default)]
pub struct MockConnector {
    sessions: Mutex<HashMap<ConnectionRole, (MockTransport, ScriptedEvents)>>,
    requests: Mutex<Vec<(ConnectionRole, BrokerSection, SessionOptions)>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare the session for `role`; returns the handles a test drives it with
    pub fn prepare(&self, role: ConnectionRole) -> (MockTransport, EventScript) {
        let transport = MockTransport::new();
        let (events, script) = ScriptedEvents::new();
        lock(&self.sessions).insert(role, (transport.clone(), events));
        (transport, script)
    }

    /// Every `connect` call so far
    pub fn requests(&self) -> Vec<(ConnectionRole, BrokerSection, SessionOptions)> {
        lock(&self.requests).clone()
    }
}

impl Connector for Arc<MockConnector> {
    type Transport = MockTransport;
    type Events = ScriptedEvents;

    fn connect(
        &self,
        role: ConnectionRole,
        endpoint: &BrokerSection,
        options: &SessionOptions,
    ) -> Result<(MockTransport, ScriptedEvents), TransportError> {
        lock(&self.requests).push((role, endpoint.clone(), options.clone()));
        lock(&self.sessions).remove(&role).ok_or_else(|| {
            TransportError::ConnectionFailed(format!("no mock session prepared for {role}"))
        })
    }
}

/// Sink that keeps a summary of every event it sees
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event kinds in arrival order
    pub fn kinds(&self) -> Vec<String> {
        lock(&self.entries)
            .iter()
            .map(|(kind, _)| kind.clone())
            .collect()
    }

    /// Rendered events in arrival order
    pub fn descriptions(&self) -> Vec<String> {
        lock(&self.entries)
            .iter()
            .map(|(_, description)| description.clone())
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|(recorded, _)| recorded == kind)
            .count()
    }

    /// Number of failures of the given error kind
    pub fn failures(&self, error_kind: &str) -> usize {
        self.count(&format!("failure:{error_kind}"))
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &BridgeEvent) {
        let kind = match event {
            BridgeEvent::Failure(error) => format!("failure:{}", error.kind()),
            other => other.kind().to_string(),
        };
        lock(&self.entries).push((kind, format!("{event:?}")));
    }
}

/// Poll `condition` every 5ms until it holds or `timeout` elapses
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Run `future` with a generous upper bound, panicking on expiry
pub async fn within<F: Future>(timeout: Duration, future: F) -> F::Output {
    match tokio::time::timeout(timeout, future).await {
        Ok(output) => output,
        Err(_) => panic!("operation did not finish within {timeout:?}"),
    }
}
