//! Role-parameterised broker connection
//!
//! A [`BrokerConnection`] owns the event half of one session and drives it
//! until shutdown. The same type serves both sides of the bridge: the source
//! side is given subscription patterns and a message handler, the destination
//! side is given neither and only keeps its session alive.

use super::state::{next_state, ConnectionState, ConnectionStatus, LifecycleEvent};
use crate::error::BridgeError;
use crate::observability::{BridgeEvent, SharedSink};
use crate::transport::{
    ConnectionRole, EventSource, InboundMessage, Transport, TransportError, TransportEvent,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Consumer of inbound messages
///
/// Runs inline on the owning connection's loop, so it must not block.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, message: InboundMessage);
}

/// One broker session and its lifecycle loop
pub struct BrokerConnection<T: Transport, E: EventSource> {
    role: ConnectionRole,
    transport: T,
    events: E,
    sink: SharedSink,
    subscriptions: Vec<String>,
    handler: Option<Arc<dyn MessageHandler>>,
    status: watch::Sender<ConnectionStatus>,
}

impl<T: Transport, E: EventSource> BrokerConnection<T, E> {
    pub fn new(role: ConnectionRole, transport: T, events: E, sink: SharedSink) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            role,
            transport,
            events,
            sink,
            subscriptions: Vec::new(),
            handler: None,
            status,
        }
    }

    /// Patterns requested on every established session, in order
    pub fn with_subscriptions(mut self, patterns: Vec<String>) -> Self {
        self.subscriptions = patterns;
        self
    }

    pub fn with_message_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    /// Live view of the connection's status
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Drive the session until `shutdown` flips to true or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(role = %self.role, "Connection loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.observe(LifecycleEvent::Polling);

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = self.events.next_event() => self.handle_event(event),
            }
        }

        self.teardown().await;
        info!(role = %self.role, "Connection loop stopped");
    }

    fn handle_event(&mut self, event: Result<TransportEvent, TransportError>) {
        match event {
            Ok(TransportEvent::Connected) => self.on_connected(),
            Ok(TransportEvent::Disconnected { reason }) => self.on_disconnected(reason),
            Ok(TransportEvent::Message(message)) => self.on_message(message),
            Ok(TransportEvent::SubscriptionRejected { packet_id }) => {
                self.sink.record(&BridgeEvent::Failure(BridgeError::subscribe(
                    format!("packet {packet_id}"),
                    TransportError::SubscribeFailed("rejected by broker".to_string()),
                )));
            }
            Err(error) => self.on_error(error),
        }
    }

    /// Every established session gets the full subscription set again
    fn on_connected(&mut self) {
        let state = self.observe_transition(LifecycleEvent::SessionUp);
        let session = self.status.borrow().sessions + 1;
        self.sink.record(&BridgeEvent::Connected {
            role: self.role,
            session,
        });

        let mut requested = Vec::with_capacity(self.subscriptions.len());
        for pattern in &self.subscriptions {
            match self.transport.subscribe(pattern) {
                Ok(()) => {
                    self.sink.record(&BridgeEvent::Subscribed {
                        pattern: pattern.clone(),
                    });
                    requested.push(pattern.clone());
                }
                Err(error) => {
                    self.sink
                        .record(&BridgeEvent::Failure(BridgeError::subscribe(pattern, error)));
                }
            }
        }

        self.status.send_modify(|status| {
            status.state = state;
            status.sessions = session;
            status.subscriptions = requested;
        });
    }

    fn on_disconnected(&mut self, reason: String) {
        let state = self.observe_transition(LifecycleEvent::SessionDown);
        self.sink.record(&BridgeEvent::Disconnected {
            role: self.role,
            reason: reason.clone(),
        });
        self.status.send_modify(|status| {
            status.state = state;
            status.last_disconnect = Some(reason);
        });
    }

    /// A poll error ends the session, or the attempt to establish one
    fn on_error(&mut self, error: TransportError) {
        let was_connected = self.status.borrow().is_connected();
        if was_connected {
            self.on_disconnected(error.to_string());
            return;
        }

        let state = self.observe_transition(LifecycleEvent::SessionDown);
        let reason = error.to_string();
        self.sink
            .record(&BridgeEvent::Failure(BridgeError::connection(self.role, error)));
        self.status.send_modify(|status| {
            status.state = state;
            status.last_disconnect = Some(reason);
        });
    }

    fn on_message(&self, message: InboundMessage) {
        match &self.handler {
            Some(handler) => handler.on_message(message),
            None => trace!(
                role = %self.role,
                address = %message.address,
                "Ignoring message without handler"
            ),
        }
    }

    /// Apply a transition and publish it only if the state changed
    fn observe(&self, event: LifecycleEvent) {
        let state = self.observe_transition(event);
        self.status.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            status.state = state;
            true
        });
    }

    /// Compute the next state and report the change, without storing it
    fn observe_transition(&self, event: LifecycleEvent) -> ConnectionState {
        let current = self.status.borrow().state;
        let next = next_state(current, event);
        if next != current {
            self.sink.record(&BridgeEvent::StateChanged {
                role: self.role,
                from: current,
                to: next,
            });
        }
        next
    }

    async fn teardown(&mut self) {
        if let Err(error) = self.transport.disconnect() {
            debug!(role = %self.role, "Disconnect request not queued: {}", error);
        }
        self.events.close().await;
        self.observe(LifecycleEvent::SessionDown);
    }
}
