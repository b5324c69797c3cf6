//! Impure I/O operations for the MQTT transport
//!
//! This module wires rumqttc into the transport traits. [`MqttHandle`] wraps the
//! cloneable `AsyncClient` and only ever uses its `try_*` entry points, so a call
//! from a foreign task is a channel send that returns immediately. [`MqttEventSource`]
//! owns the `EventLoop`; polling it again after an error is what reconnects.

use super::event_router::route_mqtt_event;
use super::options::{configure_mqtt_options, qos_from_level, ReconnectConfig};
use crate::config::BrokerSection;
use crate::transport::{
    ConnectionRole, Connector, EventSource, SessionOptions, Transport, TransportError,
    TransportEvent,
};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Outgoing, QoS};
use std::time::Duration;
use tracing::{debug, info};

/// Request handle for one MQTT session
#[derive(Clone)]
pub struct MqttHandle {
    role: ConnectionRole,
    client: AsyncClient,
    qos: QoS,
}

impl MqttHandle {
    pub fn role(&self) -> ConnectionRole {
        self.role
    }
}

impl Transport for MqttHandle {
    fn subscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.client
            .try_subscribe(pattern, self.qos)
            .map_err(|e| TransportError::SubscribeFailed(format!("{pattern}: {e}")))
    }

    fn publish(&self, address: &str, payload: Bytes) -> Result<(), TransportError> {
        if address.is_empty() {
            return Err(TransportError::PublishFailed("topic must not be empty".to_string()));
        }
        // Forwarded messages are never retained
        self.client
            .try_publish(address, self.qos, false, payload.to_vec())
            .map_err(|e| TransportError::PublishFailed(format!("{address}: {e}")))
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.client
            .try_disconnect()
            .map_err(|e| TransportError::ConnectionFailed(format!("disconnect request: {e}")))
    }
}

/// Event driver for one MQTT session, including reconnect backoff
pub struct MqttEventSource {
    role: ConnectionRole,
    event_loop: EventLoop,
    reconnect_config: ReconnectConfig,
    failed_attempts: u32,
    session_up: bool,
    shutdown_grace: Duration,
}

impl MqttEventSource {
    /// Consecutive failed polls since the last ConnAck
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Errors before the first ConnAck are connect failures, later ones are losses
    fn classify_error(&self, error: ConnectionError) -> TransportError {
        if self.session_up {
            TransportError::ConnectionLost(error.to_string())
        } else {
            TransportError::ConnectionFailed(error.to_string())
        }
    }
}

#[async_trait]
impl EventSource for MqttEventSource {
    async fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
        if self.failed_attempts > 0 {
            let delay = self
                .reconnect_config
                .calculate_backoff_delay(self.failed_attempts);
            debug!(
                role = %self.role,
                attempt = self.failed_attempts,
                delay_ms = delay.as_millis() as u64,
                "Waiting before reconnection attempt"
            );
            tokio::time::sleep(delay).await;
        }

        loop {
            match self.event_loop.poll().await {
                Ok(event) => {
                    let Some(routed) = route_mqtt_event(&event) else {
                        continue;
                    };
                    if routed == TransportEvent::Connected {
                        self.failed_attempts = 0;
                        self.session_up = true;
                    }
                    return Ok(routed);
                }
                Err(error) => {
                    let classified = self.classify_error(error);
                    self.failed_attempts = self.failed_attempts.saturating_add(1);
                    self.session_up = false;
                    return Err(classified);
                }
            }
        }
    }

    async fn close(&mut self) {
        let grace = self.shutdown_grace;
        let event_loop = &mut self.event_loop;
        let flush = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        };

        if tokio::time::timeout(grace, flush).await.is_err() {
            debug!(role = %self.role, "DISCONNECT not flushed within {:?}", grace);
        }
    }
}

/// Opens rumqttc sessions
#[derive(Debug, Clone, Default)]
pub struct MqttConnector {
    reconnect_config: ReconnectConfig,
}

impl MqttConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reconnect_config(reconnect_config: ReconnectConfig) -> Self {
        Self { reconnect_config }
    }
}

impl Connector for MqttConnector {
    type Transport = MqttHandle;
    type Events = MqttEventSource;

    fn connect(
        &self,
        role: ConnectionRole,
        endpoint: &BrokerSection,
        options: &SessionOptions,
    ) -> Result<(MqttHandle, MqttEventSource), TransportError> {
        let qos = qos_from_level(options.qos)?;
        let mqtt_options = configure_mqtt_options(endpoint)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, options.queue_capacity);

        info!(
            role = %role,
            host = %endpoint.host,
            port = endpoint.port,
            client_id = %endpoint.client_id,
            tls = endpoint.tls,
            "Prepared MQTT session"
        );

        Ok((
            MqttHandle { role, client, qos },
            MqttEventSource {
                role,
                event_loop,
                reconnect_config: self.reconnect_config.clone(),
                failed_attempts: 0,
                session_up: false,
                shutdown_grace: options.shutdown_grace,
            },
        ))
    }
}
