//! MQTT transport built on rumqttc
//!
//! This module separates pure functions from I/O operations for better
//! testability.
//!
//! # Architecture
//!
//! - [`options`] - Pure session configuration and reconnect backoff
//! - [`event_router`] - Pure translation of rumqttc events
//! - [`client`] - Impure I/O: request handle, event source and connector
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqttbridge::config::{BridgeSection, BrokerSection};
//! use mqttbridge::transport::mqtt::MqttConnector;
//! use mqttbridge::transport::{ConnectionRole, Connector, EventSource, SessionOptions, Transport};
//!
//! # tokio_test::block_on(async {
//! let endpoint = BrokerSection::default();
//! let options = SessionOptions::from_bridge(&BridgeSection::default());
//!
//! let (handle, mut events) =
//!     MqttConnector::new().connect(ConnectionRole::Source, &endpoint, &options)?;
//! handle.subscribe("home/#")?;
//! let event = events.next_event().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod event_router;
pub mod options;

// Re-export public types for convenience
pub use client::{MqttConnector, MqttEventSource, MqttHandle};
pub use event_router::route_mqtt_event;
pub use options::{configure_mqtt_options, ReconnectConfig};
