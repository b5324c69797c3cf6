//! mqttbridge - topic-rewriting bridge between two MQTT brokers
//!
//! # Overview
//!
//! The bridge subscribes to a set of topic patterns on a source broker,
//! rewrites the topic of every received message according to an ordered list
//! of prefix rules, and republishes it on a destination broker. It provides:
//! - Topic rewrite rules and a pure first-match mapper
//! - Role-parameterised broker connections that resubscribe on every session
//! - A forwarding pipeline with UTF-8 decode fallback
//! - A supervisor owning both connection loops until shutdown
//!
//! # Quick Start
//!
//! ```rust
//! use mqttbridge::mapping::{RewriteRule, RuleSet, TopicMapper};
//!
//! let rules = RuleSet::new(vec![
//!     RewriteRule::new("home/#", "building1/#"),
//!     RewriteRule::new("sensors/raw", "sensors/clean"),
//! ]);
//!
//! assert_eq!(
//!     TopicMapper::resolve("home/kitchen/temp", &rules),
//!     Some("building1/kitchen/temp".to_string())
//! );
//! assert_eq!(TopicMapper::resolve("garden/light", &rules), None);
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod mapping;
pub mod observability;
pub mod testing;
pub mod transport;

pub use bridge::{BrokerConnection, ForwardingPipeline, Supervisor};
pub use config::{BridgeConfig, BridgeSection, BrokerSection, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use mapping::{RewriteRule, RuleSet, TopicMapper};
pub use transport::mqtt::MqttConnector;
