//! Bridge configuration
//!
//! Loaded once from a TOML document at startup. Any problem found here is fatal:
//! the process never reaches the network with a configuration that failed to load.

use crate::mapping::rules::{
    has_valid_multi_level_wildcard, RewriteRule, RuleSet, SINGLE_LEVEL_WILDCARD,
};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Default configuration path used when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level configuration document
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Broker messages are read from
    pub broker_src: BrokerSection,
    /// Broker messages are forwarded to
    pub broker_dst: BrokerSection,
    /// Ordered rewrite rules
    pub mappings: Vec<RewriteRule>,
    /// Runtime tuning, every field optional
    #[serde(default)]
    pub bridge: BridgeSection,
}

/// Connection settings for one broker endpoint
#[derive(Clone, Deserialize, PartialEq)]
pub struct BrokerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Negotiate TLS with the platform's root certificates
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl fmt::Debug for BrokerSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .finish()
    }
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            tls: false,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "mqttbridge".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

/// Runtime behaviour shared by both connections
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// QoS used for subscriptions and forwarded publishes (0..=2)
    #[serde(default)]
    pub qos: u8,
    /// Abort startup when the first connection attempt fails
    #[serde(default)]
    pub fail_fast: bool,
    /// How long `fail_fast` waits for both brokers
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Outbound request queue length per connection
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Period of the metrics log line (0 = disabled)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    /// Time allowed to flush DISCONNECT when shutting down
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            qos: 0,
            fail_fast: false,
            connect_timeout_secs: default_connect_timeout(),
            queue_capacity: default_queue_capacity(),
            stats_interval_secs: default_stats_interval(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    100
}

fn default_stats_interval() -> u64 {
    60
}

fn default_shutdown_grace() -> u64 {
    500
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid {section} endpoint: {reason}")]
    InvalidEndpoint {
        section: &'static str,
        reason: String,
    },
    #[error("Invalid mapping #{index}: {reason}")]
    InvalidMapping { index: usize, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every constraint serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint("broker_src", &self.broker_src)?;
        validate_endpoint("broker_dst", &self.broker_dst)?;

        if self.broker_src.host == self.broker_dst.host
            && self.broker_src.port == self.broker_dst.port
            && self.broker_src.client_id == self.broker_dst.client_id
        {
            return Err(ConfigError::InvalidConfig(format!(
                "broker_src and broker_dst both connect to {}:{} as '{}'; the sessions would evict each other",
                self.broker_src.host, self.broker_src.port, self.broker_src.client_id
            )));
        }

        if self.mappings.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "at least one entry in [[mappings]] is required".to_string(),
            ));
        }

        for (index, rule) in self.mappings.iter().enumerate() {
            validate_mapping(index, rule)?;
        }

        if self.bridge.qos > 2 {
            return Err(ConfigError::InvalidConfig(format!(
                "bridge.qos must be 0, 1 or 2, got {}",
                self.bridge.qos
            )));
        }

        if self.bridge.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "bridge.queue_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Rule set built from `mappings`, in configuration order
    pub fn rule_set(&self) -> RuleSet {
        RuleSet::new(self.mappings.clone())
    }
}

fn validate_endpoint(section: &'static str, endpoint: &BrokerSection) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        section,
        reason: reason.to_string(),
    };

    if endpoint.host.trim().is_empty() {
        return Err(invalid("host must not be empty"));
    }
    if endpoint.port == 0 {
        return Err(invalid("port must not be 0"));
    }
    // rumqttc rejects these client ids outright
    if endpoint.client_id.is_empty() || endpoint.client_id.starts_with(' ') {
        return Err(invalid("client_id must be non-empty and not start with a space"));
    }
    if endpoint.password.is_some() && endpoint.username.is_none() {
        return Err(invalid("password given without username"));
    }

    Ok(())
}

fn validate_mapping(index: usize, rule: &RewriteRule) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidMapping { index, reason };

    if rule.source_pattern.is_empty() {
        return Err(invalid("src_topic must not be empty".to_string()));
    }
    if rule.destination_pattern.is_empty() {
        return Err(invalid("dst_topic must not be empty".to_string()));
    }
    if !has_valid_multi_level_wildcard(&rule.source_pattern) {
        return Err(invalid(format!(
            "'#' must be the last level of src_topic '{}'",
            rule.source_pattern
        )));
    }
    if !has_valid_multi_level_wildcard(&rule.destination_pattern) {
        return Err(invalid(format!(
            "'#' must be the last level of dst_topic '{}'",
            rule.destination_pattern
        )));
    }
    if rule.destination_pattern.contains(SINGLE_LEVEL_WILDCARD) {
        return Err(invalid(format!(
            "dst_topic '{}' cannot contain '+'",
            rule.destination_pattern
        )));
    }

    Ok(())
}

#[cfg(test)]
impl BridgeConfig {
    /// Minimal valid configuration for unit tests
    pub fn test_config() -> Self {
        Self::from_toml_str(
            r#"
[broker_src]
client_id = "bridge-src"

[broker_dst]
client_id = "bridge-dst"

[[mappings]]
src_topic = "home/#"
dst_topic = "building1/#"
"#,
        )
        .expect("Test config should parse")
    }
}
