//! Error taxonomy for the bridge
//!
//! Only [`BridgeError::Config`] (and, under the fail-fast policy, an initial
//! [`BridgeError::Connection`]) ever leave the supervisor. Everything else is
//! handed to the event sink and the bridge keeps running.

use crate::config::ConfigError;
use crate::transport::{ConnectionRole, TransportError};
use std::str::Utf8Error;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{role} connection error: {source}")]
    Connection {
        role: ConnectionRole,
        #[source]
        source: TransportError,
    },

    #[error("Subscribe to '{pattern}' failed: {source}")]
    Subscribe {
        pattern: String,
        #[source]
        source: TransportError,
    },

    #[error("Publish to '{address}' failed: {source}")]
    Publish {
        address: String,
        #[source]
        source: TransportError,
    },

    #[error("Payload received on '{address}' is not valid UTF-8: {source}")]
    Decode {
        address: String,
        #[source]
        source: Utf8Error,
    },
}

impl BridgeError {
    pub fn connection(role: ConnectionRole, source: TransportError) -> Self {
        Self::Connection { role, source }
    }

    pub fn subscribe<S: Into<String>>(pattern: S, source: TransportError) -> Self {
        Self::Subscribe {
            pattern: pattern.into(),
            source,
        }
    }

    pub fn publish<S: Into<String>>(address: S, source: TransportError) -> Self {
        Self::Publish {
            address: address.into(),
            source,
        }
    }

    pub fn decode<S: Into<String>>(address: S, source: Utf8Error) -> Self {
        Self::Decode {
            address: address.into(),
            source,
        }
    }

    /// Short, stable name used as a log field and metrics key
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Config(_) => "config",
            BridgeError::Connection { .. } => "connection",
            BridgeError::Subscribe { .. } => "subscribe",
            BridgeError::Publish { .. } => "publish",
            BridgeError::Decode { .. } => "decode",
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
