//! Pure session configuration for the MQTT transport
//!
//! This module contains pure functions turning a [`BrokerSection`] into
//! rumqttc options, plus the reconnect backoff policy.

use crate::config::BrokerSection;
use crate::transport::TransportError;
use rumqttc::Transport as RumqttcTransport;
use rumqttc::{MqttOptions, QoS};
use std::time::Duration;

/// Maximum packet size accepted and produced, both directions
pub const MAX_PACKET_SIZE: usize = 256 * 1024;

/// Reconnection backoff applied between failed polls
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delays in milliseconds for the first attempts
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![100, 250, 500, 1000, 2000],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnection attempt number `attempt` (1-based)
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let millis = self
            .backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay);
        Duration::from_millis(millis)
    }
}

/// Map a configured QoS level onto rumqttc's enum
pub fn qos_from_level(level: u8) -> Result<QoS, TransportError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(TransportError::InvalidOptions(format!(
            "QoS must be 0, 1 or 2, got {other}"
        ))),
    }
}

/// Pure function to configure MQTT options from an endpoint section
pub fn configure_mqtt_options(endpoint: &BrokerSection) -> Result<MqttOptions, TransportError> {
    // MqttOptions::new panics on these, so refuse them here
    if endpoint.client_id.is_empty() || endpoint.client_id.starts_with(' ') {
        return Err(TransportError::InvalidOptions(format!(
            "invalid client id '{}'",
            endpoint.client_id
        )));
    }

    let mut mqtt_options =
        MqttOptions::new(endpoint.client_id.clone(), endpoint.host.clone(), endpoint.port);

    if endpoint.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = &endpoint.username {
        let password = endpoint.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username.clone(), password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(endpoint.keep_alive_secs));
    // Broker session state is never relied upon; every connect resubscribes
    mqtt_options.set_clean_session(true);
    mqtt_options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.backoff_pattern, vec![100, 250, 500, 1000, 2000]);
        assert_eq!(config.sustained_delay, 5000);
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let config = ReconnectConfig::default();

        assert_eq!(config.calculate_backoff_delay(1), Duration::from_millis(100));
        assert_eq!(config.calculate_backoff_delay(2), Duration::from_millis(250));
        assert_eq!(config.calculate_backoff_delay(5), Duration::from_millis(2000));

        // Sustained delay after pattern exhausted
        assert_eq!(config.calculate_backoff_delay(6), Duration::from_millis(5000));
        assert_eq!(config.calculate_backoff_delay(100), Duration::from_millis(5000));

        // Attempt 0 is treated like the first attempt
        assert_eq!(config.calculate_backoff_delay(0), Duration::from_millis(100));
    }

    #[test]
    fn test_empty_pattern_uses_sustained_delay() {
        let config = ReconnectConfig {
            backoff_pattern: vec![],
            sustained_delay: 42,
        };
        assert_eq!(config.calculate_backoff_delay(1), Duration::from_millis(42));
    }

    #[test]
    fn test_qos_from_level() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(
            qos_from_level(3),
            Err(TransportError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_configure_mqtt_options() {
        let endpoint = BrokerSection {
            host: "broker.local".to_string(),
            port: 1884,
            client_id: "bridge-test".to_string(),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            keep_alive_secs: 30,
            ..Default::default()
        };

        let options = configure_mqtt_options(&endpoint).unwrap();
        assert_eq!(options.client_id(), "bridge-test");
        assert_eq!(
            options.broker_address(),
            ("broker.local".to_string(), 1884)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert_eq!(
            options.credentials(),
            Some(("user".to_string(), "pass".to_string()))
        );
    }

    #[test]
    fn test_username_without_password() {
        let endpoint = BrokerSection {
            client_id: "bridge-test".to_string(),
            username: Some("user".to_string()),
            ..Default::default()
        };

        let options = configure_mqtt_options(&endpoint).unwrap();
        assert_eq!(
            options.credentials(),
            Some(("user".to_string(), String::new()))
        );
    }

    #[test]
    fn test_invalid_client_id() {
        let endpoint = BrokerSection {
            client_id: " leading-space".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            configure_mqtt_options(&endpoint),
            Err(TransportError::InvalidOptions(_))
        ));
    }
}
