//! Pure routing of rumqttc events onto transport events
//!
//! Only the packets the bridge reacts to are surfaced; keep-alives, acks and
//! outgoing traffic are consumed here.

use crate::transport::{InboundMessage, TransportEvent};
use rumqttc::{Event, Packet, SubscribeReasonCode};

/// Translate a rumqttc event; `None` means nothing for the connection to do
pub fn route_mqtt_event(event: &Event) -> Option<TransportEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => Some(TransportEvent::Connected),
        Event::Incoming(Packet::Publish(publish)) => Some(TransportEvent::Message(
            InboundMessage::new(publish.topic.clone(), publish.payload.clone()),
        )),
        Event::Incoming(Packet::Disconnect) => Some(TransportEvent::Disconnected {
            reason: "broker sent DISCONNECT".to_string(),
        }),
        Event::Incoming(Packet::SubAck(suback)) => {
            if subscription_rejected(&suback.return_codes) {
                Some(TransportEvent::SubscriptionRejected {
                    packet_id: suback.pkid,
                })
            } else {
                tracing::trace!(
                    target: "mqtt_transport",
                    "Subscription {} acknowledged",
                    suback.pkid
                );
                None
            }
        }
        Event::Incoming(other) => {
            tracing::trace!(target: "mqtt_transport", "MQTT event: {:?}", other);
            None
        }
        Event::Outgoing(_) => None,
    }
}

/// Whether any filter in a SubAck was refused (pure function)
pub fn subscription_rejected(return_codes: &[SubscribeReasonCode]) -> bool {
    return_codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Outgoing, PubAck, Publish, QoS, SubAck};

    #[test]
    fn test_connack_routes_to_connected() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        }));
        assert_eq!(route_mqtt_event(&event), Some(TransportEvent::Connected));
    }

    #[test]
    fn test_publish_routes_to_message() {
        let event = Event::Incoming(Packet::Publish(Publish::new(
            "home/kitchen/temp",
            QoS::AtMostOnce,
            "21.5",
        )));

        match route_mqtt_event(&event) {
            Some(TransportEvent::Message(message)) => {
                assert_eq!(message.address, "home/kitchen/temp");
                assert_eq!(&message.payload[..], b"21.5");
            }
            other => panic!("Expected Message route, got {other:?}"),
        }
    }

    #[test]
    fn test_broker_disconnect_routes_to_disconnected() {
        let event = Event::Incoming(Packet::Disconnect);
        assert!(matches!(
            route_mqtt_event(&event),
            Some(TransportEvent::Disconnected { .. })
        ));
    }

    #[test]
    fn test_suback_failure_is_surfaced() {
        let rejected = Event::Incoming(Packet::SubAck(SubAck {
            pkid: 7,
            return_codes: vec![
                SubscribeReasonCode::Success(QoS::AtMostOnce),
                SubscribeReasonCode::Failure,
            ],
        }));
        assert_eq!(
            route_mqtt_event(&rejected),
            Some(TransportEvent::SubscriptionRejected { packet_id: 7 })
        );

        let accepted = Event::Incoming(Packet::SubAck(SubAck {
            pkid: 8,
            return_codes: vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)],
        }));
        assert_eq!(route_mqtt_event(&accepted), None);
    }

    #[test]
    fn test_infrastructure_events_are_consumed() {
        assert_eq!(route_mqtt_event(&Event::Incoming(Packet::PubAck(PubAck::new(3)))), None);
        assert_eq!(route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)), None);
    }
}
