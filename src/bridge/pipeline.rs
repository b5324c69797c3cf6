//! Source-to-destination forwarding
//!
//! Runs on the source connection's loop and publishes on the destination's
//! request handle, which is the only state shared between the two loops.

use super::connection::MessageHandler;
use crate::error::BridgeError;
use crate::mapping::{RuleSet, TopicMapper};
use crate::observability::{BridgeEvent, SharedSink};
use crate::transport::{InboundMessage, Transport, TransportError};
use bytes::Bytes;
use std::str::Utf8Error;
use std::sync::Arc;

/// Message body after the decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Raw(Bytes),
}

impl Payload {
    /// Interpret `bytes` as UTF-8 text
    pub fn decode(bytes: &Bytes) -> Result<Self, Utf8Error> {
        std::str::from_utf8(bytes).map(|text| Payload::Text(text.to_owned()))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }

    /// Bytes to republish; identical to what was received either way
    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Text(text) => Bytes::from(text),
            Payload::Raw(bytes) => bytes,
        }
    }
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    Forwarded { address: String },
    Unmatched,
    PublishFailed,
}

/// Rewrites inbound addresses and republishes on the destination
pub struct ForwardingPipeline<T: Transport> {
    rules: Arc<RuleSet>,
    destination: T,
    sink: SharedSink,
}

impl<T: Transport> ForwardingPipeline<T> {
    pub fn new(rules: Arc<RuleSet>, destination: T, sink: SharedSink) -> Self {
        Self {
            rules,
            destination,
            sink,
        }
    }

    /// Forward one message; failures are reported to the sink, never returned
    pub fn forward(&self, message: InboundMessage) -> ForwardOutcome {
        let InboundMessage { address, payload } = message;

        let payload = match Payload::decode(&payload) {
            Ok(text) => text,
            Err(error) => {
                self.sink.record(&BridgeEvent::Failure(BridgeError::decode(
                    address.as_str(),
                    error,
                )));
                Payload::Raw(payload)
            }
        };

        let Some(target) = TopicMapper::resolve(&address, &self.rules) else {
            self.sink.record(&BridgeEvent::Unmatched { address });
            return ForwardOutcome::Unmatched;
        };

        // A zero-length topic is a protocol violation the broker answers by
        // dropping the destination session
        if target.is_empty() {
            let error =
                TransportError::PublishFailed(format!("{address} rewrites to an empty topic"));
            self.sink
                .record(&BridgeEvent::Failure(BridgeError::publish(address, error)));
            return ForwardOutcome::PublishFailed;
        }

        let text = payload.is_text();
        let body = payload.into_bytes();
        let size = body.len();

        match self.destination.publish(&target, body) {
            Ok(()) => {
                self.sink.record(&BridgeEvent::Forwarded {
                    from: address,
                    to: target.clone(),
                    bytes: size,
                    text,
                });
                ForwardOutcome::Forwarded { address: target }
            }
            Err(error) => {
                self.sink
                    .record(&BridgeEvent::Failure(BridgeError::publish(target, error)));
                ForwardOutcome::PublishFailed
            }
        }
    }
}

impl<T: Transport> MessageHandler for ForwardingPipeline<T> {
    fn on_message(&self, message: InboundMessage) {
        self.forward(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::RewriteRule;
    use crate::testing::{MockTransport, RecordingSink};

    fn pipeline(
        transport: MockTransport,
        sink: Arc<RecordingSink>,
    ) -> ForwardingPipeline<MockTransport> {
        let rules = RuleSet::new(vec![RewriteRule::new("home/#", "building1/#")]);
        ForwardingPipeline::new(Arc::new(rules), transport, sink)
    }

    #[test]
    fn test_payload_decode() {
        assert_eq!(
            Payload::decode(&Bytes::from_static(b"21.5")),
            Ok(Payload::Text("21.5".to_string()))
        );
        assert!(Payload::decode(&Bytes::from_static(&[0xff, 0x00])).is_err());
        assert_eq!(
            Payload::Raw(Bytes::from_static(&[1, 2])).into_bytes(),
            Bytes::from_static(&[1, 2])
        );
    }

    #[test]
    fn test_forwards_text_payload() {
        let transport = MockTransport::new();
        let sink = Arc::new(RecordingSink::new());
        let outcome = pipeline(transport.clone(), sink.clone())
            .forward(InboundMessage::new("home/kitchen/temp", "21.5"));

        assert_eq!(
            outcome,
            ForwardOutcome::Forwarded {
                address: "building1/kitchen/temp".to_string()
            }
        );
        assert_eq!(
            transport.published(),
            vec![(
                "building1/kitchen/temp".to_string(),
                Bytes::from_static(b"21.5")
            )]
        );
        assert_eq!(sink.count("forwarded"), 1);
    }

    #[test]
    fn test_binary_payload_forwarded_unchanged_with_warning() {
        let transport = MockTransport::new();
        let sink = Arc::new(RecordingSink::new());
        let body = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);

        pipeline(transport.clone(), sink.clone())
            .forward(InboundMessage::new("home/camera", body.clone()));

        assert_eq!(transport.published(), vec![("building1/camera".to_string(), body)]);
        assert_eq!(sink.failures("decode"), 1);
        assert_eq!(sink.count("forwarded"), 1);
    }

    #[test]
    fn test_unmatched_is_dropped_silently() {
        let transport = MockTransport::new();
        let sink = Arc::new(RecordingSink::new());

        let outcome = pipeline(transport.clone(), sink.clone())
            .forward(InboundMessage::new("garden/light", "on"));

        assert_eq!(outcome, ForwardOutcome::Unmatched);
        assert!(transport.published().is_empty());
        assert_eq!(sink.kinds(), vec!["unmatched"]);
    }

    #[test]
    fn test_publish_failure_is_reported_not_retried() {
        let transport = MockTransport::with_publish_failure();
        let sink = Arc::new(RecordingSink::new());
        let pipeline = pipeline(transport.clone(), sink.clone());

        let outcome = pipeline.forward(InboundMessage::new("home/kitchen", "1"));

        assert_eq!(outcome, ForwardOutcome::PublishFailed);
        assert_eq!(sink.failures("publish"), 1);

        transport.fail_publishes(false);
        assert!(transport.published().is_empty());
    }

    #[test]
    fn test_rewrite_to_empty_topic_is_dropped() {
        let transport = MockTransport::new();
        let sink = Arc::new(RecordingSink::new());
        let rules = RuleSet::new(vec![RewriteRule::new("home/#", "#")]);
        let pipeline = ForwardingPipeline::new(Arc::new(rules), transport.clone(), sink.clone());

        let outcome = pipeline.forward(InboundMessage::new("home/", "x"));

        assert_eq!(outcome, ForwardOutcome::PublishFailed);
        assert!(transport.published().is_empty());
        assert_eq!(sink.failures("publish"), 1);
        assert_eq!(sink.count("forwarded"), 0);
        assert!(sink.descriptions()[0].contains("empty topic"));

        // Prefix removal still works for addresses with something left over
        let outcome = pipeline.forward(InboundMessage::new("home/kitchen", "x"));
        assert_eq!(
            outcome,
            ForwardOutcome::Forwarded {
                address: "kitchen".to_string()
            }
        );
    }
}
