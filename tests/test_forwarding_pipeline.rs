//! Forwarding pipeline wired into a source connection
//!
//! Messages enter through the source connection's scripted event stream and
//! leave through the destination's mock transport.

use bytes::Bytes;
use mqttbridge::bridge::{BrokerConnection, ForwardingPipeline};
use mqttbridge::mapping::{RewriteRule, RuleSet};
use mqttbridge::testing::{eventually, MockTransport, RecordingSink, ScriptedEvents};
use mqttbridge::transport::ConnectionRole;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    destination: MockTransport,
    script: mqttbridge::testing::EventScript,
    sink: Arc<RecordingSink>,
    _stop: watch::Sender<bool>,
}

fn start(rules: Vec<RewriteRule>) -> Harness {
    let rules = Arc::new(RuleSet::new(rules));
    let destination = MockTransport::new();
    let sink = Arc::new(RecordingSink::new());
    let pipeline = Arc::new(ForwardingPipeline::new(
        Arc::clone(&rules),
        destination.clone(),
        sink.clone(),
    ));

    let (events, script) = ScriptedEvents::new();
    let source = BrokerConnection::new(
        ConnectionRole::Source,
        MockTransport::new(),
        events,
        sink.clone(),
    )
    .with_subscriptions(rules.subscription_patterns())
    .with_message_handler(pipeline);

    let (stop, stop_rx) = watch::channel(false);
    tokio::spawn(source.run(stop_rx));

    Harness {
        destination,
        script,
        sink,
        _stop: stop,
    }
}

#[tokio::test]
async fn test_messages_forwarded_with_rewritten_addresses() {
    let harness = start(vec![
        RewriteRule::new("home/#", "building1/#"),
        RewriteRule::new("sensors/raw", "sensors/clean"),
    ]);

    harness.script.connect();
    harness.script.message("home/kitchen/temp", "21.5");
    harness.script.message("garden/light", "on");
    harness.script.message("sensors/raw", "42");

    assert!(eventually(WAIT, || harness.destination.published().len() == 2).await);
    assert_eq!(
        harness.destination.published(),
        vec![
            (
                "building1/kitchen/temp".to_string(),
                Bytes::from_static(b"21.5")
            ),
            ("sensors/clean".to_string(), Bytes::from_static(b"42")),
        ]
    );
    assert_eq!(harness.sink.count("unmatched"), 1);
}

#[tokio::test]
async fn test_first_matching_rule_wins() {
    let harness = start(vec![
        RewriteRule::new("a/#", "x/#"),
        RewriteRule::new("a/b/#", "y/#"),
    ]);

    harness.script.connect();
    harness.script.message("a/b/c", "1");

    assert!(eventually(WAIT, || !harness.destination.published().is_empty()).await);
    assert_eq!(harness.destination.published()[0].0, "x/b/c");
}

#[tokio::test]
async fn test_binary_payload_survives_unchanged() {
    let harness = start(vec![RewriteRule::new("cam/#", "archive/cam/#")]);
    let frame = Bytes::from_static(&[0x89, 0x50, 0x4e, 0x47, 0xff, 0x00]);

    harness.script.connect();
    harness.script.message("cam/front", frame.clone());

    assert!(eventually(WAIT, || !harness.destination.published().is_empty()).await);
    assert_eq!(
        harness.destination.published(),
        vec![("archive/cam/front".to_string(), frame)]
    );
    assert_eq!(harness.sink.failures("decode"), 1);
}

#[tokio::test]
async fn test_publish_failure_drops_message_and_keeps_forwarding() {
    let harness = start(vec![RewriteRule::new("home/#", "building1/#")]);
    harness.destination.fail_publishes(true);

    harness.script.connect();
    harness.script.message("home/a", "lost");

    assert!(eventually(WAIT, || harness.sink.failures("publish") == 1).await);

    harness.destination.fail_publishes(false);
    harness.script.message("home/b", "kept");

    assert!(eventually(WAIT, || harness.destination.published().len() == 1).await);
    assert_eq!(harness.destination.published()[0].0, "building1/b");
}

#[tokio::test]
async fn test_single_level_wildcard_rule_never_forwards() {
    let harness = start(vec![RewriteRule::new("home/+/temp", "temps/#")]);

    harness.script.connect();
    harness.script.message("home/kitchen/temp", "20");

    assert!(eventually(WAIT, || harness.sink.count("unmatched") == 1).await);
    assert!(harness.destination.published().is_empty());
}
