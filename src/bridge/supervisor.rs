//! Process-wide bridge lifecycle
//!
//! The supervisor builds both connections, wires the forwarding pipeline
//! into the source, starts the two loops once and waits for shutdown. It does
//! no retrying of its own; reconnection is the transport's job.

use super::connection::BrokerConnection;
use super::pipeline::ForwardingPipeline;
use super::state::ConnectionStatus;
use crate::config::BridgeConfig;
use crate::connection_span;
use crate::error::{BridgeError, BridgeResult};
use crate::observability::{
    BridgeEvent, BridgeMetrics, CompositeSink, EventSink, MetricsSnapshot, SharedSink,
    TracingSink,
};
use crate::transport::{ConnectionRole, Connector, SessionOptions, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tracing::{debug, error, info, Instrument};

/// Owns the bridge from configuration to shutdown
pub struct Supervisor {
    config: BridgeConfig,
    metrics: Arc<BridgeMetrics>,
    sinks: CompositeSink,
}

impl Supervisor {
    /// Supervisor logging through tracing and counting into its own metrics
    pub fn new(config: BridgeConfig) -> Self {
        let metrics = Arc::new(BridgeMetrics::new());
        let sinks = CompositeSink::new()
            .with(TracingSink)
            .with(Arc::clone(&metrics));
        Self {
            config,
            metrics,
            sinks,
        }
    }

    /// Also deliver every event to `sink`
    pub fn with_sink<S: EventSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.add(sink);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the bridge until `shutdown` flips to true or its sender is dropped
    ///
    /// Returns the final counters. Only an invalid configuration, a session
    /// that cannot even be prepared, or a failed initial connect under
    /// `fail_fast` end the run early.
    pub async fn run<C: Connector>(
        self,
        connector: C,
        mut shutdown: watch::Receiver<bool>,
    ) -> BridgeResult<MetricsSnapshot> {
        let Supervisor {
            config,
            metrics,
            sinks,
        } = self;
        config.validate()?;
        let sink: SharedSink = Arc::new(sinks);

        let rules = Arc::new(config.rule_set());
        for rule in rules.skipped_rules() {
            sink.record(&BridgeEvent::PatternSkipped {
                pattern: rule.source_pattern.clone(),
            });
        }
        let patterns = rules.subscription_patterns();

        let options = SessionOptions::from_bridge(&config.bridge);
        let (dst_transport, dst_events) = connector
            .connect(ConnectionRole::Destination, &config.broker_dst, &options)
            .map_err(|e| BridgeError::connection(ConnectionRole::Destination, e))?;
        let (src_transport, src_events) = connector
            .connect(
                ConnectionRole::Source,
                &config.broker_src,
                &options.clone().with_min_capacity(patterns.len() + 1),
            )
            .map_err(|e| BridgeError::connection(ConnectionRole::Source, e))?;

        let pipeline = Arc::new(ForwardingPipeline::new(
            Arc::clone(&rules),
            dst_transport.clone(),
            Arc::clone(&sink),
        ));

        let destination = BrokerConnection::new(
            ConnectionRole::Destination,
            dst_transport,
            dst_events,
            Arc::clone(&sink),
        );
        let source = BrokerConnection::new(
            ConnectionRole::Source,
            src_transport,
            src_events,
            Arc::clone(&sink),
        )
        .with_subscriptions(patterns)
        .with_message_handler(pipeline);

        let dst_status = destination.status();
        let src_status = source.status();

        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = vec![
            (
                ConnectionRole::Destination,
                tokio::spawn(
                    destination
                        .run(stop_rx.clone())
                        .instrument(connection_span!(role = "destination")),
                ),
            ),
            (
                ConnectionRole::Source,
                tokio::spawn(
                    source
                        .run(stop_rx)
                        .instrument(connection_span!(role = "source")),
                ),
            ),
        ];

        let source_endpoint = format!("{}:{}", config.broker_src.host, config.broker_src.port);
        let destination_endpoint = format!("{}:{}", config.broker_dst.host, config.broker_dst.port);
        info!(
            source = %source_endpoint,
            destination = %destination_endpoint,
            rules = rules.len(),
            "Bridge started"
        );

        if config.bridge.fail_fast {
            let timeout = Duration::from_secs(config.bridge.connect_timeout_secs);
            let deadline = Instant::now() + timeout;
            let initial = async {
                await_initial_session(ConnectionRole::Destination, dst_status, deadline).await?;
                await_initial_session(ConnectionRole::Source, src_status, deadline).await
            };

            let aborted = tokio::select! {
                result = initial => result.err(),
                _ = shutdown_requested(&mut shutdown) => None,
            };
            if let Some(failure) = aborted {
                error!("Initial connection failed, stopping bridge: {}", failure);
                stop_connections(&stop_tx, tasks).await;
                return Err(failure);
            }
        }

        let mut ticker = stats_ticker(config.bridge.stats_interval_secs);
        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = next_tick(&mut ticker) => {
                    log_snapshot("Bridge statistics", &metrics.snapshot());
                }
            }
        }

        info!("Shutdown requested, stopping connections");
        stop_connections(&stop_tx, tasks).await;

        let snapshot = metrics.snapshot();
        log_snapshot("Bridge stopped", &snapshot);
        Ok(snapshot)
    }
}

/// Resolves once shutdown is requested; a dropped sender counts as a request
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // wait_for checks the current value first
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Wait until `role` has had a session, or report why it has not
async fn await_initial_session(
    role: ConnectionRole,
    mut status: watch::Receiver<ConnectionStatus>,
    deadline: Instant,
) -> BridgeResult<()> {
    let settled = tokio::time::timeout_at(
        deadline,
        status.wait_for(|s| s.sessions > 0 || s.last_disconnect.is_some()),
    )
    .await
    .map(|seen| seen.map(|s| (s.sessions, s.last_disconnect.clone())));

    let reason = match settled {
        Err(_) => "no session established before the connect timeout".to_string(),
        Ok(Err(_)) => "connection loop stopped".to_string(),
        Ok(Ok((sessions, _))) if sessions > 0 => return Ok(()),
        Ok(Ok((_, last_disconnect))) => last_disconnect.unwrap_or_default(),
    };
    Err(BridgeError::connection(
        role,
        TransportError::ConnectionFailed(reason),
    ))
}

async fn stop_connections(
    stop_tx: &watch::Sender<bool>,
    tasks: Vec<(ConnectionRole, JoinHandle<()>)>,
) {
    if stop_tx.send(true).is_err() {
        debug!("Connection loops already finished");
    }
    for (role, task) in tasks {
        if let Err(join_error) = task.await {
            error!(role = %role, "Connection loop ended abnormally: {}", join_error);
        }
    }
}

fn stats_ticker(interval_secs: u64) -> Option<Interval> {
    if interval_secs == 0 {
        return None;
    }
    let period = Duration::from_secs(interval_secs);
    Some(tokio::time::interval_at(Instant::now() + period, period))
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn log_snapshot(message: &str, snapshot: &MetricsSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(stats) => info!(stats = %stats, "{}", message),
        Err(e) => debug!("Failed to serialize metrics: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_requested_on_dropped_sender() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_millis(100), shutdown_requested(&mut rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_await_initial_session_reports_failure_reason() {
        let (tx, rx) = watch::channel(ConnectionStatus::default());
        tx.send_modify(|s| s.last_disconnect = Some("refused".to_string()));

        let result = await_initial_session(
            ConnectionRole::Source,
            rx,
            Instant::now() + Duration::from_secs(1),
        )
        .await;

        let error = result.unwrap_err();
        assert_eq!(error.kind(), "connection");
        assert!(error.to_string().contains("refused"));
    }

    #[tokio::test]
    async fn test_await_initial_session_times_out() {
        let (_tx, rx) = watch::channel(ConnectionStatus::default());
        let result = await_initial_session(
            ConnectionRole::Destination,
            rx,
            Instant::now() + Duration::from_millis(20),
        )
        .await;

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("before the connect timeout"));
    }

    #[test]
    fn test_stats_ticker_disabled_at_zero() {
        assert!(stats_ticker(0).is_none());
    }
}
