//! mqttbridge - main entry point

use clap::Parser;
use mqttbridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use mqttbridge::observability::{init_default_logging, MetricsSnapshot};
use mqttbridge::{bridge_span, BridgeResult, MqttConnector, Supervisor};
use std::path::PathBuf;
use std::process;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info, Instrument};

/// Forward MQTT messages between two brokers, rewriting their topics
#[derive(Parser)]
#[command(name = "mqttbridge")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(value_name = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting mqttbridge v{}", env!("CARGO_PKG_VERSION"));

    info!("Loading configuration from: {}", cli.config.display());
    let config = match BridgeConfig::load_from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config_path = cli.config.display().to_string();
    let mut bridge = tokio::spawn(
        Supervisor::new(config)
            .run(MqttConnector::new(), shutdown_rx)
            .instrument(bridge_span!(config = %config_path)),
    );

    tokio::select! {
        finished = &mut bridge => {
            // The supervisor only returns on its own when startup failed
            report_and_exit(finished);
        }
        _ = wait_for_signal() => {
            info!("Shutting down gracefully...");
        }
    }

    if shutdown_tx.send(true).is_err() {
        error!("Bridge stopped before shutdown was signalled");
    }
    report_and_exit(bridge.await);
}

fn report_and_exit(finished: Result<BridgeResult<MetricsSnapshot>, JoinError>) -> ! {
    match finished {
        Ok(Ok(_)) => {
            info!("Application shutdown complete");
            process::exit(0);
        }
        Ok(Err(e)) => {
            error!("Bridge failed: {}", e);
            process::exit(1);
        }
        Err(e) => {
            error!("Bridge task failed: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT"),
        Err(e) => {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
