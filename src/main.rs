//! PredVis headless monitor - Main Entry Point
//!
//! Connects to the sink mote through serialdump, registers the predicates
//! listed in the config, and logs topology and feedback until the link ends.
//!
//! Usage: `predvis [config.toml]`

use anyhow::Context;
use crossbeam_channel::RecvTimeoutError;
use predvis_rs::{
    backend::SerialDumpConnector,
    config::{default_config_path, AppConfig, LoggingConfig},
    monitor::{WsnEvent, WsnMonitor},
    predicate::{pipeline_from_config, PredicatePipeline},
};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,predvis_rs=debug";
const LOG_FILE_PREFIX: &str = "predvis.log";
const LINK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Install the global subscriber. The returned guard must live until exit.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let default_filter = logging.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn load_config() -> anyhow::Result<AppConfig> {
    match std::env::args_os().nth(1) {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        None => Ok(AppConfig::load_or_default()),
    }
}

fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let _guard = init_logging(&config.logging);

    tracing::info!("Starting PredVis monitor");
    if let Some(path) = default_config_path() {
        tracing::debug!("Default config path: {}", path.display());
    }

    let pipeline = pipeline_from_config(&config.compiler).unwrap_or_else(|e| {
        tracing::warn!("Predicates cannot be built: {}", e);
        PredicatePipeline::unavailable()
    });

    let connector = SerialDumpConnector::from_config(&config.link);
    let monitor = WsnMonitor::from_config(&config, Box::new(connector), pipeline);

    let mut deploy_on_connect = Vec::new();
    for entry in &config.predicates {
        let path = config.compiler.resolve_script(&entry.script);
        let id = monitor.registry().create_from_file(&entry.name, path);
        if entry.deploy_on_connect {
            deploy_on_connect.push(id);
        }
    }

    let events = monitor.events();
    monitor.connect().context("Failed to connect to the sink mote")?;

    for id in deploy_on_connect {
        if let Err(e) = monitor.deploy_predicate(id) {
            tracing::error!("Failed to deploy predicate {}: {}", id, e);
        }
    }

    loop {
        // A lagging subscriber can miss the closing event, so poll the link too
        let event = match events.recv_timeout(LINK_POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) if monitor.is_connected() => continue,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("Link is down");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match event {
            WsnEvent::TopologyUpdated(history) => {
                if let Some((round, topology)) =
                    history.latest_round().and_then(|r| history.round(r).map(|t| (r, t)))
                {
                    tracing::info!(
                        "Round {}: {} motes, {} links ({} rounds kept)",
                        round,
                        topology.vertex_count(),
                        topology.edge_count(),
                        history.len()
                    );
                }
            }
            WsnEvent::Feedback {
                predicate_id,
                feedback,
            } => {
                let name = monitor
                    .registry()
                    .get(predicate_id)
                    .map(|p| p.name)
                    .unwrap_or_else(|_| "<unknown>".to_string());
                tracing::info!("Predicate {} '{}':\n{}", predicate_id, name, feedback);
            }
            WsnEvent::LinkClosed => {
                tracing::info!("Sink closed the link");
                break;
            }
            WsnEvent::LinkLost(error) => {
                tracing::error!("Lost the link: {}", error);
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    monitor.close();
    Ok(())
}
