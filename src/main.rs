//! metricwatch - threshold-monitoring sidecar
//!
//! CLI entry point: loads configuration, validates the action registry, and
//! runs the monitor loop alongside leader election until shutdown.

use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use metricwatch::cli::{Cli, Command};
use metricwatch::config::Config;
use metricwatch::leadership::{self, ElectionOutcome};
use metricwatch::monitor::MonitorEngine;
use metricwatch::sampler::PrometheusSampler;
use metricwatch::threshold::StateMachine;
use metricwatch::{Dispatcher, build_registry, builtin_names};

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let level = match cli_log_level.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    // Sidecar convention: structured logs to stderr, collected by the
    // container runtime
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Some(Command::CheckConfig) => cmd_check_config(&config),
        Some(Command::ListActions) => cmd_list_actions(),
        Some(Command::Run) | None => cmd_run(&config).await,
    }
}

/// Validate configuration the same way startup does, then exit
fn cmd_check_config(config: &Config) -> Result<()> {
    config.validate()?;
    let registry = build_registry(&config.required_actions(), &config.actions)
        .map_err(|e| eyre::eyre!("action validation failed: {}", e))?;
    config.build_policy(&registry)?;

    println!("Configuration OK");
    println!("  metric: {}", config.metric.name);
    println!("  endpoint: {}", config.metric.endpoint);
    for (name, tier) in [("soft", &config.thresholds.soft), ("hard", &config.thresholds.hard)] {
        if let Some(tier) = tier {
            println!(
                "  {} tier: {} {} for {}s, action '{}', cooldown {}s",
                name, config.thresholds.operator, tier.value, tier.sustain_secs, tier.action, tier.cooldown_secs
            );
        }
    }
    Ok(())
}

/// List the built-in actions
fn cmd_list_actions() -> Result<()> {
    println!("Built-in actions:");
    for name in builtin_names() {
        println!("  {}", name);
    }
    Ok(())
}

/// Run the monitor loop until shutdown or fencing
async fn cmd_run(config: &Config) -> Result<()> {
    config.validate()?;

    // Actions validate once at load time; a failing validation prevents
    // startup with a message naming the action
    let registry = build_registry(&config.required_actions(), &config.actions)
        .map_err(|e| eyre::eyre!("action validation failed: {}", e))?;
    let policy = config.build_policy(&registry)?;

    let query = PrometheusSampler::build_query(&config.metric.name, &config.metric.label_filters);
    let sampler = Box::new(PrometheusSampler::new(config.metric.endpoint.clone(), query));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (leadership, elector_task) = leadership::start(&config.leadership, shutdown_rx.clone());
    let dispatcher = Dispatcher::new(leadership, config.metric.name.clone());
    let machine = StateMachine::new(policy);

    let engine = MonitorEngine::new(
        sampler,
        machine,
        dispatcher,
        Duration::from_millis(config.polling.interval_ms),
        Duration::from_millis(config.polling.sample_timeout_ms),
        config.missing_value,
    );

    let monitor_handle = tokio::spawn(engine.run(shutdown_rx));

    info!(metric = %config.metric.name, "metricwatch started");

    let has_elector = elector_task.is_some();
    let elector = elector_outcome(elector_task);
    tokio::pin!(elector);

    let fenced;

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        fenced = tokio::select! {
            _ = sigint.recv() => {
                warn!("SIGINT received, shutting down");
                false
            }
            _ = sigterm.recv() => {
                warn!("SIGTERM received, shutting down");
                false
            }
            outcome = &mut elector => {
                matches!(outcome, ElectionOutcome::Fenced)
            }
        };
    }

    #[cfg(not(unix))]
    {
        fenced = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl+C received, shutting down");
                false
            }
            outcome = &mut elector => {
                matches!(outcome, ElectionOutcome::Fenced)
            }
        };
    }

    let _ = shutdown_tx.send(true);
    let _ = monitor_handle.await;

    if !fenced && has_elector {
        // Give the elector a moment to release its lease so a successor can
        // claim it promptly
        let _ = tokio::time::timeout(Duration::from_secs(5), &mut elector).await;
    }

    if fenced {
        error!("leadership lost after being held, exiting for failover");
        return Err(eyre::eyre!("leadership lost after being held"));
    }

    info!("metricwatch stopped");
    Ok(())
}

/// Resolve to the elector's outcome, or never when no elector is running.
/// A crashed elector counts as fenced: leadership state is unknown and a
/// clean exit would leave a possibly-stale leader unnoticed.
async fn elector_outcome(task: Option<JoinHandle<ElectionOutcome>>) -> ElectionOutcome {
    match task {
        Some(task) => task.await.unwrap_or_else(|e| {
            error!(error = %e, "elector task failed");
            ElectionOutcome::Fenced
        }),
        None => std::future::pending().await,
    }
}
