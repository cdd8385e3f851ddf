//! Integration Monitor entry point
//!
//! Runs the monitoring loop with its status API, a single cycle, or a one-off
//! probe of a single endpoint.

use clap::{Parser, Subcommand};
use colored::Colorize;
use integration_monitor::client::WebhookClient;
use integration_monitor::collaborators::{AlertDispatcher, FailoverController};
use integration_monitor::contracts::*;
use integration_monitor::engine::{HealthEvaluator, ProbeRouter};
use integration_monitor::handler::{create_router, AppState};
use integration_monitor::history::{InMemoryHistory, JsonlRecorder};
use integration_monitor::registry::FileRegistry;
use integration_monitor::telemetry::MonitorMetricsRegistry;
use integration_monitor::{MonitorConfig, MonitorScheduler};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "integration-monitor")]
#[command(about = "Integration Monitor - health probing, failover and alerting for external integrations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring loop and the status API
    Serve {
        /// Integration registry file (JSON/YAML)
        #[arg(short, long, env = "MONITOR_REGISTRY")]
        registry: PathBuf,

        /// Monitor config file (JSON/YAML), defaults to MONITOR_* variables
        #[arg(short, long, env = "MONITOR_CONFIG")]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long, default_value = "8083", env = "PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Webhook receiving failover requests
        #[arg(long, env = "MONITOR_FAILOVER_WEBHOOK")]
        failover_webhook: Option<String>,

        /// Webhook receiving alerts
        #[arg(long, env = "MONITOR_ALERT_WEBHOOK")]
        alert_webhook: Option<String>,

        /// Append every health record to this JSON-lines file
        #[arg(long, env = "MONITOR_HISTORY_FILE")]
        history_file: Option<PathBuf>,
    },

    /// Run a single cycle and print the results
    Once {
        /// Integration registry file (JSON/YAML)
        #[arg(short, long, env = "MONITOR_REGISTRY")]
        registry: PathBuf,

        /// Monitor config file (JSON/YAML)
        #[arg(short, long, env = "MONITOR_CONFIG")]
        config: Option<PathBuf>,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe a single endpoint
    Check {
        /// Probe kind (http, tcp)
        #[arg(short = 'k', long, default_value = "http")]
        kind: String,

        /// Endpoint URL or host:port
        #[arg(short, long)]
        endpoint: String,

        /// Health path for HTTP probes
        #[arg(long)]
        health_path: Option<String>,

        /// Timeout in seconds
        #[arg(long, default_value = "5")]
        timeout: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            registry,
            config,
            port,
            host,
            failover_webhook,
            alert_webhook,
            history_file,
        } => {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            let metrics = Arc::new(MonitorMetricsRegistry::new()?);

            let mut builder = MonitorScheduler::builder()
                .config(load_config(config.as_deref())?)
                .registry(Arc::new(FileRegistry::new(registry)))
                .prober(Arc::new(ProbeRouter::default()))
                .telemetry(Arc::clone(&metrics));

            let webhook = WebhookClient::new();
            if let Some(url) = failover_webhook {
                let failover: Arc<dyn FailoverController> =
                    Arc::new(webhook.clone().with_failover_url(url));
                builder = builder.failover(failover);
            }
            if let Some(url) = alert_webhook {
                let alerts: Arc<dyn AlertDispatcher> = Arc::new(webhook.with_alert_url(url));
                builder = builder.alerts(alerts);
            }
            if let Some(path) = history_file {
                builder = builder.recorder(Arc::new(JsonlRecorder::open(&path).await?));
            }

            let scheduler = builder.build()?;
            scheduler.start().await?;

            let router = create_router(Arc::new(AppState::new(scheduler.clone())));
            tracing::info!("Starting Integration Monitor on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Shutdown signal received");
                })
                .await?;

            scheduler.stop().await?;
        }

        Commands::Once {
            registry,
            config,
            json,
        } => {
            let scheduler = MonitorScheduler::builder()
                .config(load_config(config.as_deref())?)
                .registry(Arc::new(FileRegistry::new(registry)))
                .build()?;

            let report = scheduler.run_cycle().await?;
            let snapshot = scheduler.snapshot();

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_table(&snapshot);
                println!(
                    "\n{} checked in {}ms, {} failover(s), {} alert(s)",
                    report.integrations_checked,
                    report.duration_ms,
                    report.failovers.len(),
                    report.alerts_raised
                );
            }

            if !scheduler.metrics().all_available() {
                std::process::exit(1);
            }
        }

        Commands::Check {
            kind,
            endpoint,
            health_path,
            timeout,
        } => {
            let kind: ProbeKind = kind.parse().map_err(anyhow::Error::msg)?;
            let mut probe = ProbeConfig::http(endpoint).with_timeout(timeout);
            probe.kind = kind;
            probe.health_path = health_path;

            let integration = IntegrationConfig::new("cli-check", probe);
            let config = MonitorConfig::default();
            let history = Arc::new(InMemoryHistory::new(
                config.uptime_window(),
                config.history_samples(),
            ));
            let evaluator = HealthEvaluator::new(history, &config);

            let record = evaluator
                .probe_and_evaluate(&ProbeRouter::default(), &integration, None)
                .await;

            println!("{}", serde_json::to_string_pretty(&record)?);

            if !record.is_available() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MonitorConfig> {
    let config = match path {
        Some(path) => MonitorConfig::from_file(path)?,
        None => {
            let config = MonitorConfig::from_env();
            config.validate()?;
            config
        }
    };
    Ok(config)
}

fn print_table(snapshot: &std::collections::BTreeMap<String, IntegrationHealth>) {
    println!(
        "{:<24} {:<10} {:>7} {:>10} {:>8} {:>8}",
        "INTEGRATION", "STATUS", "SCORE", "LATENCY", "ERRORS", "STREAK"
    );

    for record in snapshot.values() {
        let status = match record.status {
            HealthStatus::Healthy => record.status.as_str().green(),
            HealthStatus::Degraded => record.status.as_str().yellow(),
            HealthStatus::Unhealthy => record.status.as_str().red(),
            HealthStatus::Unknown => record.status.as_str().dimmed(),
        };

        println!(
            "{:<24} {:<10} {:>7.1} {:>9.0}ms {:>7.1}% {:>8}",
            record.name,
            status,
            record.health_score,
            record.response_time * 1000.0,
            record.error_rate * 100.0,
            record.consecutive_failures
        );

        if let Some(error) = record.error() {
            println!("  {}", error.dimmed());
        }
    }
}
