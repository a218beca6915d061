//! Liyaqa: gym and fitness club management platform.
//!
//! Main entry point that wires the services, starts the background jobs
//! and serves the REST API.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use liyaqa_api::{ApiServer, AppState};
use liyaqa_core::config::AppConfig;
use liyaqa_core::{InMemoryDirectory, NoOpSink};
use liyaqa_marketing::executor::LoggingNotifier;
use liyaqa_marketing::templates::seed_templates;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "liyaqa-server")]
#[command(about = "Gym and fitness club management platform")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "LIYAQA__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "LIYAQA__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "LIYAQA__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Skip background jobs (API-only mode)
    #[arg(long, default_value_t = false)]
    no_jobs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "liyaqa_server=info,liyaqa_api=info,liyaqa_marketing=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Liyaqa starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        utc_offset_hours = config.marketing.utc_offset_hours,
        "Configuration loaded"
    );

    let state = AppState::new(
        &config,
        InMemoryDirectory::new(),
        Arc::new(LoggingNotifier),
        Arc::new(NoOpSink),
    );

    let seeded = seed_templates(&state.campaigns)?;
    info!(templates = seeded, "Campaign templates seeded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if !cli.no_jobs {
        spawn_jobs(&state, &config, shutdown_rx);
    } else {
        info!("Running in API-only mode (no background jobs)");
    }

    let api_server = ApiServer::new(config.clone(), state);

    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Liyaqa is ready to serve traffic");

    tokio::select! {
        result = api_server.start_http() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    Ok(())
}

/// Marketing scheduler, the daily overdue-invoice pass and the expiry
/// sweep for impersonation sessions and team invites.
fn spawn_jobs(state: &AppState, config: &AppConfig, shutdown: watch::Receiver<bool>) {
    let scheduler = state.marketing_scheduler(&config.marketing);
    tokio::spawn(scheduler.run(shutdown));

    let invoices = state.invoices.clone();
    let overdue_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        let mut last_run = None;
        loop {
            interval.tick().await;
            let today = overdue_state.local_now().date();
            if last_run == Some(today) {
                continue;
            }
            let marked = invoices.mark_overdue(today);
            if marked > 0 {
                info!(marked, date = %today, "Invoices marked overdue");
            }
            last_run = Some(today);
        }
    });

    let impersonation = state.impersonation.clone();
    let team = state.team.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let now = Utc::now();
            let sessions = impersonation.expire_stale(now);
            let invites = team.expire_stale(now);
            if sessions + invites > 0 {
                info!(sessions, invites, "Expired stale sessions and invites");
            }
        }
    });
}
