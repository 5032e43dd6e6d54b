//! Main entry point for the Docker health exporter.

use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use docker_health_exporter::{
    DockerLister, ExporterConfig, HealthPoller, HealthRegistry, HttpServer,
};

#[derive(Parser, Debug)]
#[command(
    name = "docker-health-exporter",
    about = "Export Docker container health checks as Prometheus metrics",
    version
)]
struct Args {
    /// Listen address for the HTTP server (overrides LISTEN_ADDR)
    #[arg(long)]
    listen: Option<String>,

    /// Log level (overrides LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration from the environment
    let mut config = ExporterConfig::from_env()?;

    // Apply CLI overrides
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }

    // Initialize logging
    let log_level: Level = config.logging.level.parse().unwrap_or(Level::INFO);
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("docker_health_exporter={}", log_level).parse()?)
        .add_directive(format!("bollard={}", Level::WARN).parse()?);

    match config.logging.format {
        docker_health_exporter::config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .json()
                .init();
        }
        docker_health_exporter::config::LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
        }
    }

    info!(
        listen = %config.listen,
        poll_interval_secs = config.poll_interval_secs,
        opt_in_only = config.opt_in_only,
        "Starting Docker health exporter"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create the shared registry
    let registry = Arc::new(HealthRegistry::new());

    let listen_addr = config
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Connect to Docker (lazy: the socket is only dialed on the first poll)
    let lister = DockerLister::connect(config.docker_host.as_deref(), config.docker_timeout_secs)?;

    let poller = HealthPoller::new(lister, registry.clone(), &config);
    let server = HttpServer::new(registry.clone(), listen_addr);

    // Start poller task
    let shutdown_rx_poller = shutdown_rx.clone();
    let poller_handle = tokio::spawn(async move {
        poller.run(shutdown_rx_poller).await;
    });

    // Start HTTP server task
    let http_handle = tokio::spawn(async move {
        if let Err(e) = server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate(),
                ).unwrap();
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            std::future::pending::<()>().await;
        } => {
            info!("Received SIGTERM, shutting down");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for tasks with timeout
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = poller_handle.await;
        let _ = http_handle.await;
    })
    .await;

    // Log final statistics
    let stats = registry.stats();
    info!(
        cycles_completed = stats.cycles_completed,
        cycles_failed = stats.cycles_failed,
        containers_monitored = stats.containers_monitored,
        "Final statistics"
    );

    info!("Exporter stopped");

    Ok(())
}
