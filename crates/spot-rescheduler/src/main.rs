//! spot-rescheduler: moves pods from on-demand nodes onto spot nodes.
//!
//! Runs the rebalancing loop against the cluster and serves `/metrics`,
//! `/healthz` and `/status` on the listen address.

mod cli;

use anyhow::{Context, bail};
use clap::Parser;
use spot_core::Rescheduler;
use spot_kube::{KubeClusterReader, KubeDrainExecutor};
use spot_metrics::{MetricsServer, PrometheusRegistry};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Cli, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let config = cli.config().context("invalid configuration")?;
    info!(
        housekeeping_interval = ?config.housekeeping_interval,
        node_drain_delay = ?config.node_drain_delay,
        pod_eviction_timeout = ?config.pod_eviction_timeout,
        max_graceful_termination = ?config.max_graceful_termination,
        on_demand_label = %config.on_demand_label,
        spot_label = %config.spot_label,
        dry_run = config.dry_run,
        "starting spot rescheduler"
    );

    let client = spot_kube::connect(&cli.client_options())
        .await
        .context("failed to create kubernetes client")?;
    let registry = PrometheusRegistry::new();
    let rescheduler = Rescheduler::new(
        config,
        KubeClusterReader::new(client.clone()),
        KubeDrainExecutor::new(client),
        registry.clone(),
    );

    let listener = TcpListener::bind(&cli.listen_address)
        .await
        .with_context(|| format!("failed to listen on {}", cli.listen_address))?;
    let metrics = MetricsServer::new(registry, rescheduler.status());

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut server_stop = stop_tx.subscribe();
    let mut server = tokio::spawn(async move {
        metrics
            .serve_on(listener, async move {
                let _ = server_stop.wait_for(|stop| *stop).await;
            })
            .await
    });
    let mut controller_stop = stop_rx;
    let controller = tokio::spawn(rescheduler.run_until(async move {
        let _ = controller_stop.wait_for(|stop| *stop).await;
    }));

    let server_exit = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown requested");
            None
        }
        result = &mut server => Some(result),
    };
    let _ = stop_tx.send(true);
    controller.await.context("control loop panicked")?;

    match server_exit {
        None => {
            server
                .await
                .context("metrics server panicked")?
                .context("metrics server failed")?;
            info!("spot rescheduler stopped");
            Ok(())
        }
        Some(result) => {
            result
                .context("metrics server panicked")?
                .context("metrics server failed")?;
            bail!("metrics server stopped unexpectedly")
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
