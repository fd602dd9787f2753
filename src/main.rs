// src/main.rs
use anyhow::Result;
use rust_healthcheck::{
    config,
    metrics::MetricsRegistry,
    probes,
    server::{HealthHandler, MetricsHandler, ServerBuilder},
    HealthChecker,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rust_healthcheck=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "healthcheck.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    // Initialize metrics
    let metrics_registry = Arc::new(MetricsRegistry::new()?);
    let checker = Arc::new(HealthChecker::with_metrics(metrics_registry.collector()));

    let checks = probes::register_http_checks(&checker, &config.checks).await?;
    info!("Registered {} health checks", checks.len());

    // Fan the shutdown signal out to every server
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics_task = if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        let server = ServerBuilder::new(metrics_addr)
            .with_handler(MetricsHandler::new(
                metrics_registry.clone(),
                config.metrics.path.clone(),
            ))
            .bind()
            .await?;

        info!(
            "Metrics available on http://{}{}",
            metrics_addr, config.metrics.path
        );

        let shutdown = wait_for(shutdown_rx.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = server.serve(shutdown).await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let handler = HealthHandler::new(checker.clone(), config.server.health_path.clone());
    let server = ServerBuilder::new(config.server.listen_addr)
        .with_handler(handler)
        .bind()
        .await?;

    info!(
        "Serving health checks on http://{}{}",
        config.server.listen_addr, config.server.health_path
    );

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    server.serve(wait_for(shutdown_rx)).await?;

    if let Some(task) = metrics_task {
        if let Err(e) = task.await {
            error!("Metrics server task failed: {}", e);
        }
    }

    checker.stop_all_caches().await;
    info!("Shutdown complete");

    Ok(())
}

async fn wait_for(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
