//! MinIO Fleet - Main Entry Point

use anyhow::Context;
use fleet_api::{build_router, wiring, ApiState};
use fleet_common::FleetConfig;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("MinIO Fleet v{}", env!("CARGO_PKG_VERSION"));

    let config = FleetConfig::from_env().context("loading configuration")?;
    if config.api_key.as_deref().map_or(true, str::is_empty) {
        warn!("API_KEY is not set, every /v1 request will be refused");
    }

    let orchestrator = wiring::build_orchestrator(&config).await?;
    let app = build_router(
        ApiState {
            orchestrator: orchestrator.clone(),
            api_key: config.api_key.clone(),
        },
        config.allowed_origin.as_deref(),
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, backend = ?config.backend, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    info!("draining background workflows");
    if !orchestrator.shutdown(config.lifecycle.shutdown_grace()).await {
        warn!("shutdown grace elapsed with workflows still running");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
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
    info!("shutdown signal received");
}
