use dotenvy::dotenv;
use service_core::observability::logging::init_tracing;
use social_poster::config::get_configuration;
use social_poster::startup::build_router;
use social_poster::AppState;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How often idle server-side session records are swept.
const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "social-poster",
        &configuration.telemetry.log_level,
        configuration.telemetry.otlp_endpoint.as_deref(),
    );

    social_poster::services::metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to register metrics: {}", e))?;

    let state = AppState::new(&configuration)?;
    let app = build_router(state.clone(), &configuration)?;

    let shutdown = CancellationToken::new();

    let scheduler_task = if configuration.scheduler.enabled {
        Some(tokio::spawn(state.scheduler.clone().run(shutdown.clone())))
    } else {
        info!("Post scheduler disabled; scheduled posts will queue but not publish");
        None
    };

    let sessions = state.sessions.clone();
    let max_idle = chrono::Duration::hours(configuration.server.session_idle_hours);
    let prune_shutdown = shutdown.clone();
    let prune_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = prune_shutdown.cancelled() => break,
                _ = ticker.tick() => match sessions.prune_idle(max_idle).await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Pruned idle sessions"),
                    Err(e) => tracing::warn!(error = %e, "Session prune failed"),
                },
            }
        }
    });

    let address = format!(
        "{}:{}",
        configuration.server.host, configuration.server.port
    );
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!("Starting social-poster on {}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .map_err(|e| {
            tracing::error!("Server error: {}", e);
            anyhow::anyhow!("Server error: {}", e)
        })?;

    shutdown.cancel();
    if let Some(task) = scheduler_task {
        let _ = task.await;
    }
    let _ = prune_task.await;

    info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    shutdown.cancel();
}
