//! koda server binary.

use anyhow::{Context, Result};
use koda::config::AppConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "koda=info,kchat=info,kagents=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    let addr = config.server.bind_addr()?;

    let runtime = koda::build_runtime(&config).context("Failed to build runtime")?;
    let sweeper = koda::spawn_session_sweeper(runtime.chat.clone(), config.session.sweep_interval());
    let app = koda::router(runtime.chat, &config.server.cors_allowed_origins)
        .context("Failed to build router")?;

    tracing::info!(
        phase = "startup",
        event = "listening",
        %addr,
        provider = runtime.gateway.provider_name(),
        model_id = %config.provider.model_id,
        origins = ?config.server.cors_allowed_origins
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    sweeper.abort();
    tracing::info!(phase = "shutdown", event = "stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(phase = "shutdown", event = "ctrl_c_unavailable", error = %error);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(phase = "shutdown", event = "sigterm_unavailable", error = %error);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(phase = "shutdown", event = "signal", signal = "ctrl_c"),
        _ = terminate => tracing::info!(phase = "shutdown", event = "signal", signal = "sigterm"),
    }
}
