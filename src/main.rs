//! Stellar Web Authentication Server
//!
//! Issues challenge transactions and exchanges signed challenges for JWTs.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;

use stellar_webauth::config::Config;
use stellar_webauth::horizon::HorizonClient;
use stellar_webauth::state::AppState;
use stellar_webauth::{build_auth_service, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        network = %config.network_passphrase,
        domain = %config.web_auth_domain,
        home_domains = %config.home_domains.join(","),
        signing_keys = %config
            .signing_keys
            .iter()
            .map(|key| key.address())
            .collect::<Vec<_>>()
            .join(","),
        jwt_algorithm = ?config.jwt_algorithm(),
        allow_accounts_that_do_not_exist = config.allow_accounts_that_do_not_exist,
        "Configuration loaded"
    );

    let horizon = Arc::new(HorizonClient::new(
        config.horizon_url.clone(),
        config.horizon_timeout,
    ));
    let auth_service = Arc::new(build_auth_service(&config, horizon));
    let app_state = AppState::new(auth_service);

    let app = routes::app(
        app_state,
        config.environment,
        config.cors_allowed_origins.as_deref(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Challenge endpoint at http://{}/auth", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
