use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use glhub_coordinator::api::{self, AppState};
use glhub_coordinator::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glhub_coordinator=debug,tower_http=debug".into()),
        )
        .with(fmt::layer())
        .init();

    tracing::info!("Starting Gitlabhub Coordinator...");

    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;

    if let (Some(cert), Some(key)) = (&config.tls_cert, &config.tls_key) {
        tracing::info!(
            cert = %cert.display(),
            key = %key.display(),
            "TLS material configured; terminate TLS in front of the coordinator"
        );
    }

    tracing::info!(
        max_pipelines = config.max_pipelines,
        long_poll_timeout_ms = config.long_poll_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let addr = config.bind_addr.clone();
    let app = api::create_router(AppState::new(config));

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
