use anyhow::Context;
use backlog_service::shell::config::AppConfig;
use backlog_service::shell::http::router;
use backlog_service::shell::workers::Workers;
use backlog_service::shell::compose;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log filter")?;
    fmt().with_env_filter(filter).init();
    if let Some(path) = &config.env_file {
        tracing::info!(path = %path.display(), "loaded environment file");
    }

    let backend = compose(&config).await?;
    let workers = Workers::spawn(backend.relay, backend.bus);

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("binding {}", config.http_addr))?;
    tracing::info!("Backlog API: http://{}", config.http_addr);

    axum::serve(listener, router(backend.state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("shutting down");
    workers.stop().await;
    if let Err(e) = backend.cache.close().await {
        tracing::warn!(error = %e, "cache close failed");
    }
    Ok(())
}
