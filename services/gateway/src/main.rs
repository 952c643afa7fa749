mod config;
mod error;
mod handlers;
mod models;
mod router;
mod state;

use std::sync::Arc;

use config::GatewayConfig;
use router::create_router;
use sensor_feed::bus::InProcessBus;
use sensor_feed::cache::FreshnessCache;
use sensor_feed::metrics::FeedMetrics;
use sensor_feed::poller::Poller;
use sensor_feed::source::HttpSource;
use state::AppState;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;
    tracing::info!("Starting sensor feed gateway");

    let cache = FreshnessCache::new();
    let metrics = Arc::new(FeedMetrics::new());
    let bus = Arc::new(InProcessBus::new(
        config.backpressure.clone(),
        Arc::clone(&metrics),
    ));
    let shutdown = CancellationToken::new();

    // Ingestion runs for the life of the process
    let source = HttpSource::new(config.upstream_url.clone(), config.fetch_timeout)?;
    tracing::info!(
        upstream = source.url(),
        interval_ms = config.poll_interval.as_millis() as u64,
        "Polling upstream provider"
    );
    let poller = Poller::new(
        source,
        cache.clone(),
        Arc::clone(&bus),
        Arc::clone(&metrics),
        config.poller(),
    );
    let poller_task = tokio::spawn(poller.run(shutdown.child_token()));

    let state = AppState::new(cache, Arc::clone(&bus), metrics, shutdown.clone());
    let app = create_router(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown, bus))
        .await?;

    poller_task.await?;
    tracing::info!("Gateway stopped");

    Ok(())
}

/// Resolves on ctrl-c after stopping the poller and every stream session.
async fn shutdown_signal(shutdown: CancellationToken, bus: Arc<InProcessBus>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Couldn't listen for shutdown signal");
    }

    tracing::info!("Shutdown requested");
    shutdown.cancel();
    bus.close();
}
