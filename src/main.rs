//! Binary entrypoint: boots the Axum HTTP server, wiring routes, shared
//! state, and the metrics exporter.

use market_sentiment_aggregator::bootstrap;
use market_sentiment_aggregator::config::AppConfig;
use market_sentiment_aggregator::metrics::Metrics;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_sentiment_aggregator=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env();
    let metrics = Metrics::init(
        config.markets_ttl.as_millis() as u64,
        config.price_ttl.as_millis() as u64,
    );

    let state = bootstrap::build_state(&config);
    let router = market_sentiment_aggregator::create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
