use std::sync::Arc;

use gateway::{create_router, AppState, Exchange, ExchangeConfig};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gateway API service");

    let config = ExchangeConfig::from_env()?;
    tracing::info!(
        timezone = %config.market_timezone,
        cutoff_hour = config.cutoff_hour,
        cutoff_minute = config.cutoff_minute,
        "Configuration loaded"
    );

    let exchange = Arc::new(Exchange::new(&config)?);
    let app = create_router(AppState::new(exchange));

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
