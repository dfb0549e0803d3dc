use std::sync::Arc;
use subway_alerts::{
    AlertCheck,
    config::Config,
    email::{AcsEmailClient, ConnectionString},
    feed::HttpFeedSource,
    run_scheduled,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let connection = ConnectionString::parse(&config.connection_string)?;

    tracing::info!(
        "Watching {} for {:?} every {}s",
        config.feed_url,
        config.selectors.as_slice(),
        config.check_interval.as_secs()
    );

    let check = AlertCheck::new(
        &config,
        Box::new(HttpFeedSource::new(config.feed_url.clone())),
        Box::new(AcsEmailClient::new(connection)),
    );

    run_scheduled(Arc::new(check), config.check_interval).await
}
