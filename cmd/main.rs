use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use realtime_notify::config::AppConfig;
use realtime_notify::service::ApplicationBootstrap;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1);
    let config = AppConfig::load(config_path.as_deref())?;

    // 启动诊断
    info!("--------------------------------------------------");
    info!(redis_url = %config.redis.url, "Redis");
    info!(
        bootstrap = %config.kafka.bootstrap_servers,
        group = %config.kafka.group_id,
        topics = ?config.kafka.topics,
        "Kafka"
    );
    info!("--------------------------------------------------");
    info!("Starting Realtime Notifications service (WebSocket endpoint at /ws) ...");

    ApplicationBootstrap::run(config).await
}
