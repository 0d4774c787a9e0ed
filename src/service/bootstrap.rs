//! 应用启动器 - 负责依赖注入和服务启动
//!
//! 进程级单例（注册表、目录客户端、路由器）全部在这里显式构建并注入，
//! 不使用环境全局状态；生命周期与进程一致，关停时统一广播关闭信号。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::router::MessageRouter;
use crate::config::AppConfig;
use crate::domain::repositories::{PresenceDirectory, RoutingBus};
use crate::infrastructure::connection_registry::ConnectionRegistry;
use crate::infrastructure::messaging::kafka_consumer::EventLogConsumer;
use crate::infrastructure::messaging::redis_bus::RedisRoutingBus;
use crate::infrastructure::persistence::redis::RedisPresenceDirectory;
use crate::interface::ws::{self, WsState};

/// 后台任务的关停等待上限
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub config: Arc<AppConfig>,
    pub instance_id: String,
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<MessageRouter>,
    pub consumer: EventLogConsumer,
}

/// 应用启动器
pub struct ApplicationBootstrap;

impl ApplicationBootstrap {
    /// 运行应用的主入口点
    pub async fn run(config: AppConfig) -> Result<()> {
        let context = Self::create_context(config).await?;
        Self::start(context).await
    }

    /// 创建应用上下文：Redis 目录与总线、连接注册表、路由器、Kafka 消费者
    pub async fn create_context(config: AppConfig) -> Result<ApplicationContext> {
        let config = Arc::new(config);

        // 实例标识：进程生命周期内固定，同时作为专属路由频道的后缀
        let instance_id = Uuid::new_v4().to_string();

        let redis_client = Arc::new(
            redis::Client::open(config.redis.url.as_str())
                .context("failed to create redis client")?,
        );

        let directory: Arc<dyn PresenceDirectory> = Arc::new(
            RedisPresenceDirectory::new(&redis_client, config.redis.directory_key.clone())
                .await
                .context("failed to connect presence directory")?,
        );
        let bus: Arc<dyn RoutingBus> = Arc::new(
            RedisRoutingBus::new(redis_client.clone())
                .await
                .context("failed to connect routing bus")?,
        );

        let registry = Arc::new(ConnectionRegistry::new(
            instance_id.clone(),
            directory.clone(),
        ));
        let router = Arc::new(MessageRouter::new(
            registry.clone(),
            directory,
            bus,
            config.redis.channel_prefix.clone(),
        ));

        // 主题对账在这里发生；失败直接终止启动
        let consumer = EventLogConsumer::new(config.kafka.clone(), router.clone())
            .await
            .context("failed to initialise event log consumer")?;

        info!(instance_id = %instance_id, "application context initialised");

        Ok(ApplicationContext {
            config,
            instance_id,
            registry,
            router,
            consumer,
        })
    }

    /// 启动后台任务和 HTTP/WebSocket 服务器，阻塞到进程关停
    async fn start(context: ApplicationContext) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // 路由总线订阅任务
        let router = context.router.clone();
        let subscription_shutdown = shutdown_rx.clone();
        let subscription = tokio::spawn(async move {
            if let Err(err) = router.run_subscription(subscription_shutdown).await {
                error!(error = %err, "routing subscription terminated");
            }
        });

        // 事件源消费任务
        let consumer = context.consumer;
        let consumer_shutdown = shutdown_rx.clone();
        let consumption = tokio::spawn(async move {
            if let Err(err) = consumer.run(consumer_shutdown).await {
                error!(error = %err, "event log consumer terminated");
            }
        });

        let app = ws::app_router(WsState::new(context.registry.clone(), shutdown_rx.clone()));
        let bind_addr = format!(
            "{}:{}",
            context.config.server.address, context.config.server.port
        );
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;

        info!(
            instance_id = %context.instance_id,
            address = %bind_addr,
            "✅ realtime notifications service listening (WebSocket endpoint at /ws)"
        );

        // Ctrl-C 触发全局关闭信号
        let signal_tx = shutdown_tx.clone();
        let mut serve_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = signal_tx.send(true);
            }
        });

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = serve_shutdown.changed().await;
            })
            .await
            .context("server failed")?;

        // 确保后台任务也收到信号（例如服务器自行退出的情况）
        let _ = shutdown_tx.send(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, async {
            let _ = subscription.await;
            let _ = consumption.await;
        })
        .await
        .is_err()
        {
            warn!("background tasks did not stop within grace period");
        }

        info!("service stopped");
        Ok(())
    }
}
