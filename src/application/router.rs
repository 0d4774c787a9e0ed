//! 消息路由服务
//!
//! 两级路由，避免广播：
//! 1. 本地快路径：用户在本实例有连接集合时直接投递，不查目录
//! 2. 远程单跳：查在线目录，向归属实例的专属频道定向发布
//!
//! 每个实例启动时订阅一次自己的频道；收到信封后解码并本地投递。
//! 投递不做确认，目录查不到即丢弃（记日志，不算错误）。

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::model::NotificationEnvelope;
use crate::domain::repositories::{PresenceDirectory, RoutingBus};
use crate::error::Result;
use crate::infrastructure::connection_registry::ConnectionRegistry;

/// 单次路由的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// 用户在本实例，已向其本地连接投递
    DeliveredLocal,
    /// 用户在其他实例，信封已发布到其频道
    Forwarded { instance_id: String },
    /// 用户不在任何实例，通知被丢弃
    NoRecipient,
}

pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<dyn PresenceDirectory>,
    bus: Arc<dyn RoutingBus>,
    channel_prefix: String,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<dyn PresenceDirectory>,
        bus: Arc<dyn RoutingBus>,
        channel_prefix: String,
    ) -> Self {
        Self {
            registry,
            directory,
            bus,
            channel_prefix,
        }
    }

    /// 本实例的专属路由频道名
    pub fn own_channel(&self) -> String {
        self.instance_channel(self.registry.instance_id())
    }

    fn instance_channel(&self, instance_id: &str) -> String {
        format!("{}{}", self.channel_prefix, instance_id)
    }

    /// 路由一条通知到用户
    pub async fn route(&self, user_id: &str, payload: &serde_json::Value) -> Result<RouteOutcome> {
        // 快路径：集合存在即走本地，不再查目录
        if self.registry.has_local(user_id) {
            let delivered = self.registry.deliver_local(user_id, payload)?;
            debug!(
                user_id = %user_id,
                delivered,
                "user found locally, delivered directly"
            );
            return Ok(RouteOutcome::DeliveredLocal);
        }

        match self.directory.lookup(user_id).await? {
            Some(instance_id) => {
                let envelope = NotificationEnvelope::new(user_id, payload.clone());
                let channel = self.instance_channel(&instance_id);
                self.bus.publish(&channel, &envelope.encode()?).await?;
                info!(
                    user_id = %user_id,
                    target_instance = %instance_id,
                    "user not local, forwarded to owning instance"
                );
                Ok(RouteOutcome::Forwarded { instance_id })
            }
            None => {
                info!(user_id = %user_id, "user not found in any instance, dropping notification");
                Ok(RouteOutcome::NoRecipient)
            }
        }
    }

    /// 运行本实例的总线订阅循环
    ///
    /// 启动时订阅一次专属频道；收到关闭信号后退出。
    /// 单条消息的解码或投递失败只影响该条消息。
    pub async fn run_subscription(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let channel = self.own_channel();
        let mut stream = self.bus.subscribe(&channel).await?;
        info!(channel = %channel, "subscribed to instance routing channel");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(channel = %channel, "routing subscription shutting down");
                    break;
                }
                message = stream.next() => {
                    match message {
                        Some(raw) => self.handle_bus_message(&raw),
                        None => {
                            error!(channel = %channel, "routing channel stream closed");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// 处理从本实例频道收到的一条信封
    fn handle_bus_message(&self, raw: &str) {
        let envelope = match NotificationEnvelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "failed to decode routed envelope, dropping");
                return;
            }
        };

        match self.registry.deliver_local(&envelope.user_id, &envelope.payload) {
            Ok(true) => {
                debug!(user_id = %envelope.user_id, "delivered routed notification locally");
            }
            // 与刚关闭的连接竞争：收到时已无本地连接，丢弃
            Ok(false) => {
                warn!(
                    user_id = %envelope.user_id,
                    "received routed notification but user no longer connected locally"
                );
            }
            Err(err) => {
                error!(user_id = %envelope.user_id, error = %err, "failed to deliver routed notification");
            }
        }
    }
}
