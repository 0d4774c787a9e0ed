//! Redis Pub/Sub 实现的路由总线
//!
//! 每个实例订阅自己的专属频道（前缀 + 实例 ID）；跨实例投递是
//! 单跳定向发布，总线流量与实例数无关。

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::domain::repositories::RoutingBus;
use crate::error::Result;

pub struct RedisRoutingBus {
    client: Arc<redis::Client>,
    connection: ConnectionManager,
}

impl RedisRoutingBus {
    pub async fn new(client: Arc<redis::Client>) -> Result<Self> {
        let connection = ConnectionManager::new(client.as_ref().clone()).await?;
        Ok(Self { client, connection })
    }
}

#[async_trait]
impl RoutingBus for RedisRoutingBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() })
            .boxed();
        Ok(stream)
    }
}
