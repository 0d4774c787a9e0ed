//! 内存版路由总线（本地开发与测试用）
//!
//! 与 Redis Pub/Sub 一致的语义：没有订阅者的频道上发布即丢弃。

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::wrappers::BroadcastStream;

use crate::domain::repositories::RoutingBus;
use crate::error::Result;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
pub struct InMemoryRoutingBus {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl InMemoryRoutingBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoutingBus for InMemoryRoutingBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let channels = self.channels.lock().await;
        if let Some(tx) = channels.get(channel) {
            // 无接收者时发送失败，按 fire-and-forget 语义丢弃
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>> {
        let mut channels = self.channels.lock().await;
        let tx = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        let stream = BroadcastStream::new(tx.subscribe())
            .filter_map(|item| async move { item.ok() })
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 订阅后发布可收到；未订阅频道上的发布被丢弃且不报错
    #[tokio::test]
    async fn publish_reaches_subscriber_and_drops_otherwise() {
        let bus = InMemoryRoutingBus::new();

        bus.publish("nobody-listening", "dropped").await.unwrap();

        let mut stream = bus.subscribe("chan-1").await.unwrap();
        bus.publish("chan-1", "hello").await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next())
            .await
            .expect("message should arrive")
            .expect("stream should be open");
        assert_eq!(received, "hello");
    }
}
