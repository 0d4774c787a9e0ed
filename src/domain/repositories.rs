//! 领域仓库接口
//!
//! 在线目录与路由总线都是外部共享服务；正确性依赖其单键操作的原子性，
//! 不依赖任何跨操作事务。

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// 在线目录：用户 -> 持有其连接的实例
///
/// 单一全局映射，last-write-wins，不作为持久状态来源。
#[async_trait]
pub trait PresenceDirectory: Send + Sync {
    /// 写入或覆盖用户的归属实例
    async fn upsert(&self, user_id: &str, instance_id: &str) -> Result<()>;

    /// 查询用户归属实例
    async fn lookup(&self, user_id: &str) -> Result<Option<String>>;

    /// 删除用户条目
    async fn remove(&self, user_id: &str) -> Result<()>;
}

/// 路由总线：实例间消息投递的发布/订阅通道
#[async_trait]
pub trait RoutingBus: Send + Sync {
    /// 向指定频道发布消息（fire-and-forget，无投递确认）
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;

    /// 订阅指定频道，返回消息体流
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>>;
}
