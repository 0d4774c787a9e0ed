//! Redis 实现的在线目录
//!
//! 全量映射存放在单个 Hash（HSET/HGET/HDEL）：内存占用低于逐键存储，
//! 单字段操作由 Redis 保证原子性。无条件写（last-write-wins），
//! 陈旧条目由原持有实例的注销路径自行清理。

use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::domain::repositories::PresenceDirectory;
use crate::error::Result;

pub struct RedisPresenceDirectory {
    connection: ConnectionManager,
    hash_key: String,
}

impl RedisPresenceDirectory {
    pub async fn new(client: &Arc<redis::Client>, hash_key: String) -> Result<Self> {
        let connection = ConnectionManager::new(client.as_ref().clone()).await?;
        Ok(Self {
            connection,
            hash_key,
        })
    }
}

#[async_trait]
impl PresenceDirectory for RedisPresenceDirectory {
    async fn upsert(&self, user_id: &str, instance_id: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.hset(&self.hash_key, user_id, instance_id).await?;
        Ok(())
    }

    async fn lookup(&self, user_id: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let owner: Option<String> = conn.hget(&self.hash_key, user_id).await?;
        Ok(owner)
    }

    async fn remove(&self, user_id: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.hdel(&self.hash_key, user_id).await?;
        Ok(())
    }
}
