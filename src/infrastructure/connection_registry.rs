//! 本地连接注册表
//!
//! 每实例内存态：用户 -> 该用户在本实例上的活跃 WebSocket 连接集合。
//! 注册/注销会联动在线目录（用户 -> 实例映射）的写入与清理。
//!
//! 并发约束：注册表支持任意并发的插入/移除/遍历；投递走每连接的
//! mpsc 发送端，不在任何锁内做 socket I/O，单个慢连接不会阻塞其他
//! 连接的接入或投递。

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::repositories::PresenceDirectory;
use crate::error::Result;

/// 连接发送端：连接写任务独占 socket sink，其他组件通过该通道推送帧
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// 单个本地连接
struct LocalConnection {
    id: Uuid,
    sender: ConnectionSender,
}

/// 本地连接注册表
pub struct ConnectionRegistry {
    /// 进程生命周期内固定的实例标识
    instance_id: String,
    /// 用户 -> 连接集合；最后一个连接移除时整个键删除，绝不留空集合
    connections: DashMap<String, Vec<LocalConnection>>,
    directory: Arc<dyn PresenceDirectory>,
}

impl ConnectionRegistry {
    pub fn new(instance_id: String, directory: Arc<dyn PresenceDirectory>) -> Self {
        Self {
            instance_id,
            connections: DashMap::new(),
            directory,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// 用户在本实例是否有活跃连接
    pub fn has_local(&self, user_id: &str) -> bool {
        self.connections
            .get(user_id)
            .map(|entry| !entry.is_empty())
            .unwrap_or(false)
    }

    /// 注册连接并写入在线目录（同一连接句柄重复注册为幂等操作）
    pub async fn register(
        &self,
        user_id: &str,
        connection_id: Uuid,
        sender: ConnectionSender,
    ) -> Result<()> {
        {
            let mut entry = self.connections.entry(user_id.to_string()).or_default();
            if entry.iter().all(|conn| conn.id != connection_id) {
                entry.push(LocalConnection {
                    id: connection_id,
                    sender,
                });
            }
        }

        self.directory.upsert(user_id, &self.instance_id).await?;

        info!(
            user_id = %user_id,
            connection_id = %connection_id,
            instance_id = %self.instance_id,
            "registered connection"
        );
        Ok(())
    }

    /// 注销连接；最后一个连接移除时删除本地键并清理目录条目
    ///
    /// 目录删除前检查归属：用户可能已迁移到其他实例（目录被新实例覆盖），
    /// 此时保留新条目，本实例只清理自己的本地状态。
    pub async fn unregister(&self, user_id: &str, connection_id: Uuid) {
        let mut removed_last = false;
        if let Some(mut entry) = self.connections.get_mut(user_id) {
            entry.retain(|conn| conn.id != connection_id);
            removed_last = entry.is_empty();
        }
        if removed_last {
            self.connections
                .remove_if(user_id, |_, connections| connections.is_empty());

            match self.directory.lookup(user_id).await {
                Ok(Some(owner)) if owner == self.instance_id => {
                    if let Err(err) = self.directory.remove(user_id).await {
                        warn!(user_id = %user_id, error = %err, "failed to remove directory entry");
                    } else {
                        info!(
                            user_id = %user_id,
                            instance_id = %self.instance_id,
                            "unregistered last connection"
                        );
                    }
                }
                Ok(_) => {
                    debug!(
                        user_id = %user_id,
                        "directory entry owned by another instance, leaving it"
                    );
                }
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "failed to look up directory owner");
                }
            }
        }
    }

    /// 向用户的所有本地连接投递负载
    ///
    /// 负载只序列化一次；已关闭的连接静默跳过（清理由其读循环负责）。
    /// 返回是否至少有一个连接接收了负载。
    pub fn deliver_local(&self, user_id: &str, payload: &Value) -> Result<bool> {
        let Some(entry) = self.connections.get(user_id) else {
            return Ok(false);
        };

        let text = serde_json::to_string(payload)?;
        let mut delivered = false;
        for conn in entry.iter() {
            if conn.sender.send(Message::Text(text.clone().into())).is_ok() {
                delivered = true;
            }
        }
        Ok(delivered)
    }
}
