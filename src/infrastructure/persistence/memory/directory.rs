//! 内存版在线目录（本地开发与测试用）

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::repositories::PresenceDirectory;
use crate::error::Result;

#[derive(Default)]
pub struct InMemoryPresenceDirectory {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryPresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl PresenceDirectory for InMemoryPresenceDirectory {
    async fn upsert(&self, user_id: &str, instance_id: &str) -> Result<()> {
        let mut map = self.entries.write().await;
        map.insert(user_id.to_string(), instance_id.to_string());
        Ok(())
    }

    async fn lookup(&self, user_id: &str) -> Result<Option<String>> {
        let map = self.entries.read().await;
        Ok(map.get(user_id).cloned())
    }

    async fn remove(&self, user_id: &str) -> Result<()> {
        let mut map = self.entries.write().await;
        map.remove(user_id);
        Ok(())
    }
}
