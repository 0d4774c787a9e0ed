//! 统一错误类型
//!
//! 基础设施层（Redis / Kafka / 序列化）的错误统一收敛到 [`NotifyError`]，
//! 启动引导层使用 `anyhow` 做上下文包装。

use thiserror::Error;

/// 服务内部错误类型
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Redis 目录或路由总线错误
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Kafka 消费者错误
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON 编解码错误
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 启动期主题对账失败（致命）
    #[error("topic reconciliation failed: {0}")]
    TopicReconciliation(String),
}

pub type Result<T, E = NotifyError> = std::result::Result<T, E>;
