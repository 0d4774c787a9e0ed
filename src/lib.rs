//! Realtime Notify 核心库
//!
//! 面向浏览器客户端的近实时通知推送服务：
//! - 每实例本地连接注册表（用户 -> WebSocket 连接集合）
//! - 跨实例在线目录（用户 -> 实例，Redis Hash）
//! - 基于 Redis Pub/Sub 的实例间消息路由（每实例独立频道）
//! - Kafka 事件源消费（主题对账 + 路由键提取）
//! - WebSocket 接入网关（连接生命周期管理）

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interface;
pub mod service;

pub use application::router::{MessageRouter, RouteOutcome};
pub use config::AppConfig;
pub use error::{NotifyError, Result};
pub use infrastructure::connection_registry::ConnectionRegistry;
