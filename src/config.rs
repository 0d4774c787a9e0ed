//! 服务配置模块
//!
//! 配置来源（优先级从低到高）：
//! - 内置默认值
//! - TOML 配置文件（`config.toml`，或命令行指定的路径）
//! - 环境变量覆盖（`REDIS_URL`、`KAFKA_BOOTSTRAP_SERVERS` 等）

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// 应用配置主结构体
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP / WebSocket 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// Redis 配置（在线目录 + 路由总线）
    #[serde(default)]
    pub redis: RedisConfig,
    /// Kafka 配置（事件源）
    #[serde(default)]
    pub kafka: KafkaConfig,
}

/// 服务器监听配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_address")]
    pub address: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis 服务器地址
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// 实例路由频道前缀（完整频道名 = 前缀 + 实例 ID）
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    /// 在线目录 Hash 键名（用户 -> 实例映射）
    #[serde(default = "default_directory_key")]
    pub directory_key: String,
}

/// Kafka 配置
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Kafka 服务器地址列表
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    /// 消费者组
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// 消费主题列表
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    /// 偏移重置策略（earliest / latest）
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// 是否自动提交偏移
    #[serde(default = "default_enable_auto_commit")]
    pub enable_auto_commit: bool,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_redis_url() -> String {
    "redis://127.0.0.1/".to_string()
}

fn default_channel_prefix() -> String {
    "ws-notifications:".to_string()
}

fn default_directory_key() -> String {
    "user-instance-mapping".to_string()
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "realtime-notifications".to_string()
}

fn default_topics() -> Vec<String> {
    vec!["notifications".to_string()]
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_enable_auto_commit() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            channel_prefix: default_channel_prefix(),
            directory_key: default_directory_key(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            group_id: default_group_id(),
            topics: default_topics(),
            auto_offset_reset: default_auto_offset_reset(),
            enable_auto_commit: default_enable_auto_commit(),
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// 未提供路径时尝试 `config.toml`；文件不存在则回退到默认值。
    pub fn load(path: Option<&str>) -> Result<Self> {
        let candidate = path.unwrap_or("config.toml");
        let mut config = if Path::new(candidate).exists() {
            Self::from_file(candidate)?
        } else {
            tracing::warn!(path = candidate, "config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// 从 TOML 文件加载配置
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file: {path}"))?;
        toml::from_str(&content).with_context(|| format!("invalid config format: {path}"))
    }

    /// 应用环境变量覆盖
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("REDIS_URL") {
            self.redis.url = url;
        }
        if let Ok(bootstrap) = env::var("KAFKA_BOOTSTRAP_SERVERS") {
            self.kafka.bootstrap_servers = bootstrap;
        }
        if let Ok(group) = env::var("KAFKA_GROUP_ID") {
            self.kafka.group_id = group;
        }
        if let Ok(topics) = env::var("KAFKA_TOPICS") {
            let parsed: Vec<String> = topics
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.kafka.topics = parsed;
            }
        }
        if let Ok(port) = env::var("SERVER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring invalid SERVER_PORT"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.redis.channel_prefix, "ws-notifications:");
        assert_eq!(config.redis.directory_key, "user-instance-mapping");
        assert_eq!(config.kafka.topics, vec!["notifications".to_string()]);
        assert!(config.kafka.enable_auto_commit);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [kafka]
            bootstrap_servers = "kafka:9092"
            topics = ["car-events", "alerts"]
            auto_offset_reset = "latest"
            enable_auto_commit = false
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.server.port, 9000);
        // 未显式配置的字段落到默认值
        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.redis.url, "redis://127.0.0.1/");
        assert_eq!(config.kafka.bootstrap_servers, "kafka:9092");
        assert_eq!(config.kafka.topics.len(), 2);
        assert_eq!(config.kafka.auto_offset_reset, "latest");
        assert!(!config.kafka.enable_auto_commit);
    }
}
