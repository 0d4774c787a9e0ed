//! Kafka 事件源消费者
//!
//! 启动流程：主题对账（缺失主题按固定分区数创建，失败即终止启动）
//! -> 构建消费者 -> 订阅 -> 消费循环。
//!
//! 消费循环对关闭信号保持响应；单条记录的解码/路由失败只跳过该条，
//! 绝不拖垮整个循环。偏移推进交给 Kafka 客户端本身（自动提交可配）。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message as _};
use rdkafka::types::RDKafkaErrorCode;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::application::router::MessageRouter;
use crate::config::KafkaConfig;
use crate::domain::model::resolve_routing_key;
use crate::error::{NotifyError, Result};

/// 自动创建主题的分区数
const CREATED_TOPIC_PARTITIONS: i32 = 2;
/// 自动创建主题的副本因子
const CREATED_TOPIC_REPLICATION: i32 = 1;
/// 元数据拉取超时
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
/// 处理异常后的退避间隔，避免紧密失败循环
const FAILURE_BACKOFF: Duration = Duration::from_secs(1);

pub struct EventLogConsumer {
    config: KafkaConfig,
    consumer: StreamConsumer,
    router: Arc<MessageRouter>,
}

impl EventLogConsumer {
    /// 创建消费者：先对账主题，再订阅
    ///
    /// 主题对账失败是致命错误（不能安全消费未知主题），向上传播终止启动。
    pub async fn new(config: KafkaConfig, router: Arc<MessageRouter>) -> Result<Self> {
        ensure_topics_exist(&config).await?;

        let consumer: StreamConsumer = consumer_client_config(&config).create()?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics)?;

        info!(
            bootstrap = %config.bootstrap_servers,
            group = %config.group_id,
            topics = ?config.topics,
            offset_reset = %config.auto_offset_reset,
            auto_commit = config.enable_auto_commit,
            "event log consumer subscribed"
        );

        Ok(Self {
            config,
            consumer,
            router,
        })
    }

    /// 运行消费循环，收到关闭信号后退出
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            group = %self.config.group_id,
            "event log consumer started, waiting for records"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("event log consumer shutting down");
                    break;
                }
                result = self.consumer.recv() => {
                    match result {
                        Ok(record) => {
                            // 单条记录失败：记日志、短暂退避，循环继续
                            if let Err(err) = self.process_record(&record).await {
                                error!(
                                    error = %err,
                                    topic = record.topic(),
                                    partition = record.partition(),
                                    offset = record.offset(),
                                    "failed to process record, dropping it"
                                );
                                tokio::time::sleep(FAILURE_BACKOFF).await;
                            }
                        }
                        Err(err) => {
                            // 瞬时消费错误：记日志后继续轮询
                            error!(error = %err, "error receiving from Kafka");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// 处理一条记录：解码事件体 -> 解析路由键 -> 交给路由器
    ///
    /// 格式问题（空负载、非 JSON、无路由键）直接跳过，不算错误；
    /// 路由过程中的基础设施错误向上抛给消费循环统一处理。
    async fn process_record(&self, record: &BorrowedMessage<'_>) -> Result<()> {
        let Some(payload) = record.payload() else {
            return Ok(());
        };
        if payload.is_empty() {
            return Ok(());
        }

        let body: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(body) => body,
            Err(err) => {
                warn!(
                    error = %err,
                    topic = record.topic(),
                    partition = record.partition(),
                    offset = record.offset(),
                    "skipping malformed record"
                );
                return Ok(());
            }
        };

        let record_key = record.key().and_then(|key| std::str::from_utf8(key).ok());
        let Some(user_id) = resolve_routing_key(record_key, &body) else {
            warn!(
                topic = record.topic(),
                offset = record.offset(),
                "record has no resolvable routing key, skipping"
            );
            return Ok(());
        };

        let outcome = self.router.route(&user_id, &body).await?;
        debug!(user_id = %user_id, ?outcome, "routed event record");
        Ok(())
    }
}

/// 构建消费者客户端配置
fn consumer_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("group.id", &config.group_id)
        .set("auto.offset.reset", &config.auto_offset_reset)
        .set(
            "enable.auto.commit",
            if config.enable_auto_commit { "true" } else { "false" },
        )
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000");
    client_config
}

/// 主题对账：缺失的主题按固定分区数 / 副本因子创建
async fn ensure_topics_exist(config: &KafkaConfig) -> Result<()> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", &config.bootstrap_servers)
        .create()?;

    let metadata = admin.inner().fetch_metadata(None, METADATA_TIMEOUT)?;
    let existing: HashSet<&str> = metadata.topics().iter().map(|t| t.name()).collect();

    let missing: Vec<&str> = config
        .topics
        .iter()
        .map(String::as_str)
        .filter(|topic| !existing.contains(topic))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    warn!(
        topics = ?missing,
        partitions = CREATED_TOPIC_PARTITIONS,
        "topics do not exist and will be created"
    );

    let new_topics: Vec<NewTopic<'_>> = missing
        .iter()
        .map(|topic| {
            NewTopic::new(
                topic,
                CREATED_TOPIC_PARTITIONS,
                TopicReplication::Fixed(CREATED_TOPIC_REPLICATION),
            )
        })
        .collect();

    let results = admin
        .create_topics(new_topics.iter(), &AdminOptions::new())
        .await?;

    for result in results {
        match result {
            Ok(topic) => info!(topic = %topic, "created topic"),
            // 并发启动的其他实例可能已经建好
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                debug!(topic = %topic, "topic already exists");
            }
            Err((topic, code)) => {
                return Err(NotifyError::TopicReconciliation(format!(
                    "failed to create topic {topic}: {code}"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 自动创建的主题规格固定：2 分区、副本因子 1
    #[test]
    fn created_topic_spec_is_fixed() {
        assert_eq!(CREATED_TOPIC_PARTITIONS, 2);
        assert_eq!(CREATED_TOPIC_REPLICATION, 1);
    }

    /// 配置映射：KafkaConfig 的字段落到 librdkafka 配置键
    #[test]
    fn consumer_config_maps_settings() {
        let config = KafkaConfig {
            bootstrap_servers: "broker:9092".to_string(),
            group_id: "group-x".to_string(),
            auto_offset_reset: "latest".to_string(),
            enable_auto_commit: false,
            ..KafkaConfig::default()
        };

        let client_config = consumer_client_config(&config);

        assert_eq!(client_config.get("bootstrap.servers"), Some("broker:9092"));
        assert_eq!(client_config.get("group.id"), Some("group-x"));
        assert_eq!(client_config.get("auto.offset.reset"), Some("latest"));
        assert_eq!(client_config.get("enable.auto.commit"), Some("false"));
    }
}
