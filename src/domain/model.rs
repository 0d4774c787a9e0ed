//! 领域模型
//!
//! - [`NotificationEnvelope`]：实例间路由的传输信封（单跳、不落盘）
//! - [`resolve_routing_key`]：入站事件路由键解析（固定回退链）

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// 路由通知信封
///
/// 总线跳的线上格式：`{"userId": "...", "payload": <任意 JSON>}`。
/// 客户端最终收到的是内层 `payload` 的 JSON 编码。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    /// 目标用户标识
    #[serde(rename = "userId")]
    pub user_id: String,
    /// 任意 JSON 负载
    pub payload: Value,
}

impl NotificationEnvelope {
    pub fn new(user_id: impl Into<String>, payload: Value) -> Self {
        Self {
            user_id: user_id.into(),
            payload,
        }
    }

    /// 编码为总线消息体
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 从总线消息体解码
    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// 入站事件体的路由键探测结构
///
/// 事件体是松散 JSON，这里只声明路由相关的可选字段；
/// 其余字段在反序列化时被忽略，整个事件体原样作为通知负载下发。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutingKeyProbe {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    rest_metadata: Option<RestMetadataProbe>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestMetadataProbe {
    #[serde(default)]
    user_id: Option<String>,
}

/// 解析事件的路由键（用户标识）
///
/// 回退链固定：记录自身的 key -> 事件体 `userId` -> 事件体 `restMetadata.userId`。
/// 全部缺失返回 `None`，调用方跳过该记录。
pub fn resolve_routing_key(record_key: Option<&str>, body: &Value) -> Option<String> {
    if let Some(key) = record_key {
        if !key.is_empty() {
            return Some(key.to_string());
        }
    }

    let probe = RoutingKeyProbe::deserialize(body).unwrap_or_default();
    probe
        .user_id
        .filter(|id| !id.is_empty())
        .or_else(|| {
            probe
                .rest_metadata
                .and_then(|meta| meta.user_id)
                .filter(|id| !id.is_empty())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_key_wins_over_body_fields() {
        let body = json!({"userId": "body-user", "restMetadata": {"userId": "meta-user"}});
        let key = resolve_routing_key(Some("key-user"), &body);
        assert_eq!(key.as_deref(), Some("key-user"));
    }

    #[test]
    fn body_user_id_wins_over_nested_metadata() {
        let body = json!({"userId": "body-user", "restMetadata": {"userId": "meta-user"}});
        let key = resolve_routing_key(None, &body);
        assert_eq!(key.as_deref(), Some("body-user"));
    }

    #[test]
    fn falls_back_to_nested_metadata() {
        let body = json!({"x": 1, "restMetadata": {"userId": "meta-user"}});
        let key = resolve_routing_key(None, &body);
        assert_eq!(key.as_deref(), Some("meta-user"));
    }

    #[test]
    fn empty_key_is_treated_as_absent() {
        let body = json!({"userId": "body-user"});
        let key = resolve_routing_key(Some(""), &body);
        assert_eq!(key.as_deref(), Some("body-user"));
    }

    #[test]
    fn unresolvable_key_returns_none() {
        assert_eq!(resolve_routing_key(None, &json!({"x": 1})), None);
        // 非对象事件体同样不可解析
        assert_eq!(resolve_routing_key(None, &json!([1, 2, 3])), None);
        assert_eq!(resolve_routing_key(None, &json!({"userId": ""})), None);
    }

    #[test]
    fn envelope_round_trip_preserves_payload() {
        let payload = json!({"userId": "alice", "x": 1, "nested": {"a": [1, 2]}});
        let envelope = NotificationEnvelope::new("alice", payload.clone());

        let encoded = envelope.encode().expect("encode");
        let decoded = NotificationEnvelope::decode(&encoded).expect("decode");

        assert_eq!(decoded.user_id, "alice");
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded, envelope);
    }
}
