//! WebSocket 连接处理
//!
//! 每连接生命周期：升级校验 -> 注册 -> 读循环（入站帧只做活性记录，
//! 无指令协议）-> 关闭 -> 注销。注销在所有退出路径上恰好执行一次
//! （正常关闭、传输错误、服务关停）。
//!
//! 写路径：写任务独占 socket sink，注册表和心跳通过 mpsc 通道推帧，
//! 慢连接不会阻塞任何持锁路径。

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{info, warn};
use uuid::Uuid;

use crate::infrastructure::connection_registry::ConnectionRegistry;

/// 空闲连接的保活 ping 间隔
const PING_INTERVAL: Duration = Duration::from_secs(30);
/// 关闭握手的有界等待
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// WebSocket 接入状态
#[derive(Clone)]
pub struct WsState {
    pub registry: Arc<ConnectionRegistry>,
    pub shutdown: watch::Receiver<bool>,
}

impl WsState {
    pub fn new(registry: Arc<ConnectionRegistry>, shutdown: watch::Receiver<bool>) -> Self {
        Self { registry, shutdown }
    }
}

/// 连接请求参数
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
}

/// `GET /ws?userId=...`
///
/// 非升级请求或缺失用户标识一律 400（身份认证在上游完成，这里只
/// 消费其结果）。
pub async fn ws_handler(
    State(state): State<WsState>,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(ws) = ws else {
        return (StatusCode::BAD_REQUEST, "WebSocket request expected").into_response();
    };

    let Some(user_id) = query.user_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "userId required").into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

/// 已建立连接的生命周期
async fn handle_socket(socket: WebSocket, user_id: String, state: WsState) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (sender, mut frames) = mpsc::unbounded_channel::<Message>();

    // 写任务：独占 sink，通道关闭后尝试优雅关闭握手
    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    });

    // 注册失败（目录不可达）不中断连接：本地投递仍然可用
    if let Err(err) = state
        .registry
        .register(&user_id, connection_id, sender.clone())
        .await
    {
        warn!(user_id = %user_id, error = %err, "failed to publish presence for connection");
    }
    info!(user_id = %user_id, connection_id = %connection_id, "client connected");

    let mut shutdown = state.shutdown.clone();
    let mut ping = interval(PING_INTERVAL);
    ping.reset();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!(user_id = %user_id, "closing connection for server shutdown");
                break;
            }
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).is_err() {
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        // 入站侧无指令协议，只做活性记录
                        info!(user_id = %user_id, message = %text.as_str(), "websocket message");
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(user_id = %user_id, error = %err, "websocket transport error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!(user_id = %user_id, connection_id = %connection_id, "client disconnected");
    // 注销必须在每条退出路径上执行
    state.registry.unregister(&user_id, connection_id).await;

    // 注销已丢弃注册表持有的发送端；本地 sender 一并释放后写任务
    // 进入关闭握手，有界等待后强制终止
    drop(sender);
    let abort = writer.abort_handle();
    if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
        warn!(user_id = %user_id, "close handshake timed out");
        abort.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 查询参数缺失 userId 时反序列化为 None
    #[test]
    fn ws_query_allows_missing_user_id() {
        let query: WsQuery = serde_json::from_str("{}").expect("deserialize");
        assert!(query.user_id.is_none());

        let query: WsQuery = serde_json::from_str(r#"{"userId": "alice"}"#).expect("deserialize");
        assert_eq!(query.user_id.as_deref(), Some("alice"));
    }
}
