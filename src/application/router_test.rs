//! 消息路由跨实例行为测试
//!
//! 使用内存目录 + 内存总线模拟双实例集群。

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::application::router::{MessageRouter, RouteOutcome};
use crate::domain::repositories::PresenceDirectory;
use crate::infrastructure::connection_registry::ConnectionRegistry;
use crate::infrastructure::persistence::memory::{InMemoryPresenceDirectory, InMemoryRoutingBus};

const CHANNEL_PREFIX: &str = "ws-notifications:";

struct Instance {
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
}

/// 构建共享同一目录和总线的实例（模拟水平扩展的集群节点）
fn make_instance(
    instance_id: &str,
    directory: &Arc<InMemoryPresenceDirectory>,
    bus: &Arc<InMemoryRoutingBus>,
) -> Instance {
    let registry = Arc::new(ConnectionRegistry::new(
        instance_id.to_string(),
        directory.clone(),
    ));
    let router = Arc::new(MessageRouter::new(
        registry.clone(),
        directory.clone(),
        bus.clone(),
        CHANNEL_PREFIX.to_string(),
    ));
    Instance { registry, router }
}

async fn recv_text(rx: &mut mpsc::UnboundedReceiver<axum::extract::ws::Message>) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("frame should arrive")
        .expect("channel should be open");
    match frame {
        axum::extract::ws::Message::Text(text) => text.to_string(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

/// 本地用户走快路径直接投递
#[tokio::test]
async fn route_delivers_locally_without_forwarding() {
    let directory = Arc::new(InMemoryPresenceDirectory::new());
    let bus = Arc::new(InMemoryRoutingBus::new());
    let instance = make_instance("instance-a", &directory, &bus);

    let (tx, mut rx) = mpsc::unbounded_channel();
    instance
        .registry
        .register("alice", Uuid::new_v4(), tx)
        .await
        .unwrap();

    let payload = json!({"userId": "alice", "x": 1});
    let outcome = instance.router.route("alice", &payload).await.unwrap();

    assert_eq!(outcome, RouteOutcome::DeliveredLocal);
    assert_eq!(recv_text(&mut rx).await, payload.to_string());
}

/// 无任何连接的用户：通知被丢弃且不报错
#[tokio::test]
async fn route_to_unknown_user_drops_without_error() {
    let directory = Arc::new(InMemoryPresenceDirectory::new());
    let bus = Arc::new(InMemoryRoutingBus::new());
    let instance = make_instance("instance-a", &directory, &bus);

    let outcome = instance.router.route("bob", &json!({"n": 1})).await.unwrap();

    assert_eq!(outcome, RouteOutcome::NoRecipient);
}

/// 跨实例路由：A 上发起，B 上的连接收到字段完全一致的负载
#[tokio::test]
async fn route_forwards_to_remote_instance_and_payload_survives_round_trip() {
    let directory = Arc::new(InMemoryPresenceDirectory::new());
    let bus = Arc::new(InMemoryRoutingBus::new());
    let instance_a = make_instance("instance-a", &directory, &bus);
    let instance_b = make_instance("instance-b", &directory, &bus);

    // B 实例启动自己的订阅循环
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router_b = instance_b.router.clone();
    let subscription = tokio::spawn(async move { router_b.run_subscription(shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    instance_b
        .registry
        .register("alice", Uuid::new_v4(), tx)
        .await
        .unwrap();

    let payload = json!({"userId": "alice", "x": 1, "nested": {"deep": [true, null]}});
    let outcome = instance_a.router.route("alice", &payload).await.unwrap();

    assert_eq!(
        outcome,
        RouteOutcome::Forwarded {
            instance_id: "instance-b".to_string()
        }
    );
    let received: serde_json::Value = serde_json::from_str(&recv_text(&mut rx).await).unwrap();
    assert_eq!(received, payload);

    shutdown_tx.send(true).unwrap();
    subscription.await.unwrap().unwrap();
}

/// 与刚关闭的连接竞争：目录仍指向 B，但 B 已无本地连接，消息被丢弃
#[tokio::test]
async fn routed_message_for_just_closed_connection_is_dropped() {
    let directory = Arc::new(InMemoryPresenceDirectory::new());
    let bus = Arc::new(InMemoryRoutingBus::new());
    let instance_a = make_instance("instance-a", &directory, &bus);
    let instance_b = make_instance("instance-b", &directory, &bus);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router_b = instance_b.router.clone();
    let subscription = tokio::spawn(async move { router_b.run_subscription(shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // 目录里有条目，但 B 实例没有本地连接（注销与路由的竞争窗口）
    directory.upsert("alice", "instance-b").await.unwrap();

    let outcome = instance_a
        .router
        .route("alice", &json!({"n": 1}))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RouteOutcome::Forwarded {
            instance_id: "instance-b".to_string()
        }
    );

    // 订阅循环消化消息后正常退出即可，无崩溃、无投递
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    subscription.await.unwrap().unwrap();
}

/// 投递只到目标用户：同实例其他用户不受影响
#[tokio::test]
async fn route_never_delivers_to_other_users() {
    let directory = Arc::new(InMemoryPresenceDirectory::new());
    let bus = Arc::new(InMemoryRoutingBus::new());
    let instance = make_instance("instance-a", &directory, &bus);

    let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
    let (carol_tx, mut carol_rx) = mpsc::unbounded_channel();
    instance
        .registry
        .register("alice", Uuid::new_v4(), alice_tx)
        .await
        .unwrap();
    instance
        .registry
        .register("carol", Uuid::new_v4(), carol_tx)
        .await
        .unwrap();

    instance.router.route("alice", &json!({"n": 1})).await.unwrap();

    assert_eq!(recv_text(&mut alice_rx).await, json!({"n": 1}).to_string());
    assert!(carol_rx.try_recv().is_err(), "carol must not receive alice's payload");
}
