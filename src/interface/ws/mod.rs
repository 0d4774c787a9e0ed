//! WebSocket 接入层路由

pub mod handler;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handler::WsState;

/// 构建应用路由：WebSocket 接入端点 + 健康检查
pub fn app_router(state: WsState) -> Router {
    Router::new()
        .route("/ws", get(handler::ws_handler))
        .route("/", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> &'static str {
    "Realtime Notifications Service Running"
}
