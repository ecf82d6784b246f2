//! 路由定义
//!
//! 集中管理所有 API 路由，将路径映射到对应的 handlers。
//! 路由包括：
//! - 桥接端点：/api/power
//! - 会话控制：/api/bridge/start, /api/bridge/stop
//! - 会话查询：/api/bridge/status, /api/bridge/events
//! - 指标：/api/metrics

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{get, post},
};

/// 创建 API 路由（挂载于 /api 之下）
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/power", post(send_power))
        .route("/bridge/start", post(start_bridge))
        .route("/bridge/stop", post(stop_bridge))
        .route("/bridge/status", get(bridge_status))
        .route("/bridge/events", get(bridge_events))
        .route("/metrics", get(get_metrics))
}
