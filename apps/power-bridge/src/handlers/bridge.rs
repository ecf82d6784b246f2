//! 桥接会话控制面
//!
//! - POST /api/bridge/start
//! - POST /api/bridge/stop
//! - GET  /api/bridge/status
//! - GET  /api/bridge/events

use api_contract::{ApiResponse, BridgeActionDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::utils::response::{event_to_dto, internal_error, view_to_dto};

pub async fn start_bridge(State(state): State<AppState>) -> Response {
    match state.controller.start().await {
        Ok(changed) => (
            StatusCode::OK,
            Json(ApiResponse::success(BridgeActionDto {
                running: true,
                changed,
            })),
        )
            .into_response(),
        Err(err) => internal_error("BRIDGE.START_FAILED", err.to_string()),
    }
}

pub async fn stop_bridge(State(state): State<AppState>) -> Response {
    let changed = state.controller.stop().await;
    (
        StatusCode::OK,
        Json(ApiResponse::success(BridgeActionDto {
            running: false,
            changed,
        })),
    )
        .into_response()
}

pub async fn bridge_status(State(state): State<AppState>) -> Response {
    let view = state.controller.view();
    (StatusCode::OK, Json(ApiResponse::success(view_to_dto(view)))).into_response()
}

/// 最新在前，至多 100 条。
pub async fn bridge_events(State(state): State<AppState>) -> Response {
    let events: Vec<_> = state
        .controller
        .events()
        .into_iter()
        .map(event_to_dto)
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(events))).into_response()
}
