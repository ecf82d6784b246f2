//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：bad_request_message, upstream_error_message, internal_error
//! - DTO 转换：event_to_dto, view_to_dto, metrics_to_dto
//!
//! 桥接端点（/api/power）返回 `{message}`，其余端点使用 ApiResponse 封装。

use crate::bridge::BridgeView;
use api_contract::{
    ApiResponse, BridgeStatusDto, EventDto, MessageResponse, MetricsSnapshotDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bridge_telemetry::MetricsSnapshot;
use domain::PipelineEvent;

/// 桥接端点：请求体错误
pub fn bad_request_message(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(MessageResponse::new(message)),
    )
        .into_response()
}

/// 桥接端点：上游失败
pub fn upstream_error_message(message: impl Into<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MessageResponse::new(message)),
    )
        .into_response()
}

/// 内部错误响应
pub fn internal_error(code: &str, message: impl Into<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error(code, message)),
    )
        .into_response()
}

pub fn event_to_dto(event: PipelineEvent) -> EventDto {
    EventDto {
        timestamp_ms: event.timestamp_ms,
        severity: event.severity.as_str().to_string(),
        message: event.message,
    }
}

/// BridgeView 转 BridgeStatusDto
pub fn view_to_dto(view: BridgeView) -> BridgeStatusDto {
    BridgeStatusDto {
        status: view.status.as_str().to_string(),
        running: view.running,
        connection: view.connection.as_str().to_string(),
        current_power: view.snapshot.current_power.map(|reading| reading.display()),
        last_update_ms: view.snapshot.last_update_ms,
        threshold_watts: view.threshold_watts,
        device_id: view.device_id,
        topic: view.topic,
    }
}

pub fn metrics_to_dto(snapshot: MetricsSnapshot) -> MetricsSnapshotDto {
    MetricsSnapshotDto {
        readings_received: snapshot.readings_received,
        readings_invalid: snapshot.readings_invalid,
        readings_below_threshold: snapshot.readings_below_threshold,
        forwards_attempted: snapshot.forwards_attempted,
        forward_success: snapshot.forward_success,
        forward_failure: snapshot.forward_failure,
        forward_latency_ms_total: snapshot.forward_latency_ms_total,
        forward_latency_ms_count: snapshot.forward_latency_ms_count,
        token_renewals: snapshot.token_renewals,
        connection_lost: snapshot.connection_lost,
    }
}
