//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 桥接端点请求体：`{ "power": number }`。
///
/// 字段保持原始 JSON 值，由 handler 判断是否为数字。
#[derive(Debug, Deserialize)]
pub struct PowerRequest {
    pub power: Option<serde_json::Value>,
}

/// 桥接端点响应体（成功与失败共用）。
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 流水线事件返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    pub timestamp_ms: i64,
    pub severity: String,
    pub message: String,
}

/// 桥接状态返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatusDto {
    pub status: String,
    pub running: bool,
    pub connection: String,
    pub current_power: Option<String>,
    pub last_update_ms: Option<i64>,
    pub threshold_watts: f64,
    pub device_id: String,
    pub topic: String,
}

/// 启动/停止操作返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeActionDto {
    pub running: bool,
    pub changed: bool,
}

/// 指标快照返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub readings_received: u64,
    pub readings_invalid: u64,
    pub readings_below_threshold: u64,
    pub forwards_attempted: u64,
    pub forward_success: u64,
    pub forward_failure: u64,
    pub forward_latency_ms_total: u64,
    pub forward_latency_ms_count: u64,
    pub token_renewals: u64,
    pub connection_lost: u64,
}
