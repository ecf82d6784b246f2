//! 桥接端点：直接下发一个功率值。
//!
//! - POST /api/power  `{ "power": number }`

use api_contract::{MessageResponse, PowerRequest};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::AppState;
use crate::utils::response::{bad_request_message, upstream_error_message};

const INVALID_POWER: &str = "Invalid \"power\" value in request body.";

pub async fn send_power(
    State(state): State<AppState>,
    payload: Result<Json<PowerRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return bad_request_message(INVALID_POWER);
    };
    let Some(power) = request
        .power
        .as_ref()
        .filter(|value| value.is_number())
        .and_then(serde_json::Value::as_f64)
    else {
        return bad_request_message(INVALID_POWER);
    };

    match state.sender.send_command(&state.device_id, power).await {
        Ok(ack) => {
            info!(
                target: "bridge.http",
                device_id = %ack.device_id,
                value = ack.value,
                "power_forwarded"
            );
            (
                StatusCode::OK,
                Json(MessageResponse::new(format!(
                    "power ({power:.2} W) sent to Tuya successfully"
                ))),
            )
                .into_response()
        }
        Err(err) => {
            warn!(target: "bridge.http", error = %err, "power_forward_failed");
            upstream_error_message(format!("failed to send to Tuya: {err}"))
        }
    }
}
