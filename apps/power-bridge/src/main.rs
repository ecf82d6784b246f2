//! 功率桥接服务：MQTT 遥测 → 阈值判定 → Tuya 设备命令，附带 HTTP 控制面与请求追踪 ID。

mod bridge;
mod handlers;
mod routes;
mod utils;

use axum::{
    Json, Router,
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use bridge::BridgeController;
use bridge_auth::TuyaCredentials;
use bridge_config::AppConfig;
use bridge_control::{CommandSender, TuyaClient, TuyaClientConfig, base_url_for_region};
use bridge_ingest::{SubscriberConfig, TelemetrySubscriber};
use bridge_pipeline::PowerPipeline;
use bridge_telemetry::{init_tracing, new_request_ids};
use domain::ThresholdPolicy;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<BridgeController>,
    /// 桥接端点与流水线共用同一客户端（共享 token 缓存）。
    pub sender: Arc<dyn CommandSender>,
    pub device_id: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置；缺少 Tuya 凭据时直接退出
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let client: Arc<dyn CommandSender> = Arc::new(TuyaClient::new(tuya_client_config(&config))?);
    let pipeline = PowerPipeline::new(
        ThresholdPolicy::new(config.power_threshold_w),
        config.tuya_device_id.clone(),
        client.clone(),
    );
    let subscriber = Arc::new(TelemetrySubscriber::new(subscriber_config(&config)));
    let controller = Arc::new(BridgeController::new(subscriber, pipeline));

    if config.autostart {
        if let Err(err) = controller.start().await {
            warn!(target: "bridge.app", error = %err, "autostart_failed");
        }
    }

    let state = AppState {
        controller,
        sender: client,
        device_id: config.tuya_device_id.clone(),
    };
    let app = build_app(state);

    info!(
        target: "bridge.app",
        http_addr = %config.http_addr,
        region = %config.tuya_api_region,
        threshold_w = config.power_threshold_w,
        "server_listening"
    );
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", routes::create_api_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}

fn tuya_client_config(config: &AppConfig) -> TuyaClientConfig {
    let base_url = config
        .tuya_base_url
        .clone()
        .unwrap_or_else(|| base_url_for_region(&config.tuya_api_region).to_string());
    let mut tuya = TuyaClientConfig::new(
        base_url,
        TuyaCredentials::new(&config.tuya_access_id, &config.tuya_access_secret),
    );
    tuya.command_code = config.tuya_command_code.clone();
    tuya.request_timeout = Duration::from_millis(config.tuya_request_timeout_ms);
    tuya
}

fn subscriber_config(config: &AppConfig) -> SubscriberConfig {
    let mut subscriber =
        SubscriberConfig::new(&config.mqtt_host, config.mqtt_port, &config.mqtt_topic);
    subscriber.username = config.mqtt_username.clone();
    subscriber.password = config.mqtt_password.clone();
    if let Some(client_id) = &config.mqtt_client_id {
        subscriber.client_id = client_id.clone();
    }
    subscriber.reconnect_interval = Duration::from_millis(config.mqtt_reconnect_ms);
    subscriber
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    // 生成 request_id 与 trace_id，并注入请求扩展与日志
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use bridge_control::{CommandAck, ControlError};
    use serde_json::Value;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// 记录下发值；`fail` 为真时返回云端错误。
    #[derive(Default)]
    struct StubSender {
        fail: bool,
        values: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl CommandSender for StubSender {
        async fn send_command(
            &self,
            device_id: &str,
            watts: f64,
        ) -> Result<CommandAck, ControlError> {
            self.values.lock().expect("lock").push(watts);
            if self.fail {
                return Err(ControlError::CloudApi {
                    code: "1010".to_string(),
                    message: "token invalid".to_string(),
                });
            }
            Ok(CommandAck {
                device_id: device_id.to_string(),
                code: "power_value".to_string(),
                value: domain::round_half_up(watts),
                sent_at_ms: 1,
            })
        }
    }

    fn app(sender: Arc<StubSender>) -> Router {
        let subscriber = Arc::new(TelemetrySubscriber::new(SubscriberConfig::new(
            "127.0.0.1",
            1,
            "solar/ac/power",
        )));
        let pipeline = PowerPipeline::new(ThresholdPolicy::new(50.0), "device-1", sender.clone());
        build_app(AppState {
            controller: Arc::new(BridgeController::new(subscriber, pipeline)),
            sender,
            device_id: "device-1".to_string(),
        })
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn health_carries_request_ids() {
        let response = app(Arc::default())
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("x-trace-id"));
    }

    #[tokio::test]
    async fn power_endpoint_forwards_numeric_value() {
        let sender = Arc::new(StubSender::default());
        let response = app(sender.clone())
            .oneshot(post_json("/api/power", r#"{"power": 120.55}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "power (120.55 W) sent to Tuya successfully");
        assert_eq!(sender.values.lock().expect("lock").as_slice(), &[120.55]);
    }

    #[tokio::test]
    async fn power_endpoint_rejects_non_numeric_and_malformed_bodies() {
        let sender = Arc::new(StubSender::default());
        for body in [r#"{"power": "120"}"#, r#"{"watts": 1}"#, "not json"] {
            let response = app(sender.clone())
                .oneshot(post_json("/api/power", body))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            let json = json_body(response).await;
            assert!(json["message"].is_string());
        }
        assert!(sender.values.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn power_endpoint_reports_upstream_failure() {
        let sender = Arc::new(StubSender {
            fail: true,
            ..StubSender::default()
        });
        let response = app(sender)
            .oneshot(post_json("/api/power", r#"{"power": 200}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let message = json_body(response).await["message"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        assert!(message.contains("token invalid"));
        assert!(message.contains("1010"));
    }

    #[tokio::test]
    async fn status_reports_idle_bridge() {
        let response = app(Arc::default())
            .oneshot(
                Request::get("/api/bridge/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "stopped");
        assert_eq!(body["data"]["running"], false);
        assert_eq!(body["data"]["connection"], "idle");
        assert_eq!(body["data"]["thresholdWatts"], 50.0);
        assert_eq!(body["data"]["topic"], "solar/ac/power");
        assert!(body["data"]["currentPower"].is_null());
    }

    #[tokio::test]
    async fn stop_without_session_is_unchanged() {
        let response = app(Arc::default())
            .oneshot(post_json("/api/bridge/stop", ""))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["running"], false);
        assert_eq!(body["data"]["changed"], false);
    }

    #[tokio::test]
    async fn metrics_and_events_use_envelope() {
        let app = app(Arc::default());
        let metrics = app
            .clone()
            .oneshot(Request::get("/api/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let body = json_body(metrics).await;
        assert_eq!(body["success"], true);
        assert!(body["data"]["forwardsAttempted"].is_u64());

        let events = app
            .oneshot(
                Request::get("/api/bridge/events")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let body = json_body(events).await;
        assert_eq!(body["data"], Value::Array(Vec::new()));
    }
}
