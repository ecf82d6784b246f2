use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
};
use bridge_auth::{TuyaCredentials, sign, string_to_sign};
use bridge_control::{CommandSender, ControlError, TuyaClient, TuyaClientConfig};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ACCESS_ID: &str = "access-id";
const SECRET: &str = "access-secret";

/// 本地 Tuya API 替身的可观测状态。
#[derive(Default)]
struct FakeCloud {
    token_requests: Mutex<usize>,
    commands: Mutex<Vec<(String, Value)>>,
    command_reply: Mutex<Option<Value>>,
}

fn header(headers: &HeaderMap, key: &str) -> String {
    headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn token_endpoint(State(cloud): State<Arc<FakeCloud>>) -> Json<Value> {
    let mut count = cloud.token_requests.lock().expect("lock");
    *count += 1;
    Json(json!({
        "success": true,
        "result": { "access_token": format!("tok-{}", *count), "expire_time": 7200 }
    }))
}

async fn command_endpoint(
    State(cloud): State<Arc<FakeCloud>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    let t = header(&headers, "t");
    let token = header(&headers, "access_token");
    let expected = sign(&string_to_sign(ACCESS_ID, Some(&token), &t, Some(&body)), SECRET);
    if header(&headers, "sign") != expected
        || header(&headers, "client_id") != ACCESS_ID
        || header(&headers, "sign_method") != "HMAC-SHA256"
        || header(&headers, "content-type") != "application/json"
    {
        return Json(json!({ "success": false, "msg": "sign invalid", "code": 1004 }));
    }
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    cloud
        .commands
        .lock()
        .expect("lock")
        .push((device_id, parsed));
    let reply = cloud.command_reply.lock().expect("lock").clone();
    Json(reply.unwrap_or_else(|| json!({ "success": true, "result": true })))
}

async fn spawn_cloud(cloud: Arc<FakeCloud>) -> String {
    let app = Router::new()
        .route("/v1.0/token", get(token_endpoint))
        .route("/v1.0/devices/:device_id/commands", post(command_endpoint))
        .with_state(cloud);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn client(base_url: String) -> TuyaClient {
    let mut config = TuyaClientConfig::new(base_url, TuyaCredentials::new(ACCESS_ID, SECRET));
    config.request_timeout = Duration::from_secs(5);
    TuyaClient::new(config).expect("client")
}

#[tokio::test]
async fn send_command_posts_signed_rounded_value() {
    let cloud = Arc::new(FakeCloud::default());
    let client = client(spawn_cloud(cloud.clone()).await);

    let ack = client
        .send_command("device-1", 120.55)
        .await
        .expect("sent");
    assert_eq!(ack.value, 121);
    assert_eq!(ack.device_id, "device-1");

    let commands = cloud.commands.lock().expect("lock").clone();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].0, "device-1");
    assert_eq!(
        commands[0].1,
        json!({ "commands": [{ "code": "power_value", "value": 121 }] })
    );
}

#[tokio::test]
async fn token_is_reused_across_commands() {
    let cloud = Arc::new(FakeCloud::default());
    let client = client(spawn_cloud(cloud.clone()).await);

    client.send_command("device-1", 60.0).await.expect("first");
    client.send_command("device-1", 70.0).await.expect("second");

    assert_eq!(*cloud.token_requests.lock().expect("lock"), 1);
    assert_eq!(cloud.commands.lock().expect("lock").len(), 2);
}

#[tokio::test]
async fn provider_failure_is_cloud_api_error() {
    let cloud = Arc::new(FakeCloud::default());
    *cloud.command_reply.lock().expect("lock") =
        Some(json!({ "success": false, "msg": "token invalid", "code": 1010 }));
    let client = client(spawn_cloud(cloud.clone()).await);

    let err = client
        .send_command("device-1", 200.0)
        .await
        .expect_err("cloud error");
    match &err {
        ControlError::CloudApi { code, message } => {
            assert_eq!(code, "1010");
            assert_eq!(message, "token invalid");
        }
        other => panic!("unexpected error: {other}"),
    }
    let rendered = err.to_string();
    assert!(rendered.contains("token invalid"));
    assert!(rendered.contains("1010"));

    // 失效的 token 被丢弃，下一次下发重新获取。
    *cloud.command_reply.lock().expect("lock") = None;
    client.send_command("device-1", 200.0).await.expect("sent");
    assert_eq!(*cloud.token_requests.lock().expect("lock"), 2);
}

#[tokio::test]
async fn other_provider_errors_keep_cached_token() {
    let cloud = Arc::new(FakeCloud::default());
    *cloud.command_reply.lock().expect("lock") =
        Some(json!({ "success": false, "msg": "device is offline", "code": 2001 }));
    let client = client(spawn_cloud(cloud.clone()).await);

    client
        .send_command("device-1", 200.0)
        .await
        .expect_err("cloud error");
    *cloud.command_reply.lock().expect("lock") = None;
    client.send_command("device-1", 200.0).await.expect("sent");

    assert_eq!(*cloud.token_requests.lock().expect("lock"), 1);
}

#[tokio::test]
async fn unreachable_cloud_surfaces_auth_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let client = client(format!("http://{addr}"));

    let err = client
        .send_command("device-1", 200.0)
        .await
        .expect_err("no response");
    assert!(matches!(
        err,
        ControlError::Auth(bridge_auth::AuthError::Transport(_))
    ));
}
