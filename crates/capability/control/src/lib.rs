//! 云端命令下发能力：Tuya 设备命令。

mod region;

use async_trait::async_trait;
use bridge_auth::{
    AuthError, HttpTokenSource, SIGN_METHOD, TokenCache, TokenSource, TuyaCredentials,
    code_to_string, sign, string_to_sign,
};
use domain::{now_epoch_ms, round_half_up};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use region::{DEFAULT_REGION, base_url_for_region};

/// 默认数据点（DP）编码。
pub const DEFAULT_COMMAND_CODE: &str = "power_value";

/// 云端判定 token 失效时返回的错误码。
const TOKEN_INVALID_CODE: &str = "1010";

/// 控制链路错误。
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("cloud api error: {message} (code: {code})")]
    CloudApi { code: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("payload error: {0}")]
    Payload(String),
}

/// 命令下发成功回执。
#[derive(Debug, Clone, PartialEq)]
pub struct CommandAck {
    pub device_id: String,
    pub code: String,
    pub value: i64,
    pub sent_at_ms: i64,
}

/// 命令下发器抽象（流水线依赖此接缝，测试可替换）。
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send_command(&self, device_id: &str, watts: f64) -> Result<CommandAck, ControlError>;
}

/// 单条 DP 命令。
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCommand {
    pub code: String,
    pub value: i64,
}

/// 命令请求体 `{commands:[{code, value}]}`。
#[derive(Debug, Clone, Serialize)]
pub struct CommandBody {
    pub commands: Vec<DeviceCommand>,
}

/// 单次命令请求：每次新建，时间戳与签名不复用。
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub device_id: String,
    pub body: String,
    pub timestamp_ms: String,
    pub signature: String,
    pub value: i64,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    success: bool,
    msg: Option<String>,
    code: Option<serde_json::Value>,
}

/// Tuya 客户端配置。
#[derive(Debug, Clone)]
pub struct TuyaClientConfig {
    pub base_url: String,
    pub credentials: TuyaCredentials,
    pub command_code: String,
    pub request_timeout: Duration,
}

impl TuyaClientConfig {
    pub fn new(base_url: impl Into<String>, credentials: TuyaCredentials) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            command_code: DEFAULT_COMMAND_CODE.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Tuya OpenAPI 客户端（token 缓存 + 签名命令下发）。
pub struct TuyaClient {
    http: reqwest::Client,
    base_url: String,
    credentials: TuyaCredentials,
    command_code: String,
    tokens: TokenCache,
}

impl TuyaClient {
    /// 使用 HTTP token 来源创建客户端。
    pub fn new(config: TuyaClientConfig) -> Result<Self, ControlError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ControlError::Transport(err.to_string()))?;
        let source = HttpTokenSource::new(
            http.clone(),
            config.base_url.clone(),
            config.credentials.clone(),
        );
        Ok(Self::with_token_source(config, http, Arc::new(source)))
    }

    /// 注入自定义 token 来源（测试替身）。
    pub fn with_token_source(
        config: TuyaClientConfig,
        http: reqwest::Client,
        source: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: config.credentials,
            command_code: config.command_code,
            tokens: TokenCache::new(source),
        }
    }

    /// 构造签名后的命令请求。
    pub fn build_request(
        &self,
        device_id: &str,
        access_token: &str,
        watts: f64,
        now_ms: i64,
    ) -> Result<CommandRequest, ControlError> {
        let value = round_half_up(watts);
        let body = CommandBody {
            commands: vec![DeviceCommand {
                code: self.command_code.clone(),
                value,
            }],
        };
        let body =
            serde_json::to_string(&body).map_err(|err| ControlError::Payload(err.to_string()))?;
        let timestamp_ms = now_ms.to_string();
        let signature = sign(
            &string_to_sign(
                &self.credentials.access_id,
                Some(access_token),
                &timestamp_ms,
                Some(&body),
            ),
            &self.credentials.access_secret,
        );
        Ok(CommandRequest {
            device_id: device_id.to_string(),
            body,
            timestamp_ms,
            signature,
            value,
        })
    }

    async fn post_command(
        &self,
        access_token: &str,
        request: &CommandRequest,
    ) -> Result<(), ControlError> {
        let url = format!(
            "{}/v1.0/devices/{}/commands",
            self.base_url, request.device_id
        );
        let response = self
            .http
            .post(&url)
            .header("client_id", &self.credentials.access_id)
            .header("access_token", access_token)
            .header("t", &request.timestamp_ms)
            .header("sign", &request.signature)
            .header("sign_method", SIGN_METHOD)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.body.clone())
            .send()
            .await
            .map_err(|err| ControlError::Transport(err.to_string()))?;
        let body: CommandResponse = response
            .json()
            .await
            .map_err(|err| ControlError::InvalidResponse(err.to_string()))?;
        if !body.success {
            return Err(ControlError::CloudApi {
                code: code_to_string(body.code.as_ref()),
                message: body
                    .msg
                    .unwrap_or_else(|| "Unknown error from Tuya API".to_string()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CommandSender for TuyaClient {
    async fn send_command(&self, device_id: &str, watts: f64) -> Result<CommandAck, ControlError> {
        let access_token = self.tokens.get_token().await?;
        let now_ms = now_epoch_ms();
        let request = self.build_request(device_id, &access_token, watts, now_ms)?;
        info!(
            target: "bridge.control",
            device_id = %device_id,
            code = %self.command_code,
            value = request.value,
            "command_send_requested"
        );
        if let Err(err) = self.post_command(&access_token, &request).await {
            warn!(
                target: "bridge.control",
                device_id = %device_id,
                value = request.value,
                error = %err,
                "command_send_failed"
            );
            // 缓存的 token 已被云端判为失效，下次调用重新获取。
            if matches!(&err, ControlError::CloudApi { code, .. } if code == TOKEN_INVALID_CODE) {
                self.tokens.invalidate().await;
            }
            return Err(err);
        }
        info!(
            target: "bridge.control",
            device_id = %device_id,
            value = request.value,
            "command_sent"
        );
        Ok(CommandAck {
            device_id: device_id.to_string(),
            code: self.command_code.clone(),
            value: request.value,
            sent_at_ms: now_ms,
        })
    }
}
