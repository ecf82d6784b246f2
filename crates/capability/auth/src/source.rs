use crate::token::{IssuedToken, TokenSource};
use crate::{AuthError, SIGN_METHOD, sign, string_to_sign};
use async_trait::async_trait;
use domain::now_epoch_ms;
use serde::Deserialize;
use tracing::info;

/// token 接口路径。
pub const TOKEN_PATH: &str = "/v1.0/token?grant_type=1";

/// 云端 API 凭据。
#[derive(Clone)]
pub struct TuyaCredentials {
    pub access_id: String,
    pub access_secret: String,
}

impl TuyaCredentials {
    pub fn new(access_id: impl Into<String>, access_secret: impl Into<String>) -> Self {
        Self {
            access_id: access_id.into(),
            access_secret: access_secret.into(),
        }
    }
}

impl std::fmt::Debug for TuyaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TuyaCredentials")
            .field("access_id", &self.access_id)
            .field("access_secret", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    success: bool,
    result: Option<TokenResult>,
    msg: Option<String>,
    code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResult {
    access_token: String,
    expire_time: i64,
}

/// 基于 HTTP 的 token 来源：签名 GET `/v1.0/token?grant_type=1`。
#[derive(Clone)]
pub struct HttpTokenSource {
    http: reqwest::Client,
    base_url: String,
    credentials: TuyaCredentials,
}

impl HttpTokenSource {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        credentials: TuyaCredentials,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch_token(&self) -> Result<IssuedToken, AuthError> {
        let timestamp = now_epoch_ms().to_string();
        let signature = sign(
            &string_to_sign(&self.credentials.access_id, None, &timestamp, None),
            &self.credentials.access_secret,
        );
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        info!(target: "bridge.auth", url = %url, "token_request");

        let response = self
            .http
            .get(&url)
            .header("client_id", &self.credentials.access_id)
            .header("t", &timestamp)
            .header("sign", &signature)
            .header("sign_method", SIGN_METHOD)
            .header("dev_lang", "en")
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|err| AuthError::InvalidResponse(err.to_string()))?;

        if !body.success {
            return Err(AuthError::Rejected {
                code: code_to_string(body.code.as_ref()),
                message: body.msg.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        let result = body
            .result
            .ok_or_else(|| AuthError::InvalidResponse("missing result".to_string()))?;
        Ok(IssuedToken {
            access_token: result.access_token,
            expire_time_secs: result.expire_time,
        })
    }
}

/// 服务端错误码原样转字符串，缺失时为 `N/A`。
pub fn code_to_string(code: Option<&serde_json::Value>) -> String {
    match code {
        Some(serde_json::Value::String(value)) => value.clone(),
        Some(serde_json::Value::Null) | None => "N/A".to_string(),
        Some(value) => value.to_string(),
    }
}
