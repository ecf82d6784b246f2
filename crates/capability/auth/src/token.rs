use crate::AuthError;
use async_trait::async_trait;
use bridge_telemetry::record_token_renewal;
use domain::now_epoch_ms;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 提前续期的安全余量（秒）。
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;

/// 服务端签发的 token 原始结果。
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    /// 有效期（秒）。
    pub expire_time_secs: i64,
}

/// 缓存中的 token：值 + 绝对过期时间。整体替换，不做局部修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at_ms: i64,
}

impl AccessToken {
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// token 获取来源（网络实现或测试替身）。
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<IssuedToken, AuthError>;
}

/// token 缓存。
///
/// 缓存未过期时直接返回，不发起网络请求；否则通过 [`TokenSource`] 续期，
/// 过期时间按 `now + (expire_time - 60) * 1000` 计算。续期期间持有锁，
/// 并发调用方只会触发一次续期。
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    state: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            state: Mutex::new(None),
        }
    }

    pub async fn get_token(&self) -> Result<String, AuthError> {
        self.get_token_at(now_epoch_ms()).await
    }

    /// 以给定时刻判断缓存是否有效。
    pub async fn get_token_at(&self, now_ms: i64) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.as_ref() {
            if token.is_valid_at(now_ms) {
                return Ok(token.value.clone());
            }
        }

        let issued = match self.source.fetch_token().await {
            Ok(issued) => issued,
            Err(err) => {
                warn!(target: "bridge.auth", error = %err, "token_renewal_failed");
                return Err(err);
            }
        };
        let lifetime_secs = issued
            .expire_time_secs
            .saturating_sub(TOKEN_SAFETY_MARGIN_SECS);
        let token = AccessToken {
            value: issued.access_token,
            expires_at_ms: now_ms.saturating_add(lifetime_secs.saturating_mul(1000)),
        };
        record_token_renewal();
        info!(
            target: "bridge.auth",
            expire_time_secs = issued.expire_time_secs,
            expires_at_ms = token.expires_at_ms,
            "token_renewed"
        );
        let value = token.value.clone();
        *state = Some(token);
        Ok(value)
    }

    /// 当前缓存的 token（可能已过期）。
    pub async fn cached(&self) -> Option<AccessToken> {
        self.state.lock().await.clone()
    }

    /// 丢弃缓存，下次调用强制续期。
    pub async fn invalidate(&self) {
        self.state.lock().await.take();
    }
}
