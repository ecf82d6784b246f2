//! 云端鉴权能力：请求签名、token 获取与缓存。

mod sign;
mod source;
mod token;

pub use sign::{SIGN_METHOD, sign, string_to_sign};
pub use source::{HttpTokenSource, TOKEN_PATH, TuyaCredentials, code_to_string};
pub use token::{AccessToken, IssuedToken, TOKEN_SAFETY_MARGIN_SECS, TokenCache, TokenSource};

/// 鉴权相关错误。
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token request rejected: {message} (code: {code})")]
    Rejected { code: String, message: String },
    #[error("token transport error: {0}")]
    Transport(String),
    #[error("token response invalid: {0}")]
    InvalidResponse(String),
}
