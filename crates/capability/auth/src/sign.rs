use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 请求头 `sign_method` 的取值。
pub const SIGN_METHOD: &str = "HMAC-SHA256";

/// 拼接待签名串：client_id + [access_token] + 时间戳(毫秒) + [请求体]，无分隔符。
pub fn string_to_sign(
    client_id: &str,
    access_token: Option<&str>,
    timestamp_ms: &str,
    body: Option<&str>,
) -> String {
    let mut out = String::with_capacity(
        client_id.len()
            + access_token.map_or(0, str::len)
            + timestamp_ms.len()
            + body.map_or(0, str::len),
    );
    out.push_str(client_id);
    if let Some(token) = access_token {
        out.push_str(token);
    }
    out.push_str(timestamp_ms);
    if let Some(body) = body {
        out.push_str(body);
    }
    out
}

/// HMAC-SHA256 签名，输出大写十六进制。
pub fn sign(string_to_sign: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}
