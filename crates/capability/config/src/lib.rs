//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub autostart: bool,
    pub tuya_access_id: String,
    pub tuya_access_secret: String,
    pub tuya_device_id: String,
    pub tuya_api_region: String,
    /// 覆盖区域地址（代理或本地测试）。
    pub tuya_base_url: Option<String>,
    pub tuya_command_code: String,
    pub tuya_request_timeout_ms: u64,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_topic: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: Option<String>,
    pub mqtt_reconnect_ms: u64,
    pub power_threshold_w: f64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let tuya_access_id = read_required("TUYA_ACCESS_ID")?;
        let tuya_access_secret = read_required("TUYA_ACCESS_SECRET")?;
        let tuya_device_id = read_required("TUYA_DEVICE_ID")?;
        let tuya_api_region = env::var("TUYA_API_REGION")
            .map(|value| value.trim().to_ascii_lowercase())
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "eu".to_string());
        let tuya_base_url = read_optional("TUYA_BASE_URL");
        let tuya_command_code =
            read_optional("TUYA_COMMAND_CODE").unwrap_or_else(|| "power_value".to_string());
        let tuya_request_timeout_ms = read_u64_with_default("TUYA_REQUEST_TIMEOUT_MS", 10_000)?;
        let http_addr =
            env::var("BRIDGE_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let autostart = read_bool_with_default("BRIDGE_AUTOSTART", false);
        let mqtt_host = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("MQTT_PORT", 8084)?;
        let mqtt_topic = env::var("MQTT_TOPIC").unwrap_or_else(|_| "solar/ac/power".to_string());
        let mqtt_username = read_optional("MQTT_USERNAME");
        let mqtt_password = read_optional("MQTT_PASSWORD");
        // 客户端 ID 以空格开头会被 MQTT 客户端拒绝，首尾空白一律去除。
        let mqtt_client_id =
            read_optional("MQTT_CLIENT_ID").map(|value| value.trim().to_string());
        let mqtt_reconnect_ms = read_u64_with_default("MQTT_RECONNECT_MS", 1000)?;
        let power_threshold_w = read_f64_with_default("POWER_THRESHOLD_W", 50.0)?;

        if mqtt_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("MQTT_TOPIC".to_string(), mqtt_topic));
        }

        Ok(Self {
            http_addr,
            autostart,
            tuya_access_id,
            tuya_access_secret,
            tuya_device_id,
            tuya_api_region,
            tuya_base_url,
            tuya_command_code,
            tuya_request_timeout_ms,
            mqtt_host,
            mqtt_port,
            mqtt_topic,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            mqtt_reconnect_ms,
            power_threshold_w,
        })
    }
}

/// 读取必填字符串，空值视为缺失。
fn read_required(key: &str) -> Result<String, ConfigError> {
    read_optional(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_f64_with_default(key: &str, default: f64) -> Result<f64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.trim().parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
