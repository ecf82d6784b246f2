use bridge_config::{AppConfig, ConfigError};
use std::sync::Mutex;

// 环境变量为进程级共享状态，测试间串行访问。
static ENV_LOCK: Mutex<()> = Mutex::new(());

const KEYS: &[&str] = &[
    "TUYA_ACCESS_ID",
    "TUYA_ACCESS_SECRET",
    "TUYA_DEVICE_ID",
    "TUYA_API_REGION",
    "MQTT_PORT",
    "POWER_THRESHOLD_W",
    "BRIDGE_HTTP_ADDR",
    "MQTT_CLIENT_ID",
];

fn reset_env() {
    // Rust 2024 中 set_var/remove_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }
}

fn set_credentials() {
    unsafe {
        std::env::set_var("TUYA_ACCESS_ID", "access-id");
        std::env::set_var("TUYA_ACCESS_SECRET", "access-secret");
        std::env::set_var("TUYA_DEVICE_ID", "device-1");
    }
}

#[test]
fn load_config_from_env() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    reset_env();
    set_credentials();
    unsafe {
        std::env::set_var("BRIDGE_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("POWER_THRESHOLD_W", "75.5");
        std::env::set_var("TUYA_API_REGION", "US");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.tuya_device_id, "device-1");
    assert_eq!(config.tuya_api_region, "us");
    assert_eq!(config.power_threshold_w, 75.5);
    assert_eq!(config.mqtt_port, 8084);
    assert_eq!(config.tuya_command_code, "power_value");
    assert_eq!(config.tuya_request_timeout_ms, 10_000);
}

#[test]
fn missing_credentials_fail_at_startup() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    reset_env();
    unsafe {
        std::env::set_var("TUYA_ACCESS_ID", "access-id");
    }

    let err = AppConfig::from_env().expect_err("missing secret");
    assert!(matches!(err, ConfigError::Missing(ref key) if key == "TUYA_ACCESS_SECRET"));
}

#[test]
fn invalid_threshold_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    reset_env();
    set_credentials();
    unsafe {
        std::env::set_var("POWER_THRESHOLD_W", "fifty");
    }

    let err = AppConfig::from_env().expect_err("invalid threshold");
    assert_eq!(err.to_string(), "invalid value for POWER_THRESHOLD_W: fifty");
    reset_env();
}

#[test]
fn mqtt_client_id_is_trimmed() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    reset_env();
    set_credentials();
    unsafe {
        std::env::set_var("MQTT_CLIENT_ID", " bridge-1 ");
    }
    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.mqtt_client_id.as_deref(), Some("bridge-1"));

    unsafe {
        std::env::set_var("MQTT_CLIENT_ID", "   ");
    }
    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.mqtt_client_id, None);
    reset_env();
}
