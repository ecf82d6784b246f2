//! 追踪、请求 ID 与基础指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub readings_received: u64,
    pub readings_invalid: u64,
    pub readings_below_threshold: u64,
    pub forwards_attempted: u64,
    pub forward_success: u64,
    pub forward_failure: u64,
    pub forward_latency_ms_total: u64,
    pub forward_latency_ms_count: u64,
    pub token_renewals: u64,
    pub connection_lost: u64,
}

/// 进程级指标计数器。
pub struct TelemetryMetrics {
    readings_received: AtomicU64,
    readings_invalid: AtomicU64,
    readings_below_threshold: AtomicU64,
    forwards_attempted: AtomicU64,
    forward_success: AtomicU64,
    forward_failure: AtomicU64,
    forward_latency_ms_total: AtomicU64,
    forward_latency_ms_count: AtomicU64,
    token_renewals: AtomicU64,
    connection_lost: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            readings_received: AtomicU64::new(0),
            readings_invalid: AtomicU64::new(0),
            readings_below_threshold: AtomicU64::new(0),
            forwards_attempted: AtomicU64::new(0),
            forward_success: AtomicU64::new(0),
            forward_failure: AtomicU64::new(0),
            forward_latency_ms_total: AtomicU64::new(0),
            forward_latency_ms_count: AtomicU64::new(0),
            token_renewals: AtomicU64::new(0),
            connection_lost: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            readings_received: self.readings_received.load(Ordering::Relaxed),
            readings_invalid: self.readings_invalid.load(Ordering::Relaxed),
            readings_below_threshold: self.readings_below_threshold.load(Ordering::Relaxed),
            forwards_attempted: self.forwards_attempted.load(Ordering::Relaxed),
            forward_success: self.forward_success.load(Ordering::Relaxed),
            forward_failure: self.forward_failure.load(Ordering::Relaxed),
            forward_latency_ms_total: self.forward_latency_ms_total.load(Ordering::Relaxed),
            forward_latency_ms_count: self.forward_latency_ms_count.load(Ordering::Relaxed),
            token_renewals: self.token_renewals.load(Ordering::Relaxed),
            connection_lost: self.connection_lost.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录收到的遥测报文次数。
pub fn record_reading_received() {
    metrics().readings_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录无法解析的报文次数。
pub fn record_reading_invalid() {
    metrics().readings_invalid.fetch_add(1, Ordering::Relaxed);
}

/// 记录低于阈值被跳过的读数次数。
pub fn record_reading_below_threshold() {
    metrics()
        .readings_below_threshold
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录转发尝试次数。
pub fn record_forward_attempted() {
    metrics().forwards_attempted.fetch_add(1, Ordering::Relaxed);
}

pub fn record_forward_success() {
    metrics().forward_success.fetch_add(1, Ordering::Relaxed);
}

pub fn record_forward_failure() {
    metrics().forward_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录转发耗时（毫秒，包含 token 获取与命令下发）。
pub fn record_forward_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .forward_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .forward_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录 token 续期次数。
pub fn record_token_renewal() {
    metrics().token_renewals.fetch_add(1, Ordering::Relaxed);
}

/// 记录 broker 断线次数（每次断线一次）。
pub fn record_connection_lost() {
    metrics().connection_lost.fetch_add(1, Ordering::Relaxed);
}
