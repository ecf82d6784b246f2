/// 功率读数（瓦）。仅在一次流水线处理内存在。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub watts: f64,
}

impl Reading {
    /// 从原始报文文本解析读数；非数字或非有限值返回 `None`。
    pub fn parse(text: &str) -> Option<Self> {
        let watts = text.trim().parse::<f64>().ok()?;
        if !watts.is_finite() {
            return None;
        }
        Some(Self { watts })
    }

    /// 展示格式：两位小数 + 单位。
    pub fn display(&self) -> String {
        format!("{:.2} W", self.watts)
    }

    /// 命令下发用的整数值（四舍五入，.5 向上取整）。
    pub fn rounded(&self) -> i64 {
        round_half_up(self.watts)
    }
}

/// 阈值策略：`value > cutoff` 时转发。进程启动时确定，运行期不可变。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    cutoff_watts: f64,
}

impl ThresholdPolicy {
    pub fn new(cutoff_watts: f64) -> Self {
        Self { cutoff_watts }
    }

    pub fn cutoff_watts(&self) -> f64 {
        self.cutoff_watts
    }

    /// 读数严格大于阈值才需要转发。
    pub fn should_forward(&self, reading: &Reading) -> bool {
        reading.watts > self.cutoff_watts
    }
}

/// 订阅端投递给流水线的事件。
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Connecting { broker: String },
    Connected,
    Subscribed { topic: String },
    SubscribeFailed { topic: String, reason: String },
    Message {
        topic: String,
        payload: Vec<u8>,
        received_at_ms: i64,
    },
    /// 每次断线只投递一次，重连尝试不重复投递。
    ConnectionLost { reason: String },
    /// 不可恢复的连接错误（如鉴权被拒）。
    Failed { reason: String },
    Closed,
}

/// 订阅端连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
            ConnectionState::Closed => "closed",
        }
    }
}

pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
