use std::collections::VecDeque;

/// 事件日志默认保留条数。
pub const EVENT_LOG_CAPACITY: usize = 100;

/// 流水线事件级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// 流水线在各决策点产生的事件。
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    pub timestamp_ms: i64,
    pub severity: Severity,
    pub message: String,
}

impl PipelineEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: now_epoch_ms(),
            severity,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }
}

/// 有界事件日志：最新在前，超出容量丢弃最旧条目。
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<PipelineEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: PipelineEvent) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front(event);
        self.entries.truncate(self.capacity);
    }

    /// 最新一条事件。
    pub fn latest(&self) -> Option<&PipelineEvent> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// 桥接整体状态（面向展示）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    Running,
    Stopped,
    Error,
}

impl BridgeStatus {
    /// 最新事件为 error 时优先显示错误，其次看是否运行中。
    pub fn derive(log: &EventLog, running: bool) -> Self {
        if log
            .latest()
            .is_some_and(|event| event.severity == Severity::Error)
        {
            return BridgeStatus::Error;
        }
        if running {
            BridgeStatus::Running
        } else {
            BridgeStatus::Stopped
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeStatus::Running => "running",
            BridgeStatus::Stopped => "stopped",
            BridgeStatus::Error => "error",
        }
    }
}

pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
