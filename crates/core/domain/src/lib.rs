//! 桥接服务共享的领域模型。

pub mod data;
pub mod event;

pub use data::{ConnectionState, Reading, TelemetryEvent, ThresholdPolicy, round_half_up};
pub use event::{
    BridgeStatus, EVENT_LOG_CAPACITY, EventLog, PipelineEvent, Severity, now_epoch_ms,
};
