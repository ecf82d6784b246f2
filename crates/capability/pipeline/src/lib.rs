//! 数据流水线能力：解析 → 阈值判定 → 云端转发。

mod driver;

use bridge_control::CommandSender;
use bridge_telemetry::{
    record_forward_attempted, record_forward_failure, record_forward_latency_ms,
    record_forward_success, record_reading_below_threshold, record_reading_invalid,
    record_reading_received,
};
use domain::{PipelineEvent, Reading, ThresholdPolicy, now_epoch_ms};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub use driver::{SessionEnd, drive};

/// Pipeline 处理错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid power value: \"{0}\"")]
    Parse(String),
}

/// 单条报文处理后的走向。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Continue,
    /// 转发失败：停止本次会话，不再处理后续报文。
    Halt { reason: String },
}

/// 流水线事件出口（同步，不阻塞处理）。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

impl EventSink for mpsc::UnboundedSender<PipelineEvent> {
    fn emit(&self, event: PipelineEvent) {
        let _ = self.send(event);
    }
}

/// 面向展示的观测值。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineSnapshot {
    /// 最近一次有效读数。
    pub current_power: Option<Reading>,
    /// 最近一次成功下发的时间（epoch ms）。
    pub last_update_ms: Option<i64>,
}

/// 解析报文文本为读数。
pub fn parse_reading(payload: &[u8]) -> Result<Reading, PipelineError> {
    let text = String::from_utf8_lossy(payload);
    Reading::parse(&text).ok_or_else(|| PipelineError::Parse(text.into_owned()))
}

/// 功率流水线：单设备、单阈值。
pub struct PowerPipeline {
    policy: ThresholdPolicy,
    device_id: String,
    sender: Arc<dyn CommandSender>,
    snapshot: watch::Sender<PipelineSnapshot>,
}

impl PowerPipeline {
    pub fn new(
        policy: ThresholdPolicy,
        device_id: impl Into<String>,
        sender: Arc<dyn CommandSender>,
    ) -> Self {
        let (snapshot, _) = watch::channel(PipelineSnapshot::default());
        Self {
            policy,
            device_id: device_id.into(),
            sender,
            snapshot,
        }
    }

    pub fn policy(&self) -> ThresholdPolicy {
        self.policy
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        *self.snapshot.borrow()
    }

    /// 处理一条原始报文；调用方保证串行调用。
    pub async fn process(&self, payload: &[u8], sink: &dyn EventSink) -> ProcessOutcome {
        let reading = match parse_reading(payload) {
            Ok(reading) => reading,
            Err(PipelineError::Parse(raw)) => {
                record_reading_invalid();
                debug!(target: "bridge.pipeline", payload = %raw, "reading_invalid");
                sink.emit(PipelineEvent::warning(format!(
                    "received invalid power value: \"{raw}\""
                )));
                return ProcessOutcome::Continue;
            }
        };

        record_reading_received();
        sink.emit(PipelineEvent::info(format!(
            "received power: {}",
            reading.display()
        )));
        self.snapshot
            .send_modify(|snapshot| snapshot.current_power = Some(reading));

        let cutoff = self.policy.cutoff_watts();
        if !self.policy.should_forward(&reading) {
            record_reading_below_threshold();
            sink.emit(PipelineEvent::info(format!(
                "power ({}) is below threshold ({cutoff} W), skipping Tuya send",
                reading.display()
            )));
            return ProcessOutcome::Continue;
        }

        sink.emit(PipelineEvent::info(format!(
            "power ({}) is above threshold ({cutoff} W), sending to Tuya...",
            reading.display()
        )));
        record_forward_attempted();
        let started = Instant::now();
        let result = self
            .sender
            .send_command(&self.device_id, reading.watts)
            .await;
        record_forward_latency_ms(started.elapsed().as_millis() as u64);

        match result {
            Ok(ack) => {
                record_forward_success();
                info!(
                    target: "bridge.pipeline",
                    device_id = %ack.device_id,
                    value = ack.value,
                    "reading_forwarded"
                );
                self.snapshot
                    .send_modify(|snapshot| snapshot.last_update_ms = Some(now_epoch_ms()));
                sink.emit(PipelineEvent::success("data sent to Tuya successfully"));
                ProcessOutcome::Continue
            }
            Err(err) => {
                record_forward_failure();
                warn!(
                    target: "bridge.pipeline",
                    device_id = %self.device_id,
                    error = %err,
                    "reading_forward_failed"
                );
                let reason = err.to_string();
                sink.emit(PipelineEvent::error(format!(
                    "failed to send to Tuya: {reason}"
                )));
                ProcessOutcome::Halt { reason }
            }
        }
    }
}
