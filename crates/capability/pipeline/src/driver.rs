use crate::{EventSink, PowerPipeline, ProcessOutcome};
use domain::{PipelineEvent, TelemetryEvent};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// 一次会话的结束方式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// 转发失败、订阅失败或不可恢复的连接错误。
    Halted { reason: String },
    /// 主动停止，或订阅端关闭、事件流结束。
    Closed,
}

/// 唯一消费者：按序逐条处理订阅事件，直到停机或关闭。
///
/// `stop` 触发（或发送端被丢弃）后不再取出新事件，队列中尚未处理的报文直接丢弃；
/// 正在进行的云端调用会完成。
pub async fn drive(
    mut events: mpsc::Receiver<TelemetryEvent>,
    mut stop: oneshot::Receiver<()>,
    pipeline: &PowerPipeline,
    sink: &dyn EventSink,
) -> SessionEnd {
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut stop => {
                let dropped = drain(&mut events);
                info!(target: "bridge.pipeline", dropped, "session_stopped");
                return SessionEnd::Closed;
            }
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        match event {
            TelemetryEvent::Connecting { broker } => {
                sink.emit(PipelineEvent::info(format!(
                    "connecting to MQTT broker {broker}..."
                )));
            }
            TelemetryEvent::Connected => {
                sink.emit(PipelineEvent::success("connected to MQTT broker"));
            }
            TelemetryEvent::Subscribed { topic } => {
                sink.emit(PipelineEvent::info(format!("subscribed to topic: {topic}")));
            }
            TelemetryEvent::SubscribeFailed { topic, reason } => {
                sink.emit(PipelineEvent::error(format!(
                    "failed to subscribe to topic {topic}: {reason}"
                )));
                return halted(reason);
            }
            TelemetryEvent::ConnectionLost { .. } => {
                sink.emit(PipelineEvent::warning("MQTT connection lost"));
            }
            TelemetryEvent::Failed { reason } => {
                sink.emit(PipelineEvent::error(format!("MQTT error: {reason}")));
                return halted(reason);
            }
            TelemetryEvent::Message { payload, .. } => {
                if let ProcessOutcome::Halt { reason } = pipeline.process(&payload, sink).await {
                    return halted(reason);
                }
            }
            TelemetryEvent::Closed => break,
        }
    }
    info!(target: "bridge.pipeline", "session_closed");
    SessionEnd::Closed
}

/// 关闭接收端并丢弃已排队的报文，返回丢弃的报文数。
fn drain(events: &mut mpsc::Receiver<TelemetryEvent>) -> usize {
    events.close();
    let mut dropped = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, TelemetryEvent::Message { .. }) {
            dropped += 1;
        }
    }
    dropped
}

fn halted(reason: String) -> SessionEnd {
    warn!(target: "bridge.pipeline", reason = %reason, "session_halted");
    SessionEnd::Halted { reason }
}
