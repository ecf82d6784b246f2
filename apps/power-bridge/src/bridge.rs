//! 桥接会话控制
//!
//! 将遥测来源（TelemetrySource）与功率流水线（PowerPipeline）组装为一次会话：
//! - start：建立订阅并启动唯一的消费任务
//! - stop：先通知消费任务停止取件（队列中的报文丢弃），再关闭订阅，等待在途的云端调用结束
//! - 转发失败或订阅失败时，消费任务自行关闭订阅，运行状态自动变为停止
//!
//! 流水线事件同时写入有界事件日志（供 HTTP 查询）与 tracing。

use bridge_ingest::{IngestError, TelemetrySource};
use bridge_pipeline::{EventSink, PipelineSnapshot, PowerPipeline, SessionEnd, drive};
use domain::{BridgeStatus, ConnectionState, EventLog, PipelineEvent, Severity};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 有界事件日志 + tracing 输出。
#[derive(Default)]
pub struct EventLogSink {
    log: Mutex<EventLog>,
}

impl EventLogSink {
    /// 最新在前的事件副本。
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.log
            .lock()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn status(&self, running: bool) -> BridgeStatus {
        self.log
            .lock()
            .map(|log| BridgeStatus::derive(&log, running))
            .unwrap_or(BridgeStatus::Error)
    }
}

impl EventSink for EventLogSink {
    fn emit(&self, event: PipelineEvent) {
        let severity = event.severity.as_str();
        match event.severity {
            Severity::Info | Severity::Success => {
                info!(target: "bridge.events", severity, text = %event.message, "pipeline_event")
            }
            Severity::Warning => {
                warn!(target: "bridge.events", severity, text = %event.message, "pipeline_event")
            }
            Severity::Error => {
                error!(target: "bridge.events", severity, text = %event.message, "pipeline_event")
            }
        }
        if let Ok(mut log) = self.log.lock() {
            log.push(event);
        }
    }
}

/// 面向展示的桥接状态。
#[derive(Debug, Clone)]
pub struct BridgeView {
    pub status: BridgeStatus,
    pub running: bool,
    pub connection: ConnectionState,
    pub snapshot: PipelineSnapshot,
    pub threshold_watts: f64,
    pub device_id: String,
    pub topic: String,
}

struct Session {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<SessionEnd>,
}

/// 桥接会话控制器（同一时刻至多一个会话）。
pub struct BridgeController {
    source: Arc<dyn TelemetrySource>,
    pipeline: Arc<PowerPipeline>,
    events: Arc<EventLogSink>,
    /// 串行化 start/stop，可跨 await 持有。
    lifecycle: tokio::sync::Mutex<()>,
    /// 只在取放句柄时短暂持有；状态查询不等待 start/stop。
    session: Mutex<Option<Session>>,
}

impl BridgeController {
    pub fn new(source: Arc<dyn TelemetrySource>, pipeline: PowerPipeline) -> Self {
        Self {
            source,
            pipeline: Arc::new(pipeline),
            events: Arc::new(EventLogSink::default()),
            lifecycle: tokio::sync::Mutex::new(()),
            session: Mutex::new(None),
        }
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.events()
    }

    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|session| !session.handle.is_finished())
    }

    fn take_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// 启动会话；已在运行时返回 `Ok(false)`。
    pub async fn start(&self) -> Result<bool, IngestError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_running() {
            return Ok(false);
        }
        // 上一次会话已自行结束（停机），先回收订阅端。
        if self.take_session().is_some() {
            self.source.stop().await;
        }

        let rx = match self.source.start() {
            Ok(rx) => rx,
            Err(err) => {
                self.events
                    .emit(PipelineEvent::error(format!("failed to start bridge: {err}")));
                return Err(err);
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let source = self.source.clone();
        let pipeline = self.pipeline.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let end = drive(rx, stop_rx, &pipeline, events.as_ref()).await;
            if let SessionEnd::Halted { reason } = &end {
                warn!(target: "bridge.session", reason = %reason, "bridge_halted");
                source.stop().await;
            }
            end
        });
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Session { stop_tx, handle });
        info!(
            target: "bridge.session",
            device_id = %self.pipeline.device_id(),
            topic = %self.source.topic(),
            "bridge_started"
        );
        Ok(true)
    }

    /// 停止会话；未运行时返回 `false`。在途的云端调用完成后才返回。
    pub async fn stop(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(session) = self.take_session() else {
            return false;
        };
        let was_running = !session.handle.is_finished();
        if was_running {
            self.events
                .emit(PipelineEvent::info("disconnecting MQTT connection"));
        }
        let _ = session.stop_tx.send(());
        self.source.stop().await;
        match session.handle.await {
            Ok(end) => info!(target: "bridge.session", end = ?end, "bridge_stopped"),
            Err(err) => warn!(target: "bridge.session", error = %err, "bridge_task_failed"),
        }
        was_running
    }

    pub fn view(&self) -> BridgeView {
        let running = self.is_running();
        BridgeView {
            status: self.events.status(running),
            running,
            connection: self.source.state(),
            snapshot: self.pipeline.snapshot(),
            threshold_watts: self.pipeline.policy().cutoff_watts(),
            device_id: self.pipeline.device_id().to_string(),
            topic: self.source.topic().to_string(),
        }
    }
}
