//! 遥测接入能力：单主题 MQTT（WSS）订阅。

mod session;

use async_trait::async_trait;
use domain::{ConnectionState, TelemetryEvent};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

/// 投递通道容量。
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("subscriber already running")]
    AlreadyRunning,
    /// MQTT 客户端 ID 不能为空或以空格开头。
    #[error("invalid client id: {0:?}")]
    InvalidClientId(String),
    #[error("source error: {0}")]
    Source(String),
}

/// 订阅端配置。
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    /// 断线后的固定重连间隔。
    pub reconnect_interval: Duration,
    pub keep_alive: Duration,
}

impl SubscriberConfig {
    pub fn new(host: impl Into<String>, port: u16, topic: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            topic: topic.into(),
            username: None,
            password: None,
            client_id: format!("power-bridge-{}", uuid::Uuid::new_v4().simple()),
            reconnect_interval: Duration::from_millis(1000),
            keep_alive: Duration::from_secs(30),
        }
    }

    /// `wss://{host}:{port}/mqtt`
    pub fn broker_url(&self) -> String {
        format!("wss://{}:{}/mqtt", self.host, self.port)
    }
}

/// 遥测来源抽象（桥接会话依赖此接缝，测试可替换）。
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// 启动并返回按序投递的事件流；已在运行时返回 `AlreadyRunning`。
    fn start(&self) -> Result<mpsc::Receiver<TelemetryEvent>, IngestError>;
    /// 主动关闭；未启动时为空操作。
    async fn stop(&self);
    fn state(&self) -> ConnectionState;
    fn topic(&self) -> &str;
}

struct RunningSession {
    stop_tx: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

/// 遥测订阅端：持有唯一的连接句柄，显式 start/stop。
pub struct TelemetrySubscriber {
    config: SubscriberConfig,
    state_tx: watch::Sender<ConnectionState>,
    running: Mutex<Option<RunningSession>>,
}

impl TelemetrySubscriber {
    pub fn new(config: SubscriberConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            config,
            state_tx,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    /// 当前连接状态。
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| {
                running
                    .as_ref()
                    .is_some_and(|session| !session.handle.is_finished())
            })
            .unwrap_or(false)
    }

    /// 建立连接并订阅主题，返回按序投递的事件流。
    pub fn start(&self) -> Result<mpsc::Receiver<TelemetryEvent>, IngestError> {
        let mut running = self
            .running
            .lock()
            .map_err(|_| IngestError::Source("lock failed".to_string()))?;
        if running
            .as_ref()
            .is_some_and(|session| !session.handle.is_finished())
        {
            return Err(IngestError::AlreadyRunning);
        }
        let client_id = &self.config.client_id;
        if client_id.is_empty() || client_id.starts_with(' ') {
            return Err(IngestError::InvalidClientId(client_id.clone()));
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        let options = session::mqtt_options(&self.config);
        let handle = tokio::spawn(session::run(
            options,
            self.config.clone(),
            events_tx,
            self.state_tx.clone(),
            stop_rx,
        ));
        info!(
            target: "bridge.ingest",
            broker = %self.config.broker_url(),
            topic = %self.config.topic,
            client_id = %self.config.client_id,
            "subscriber_started"
        );
        *running = Some(RunningSession { stop_tx, handle });
        Ok(events_rx)
    }

    /// 主动关闭连接；未启动时为空操作，可重复调用。
    pub async fn stop(&self) {
        let session = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(_) => None,
        };
        let Some(session) = session else {
            return;
        };
        let _ = session.stop_tx.send(());
        let _ = session.handle.await;
        info!(target: "bridge.ingest", "subscriber_stopped");
    }
}

#[async_trait]
impl TelemetrySource for TelemetrySubscriber {
    fn start(&self) -> Result<mpsc::Receiver<TelemetryEvent>, IngestError> {
        TelemetrySubscriber::start(self)
    }

    async fn stop(&self) {
        TelemetrySubscriber::stop(self).await;
    }

    fn state(&self) -> ConnectionState {
        TelemetrySubscriber::state(self)
    }

    fn topic(&self) -> &str {
        &self.config.topic
    }
}
