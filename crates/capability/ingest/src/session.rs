//! 单次订阅会话的事件循环。

use crate::SubscriberConfig;
use bridge_telemetry::record_connection_lost;
use domain::{ConnectionState, TelemetryEvent, now_epoch_ms};
use rumqttc::{
    AsyncClient, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode,
    Transport,
};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

/// 主动断开时等待 DISCONNECT 发出的上限。
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// 连接错误的处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionDecision {
    /// 网络类错误：固定间隔后重连。
    Reconnect,
    /// broker 拒绝连接（凭据等）：结束会话。
    Fatal,
}

pub(crate) fn classify_error(err: &ConnectionError) -> SessionDecision {
    match err {
        ConnectionError::ConnectionRefused(_) => SessionDecision::Fatal,
        _ => SessionDecision::Reconnect,
    }
}

pub(crate) fn mqtt_options(config: &SubscriberConfig) -> MqttOptions {
    // websocket 传输下 broker 地址为完整 URL。
    let mut options = MqttOptions::new(config.client_id.clone(), config.broker_url(), config.port);
    options.set_transport(Transport::wss_with_default_config());
    apply_session_options(&mut options, config);
    options
}

/// 与传输无关的会话参数。
fn apply_session_options(options: &mut MqttOptions, config: &SubscriberConfig) {
    options.set_keep_alive(config.keep_alive);
    options.set_clean_session(true);
    if let (Some(username), Some(password)) =
        (config.username.as_ref(), config.password.as_ref())
    {
        options.set_credentials(username, password);
    }
}

/// 断线上报与订阅确认的状态跟踪。
#[derive(Debug)]
pub(crate) struct SessionTracker {
    topic: String,
    lost_reported: bool,
    awaiting_suback: bool,
}

impl SessionTracker {
    pub(crate) fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            lost_reported: false,
            awaiting_suback: false,
        }
    }

    /// 连接建立（含重连）。
    pub(crate) fn on_connected(&mut self) -> TelemetryEvent {
        self.lost_reported = false;
        self.awaiting_suback = true;
        TelemetryEvent::Connected
    }

    /// 返回 (事件, 是否致命)；非等待中的 SubAck 忽略。
    pub(crate) fn on_suback(
        &mut self,
        codes: &[SubscribeReasonCode],
    ) -> Option<(TelemetryEvent, bool)> {
        if !self.awaiting_suback {
            return None;
        }
        self.awaiting_suback = false;
        if codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            return Some((
                TelemetryEvent::SubscribeFailed {
                    topic: self.topic.clone(),
                    reason: "broker rejected subscription".to_string(),
                },
                true,
            ));
        }
        Some((
            TelemetryEvent::Subscribed {
                topic: self.topic.clone(),
            },
            false,
        ))
    }

    pub(crate) fn on_subscribe_request_failed(&mut self, reason: String) -> TelemetryEvent {
        self.awaiting_suback = false;
        TelemetryEvent::SubscribeFailed {
            topic: self.topic.clone(),
            reason,
        }
    }

    /// 每次断线只产出一次 ConnectionLost；重连失败不重复上报。
    pub(crate) fn on_error(
        &mut self,
        err: &ConnectionError,
    ) -> (Option<TelemetryEvent>, SessionDecision) {
        self.awaiting_suback = false;
        let decision = classify_error(err);
        if decision == SessionDecision::Fatal {
            return (
                Some(TelemetryEvent::Failed {
                    reason: err.to_string(),
                }),
                decision,
            );
        }
        if self.lost_reported {
            return (None, decision);
        }
        self.lost_reported = true;
        (
            Some(TelemetryEvent::ConnectionLost {
                reason: err.to_string(),
            }),
            decision,
        )
    }
}

async fn deliver(events: &mpsc::Sender<TelemetryEvent>, event: TelemetryEvent) -> bool {
    events.send(event).await.is_ok()
}

pub(crate) async fn run(
    options: MqttOptions,
    config: SubscriberConfig,
    events: mpsc::Sender<TelemetryEvent>,
    state: watch::Sender<ConnectionState>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let (client, mut eventloop) = rumqttc::AsyncClient::new(options, 10);
    let mut tracker = SessionTracker::new(config.topic.clone());

    state.send_replace(ConnectionState::Connecting);
    if !deliver(
        &events,
        TelemetryEvent::Connecting {
            broker: config.broker_url(),
        },
    )
    .await
    {
        return;
    }

    loop {
        let polled = tokio::select! {
            biased;
            _ = &mut stop_rx => {
                close(&client, &mut eventloop, &state).await;
                let _ = events.send(TelemetryEvent::Closed).await;
                return;
            }
            polled = eventloop.poll() => polled,
        };

        match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                state.send_replace(ConnectionState::Connected);
                info!(target: "bridge.ingest", broker = %config.broker_url(), "broker_connected");
                if !deliver(&events, tracker.on_connected()).await {
                    break;
                }
                if let Err(err) = client.try_subscribe(config.topic.clone(), QoS::AtMostOnce) {
                    let event = tracker.on_subscribe_request_failed(err.to_string());
                    fail(&state, &events, event).await;
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                let Some((event, fatal)) = tracker.on_suback(&suback.return_codes) else {
                    continue;
                };
                if fatal {
                    fail(&state, &events, event).await;
                    break;
                }
                info!(target: "bridge.ingest", topic = %config.topic, "topic_subscribed");
                if !deliver(&events, event).await {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let event = TelemetryEvent::Message {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    received_at_ms: now_epoch_ms(),
                };
                if !deliver(&events, event).await {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => {
                let (event, decision) = tracker.on_error(&err);
                if decision == SessionDecision::Fatal {
                    warn!(target: "bridge.ingest", error = %err, "broker_connection_refused");
                    if let Some(event) = event {
                        fail(&state, &events, event).await;
                    }
                    break;
                }
                state.send_replace(ConnectionState::Connecting);
                if let Some(event) = event {
                    record_connection_lost();
                    warn!(target: "bridge.ingest", error = %err, "broker_connection_lost");
                    if !deliver(&events, event).await {
                        break;
                    }
                }
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        state.send_replace(ConnectionState::Closed);
                        let _ = events.send(TelemetryEvent::Closed).await;
                        return;
                    }
                    _ = tokio::time::sleep(config.reconnect_interval) => {}
                }
            }
        }
    }
    // 消费端已退出或会话失败；错误状态保留给观察者。
    state.send_if_modified(|current| {
        if *current == ConnectionState::Error {
            return false;
        }
        *current = ConnectionState::Closed;
        true
    });
}

async fn fail(
    state: &watch::Sender<ConnectionState>,
    events: &mpsc::Sender<TelemetryEvent>,
    event: TelemetryEvent,
) {
    state.send_replace(ConnectionState::Error);
    warn!(target: "bridge.ingest", event = ?event, "subscriber_failed");
    let _ = events.send(event).await;
}

/// 主动关闭：已连接时发送 DISCONNECT，不产出 ConnectionLost。
async fn close(
    client: &AsyncClient,
    eventloop: &mut rumqttc::EventLoop,
    state: &watch::Sender<ConnectionState>,
) {
    if *state.borrow() == ConnectionState::Connected && client.try_disconnect().is_ok() {
        let _ = tokio::time::timeout(DISCONNECT_GRACE, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
    }
    state.send_replace(ConnectionState::Closed);
}
