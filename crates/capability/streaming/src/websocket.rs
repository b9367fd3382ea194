//! 基于 WebSocket 的推送连接实现（历史库 streamsets 通道）。

use crate::connection::{
    ConnectTarget, Connection, ConnectionEvent, ConnectionEventKind, ConnectionEventSender,
    Connector,
};
use crate::error::StreamingError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use domain::PointIdentity;
use futures_util::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

/// 关闭握手后等待对端确认的上限。
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 明文传输的服务器 scheme；无 scheme 时按 TLS 处理。
const PLAIN_SCHEMES: [&str; 2] = ["ws", "http"];
const TLS_SCHEMES: [&str; 2] = ["wss", "https"];

/// WebSocket 连接参数。
#[derive(Debug, Clone)]
pub struct WsConnectorConfig {
    /// 服务器地址（可带或不带 scheme）
    pub server_url: String,
    pub api_root_path: String,
    pub username: String,
    pub password: String,
    pub verify_ssl: bool,
    pub heartbeat_rate: u64,
    /// `connect` 等待握手结果的窗口
    pub handshake_wait: Duration,
    /// 握手整体超时（窗口之后的失败通过 Failed 事件上报）
    pub connect_timeout: Duration,
    /// 无任何帧的空闲超时
    pub idle_timeout: Duration,
}

impl WsConnectorConfig {
    /// 拆分服务器地址为 (scheme, host)。
    fn split_server(&self) -> (Option<&str>, &str) {
        let server = self.server_url.trim();
        match server.split_once("://") {
            Some((scheme, host)) => (Some(scheme), host.trim_end_matches('/')),
            None => (None, server.trim_end_matches('/')),
        }
    }

    /// `ws://` 或 `http://` 地址走明文 WebSocket。
    pub fn is_plaintext(&self) -> bool {
        self.split_server().0.is_some_and(|scheme| {
            PLAIN_SCHEMES
                .iter()
                .any(|plain| scheme.eq_ignore_ascii_case(plain))
        })
    }

    fn validate(&self) -> Result<(), StreamingError> {
        let (scheme, host) = self.split_server();
        if let Some(scheme) = scheme {
            let known = PLAIN_SCHEMES
                .iter()
                .chain(TLS_SCHEMES.iter())
                .any(|known| scheme.eq_ignore_ascii_case(known));
            if !known {
                return Err(StreamingError::Config(format!(
                    "unsupported server scheme: {}",
                    scheme
                )));
            }
        }
        if host.is_empty() {
            return Err(StreamingError::Config("server host is empty".to_string()));
        }
        Ok(())
    }

    /// 生成通道地址：`wss://{host}/{root}/streamsets/channel?heartbeatRate=N&webid=..`，
    /// 明文服务器地址对应 `ws://`。
    pub fn channel_url(&self, points: &[PointIdentity]) -> String {
        let (_, host) = self.split_server();
        let scheme = if self.is_plaintext() { "ws" } else { "wss" };
        let mut url = format!(
            "{}://{}/{}/streamsets/channel?heartbeatRate={}",
            scheme,
            host,
            self.api_root_path.trim_matches('/'),
            self.heartbeat_rate
        );
        for point in points {
            url.push_str("&webid=");
            url.push_str(&point.id);
        }
        url
    }

    fn authorization(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

/// WebSocket 连接工厂。
pub struct WsConnector {
    config: WsConnectorConfig,
    tls: native_tls::TlsConnector,
}

impl WsConnector {
    pub fn new(config: WsConnectorConfig) -> Result<Self, StreamingError> {
        config.validate()?;
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .danger_accept_invalid_hostnames(!config.verify_ssl)
            .build()
            .map_err(|err| StreamingError::Config(format!("tls: {}", err)))?;
        if config.is_plaintext() {
            warn!(target: "edge.streaming", server = %config.server_url, "plaintext_channel_transport");
        } else if !config.verify_ssl {
            warn!(target: "edge.streaming", "tls_verification_disabled");
        }
        Ok(Self { config, tls })
    }

    pub fn config(&self) -> &WsConnectorConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        target: ConnectTarget,
        events: ConnectionEventSender,
    ) -> Result<Box<dyn Connection>, StreamingError> {
        let url = self.config.channel_url(&target.points);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| StreamingError::Connection(err.to_string()))?;
        let auth = HeaderValue::from_str(&self.config.authorization())
            .map_err(|err| StreamingError::Connection(err.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (ready_tx, ready_rx) = oneshot::channel();
        let (close_tx, close_rx) = watch::channel(false);
        let session = WsSession {
            channel_id: target.channel_id.clone(),
            generation: target.generation,
            events,
            connect_timeout: self.config.connect_timeout,
            idle_timeout: self.config.idle_timeout,
        };
        let tls = tokio_tungstenite::Connector::NativeTls(self.tls.clone());
        tokio::spawn(session.run(request, tls, ready_tx, close_rx));

        match tokio::time::timeout(self.config.handshake_wait, ready_rx).await {
            Ok(Ok(Err(detail))) => Err(StreamingError::Connection(detail)),
            // 窗口内成功，或仍在握手（结果经事件上报）
            _ => Ok(Box::new(WsConnection { close_tx })),
        }
    }
}

/// WebSocket 连接句柄。
pub struct WsConnection {
    close_tx: watch::Sender<bool>,
}

impl Connection for WsConnection {
    fn close(&self) {
        self.close_tx.send_replace(true);
    }
}

struct WsSession {
    channel_id: String,
    generation: u64,
    events: ConnectionEventSender,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl WsSession {
    async fn emit(&self, kind: ConnectionEventKind) {
        let event = ConnectionEvent::new(self.channel_id.clone(), self.generation, kind);
        if self.events.send(event).await.is_err() {
            debug!(target: "edge.streaming", channel_id = %self.channel_id, "connection_event_dropped");
        }
    }

    async fn run(
        self,
        request: tokio_tungstenite::tungstenite::handshake::client::Request,
        tls: tokio_tungstenite::Connector,
        ready_tx: oneshot::Sender<Result<(), String>>,
        mut close_rx: watch::Receiver<bool>,
    ) {
        let handshake = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, Some(tls)),
        )
        .await;
        let stream = match handshake {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(err)) => {
                self.fail(err.to_string(), ready_tx).await;
                return;
            }
            Err(_) => {
                self.fail("handshake timed out".to_string(), ready_tx).await;
                return;
            }
        };

        info!(target: "edge.streaming", channel_id = %self.channel_id, "channel_connected");
        self.emit(ConnectionEventKind::Opened).await;
        let _ = ready_tx.send(Ok(()));

        let (mut write, mut read) = stream.split();
        let mut last_activity = Instant::now();
        let mut watchdog = tokio::time::interval(Duration::from_secs(1));

        let reason = loop {
            tokio::select! {
                changed = close_rx.changed() => {
                    if changed.is_err() || *close_rx.borrow() {
                        self.emit(ConnectionEventKind::Closing).await;
                        if let Err(err) = write.send(Message::Close(None)).await {
                            debug!(target: "edge.streaming", channel_id = %self.channel_id, error = %err, "close_frame_failed");
                        }
                        let drain = async {
                            while let Some(Ok(frame)) = read.next().await {
                                if matches!(frame, Message::Close(_)) {
                                    break;
                                }
                            }
                        };
                        let _ = tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, drain).await;
                        break Some("closed by client".to_string());
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            last_activity = Instant::now();
                            self.emit(ConnectionEventKind::Message(text.to_string())).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            self.emit(ConnectionEventKind::Closing).await;
                            break frame.map(|frame| format!("{} {}", frame.code, frame.reason));
                        }
                        Some(Ok(_)) => {
                            last_activity = Instant::now();
                        }
                        Some(Err(err)) => {
                            self.emit(ConnectionEventKind::Errored(err.to_string())).await;
                            self.emit(ConnectionEventKind::Closing).await;
                            break Some(err.to_string());
                        }
                        None => {
                            self.emit(ConnectionEventKind::Closing).await;
                            break Some("stream ended".to_string());
                        }
                    }
                }
                _ = watchdog.tick() => {
                    if last_activity.elapsed() > self.idle_timeout {
                        let detail = format!("idle for {}ms", self.idle_timeout.as_millis());
                        self.emit(ConnectionEventKind::Errored(detail.clone())).await;
                        self.emit(ConnectionEventKind::Closing).await;
                        let _ = write.send(Message::Close(None)).await;
                        break Some(detail);
                    }
                }
            }
        };

        info!(
            target: "edge.streaming",
            channel_id = %self.channel_id,
            reason = ?reason,
            "channel_disconnected"
        );
        self.emit(ConnectionEventKind::Closed(reason)).await;
    }

    async fn fail(&self, detail: String, ready_tx: oneshot::Sender<Result<(), String>>) {
        warn!(
            target: "edge.streaming",
            channel_id = %self.channel_id,
            error = %detail,
            "channel_handshake_failed"
        );
        let _ = ready_tx.send(Err(detail.clone()));
        self.emit(ConnectionEventKind::Failed(detail)).await;
    }
}
