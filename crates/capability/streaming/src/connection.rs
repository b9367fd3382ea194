//! 连接抽象与连接生命周期事件。
//!
//! 连接只负责上报事件，通道状态由 [`ChannelPool`](crate::ChannelPool) 根据事件推进。

use crate::error::StreamingError;
use async_trait::async_trait;
use domain::PointIdentity;
use tokio::sync::mpsc;

pub type ConnectionEventSender = mpsc::Sender<ConnectionEvent>;
pub type ConnectionEventReceiver = mpsc::Receiver<ConnectionEvent>;

/// 连接生命周期事件类型。
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEventKind {
    /// 握手完成
    Opened,
    /// 传输层错误（随后会收到 Closing/Closed）
    Errored(String),
    /// 开始关闭
    Closing,
    /// 已关闭，可选关闭原因
    Closed(Option<String>),
    /// 连接建立失败（握手等待窗口之后才失败）
    Failed(String),
    /// 收到的数据帧
    Message(String),
}

/// 连接事件，`generation` 用于丢弃已被替换的旧连接的迟到事件。
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionEvent {
    pub channel_id: String,
    pub generation: u64,
    pub kind: ConnectionEventKind,
}

impl ConnectionEvent {
    pub fn new(channel_id: impl Into<String>, generation: u64, kind: ConnectionEventKind) -> Self {
        Self {
            channel_id: channel_id.into(),
            generation,
            kind,
        }
    }
}

/// 建连目标。
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub channel_id: String,
    pub generation: u64,
    pub points: Vec<PointIdentity>,
}

/// 连接句柄，由通道记录独占持有。
pub trait Connection: Send + Sync {
    /// 请求关闭。只发信号，不得阻塞。
    fn close(&self);
}

/// 连接工厂抽象。
///
/// `connect` 最多等待一个有界的握手窗口：窗口内握手失败返回错误，
/// 窗口结束仍未完成则返回句柄，后续结果通过事件上报。
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        target: ConnectTarget,
        events: ConnectionEventSender,
    ) -> Result<Box<dyn Connection>, StreamingError>;
}

/// 通道上收到的原始消息。
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub channel_id: String,
    pub payload: String,
}

/// 通道消息处理器。
#[async_trait]
pub trait ChannelMessageHandler: Send + Sync {
    async fn handle(&self, message: ChannelMessage) -> Result<(), StreamingError>;
}

/// 空处理器（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopMessageHandler;

#[async_trait]
impl ChannelMessageHandler for NoopMessageHandler {
    async fn handle(&self, _message: ChannelMessage) -> Result<(), StreamingError> {
        Ok(())
    }
}
