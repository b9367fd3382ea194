//! 通道状态与背压通知。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 通道连接状态。
///
/// 合法迁移只有 `connecting → open → closing → closed` 与 `closed → connecting`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
            ChannelState::Closed => "closed",
        }
    }

    /// 是否允许迁移到 `next`。
    pub fn can_transition_to(&self, next: ChannelState) -> bool {
        matches!(
            (self, next),
            (ChannelState::Connecting, ChannelState::Open)
                | (ChannelState::Open, ChannelState::Closing)
                | (ChannelState::Closing, ChannelState::Closed)
                | (ChannelState::Closed, ChannelState::Connecting)
        )
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "connecting" => Ok(ChannelState::Connecting),
            "open" => Ok(ChannelState::Open),
            "closing" => Ok(ChannelState::Closing),
            "closed" => Ok(ChannelState::Closed),
            other => Err(format!("unknown channel state: {}", other)),
        }
    }
}

/// 通道通知中的状态字段（状态迁移之外还包括错误与失败删除）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelStatus {
    Connecting,
    Open,
    Closing,
    Closed,
    Errored,
    FailedDeleted,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Open => "open",
            ChannelStatus::Closing => "closing",
            ChannelStatus::Closed => "closed",
            ChannelStatus::Errored => "errored",
            ChannelStatus::FailedDeleted => "failed-deleted",
        }
    }
}

impl From<ChannelState> for ChannelStatus {
    fn from(state: ChannelState) -> Self {
        match state {
            ChannelState::Connecting => ChannelStatus::Connecting,
            ChannelState::Open => ChannelStatus::Open,
            ChannelState::Closing => ChannelStatus::Closing,
            ChannelState::Closed => ChannelStatus::Closed,
        }
    }
}

/// 通道状态变更通知。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStateEvent {
    pub channel_id: String,
    pub state: ChannelStatus,
    pub detail: Option<String>,
}

impl ChannelStateEvent {
    pub fn new(channel_id: impl Into<String>, state: ChannelStatus, detail: Option<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            state,
            detail,
        }
    }
}

/// 背压级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackpressureLevel {
    DropEngaged,
    DropReleased,
}

impl BackpressureLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackpressureLevel::DropEngaged => "drop-engaged",
            BackpressureLevel::DropReleased => "drop-released",
        }
    }
}

/// 背压状态变更通知。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackpressureEvent {
    pub level: BackpressureLevel,
    pub utilization_percent: f64,
}

/// 发往控制面的通知。
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ChannelState(ChannelStateEvent),
    Backpressure(BackpressureEvent),
}

/// 通知发送抽象。
///
/// 在连接事件处理路径上同步调用，实现不得阻塞。
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// 空通知器（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: Notification) {}
}
