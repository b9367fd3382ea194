//! 通道管理错误类型定义

use domain::ChannelState;

/// 通道管理错误
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    /// 通道数量达到上限，剩余点位保留在请求队列中
    #[error(
        "channel limit {max_channels} reached: {queued_points} points left queued \
         (activated {activated_channels} channels / {activated_points} points)"
    )]
    ChannelLimit {
        max_channels: usize,
        queued_points: usize,
        activated_channels: usize,
        activated_points: usize,
    },

    /// 通道不存在
    #[error("channel {0} does not exist")]
    UnknownChannel(String),

    /// 点位未分配到任何通道
    #[error("no channel streams point {0}")]
    UnknownPoint(String),

    /// 当前状态不允许该操作
    #[error("channel {channel_id} is {state}, operation not allowed")]
    InvalidState {
        channel_id: String,
        state: ChannelState,
    },

    /// 已请求关闭但连接尚未开始关闭
    #[error("channel {0} has a close in progress, wait for it to settle")]
    ClosePending(String),

    /// 点位缺少必填标识
    #[error("invalid point: {0}")]
    InvalidPoint(String),

    /// 路径正则非法
    #[error("invalid path pattern: {0}")]
    InvalidPattern(String),

    /// 配置非法
    #[error("invalid config: {0}")]
    Config(String),

    /// 连接建立失败
    #[error("connection error: {0}")]
    Connection(String),

    /// 消息处理失败
    #[error("handler error: {0}")]
    Handler(String),
}
