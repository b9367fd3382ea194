//! 推送通道管理：请求队列、通道池与 WebSocket 连接。
//!
//! 点位先进入 [`RequestQueue`]，由 [`ChannelPool::activate_pending`] 按批次分配到通道；
//! 每个通道持有一个 [`Connection`]，连接通过事件驱动通道状态迁移。

pub mod connection;
pub mod error;
pub mod pool;
pub mod request_queue;
pub mod websocket;

pub use connection::{
    ChannelMessage, ChannelMessageHandler, ConnectTarget, Connection, ConnectionEvent,
    ConnectionEventKind, ConnectionEventReceiver, ConnectionEventSender, Connector,
    NoopMessageHandler,
};
pub use error::StreamingError;
pub use pool::{
    ActivationReport, ChannelCounts, ChannelPool, ChannelPoolConfig, ChannelSnapshot,
    EVENT_BUFFER,
};
pub use request_queue::RequestQueue;
pub use websocket::{WsConnection, WsConnector, WsConnectorConfig};
