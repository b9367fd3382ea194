pub mod data;
pub mod event;

pub use data::{Quality, TimedValue, Variant};
pub use event::{
    BackpressureEvent, BackpressureLevel, ChannelState, ChannelStateEvent, ChannelStatus,
    Notification, Notifier, NoopNotifier,
};

use serde::{Deserialize, Serialize};

/// 点位身份：所有模块共享的只读值。
///
/// 由发现/查询流程构造，之后只克隆不修改。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointIdentity {
    pub id: String,
    pub display_name: String,
    pub path: String,
}

impl PointIdentity {
    /// 构造点位身份。
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            path: path.into(),
        }
    }
}
