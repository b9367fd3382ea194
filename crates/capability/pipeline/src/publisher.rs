use crate::error::PipelineError;
use async_trait::async_trait;
use domain::TimedValue;
use serde::{Deserialize, Serialize};

/// 单个序列的发布条目。`entry_id` 仅在一次调用内唯一，用于关联错误。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEntry {
    pub entry_id: String,
    pub series_key: String,
    pub values: Vec<TimedValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryError {
    pub error_code: String,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub entry_id: String,
    pub errors: Vec<EntryError>,
}

/// 下游对一次批量发布的响应，只携带失败的条目。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub error_entries: Vec<ErrorEntry>,
}

/// 下游批量发布抽象。
#[async_trait]
pub trait BatchPublisher: Send + Sync {
    async fn publish(&self, entries: Vec<PublishEntry>) -> Result<PublishResponse, PipelineError>;
}

/// 空发布器（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl BatchPublisher for NoopPublisher {
    async fn publish(&self, _entries: Vec<PublishEntry>) -> Result<PublishResponse, PipelineError> {
        Ok(PublishResponse::default())
    }
}
