//! 发布链路：通道消息解码、按序列批量发布与内存背压。

pub mod backpressure;
pub mod codec;
pub mod error;
pub mod publisher;
pub mod queue;

pub use backpressure::{BackpressureConfig, BackpressureMonitor, MemorySampler, SysinfoSampler};
pub use codec::{SeriesUpdate, decode_channel_message};
pub use error::PipelineError;
pub use publisher::{
    BatchPublisher, EntryError, ErrorEntry, NoopPublisher, PublishEntry, PublishResponse,
};
pub use queue::{
    FlushReport, MAX_VALUES_PER_ENTRY, PUBLISH_FAILED_CODE, PublishQueue, PublishQueueConfig,
};
