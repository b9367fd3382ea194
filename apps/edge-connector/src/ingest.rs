//! 通道消息入站：背压闸门 → 解码 → 发布队列。

use edge_pipeline::{BackpressureMonitor, PublishQueue, decode_channel_message};
use edge_streaming::{ChannelMessage, ChannelMessageHandler, StreamingError};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// 通道消息处理器。
pub struct IngestHandler {
    monitor: BackpressureMonitor,
    queue: PublishQueue,
    /// 背压期间丢弃的消息数
    dropped_messages: AtomicU64,
}

impl IngestHandler {
    pub fn new(monitor: BackpressureMonitor, queue: PublishQueue) -> Self {
        Self {
            monitor,
            queue,
            dropped_messages: AtomicU64::new(0),
        }
    }

    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl ChannelMessageHandler for IngestHandler {
    async fn handle(&self, message: ChannelMessage) -> Result<(), StreamingError> {
        if self.monitor.is_dropping() {
            let dropped = self.dropped_messages.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                target: "edge.ingest",
                channel_id = %message.channel_id,
                dropped_messages = dropped,
                "channel_message_dropped"
            );
            return Ok(());
        }
        let updates = decode_channel_message(&message.payload)
            .map_err(|err| StreamingError::Handler(err.to_string()))?;
        debug!(
            target: "edge.ingest",
            channel_id = %message.channel_id,
            series = updates.len(),
            "channel_message_decoded"
        );
        self.queue.enqueue_updates(updates);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::NoopNotifier;
    use edge_pipeline::{BackpressureConfig, NoopPublisher, PublishQueueConfig};
    use edge_telemetry::TelemetryMetrics;
    use std::sync::Arc;

    const PAYLOAD: &str = r#"{"Items":[{"Path":"\\\\pi\\flow","Items":[
        {"Timestamp":"2024-05-01T10:00:00Z","Value":1.0,"Good":true},
        {"Timestamp":"2024-05-01T10:00:01Z","Value":2.0,"Good":true}
    ]}]}"#;

    fn handler() -> (IngestHandler, BackpressureMonitor, PublishQueue) {
        let monitor =
            BackpressureMonitor::new(BackpressureConfig::default(), Arc::new(NoopNotifier))
                .expect("monitor");
        let queue = PublishQueue::new(
            PublishQueueConfig::default(),
            Arc::new(NoopPublisher),
            Arc::new(TelemetryMetrics::new()),
        )
        .expect("queue");
        (
            IngestHandler::new(monitor.clone(), queue.clone()),
            monitor,
            queue,
        )
    }

    fn message(payload: &str) -> ChannelMessage {
        ChannelMessage {
            channel_id: "channel-1".to_string(),
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn decoded_values_reach_queue() {
        let (handler, _, queue) = handler();
        handler.handle(message(PAYLOAD)).await.expect("handle");
        assert_eq!(queue.queued_series(), 1);
        assert_eq!(queue.queued_values(), 2);
    }

    #[tokio::test]
    async fn dropping_discards_before_queue() {
        let (handler, monitor, queue) = handler();
        monitor.observe(80.0);
        handler.handle(message(PAYLOAD)).await.expect("handle");
        handler.handle(message(PAYLOAD)).await.expect("handle");
        assert_eq!(queue.queued_values(), 0);
        assert_eq!(handler.dropped_messages(), 2);

        monitor.observe(10.0);
        handler.handle(message(PAYLOAD)).await.expect("handle");
        assert_eq!(queue.queued_values(), 2);
    }

    #[tokio::test]
    async fn undecodable_message_is_rejected() {
        let (handler, _, queue) = handler();
        let err = handler
            .handle(message(r#"{"Links":{}}"#))
            .await
            .expect_err("decode");
        assert!(matches!(err, StreamingError::Handler(_)));
        assert_eq!(queue.queued_series(), 0);
    }
}
