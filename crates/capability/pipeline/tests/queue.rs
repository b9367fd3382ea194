use async_trait::async_trait;
use domain::{Quality, TimedValue, Variant};
use edge_pipeline::{
    BatchPublisher, EntryError, ErrorEntry, PipelineError, PublishEntry, PublishQueue,
    PublishQueueConfig, PublishResponse, decode_channel_message,
};
use edge_telemetry::TelemetryMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const NOW: i64 = 1_714_557_600;

#[derive(Default)]
struct RecordingPublisher {
    calls: Mutex<Vec<Vec<PublishEntry>>>,
    reject_all: AtomicBool,
    fail: AtomicBool,
}

impl RecordingPublisher {
    fn calls(&self) -> Vec<Vec<PublishEntry>> {
        self.calls.lock().expect("calls").clone()
    }
}

#[async_trait]
impl BatchPublisher for RecordingPublisher {
    async fn publish(&self, entries: Vec<PublishEntry>) -> Result<PublishResponse, PipelineError> {
        self.calls.lock().expect("calls").push(entries.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::Publish("throttled".to_string()));
        }
        if self.reject_all.load(Ordering::SeqCst) {
            let error_entries = entries
                .iter()
                .map(|entry| ErrorEntry {
                    entry_id: entry.entry_id.clone(),
                    errors: vec![EntryError {
                        error_code: "InvalidRequestException".to_string(),
                        error_message: format!("unknown alias {}", entry.series_key),
                    }],
                })
                .collect();
            return Ok(PublishResponse { error_entries });
        }
        Ok(PublishResponse::default())
    }
}

fn config(series_batch_size: usize, value_batch_size: usize) -> PublishQueueConfig {
    PublishQueueConfig {
        max_publish_rate: 5000,
        series_batch_size,
        value_batch_size,
        max_age_seconds: 300,
    }
}

fn build_queue(
    config: PublishQueueConfig,
) -> (PublishQueue, Arc<RecordingPublisher>, Arc<TelemetryMetrics>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let metrics = Arc::new(TelemetryMetrics::new());
    let queue = PublishQueue::new(config, publisher.clone(), metrics.clone()).expect("queue");
    (queue, publisher, metrics)
}

fn value_at(epoch_seconds: i64, value: f64) -> TimedValue {
    TimedValue::new(epoch_seconds, 0, Variant::Double(value), Quality::Good)
}

fn values(count: usize) -> Vec<TimedValue> {
    (0..count).map(|i| value_at(NOW, i as f64)).collect()
}

#[test]
fn rejects_out_of_range_config() {
    let publisher = Arc::new(RecordingPublisher::default());
    let metrics = Arc::new(TelemetryMetrics::new());
    let bad = PublishQueueConfig {
        value_batch_size: 11,
        ..PublishQueueConfig::default()
    };
    assert!(PublishQueue::new(bad, publisher.clone(), metrics.clone()).is_err());

    let (queue, _, _) = build_queue(PublishQueueConfig::default());
    let bad = PublishQueueConfig {
        max_age_seconds: 10,
        ..PublishQueueConfig::default()
    };
    assert!(matches!(
        queue.update_config(bad),
        Err(PipelineError::Config(_))
    ));
    assert_eq!(queue.config(), PublishQueueConfig::default());
}

#[tokio::test]
async fn partial_batches_merge_into_one_flush() {
    let (queue, publisher, metrics) = build_queue(config(10, 3));
    let v1 = value_at(NOW, 1.0);
    let v2 = value_at(NOW, 2.0);
    let v3 = value_at(NOW, 3.0);
    queue.enqueue("A", vec![v1.clone(), v2.clone()]);

    // 未达到批量且未超龄：不调用下游
    let report = queue.flush_at(NOW).await;
    assert_eq!(report.calls, 0);
    assert!(publisher.calls().is_empty());

    queue.enqueue("A", vec![v3.clone()]);
    let report = queue.flush_at(NOW).await;
    assert_eq!((report.calls, report.series, report.values), (1, 1, 3));
    let calls = publisher.calls();
    assert_eq!(calls[0][0].series_key, "A");
    assert_eq!(calls[0][0].values, vec![v1, v2, v3]);
    assert_eq!(queue.queued_series(), 0);
    assert_eq!(queue.queued_values(), 0);

    let snapshot = metrics.take_snapshot();
    assert_eq!(snapshot.received_values, 3);
    assert_eq!(snapshot.flushes, 1);
    assert_eq!(snapshot.values_flushed, 3);
}

#[tokio::test]
async fn size_ready_series_fill_series_batch() {
    let (queue, publisher, _) = build_queue(config(2, 2));
    queue.enqueue("A", values(2));
    queue.enqueue("B", values(1));
    queue.enqueue("C", values(12));
    queue.enqueue("D", values(2));

    let report = queue.flush_at(NOW).await;
    assert_eq!(report.calls, 1);
    let keys: Vec<String> = publisher.calls()[0]
        .iter()
        .map(|entry| entry.series_key.clone())
        .collect();
    assert_eq!(keys, vec!["A".to_string(), "C".to_string()]);

    // C 剩余值排到队尾，D 先于 C
    let report = queue.flush_at(NOW).await;
    assert_eq!(report.series, 2);
    let keys: Vec<String> = publisher.calls()[1]
        .iter()
        .map(|entry| entry.series_key.clone())
        .collect();
    assert_eq!(keys, vec!["D".to_string(), "C".to_string()]);
    assert_eq!(queue.queued_series(), 1);
    assert_eq!(queue.queued_values(), 1);
}

#[tokio::test]
async fn entries_yield_at_most_ten_values() {
    let (queue, publisher, _) = build_queue(config(10, 1));
    queue.enqueue("A", values(25));

    queue.flush_at(NOW).await;
    queue.flush_at(NOW).await;
    queue.flush_at(NOW).await;
    let sizes: Vec<usize> = publisher
        .calls()
        .iter()
        .map(|call| call[0].values.len())
        .collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    // 同一序列保持先进先出
    let first: Vec<f64> = publisher.calls()[0][0]
        .values
        .iter()
        .map(|value| match value.value {
            Variant::Double(v) => v,
            _ => f64::NAN,
        })
        .collect();
    assert_eq!(first, (0..10).map(|i| i as f64).collect::<Vec<_>>());
}

#[tokio::test]
async fn aged_series_flush_despite_full_batch() {
    let (queue, publisher, _) = build_queue(config(1, 10));
    queue.enqueue("busy-1", values(10));
    queue.enqueue("busy-2", values(10));
    queue.enqueue("stale-1", vec![value_at(NOW - 300, 1.0)]);
    queue.enqueue("stale-2", vec![value_at(NOW - 400, 2.0)]);
    queue.enqueue("fresh", vec![value_at(NOW - 10, 3.0)]);

    let report = queue.flush_at(NOW).await;
    let published: Vec<String> = publisher
        .calls()
        .iter()
        .flat_map(|call| call.iter().map(|entry| entry.series_key.clone()))
        .collect();
    assert!(published.contains(&"stale-1".to_string()));
    assert!(published.contains(&"stale-2".to_string()));
    assert!(!published.contains(&"fresh".to_string()));
    // 超龄序列超过批量名额时拆成多次调用
    assert_eq!(report.calls, 2);
    assert!(publisher.calls().iter().all(|call| call.len() <= 1));

    // 下一轮恢复按批量发布
    let report = queue.flush_at(NOW).await;
    assert_eq!(report.series, 1);
    assert_eq!(queue.queued_series(), 2);
}

#[tokio::test]
async fn entry_ids_are_unique_within_call() {
    let (queue, publisher, _) = build_queue(config(10, 1));
    for key in ["A", "B", "C"] {
        queue.enqueue(key, values(1));
    }
    queue.flush_at(NOW).await;
    let calls = publisher.calls();
    let call = &calls[0];
    let mut ids: Vec<&str> = call.iter().map(|entry| entry.entry_id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn publish_errors_are_counted_not_retried() {
    let (queue, publisher, metrics) = build_queue(config(10, 1));
    publisher.reject_all.store(true, Ordering::SeqCst);
    queue.enqueue("A", values(1));
    queue.enqueue("B", values(1));
    let report = queue.flush_at(NOW).await;
    assert_eq!(report.failed_entries, 2);
    assert_eq!(queue.queued_series(), 0);

    publisher.reject_all.store(false, Ordering::SeqCst);
    publisher.fail.store(true, Ordering::SeqCst);
    queue.enqueue("C", values(1));
    let report = queue.flush_at(NOW).await;
    assert_eq!(report.failed_entries, 1);
    assert_eq!(queue.queued_series(), 0);

    let snapshot = metrics.take_snapshot();
    // 整体失败的调用不计入发布计数
    assert_eq!(snapshot.flushes, 1);
    assert_eq!(snapshot.series_flushed, 2);
    assert_eq!(snapshot.values_flushed, 2);
    assert_eq!(snapshot.publish_error_count, 3);
    assert!(snapshot.publish_errors.contains_key("InvalidRequestException"));
    assert_eq!(
        snapshot.publish_errors.get("PublishFailed").map(String::as_str),
        Some("publish error: throttled")
    );
}

#[tokio::test]
async fn drain_percentage_removes_oldest_series() {
    let (queue, publisher, _) = build_queue(config(10, 1));
    for key in ["A", "B", "C", "D"] {
        queue.enqueue(key, values(1));
    }
    assert_eq!(queue.drain_percentage(0).expect("drain"), 0);
    assert_eq!(queue.queued_series(), 4);
    assert_eq!(queue.drain_percentage(50).expect("drain"), 2);
    assert_eq!(queue.queued_series(), 2);
    assert!(queue.drain_percentage(101).is_err());

    queue.flush_at(NOW).await;
    let keys: Vec<String> = publisher.calls()[0]
        .iter()
        .map(|entry| entry.series_key.clone())
        .collect();
    assert_eq!(keys, vec!["C".to_string(), "D".to_string()]);

    for key in ["E", "F", "G"] {
        queue.enqueue(key, values(3));
    }
    assert_eq!(queue.drain_percentage(100).expect("drain"), 3);
    assert_eq!(queue.queued_series(), 0);
    assert_eq!(queue.queued_values(), 0);
}

#[tokio::test]
async fn replace_publisher_clears_queue() {
    let (queue, old, _) = build_queue(config(10, 1));
    queue.enqueue("A", values(1));
    let replacement = Arc::new(RecordingPublisher::default());
    assert_eq!(queue.replace_publisher(replacement.clone()), 1);

    queue.enqueue("B", values(1));
    queue.flush_at(NOW).await;
    assert!(old.calls().is_empty());
    assert_eq!(replacement.calls()[0][0].series_key, "B");
}

#[tokio::test]
async fn decoded_messages_feed_the_queue() {
    let (queue, publisher, _) = build_queue(config(10, 2));
    let payload = r#"{"Items":[
        {"Path":"\\\\pi\\flow","Items":[
            {"Timestamp":"2024-05-01T10:00:00Z","Value":1.0,"Good":true},
            {"Timestamp":"2024-05-01T10:00:01Z","Value":2.0,"Good":true}
        ]},
        {"Path":"\\\\pi\\temp","Items":[]}
    ]}"#;
    let updates = decode_channel_message(payload).expect("decode");
    queue.enqueue_updates(updates);
    assert_eq!(queue.queued_series(), 1);

    queue.flush_at(NOW + 1).await;
    let calls = publisher.calls();
    let call = &calls[0];
    assert_eq!(call[0].series_key, r"\\pi\flow");
    assert_eq!(call[0].values.len(), 2);
}
