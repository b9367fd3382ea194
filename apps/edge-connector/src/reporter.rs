//! 周期遥测上报。

use edge_pipeline::{BackpressureMonitor, PublishQueue};
use edge_telemetry::{TelemetryMetrics, TelemetryReport};
use edge_uplink::MqttUplink;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 读取并清零计数，生成一份报告。
pub fn build_report(
    metrics: &TelemetryMetrics,
    queue: &PublishQueue,
    monitor: &BackpressureMonitor,
    interval_seconds: u64,
) -> TelemetryReport {
    TelemetryReport::from_snapshot(
        metrics.take_snapshot(),
        interval_seconds,
        queue.queued_series(),
        monitor.last_utilization(),
    )
}

pub fn spawn_telemetry_reporter(
    interval_seconds: u64,
    metrics: Arc<TelemetryMetrics>,
    queue: PublishQueue,
    monitor: BackpressureMonitor,
    uplink: Arc<MqttUplink>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(interval_seconds)).await;
            let report = build_report(&metrics, &queue, &monitor, interval_seconds);
            info!(
                target: "edge.telemetry",
                received_values_per_sec = report.received_values_per_sec,
                publishes_per_sec = report.publishes_per_sec,
                series_per_sec = report.series_per_sec,
                values_per_sec = report.values_per_sec,
                values_per_series = report.values_per_series,
                publish_error_count = report.publish_error_count,
                queued_series = report.queued_series,
                memory_percent = ?report.memory_percent,
                "telemetry_report"
            );
            if let Err(err) = uplink.publish_telemetry(&report).await {
                warn!(target: "edge.telemetry", error = %err, "telemetry_publish_failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{NoopNotifier, Quality, TimedValue, Variant};
    use edge_pipeline::{BackpressureConfig, NoopPublisher, PublishQueueConfig};

    #[test]
    fn report_reflects_queue_and_memory() {
        let metrics = Arc::new(TelemetryMetrics::new());
        let queue = PublishQueue::new(
            PublishQueueConfig::default(),
            Arc::new(NoopPublisher),
            metrics.clone(),
        )
        .expect("queue");
        let monitor = BackpressureMonitor::new(BackpressureConfig::default(), Arc::new(NoopNotifier))
            .expect("monitor");
        queue.enqueue(
            "A",
            vec![TimedValue::new(1, 0, Variant::Bool(true), Quality::Good); 20],
        );
        monitor.observe(12.5);

        let report = build_report(&metrics, &queue, &monitor, 10);
        assert_eq!(report.received_values_per_sec, 2.0);
        assert_eq!(report.queued_series, 1);
        assert_eq!(report.memory_percent, Some(12.5));

        // 计数已清零
        let report = build_report(&metrics, &queue, &monitor, 10);
        assert_eq!(report.received_values_per_sec, 0.0);
    }
}
