//! 日志初始化与发布遥测计数。

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing_subscriber::{EnvFilter, fmt};

/// 遥测计数快照（读取即清零）。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub received_values: u64,
    pub flushes: u64,
    pub series_flushed: u64,
    pub values_flushed: u64,
    pub publish_error_count: u64,
    /// 错误码 -> 最近一次错误信息。
    pub publish_errors: HashMap<String, String>,
}

/// 发布链路计数器。
#[derive(Default)]
pub struct TelemetryMetrics {
    received_values: AtomicU64,
    flushes: AtomicU64,
    series_flushed: AtomicU64,
    values_flushed: AtomicU64,
    publish_error_count: AtomicU64,
    publish_errors: Mutex<HashMap<String, String>>,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录收到的点位值数量。
    pub fn record_received(&self, count: usize) {
        self.received_values
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// 记录一次下游发布调用。
    pub fn record_flush(&self, series: usize, values: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.series_flushed
            .fetch_add(series as u64, Ordering::Relaxed);
        self.values_flushed
            .fetch_add(values as u64, Ordering::Relaxed);
    }

    /// 记录下游返回的错误（按错误码覆盖信息）。
    pub fn record_publish_error(&self, code: &str, message: &str) {
        self.publish_error_count.fetch_add(1, Ordering::Relaxed);
        let mut errors = self
            .publish_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        errors.insert(code.to_string(), message.to_string());
    }

    /// 读取并清零全部计数。
    pub fn take_snapshot(&self) -> TelemetrySnapshot {
        let publish_errors = {
            let mut errors = self
                .publish_errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *errors)
        };
        TelemetrySnapshot {
            received_values: self.received_values.swap(0, Ordering::Relaxed),
            flushes: self.flushes.swap(0, Ordering::Relaxed),
            series_flushed: self.series_flushed.swap(0, Ordering::Relaxed),
            values_flushed: self.values_flushed.swap(0, Ordering::Relaxed),
            publish_error_count: self.publish_error_count.swap(0, Ordering::Relaxed),
            publish_errors,
        }
    }
}

static METRICS: OnceLock<Arc<TelemetryMetrics>> = OnceLock::new();

/// 获取进程级共享计数器。
pub fn shared_metrics() -> Arc<TelemetryMetrics> {
    METRICS
        .get_or_init(|| Arc::new(TelemetryMetrics::new()))
        .clone()
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 周期遥测报告（速率按上报间隔折算为每秒）。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReport {
    pub timestamp_ms: i64,
    pub interval_seconds: u64,
    pub received_values_per_sec: f64,
    pub publishes_per_sec: f64,
    pub series_per_sec: f64,
    pub values_per_sec: f64,
    pub values_per_series: f64,
    pub publish_error_count: u64,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub publish_errors: HashMap<String, String>,
    pub queued_series: usize,
    pub memory_percent: Option<f64>,
}

impl TelemetryReport {
    pub fn from_snapshot(
        snapshot: TelemetrySnapshot,
        interval_seconds: u64,
        queued_series: usize,
        memory_percent: Option<f64>,
    ) -> Self {
        let interval = interval_seconds.max(1) as f64;
        let values_per_series = if snapshot.series_flushed == 0 {
            0.0
        } else {
            snapshot.values_flushed as f64 / snapshot.series_flushed as f64
        };
        Self {
            timestamp_ms: now_epoch_ms(),
            interval_seconds,
            received_values_per_sec: snapshot.received_values as f64 / interval,
            publishes_per_sec: snapshot.flushes as f64 / interval,
            series_per_sec: snapshot.series_flushed as f64 / interval,
            values_per_sec: snapshot.values_flushed as f64 / interval,
            values_per_series,
            publish_error_count: snapshot.publish_error_count,
            publish_errors: snapshot.publish_errors,
            queued_series,
            memory_percent,
        }
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
