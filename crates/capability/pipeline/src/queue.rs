//! 发布队列：按序列累积点位值，按批量/时效两种条件定时发布。

use crate::codec::SeriesUpdate;
use crate::error::PipelineError;
use crate::publisher::{BatchPublisher, PublishEntry};
use domain::TimedValue;
use edge_telemetry::TelemetryMetrics;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 下游单次调用中每个序列的值数量上限。
pub const MAX_VALUES_PER_ENTRY: usize = 10;

/// 整体调用失败时记录的错误码。
pub const PUBLISH_FAILED_CODE: &str = "PublishFailed";

/// 发布队列参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishQueueConfig {
    /// 每秒最多发布的值数量
    pub max_publish_rate: u64,
    pub series_batch_size: usize,
    pub value_batch_size: usize,
    pub max_age_seconds: u64,
}

impl Default for PublishQueueConfig {
    fn default() -> Self {
        Self {
            max_publish_rate: 5000,
            series_batch_size: 10,
            value_batch_size: 10,
            max_age_seconds: 300,
        }
    }
}

impl PublishQueueConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(1000..=100_000).contains(&self.max_publish_rate) {
            return Err(PipelineError::Config(format!(
                "max_publish_rate {} (expected 1000 - 100000)",
                self.max_publish_rate
            )));
        }
        if !(1..=10).contains(&self.series_batch_size) {
            return Err(PipelineError::Config(format!(
                "series_batch_size {} (expected 1 - 10)",
                self.series_batch_size
            )));
        }
        if !(1..=10).contains(&self.value_batch_size) {
            return Err(PipelineError::Config(format!(
                "value_batch_size {} (expected 1 - 10)",
                self.value_batch_size
            )));
        }
        if !(30..=3600).contains(&self.max_age_seconds) {
            return Err(PipelineError::Config(format!(
                "max_age_seconds {} (expected 30 - 3600)",
                self.max_age_seconds
            )));
        }
        Ok(())
    }

    /// 定时发布间隔：`1000ms / (max_rate / (series_batch * value_batch))`。
    pub fn flush_interval(&self) -> Duration {
        let per_call = (self.series_batch_size * self.value_batch_size) as u64;
        let micros = per_call * 1_000_000 / self.max_publish_rate.max(1);
        Duration::from_micros(micros).max(Duration::from_millis(1))
    }
}

/// 一次定时发布的结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub calls: usize,
    pub series: usize,
    pub values: usize,
    pub failed_entries: usize,
}

struct SeriesEntry {
    values: VecDeque<TimedValue>,
    token: u64,
}

/// 序列表 + 注册顺序。重新排队时旧顺序项作废（token 不匹配），定期压缩。
struct QueueState {
    config: PublishQueueConfig,
    entries: HashMap<String, SeriesEntry>,
    order: VecDeque<(String, u64)>,
    counter: u64,
    queued_values: usize,
}

impl QueueState {
    fn new(config: PublishQueueConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            order: VecDeque::new(),
            counter: 0,
            queued_values: 0,
        }
    }

    fn next_token(&mut self) -> u64 {
        self.counter = self.counter.saturating_add(1);
        self.counter
    }

    fn is_current(&self, key: &str, token: u64) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.token == token)
    }

    fn enqueue(&mut self, series_key: String, values: Vec<TimedValue>) {
        self.queued_values += values.len();
        if let Some(entry) = self.entries.get_mut(&series_key) {
            entry.values.extend(values);
            return;
        }
        let token = self.next_token();
        self.order.push_back((series_key.clone(), token));
        self.entries.insert(
            series_key,
            SeriesEntry {
                values: values.into(),
                token,
            },
        );
    }

    /// 选出本轮要发布的序列。
    ///
    /// 头部值已超龄的序列全部入选；其余达到 `value_batch_size` 的序列按顺序
    /// 填满剩余的 `series_batch_size` 名额。
    fn select_due(&self, now_secs: i64) -> Vec<String> {
        let aged_before = now_secs.saturating_sub(self.config.max_age_seconds as i64);
        let mut candidates: Vec<(&String, bool)> = Vec::new();
        let mut aged_count = 0;
        let mut ready_count = 0;
        for (key, token) in &self.order {
            let Some(entry) = self.entries.get(key) else {
                continue;
            };
            if entry.token != *token {
                continue;
            }
            let Some(head) = entry.values.front() else {
                continue;
            };
            if head.epoch_seconds <= aged_before {
                aged_count += 1;
                candidates.push((key, true));
            } else if entry.values.len() >= self.config.value_batch_size
                && ready_count < self.config.series_batch_size
            {
                ready_count += 1;
                candidates.push((key, false));
            }
        }
        let mut ready_slots = self.config.series_batch_size.saturating_sub(aged_count);
        candidates
            .into_iter()
            .filter(|(_, aged)| {
                if *aged {
                    return true;
                }
                if ready_slots == 0 {
                    return false;
                }
                ready_slots -= 1;
                true
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn take_due(&mut self, now_secs: i64) -> Vec<(String, Vec<TimedValue>)> {
        let selected = self.select_due(now_secs);
        let mut taken = Vec::with_capacity(selected.len());
        for key in selected {
            let requeue_token = self.next_token();
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            let count = entry.values.len().min(MAX_VALUES_PER_ENTRY);
            let values: Vec<TimedValue> = entry.values.drain(..count).collect();
            let exhausted = entry.values.is_empty();
            if !exhausted {
                entry.token = requeue_token;
            }
            self.queued_values = self.queued_values.saturating_sub(values.len());
            if exhausted {
                self.entries.remove(&key);
            } else {
                self.order.push_back((key.clone(), requeue_token));
            }
            taken.push((key, values));
        }
        self.compact();
        taken
    }

    /// 按注册顺序删除最早的 `count` 个序列。
    fn drain_oldest(&mut self, count: usize) -> usize {
        let mut removed = 0;
        while removed < count {
            let Some((key, token)) = self.order.pop_front() else {
                break;
            };
            if !self.is_current(&key, token) {
                continue;
            }
            if let Some(entry) = self.entries.remove(&key) {
                self.queued_values = self.queued_values.saturating_sub(entry.values.len());
                removed += 1;
            }
        }
        removed
    }

    fn clear(&mut self) -> usize {
        let series = self.entries.len();
        self.entries.clear();
        self.order.clear();
        self.queued_values = 0;
        series
    }

    fn compact(&mut self) {
        if self.order.len() <= self.entries.len() * 2 + 64 {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(key, token)| entries.get(key).is_some_and(|entry| entry.token == *token));
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    publisher: RwLock<Arc<dyn BatchPublisher>>,
    metrics: Arc<TelemetryMetrics>,
}

/// 发布队列入口。
#[derive(Clone)]
pub struct PublishQueue {
    inner: Arc<QueueInner>,
}

impl PublishQueue {
    pub fn new(
        config: PublishQueueConfig,
        publisher: Arc<dyn BatchPublisher>,
        metrics: Arc<TelemetryMetrics>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let inner = QueueInner {
            state: Mutex::new(QueueState::new(config)),
            publisher: RwLock::new(publisher),
            metrics,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> PublishQueueConfig {
        self.state().config
    }

    pub fn flush_interval(&self) -> Duration {
        self.config().flush_interval()
    }

    /// 追加序列值（不阻塞、不丢弃）。
    pub fn enqueue(&self, series_key: impl Into<String>, values: Vec<TimedValue>) {
        if values.is_empty() {
            return;
        }
        let count = values.len();
        self.state().enqueue(series_key.into(), values);
        self.inner.metrics.record_received(count);
    }

    pub fn enqueue_updates(&self, updates: Vec<SeriesUpdate>) {
        let mut received = 0;
        {
            let mut state = self.state();
            for update in updates {
                if update.values.is_empty() {
                    continue;
                }
                received += update.values.len();
                state.enqueue(update.series_key, update.values);
            }
        }
        self.inner.metrics.record_received(received);
    }

    /// 取出 `now_secs` 时刻应发布的条目（每个条目带调用内唯一的 entry id）。
    pub fn take_due(&self, now_secs: i64) -> Vec<PublishEntry> {
        self.state()
            .take_due(now_secs)
            .into_iter()
            .map(|(series_key, values)| PublishEntry {
                entry_id: uuid::Uuid::new_v4().simple().to_string(),
                series_key,
                values,
            })
            .collect()
    }

    /// 定时器触发的一次发布。
    pub async fn flush_tick(&self) -> FlushReport {
        self.flush_at(now_epoch_secs()).await
    }

    /// 以给定时间执行一次发布。无入选序列时不调用下游。
    pub async fn flush_at(&self, now_secs: i64) -> FlushReport {
        let entries = self.take_due(now_secs);
        let mut report = FlushReport::default();
        if entries.is_empty() {
            return report;
        }
        let series_batch = self.config().series_batch_size.max(1);
        let publisher = self
            .inner
            .publisher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut pending = entries.into_iter().peekable();
        while pending.peek().is_some() {
            let batch: Vec<PublishEntry> = pending.by_ref().take(series_batch).collect();
            let series = batch.len();
            let values: usize = batch.iter().map(|entry| entry.values.len()).sum();
            report.calls += 1;
            report.series += series;
            report.values += values;

            match publisher.publish(batch).await {
                Ok(response) => {
                    // 只统计下游已接收的调用
                    self.inner.metrics.record_flush(series, values);
                    for entry in &response.error_entries {
                        report.failed_entries += 1;
                        for error in &entry.errors {
                            self.inner
                                .metrics
                                .record_publish_error(&error.error_code, &error.error_message);
                        }
                    }
                    if !response.error_entries.is_empty() {
                        debug!(
                            target: "edge.pipeline",
                            failed_entries = response.error_entries.len(),
                            "publish_entries_rejected"
                        );
                    }
                }
                Err(err) => {
                    report.failed_entries += series;
                    self.inner
                        .metrics
                        .record_publish_error(PUBLISH_FAILED_CODE, &err.to_string());
                    warn!(
                        target: "edge.pipeline",
                        series = series,
                        values = values,
                        error = %err,
                        "publish_call_failed"
                    );
                }
            }
        }
        report
    }

    /// 按注册顺序清除 `pct`% 的序列，返回清除数量。
    pub fn drain_percentage(&self, pct: u32) -> Result<usize, PipelineError> {
        if pct > 100 {
            return Err(PipelineError::Config(format!(
                "drain percentage {} (expected 0 - 100)",
                pct
            )));
        }
        let (removed, total) = {
            let mut state = self.state();
            let total = state.entries.len();
            let removed = if pct == 100 {
                state.clear()
            } else {
                let count = (total as f64 * f64::from(pct) / 100.0).round() as usize;
                state.drain_oldest(count)
            };
            (removed, total)
        };
        if removed > 0 {
            warn!(
                target: "edge.pipeline",
                pct = pct,
                removed = removed,
                total = total,
                "publish_queue_drained"
            );
        }
        Ok(removed)
    }

    /// 热更新发布参数（下一次定时间隔生效）。
    pub fn update_config(&self, config: PublishQueueConfig) -> Result<(), PipelineError> {
        config.validate()?;
        self.state().config = config;
        info!(
            target: "edge.pipeline",
            max_publish_rate = config.max_publish_rate,
            series_batch_size = config.series_batch_size,
            value_batch_size = config.value_batch_size,
            max_age_seconds = config.max_age_seconds,
            "publish_queue_config_updated"
        );
        Ok(())
    }

    /// 下游身份变化：清空队列并替换发布器，返回清除的序列数。
    pub fn replace_publisher(&self, publisher: Arc<dyn BatchPublisher>) -> usize {
        let cleared = self.state().clear();
        *self
            .inner
            .publisher
            .write()
            .unwrap_or_else(PoisonError::into_inner) = publisher;
        info!(target: "edge.pipeline", cleared_series = cleared, "publisher_replaced");
        cleared
    }

    pub fn queued_series(&self) -> usize {
        self.state().entries.len()
    }

    pub fn queued_values(&self) -> usize {
        self.state().queued_values
    }

    /// 启动定时发布任务。每轮重新读取间隔，热更新即时生效。
    pub fn spawn_flush_timer(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(queue.flush_interval()).await;
                queue.flush_tick().await;
            }
        })
    }
}

fn now_epoch_secs() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_secs() as i64
}
