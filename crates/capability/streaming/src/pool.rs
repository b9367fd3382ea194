//! 通道池：有界数量的推送连接，每个连接承载一批点位。
//!
//! 状态迁移全部由连接事件驱动，通道池从不轮询连接状态。

use crate::connection::{
    ChannelMessage, ChannelMessageHandler, ConnectTarget, Connection, ConnectionEvent,
    ConnectionEventKind, ConnectionEventReceiver, ConnectionEventSender, Connector,
};
use crate::error::StreamingError;
use crate::request_queue::RequestQueue;
use domain::{ChannelState, ChannelStateEvent, ChannelStatus, Notification, Notifier, PointIdentity};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 连接事件通道容量。
pub const EVENT_BUFFER: usize = 4096;

/// 通道池限制参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPoolConfig {
    pub max_channels: usize,
    pub max_points_per_channel: usize,
}

impl Default for ChannelPoolConfig {
    fn default() -> Self {
        Self {
            max_channels: 5000,
            max_points_per_channel: 100,
        }
    }
}

impl ChannelPoolConfig {
    pub fn validate(&self) -> Result<(), StreamingError> {
        if !(1..=10_000).contains(&self.max_channels) {
            return Err(StreamingError::Config(format!(
                "max_channels {} (expected 1 - 10000)",
                self.max_channels
            )));
        }
        if !(1..=100).contains(&self.max_points_per_channel) {
            return Err(StreamingError::Config(format!(
                "max_points_per_channel {} (expected 1 - 100)",
                self.max_points_per_channel
            )));
        }
        Ok(())
    }
}

/// 通道只读视图。
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub channel_id: String,
    pub state: ChannelState,
    pub points: Vec<PointIdentity>,
    pub manually_closed: bool,
}

impl ChannelSnapshot {
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

/// 一次激活的结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub channels: usize,
    pub points: usize,
}

/// 受影响的通道/点位数量。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelCounts {
    pub channels: usize,
    pub points: usize,
}

impl ChannelCounts {
    fn add(&mut self, points: usize) {
        self.channels += 1;
        self.points += points;
    }
}

/// 通道记录：稳定的通道身份 + 可缺省的连接句柄。
struct ChannelRecord {
    channel_id: String,
    seq: u64,
    state: ChannelState,
    points: Vec<PointIdentity>,
    manually_closed: bool,
    generation: u64,
    connection: Option<Box<dyn Connection>>,
}

impl ChannelRecord {
    fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            channel_id: self.channel_id.clone(),
            state: self.state,
            points: self.points.clone(),
            manually_closed: self.manually_closed,
        }
    }

    fn matches_path(&self, pattern: &Regex) -> bool {
        self.points.iter().any(|point| pattern.is_match(&point.path))
    }

    /// 标记手动关闭并通知连接；已关闭或关闭中时只补标记。
    fn request_close(&mut self) -> usize {
        let settling = matches!(self.state, ChannelState::Closing | ChannelState::Closed);
        let signalled = self.manually_closed;
        self.manually_closed = true;
        if !settling && !signalled {
            if let Some(connection) = &self.connection {
                connection.close();
            }
        }
        self.points.len()
    }

    fn accepts_messages(&self, generation: u64) -> bool {
        self.generation == generation && self.state == ChannelState::Open && !self.manually_closed
    }
}

struct PoolState {
    config: ChannelPoolConfig,
    queue: RequestQueue,
    channels: HashMap<String, ChannelRecord>,
    /// point id -> channel id
    assignments: HashMap<String, String>,
    next_seq: u64,
    next_generation: u64,
}

impl PoolState {
    fn new(config: ChannelPoolConfig) -> Self {
        Self {
            config,
            queue: RequestQueue::new(),
            channels: HashMap::new(),
            assignments: HashMap::new(),
            next_seq: 0,
            next_generation: 0,
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn new_channel_id(&self) -> String {
        loop {
            let channel_id = format!("channel-{}", uuid::Uuid::new_v4().simple());
            if !self.channels.contains_key(&channel_id) {
                return channel_id;
            }
        }
    }

    fn insert_channel(&mut self, points: Vec<PointIdentity>) -> (String, u64) {
        let channel_id = self.new_channel_id();
        let generation = self.next_generation();
        self.next_seq += 1;
        for point in &points {
            self.assignments
                .insert(point.id.clone(), channel_id.clone());
        }
        self.channels.insert(
            channel_id.clone(),
            ChannelRecord {
                channel_id: channel_id.clone(),
                seq: self.next_seq,
                state: ChannelState::Connecting,
                points,
                manually_closed: false,
                generation,
                connection: None,
            },
        );
        (channel_id, generation)
    }

    /// 删除通道记录并释放其点位（不重新入队）。
    fn remove_channel(&mut self, channel_id: &str) -> Option<ChannelRecord> {
        let record = self.channels.remove(channel_id)?;
        for point in &record.points {
            if self.assignments.get(&point.id).map(String::as_str) == Some(channel_id) {
                self.assignments.remove(&point.id);
            }
        }
        Some(record)
    }

    fn sorted_ids<F>(&self, filter: F) -> Vec<String>
    where
        F: Fn(&ChannelRecord) -> bool,
    {
        let mut matched: Vec<&ChannelRecord> =
            self.channels.values().filter(|record| filter(record)).collect();
        matched.sort_by_key(|record| record.seq);
        matched
            .into_iter()
            .map(|record| record.channel_id.clone())
            .collect()
    }

    fn snapshots<F>(&self, filter: F) -> Vec<ChannelSnapshot>
    where
        F: Fn(&ChannelRecord) -> bool,
    {
        let mut matched: Vec<&ChannelRecord> =
            self.channels.values().filter(|record| filter(record)).collect();
        matched.sort_by_key(|record| record.seq);
        matched.into_iter().map(ChannelRecord::snapshot).collect()
    }
}

struct PoolInner {
    state: Mutex<PoolState>,
    connector: RwLock<Arc<dyn Connector>>,
    notifier: Arc<dyn Notifier>,
    events: ConnectionEventSender,
    activation: tokio::sync::Mutex<()>,
}

/// 通道池入口。
#[derive(Clone)]
pub struct ChannelPool {
    inner: Arc<PoolInner>,
}

impl ChannelPool {
    /// 创建通道池，返回连接事件接收端（交给 [`ChannelPool::spawn_event_loop`]）。
    pub fn new(
        config: ChannelPoolConfig,
        connector: Arc<dyn Connector>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<(Self, ConnectionEventReceiver), StreamingError> {
        config.validate()?;
        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let inner = PoolInner {
            state: Mutex::new(PoolState::new(config)),
            connector: RwLock::new(connector),
            notifier,
            events,
            activation: tokio::sync::Mutex::new(()),
        };
        Ok((
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        ))
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn connector(&self) -> Arc<dyn Connector> {
        self.inner
            .connector
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn notify_state(&self, channel_id: &str, status: ChannelStatus, detail: Option<String>) {
        self.inner
            .notifier
            .notify(Notification::ChannelState(ChannelStateEvent::new(
                channel_id, status, detail,
            )));
    }

    pub fn config(&self) -> ChannelPoolConfig {
        self.state().config
    }

    /// 热更新限制参数。已有通道不受新的单通道点位上限影响。
    pub fn update_limits(&self, config: ChannelPoolConfig) -> Result<(), StreamingError> {
        config.validate()?;
        self.state().config = config;
        info!(
            target: "edge.streaming",
            max_channels = config.max_channels,
            max_points_per_channel = config.max_points_per_channel,
            "channel_pool_limits_updated"
        );
        Ok(())
    }

    /// 连接身份变化：清空请求队列、删除全部通道并替换连接工厂。
    pub fn replace_connector(&self, connector: Arc<dyn Connector>) -> ChannelCounts {
        let cleared = self.clear_queue();
        let deleted = self.delete_all();
        *self
            .inner
            .connector
            .write()
            .unwrap_or_else(PoisonError::into_inner) = connector;
        info!(
            target: "edge.streaming",
            cleared_points = cleared,
            deleted_channels = deleted.channels,
            deleted_points = deleted.points,
            "channel_pool_connector_replaced"
        );
        deleted
    }

    // ---- 请求队列 ----

    /// 点位入队。已在推流或已排队时为空操作，返回 false。
    pub fn enqueue(&self, point: PointIdentity) -> Result<bool, StreamingError> {
        validate_point(&point)?;
        let mut state = self.state();
        if state.assignments.contains_key(&point.id) {
            return Ok(false);
        }
        Ok(state.queue.push(point))
    }

    /// 批量入队，任一点位非法时整体拒绝。返回新入队数量。
    pub fn enqueue_all(&self, points: Vec<PointIdentity>) -> Result<usize, StreamingError> {
        for point in &points {
            validate_point(point)?;
        }
        let mut state = self.state();
        let mut queued = 0;
        for point in points {
            if state.assignments.contains_key(&point.id) {
                continue;
            }
            if state.queue.push(point) {
                queued += 1;
            }
        }
        Ok(queued)
    }

    pub fn clear_queue(&self) -> usize {
        self.state().queue.clear()
    }

    pub fn queued_points(&self) -> Vec<PointIdentity> {
        self.state().queue.snapshot()
    }

    pub fn queued_count(&self) -> usize {
        self.state().queue.len()
    }

    // ---- 激活 ----

    /// 按批次把请求队列中的点位分配到新通道。
    ///
    /// 达到通道上限时剩余点位留在队列中并返回 [`StreamingError::ChannelLimit`]。
    /// 建连失败的批次直接丢弃并发出 `failed-deleted` 通知，不重新入队。
    pub async fn activate_pending(&self) -> Result<ActivationReport, StreamingError> {
        let _activation = self.inner.activation.lock().await;
        let mut report = ActivationReport::default();
        loop {
            let (channel_id, generation, points) = {
                let mut state = self.state();
                if state.queue.is_empty() {
                    break;
                }
                if state.channels.len() >= state.config.max_channels {
                    let err = StreamingError::ChannelLimit {
                        max_channels: state.config.max_channels,
                        queued_points: state.queue.len(),
                        activated_channels: report.channels,
                        activated_points: report.points,
                    };
                    warn!(target: "edge.streaming", error = %err, "channel_activation_limited");
                    return Err(err);
                }
                let batch_size = state.config.max_points_per_channel;
                let points = state.queue.take_batch(batch_size);
                let (channel_id, generation) = state.insert_channel(points.clone());
                (channel_id, generation, points)
            };
            self.notify_state(&channel_id, ChannelStatus::Connecting, None);
            let point_count = points.len();
            if self.attach_connection(&channel_id, generation, points).await.is_ok() {
                report.channels += 1;
                report.points += point_count;
            }
        }
        info!(
            target: "edge.streaming",
            channels = report.channels,
            points = report.points,
            "channel_activation_complete"
        );
        Ok(report)
    }

    async fn attach_connection(
        &self,
        channel_id: &str,
        generation: u64,
        points: Vec<PointIdentity>,
    ) -> Result<(), StreamingError> {
        let target = ConnectTarget {
            channel_id: channel_id.to_string(),
            generation,
            points,
        };
        let connector = self.connector();
        match connector.connect(target, self.inner.events.clone()).await {
            Ok(connection) => {
                let stale = {
                    let mut state = self.state();
                    match state.channels.get_mut(channel_id) {
                        Some(record) if record.generation == generation => {
                            if record.manually_closed {
                                connection.close();
                            }
                            record.connection = Some(connection);
                            None
                        }
                        // 建连期间通道已被删除或重开
                        _ => Some(connection),
                    }
                };
                if let Some(connection) = stale {
                    connection.close();
                }
                Ok(())
            }
            Err(err) => {
                let removed = {
                    let mut state = self.state();
                    let current = state
                        .channels
                        .get(channel_id)
                        .is_some_and(|record| record.generation == generation);
                    if current {
                        state.remove_channel(channel_id)
                    } else {
                        None
                    }
                };
                // 迟到的 Failed 事件或删除操作已处理过该通道时不再通知
                if let Some(record) = removed {
                    warn!(
                        target: "edge.streaming",
                        channel_id = %channel_id,
                        dropped_points = record.points.len(),
                        error = %err,
                        "channel_connect_failed"
                    );
                    self.notify_state(channel_id, ChannelStatus::FailedDeleted, Some(err.to_string()));
                }
                Err(err)
            }
        }
    }

    // ---- 关闭 ----

    /// 关闭通道（保留记录以便重开）。对已关闭的通道为空操作。
    pub fn close_by_id(&self, channel_id: &str) -> Result<ChannelCounts, StreamingError> {
        let mut state = self.state();
        let record = state
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| StreamingError::UnknownChannel(channel_id.to_string()))?;
        let mut counts = ChannelCounts::default();
        counts.add(record.request_close());
        info!(
            target: "edge.streaming",
            channel_id = %channel_id,
            points = counts.points,
            "channel_close_requested"
        );
        Ok(counts)
    }

    pub fn close_by_point_id(&self, point_id: &str) -> Result<ChannelCounts, StreamingError> {
        let channel_id = self
            .state()
            .assignments
            .get(point_id)
            .cloned()
            .ok_or_else(|| StreamingError::UnknownPoint(point_id.to_string()))?;
        self.close_by_id(&channel_id)
    }

    pub fn close_by_path_pattern(&self, pattern: &str) -> Result<ChannelCounts, StreamingError> {
        let pattern = compile_pattern(pattern)?;
        Ok(self.close_where(|record| record.matches_path(&pattern)))
    }

    pub fn close_all(&self) -> ChannelCounts {
        self.close_where(|_| true)
    }

    fn close_where<F>(&self, filter: F) -> ChannelCounts
    where
        F: Fn(&ChannelRecord) -> bool,
    {
        let mut state = self.state();
        let mut counts = ChannelCounts::default();
        for record in state.channels.values_mut() {
            if filter(record) {
                counts.add(record.request_close());
            }
        }
        info!(
            target: "edge.streaming",
            channels = counts.channels,
            points = counts.points,
            "channels_close_requested"
        );
        counts
    }

    // ---- 重开 ----

    /// 以原有点位重建连接。
    ///
    /// 已打开或连接中为空操作；关闭请求未完成时返回 [`StreamingError::ClosePending`]，
    /// 关闭中返回 [`StreamingError::InvalidState`]。
    /// 重建失败时删除通道记录并发出 `failed-deleted` 通知。
    pub async fn open_by_id(&self, channel_id: &str) -> Result<(), StreamingError> {
        let (generation, points, previous) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let record = state
                .channels
                .get_mut(channel_id)
                .ok_or_else(|| StreamingError::UnknownChannel(channel_id.to_string()))?;
            match record.state {
                ChannelState::Closed => {}
                ChannelState::Open | ChannelState::Connecting if !record.manually_closed => {
                    return Ok(());
                }
                ChannelState::Open | ChannelState::Connecting => {
                    return Err(StreamingError::ClosePending(channel_id.to_string()));
                }
                current => {
                    return Err(StreamingError::InvalidState {
                        channel_id: channel_id.to_string(),
                        state: current,
                    });
                }
            }
            state.next_generation += 1;
            let generation = state.next_generation;
            record.manually_closed = false;
            record.state = ChannelState::Connecting;
            record.generation = generation;
            (generation, record.points.clone(), record.connection.take())
        };
        drop(previous);
        info!(
            target: "edge.streaming",
            channel_id = %channel_id,
            points = points.len(),
            "channel_reopen_requested"
        );
        self.notify_state(channel_id, ChannelStatus::Connecting, None);
        self.attach_connection(channel_id, generation, points).await
    }

    /// 重开所有非手动关闭的已关闭通道。
    pub async fn open_all_closed(&self) -> ChannelCounts {
        let channel_ids = self.state().sorted_ids(|record| {
            record.state == ChannelState::Closed && !record.manually_closed
        });
        let mut counts = ChannelCounts::default();
        for channel_id in channel_ids {
            let points = self
                .state()
                .channels
                .get(&channel_id)
                .map(|record| record.points.len());
            let Some(points) = points else { continue };
            if self.open_by_id(&channel_id).await.is_ok() {
                counts.add(points);
            }
        }
        counts
    }

    // ---- 删除 ----

    /// 删除通道记录并释放点位（点位不会自动重新入队）。
    pub fn delete_by_id(&self, channel_id: &str) -> Result<ChannelCounts, StreamingError> {
        let record = self
            .state()
            .remove_channel(channel_id)
            .ok_or_else(|| StreamingError::UnknownChannel(channel_id.to_string()))?;
        let mut counts = ChannelCounts::default();
        counts.add(shutdown_record(record));
        info!(
            target: "edge.streaming",
            channel_id = %channel_id,
            points = counts.points,
            "channel_deleted"
        );
        Ok(counts)
    }

    pub fn delete_by_path_pattern(&self, pattern: &str) -> Result<ChannelCounts, StreamingError> {
        let pattern = compile_pattern(pattern)?;
        Ok(self.delete_where(|record| record.matches_path(&pattern)))
    }

    pub fn delete_all(&self) -> ChannelCounts {
        self.delete_where(|_| true)
    }

    fn delete_where<F>(&self, filter: F) -> ChannelCounts
    where
        F: Fn(&ChannelRecord) -> bool,
    {
        let removed: Vec<ChannelRecord> = {
            let mut state = self.state();
            let channel_ids = state.sorted_ids(filter);
            channel_ids
                .iter()
                .filter_map(|channel_id| state.remove_channel(channel_id))
                .collect()
        };
        let mut counts = ChannelCounts::default();
        for record in removed {
            counts.add(shutdown_record(record));
        }
        info!(
            target: "edge.streaming",
            channels = counts.channels,
            points = counts.points,
            "channels_deleted"
        );
        counts
    }

    // ---- 查询 ----

    pub fn channels(&self) -> Vec<ChannelSnapshot> {
        self.state().snapshots(|_| true)
    }

    pub fn channels_by_state(&self, channel_state: ChannelState) -> Vec<ChannelSnapshot> {
        self.state()
            .snapshots(|record| record.state == channel_state)
    }

    pub fn channel(&self, channel_id: &str) -> Result<ChannelSnapshot, StreamingError> {
        self.state()
            .channels
            .get(channel_id)
            .map(ChannelRecord::snapshot)
            .ok_or_else(|| StreamingError::UnknownChannel(channel_id.to_string()))
    }

    pub fn channel_by_point_id(&self, point_id: &str) -> Option<ChannelSnapshot> {
        let state = self.state();
        let channel_id = state.assignments.get(point_id)?;
        state.channels.get(channel_id).map(ChannelRecord::snapshot)
    }

    pub fn channel_by_point_path(&self, path: &str) -> Option<ChannelSnapshot> {
        self.state()
            .snapshots(|record| record.points.iter().any(|point| point.path == path))
            .into_iter()
            .next()
    }

    pub fn channels_by_path_pattern(
        &self,
        pattern: &str,
    ) -> Result<Vec<ChannelSnapshot>, StreamingError> {
        let pattern = compile_pattern(pattern)?;
        Ok(self.state().snapshots(|record| record.matches_path(&pattern)))
    }

    pub fn counts_by_path_pattern(&self, pattern: &str) -> Result<ChannelCounts, StreamingError> {
        let mut counts = ChannelCounts::default();
        for channel in self.channels_by_path_pattern(pattern)? {
            counts.add(channel.point_count());
        }
        Ok(counts)
    }

    pub fn channel_count(&self) -> usize {
        self.state().channels.len()
    }

    /// 已分配到通道的点位数。
    pub fn point_count(&self) -> usize {
        self.state().assignments.len()
    }

    // ---- 连接事件 ----

    /// 处理一条连接事件：推进状态或转发消息。
    pub async fn handle_event(&self, event: ConnectionEvent, handler: &dyn ChannelMessageHandler) {
        let ConnectionEvent {
            channel_id,
            generation,
            kind,
        } = event;
        match kind {
            ConnectionEventKind::Message(payload) => {
                let deliver = self
                    .state()
                    .channels
                    .get(&channel_id)
                    .is_some_and(|record| record.accepts_messages(generation));
                if !deliver {
                    debug!(target: "edge.streaming", channel_id = %channel_id, "channel_message_discarded");
                    return;
                }
                let message = ChannelMessage {
                    channel_id: channel_id.clone(),
                    payload,
                };
                if let Err(err) = handler.handle(message).await {
                    warn!(
                        target: "edge.streaming",
                        channel_id = %channel_id,
                        error = %err,
                        "channel_message_rejected"
                    );
                }
            }
            ConnectionEventKind::Opened => {
                self.apply_transition(&channel_id, generation, ChannelState::Open, None);
            }
            ConnectionEventKind::Closing => {
                self.apply_transition(&channel_id, generation, ChannelState::Closing, None);
            }
            ConnectionEventKind::Closed(reason) => {
                self.apply_transition(&channel_id, generation, ChannelState::Closed, reason);
            }
            ConnectionEventKind::Errored(detail) => {
                let current = self
                    .state()
                    .channels
                    .get(&channel_id)
                    .is_some_and(|record| record.generation == generation);
                if current {
                    warn!(
                        target: "edge.streaming",
                        channel_id = %channel_id,
                        detail = %detail,
                        "channel_errored"
                    );
                    self.notify_state(&channel_id, ChannelStatus::Errored, Some(detail));
                }
            }
            ConnectionEventKind::Failed(detail) => {
                let removed = {
                    let mut state = self.state();
                    let current = state
                        .channels
                        .get(&channel_id)
                        .is_some_and(|record| record.generation == generation);
                    if current {
                        state.remove_channel(&channel_id)
                    } else {
                        None
                    }
                };
                if let Some(record) = removed {
                    warn!(
                        target: "edge.streaming",
                        channel_id = %channel_id,
                        dropped_points = record.points.len(),
                        detail = %detail,
                        "channel_connect_failed"
                    );
                    self.notify_state(&channel_id, ChannelStatus::FailedDeleted, Some(detail));
                }
            }
        }
    }

    fn apply_transition(
        &self,
        channel_id: &str,
        generation: u64,
        next: ChannelState,
        detail: Option<String>,
    ) {
        let applied = {
            let mut state = self.state();
            let Some(record) = state.channels.get_mut(channel_id) else {
                return;
            };
            if record.generation != generation {
                return;
            }
            if record.state.can_transition_to(next) {
                record.state = next;
                Ok(())
            } else {
                Err(record.state)
            }
        };
        match applied {
            Ok(()) => {
                info!(
                    target: "edge.streaming",
                    channel_id = %channel_id,
                    state = %next,
                    detail = ?detail,
                    "channel_state_changed"
                );
                self.notify_state(channel_id, next.into(), detail);
            }
            Err(current) => {
                warn!(
                    target: "edge.streaming",
                    channel_id = %channel_id,
                    from = %current,
                    to = %next,
                    "channel_transition_rejected"
                );
            }
        }
    }

    /// 启动连接事件处理任务。
    pub fn spawn_event_loop(
        &self,
        mut events: ConnectionEventReceiver,
        handler: Arc<dyn ChannelMessageHandler>,
    ) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                pool.handle_event(event, handler.as_ref()).await;
            }
        })
    }
}

fn validate_point(point: &PointIdentity) -> Result<(), StreamingError> {
    if point.id.trim().is_empty() || point.path.trim().is_empty() {
        return Err(StreamingError::InvalidPoint(format!(
            "point id and path are required (id={:?}, path={:?})",
            point.id, point.path
        )));
    }
    Ok(())
}

fn compile_pattern(pattern: &str) -> Result<Regex, StreamingError> {
    Regex::new(pattern).map_err(|err| StreamingError::InvalidPattern(err.to_string()))
}

/// 关闭已从表中移除的通道的连接（拆除在后台继续）。
fn shutdown_record(record: ChannelRecord) -> usize {
    if record.state != ChannelState::Closed {
        if let Some(connection) = &record.connection {
            connection.close();
        }
    }
    record.points.len()
}
